// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
/// Threshold of the host's audio bus compressor in dBFS.
pub const BUS_THRESHOLD_DB: f32 = -10.0;
/// Knee width of the host's audio bus compressor in dB.
pub const BUS_KNEE_DB: f32 = 40.0;
pub const BUS_RATIO: f32 = 12.0;
pub const BUS_ATTACK_S: f32 = 0.0;
pub const BUS_RELEASE_S: f32 = 0.25;

/// Level reported for silence.
const SILENCE_DB: f32 = -100.0;

/// A mono soft-knee compressor with a peak envelope follower.
#[derive(Clone, Debug)]
pub struct Compressor {
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Compressor {
    /// The compressor the host puts on its audio bus.
    pub fn bus(sample_rate: u32) -> Compressor {
        Compressor::new(
            sample_rate,
            BUS_THRESHOLD_DB,
            BUS_KNEE_DB,
            BUS_RATIO,
            BUS_ATTACK_S,
            BUS_RELEASE_S,
        )
    }

    pub fn new(
        sample_rate: u32,
        threshold_db: f32,
        knee_db: f32,
        ratio: f32,
        attack_s: f32,
        release_s: f32,
    ) -> Compressor {
        Compressor {
            threshold_db,
            knee_db: knee_db.max(0.0),
            ratio: ratio.max(1.0),
            attack_coeff: smoothing_coeff(attack_s, sample_rate),
            release_coeff: smoothing_coeff(release_s, sample_rate),
            envelope: 0.0,
        }
    }

    /// Gain reduction in dB for a detected level.
    pub fn gain_reduction_db(&self, input_db: f32) -> f32 {
        let over = input_db - self.threshold_db;
        let slope = 1.0 - 1.0 / self.ratio;
        if 2.0 * over < -self.knee_db {
            0.0
        } else if 2.0 * over.abs() <= self.knee_db {
            let knee_input = over + self.knee_db / 2.0;
            slope * knee_input * knee_input / (2.0 * self.knee_db)
        } else {
            slope * over
        }
    }

    /// Compresses a buffer in place.
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            let detect = sample.abs();
            let coeff = if detect > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * detect;

            let envelope_db = if self.envelope > 1e-10 {
                20.0 * self.envelope.log10()
            } else {
                SILENCE_DB
            };
            *sample *= db_to_linear(-self.gain_reduction_db(envelope_db));
        }
    }
}

/// One-pole smoothing coefficient for a time constant. Zero means instant.
fn smoothing_coeff(time_s: f32, sample_rate: u32) -> f32 {
    if time_s <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_s * sample_rate as f32)).exp()
    }
}

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}
