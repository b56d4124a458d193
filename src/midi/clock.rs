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

use midly::Timing;

use super::MidiError;

/// Tempo assumed until a file sets one: 120 BPM.
const DEFAULT_TEMPO_US: u32 = 500_000;

/// How MIDI ticks relate to wall time.
#[derive(Clone, Copy, Debug)]
enum Resolution {
    /// Ticks per quarter note, scaled by the current tempo.
    Metrical(f64),
    /// Fixed ticks per second, tempo events have no effect.
    Timecode(f64),
}

/// Converts absolute MIDI ticks to seconds, following tempo changes as they are applied.
///
/// Tempo changes must be applied in tick order and queries must not go back before the last
/// tempo change.
#[derive(Clone, Debug)]
pub struct TickClock {
    resolution: Resolution,
    tempo_us: u32,
    anchor_tick: u64,
    anchor_s: f64,
}

impl TickClock {
    /// Creates a clock for the given header timing.
    pub fn new(timing: Timing) -> Result<TickClock, MidiError> {
        let resolution = match timing {
            Timing::Metrical(ticks_per_beat) => {
                if ticks_per_beat.as_int() == 0 {
                    return Err(MidiError::ZeroResolution);
                }
                Resolution::Metrical(ticks_per_beat.as_int() as f64)
            }
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = fps.as_f32() as f64 * subframes as f64;
                if ticks_per_second <= 0.0 {
                    return Err(MidiError::ZeroResolution);
                }
                Resolution::Timecode(ticks_per_second)
            }
        };

        Ok(TickClock {
            resolution,
            tempo_us: DEFAULT_TEMPO_US,
            anchor_tick: 0,
            anchor_s: 0.0,
        })
    }

    /// Returns the time of the given tick in seconds.
    pub fn seconds(&self, tick: u64) -> f64 {
        match self.resolution {
            Resolution::Metrical(ticks_per_beat) => {
                let beats = tick.saturating_sub(self.anchor_tick) as f64 / ticks_per_beat;
                self.anchor_s + beats * self.tempo_us as f64 / 1_000_000.0
            }
            Resolution::Timecode(ticks_per_second) => tick as f64 / ticks_per_second,
        }
    }

    /// Applies a tempo change (microseconds per quarter note) at the given tick.
    pub fn set_tempo(&mut self, tick: u64, tempo_us: u32) {
        self.anchor_s = self.seconds(tick);
        self.anchor_tick = tick;
        self.tempo_us = tempo_us;
    }
}
