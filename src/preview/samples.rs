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
//! Sound samples for the preview, held in memory as mono at the render rate.

use std::collections::HashMap;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::{info, warn};

use crate::palette::SoundProfile;

use super::PreviewError;

/// Mono samples for each sound, keyed by sound id.
#[derive(Clone, Debug, Default)]
pub struct SampleBank {
    sample_rate: u32,
    samples: HashMap<u8, Vec<f32>>,
}

impl SampleBank {
    /// Creates a bank from samples that are already mono at the given rate.
    pub fn from_samples(sample_rate: u32, samples: HashMap<u8, Vec<f32>>) -> SampleBank {
        SampleBank {
            sample_rate,
            samples,
        }
    }

    /// Loads `<folder>/<name>.wav` for every sound. Sounds without a readable file are skipped
    /// with a warning. At least one sound has to load.
    pub fn load(
        folder: &Path,
        sounds: &[SoundProfile],
        sample_rate: u32,
    ) -> Result<SampleBank, PreviewError> {
        let mut samples = HashMap::new();
        for sound in sounds {
            let path = folder.join(format!("{}.wav", sound.name()));
            match load_mono(&path, sample_rate) {
                Ok(data) => {
                    info!(
                        path = ?path,
                        frames = data.len(),
                        "Loaded preview sample"
                    );
                    samples.insert(sound.id(), data);
                }
                Err(e) => warn!(path = ?path, err = %e, "Skipping preview sample"),
            }
        }

        if samples.is_empty() {
            return Err(PreviewError::NoSamples(folder.to_path_buf()));
        }
        Ok(SampleBank {
            sample_rate,
            samples,
        })
    }

    /// Gets the rate every sample is stored at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Gets the samples of a sound.
    pub fn get(&self, sound_id: u8) -> Option<&[f32]> {
        self.samples.get(&sound_id).map(Vec::as_slice)
    }

    /// Returns the number of loaded sounds.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Reads a WAV file, averages its channels and resamples it to the target rate.
fn load_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>, PreviewError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    if spec.sample_rate == target_rate {
        return Ok(mono);
    }
    Ok(resample(&mono, spec.sample_rate, target_rate))
}

/// Resamples mono samples using linear interpolation.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let target_frames = (samples.len() as f64 * ratio).ceil() as usize;
    (0..target_frames)
        .map(|frame| {
            let position = frame as f64 / ratio;
            let index = position.floor() as usize;
            let frac = position.fract() as f32;
            let s0 = samples.get(index).copied().unwrap_or(0.0);
            let s1 = samples.get(index + 1).copied().unwrap_or(s0);
            s0 + (s1 - s0) * frac
        })
        .collect()
}
