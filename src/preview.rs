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

//! An offline render of a song the way the host would play it, for listening before deploying.

use std::io::{Seek, Write};
use std::path::PathBuf;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::codec::LOUDNESS_LEVELS;
use crate::mapper::TimedEvent;

mod compressor;
mod midi_export;
mod samples;

pub use compressor::Compressor;
pub use midi_export::export_midi;
pub use samples::{resample, SampleBank};

/// Semitone ratios the host tunes its sounds with.
const TUNING: [f64; 12] = [
    1.0, 1.0595, 1.1225, 1.1892, 1.26, 1.3348, 1.4142, 1.4983, 1.5874, 1.6818, 1.7818, 1.8877,
];

/// Semitone offset of each sound's sample relative to the piano index.
const OCTAVE_OFFSETS: [i32; 5] = [9, 4, 16, 16, -4];

/// Rate of a sample at the lowest pitch the host can play.
const BASE_RATE: f64 = 0.0625;

/// Errors raised while rendering a preview.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("no preview samples could be loaded from {0}")]
    NoSamples(PathBuf),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} ticks per second cannot be a MIDI resolution")]
    Resolution(u32),
}

/// The playback rate the host uses for a sound at a piano index.
pub fn playback_rate(sound_id: u8, piano_index: u8) -> f64 {
    let offset = OCTAVE_OFFSETS.get(sound_id as usize).copied().unwrap_or(0);
    let x = (piano_index as i32 + offset).max(0);
    TUNING[(x % 12) as usize] * 2f64.powi(x / 12) * BASE_RATE
}

/// Mixes the triggers into a mono buffer at the bank's sample rate and runs it through the
/// host's bus compressor. The buffer lasts until `tail` after the last trigger.
pub fn render(
    events: &[TimedEvent],
    bank: &SampleBank,
    ticks_per_second: u32,
    tail: Duration,
) -> Vec<f32> {
    let sample_rate = bank.sample_rate() as f64;
    let last_tick = events.iter().map(|event| event.tick).max().unwrap_or(0);
    let seconds = last_tick as f64 / ticks_per_second as f64 + tail.as_secs_f64();
    let mut buffer = vec![0.0f32; (seconds * sample_rate).ceil() as usize];

    let mut skipped = 0;
    for event in events {
        let Some(sample) = bank.get(event.sound_id) else {
            skipped += 1;
            continue;
        };
        let rate = playback_rate(event.sound_id, event.piano_index);
        let gain = LOUDNESS_LEVELS
            .get(event.loudness_index as usize)
            .copied()
            .unwrap_or(0.0);
        let start = (event.tick as f64 / ticks_per_second as f64 * sample_rate).round() as usize;
        let len = buffer.len();
        mix_in(&mut buffer[start.min(len)..], sample, rate, gain);
    }
    if skipped > 0 {
        debug!(skipped, "Triggers without a loaded sample were left out");
    }

    Compressor::bus(bank.sample_rate()).process(&mut buffer);
    for sample in buffer.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }

    info!(triggers = events.len(), seconds, "Rendered preview");
    buffer
}

/// Adds a sample played at `rate` to the output, truncated at the end of the output.
fn mix_in(output: &mut [f32], sample: &[f32], rate: f64, gain: f32) {
    if sample.is_empty() || rate <= 0.0 {
        return;
    }
    for (frame, out) in output.iter_mut().enumerate() {
        let position = frame as f64 * rate;
        let index = position.floor() as usize;
        if index >= sample.len() {
            break;
        }
        let frac = position.fract() as f32;
        let s0 = sample[index];
        let s1 = sample.get(index + 1).copied().unwrap_or(0.0);
        *out += (s0 + (s1 - s0) * frac) * gain;
    }
}

/// Writes a mono buffer as 16-bit PCM WAV data.
pub fn write_wav_to<W: Write + Seek>(
    writer: W,
    buffer: &[f32],
    sample_rate: u32,
) -> Result<(), PreviewError> {
    let mut writer = WavWriter::new(
        writer,
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;
    for sample in buffer {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
