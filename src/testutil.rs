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
use std::error::Error;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::midi::Note;

/// Builds a note.
pub fn note(onset_s: f64, pitch_hz: f64, duration_s: f64, velocity: f32) -> Note {
    Note::new(onset_s, pitch_hz, duration_s, velocity)
}

pub fn smf_note_on(channel: u8, key: u8, vel: u8) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::from(channel),
        message: MidiMessage::NoteOn {
            key: u7::from(key),
            vel: u7::from(vel),
        },
    }
}

pub fn smf_note_off(channel: u8, key: u8) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::from(channel),
        message: MidiMessage::NoteOff {
            key: u7::from(key),
            vel: u7::from(0),
        },
    }
}

pub fn smf_tempo(us_per_beat: u32) -> TrackEventKind<'static> {
    TrackEventKind::Meta(MetaMessage::Tempo(u24::from(us_per_beat)))
}

/// Writes a parallel Standard MIDI File. Each track is a list of (delta ticks, event) pairs and
/// gets an end of track event appended.
pub fn smf_bytes(
    ticks_per_beat: u16,
    tracks: Vec<Vec<(u32, TrackEventKind<'static>)>>,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let tracks = tracks
        .into_iter()
        .map(|events| {
            let mut track: Vec<TrackEvent<'static>> = events
                .into_iter()
                .map(|(delta, kind)| TrackEvent {
                    delta: u28::from(delta),
                    kind,
                })
                .collect();
            track.push(TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            track
        })
        .collect();

    let smf = Smf {
        header: Header::new(Format::Parallel, Timing::Metrical(u15::from(ticks_per_beat))),
        tracks,
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    Ok(bytes)
}

/// Writes a 16-bit WAV file. Each inner vector holds one channel.
pub fn write_wav(
    path: &Path,
    channels: &[Vec<f32>],
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            let sample = channel.get(frame).copied().unwrap_or(0.0);
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Reads a 16-bit WAV file back as floats, interleaved.
pub fn read_wav(path: &Path) -> Result<(WavSpec, Vec<f32>), Box<dyn Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader
        .samples::<i16>()
        .map(|sample| sample.map(|s| s as f32 / i16::MAX as f32))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((spec, samples))
}
