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

//! Reading notes out of Standard MIDI Files.

use std::collections::HashMap;
use std::time::Duration;

use midly::{Format, MidiMessage, Smf, TrackEventKind};
use tracing::{debug, info};

mod clock;

pub use clock::TickClock;

/// MIDI key number of A4.
const A4_KEY: f64 = 69.0;

/// Errors raised while reading a MIDI stream. Any of them aborts a conversion.
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("malformed MIDI stream: {0}")]
    Malformed(#[from] midly::Error),
    #[error("MIDI header declares a zero time resolution")]
    ZeroResolution,
}

/// A single performed note.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    /// Onset in seconds from the start of the performance.
    onset_s: f64,
    /// Pitch in Hz.
    pitch_hz: f64,
    /// Duration in seconds.
    duration_s: f64,
    /// Velocity scaled to [0, 1].
    velocity: f32,
}

impl Note {
    /// Creates a new note.
    pub fn new(onset_s: f64, pitch_hz: f64, duration_s: f64, velocity: f32) -> Note {
        Note {
            onset_s,
            pitch_hz,
            duration_s,
            velocity,
        }
    }

    /// Gets the onset in seconds.
    pub fn onset_s(&self) -> f64 {
        self.onset_s
    }

    /// Gets the pitch in Hz.
    pub fn pitch_hz(&self) -> f64 {
        self.pitch_hz
    }

    /// Gets the duration in seconds.
    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }

    /// Gets the velocity in [0, 1].
    pub fn velocity(&self) -> f32 {
        self.velocity
    }
}

/// Converts a MIDI key number to its equal-tempered frequency.
pub fn key_to_hz(key: u8) -> f64 {
    440.0 * 2f64.powf((key as f64 - A4_KEY) / 12.0)
}

/// A sounding note waiting for its note off.
struct HeldNote {
    order: usize,
    onset_s: f64,
    velocity: f32,
}

/// Reads every note out of a Standard MIDI File, sorted by onset. Notes that start at the same
/// time keep the order their note on events appear in.
///
/// Notes no longer than `min_duration` and notes still held when the file ends are discarded.
/// A key that is struck again while held ends the held note at the new strike.
pub fn read_notes(bytes: &[u8], min_duration: Duration) -> Result<Vec<Note>, MidiError> {
    let smf = Smf::parse(bytes)?;
    let mut clock = TickClock::new(smf.header.timing)?;
    let sequential = matches!(smf.header.format, Format::Sequential);

    // Merge all tracks into one timeline. Sequential files play their tracks back to back.
    let mut timeline: Vec<(u64, &TrackEventKind)> = Vec::new();
    let mut track_start = 0u64;
    for track in smf.tracks.iter() {
        let mut tick = track_start;
        for event in track.iter() {
            tick += u64::from(event.delta.as_int());
            timeline.push((tick, &event.kind));
        }
        if sequential {
            track_start = tick;
        }
    }
    // Stable, so simultaneous events stay in track order.
    timeline.sort_by_key(|(tick, _)| *tick);

    let min_duration_s = min_duration.as_secs_f64();
    let mut held: HashMap<(u8, u8), HeldNote> = HashMap::new();
    let mut finished: Vec<(usize, Note)> = Vec::new();
    let mut strikes = 0usize;
    let mut discarded = 0usize;

    let mut finish = |key: u8, note: HeldNote, now: f64, finished: &mut Vec<(usize, Note)>| {
        let duration_s = now - note.onset_s;
        if duration_s > min_duration_s {
            finished.push((
                note.order,
                Note::new(note.onset_s, key_to_hz(key), duration_s, note.velocity),
            ));
        } else {
            discarded += 1;
        }
    };

    for (tick, kind) in timeline {
        match kind {
            TrackEventKind::Meta(midly::MetaMessage::Tempo(tempo)) => {
                clock.set_tempo(tick, tempo.as_int());
            }
            TrackEventKind::Midi { channel, message } => {
                let now = clock.seconds(tick);
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        let id = (channel.as_int(), key.as_int());
                        let note = HeldNote {
                            order: strikes,
                            onset_s: now,
                            velocity: vel.as_int() as f32 / 127.0,
                        };
                        strikes += 1;
                        if let Some(previous) = held.insert(id, note) {
                            finish(id.1, previous, now, &mut finished);
                        }
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let id = (channel.as_int(), key.as_int());
                        if let Some(note) = held.remove(&id) {
                            finish(id.1, note, now, &mut finished);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    if !held.is_empty() {
        debug!(count = held.len(), "Discarding notes without a note off");
    }

    finished.sort_by(|(a_order, a), (b_order, b)| {
        a.onset_s
            .total_cmp(&b.onset_s)
            .then(a_order.cmp(b_order))
    });
    let notes: Vec<Note> = finished.into_iter().map(|(_, note)| note).collect();

    info!(
        notes = notes.len(),
        discarded,
        unterminated = held.len(),
        "Read MIDI notes"
    );
    Ok(notes)
}
