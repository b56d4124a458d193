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

//! Turns notes into timed sound triggers.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::codec::{Event, FILLER_LOUDNESS, LOUDNESS_LEVELS};
use crate::midi::Note;
use crate::palette::{piano_index, select_sounds, Palette, SoundChoice};

/// A note that survived mapping, with the sounds that play it.
#[derive(Clone, Debug, PartialEq)]
pub struct NoteAssignment {
    note: Note,
    sounds: Vec<SoundChoice>,
    piano_index: u8,
    loudness_index: u8,
    tick: u64,
}

impl NoteAssignment {
    /// Gets the performed note.
    pub fn note(&self) -> &Note {
        &self.note
    }

    /// Gets the chosen sounds, primary first.
    pub fn sounds(&self) -> &[SoundChoice] {
        &self.sounds
    }

    /// Gets the nearest piano key.
    pub fn piano_index(&self) -> u8 {
        self.piano_index
    }

    /// Gets the loudness level shared by every layer.
    pub fn loudness_index(&self) -> u8 {
        self.loudness_index
    }

    /// Gets the host tick the note starts on.
    pub fn tick(&self) -> u64 {
        self.tick
    }
}

/// The result of mapping a song.
#[derive(Clone, Debug, Default)]
pub struct Mapping {
    pub assignments: Vec<NoteAssignment>,
    /// Notes that no available sound could play.
    pub dropped: usize,
}

/// One trigger at an absolute tick, before delay encoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    pub tick: u64,
    pub sound_id: u8,
    pub piano_index: u8,
    pub loudness_index: u8,
    pub rate: f64,
}

impl TimedEvent {
    /// The wire event for this trigger with the given delay.
    pub fn with_delay(&self, delay: u64) -> Event {
        Event {
            sound_id: self.sound_id,
            piano_index: self.piano_index,
            loudness_index: self.loudness_index,
            delay,
        }
    }
}

/// Returns the host tick for a time in seconds.
pub fn tick_for(seconds: f64, ticks_per_second: u32) -> u64 {
    (seconds * ticks_per_second as f64).round().max(0.0) as u64
}

/// Quantises a gain to the nearest audible loudness level. Ties go to the louder level.
pub fn loudness_index(gain: f32) -> u8 {
    let mut closest = 0;
    let mut min_diff = f32::INFINITY;
    for (index, level) in LOUDNESS_LEVELS[..FILLER_LOUDNESS as usize].iter().enumerate() {
        let diff = (level - gain).abs();
        if diff < min_diff {
            min_diff = diff;
            closest = index;
        }
    }
    closest as u8
}

/// Assigns sounds, a piano key, a tick and a loudness to every note. Notes without any usable
/// sound are dropped and counted.
///
/// The loudness of a note is its velocity divided by the square root of the number of notes
/// that start on the same tick.
pub fn assign(
    notes: &[Note],
    palette: &Palette,
    max_layers: usize,
    ticks_per_second: u32,
) -> Mapping {
    let mut dropped = 0;
    let mut survivors = Vec::with_capacity(notes.len());
    for note in notes {
        let sounds = select_sounds(note, palette, max_layers);
        if sounds.is_empty() {
            debug!(
                pitch_hz = note.pitch_hz(),
                duration_s = note.duration_s(),
                "No sound can play note"
            );
            dropped += 1;
            continue;
        }
        survivors.push((note, sounds, tick_for(note.onset_s(), ticks_per_second)));
    }

    let mut per_tick: HashMap<u64, usize> = HashMap::new();
    for (_, _, tick) in &survivors {
        *per_tick.entry(*tick).or_default() += 1;
    }

    let assignments: Vec<NoteAssignment> = survivors
        .into_iter()
        .map(|(note, sounds, tick)| {
            let simultaneous = per_tick.get(&tick).copied().unwrap_or(1) as f32;
            NoteAssignment {
                note: note.clone(),
                sounds,
                piano_index: piano_index(note.pitch_hz()),
                loudness_index: loudness_index(note.velocity() / simultaneous.sqrt()),
                tick,
            }
        })
        .collect();

    info!(
        notes = notes.len(),
        mapped = assignments.len(),
        dropped,
        "Mapped notes to sounds"
    );
    Mapping {
        assignments,
        dropped,
    }
}

/// Expands assignments into one trigger per chosen sound, ordered by tick. Layers of the same
/// note and notes on the same tick keep their order.
pub fn flatten(assignments: &[NoteAssignment]) -> Vec<TimedEvent> {
    let mut events: Vec<TimedEvent> = assignments
        .iter()
        .flat_map(|assignment| {
            assignment.sounds.iter().map(|sound| TimedEvent {
                tick: assignment.tick,
                sound_id: sound.sound_id,
                piano_index: assignment.piano_index,
                loudness_index: assignment.loudness_index,
                rate: sound.rate,
            })
        })
        .collect();
    events.sort_by_key(|event| event.tick);
    events
}

/// Rewrites absolute ticks as delays from the previous event. The first delay counts from
/// tick 0. Expects events ordered by tick.
pub fn delay_encode(events: &[TimedEvent]) -> Vec<Event> {
    let mut previous = 0;
    events
        .iter()
        .map(|event| {
            let delay = event.tick.saturating_sub(previous);
            previous = event.tick;
            event.with_delay(delay)
        })
        .collect()
}
