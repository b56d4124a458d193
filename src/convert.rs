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

//! The conversion pipeline: MIDI to notes, notes to triggers, triggers to blocks, and the files
//! an operator deploys.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::codec::{Codec, CodecError, Event, LOUDNESS_LEVELS, WORD_WIDTH};
use crate::config::{ConfigError, Settings};
use crate::host::{self, Coordinate};
use crate::mapper::{self, Mapping, TimedEvent};
use crate::midi::{self, MidiError};
use crate::palette::sound_profile;
use crate::preview::{self, PreviewError, SampleBank};
use crate::runtime::{trigger_capacity, RecordingSink, Runtime, RuntimeError};
use crate::util::{duration_minutes_seconds, file_stem_display, tick_duration};

/// Errors that abort a conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Midi(#[from] MidiError),
    #[error("encoding failed: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("preview failed: {0}")]
    Preview(#[from] PreviewError),
    #[error("simulation failed: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{triggers} triggers land on tick {tick}, but a tick fits at most {limit}")]
    TickBudget {
        tick: u64,
        triggers: usize,
        limit: usize,
    },
}

/// Counts that show how much of the performance survived the conversion.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConversionStats {
    pub total_notes: usize,
    pub mapped_notes: usize,
    pub dropped_notes: usize,
    pub events: usize,
    pub encoded_words: usize,
    pub filler_words: usize,
    pub blocks: usize,
}

/// Everything a conversion produces.
#[derive(Debug)]
pub struct Conversion {
    pub codec: Codec,
    pub mapping: Mapping,
    pub timed: Vec<TimedEvent>,
    pub events: Vec<Event>,
    pub blocks: Vec<String>,
    pub stats: ConversionStats,
}

impl Conversion {
    /// The tick of the last trigger.
    pub fn last_tick(&self) -> u64 {
        self.timed.last().map_or(0, |event| event.tick)
    }
}

/// Runs the whole pipeline on a MIDI file's bytes. Nothing is written.
pub fn convert(bytes: &[u8], settings: &Settings) -> Result<Conversion, ConvertError> {
    settings.validate()?;
    let codec = settings.codec().build()?;
    let palette = settings.palette()?;

    let notes = midi::read_notes(bytes, settings.min_note_duration()?)?;
    let mapping = mapper::assign(
        &notes,
        &palette,
        settings.layering().max_layers(),
        settings.ticks_per_second(),
    );
    let timed = mapper::flatten(&mapping.assignments);
    let limit = trigger_capacity(settings.runtime().max_tasks_per_tick());
    if let Some((tick, triggers)) = busiest_tick(&timed) {
        if triggers > limit {
            warn!(tick, triggers, limit, "Too many simultaneous triggers");
            return Err(ConvertError::TickBudget {
                tick,
                triggers,
                limit,
            });
        }
    }
    let events = mapper::delay_encode(&timed);
    if events.is_empty() {
        warn!(notes = notes.len(), "No playable events, the song has no blocks");
    }

    let payload = codec.encode(&events)?;
    let blocks = codec.chunk(&payload)?;
    codec.verify_blocks(&blocks)?;
    let encoded_words = payload.len() / WORD_WIDTH;
    let stats = ConversionStats {
        total_notes: notes.len(),
        mapped_notes: mapping.assignments.len(),
        dropped_notes: mapping.dropped,
        events: events.len(),
        encoded_words,
        filler_words: encoded_words - events.len(),
        blocks: blocks.len(),
    };

    let last_tick = timed.last().map_or(0, |event| event.tick);
    let length = duration_minutes_seconds(tick_duration(last_tick, settings.ticks_per_second()));
    info!(
        notes = stats.total_notes,
        mapped = stats.mapped_notes,
        events = stats.events,
        blocks = stats.blocks,
        length = %length,
        "Converted song"
    );
    Ok(Conversion {
        codec,
        mapping,
        timed,
        events,
        blocks,
        stats,
    })
}

/// The tick with the most triggers and its trigger count. The earliest tick wins a tie.
fn busiest_tick(timed: &[TimedEvent]) -> Option<(u64, usize)> {
    let mut busiest = None;
    let mut most = 0;
    for group in timed.chunk_by(|a, b| a.tick == b.tick) {
        if group.len() > most {
            most = group.len();
            busiest = Some((group[0].tick, most));
        }
    }
    busiest
}

/// Extra outputs of a conversion.
#[derive(Clone, Debug, Default)]
pub struct OutputOptions {
    /// Block coordinates for the run snippet. No snippet is written without them.
    pub coordinates: Option<Vec<Coordinate>>,
    /// The world already calls [`host::TICK_CORE`] from its tick function.
    pub has_tick: bool,
    /// Render preview.wav and preview.mid.
    pub render_preview: bool,
}

/// The directory a song's outputs go to.
pub fn song_dir(output_root: &Path, midi_path: &Path) -> PathBuf {
    output_root.join(file_stem_display(midi_path))
}

/// Writes the outputs of a conversion into `dir`. Every output is prepared in memory first, so
/// a failure leaves nothing behind.
pub fn write_outputs(
    conversion: &Conversion,
    settings: &Settings,
    options: &OutputOptions,
    dir: &Path,
) -> Result<Vec<PathBuf>, ConvertError> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    for (index, block) in conversion.blocks.iter().enumerate() {
        files.push((format!("block_{index}.txt"), block.clone().into_bytes()));
    }
    files.push((
        "setup.js".to_string(),
        host::setup_code(&conversion.codec, settings.runtime(), options.has_tick).into_bytes(),
    ));
    if let Some(coordinates) = &options.coordinates {
        if coordinates.len() != conversion.blocks.len() {
            warn!(
                coordinates = coordinates.len(),
                blocks = conversion.blocks.len(),
                "Coordinate count does not match block count"
            );
        }
        files.push((
            "runner.js".to_string(),
            host::runner_code(coordinates).into_bytes(),
        ));
    }
    files.push((
        "note_log.txt".to_string(),
        note_log(&conversion.timed, settings.ticks_per_second()).into_bytes(),
    ));
    files.push((
        "sounds_used.json".to_string(),
        serde_json::to_vec_pretty(&sounds_used(&conversion.timed))?,
    ));
    files.push((
        "mapping_report.json".to_string(),
        serde_json::to_vec_pretty(&mapping_report(&conversion.timed))?,
    ));
    files.push((
        "stats.json".to_string(),
        serde_json::to_vec_pretty(&conversion.stats)?,
    ));

    if options.render_preview {
        let preview_config = settings.preview();
        let bank = SampleBank::load(
            &preview_config.sound_folder(),
            settings.palette()?.sounds(),
            preview_config.sample_rate(),
        )?;
        let buffer = preview::render(
            &conversion.timed,
            &bank,
            settings.ticks_per_second(),
            preview_config.tail()?,
        );
        let mut wav = std::io::Cursor::new(Vec::new());
        preview::write_wav_to(&mut wav, &buffer, bank.sample_rate())?;
        files.push(("preview.wav".to_string(), wav.into_inner()));
        files.push((
            "preview.mid".to_string(),
            preview::export_midi(&conversion.timed, settings.ticks_per_second())?,
        ));
    }

    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = dir.join(name);
        fs::write(&path, contents)?;
        written.push(path);
    }
    info!(dir = %dir.display(), files = written.len(), "Wrote conversion outputs");
    Ok(written)
}

/// One line per trigger: tick, time, sound, loudness, piano key and rate.
pub fn note_log(timed: &[TimedEvent], ticks_per_second: u32) -> String {
    let mut log = String::new();
    for event in timed {
        let sound = sound_profile(event.sound_id).map_or("?", |sound| sound.name());
        let gain = LOUDNESS_LEVELS
            .get(event.loudness_index as usize)
            .copied()
            .unwrap_or(0.0);
        // Writing to a String cannot fail.
        let _ = writeln!(
            log,
            "tick {:>7} {:>9.2}s  {:<28} loudness {} ({:.1})  piano {:>2}  rate {:.4}",
            event.tick,
            tick_duration(event.tick, ticks_per_second).as_secs_f64(),
            sound,
            event.loudness_index,
            gain,
            event.piano_index,
            event.rate
        );
    }
    log
}

/// The sorted names of every sound the song uses.
pub fn sounds_used(timed: &[TimedEvent]) -> Vec<&'static str> {
    timed
        .iter()
        .filter_map(|event| sound_profile(event.sound_id).map(|sound| sound.name()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Trigger count of one sound.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SoundUsage {
    pub sound: &'static str,
    pub events: usize,
}

/// Trigger counts per sound, most used first.
pub fn mapping_report(timed: &[TimedEvent]) -> Vec<SoundUsage> {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in timed {
        if let Some(sound) = sound_profile(event.sound_id) {
            *counts.entry(sound.name()).or_default() += 1;
        }
    }
    let mut report: Vec<SoundUsage> = counts
        .into_iter()
        .map(|(sound, events)| SoundUsage { sound, events })
        .collect();
    // Stable, so equal counts stay in name order.
    report.sort_by(|a, b| b.events.cmp(&a.events));
    report
}

/// The outcome of playing a conversion through the runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct Simulation {
    pub ticks_run: u64,
    pub fired: Vec<u64>,
    pub late: usize,
}

impl Simulation {
    /// Returns true if every trigger fired on the tick it was mapped to.
    pub fn matches(&self, conversion: &Conversion) -> bool {
        self.fired.len() == conversion.timed.len()
            && self
                .fired
                .iter()
                .zip(conversion.timed.iter())
                .all(|(fired, event)| *fired == event.tick)
    }
}

/// Plays the blocks of a conversion through the runtime, the way the host would.
pub fn simulate(conversion: &Conversion, settings: &Settings) -> Result<Simulation, ConvertError> {
    let mut runtime = Runtime::new(conversion.codec.clone(), settings.runtime());
    let mut sink = RecordingSink::new();
    runtime.play(conversion.blocks.clone());
    // Every trigger is due by the last tick, the rest is slack for decode batches.
    let limit = conversion.last_tick() + conversion.stats.encoded_words as u64 + 2;
    let ticks_run = runtime.run_until_idle(&mut sink, limit)?;

    let simulation = Simulation {
        ticks_run,
        fired: sink.ticks(),
        late: runtime.late_events(),
    };
    info!(
        ticks = simulation.ticks_run,
        triggers = simulation.fired.len(),
        late = simulation.late,
        "Simulated playback"
    );
    Ok(simulation)
}
