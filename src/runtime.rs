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

//! The playback runtime the host runs, driven one tick at a time.
//!
//! Playing a song schedules a decode task. Each decode task reads a bounded batch of words,
//! schedules a trigger for every event inside the lookahead window and then schedules itself
//! again, so no single tick ever does unbounded work. A trigger is only scheduled into a tick
//! with room left in its task budget, keeping one slot free for the decode task. Otherwise the
//! word waits and fires late on the first tick that has room.

use tracing::{debug, info, warn};

use crate::codec::{Codec, CodecError, Event, WordStream, LOUDNESS_LEVELS};
use crate::config;
use crate::palette::{piano_hz, sound_profile};

mod scheduler;

pub use scheduler::{BudgetExceeded, Scheduler, Tag, TaskId};

/// Errors raised while playing.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RuntimeError {
    #[error("decode failed: {0}")]
    Decode(#[from] CodecError),
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
    #[error("decoded sound id {0} has no sound")]
    UnknownSound(u8),
    #[error("playback did not finish within {0} ticks")]
    TickLimit(u64),
}

/// A sound the host should start.
#[derive(Clone, Debug, PartialEq)]
pub struct Trigger {
    pub sound: &'static str,
    pub sound_id: u8,
    pub piano_index: u8,
    pub volume: f32,
    pub rate: f64,
}

impl Trigger {
    /// Builds the trigger for a decoded event.
    pub fn from_event(event: &Event) -> Result<Trigger, RuntimeError> {
        let profile =
            sound_profile(event.sound_id).ok_or(RuntimeError::UnknownSound(event.sound_id))?;
        let volume = LOUDNESS_LEVELS
            .get(event.loudness_index as usize)
            .copied()
            .unwrap_or(LOUDNESS_LEVELS[LOUDNESS_LEVELS.len() - 1]);
        Ok(Trigger {
            sound: profile.name(),
            sound_id: event.sound_id,
            piano_index: event.piano_index,
            volume,
            rate: profile.rate_for(piano_hz(event.piano_index)),
        })
    }
}

/// Receives the triggers fired by the runtime.
pub trait SoundSink {
    fn play(&mut self, tick: u64, trigger: &Trigger);
}

/// A sink that keeps every trigger with the tick it fired on.
#[derive(Debug, Default)]
pub struct RecordingSink {
    triggers: Vec<(u64, Trigger)>,
}

impl RecordingSink {
    pub fn new() -> RecordingSink {
        RecordingSink::default()
    }

    pub fn triggers(&self) -> &[(u64, Trigger)] {
        &self.triggers
    }

    /// The ticks every trigger fired on, in firing order.
    pub fn ticks(&self) -> Vec<u64> {
        self.triggers.iter().map(|(tick, _)| *tick).collect()
    }
}

impl SoundSink for RecordingSink {
    fn play(&mut self, tick: u64, trigger: &Trigger) {
        self.triggers.push((tick, trigger.clone()));
    }
}

/// What a scheduled task does.
#[derive(Debug)]
pub enum Action {
    Trigger(Trigger),
    DecodeBatch,
}

/// Decode state of the song that is playing.
struct Playback {
    words: WordStream,
    /// A word read past the lookahead window, waiting for the window to reach it.
    held: Option<Event>,
    start_tick: u64,
    /// Ticks from the start to the last decoded word.
    elapsed: u64,
    late: usize,
}

/// Plays encoded songs through a tick scheduler.
pub struct Runtime {
    codec: Codec,
    scheduler: Scheduler<Action>,
    playback: Option<Playback>,
    batch_size: usize,
    lookahead_ticks: u64,
}

impl Runtime {
    /// Creates a runtime for songs encoded with the given codec.
    pub fn new(codec: Codec, config: &config::Runtime) -> Runtime {
        Runtime {
            codec,
            scheduler: Scheduler::new(config.max_tasks_per_tick()),
            playback: None,
            batch_size: config.batch_size().max(1),
            lookahead_ticks: config.lookahead_ticks(),
        }
    }

    /// Gets the tick the next call to [`Runtime::tick`] runs.
    pub fn current_tick(&self) -> u64 {
        self.scheduler.current_tick()
    }

    /// Returns true once nothing is left to decode or fire.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Gets the number of events of the current song that were decoded after their tick.
    pub fn late_events(&self) -> usize {
        self.playback.as_ref().map_or(0, |playback| playback.late)
    }

    /// Starts a song from its blocks, replacing whatever is playing. The first decode batch
    /// runs on the next tick.
    pub fn play(&mut self, blocks: Vec<String>) {
        self.cancel_all();
        let start_tick = self.scheduler.current_tick();
        info!(blocks = blocks.len(), start_tick, "Playing song");
        self.playback = Some(Playback {
            words: self.codec.words(blocks),
            held: None,
            start_tick,
            elapsed: 0,
            late: 0,
        });
        self.scheduler.schedule(Action::DecodeBatch, 0, Some(Tag::DECODE));
    }

    /// Stops the song. Triggers and decode tasks already queued never fire.
    pub fn stop(&mut self) {
        if self.playback.take().is_some() {
            info!(tick = self.scheduler.current_tick(), "Stopped song");
        }
        self.cancel_all();
    }

    fn cancel_all(&mut self) {
        self.scheduler.cancel(Tag::MUSIC);
        self.scheduler.cancel(Tag::DECODE);
    }

    /// Runs one host callback. Triggers due on this tick go to the sink.
    pub fn tick<S: SoundSink>(&mut self, sink: &mut S) -> Result<(), RuntimeError> {
        let Runtime {
            scheduler,
            playback,
            batch_size,
            lookahead_ticks,
            ..
        } = self;
        scheduler.advance_tick(|scheduler, action| match action {
            Action::Trigger(trigger) => {
                sink.play(scheduler.current_tick(), &trigger);
                Ok(())
            }
            Action::DecodeBatch => match playback.as_mut() {
                Some(playback) => {
                    decode_batch(scheduler, playback, *batch_size, *lookahead_ticks)
                }
                None => Ok(()),
            },
        })
    }

    /// Ticks until nothing is left to do, failing after `max_ticks`. Returns the number of
    /// ticks run.
    pub fn run_until_idle<S: SoundSink>(
        &mut self,
        sink: &mut S,
        max_ticks: u64,
    ) -> Result<u64, RuntimeError> {
        let mut ticks = 0;
        while !self.is_idle() {
            if ticks == max_ticks {
                return Err(RuntimeError::TickLimit(max_ticks));
            }
            self.tick(sink)?;
            ticks += 1;
        }
        Ok(ticks)
    }
}

/// Triggers a tick may hold, leaving one slot of the budget for a decode task.
pub fn trigger_capacity(max_tasks_per_tick: usize) -> usize {
    max_tasks_per_tick.saturating_sub(1).max(1)
}

/// Decodes up to `batch_size` words and schedules their triggers, then schedules the next batch.
fn decode_batch(
    scheduler: &mut Scheduler<Action>,
    playback: &mut Playback,
    batch_size: usize,
    lookahead_ticks: u64,
) -> Result<(), RuntimeError> {
    let now = scheduler.current_tick();
    let capacity = trigger_capacity(scheduler.max_tasks_per_tick());
    for _ in 0..batch_size {
        let word = match playback.held.take() {
            Some(word) => word,
            None => match playback.words.next() {
                Some(word) => word?,
                None => {
                    debug!(tick = now, late = playback.late, "Song fully decoded");
                    return Ok(());
                }
            },
        };

        let target = playback.start_tick + playback.elapsed + word.delay;
        if target > now + lookahead_ticks {
            playback.held = Some(word);
            scheduler.schedule(
                Action::DecodeBatch,
                target - lookahead_ticks - now,
                Some(Tag::DECODE),
            );
            return Ok(());
        }

        if playback.words.codec().is_filler(&word) {
            playback.elapsed += word.delay;
            continue;
        }

        let fire_tick = target.max(now);
        if scheduler.load(fire_tick) >= capacity {
            debug!(tick = now, fire_tick, "Tick is full, holding event");
            playback.held = Some(word);
            scheduler.schedule(
                Action::DecodeBatch,
                (fire_tick - now).max(1),
                Some(Tag::DECODE),
            );
            return Ok(());
        }

        playback.elapsed += word.delay;
        if target < now {
            warn!(tick = now, target, "Event decoded late");
            playback.late += 1;
        }
        let trigger = Trigger::from_event(&word)?;
        scheduler.schedule(Action::Trigger(trigger), fire_tick - now, Some(Tag::MUSIC));
    }

    scheduler.schedule(Action::DecodeBatch, 1, Some(Tag::DECODE));
    Ok(())
}
