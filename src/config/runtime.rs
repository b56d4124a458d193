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
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_TASKS_PER_TICK: usize = 64;
pub const DEFAULT_LOOKAHEAD_TICKS: u64 = 40;

/// A YAML representation of the playback runtime limits.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Runtime {
    /// Words decoded per host callback.
    batch_size: Option<usize>,

    /// Tasks one host callback may run.
    max_tasks_per_tick: Option<usize>,

    /// How far ahead of the current tick events are decoded.
    lookahead_ticks: Option<u64>,
}

impl Runtime {
    pub fn new(batch_size: usize, max_tasks_per_tick: usize, lookahead_ticks: u64) -> Runtime {
        Runtime {
            batch_size: Some(batch_size),
            max_tasks_per_tick: Some(max_tasks_per_tick),
            lookahead_ticks: Some(lookahead_ticks),
        }
    }

    /// Returns the decode batch size (default: 50).
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// Returns the per-tick task budget (default: 64).
    pub fn max_tasks_per_tick(&self) -> usize {
        self.max_tasks_per_tick.unwrap_or(DEFAULT_MAX_TASKS_PER_TICK)
    }

    /// Returns the decode lookahead in ticks (default: 40).
    pub fn lookahead_ticks(&self) -> u64 {
        self.lookahead_ticks.unwrap_or(DEFAULT_LOOKAHEAD_TICKS)
    }
}
