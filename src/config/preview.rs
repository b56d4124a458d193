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
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_TAIL: Duration = Duration::from_secs(3);
const DEFAULT_SOUND_FOLDER: &str = "sounds";

/// A YAML representation of the preview renderer settings.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Preview {
    /// Render sample rate in Hz.
    sample_rate: Option<u32>,

    /// Silence kept after the last trigger, e.g. "3s".
    tail: Option<String>,

    /// Folder holding one <sound name>.wav per sound.
    sound_folder: Option<String>,
}

impl Preview {
    /// Returns the render sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the tail after the last trigger (default: 3s).
    pub fn tail(&self) -> Result<Duration, ConfigError> {
        match &self.tail {
            Some(tail) => super::parse_duration("preview.tail", tail),
            None => Ok(DEFAULT_TAIL),
        }
    }

    /// Returns the sound folder (default: sounds).
    pub fn sound_folder(&self) -> PathBuf {
        PathBuf::from(self.sound_folder.as_deref().unwrap_or(DEFAULT_SOUND_FOLDER))
    }

    /// Overrides the sound folder.
    pub fn set_sound_folder(&mut self, folder: &str) {
        self.sound_folder = Some(folder.to_string());
    }
}
