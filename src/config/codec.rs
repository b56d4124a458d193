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

use crate::codec::{
    CodecError, DEFAULT_BLOCK_SIZE, DEFAULT_CHARSET, DEFAULT_MAX_DELAY, LOUDNESS_LEVELS,
};
use crate::palette::SOUND_PROFILES;

/// A YAML representation of the wire format settings.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Codec {
    /// Characters per block, the host's literal limit.
    block_size: Option<usize>,

    /// Distinct delays a single word can carry.
    max_delay: Option<u32>,

    /// Digit alphabet. Must match the host player.
    charset: Option<String>,
}

impl Codec {
    pub fn new(block_size: usize, max_delay: u32) -> Codec {
        Codec {
            block_size: Some(block_size),
            max_delay: Some(max_delay),
            charset: None,
        }
    }

    /// Returns the block size (default: 16000).
    pub fn block_size(&self) -> usize {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    /// Returns the maximum delay per word (default: 300).
    pub fn max_delay(&self) -> u32 {
        self.max_delay.unwrap_or(DEFAULT_MAX_DELAY)
    }

    /// Returns the digit alphabet.
    pub fn charset(&self) -> &str {
        self.charset.as_deref().unwrap_or(DEFAULT_CHARSET)
    }

    /// Builds the codec these settings describe.
    pub fn build(&self) -> Result<crate::codec::Codec, CodecError> {
        crate::codec::Codec::new(
            self.charset(),
            self.max_delay(),
            LOUDNESS_LEVELS.len() as u32,
            SOUND_PROFILES.len() as u32,
            self.block_size(),
        )
    }
}
