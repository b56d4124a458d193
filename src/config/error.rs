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
use crate::codec::CodecError;
use crate::palette::UnknownSound;

/// Errors raised while loading, validating or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),
    #[error("failed to write config: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_yml::Error),
    #[error(transparent)]
    UnknownSound(#[from] UnknownSound),
    #[error("max_layers must be between 1 and {max}, got {value}")]
    MaxLayers { value: usize, max: usize },
    #[error("ticks_per_second must be positive")]
    TicksPerSecond,
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        value: usize,
        min: usize,
    },
    #[error("invalid duration '{value}' for {field}: {reason}")]
    Duration {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid codec settings: {0}")]
    Codec(#[from] CodecError),
}
