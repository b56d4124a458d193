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

/// Default number of sounds stacked on one note.
pub const DEFAULT_MAX_LAYERS: usize = 2;

/// How many sounds may play a single note.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Layering {
    max_layers: Option<usize>,
}

impl Layering {
    pub fn new(max_layers: usize) -> Layering {
        Layering {
            max_layers: Some(max_layers),
        }
    }

    /// Returns the maximum number of layers per note (default: 2).
    pub fn max_layers(&self) -> usize {
        self.max_layers.unwrap_or(DEFAULT_MAX_LAYERS)
    }
}
