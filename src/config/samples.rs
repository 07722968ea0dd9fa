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
use serde::Deserialize;

const DEFAULT_PREVIEW_BLOCKS: usize = 100;

/// Sample folder loading options.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Samples {
    /// How many blocks of each file are loaded for Browse previews.
    preview_blocks: Option<usize>,
}

impl Samples {
    pub fn new(preview_blocks: usize) -> Samples {
        Samples {
            preview_blocks: Some(preview_blocks),
        }
    }

    /// Returns the preview length in blocks (default: 100).
    pub fn preview_blocks(&self) -> usize {
        self.preview_blocks.unwrap_or(DEFAULT_PREVIEW_BLOCKS)
    }
}
