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

//! Sample material and its playback.
//!
//! This module provides:
//! - Discovery and loading of sample folders into block-aligned buffers
//! - Per-sample slice tables and the resolver that turns notes into ranges
//! - Tempo estimation of freshly loaded material
//! - Playback voices and their supervision

pub mod loader;
pub mod slice;
pub mod store;
pub mod tempo;
pub mod voice;

pub use loader::{LoadError, Loader};
pub use slice::Resolved;
pub use store::{Boundary, Sample, SampleBuffer, Slice, SliceTable, SLICE_COUNT};
pub use voice::{Playback, PlaybackReport, Voice, VoiceManager};
