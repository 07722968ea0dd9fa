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

//! Decoded material and the slice tables that carve it up.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use parking_lot::RwLock;

use crate::audio::StreamFormat;

/// One slice per key of an 88-key keyboard.
pub const SLICE_COUNT: usize = 88;
/// Offsets are a 7-bit controller value re-centred on 64.
pub const OFFSET_MIN: i8 = -64;
pub const OFFSET_MAX: i8 = 63;

/// Block-aligned material in the output stream format. Immutable once built;
/// a reload swaps in a new buffer rather than touching this one.
pub struct SampleBuffer {
    blocks: Vec<Vec<f32>>,
    format: StreamFormat,
    bits_per_sample: u16,
}

impl SampleBuffer {
    pub fn new(blocks: Vec<Vec<f32>>, format: StreamFormat, bits_per_sample: u16) -> SampleBuffer {
        SampleBuffer {
            blocks,
            format,
            bits_per_sample,
        }
    }

    /// Chops interleaved samples into full blocks, zero-padding the last one.
    pub fn from_interleaved(
        samples: &[f32],
        format: StreamFormat,
        bits_per_sample: u16,
    ) -> SampleBuffer {
        let block_samples = format.block_samples().max(1);
        let blocks = samples
            .chunks(block_samples)
            .map(|chunk| {
                let mut block = chunk.to_vec();
                block.resize(block_samples, 0.0);
                block
            })
            .collect();
        SampleBuffer::new(blocks, format, bits_per_sample)
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, index: usize) -> Option<&[f32]> {
        self.blocks.get(index).map(|block| block.as_slice())
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn channel_count(&self) -> u16 {
        self.format.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Bit depth of the material this buffer was decoded from.
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn duration(&self) -> Duration {
        self.format.block_duration() * self.blocks.len() as u32
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum::<usize>() * std::mem::size_of::<f32>()
    }
}

/// A play range keyed to a note. Boundaries are absolute block indices with
/// 0 meaning "not set yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slice {
    pub start: usize,
    pub end: usize,
    pub start_offset: i8,
    pub end_offset: i8,
}

impl Slice {
    /// `start + start_offset`, floored at 0.
    pub fn effective_start(&self) -> usize {
        self.start.saturating_add_signed(self.start_offset as isize)
    }

    /// `end + end_offset`, floored at 0.
    pub fn effective_end(&self) -> usize {
        self.end.saturating_add_signed(self.end_offset as isize)
    }
}

/// Which boundary a slice edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

/// The per-sample slice table.
#[derive(Debug, Clone)]
pub struct SliceTable {
    slices: [Slice; SLICE_COUNT],
    /// Lowest key that plays from the top of the material. 0 = unset.
    low_key: u8,
    /// The slice offset controllers act on.
    selected: Option<u8>,
}

impl Default for SliceTable {
    fn default() -> Self {
        SliceTable {
            slices: [Slice::default(); SLICE_COUNT],
            low_key: 0,
            selected: None,
        }
    }
}

impl SliceTable {
    pub fn get(&self, note: u8) -> Option<&Slice> {
        self.slices.get(note as usize)
    }

    pub fn get_mut(&mut self, note: u8) -> Option<&mut Slice> {
        self.slices.get_mut(note as usize)
    }

    pub fn low_key(&self) -> u8 {
        self.low_key
    }

    pub fn set_low_key(&mut self, note: u8) {
        self.low_key = note;
    }

    pub fn selected(&self) -> Option<u8> {
        self.selected
    }

    pub fn select(&mut self, note: u8) {
        self.selected = Some(note);
    }

    /// Sets an offset on the selected slice. Returns false when no slice is
    /// selected.
    pub fn set_selected_offset(&mut self, boundary: Boundary, offset: i8) -> bool {
        let offset = offset.clamp(OFFSET_MIN, OFFSET_MAX);
        let Some(slice) = self.selected.and_then(|note| self.slices.get_mut(note as usize)) else {
            return false;
        };
        match boundary {
            Boundary::Start => slice.start_offset = offset,
            Boundary::End => slice.end_offset = offset,
        }
        true
    }

    /// Records where a held slice was released.
    pub fn commit_end(&mut self, note: u8, end: usize) {
        if let Some(slice) = self.slices.get_mut(note as usize) {
            slice.end = end;
        }
    }
}

/// A sample resident in a channel slot or the snippet browser.
pub struct Sample {
    name: String,
    path: PathBuf,
    buffer: Arc<SampleBuffer>,
    slices: Arc<RwLock<SliceTable>>,
    /// Estimated tempo, 0 when unknown.
    bpm: f32,
}

impl Sample {
    pub fn new(path: &Path, buffer: SampleBuffer, bpm: f32) -> Sample {
        Sample {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.to_path_buf(),
            buffer: Arc::new(buffer),
            slices: Arc::new(RwLock::new(SliceTable::default())),
            bpm,
        }
    }

    /// Makes this sample share `other`'s slice table, so a reload of the same
    /// material keeps its slices and late end commits land in both.
    pub fn sharing_slices(mut self, other: &Sample) -> Sample {
        self.slices = other.slices.clone();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The material snapshot. Playback tasks hold onto this for their lifetime.
    pub fn buffer(&self) -> Arc<SampleBuffer> {
        self.buffer.clone()
    }

    /// Number of blocks of material.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn slices(&self) -> &RwLock<SliceTable> {
        &self.slices
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("name", &self.name)
            .field("blocks", &self.buffer.len())
            .field("bpm", &self.bpm)
            .finish()
    }
}
