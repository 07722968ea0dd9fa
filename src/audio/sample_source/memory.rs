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
use super::error::SampleSourceError;
use super::traits::BlockDecoder;

/// A decoder over interleaved samples held in memory.
/// Useful for tests and for material generated at runtime.
pub struct MemoryDecoder {
    samples: Vec<f32>,
    position: usize,
    channel_count: u16,
    sample_rate: u32,
}

impl MemoryDecoder {
    /// Creates a new memory decoder from interleaved samples.
    pub fn new(samples: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            channel_count,
            sample_rate,
        }
    }
}

impl BlockDecoder for MemoryDecoder {
    fn read_block(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        let remaining = &self.samples[self.position..];
        let to_copy = remaining.len().min(output.len());
        output[..to_copy].copy_from_slice(&remaining[..to_copy]);
        self.position += to_copy;
        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        32
    }
}
