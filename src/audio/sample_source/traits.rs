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

/// A decoder that yields interleaved f32 samples a block at a time.
pub trait BlockDecoder: Send {
    /// Fills `output` with the next interleaved samples. Returns the number of
    /// samples written, which is less than `output.len()` only at the end of
    /// the stream. A return of 0 means the stream is exhausted.
    fn read_block(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError>;

    /// Get the number of channels in this stream
    fn channel_count(&self) -> u16;

    /// Get the sample rate of this stream
    fn sample_rate(&self) -> u32;

    /// Get the bits per sample of the underlying material
    fn bits_per_sample(&self) -> u16;
}

impl BlockDecoder for Box<dyn BlockDecoder> {
    fn read_block(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        (**self).read_block(output)
    }

    fn channel_count(&self) -> u16 {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn bits_per_sample(&self) -> u16 {
        (**self).bits_per_sample()
    }
}
