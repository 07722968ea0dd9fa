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

use super::ConfigError;

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
/// 2048 interleaved samples at two channels.
const DEFAULT_BLOCK_FRAMES: usize = 1024;
const DEFAULT_POOL_SIZE: usize = 5;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The cpal output device, or a name starting with "mock" for the mock output.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Output channel count (default: 2).
    channels: Option<u16>,

    /// Frames per block. Material is chopped into blocks of this size and
    /// every cancellation check happens on a block boundary.
    block_frames: Option<usize>,

    /// Number of handles Browse mode rotates through (default: 5).
    pool_size: Option<usize>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Audio {
        self.pool_size = Some(pool_size);
        self
    }

    pub fn with_block_frames(mut self, block_frames: usize) -> Audio {
        self.block_frames = Some(block_frames);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the output sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2).
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    /// Returns the frames per block (default: 1024).
    pub fn block_frames(&self) -> usize {
        self.block_frames.unwrap_or(DEFAULT_BLOCK_FRAMES)
    }

    /// Returns the Browse pool size (default: 5).
    pub fn pool_size(&self) -> usize {
        self.pool_size.unwrap_or(DEFAULT_POOL_SIZE)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid("audio.sample_rate must be > 0".into()));
        }
        if self.channels() == 0 {
            return Err(ConfigError::Invalid("audio.channels must be > 0".into()));
        }
        if self.block_frames() == 0 {
            return Err(ConfigError::Invalid("audio.block_frames must be > 0".into()));
        }
        if self.pool_size() == 0 {
            return Err(ConfigError::Invalid("audio.pool_size must be > 0".into()));
        }
        Ok(())
    }
}
