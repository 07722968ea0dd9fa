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
use std::{error::Error, fmt, sync::Arc, time::Duration};

use crate::config;

pub mod cpal;
pub mod mock;
pub mod pool;
pub mod sample_source;
pub mod thread_priority;

pub use pool::VoicePool;

/// The negotiated format of an output stream. Every block written to a device
/// is `block_frames * channels` interleaved f32 samples or fewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_frames: usize,
}

impl StreamFormat {
    /// Creates a new stream format.
    pub fn new(sample_rate: u32, channels: u16, block_frames: usize) -> StreamFormat {
        StreamFormat {
            sample_rate,
            channels,
            block_frames,
        }
    }

    /// Number of interleaved samples in a full block.
    pub fn block_samples(&self) -> usize {
        self.block_frames * self.channels as usize
    }

    /// How long a full block takes to play.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_frames as f64 / self.sample_rate as f64)
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{} frames",
            self.sample_rate, self.channels, self.block_frames
        )
    }
}

/// Errors reported by output devices.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no device found with name {0}")]
    NotFound(String),

    #[error("unable to open device {0}: {1}")]
    Open(String, String),

    #[error("device {0} did not accept a block within {1:?}")]
    Timeout(String, Duration),

    #[error("device {0} is closed")]
    Closed(String),

    #[error("device {0} rejected the write: {1}")]
    Write(String, String),
}

/// An output handle that accepts blocks of interleaved audio.
///
/// Handles are shared between playback tasks, so every operation takes `&self`.
pub trait OutputDevice: fmt::Display + Send + Sync {
    /// The format negotiated when the handle was opened.
    fn format(&self) -> StreamFormat;

    /// Readies the handle for a new stream of blocks.
    fn prepare(&self) -> Result<(), AudioError>;

    /// Writes a block, waiting for room in the device buffer if necessary.
    /// Returns the number of frames accepted.
    fn write_block(&self, block: &[f32]) -> Result<usize, AudioError>;

    /// Drops every frame that has been written but not yet played.
    fn drain(&self);

    /// Closes the handle. Further writes fail with `AudioError::Closed`.
    fn close(&self);

    #[cfg(test)]
    fn to_mock(&self) -> Result<&mock::Output, Box<dyn Error>>;
}

/// Lists the output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, Box<dyn Error>> {
    cpal::list()
}

/// Opens `count` independent handles on the configured device.
pub fn open_outputs(
    config: &config::Audio,
    count: usize,
) -> Result<Vec<Arc<dyn OutputDevice>>, Box<dyn Error>> {
    let format = StreamFormat::new(
        config.sample_rate(),
        config.channels(),
        config.block_frames(),
    );
    let device = config.device();

    (0..count)
        .map(|index| -> Result<Arc<dyn OutputDevice>, Box<dyn Error>> {
            if device.starts_with("mock") {
                return Ok(Arc::new(mock::Output::get(
                    &format!("{}-{}", device, index),
                    format,
                )));
            }
            Ok(Arc::new(cpal::Output::open(device, format)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_format() {
        let format = StreamFormat::new(44100, 2, 1024);
        assert_eq!(format.block_samples(), 2048);
        assert_eq!(format.to_string(), "44100Hz/2ch/1024 frames");
        let millis = format.block_duration().as_secs_f64() * 1000.0;
        assert!((millis - 23.22).abs() < 0.01);
    }

    #[test]
    fn test_open_mock_outputs() {
        let config = config::Audio::new("mock-output");
        let outputs = open_outputs(&config, 3).unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].to_string(), "mock-output-0 (Mock)");
        assert_eq!(outputs[2].format(), StreamFormat::new(44100, 2, 1024));
    }
}
