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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tracing::info;

use super::{OutputDevice, StreamFormat};
use crate::config;
use crate::playsync::CHANNELS;

/// A fixed set of output handles opened at startup.
///
/// Browse-mode voices take handles round robin, so up to `len()` previews can
/// sound at once. Edit and Performance playback get one handle per channel
/// slot, never handed out by the rotation, so channels sound together and a
/// drain on one channel leaves the others alone.
pub struct VoicePool {
    outputs: Vec<Arc<dyn OutputDevice>>,
    channels: Vec<Arc<dyn OutputDevice>>,
    cursor: AtomicUsize,
}

impl VoicePool {
    /// Opens `pool_size` rotating handles plus one handle per channel.
    pub fn open(config: &config::Audio) -> Result<VoicePool, Box<dyn Error>> {
        let pool_size = config.pool_size().max(1);
        let mut outputs = super::open_outputs(config, pool_size + CHANNELS)?;
        let channels = outputs.split_off(pool_size);
        let pool = VoicePool::new(outputs, channels)?;
        info!(
            handles = pool.len(),
            channels = CHANNELS,
            format = %pool.format(),
            "Opened voice pool"
        );
        Ok(pool)
    }

    /// Builds a pool from already opened handles.
    pub fn new(
        outputs: Vec<Arc<dyn OutputDevice>>,
        channels: Vec<Arc<dyn OutputDevice>>,
    ) -> Result<VoicePool, Box<dyn Error>> {
        if outputs.is_empty() {
            return Err("a voice pool needs at least one output".into());
        }
        if channels.len() != CHANNELS {
            return Err(format!(
                "a voice pool needs {} channel outputs, got {}",
                CHANNELS,
                channels.len()
            )
            .into());
        }
        Ok(VoicePool {
            outputs,
            channels,
            // The first acquisition lands on handle 0.
            cursor: AtomicUsize::new(usize::MAX),
        })
    }

    /// Advances the cursor and returns the handle it lands on. Whatever was
    /// playing there is the caller's to cancel.
    pub fn acquire_round_robin(&self) -> (usize, Arc<dyn OutputDevice>) {
        let len = self.outputs.len();
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some(cursor.wrapping_add(1) % len)
            })
            .unwrap_or(0);
        let index = previous.wrapping_add(1) % len;
        (index, self.outputs[index].clone())
    }

    /// The handle Edit and Performance playback use on `channel`.
    pub fn channel(&self, channel: usize) -> Option<Arc<dyn OutputDevice>> {
        self.channels.get(channel).cloned()
    }

    pub fn output(&self, index: usize) -> Option<Arc<dyn OutputDevice>> {
        self.outputs.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn format(&self) -> StreamFormat {
        self.outputs[0].format()
    }

    /// Closes every handle, channel handles included.
    pub fn close(&self) {
        for output in self.outputs.iter().chain(self.channels.iter()) {
            output.close();
        }
    }
}

impl fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoicePool")
            .field("outputs", &self.outputs.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
