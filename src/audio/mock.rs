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
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{AudioError, OutputDevice, StreamFormat};

/// A mock output. Doesn't play anything, but remembers every block written to
/// it and paces writes like a real device would.
pub struct Output {
    name: String,
    format: StreamFormat,
    blocks: Mutex<Vec<Vec<f32>>>,
    prepares: AtomicUsize,
    drains: AtomicUsize,
    write_delay: RwLock<Duration>,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl Output {
    /// Gets the given mock output. Writes return immediately until a delay is set.
    pub fn get(name: &str, format: StreamFormat) -> Output {
        Output {
            name: name.to_string(),
            format,
            blocks: Mutex::new(Vec::new()),
            prepares: AtomicUsize::new(0),
            drains: AtomicUsize::new(0),
            write_delay: RwLock::new(Duration::ZERO),
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Makes every write take `delay`, as if the device buffer were full.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.write() = delay;
    }

    /// Makes every write fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of blocks written so far.
    pub fn block_count(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Copies of the blocks written so far.
    pub fn blocks(&self) -> Vec<Vec<f32>> {
        self.blocks.lock().clone()
    }

    /// Forgets the blocks written so far.
    pub fn clear_blocks(&self) {
        self.blocks.lock().clear();
    }

    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::Relaxed)
    }

    pub fn drain_count(&self) -> usize {
        self.drains.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl OutputDevice for Output {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn prepare(&self) -> Result<(), AudioError> {
        if self.is_closed() {
            return Err(AudioError::Closed(self.name.clone()));
        }
        self.prepares.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, block: &[f32]) -> Result<usize, AudioError> {
        if self.is_closed() {
            return Err(AudioError::Closed(self.name.clone()));
        }
        let delay = *self.write_delay.read();
        if !delay.is_zero() {
            spin_sleep::sleep(delay);
        }
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(AudioError::Write(
                self.name.clone(),
                "injected failure".to_string(),
            ));
        }
        self.blocks.lock().push(block.to_vec());
        Ok(block.len() / self.format.channels.max(1) as usize)
    }

    fn drain(&self) {
        debug!(device = self.name, "Draining mock output");
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<&Output, Box<dyn Error>> {
        Ok(self)
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_blocks() {
        let output = Output::get("mock", StreamFormat::new(44100, 2, 4));
        output.prepare().unwrap();
        assert_eq!(output.write_block(&[0.5; 8]).unwrap(), 4);
        assert_eq!(output.block_count(), 1);
        assert_eq!(output.prepare_count(), 1);

        output.set_fail_writes(true);
        assert!(matches!(
            output.write_block(&[0.5; 8]),
            Err(AudioError::Write(_, _))
        ));
        assert_eq!(output.block_count(), 1);

        output.close();
        assert!(matches!(
            output.write_block(&[0.5; 8]),
            Err(AudioError::Closed(_))
        ));
    }
}
