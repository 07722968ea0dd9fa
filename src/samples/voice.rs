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

//! Playback voices.
//!
//! A voice is one thread streaming a block range to an output handle. Voices
//! stop themselves when their cancel handle goes stale; the manager only keeps
//! their join handles so every thread is accounted for.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use tracing::{debug, error, info, span, warn, Level};

use super::slice::Resolved;
use super::store::Sample;
use crate::audio::{thread_priority, AudioError, OutputDevice};
use crate::engine::Mode;
use crate::playsync::{CancelHandle, ChannelTokens, CHANNELS};
use crate::stretch::TimeStretch;

/// Blocks trimmed off a slice end committed by a release, so the slice stops
/// short of the key-up click.
pub const RELEASE_GUARD_BLOCKS: usize = 3;

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Everything a voice thread needs.
pub struct Playback {
    pub sample: Arc<Sample>,
    pub range: Resolved,
    pub mode: Mode,
    pub device: Arc<dyn OutputDevice>,
    pub stage: Arc<TimeStretch>,
    pub cancel_handle: CancelHandle,
}

/// How a voice ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub blocks_written: usize,
    pub preempted: bool,
    /// The slice end committed on an Edit-mode release.
    pub committed_end: Option<usize>,
}

/// Drains and re-prepares the device unless disarmed, so a voice that stops
/// early never leaves stale frames behind.
struct DeviceRelease<'a> {
    device: &'a dyn OutputDevice,
    armed: bool,
}

impl Drop for DeviceRelease<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.device.drain();
        if let Err(e) = self.device.prepare() {
            debug!(device = %self.device, err = %e, "Unable to re-prepare device");
        }
    }
}

/// Streams the playback range, checking for preemption before every block.
pub fn play(playback: Playback) -> PlaybackReport {
    let Playback {
        sample,
        range,
        mode,
        device,
        stage,
        cancel_handle,
    } = playback;

    let span = span!(Level::DEBUG, "voice", channel = cancel_handle.channel());
    let _enter = span.enter();

    let buffer = sample.buffer();
    let mut release = DeviceRelease {
        device: device.as_ref(),
        armed: true,
    };
    let mut report = PlaybackReport {
        blocks_written: 0,
        preempted: false,
        committed_end: None,
    };
    let block_samples = buffer.format().block_samples().max(1);
    let mut output = Vec::with_capacity(block_samples);

    debug!(
        sample = sample.name(),
        start = range.start,
        end = range.end,
        %mode,
        device = %device,
        "Voice started"
    );

    'blocks: for index in range.start..range.end {
        if cancel_handle.is_cancelled() {
            report.preempted = true;
            if mode == Mode::Edit {
                if let Some(note) = range.note {
                    let end = index.saturating_sub(RELEASE_GUARD_BLOCKS);
                    sample.slices().write().commit_end(note, end);
                    report.committed_end = Some(end);
                    info!(note, end, sample = sample.name(), "Slice end set");
                }
            }
            break;
        }

        let Some(block) = buffer.block(index) else {
            break;
        };
        if stage.process(block, &mut output) == 0 {
            continue;
        }

        // A slowed stage hands back more than a block.
        for chunk in output.chunks(block_samples) {
            match device.write_block(chunk) {
                Ok(_) => report.blocks_written += 1,
                Err(AudioError::Closed(name)) => {
                    warn!(device = name, "Device closed, stopping voice");
                    report.preempted = true;
                    break 'blocks;
                }
                Err(e) => error!(err = %e, block = index, "Dropped block"),
            }
        }
    }

    release.armed = report.preempted;
    debug!(
        blocks = report.blocks_written,
        preempted = report.preempted,
        "Voice finished"
    );
    report
}

/// A running playback thread.
pub struct Voice {
    id: u64,
    note: u8,
    sample_name: String,
    started: Instant,
    cancel_handle: CancelHandle,
    handle: Option<JoinHandle<PlaybackReport>>,
}

impl Voice {
    /// Starts a voice thread for `playback`, raising its priority first.
    pub fn spawn(note: u8, playback: Playback) -> std::io::Result<Voice> {
        let id = NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed);
        let cancel_handle = playback.cancel_handle.clone();
        let sample_name = playback.sample.name().to_string();
        let handle = thread::Builder::new()
            .name(format!("voice-{}-{}", cancel_handle.channel(), id))
            .spawn(move || {
                thread_priority::promote_current_thread(
                    thread_priority::audio_thread_priority(),
                    thread_priority::rt_audio_enabled(),
                );
                play(playback)
            })?;

        Ok(Voice {
            id,
            note,
            sample_name,
            started: Instant::now(),
            cancel_handle,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn channel(&self) -> usize {
        self.cancel_handle.channel()
    }

    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_handle.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Waits for the thread. Returns None if it was already joined or panicked.
    pub fn join(&mut self) -> Option<PlaybackReport> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(report) => {
                debug!(
                    voice = self.id,
                    sample = self.sample_name,
                    elapsed_ms = self.started.elapsed().as_millis(),
                    blocks = report.blocks_written,
                    "Voice joined"
                );
                Some(report)
            }
            Err(_) => {
                error!(voice = self.id, sample = self.sample_name, "Voice panicked");
                None
            }
        }
    }
}

/// Keeps the join handle of the latest voice per channel plus the voices they
/// replaced, until those finish.
pub struct VoiceManager {
    channels: Vec<Option<Voice>>,
    retired: Vec<Voice>,
}

impl VoiceManager {
    pub fn new() -> VoiceManager {
        VoiceManager {
            channels: (0..CHANNELS).map(|_| None).collect(),
            retired: Vec::new(),
        }
    }

    /// Records a voice as its channel's latest. The voice it replaces is
    /// retired; its token is already stale.
    pub fn add(&mut self, voice: Voice) {
        let Some(slot) = self.channels.get_mut(voice.channel()) else {
            warn!(channel = voice.channel(), "Voice on unknown channel");
            self.retired.push(voice);
            return;
        };
        if let Some(previous) = slot.replace(voice) {
            self.retired.push(previous);
        }
    }

    /// The latest voice on `channel`.
    pub fn latest(&self, channel: usize) -> Option<&Voice> {
        self.channels.get(channel).and_then(|slot| slot.as_ref())
    }

    /// Joins every finished voice without blocking. Returns how many were
    /// joined.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        let (mut finished, running): (Vec<Voice>, Vec<Voice>) = self
            .retired
            .drain(..)
            .partition(|voice| voice.is_finished());
        self.retired = running;
        for slot in self.channels.iter_mut() {
            if slot.as_ref().is_some_and(|voice| voice.is_finished()) {
                if let Some(voice) = slot.take() {
                    finished.push(voice);
                }
            }
        }
        for mut voice in finished {
            voice.join();
            reaped += 1;
        }
        reaped
    }

    /// Voices that haven't been reaped.
    pub fn len(&self) -> usize {
        self.channels.iter().flatten().count() + self.retired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every voice and waits for all of them.
    pub fn shutdown(&mut self, tokens: &ChannelTokens) {
        tokens.bump_all();
        let voices: Vec<Voice> = self
            .channels
            .iter_mut()
            .filter_map(|slot| slot.take())
            .chain(self.retired.drain(..))
            .collect();
        let count = voices.len();
        for mut voice in voices {
            voice.join();
        }
        info!(voices = count, "Voices shut down");
    }
}

impl Default for VoiceManager {
    fn default() -> Self {
        VoiceManager::new()
    }
}
