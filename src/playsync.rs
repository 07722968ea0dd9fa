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

//! Per-channel generation tokens used to preempt playback cooperatively.
//!
//! Every trigger on a channel bumps that channel's counter and the spawned
//! playback task keeps the post-bump value. A task is current only while the
//! counter still equals its token; any other value means it has been replaced
//! or released and must stop before writing its next block.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of independent performance channels.
pub const CHANNELS: usize = 16;

/// The identity a playback task captured when it was spawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// Returns the raw generation value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The generation counters for every channel.
pub struct ChannelTokens {
    counters: [AtomicU64; CHANNELS],
}

impl ChannelTokens {
    /// Creates a new set of counters, all at generation zero.
    pub fn new() -> ChannelTokens {
        ChannelTokens {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Invalidates whatever is playing on the channel and returns the new token.
    pub fn bump(&self, channel: usize) -> Token {
        Token(self.counters[channel].fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Bumps every channel. Used on shutdown to stop all playback.
    pub fn bump_all(&self) {
        for channel in 0..CHANNELS {
            self.bump(channel);
        }
    }

    /// Returns the current token for the channel.
    pub fn current(&self, channel: usize) -> Token {
        Token(self.counters[channel].load(Ordering::Acquire))
    }

    /// Returns true if the token is still the live generation for the channel.
    pub fn is_current(&self, channel: usize, token: Token) -> bool {
        self.current(channel) == token
    }
}

impl Default for ChannelTokens {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChannelTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<u64> = self
            .counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();
        f.debug_struct("ChannelTokens")
            .field("counters", &values)
            .finish()
    }
}

/// A cancel handle is handed to a playback task. It's the task's responsibility
/// to check it before every block it writes.
#[derive(Clone)]
pub struct CancelHandle {
    tokens: Arc<ChannelTokens>,
    channel: usize,
    token: Token,
}

impl CancelHandle {
    /// Creates a handle for a task that captured the given token.
    pub fn new(tokens: Arc<ChannelTokens>, channel: usize, token: Token) -> CancelHandle {
        CancelHandle {
            tokens,
            channel,
            token,
        }
    }

    /// Returns true once a newer trigger or a release has replaced this task.
    pub fn is_cancelled(&self) -> bool {
        !self.tokens.is_current(self.channel, self.token)
    }

    /// The channel this handle belongs to.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The token captured at spawn time.
    pub fn token(&self) -> Token {
        self.token
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("channel", &self.channel)
            .field("token", &self.token)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
