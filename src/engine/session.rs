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
use std::{fmt, sync::Arc};

use crate::playsync::CHANNELS;
use crate::samples::Sample;

/// Program mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Notes preview the snippet folder, any number at once.
    #[default]
    Browse,
    /// Holding and releasing keys carves the channel's sample into slices.
    Edit,
    /// Keys play their slices once, to the end.
    Performance,
}

impl Mode {
    /// Maps a program change or mode controller value.
    pub fn from_value(value: u8) -> Option<Mode> {
        match value {
            0 => Some(Mode::Browse),
            1 => Some(Mode::Edit),
            2 => Some(Mode::Performance),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Browse => "browse",
            Mode::Edit => "edit",
            Mode::Performance => "performance",
        };
        f.write_str(name)
    }
}

/// Dispatcher state: the mode, the selected sample and the sample resident in
/// each channel slot.
#[derive(Debug, Default)]
pub struct Session {
    mode: Mode,
    selected: Option<Arc<Sample>>,
    current_channel: usize,
    slots: [Option<Arc<Sample>>; CHANNELS],
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Sets the mode, returning the previous one.
    pub fn set_mode(&mut self, mode: Mode) -> Mode {
        std::mem::replace(&mut self.mode, mode)
    }

    /// The sample offset controllers act on, and the one Edit mode reloads.
    pub fn selected(&self) -> Option<&Arc<Sample>> {
        self.selected.as_ref()
    }

    pub fn select(&mut self, sample: Arc<Sample>) {
        self.selected = Some(sample);
    }

    /// The channel of the most recent note.
    pub fn current_channel(&self) -> usize {
        self.current_channel
    }

    pub fn set_current_channel(&mut self, channel: usize) {
        if channel < CHANNELS {
            self.current_channel = channel;
        }
    }

    pub fn slot(&self, channel: usize) -> Option<&Arc<Sample>> {
        self.slots.get(channel).and_then(|slot| slot.as_ref())
    }

    /// Puts a sample in a channel slot, returning the one it replaces.
    pub fn load_slot(&mut self, channel: usize, sample: Arc<Sample>) -> Option<Arc<Sample>> {
        self.slots.get_mut(channel)?.replace(sample)
    }
}
