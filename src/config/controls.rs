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

// Controller layout of the Choppage surface.
const DEFAULT_MODE: u8 = 0x50;
const DEFAULT_SLICE_START: u8 = 0x51;
const DEFAULT_SLICE_END: u8 = 0x5b;
const DEFAULT_TEMPO: u8 = 0x12;
const DEFAULT_PITCH: u8 = 0x13;
const DEFAULT_RATE: u8 = 0x01;

/// Controller numbers the dispatcher listens to.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Controls {
    mode: Option<u8>,
    slice_start: Option<u8>,
    slice_end: Option<u8>,
    tempo: Option<u8>,
    pitch: Option<u8>,
    rate: Option<u8>,
}

impl Controls {
    pub fn mode(&self) -> u8 {
        self.mode.unwrap_or(DEFAULT_MODE)
    }

    pub fn slice_start(&self) -> u8 {
        self.slice_start.unwrap_or(DEFAULT_SLICE_START)
    }

    pub fn slice_end(&self) -> u8 {
        self.slice_end.unwrap_or(DEFAULT_SLICE_END)
    }

    pub fn tempo(&self) -> u8 {
        self.tempo.unwrap_or(DEFAULT_TEMPO)
    }

    pub fn pitch(&self) -> u8 {
        self.pitch.unwrap_or(DEFAULT_PITCH)
    }

    pub fn rate(&self) -> u8 {
        self.rate.unwrap_or(DEFAULT_RATE)
    }

    /// Controller numbers must be 7-bit and distinct.
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("mode", self.mode()),
            ("slice_start", self.slice_start()),
            ("slice_end", self.slice_end()),
            ("tempo", self.tempo()),
            ("pitch", self.pitch()),
            ("rate", self.rate()),
        ];
        for (i, (name, number)) in all.iter().enumerate() {
            if *number > 127 {
                return Err(ConfigError::Invalid(format!(
                    "controls.{} must be in 0..=127, got {}",
                    name, number
                )));
            }
            if let Some((other, _)) = all[..i].iter().find(|(_, n)| n == number) {
                return Err(ConfigError::Invalid(format!(
                    "controls.{} and controls.{} both use controller {}",
                    other, name, number
                )));
            }
        }
        Ok(())
    }
}
