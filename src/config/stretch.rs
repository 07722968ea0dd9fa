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
use std::ops::RangeInclusive;

use serde::Deserialize;

use super::ConfigError;

/// Accepted tempo and rate changes, in percent.
pub const CHANGE_RANGE: RangeInclusive<i32> = -95..=5000;
/// Accepted pitch changes, in semitones.
pub const PITCH_RANGE: RangeInclusive<i32> = -60..=60;

/// Initial settings of the shared time-stretch stage.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Stretch {
    /// Tempo change in percent.
    tempo: Option<i32>,
    /// Pitch change in semitones.
    pitch: Option<i32>,
    /// Playback rate change in percent.
    rate: Option<i32>,
    /// Use the faster, coarser overlap search.
    quick_seek: Option<bool>,
    /// Low-pass the material before shrinking it (default: true).
    anti_alias: Option<bool>,
    /// Use window sizes tuned for speech.
    speech: Option<bool>,
}

impl Stretch {
    pub fn new(
        tempo: Option<i32>,
        pitch: Option<i32>,
        rate: Option<i32>,
        quick_seek: Option<bool>,
        anti_alias: Option<bool>,
        speech: Option<bool>,
    ) -> Stretch {
        Stretch {
            tempo,
            pitch,
            rate,
            quick_seek,
            anti_alias,
            speech,
        }
    }

    /// Replaces every setting that `other` specifies.
    pub fn override_with(&mut self, other: &Stretch) {
        self.tempo = other.tempo.or(self.tempo);
        self.pitch = other.pitch.or(self.pitch);
        self.rate = other.rate.or(self.rate);
        self.quick_seek = other.quick_seek.or(self.quick_seek);
        self.anti_alias = other.anti_alias.or(self.anti_alias);
        self.speech = other.speech.or(self.speech);
    }

    pub fn tempo(&self) -> i32 {
        self.tempo.unwrap_or(0)
    }

    pub fn pitch(&self) -> i32 {
        self.pitch.unwrap_or(0)
    }

    pub fn rate(&self) -> i32 {
        self.rate.unwrap_or(0)
    }

    pub fn quick_seek(&self) -> bool {
        self.quick_seek.unwrap_or(false)
    }

    pub fn anti_alias(&self) -> bool {
        self.anti_alias.unwrap_or(true)
    }

    pub fn speech(&self) -> bool {
        self.speech.unwrap_or(false)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !CHANGE_RANGE.contains(&self.tempo()) {
            return Err(ConfigError::Invalid(format!(
                "stretch.tempo must be in {:?}, got {}",
                CHANGE_RANGE,
                self.tempo()
            )));
        }
        if !CHANGE_RANGE.contains(&self.rate()) {
            return Err(ConfigError::Invalid(format!(
                "stretch.rate must be in {:?}, got {}",
                CHANGE_RANGE,
                self.rate()
            )));
        }
        if !PITCH_RANGE.contains(&self.pitch()) {
            return Err(ConfigError::Invalid(format!(
                "stretch.pitch must be in {:?}, got {}",
                PITCH_RANGE,
                self.pitch()
            )));
        }
        Ok(())
    }
}
