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

//! The shared tempo/pitch/rate stage every playback voice pulls through.
//!
//! Rate and pitch are applied by resampling, tempo by WSOLA. Pitch is
//! resampling followed by the inverse tempo change, so duration is kept.

use std::fmt;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config;

mod transposer;
mod wsola;

use self::transposer::RateTransposer;
use self::wsola::Wsola;

/// Live stage parameters, as sent by the control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchParams {
    /// Tempo change in percent. 100 doubles the tempo.
    pub tempo_change: f32,
    /// Pitch change in semitones.
    pub pitch_semitones: f32,
    /// Rate change in percent, affecting tempo and pitch together.
    pub rate_change: f32,
}

impl StretchParams {
    /// Smallest processing factor the stage will apply.
    pub const MIN_FACTOR: f64 = 0.1;
    /// Largest processing factor the stage will apply.
    pub const MAX_FACTOR: f64 = 10.0;

    pub fn new(tempo_change: f32, pitch_semitones: f32, rate_change: f32) -> StretchParams {
        StretchParams {
            tempo_change,
            pitch_semitones,
            rate_change,
        }
    }

    /// Check if any processing is needed.
    pub fn is_active(&self) -> bool {
        self.tempo_change.abs() > 1e-3
            || self.pitch_semitones.abs() > 1e-3
            || self.rate_change.abs() > 1e-3
    }

    pub fn tempo_factor(&self) -> f64 {
        1.0 + self.tempo_change as f64 / 100.0
    }

    pub fn rate_factor(&self) -> f64 {
        1.0 + self.rate_change as f64 / 100.0
    }

    pub fn pitch_factor(&self) -> f64 {
        2.0f64.powf(self.pitch_semitones as f64 / 12.0)
    }

    /// Resampling factor applied by the transposer.
    pub fn transpose_factor(&self) -> f64 {
        (self.rate_factor() * self.pitch_factor()).clamp(Self::MIN_FACTOR, Self::MAX_FACTOR)
    }

    /// Tempo ratio applied by WSOLA after transposing.
    pub fn stretch_factor(&self) -> f64 {
        (self.tempo_factor() / self.pitch_factor()).clamp(Self::MIN_FACTOR, Self::MAX_FACTOR)
    }
}

impl Default for StretchParams {
    fn default() -> Self {
        StretchParams::new(0.0, 0.0, 0.0)
    }
}

impl fmt::Display for StretchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tempo {:+}%, pitch {:+} st, rate {:+}%",
            self.tempo_change, self.pitch_semitones, self.rate_change
        )
    }
}

/// Processing settings fixed for the life of the stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchSettings {
    pub quick_seek: bool,
    pub anti_alias: bool,
    pub sequence_ms: f64,
    pub seek_window_ms: f64,
    pub overlap_ms: f64,
}

impl StretchSettings {
    /// Shorter windows that keep speech intelligible.
    pub fn speech() -> StretchSettings {
        StretchSettings {
            sequence_ms: 40.0,
            seek_window_ms: 15.0,
            overlap_ms: 8.0,
            ..Default::default()
        }
    }

    pub fn from_config(config: &config::Stretch) -> StretchSettings {
        let base = if config.speech() {
            StretchSettings::speech()
        } else {
            StretchSettings::default()
        };
        StretchSettings {
            quick_seek: config.quick_seek(),
            anti_alias: config.anti_alias(),
            ..base
        }
    }
}

impl Default for StretchSettings {
    fn default() -> Self {
        StretchSettings {
            quick_seek: false,
            anti_alias: true,
            sequence_ms: 82.0,
            seek_window_ms: 28.0,
            overlap_ms: 8.0,
        }
    }
}

struct Pipeline {
    transposer: RateTransposer,
    wsola: Wsola,
    transposed: Vec<f32>,
}

impl Pipeline {
    fn clear(&mut self) {
        self.transposer.clear();
        self.wsola.clear();
        self.transposed.clear();
    }
}

/// A single tempo/pitch/rate processor shared by every playback voice.
///
/// Parameter updates take effect on the next block any voice pushes through.
/// Voices share the processing state too, so two voices sounding at once will
/// hear each other's material in the stage.
pub struct TimeStretch {
    channels: usize,
    settings: StretchSettings,
    params: RwLock<StretchParams>,
    pipeline: Mutex<Pipeline>,
}

impl TimeStretch {
    pub fn new(
        sample_rate: u32,
        channels: u16,
        settings: StretchSettings,
        params: StretchParams,
    ) -> TimeStretch {
        let channels = channels.max(1) as usize;
        TimeStretch {
            channels,
            settings,
            params: RwLock::new(params),
            pipeline: Mutex::new(Pipeline {
                transposer: RateTransposer::new(channels),
                wsola: Wsola::new(sample_rate, channels, &settings),
                transposed: Vec::new(),
            }),
        }
    }

    /// Builds the stage from the configured initial settings.
    pub fn from_config(sample_rate: u32, channels: u16, config: &config::Stretch) -> TimeStretch {
        TimeStretch::new(
            sample_rate,
            channels,
            StretchSettings::from_config(config),
            StretchParams::new(
                config.tempo() as f32,
                config.pitch() as f32,
                config.rate() as f32,
            ),
        )
    }

    pub fn params(&self) -> StretchParams {
        *self.params.read()
    }

    pub fn settings(&self) -> StretchSettings {
        self.settings
    }

    /// Changes tempo, keeping pitch.
    pub fn set_tempo_change(&self, percent: f32) {
        self.params.write().tempo_change = percent;
        debug!(tempo = percent, "Stage tempo changed");
    }

    /// Changes pitch, keeping tempo.
    pub fn set_pitch_semitones(&self, semitones: f32) {
        self.params.write().pitch_semitones = semitones;
        debug!(pitch = semitones, "Stage pitch changed");
    }

    /// Changes tempo and pitch together.
    pub fn set_rate_change(&self, percent: f32) {
        self.params.write().rate_change = percent;
        debug!(rate = percent, "Stage rate changed");
    }

    /// Drops all buffered material.
    pub fn clear(&self) {
        self.pipeline.lock().clear();
    }

    /// Frames held inside the stage.
    pub fn buffered_frames(&self) -> usize {
        self.pipeline.lock().wsola.buffered_frames()
    }

    /// Pushes one interleaved block in and pulls every frame the stage has
    /// ready into `output`, which is cleared first. A slowed tempo yields more
    /// frames than it was given. Returns the frame count.
    pub fn process(&self, input: &[f32], output: &mut Vec<f32>) -> usize {
        let params = self.params();
        let frames = input.len() / self.channels;
        output.clear();

        let mut pipeline = self.pipeline.lock();
        if !params.is_active() {
            if pipeline.wsola.buffered_frames() > 0 {
                pipeline.clear();
            }
            output.extend_from_slice(&input[..frames * self.channels]);
            return frames;
        }

        let Pipeline {
            transposer,
            wsola,
            transposed,
        } = &mut *pipeline;
        transposed.clear();
        transposer.process(
            &input[..frames * self.channels],
            params.transpose_factor(),
            self.settings.anti_alias,
            transposed,
        );
        wsola.set_tempo(params.stretch_factor());
        wsola.put_samples(transposed);
        wsola.receive_samples(output, usize::MAX)
    }
}

impl fmt::Debug for TimeStretch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeStretch")
            .field("channels", &self.channels)
            .field("settings", &self.settings)
            .field("params", &self.params())
            .finish()
    }
}
