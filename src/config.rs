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
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

mod audio;
mod controls;
mod error;
mod midi;
mod samples;
mod stretch;

pub use self::audio::Audio;
pub use self::controls::Controls;
pub use self::error::ConfigError;
pub use self::midi::Midi;
pub use self::samples::Samples;
pub use self::stretch::{Stretch, CHANGE_RANGE, PITCH_RANGE};

/// Prefix for environment overrides, e.g. CHOPOGY_AUDIO__DEVICE=mock.
const ENV_PREFIX: &str = "CHOPOGY";

/// The engine configuration. Every section and key is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    #[serde(default)]
    audio: Audio,
    #[serde(default)]
    midi: Midi,
    #[serde(default)]
    samples: Samples,
    #[serde(default)]
    controls: Controls,
    #[serde(default)]
    stretch: Stretch,
}

impl Engine {
    /// Loads the configuration from an optional YAML file, then applies
    /// CHOPOGY_ environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Engine, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading engine configuration");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let engine: Engine = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        engine.validate()?;
        Ok(engine)
    }

    /// Parses a configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Engine, ConfigError> {
        let engine: Engine = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        engine.validate()?;
        Ok(engine)
    }

    pub fn with_audio(mut self, audio: Audio) -> Engine {
        self.audio = audio;
        self
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn midi(&self) -> &Midi {
        &self.midi
    }

    pub fn midi_mut(&mut self) -> &mut Midi {
        &mut self.midi
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn stretch(&self) -> &Stretch {
        &self.stretch
    }

    /// Applies command line stretch settings on top of the loaded ones.
    pub fn override_stretch(&mut self, overrides: &Stretch) -> Result<(), ConfigError> {
        self.stretch.override_with(overrides);
        self.stretch.validate()
    }

    /// Checks ranges that serde can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.controls.validate()?;
        self.stretch.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let engine = Engine::from_yaml("{}").unwrap();
        assert_eq!(engine.audio().device(), "default");
        assert_eq!(engine.audio().sample_rate(), 44100);
        assert_eq!(engine.audio().channels(), 2);
        assert_eq!(engine.audio().block_frames(), 1024);
        assert_eq!(engine.audio().pool_size(), 5);
        assert_eq!(engine.midi().device(), None);
        assert_eq!(engine.samples().preview_blocks(), 100);
        assert_eq!(engine.controls().mode(), 0x50);
        assert_eq!(engine.controls().slice_start(), 0x51);
        assert_eq!(engine.controls().slice_end(), 0x5b);
        assert_eq!(engine.controls().tempo(), 0x12);
        assert_eq!(engine.controls().pitch(), 0x13);
        assert_eq!(engine.controls().rate(), 0x01);
        assert_eq!(engine.stretch().tempo(), 0);
        assert!(engine.stretch().anti_alias());
        assert!(!engine.stretch().quick_seek());
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
            audio:
              device: mock-card
              sample_rate: 48000
              channels: 1
              block_frames: 512
              pool_size: 3
            midi:
              device: Choppage
            samples:
              preview_blocks: 20
            controls:
              mode: 20
              tempo: 21
            stretch:
              tempo: 50
              pitch: -12
              quick_seek: true
              speech: true
        "#;
        let engine = Engine::from_yaml(yaml).unwrap();
        assert_eq!(engine.audio().device(), "mock-card");
        assert_eq!(engine.audio().sample_rate(), 48000);
        assert_eq!(engine.audio().channels(), 1);
        assert_eq!(engine.audio().block_frames(), 512);
        assert_eq!(engine.audio().pool_size(), 3);
        assert_eq!(engine.midi().device(), Some("Choppage"));
        assert_eq!(engine.samples().preview_blocks(), 20);
        assert_eq!(engine.controls().mode(), 20);
        assert_eq!(engine.controls().tempo(), 21);
        assert_eq!(engine.controls().pitch(), 0x13);
        assert_eq!(engine.stretch().tempo(), 50);
        assert_eq!(engine.stretch().pitch(), -12);
        assert!(engine.stretch().quick_seek());
        assert!(engine.stretch().speech());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Engine::from_yaml("stretch:\n  pitch: 61\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Engine::from_yaml("stretch:\n  tempo: -96\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Engine::from_yaml("audio:\n  pool_size: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Engine::from_yaml("controls:\n  tempo: 81\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Engine::from_yaml("controls:\n  rate: 200\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Engine::from_yaml("audio: [1, 2]"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_load_file_and_overrides() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "stretch:\n  tempo: 10\n  rate: 5").unwrap();

        let mut engine = Engine::load(Some(file.path())).unwrap();
        assert_eq!(engine.stretch().tempo(), 10);

        engine
            .override_stretch(&Stretch::new(Some(-20), Some(7), None, None, None, None))
            .unwrap();
        assert_eq!(engine.stretch().tempo(), -20);
        assert_eq!(engine.stretch().pitch(), 7);
        assert_eq!(engine.stretch().rate(), 5);

        assert!(engine
            .override_stretch(&Stretch::new(None, Some(100), None, None, None, None))
            .is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Engine::load(Some(Path::new("/nonexistent/chopogy.yaml"))),
            Err(ConfigError::Load(_))
        ));
    }
}
