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

//! Sample discovery and loading.
//!
//! Material is decoded, converted to the output stream format and chopped into
//! blocks up front, so playback never decodes.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use rayon::prelude::*;
use tracing::{debug, info};

use super::store::{Sample, SampleBuffer};
use super::tempo::{EnvelopeTempoEstimator, TempoEstimator};
use crate::audio::{
    sample_source::{AudioFileDecoder, BlockDecoder, SampleSourceError},
    StreamFormat,
};

/// Extensions the loader picks up when scanning a folder.
const AUDIO_EXTENSIONS: &[&str] = &["wav", "wave", "flac", "mp3", "ogg", "aif", "aiff"];

/// Frames requested from the decoder per read.
const DECODE_FRAMES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: SampleSourceError,
    },

    #[error("no audio files found in {0}")]
    Empty(PathBuf),
}

/// Lists the audio files at `path`, sorted by name. A file path yields itself.
pub fn discover(path: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_error = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    if fs::metadata(path).map_err(io_error)?.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(io_error)? {
        let entry_path = entry.map_err(io_error)?.path();
        let is_audio = entry_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                AUDIO_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if is_audio && entry_path.is_file() {
            files.push(entry_path);
        }
    }
    if files.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Loads samples in the output stream format.
#[derive(Debug, Clone)]
pub struct Loader {
    format: StreamFormat,
    preview_blocks: usize,
}

impl Loader {
    pub fn new(format: StreamFormat, preview_blocks: usize) -> Loader {
        Loader {
            format,
            preview_blocks,
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Loads a Browse preview of every audio file at `path`, in parallel.
    pub fn load_snippets(&self, path: &Path) -> Result<Vec<Arc<Sample>>, LoadError> {
        let files = discover(path)?;
        let snippets = files
            .par_iter()
            .map(|file| self.load_preview(file).map(Arc::new))
            .collect::<Result<Vec<_>, LoadError>>()?;
        info!(
            path = %path.display(),
            snippets = snippets.len(),
            preview_blocks = self.preview_blocks,
            "Loaded snippets"
        );
        Ok(snippets)
    }

    /// Loads the first `preview_blocks` blocks of a file.
    pub fn load_preview(&self, path: &Path) -> Result<Sample, LoadError> {
        let mut decoder = open(path)?;
        let buffer = self
            .load_buffer(&mut decoder, Some(self.preview_blocks))
            .map_err(|source| decode_error(path, source))?;
        debug!(path = %path.display(), blocks = buffer.len(), "Loaded preview");
        Ok(Sample::new(path, buffer, 0.0))
    }

    /// Loads a whole file and estimates its tempo.
    pub fn load_full(&self, path: &Path) -> Result<Sample, LoadError> {
        let mut estimator = EnvelopeTempoEstimator::new(self.format.sample_rate);
        self.load_full_with(path, &mut estimator)
    }

    /// Loads a whole file, feeding every block to `estimator`.
    pub fn load_full_with(
        &self,
        path: &Path,
        estimator: &mut dyn TempoEstimator,
    ) -> Result<Sample, LoadError> {
        let mut decoder = open(path)?;
        self.load_decoder(path, &mut decoder, estimator)
    }

    /// Loads everything `decoder` yields as the sample at `path`.
    pub fn load_decoder(
        &self,
        path: &Path,
        decoder: &mut dyn BlockDecoder,
        estimator: &mut dyn TempoEstimator,
    ) -> Result<Sample, LoadError> {
        let buffer = self
            .load_buffer(decoder, None)
            .map_err(|source| decode_error(path, source))?;
        for index in 0..buffer.len() {
            if let Some(block) = buffer.block(index) {
                estimator.input_block(block, buffer.channel_count());
            }
        }
        let bpm = estimator.bpm();
        info!(
            path = %path.display(),
            blocks = buffer.len(),
            duration_ms = buffer.duration().as_millis(),
            memory_kb = buffer.memory_size() / 1024,
            bpm,
            "Sample loaded"
        );
        Ok(Sample::new(path, buffer, bpm))
    }

    fn load_buffer(
        &self,
        decoder: &mut dyn BlockDecoder,
        max_blocks: Option<usize>,
    ) -> Result<SampleBuffer, SampleSourceError> {
        let source_channels = decoder.channel_count().max(1) as usize;
        let source_rate = decoder.sample_rate();
        let bits_per_sample = decoder.bits_per_sample();

        // Enough source frames to fill the requested blocks after conversion.
        let frame_limit = max_blocks.map(|blocks| {
            let frames = blocks * self.format.block_frames;
            (frames as f64 * source_rate as f64 / self.format.sample_rate as f64).ceil() as usize
                + 1
        });

        let mut samples = Vec::new();
        let mut chunk = vec![0.0f32; DECODE_FRAMES * source_channels];
        loop {
            if let Some(limit) = frame_limit {
                if samples.len() / source_channels >= limit {
                    break;
                }
            }
            let read = decoder.read_block(&mut chunk)?;
            if read == 0 {
                break;
            }
            samples.extend_from_slice(&chunk[..read]);
        }
        if let Some(limit) = frame_limit {
            samples.truncate(limit * source_channels);
        }

        let mapped = map_channels(&samples, source_channels, self.format.channels as usize);
        let converted = if source_rate != self.format.sample_rate {
            debug!(
                source_rate,
                target_rate = self.format.sample_rate,
                "Transcoding sample"
            );
            transcode(
                &mapped,
                self.format.channels as usize,
                source_rate,
                self.format.sample_rate,
            )
        } else {
            mapped
        };

        let mut buffer = SampleBuffer::from_interleaved(&converted, self.format, bits_per_sample);
        if let Some(blocks) = max_blocks {
            if buffer.len() > blocks {
                let kept = (0..blocks)
                    .filter_map(|i| buffer.block(i).map(|b| b.to_vec()))
                    .collect();
                buffer = SampleBuffer::new(kept, self.format, bits_per_sample);
            }
        }
        Ok(buffer)
    }
}

fn open(path: &Path) -> Result<AudioFileDecoder, LoadError> {
    AudioFileDecoder::open(path).map_err(|source| decode_error(path, source))
}

fn decode_error(path: &Path, source: SampleSourceError) -> LoadError {
    LoadError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

/// Adapts interleaved material to `target` channels. Mono is duplicated to
/// every output; otherwise channels are copied in order, dropping extras and
/// silencing missing ones.
fn map_channels(samples: &[f32], source: usize, target: usize) -> Vec<f32> {
    if source == target {
        return samples.to_vec();
    }
    let frames = samples.len() / source;
    let mut output = Vec::with_capacity(frames * target);
    for frame in samples.chunks_exact(source) {
        for channel in 0..target {
            let value = if source == 1 {
                frame[0]
            } else {
                frame.get(channel).copied().unwrap_or(0.0)
            };
            output.push(value);
        }
    }
    output
}

/// Resamples interleaved material using linear interpolation.
fn transcode(samples: &[f32], channels: usize, source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let s0 = samples
                .get(source_frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = samples
                .get((source_frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            output.push(s0 + (s1 - s0) * frac);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_source::MemoryDecoder;
    use crate::testutil::{write_sine_wav, write_wav};

    struct FixedEstimator(usize);

    impl TempoEstimator for FixedEstimator {
        fn input_block(&mut self, _: &[f32], _: u16) {
            self.0 += 1;
        }

        fn bpm(&self) -> f32 {
            self.0 as f32
        }
    }

    #[test]
    fn test_discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write_sine_wav(dir.path().join("b.wav"), 0.1, 44100).unwrap();
        write_sine_wav(dir.path().join("a.WAV"), 0.1, 44100).unwrap();
        fs::write(dir.path().join("notes.txt"), "not audio").unwrap();
        fs::create_dir(dir.path().join("nested.wav")).unwrap();

        let files = discover(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.WAV", "b.wav"]);

        let single = discover(&dir.path().join("b.wav")).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_discover_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(discover(dir.path()), Err(LoadError::Empty(_))));
        assert!(matches!(
            discover(&dir.path().join("missing")),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn test_preview_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_sine_wav(path.clone(), 2.0, 44100).unwrap();

        let loader = Loader::new(StreamFormat::new(44100, 2, 1024), 10);
        let preview = loader.load_preview(&path).unwrap();
        assert_eq!(preview.len(), 10);
        assert_eq!(preview.bpm(), 0.0);

        let full = loader.load_full(&path).unwrap();
        // 88200 frames over 1024-frame blocks.
        assert_eq!(full.len(), 87);
        assert_eq!(full.name(), "long.wav");
    }

    #[test]
    fn test_mono_is_duplicated_and_padded() {
        let loader = Loader::new(StreamFormat::new(44100, 2, 4), 100);
        let mut decoder = MemoryDecoder::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 1, 44100);
        let mut estimator = FixedEstimator(0);
        let sample = loader
            .load_decoder(Path::new("mono.wav"), &mut decoder, &mut estimator)
            .unwrap();
        assert_eq!(sample.len(), 2);
        let buffer = sample.buffer();
        assert_eq!(
            buffer.block(0).unwrap(),
            &[0.1, 0.1, 0.2, 0.2, 0.3, 0.3, 0.4, 0.4]
        );
        assert_eq!(
            buffer.block(1).unwrap(),
            &[0.5, 0.5, 0.6, 0.6, 0.0, 0.0, 0.0, 0.0]
        );
        // The estimator saw every block.
        assert_eq!(sample.bpm(), 2.0);
    }

    #[test]
    fn test_rate_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("low.wav");
        write_wav(path.clone(), vec![vec![0.25f32; 22050], vec![-0.25f32; 22050]], 22050)
            .unwrap();

        let loader = Loader::new(StreamFormat::new(44100, 2, 1000), 100);
        let sample = loader.load_full(&path).unwrap();
        // 44100 converted frames.
        assert_eq!(sample.len(), 45);
        let block = sample.buffer().block(0).unwrap().to_vec();
        assert!((block[0] - 0.25).abs() < 1e-6);
        assert!((block[1] + 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_load_snippets() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["kick.wav", "snare.wav", "hat.wav"] {
            write_sine_wav(dir.path().join(name), 0.5, 44100).unwrap();
        }
        let loader = Loader::new(StreamFormat::new(44100, 2, 1024), 5);
        let snippets = loader.load_snippets(dir.path()).unwrap();
        let names: Vec<_> = snippets.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["hat.wav", "kick.wav", "snare.wav"]);
        assert!(snippets.iter().all(|s| s.len() == 5));
    }

    #[test]
    fn test_map_channels() {
        assert_eq!(
            map_channels(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2),
            vec![1.0, 2.0, 4.0, 5.0]
        );
        assert_eq!(map_channels(&[1.0, 2.0], 2, 3), vec![1.0, 2.0, 0.0]);
    }
}
