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
use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::warn;

use super::error::SampleSourceError;
use super::traits::BlockDecoder;

/// An open symphonia stream positioned somewhere in the file.
struct Stream {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

/// Format details read from the container when the stream is opened.
struct StreamInfo {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// A block decoder for audio files (WAV, FLAC, MP3, OGG, ...) backed by symphonia.
/// Decoded packets are converted to interleaved f32 and handed out in whatever
/// block size the caller asks for.
pub struct AudioFileDecoder {
    path: PathBuf,
    stream: Stream,
    /// Samples decoded from the last packet that haven't been handed out yet.
    pending: Vec<f32>,
    pending_position: usize,
    /// Set once the format reader has no more packets.
    exhausted: bool,
    info: StreamInfo,
}

impl AudioFileDecoder {
    /// Opens the given file for decoding.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SampleSourceError> {
        let path = path.as_ref().to_path_buf();
        let (stream, info, primed) = Self::open_stream(&path)?;
        Ok(AudioFileDecoder {
            path,
            stream,
            pending: primed,
            pending_position: 0,
            exhausted: false,
            info,
        })
    }

    /// Returns the path this decoder reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_stream(path: &Path) -> Result<(Stream, StreamInfo, Vec<f32>), SampleSourceError> {
        let display = path.display().to_string();
        let file = File::open(path).map_err(|e| {
            SampleSourceError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", display, e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SampleSourceError::Unsupported(display.clone(), e.to_string()))?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SampleSourceError::NoAudioTrack(display.clone()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| SampleSourceError::MissingParameter(display.clone(), "sample rate"))?;
        let bits_per_sample = params.bits_per_sample.unwrap_or(16) as u16;

        let decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| SampleSourceError::Unsupported(display.clone(), e.to_string()))?;

        let mut stream = Stream {
            format_reader,
            decoder,
            track_id,
        };

        // Some containers don't report a channel layout. Decode the first packet
        // to find out, and keep its samples so nothing is lost.
        let (channels, primed) = match params.channels.map(|c| c.count() as u16) {
            Some(channels) if channels > 0 => (channels, Vec::new()),
            _ => match Self::decode_next_packet(&mut stream, path)? {
                Some((samples, channels)) => (channels, samples),
                None => {
                    return Err(SampleSourceError::MissingParameter(display, "channels"));
                }
            },
        };

        Ok((
            stream,
            StreamInfo {
                channels,
                sample_rate,
                bits_per_sample,
            },
            primed,
        ))
    }

    /// Reads and decodes packets until one produces audio for our track.
    /// Returns `Ok(None)` at the end of the stream.
    fn decode_next_packet(
        stream: &mut Stream,
        path: &Path,
    ) -> Result<Option<(Vec<f32>, u16)>, SampleSourceError> {
        loop {
            let packet = match stream.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    stream.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                // Some readers report a decode error rather than EOF at the end,
                // but it can also be corruption mid-file.
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(
                        path = %path.display(),
                        error = e,
                        "Unreadable packet, treating it as the end of the file"
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != stream.track_id {
                continue;
            }

            match stream.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let spec = *decoded.spec();
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    return Ok(Some((buffer.samples().to_vec(), spec.channels.count() as u16)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(path = %path.display(), error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    stream.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl BlockDecoder for AudioFileDecoder {
    fn read_block(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        let mut written = 0;
        while written < output.len() {
            if self.pending_position >= self.pending.len() {
                if self.exhausted {
                    break;
                }
                match Self::decode_next_packet(&mut self.stream, &self.path)? {
                    Some((samples, _)) => {
                        self.pending = samples;
                        self.pending_position = 0;
                    }
                    None => {
                        self.exhausted = true;
                        break;
                    }
                }
                continue;
            }

            let available = &self.pending[self.pending_position..];
            let to_copy = available.len().min(output.len() - written);
            output[written..written + to_copy].copy_from_slice(&available[..to_copy]);
            written += to_copy;
            self.pending_position += to_copy;
        }
        Ok(written)
    }

    fn channel_count(&self) -> u16 {
        self.info.channels
    }

    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        self.info.bits_per_sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_decode_wav_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        let samples: Vec<i32> = (0..1000).map(|i| i * 1000).collect();
        write_wav(path.clone(), vec![samples], 44100).unwrap();

        let mut decoder = AudioFileDecoder::open(&path).unwrap();
        assert_eq!(decoder.channel_count(), 1);
        assert_eq!(decoder.sample_rate(), 44100);
        assert_eq!(decoder.bits_per_sample(), 32);

        let mut block = vec![0.0f32; 256];
        let mut total = 0;
        loop {
            let read = decoder.read_block(&mut block).unwrap();
            total += read;
            if read < block.len() {
                break;
            }
        }
        assert_eq!(total, 1000);
        assert_eq!(decoder.read_block(&mut block).unwrap(), 0);
    }

    #[test]
    fn test_truncated_file_keeps_what_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.wav");
        let samples: Vec<i32> = (0..44100).map(|i| (i % 100) * 1000).collect();
        write_wav(path.clone(), vec![samples], 44100).unwrap();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(44 + 44100 * 2).unwrap();
        drop(file);

        let mut decoder = AudioFileDecoder::open(&path).unwrap();
        let mut block = vec![0.0f32; 1024];
        let mut total = 0;
        loop {
            let read = decoder.read_block(&mut block).unwrap();
            total += read;
            if read == 0 {
                break;
            }
        }
        assert!(total > 0);
        assert!(total < 44100);
    }

    #[test]
    fn test_open_missing_file() {
        let result = AudioFileDecoder::open("/nonexistent/file.wav");
        assert!(matches!(result, Err(SampleSourceError::IoError(_))));
    }
}
