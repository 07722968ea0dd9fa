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

//! WSOLA tempo changer.
//!
//! ## Algorithm Overview
//!
//! 1. **Seek**: find the offset in the seek window whose start best matches the
//!    tail of the previous sequence (normalised cross-correlation).
//! 2. **Overlap**: cross-fade that tail into the input at the chosen offset.
//! 3. **Copy**: append the body of the sequence and keep its tail for the next
//!    round.
//! 4. **Skip**: advance the input by `tempo * (sequence - overlap)` frames, so
//!    each round consumes `tempo` times as much as it produces.
//!
//! Pitch is untouched. Input and output are interleaved.

use super::StretchSettings;

/// Coarse step used when quick seek is enabled.
const QUICK_SEEK_STEP: usize = 8;

pub(super) struct Wsola {
    channels: usize,
    quick_seek: bool,

    /// Frames produced per round, overlap included.
    sequence_len: usize,
    /// Number of candidate offsets searched per round.
    seek_len: usize,
    overlap_len: usize,

    tempo: f64,
    nominal_skip: f64,
    skip_fraction: f64,
    /// Frames that must be buffered before a round can run.
    frames_required: usize,

    input: Vec<f32>,
    output: Vec<f32>,
    /// Tail of the previous sequence, cross-faded into the next one.
    mid_buffer: Vec<f32>,
    /// Slope-weighted copy of `mid_buffer` used as the correlation reference.
    reference: Vec<f32>,
    beginning: bool,
}

impl Wsola {
    pub(super) fn new(sample_rate: u32, channels: usize, settings: &StretchSettings) -> Wsola {
        let frames = |ms: f64| (sample_rate as f64 * ms / 1000.0).round() as usize;
        let channels = channels.max(1);
        // Even and non-trivial, so the slope window is symmetric.
        let overlap_len = (frames(settings.overlap_ms) & !1).max(16);
        let sequence_len = frames(settings.sequence_ms).max(2 * overlap_len);
        let seek_len = frames(settings.seek_window_ms).max(1);

        let mut wsola = Wsola {
            channels,
            quick_seek: settings.quick_seek,
            sequence_len,
            seek_len,
            overlap_len,
            tempo: 1.0,
            nominal_skip: 0.0,
            skip_fraction: 0.0,
            frames_required: 0,
            input: Vec::new(),
            output: Vec::new(),
            mid_buffer: vec![0.0; overlap_len * channels],
            reference: vec![0.0; overlap_len * channels],
            beginning: true,
        };
        wsola.set_tempo(1.0);
        wsola
    }

    /// Sets the tempo ratio. 2.0 plays twice as fast.
    pub(super) fn set_tempo(&mut self, tempo: f64) {
        if (self.tempo - tempo).abs() < f64::EPSILON && self.frames_required > 0 {
            return;
        }
        self.tempo = tempo;
        self.nominal_skip = tempo * (self.sequence_len - self.overlap_len) as f64;
        let skip = (self.nominal_skip + 0.5) as usize;
        self.frames_required = (skip + self.overlap_len).max(self.sequence_len) + self.seek_len;
    }

    pub(super) fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
        self.mid_buffer.fill(0.0);
        self.reference.fill(0.0);
        self.skip_fraction = 0.0;
        self.beginning = true;
    }

    pub(super) fn buffered_frames(&self) -> usize {
        (self.input.len() + self.output.len()) / self.channels
    }

    pub(super) fn put_samples(&mut self, samples: &[f32]) {
        self.input.extend_from_slice(samples);
        self.process();
    }

    /// Moves up to `max_frames` processed frames into `output`.
    pub(super) fn receive_samples(&mut self, output: &mut Vec<f32>, max_frames: usize) -> usize {
        let frames = (self.output.len() / self.channels).min(max_frames);
        output.extend(self.output.drain(..frames * self.channels));
        frames
    }

    fn process(&mut self) {
        let channels = self.channels;
        let overlap = self.overlap_len * channels;

        while self.input.len() / channels >= self.frames_required {
            let offset = if self.beginning {
                // Nothing to match against yet; start at the top and fade from itself.
                self.mid_buffer.copy_from_slice(&self.input[..overlap]);
                self.beginning = false;
                0
            } else {
                self.seek_best_overlap()
            };

            let start = offset * channels;
            for i in 0..self.overlap_len {
                let fade_in = i as f32 / self.overlap_len as f32;
                let fade_out = 1.0 - fade_in;
                for c in 0..channels {
                    let k = i * channels + c;
                    self.output
                        .push(self.input[start + k] * fade_in + self.mid_buffer[k] * fade_out);
                }
            }

            let body_start = start + overlap;
            let body_end = start + (self.sequence_len - self.overlap_len) * channels;
            self.output
                .extend_from_slice(&self.input[body_start..body_end]);
            self.mid_buffer
                .copy_from_slice(&self.input[body_end..body_end + overlap]);
            self.update_reference();

            self.skip_fraction += self.nominal_skip;
            let skip = self.skip_fraction.floor() as usize;
            self.skip_fraction -= skip as f64;
            let skip = (skip * channels).min(self.input.len());
            self.input.drain(..skip);
        }
    }

    /// Weights the reference with a slope so the middle of the overlap counts most.
    fn update_reference(&mut self) {
        let len = self.overlap_len;
        for i in 0..len {
            let weight = (i * (len - i)) as f32;
            for c in 0..self.channels {
                let k = i * self.channels + c;
                self.reference[k] = self.mid_buffer[k] * weight;
            }
        }
    }

    fn correlation(&self, offset: usize) -> f64 {
        let start = offset * self.channels;
        let candidate = &self.input[start..start + self.reference.len()];
        let (mut corr, mut norm) = (0.0f64, 0.0f64);
        for (r, x) in self.reference.iter().zip(candidate) {
            corr += (*r as f64) * (*x as f64);
            norm += (*x as f64) * (*x as f64);
        }
        let corr = corr / norm.max(1e-9).sqrt();
        // Mild bias towards the middle of the window keeps the skip steady.
        let centre = (2.0 * offset as f64 - self.seek_len as f64) / self.seek_len as f64;
        (corr + 0.1) * (1.0 - 0.25 * centre * centre)
    }

    fn seek_best_overlap(&self) -> usize {
        if self.quick_seek {
            let coarse = self.best_in(0, self.seek_len, QUICK_SEEK_STEP);
            let from = coarse.saturating_sub(QUICK_SEEK_STEP - 1);
            let to = (coarse + QUICK_SEEK_STEP).min(self.seek_len);
            self.best_in(from, to, 1)
        } else {
            self.best_in(0, self.seek_len, 1)
        }
    }

    fn best_in(&self, from: usize, to: usize, step: usize) -> usize {
        let mut best = from;
        let mut best_corr = f64::MIN;
        for offset in (from..to).step_by(step) {
            let corr = self.correlation(offset);
            if corr > best_corr {
                best_corr = corr;
                best = offset;
            }
        }
        best
    }
}
