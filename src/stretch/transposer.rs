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

//! Rate transposer: resamples interleaved audio by a factor using linear
//! interpolation. A factor above 1 reads faster (higher pitch, shorter output).

use std::f64::consts::PI;

pub(super) struct RateTransposer {
    channels: usize,
    /// Fractional read position relative to the start of the working buffer.
    position: f64,
    /// Last frame of the previous input, kept so interpolation spans blocks.
    history: Vec<f32>,
    /// One-pole low-pass state, one value per channel.
    lowpass: Vec<f32>,
    /// Working buffer: history frame followed by the (filtered) input.
    work: Vec<f32>,
}

impl RateTransposer {
    pub(super) fn new(channels: usize) -> RateTransposer {
        RateTransposer {
            channels: channels.max(1),
            position: 0.0,
            history: Vec::new(),
            lowpass: vec![0.0; channels.max(1)],
            work: Vec::new(),
        }
    }

    pub(super) fn clear(&mut self) {
        self.position = 0.0;
        self.history.clear();
        self.lowpass.fill(0.0);
        self.work.clear();
    }

    /// Resamples `input` by `factor`, appending the result to `output`.
    pub(super) fn process(
        &mut self,
        input: &[f32],
        factor: f64,
        anti_alias: bool,
        output: &mut Vec<f32>,
    ) {
        let channels = self.channels;
        self.work.clear();
        self.work.extend_from_slice(&self.history);
        let filter_from = self.work.len();
        self.work.extend_from_slice(input);

        // Shrinking folds everything above the new Nyquist back down.
        if anti_alias && factor > 1.0 {
            let cutoff = 0.45 / factor;
            let coefficient = (1.0 - (-2.0 * PI * cutoff).exp()) as f32;
            for frame in self.work[filter_from..].chunks_exact_mut(channels) {
                for (sample, state) in frame.iter_mut().zip(self.lowpass.iter_mut()) {
                    *state += coefficient * (*sample - *state);
                    *sample = *state;
                }
            }
        }

        let frames = self.work.len() / channels;
        if frames < 2 {
            self.history.clear();
            self.history.extend_from_slice(&self.work);
            return;
        }

        let last = (frames - 1) as f64;
        while self.position < last {
            let index = self.position.floor() as usize;
            let fraction = (self.position - index as f64) as f32;
            let current = &self.work[index * channels..(index + 1) * channels];
            let next = &self.work[(index + 1) * channels..(index + 2) * channels];
            output.extend(
                current
                    .iter()
                    .zip(next)
                    .map(|(a, b)| a + (b - a) * fraction),
            );
            self.position += factor;
        }
        self.position -= last;

        self.history.clear();
        self.history
            .extend_from_slice(&self.work[(frames - 1) * channels..frames * channels]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_is_identity() {
        let mut transposer = RateTransposer::new(2);
        let input: Vec<f32> = (0..200).map(|i| i as f32).collect();
        let mut output = Vec::new();
        transposer.process(&input, 1.0, false, &mut output);
        transposer.process(&input, 1.0, false, &mut output);
        // One frame is held back for interpolation.
        assert_eq!(output.len(), input.len() * 2 - 2);
        assert_eq!(&output[..input.len()], &input[..]);
    }

    #[test]
    fn test_factor_scales_length() {
        let mut transposer = RateTransposer::new(1);
        let input = vec![0.5f32; 1000];
        let mut output = Vec::new();
        for _ in 0..10 {
            transposer.process(&input, 2.0, true, &mut output);
        }
        let ratio = output.len() as f64 / 10000.0;
        assert!((ratio - 0.5).abs() < 0.01, "ratio was {}", ratio);

        output.clear();
        transposer.clear();
        for _ in 0..10 {
            transposer.process(&input, 0.5, true, &mut output);
        }
        let ratio = output.len() as f64 / 10000.0;
        assert!((ratio - 2.0).abs() < 0.01, "ratio was {}", ratio);
    }

    #[test]
    fn test_interpolates_between_frames() {
        let mut transposer = RateTransposer::new(1);
        let mut output = Vec::new();
        transposer.process(&[0.0, 1.0, 2.0], 0.5, false, &mut output);
        assert_eq!(output, vec![0.0, 0.5, 1.0, 1.5]);
    }
}
