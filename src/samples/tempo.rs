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

//! Tempo estimation for freshly loaded material.

/// Estimates the tempo of material fed to it block by block.
pub trait TempoEstimator: Send {
    /// Feeds interleaved samples.
    fn input_block(&mut self, samples: &[f32], channels: u16);

    /// The estimated tempo in BPM, or 0.0 when there isn't enough material.
    fn bpm(&self) -> f32;
}

const MIN_BPM: f64 = 50.0;
const MAX_BPM: f64 = 200.0;
/// Envelope resolution.
const HOPS_PER_SECOND: f64 = 100.0;

/// Autocorrelates an onset envelope (rectified energy flux, 10 ms hops) and
/// picks the strongest period between 50 and 200 BPM.
pub struct EnvelopeTempoEstimator {
    sample_rate: u32,
    hop_frames: usize,
    /// Energy accumulated for the hop in progress.
    energy: f64,
    frames_in_hop: usize,
    previous_energy: f64,
    onsets: Vec<f64>,
}

impl EnvelopeTempoEstimator {
    pub fn new(sample_rate: u32) -> EnvelopeTempoEstimator {
        EnvelopeTempoEstimator {
            sample_rate,
            hop_frames: ((sample_rate as f64 / HOPS_PER_SECOND).round() as usize).max(1),
            energy: 0.0,
            frames_in_hop: 0,
            previous_energy: 0.0,
            onsets: Vec::new(),
        }
    }

    /// Hops per second after rounding the hop to whole frames.
    fn hop_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_frames as f64
    }

    fn lag_range(&self) -> (usize, usize) {
        let min_lag = (60.0 * self.hop_rate() / MAX_BPM).floor() as usize;
        let max_lag = (60.0 * self.hop_rate() / MIN_BPM).ceil() as usize;
        (min_lag.max(1), max_lag)
    }

    fn autocorrelation(&self, lag: usize) -> f64 {
        self.onsets
            .iter()
            .zip(self.onsets.iter().skip(lag))
            .map(|(a, b)| a * b)
            .sum()
    }
}

impl TempoEstimator for EnvelopeTempoEstimator {
    fn input_block(&mut self, samples: &[f32], channels: u16) {
        let channels = channels.max(1) as usize;
        for frame in samples.chunks_exact(channels) {
            let mono = frame.iter().map(|s| *s as f64).sum::<f64>() / channels as f64;
            self.energy += mono * mono;
            self.frames_in_hop += 1;
            if self.frames_in_hop == self.hop_frames {
                let flux = (self.energy - self.previous_energy).max(0.0);
                self.onsets.push(flux);
                self.previous_energy = self.energy;
                self.energy = 0.0;
                self.frames_in_hop = 0;
            }
        }
    }

    fn bpm(&self) -> f32 {
        let (min_lag, max_lag) = self.lag_range();
        if self.onsets.len() < max_lag * 2 {
            return 0.0;
        }

        let scores: Vec<f64> = (min_lag - 1..=max_lag + 1)
            .map(|lag| self.autocorrelation(lag))
            .collect();
        // scores[i] is the score of lag min_lag - 1 + i.
        let Some((best, best_score)) = scores[1..scores.len() - 1]
            .iter()
            .enumerate()
            .map(|(i, score)| (i + 1, *score))
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            return 0.0;
        };
        if best_score <= 0.0 {
            return 0.0;
        }

        // Parabolic interpolation around the peak.
        let (left, right) = (scores[best - 1], scores[best + 1]);
        let denominator = left - 2.0 * best_score + right;
        let shift = if denominator.abs() > f64::EPSILON {
            (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let lag = (min_lag - 1 + best) as f64 + shift;
        (60.0 * self.hop_rate() / lag) as f32
    }
}
