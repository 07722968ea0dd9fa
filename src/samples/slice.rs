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

//! Turns a triggered note into a block range of its sample.

use tracing::debug;

use super::store::{Sample, SLICE_COUNT};
use crate::engine::Mode;

/// The block range a playback task streams, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub start: usize,
    pub end: usize,
    /// The slice the range came from, if any.
    pub note: Option<u8>,
}

impl Resolved {
    /// The whole material.
    pub fn whole(sample: &Sample) -> Resolved {
        Resolved {
            start: 0,
            end: sample.len(),
            note: None,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Resolves the range `note` plays in `mode`, filling in an undefined start
/// from the nearest lower slice that has an end. The note becomes the
/// sample's selected slice.
///
/// Browse plays the whole material without touching the table. Returns
/// `None` for notes past the end of the table.
///
/// A held slice only gets its end once its key is released, so a note struck
/// while the lower key is still held does not chain onto it.
pub fn resolve(sample: &Sample, note: u8, mode: Mode) -> Option<Resolved> {
    if mode == Mode::Browse {
        return Some(Resolved::whole(sample));
    }
    if note as usize >= SLICE_COUNT {
        return None;
    }

    let len = sample.len();
    let mut table = sample.slices().write();
    let low_key = table.low_key();

    let mut start = table.get(note)?.start;
    if start == 0 && note > low_key {
        if let Some(previous_end) = (1..note)
            .rev()
            .filter_map(|lower| table.get(lower))
            .map(|slice| slice.end)
            .find(|end| *end != 0)
        {
            start = previous_end;
            if let Some(slice) = table.get_mut(note) {
                slice.start = previous_end;
            }
            debug!(note, start, "Chained slice start to lower neighbour");
        }
    }
    if start == 0 && low_key == 0 {
        table.set_low_key(note);
        debug!(note, "Set low key");
    }
    table.select(note);

    let slice = *table.get(note)?;
    let start = if len == 0 {
        0
    } else {
        slice.effective_start().min(len - 1)
    };
    let end = match mode {
        Mode::Performance => slice.effective_end().clamp(start, len),
        _ => len,
    };

    Some(Resolved {
        start,
        end,
        note: Some(note),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::audio::StreamFormat;
    use crate::samples::store::{Boundary, SampleBuffer};

    fn sample(blocks: usize) -> Sample {
        let format = StreamFormat::new(44100, 2, 4);
        Sample::new(
            Path::new("test.wav"),
            SampleBuffer::from_interleaved(&vec![0.5; blocks * 8], format, 16),
            0.0,
        )
    }

    #[test]
    fn test_browse_plays_everything() {
        let sample = sample(50);
        let resolved = resolve(&sample, 70, Mode::Browse).unwrap();
        assert_eq!((resolved.start, resolved.end), (0, 50));
        assert_eq!(sample.slices().read().selected(), None);
        assert_eq!(sample.slices().read().low_key(), 0);
    }

    #[test]
    fn test_first_note_becomes_low_key() {
        let sample = sample(50);
        let resolved = resolve(&sample, 40, Mode::Edit).unwrap();
        assert_eq!((resolved.start, resolved.end), (0, 50));
        assert_eq!(resolved.note, Some(40));
        let table = sample.slices().read();
        assert_eq!(table.low_key(), 40);
        assert_eq!(table.selected(), Some(40));
    }

    #[test]
    fn test_auto_chain() {
        let sample = sample(100);
        let (n1, n2, n3) = (40, 43, 47);

        resolve(&sample, n1, Mode::Edit).unwrap();
        sample.slices().write().commit_end(n1, 20);

        let second = resolve(&sample, n2, Mode::Edit).unwrap();
        assert_eq!(second.start, 20);
        sample.slices().write().commit_end(n2, 55);

        let third = resolve(&sample, n3, Mode::Edit).unwrap();
        assert_eq!(third.start, 55);

        let table = sample.slices().read();
        assert_eq!(table.get(n2).unwrap().start, table.get(n1).unwrap().end);
        assert_eq!(table.get(n3).unwrap().start, table.get(n2).unwrap().end);
        assert_eq!(table.low_key(), n1);
    }

    #[test]
    fn test_note_below_low_key_plays_from_top() {
        let sample = sample(100);
        resolve(&sample, 50, Mode::Edit).unwrap();
        sample.slices().write().commit_end(50, 30);

        let lower = resolve(&sample, 45, Mode::Edit).unwrap();
        assert_eq!(lower.start, 0);
        assert_eq!(sample.slices().read().low_key(), 50);
    }

    #[test]
    fn test_performance_range_and_idempotence() {
        let sample = sample(100);
        resolve(&sample, 40, Mode::Edit).unwrap();
        sample.slices().write().commit_end(40, 20);
        resolve(&sample, 42, Mode::Edit).unwrap();
        sample.slices().write().commit_end(42, 60);

        let first = resolve(&sample, 42, Mode::Performance).unwrap();
        let second = resolve(&sample, 42, Mode::Performance).unwrap();
        assert_eq!(first, second);
        assert_eq!((first.start, first.end), (20, 60));

        let low = resolve(&sample, 40, Mode::Performance).unwrap();
        assert_eq!((low.start, low.end), (0, 20));
    }

    #[test]
    fn test_undefined_end_is_empty_in_performance() {
        let sample = sample(100);
        let resolved = resolve(&sample, 40, Mode::Performance).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_offsets_clamp() {
        let sample = sample(100);
        resolve(&sample, 40, Mode::Edit).unwrap();
        sample.slices().write().commit_end(40, 20);
        resolve(&sample, 42, Mode::Edit).unwrap();
        sample.slices().write().commit_end(42, 90);

        {
            let mut table = sample.slices().write();
            assert!(table.set_selected_offset(Boundary::Start, -64));
            assert!(table.set_selected_offset(Boundary::End, 63));
        }
        let resolved = resolve(&sample, 42, Mode::Performance).unwrap();
        assert_eq!((resolved.start, resolved.end), (0, 100));

        {
            let mut table = sample.slices().write();
            assert!(table.set_selected_offset(Boundary::Start, 0));
            assert!(table.set_selected_offset(Boundary::End, 0));
        }
        let resolved = resolve(&sample, 42, Mode::Performance).unwrap();
        assert_eq!((resolved.start, resolved.end), (20, 90));
    }

    #[test]
    fn test_start_clamped_into_material() {
        let sample = sample(10);
        resolve(&sample, 40, Mode::Edit).unwrap();
        sample.slices().write().commit_end(40, 30);
        let resolved = resolve(&sample, 41, Mode::Edit).unwrap();
        assert_eq!(resolved.start, 9);
        assert_eq!(resolved.end, 10);
    }

    #[test]
    fn test_out_of_range_note() {
        let sample = sample(10);
        assert!(resolve(&sample, 88, Mode::Edit).is_none());
        assert!(resolve(&sample, 127, Mode::Performance).is_none());
    }

    #[test]
    fn test_held_slice_chains_only_after_release() {
        let sample = sample(50);
        resolve(&sample, 40, Mode::Edit).unwrap();

        // 40 is still held, so 41 has nothing to chain onto.
        let legato = resolve(&sample, 41, Mode::Edit).unwrap();
        assert_eq!(legato.start, 0);

        sample.slices().write().commit_end(41, 12);
        let chained = resolve(&sample, 42, Mode::Edit).unwrap();
        assert_eq!(chained.start, 12);
    }
}
