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

//! The trigger dispatcher: turns MIDI events into mode changes, slice edits,
//! stage parameter changes and playback voices.

use std::{error::Error, path::Path, sync::Arc};

use midly::{live::LiveEvent, MidiMessage};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::audio::VoicePool;
use crate::config;
use crate::playsync::{CancelHandle, ChannelTokens};
use crate::samples::{slice, Boundary, Loader, Playback, Resolved, Sample, Voice, VoiceManager};
use crate::stretch::TimeStretch;

mod session;

pub use session::{Mode, Session};

/// Controller values are centred here.
const CONTROL_CENTRE: i16 = 64;

pub struct Engine {
    controls: config::Controls,
    loader: Loader,
    /// Browse material, one preview per file in the sample folder.
    snippets: Vec<Arc<Sample>>,
    session: Mutex<Session>,
    tokens: Arc<ChannelTokens>,
    pool: VoicePool,
    stage: Arc<TimeStretch>,
    voices: Mutex<VoiceManager>,
}

impl Engine {
    /// Opens the voice pool and loads previews of everything at `sample_path`.
    pub fn new(config: &config::Engine, sample_path: &Path) -> Result<Engine, Box<dyn Error>> {
        let pool = VoicePool::open(config.audio())?;
        let format = pool.format();
        let loader = Loader::new(format, config.samples().preview_blocks());
        let snippets = loader.load_snippets(sample_path)?;
        let stage = Arc::new(TimeStretch::from_config(
            format.sample_rate,
            format.channels,
            config.stretch(),
        ));

        info!(
            path = %sample_path.display(),
            snippets = snippets.len(),
            format = %format,
            stage = %stage.params(),
            "Engine ready"
        );

        Ok(Engine {
            controls: config.controls().clone(),
            loader,
            snippets,
            session: Mutex::new(Session::new()),
            tokens: Arc::new(ChannelTokens::new()),
            pool,
            stage,
            voices: Mutex::new(VoiceManager::new()),
        })
    }

    /// Handles one raw MIDI message. Anything unparseable or unmapped is
    /// logged and dropped.
    pub fn process_midi_event(&self, raw_event: &[u8]) {
        let event = match LiveEvent::parse(raw_event) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = ?e, "Failed to parse MIDI event");
                return;
            }
        };

        let LiveEvent::Midi { channel, message } = event else {
            return;
        };
        let channel = u8::from(channel) as usize;
        match message {
            MidiMessage::NoteOn { key, vel } if u8::from(vel) > 0 => {
                self.note_on(channel, u8::from(key))
            }
            // Note On with velocity 0 is a Note Off.
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                self.note_off(channel, u8::from(key))
            }
            MidiMessage::ProgramChange { program } => self.change_mode(u8::from(program)),
            MidiMessage::Controller { controller, value } => {
                self.control_change(u8::from(controller), u8::from(value))
            }
            MidiMessage::PitchBend { bend } => {
                debug!(channel, bend = bend.as_int(), "Ignoring pitch bend")
            }
            _ => {}
        }
    }

    fn note_on(&self, channel: usize, note: u8) {
        let mut session = self.session.lock();
        session.set_current_channel(channel);
        let mode = session.mode();
        let token = self.tokens.bump(channel);
        self.stage.clear();

        let (sample, range, device) = match mode {
            Mode::Browse => {
                if self.snippets.is_empty() {
                    warn!(note, "No snippets to browse");
                    return;
                }
                let sample = self.snippets[note as usize % self.snippets.len()].clone();
                let (handle, device) = self.pool.acquire_round_robin();
                debug!(note, sample = sample.name(), handle, "Previewing snippet");
                let range = Resolved::whole(&sample);
                (sample, range, device)
            }
            Mode::Edit | Mode::Performance => {
                let Some(sample) = session.slot(channel).cloned() else {
                    warn!(channel, note, "No sample loaded on channel");
                    return;
                };
                let Some(range) = slice::resolve(&sample, note, mode) else {
                    warn!(note, "Note has no slice");
                    return;
                };
                let Some(device) = self.pool.channel(channel) else {
                    warn!(channel, "No output for channel");
                    return;
                };
                debug!(note, start = range.start, end = range.end, %mode, "Playing slice");
                (sample, range, device)
            }
        };
        session.select(sample.clone());
        drop(session);

        if range.is_empty() {
            debug!(note, "Slice is empty, nothing to play");
            return;
        }

        let playback = Playback {
            sample,
            range,
            mode,
            device,
            stage: self.stage.clone(),
            cancel_handle: CancelHandle::new(self.tokens.clone(), channel, token),
        };
        match Voice::spawn(note, playback) {
            Ok(voice) => self.voices.lock().add(voice),
            Err(e) => error!(err = %e, channel, note, "Unable to start voice"),
        }
    }

    fn note_off(&self, channel: usize, note: u8) {
        if self.mode() == Mode::Performance {
            // Slices are one-shots here.
            return;
        }
        let token = self.tokens.bump(channel);
        debug!(channel, note, %token, "Released");
    }

    fn change_mode(&self, value: u8) {
        let Some(mode) = Mode::from_value(value) else {
            warn!(value, "Unknown mode");
            return;
        };
        let previous = self.session.lock().set_mode(mode);
        if previous == mode {
            return;
        }
        info!(%mode, %previous, "Mode changed");
        if mode == Mode::Edit {
            self.reload_selected();
        }
    }

    /// Loads the whole of the selected sample, or the first snippet, into the
    /// current channel's slot. Reloading the material already in the slot
    /// keeps its slices.
    fn reload_selected(&self) {
        let (channel, path) = {
            let session = self.session.lock();
            let path = session
                .selected()
                .or_else(|| self.snippets.first())
                .map(|sample| sample.path().to_path_buf());
            (session.current_channel(), path)
        };
        let Some(path) = path else {
            warn!("No sample to load for editing");
            return;
        };

        // Nothing on the channel may keep playing the material being replaced.
        self.tokens.bump(channel);
        match self.loader.load_full(&path) {
            Ok(sample) => {
                let mut session = self.session.lock();
                let sample = match session.slot(channel) {
                    Some(current) if current.path() == path => sample.sharing_slices(current),
                    _ => sample,
                };
                let sample = Arc::new(sample);
                info!(
                    channel,
                    sample = sample.name(),
                    blocks = sample.len(),
                    bpm = sample.bpm(),
                    "Loaded sample for editing"
                );
                session.load_slot(channel, sample.clone());
                session.select(sample);
            }
            Err(e) => error!(err = %e, channel, "Unable to load sample"),
        }
    }

    fn control_change(&self, controller: u8, value: u8) {
        let centred = value as i16 - CONTROL_CENTRE;
        let controls = &self.controls;
        if controller == controls.mode() {
            self.change_mode(value);
        } else if controller == controls.slice_start() {
            self.set_offset(Boundary::Start, centred);
        } else if controller == controls.slice_end() {
            self.set_offset(Boundary::End, centred);
        } else if controller == controls.tempo() {
            self.stage.set_tempo_change(centred as f32);
        } else if controller == controls.pitch() {
            self.stage.set_pitch_semitones((value / 4) as f32 - 16.0);
        } else if controller == controls.rate() {
            self.stage.set_rate_change(centred as f32);
        } else {
            debug!(controller, value, "Unmapped controller");
        }
    }

    fn set_offset(&self, boundary: Boundary, offset: i16) {
        let Ok(offset) = i8::try_from(offset) else {
            return;
        };
        let session = self.session.lock();
        let Some(sample) = session.selected() else {
            debug!(?boundary, "No sample selected");
            return;
        };
        if sample.slices().write().set_selected_offset(boundary, offset) {
            debug!(?boundary, offset, sample = sample.name(), "Slice offset set");
        } else {
            debug!(?boundary, "No slice selected");
        }
    }

    pub fn mode(&self) -> Mode {
        self.session.lock().mode()
    }

    pub fn selected(&self) -> Option<Arc<Sample>> {
        self.session.lock().selected().cloned()
    }

    /// The sample resident in a channel slot.
    pub fn slot(&self, channel: usize) -> Option<Arc<Sample>> {
        self.session.lock().slot(channel).cloned()
    }

    pub fn snippets(&self) -> &[Arc<Sample>] {
        &self.snippets
    }

    pub fn stage(&self) -> &TimeStretch {
        &self.stage
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    pub fn tokens(&self) -> &ChannelTokens {
        &self.tokens
    }

    /// Joins voices that have finished. Never blocks on a running voice.
    pub fn reap(&self) -> usize {
        self.voices.lock().reap()
    }

    /// Voices still running after a reap.
    pub fn active_voices(&self) -> usize {
        let mut voices = self.voices.lock();
        voices.reap();
        voices.len()
    }

    /// Stops every voice, waits for them and closes the outputs.
    pub fn shutdown(&self) {
        self.voices.lock().shutdown(&self.tokens);
        self.pool.close();
        info!("Engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, thread, time::Duration};

    use super::*;
    use crate::testutil::{eventually, write_sine_wav};

    const BLOCK_DELAY: Duration = Duration::from_millis(5);

    fn engine(dir: &Path) -> Engine {
        let config = config::Engine::default().with_audio(config::Audio::new("mock"));
        Engine::new(&config, dir).unwrap()
    }

    fn output(engine: &Engine, index: usize) -> Arc<dyn crate::audio::OutputDevice> {
        engine.pool().output(index).unwrap()
    }

    fn tone_folder(names: &[&str], seconds: f32) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let paths = names
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                write_sine_wav(path.clone(), seconds, 44100).unwrap();
                path
            })
            .collect();
        (dir, paths)
    }

    #[test]
    fn test_browse_trigger_release_retrigger() {
        let (dir, _) = tone_folder(&["tone.wav"], 10.0);
        let engine = engine(dir.path());
        for index in 0..engine.pool().len() {
            output(&engine, index)
                .to_mock()
                .unwrap()
                .set_write_delay(BLOCK_DELAY);
        }

        engine.process_midi_event(&[0x90, 40, 100]);
        let first = output(&engine, 0);
        let first = first.to_mock().unwrap();
        eventually(|| first.block_count() >= 5, "Preview never started");

        engine.process_midi_event(&[0x80, 40, 0]);
        eventually(|| engine.active_voices() == 0, "Preview never stopped");
        let stopped = first.block_count();
        assert!(stopped < 100);
        assert_eq!(first.drain_count(), 1);
        thread::sleep(BLOCK_DELAY * 4);
        assert_eq!(first.block_count(), stopped);

        // Only the second of two quick triggers keeps sounding.
        engine.process_midi_event(&[0x90, 40, 100]);
        engine.process_midi_event(&[0x90, 40, 100]);
        let second = output(&engine, 1);
        let third = output(&engine, 2);
        let third = third.to_mock().unwrap();
        eventually(|| third.block_count() >= 5, "Retrigger never started");
        assert!(second.to_mock().unwrap().block_count() <= 1);

        engine.shutdown();
        assert_eq!(engine.active_voices(), 0);
        assert!(third.is_closed());
    }

    #[test]
    fn test_browse_picks_snippet_by_note() {
        let (dir, _) = tone_folder(&["a.wav", "b.wav", "c.wav"], 0.5);
        let engine = engine(dir.path());
        assert_eq!(engine.snippets().len(), 3);

        engine.process_midi_event(&[0x90, 40, 100]);
        assert_eq!(engine.selected().unwrap().name(), "b.wav");
        engine.process_midi_event(&[0x91, 42, 100]);
        assert_eq!(engine.selected().unwrap().name(), "a.wav");
        // Browse never touches channel slots.
        assert!(engine.slot(0).is_none());
        engine.shutdown();
    }

    #[test]
    fn test_edit_then_performance() {
        let (dir, _) = tone_folder(&["loop.wav"], 10.0);
        let engine = engine(dir.path());
        let shared = engine.pool().channel(0).unwrap();
        let shared = shared.to_mock().unwrap();
        shared.set_write_delay(Duration::from_millis(2));

        engine.process_midi_event(&[0xC0, 1]);
        assert_eq!(engine.mode(), Mode::Edit);
        let sample = engine.slot(0).unwrap();
        assert_eq!(sample.len(), 431);

        engine.process_midi_event(&[0x90, 60, 100]);
        eventually(|| shared.block_count() >= 20, "Slice never started");
        engine.process_midi_event(&[0x80, 60, 0]);
        eventually(|| engine.active_voices() == 0, "Slice never stopped");

        let held = shared.block_count();
        let end = sample.slices().read().get(60).unwrap().end;
        assert_eq!(end, held - 3);

        // The mode controller works like a program change.
        engine.process_midi_event(&[0xB0, 0x50, 2]);
        assert_eq!(engine.mode(), Mode::Performance);
        shared.clear_blocks();
        shared.set_write_delay(Duration::ZERO);

        engine.process_midi_event(&[0x90, 60, 100]);
        // Releases don't cut one-shots.
        engine.process_midi_event(&[0x80, 60, 0]);
        eventually(|| engine.active_voices() == 0, "Slice never finished");

        let blocks = shared.blocks();
        assert_eq!(blocks.len(), end);
        assert_eq!(blocks[0], sample.buffer().block(0).unwrap());
        assert_eq!(blocks[end - 1], sample.buffer().block(end - 1).unwrap());
        engine.shutdown();
    }

    #[test]
    fn test_slice_offsets_follow_selection() {
        let (dir, _) = tone_folder(&["loop.wav"], 2.0);
        let engine = engine(dir.path());

        // Nothing is selected yet.
        engine.process_midi_event(&[0xB0, 0x51, 70]);

        engine.process_midi_event(&[0xC0, 1]);
        engine.process_midi_event(&[0x90, 50, 100]);
        engine.process_midi_event(&[0x80, 50, 0]);
        engine.process_midi_event(&[0xB0, 0x51, 70]);
        engine.process_midi_event(&[0xB0, 0x5b, 60]);
        eventually(|| engine.active_voices() == 0, "Slice never stopped");

        let sample = engine.slot(0).unwrap();
        let table = sample.slices().read();
        assert_eq!(table.selected(), Some(50));
        let slice = table.get(50).unwrap();
        assert_eq!(slice.start_offset, 6);
        assert_eq!(slice.end_offset, -4);
        drop(table);
        engine.shutdown();
    }

    #[test]
    fn test_stage_controllers() {
        let (dir, _) = tone_folder(&["tone.wav"], 0.5);
        let engine = engine(dir.path());

        engine.process_midi_event(&[0xB0, 0x12, 74]);
        engine.process_midi_event(&[0xB0, 0x13, 100]);
        engine.process_midi_event(&[0xB0, 0x01, 0]);
        let params = engine.stage().params();
        assert_eq!(params.tempo_change, 10.0);
        assert_eq!(params.pitch_semitones, 9.0);
        assert_eq!(params.rate_change, -64.0);

        engine.process_midi_event(&[0xB0, 0x13, 64]);
        assert_eq!(engine.stage().params().pitch_semitones, 0.0);
        engine.shutdown();
    }

    #[test]
    fn test_no_ops() {
        let (dir, _) = tone_folder(&["tone.wav"], 0.5);
        let engine = engine(dir.path());

        engine.process_midi_event(&[]);
        engine.process_midi_event(&[0xC0, 7]);
        assert_eq!(engine.mode(), Mode::Browse);
        engine.process_midi_event(&[0xB0, 0x70, 1]);
        engine.process_midi_event(&[0xE0, 0x00, 0x40]);

        // Performance without a loaded sample.
        engine.process_midi_event(&[0xC0, 2]);
        engine.process_midi_event(&[0x93, 60, 100]);
        assert_eq!(engine.active_voices(), 0);
        assert!(engine.slot(3).is_none());

        // Past the end of the slice table. Edit loads into the channel of
        // the last note.
        engine.process_midi_event(&[0xC0, 1]);
        assert!(engine.slot(3).is_some());
        engine.process_midi_event(&[0x93, 100, 100]);
        assert_eq!(engine.active_voices(), 0);
        engine.shutdown();
    }

    #[test]
    fn test_release_bumps_token() {
        let (dir, _) = tone_folder(&["tone.wav"], 0.5);
        let engine = engine(dir.path());

        let before = engine.tokens().current(4);
        engine.process_midi_event(&[0x84, 40, 0]);
        assert_ne!(engine.tokens().current(4), before);

        // Velocity 0 note on is a release too.
        let before = engine.tokens().current(4);
        engine.process_midi_event(&[0x94, 40, 0]);
        assert_ne!(engine.tokens().current(4), before);

        engine.process_midi_event(&[0xC4, 2]);
        let before = engine.tokens().current(4);
        engine.process_midi_event(&[0x84, 40, 0]);
        assert_eq!(engine.tokens().current(4), before);
        engine.shutdown();
    }

    #[test]
    fn test_slices_survive_reload() {
        let (dir, _) = tone_folder(&["loop.wav"], 10.0);
        let engine = engine(dir.path());
        let output = engine.pool().channel(0).unwrap();
        let output = output.to_mock().unwrap();
        output.set_write_delay(Duration::from_millis(2));

        engine.process_midi_event(&[0xC0, 1]);
        engine.process_midi_event(&[0x90, 60, 100]);
        eventually(|| output.block_count() >= 20, "Slice never started");
        engine.process_midi_event(&[0x80, 60, 0]);
        eventually(|| engine.active_voices() == 0, "Slice never stopped");
        let end = engine.slot(0).unwrap().slices().read().get(60).unwrap().end;
        assert!(end > 0);

        engine.process_midi_event(&[0xC0, 2]);
        engine.process_midi_event(&[0xC0, 1]);
        engine.process_midi_event(&[0xC0, 2]);

        let sample = engine.slot(0).unwrap();
        assert_eq!(sample.len(), 431);
        let table = sample.slices().read();
        assert_eq!(table.get(60).unwrap().end, end);
        assert_eq!(table.low_key(), 60);
        drop(table);

        output.clear_blocks();
        output.set_write_delay(Duration::ZERO);
        engine.process_midi_event(&[0x90, 60, 100]);
        eventually(|| engine.active_voices() == 0, "Slice never finished");
        assert_eq!(output.block_count(), end);
        engine.shutdown();
    }

    #[test]
    fn test_reload_preempts_running_voice() {
        let (dir, _) = tone_folder(&["loop.wav"], 10.0);
        let engine = engine(dir.path());
        let output = engine.pool().channel(0).unwrap();
        let output = output.to_mock().unwrap();
        output.set_write_delay(Duration::from_millis(2));

        engine.process_midi_event(&[0xC0, 1]);
        let before = engine.slot(0).unwrap();
        engine.process_midi_event(&[0x90, 60, 100]);
        eventually(|| output.block_count() >= 20, "Slice never started");

        // Leaving Edit doesn't stop the held slice, coming back does.
        engine.process_midi_event(&[0xC0, 0]);
        assert_eq!(engine.active_voices(), 1);
        engine.process_midi_event(&[0xC0, 1]);
        eventually(|| engine.active_voices() == 0, "Reload never stopped the slice");
        assert_eq!(output.drain_count(), 1);

        let written = output.block_count();
        thread::sleep(BLOCK_DELAY * 4);
        assert_eq!(output.block_count(), written);
        assert!(written < before.len());

        // The held slice was cut like a release, and the reloaded material
        // sees its end.
        let after = engine.slot(0).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(
            after.slices().read().get(60).unwrap().end,
            written - crate::samples::voice::RELEASE_GUARD_BLOCKS
        );
        engine.shutdown();
    }

    #[test]
    fn test_channels_play_together() {
        let (dir, _) = tone_folder(&["loop.wav"], 10.0);
        let engine = engine(dir.path());
        let first = engine.pool().channel(0).unwrap();
        let first = first.to_mock().unwrap();
        let second = engine.pool().channel(1).unwrap();
        let second = second.to_mock().unwrap();
        first.set_write_delay(Duration::from_millis(2));
        second.set_write_delay(Duration::from_millis(2));

        // Load the sample into channels 0 and 1.
        engine.process_midi_event(&[0xC0, 1]);
        engine.process_midi_event(&[0x91, 60, 100]);
        engine.process_midi_event(&[0xC0, 0]);
        engine.process_midi_event(&[0xC0, 1]);
        assert!(engine.slot(1).is_some());

        engine.process_midi_event(&[0x90, 60, 100]);
        engine.process_midi_event(&[0x91, 60, 100]);
        eventually(
            || first.block_count() >= 10 && second.block_count() >= 10,
            "Channels never played together",
        );

        // Releasing channel 1 leaves channel 0 alone.
        engine.process_midi_event(&[0x81, 60, 0]);
        eventually(|| engine.active_voices() == 1, "Channel 1 never stopped");
        assert_eq!(second.drain_count(), 1);
        assert_eq!(first.drain_count(), 0);
        let playing = first.block_count();
        eventually(|| first.block_count() > playing + 5, "Channel 0 stopped");
        engine.shutdown();
    }
}
