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
use std::error::Error;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Receiver};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, span, Level};

use crate::engine::Engine;
use crate::midi::Device;

/// Raw MIDI events buffered between the input callback and the engine.
const EVENT_QUEUE_SIZE: usize = 64;

/// Feeds MIDI input to the engine, one event at a time.
pub struct Controller {
    device: Arc<dyn Device>,
    handle: JoinHandle<()>,
}

impl Controller {
    /// Starts watching `device` and dispatching its events to `engine`.
    pub fn new(engine: Arc<Engine>, device: Arc<dyn Device>) -> Result<Controller, Box<dyn Error>> {
        let (events_tx, events_rx) = mpsc::channel::<Vec<u8>>(EVENT_QUEUE_SIZE);
        device.watch_events(events_tx)?;
        info!(device = %device, "Controller started.");

        Ok(Controller {
            device,
            handle: tokio::task::spawn_blocking(move || {
                Controller::dispatch_events(engine, events_rx)
            }),
        })
    }

    /// Stops watching the device. The event loop ends once queued events are
    /// handled.
    pub fn stop(&self) {
        self.device.stop_watch_events();
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// The event loop. Dispatch is synchronous, so events are handled strictly
    /// in arrival order.
    fn dispatch_events(engine: Arc<Engine>, mut events_rx: Receiver<Vec<u8>>) {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        while let Some(raw_event) = events_rx.blocking_recv() {
            engine.process_midi_event(&raw_event);
            let reaped = engine.reap();
            if reaped > 0 {
                debug!(reaped, "Reaped finished voices.");
            }
        }
        info!("Controller closing.");
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        config,
        engine::{Engine, Mode},
        midi,
        testutil::{eventually_async, write_sine_wav},
    };

    use super::Controller;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() {
        let dir = tempfile::tempdir().unwrap();
        write_sine_wav(dir.path().join("tone.wav"), 1.0, 44100).unwrap();
        let config = config::Engine::default().with_audio(config::Audio::new("mock"));
        let engine = Arc::new(Engine::new(&config, dir.path()).unwrap());

        let device = midi::get_device("mock-input").unwrap();
        let mut controller = Controller::new(engine.clone(), device.clone()).unwrap();
        let mock = device.to_mock().unwrap();
        assert!(mock.is_watching());

        assert!(mock.mock_event(&[0xC0, 1]));
        eventually_async(
            || async { engine.mode() == Mode::Edit },
            "Mode never changed to edit",
        )
        .await;
        eventually_async(
            || async { engine.slot(0).is_some() },
            "Sample never loaded for editing",
        )
        .await;

        assert!(mock.mock_event(&[0xB0, 0x12, 84]));
        eventually_async(
            || async { engine.stage().params().tempo_change == 20.0 },
            "Tempo never changed",
        )
        .await;

        controller.stop();
        controller.join().await.unwrap();
        assert!(!mock.mock_event(&[0xC0, 2]));
        assert_eq!(engine.mode(), Mode::Edit);
        engine.shutdown();
    }
}
