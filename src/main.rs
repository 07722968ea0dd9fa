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
use std::path::PathBuf;
use std::sync::Arc;

use chopogy::{audio, config, controller::Controller, engine::Engine, midi};
use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI-triggered sample chopper."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Start loads a sample folder and plays it from MIDI input.
    Start {
        /// A sample file, or a folder of them.
        sample_path: PathBuf,
        /// The path to the engine config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The MIDI input to listen to. Overrides midi.device in the config.
        #[arg(short, long)]
        midi_device: Option<String>,
        /// Tempo change in percent.
        #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i32).range(-95..=5000))]
        tempo: Option<i32>,
        /// Pitch change in semitones.
        #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i32).range(-60..=60))]
        pitch: Option<i32>,
        /// Rate change in percent.
        #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i32).range(-95..=5000))]
        rate: Option<i32>,
        /// Use the quicker, coarser overlap search.
        #[arg(long)]
        quick: bool,
        /// Don't low-pass material before transposing it up.
        #[arg(long)]
        no_anti_alias: bool,
        /// Tune the stretch windows for speech.
        #[arg(long)]
        speech: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Start {
            sample_path,
            config: config_path,
            midi_device,
            tempo,
            pitch,
            rate,
            quick,
            no_anti_alias,
            speech,
        } => {
            let mut engine_config = config::Engine::load(config_path.as_deref())?;
            engine_config.override_stretch(&config::Stretch::new(
                tempo,
                pitch,
                rate,
                quick.then_some(true),
                no_anti_alias.then_some(false),
                speech.then_some(true),
            ))?;
            if let Some(midi_device) = midi_device {
                engine_config.midi_mut().set_device(&midi_device);
            }
            let midi_device = engine_config
                .midi()
                .device()
                .ok_or("no MIDI input configured, set midi.device or pass --midi-device")?
                .to_string();

            let engine = Arc::new(Engine::new(&engine_config, &sample_path)?);
            let device = midi::get_device(&midi_device)?;
            let mut controller = Controller::new(engine.clone(), device)?;
            controller.join().await?;

            engine.shutdown();
            info!("Exiting.");
        }
    }

    Ok(())
}
