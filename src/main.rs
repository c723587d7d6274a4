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

use clap::{crate_version, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use synthboard::audio::cpal::{list_devices, Monitor};
use synthboard::controller::{keyboard, Controller, Session};
use synthboard::dispatcher::{PlaybackError, SessionState};
use synthboard::effects::Effect;
use synthboard::engine::Engine;
use synthboard::playsync::CancelHandle;
use synthboard::samples::FsFetcher;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A virtual keyboard instrument."
)]
struct Cli {
    /// The path to a configuration file layered over the built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the configured instruments and their note tables.
    Instruments {},
    /// Lists the available audio output devices.
    Devices {},
    /// Renders a sequence of notes offline and saves the recording.
    Render {
        /// The instrument to play.
        #[arg(short, long)]
        instrument: Option<String>,
        /// Effects to enable, comma separated. For example, reverb,delay.
        #[arg(short, long, value_delimiter = ',')]
        effects: Vec<Effect>,
        /// Seconds between notes.
        #[arg(short, long, default_value_t = 0.5)]
        spacing: f64,
        /// The directory the recording is written to.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// The notes to play: either a key (e.g. z) or a frequency in Hz (e.g. 440).
        notes: Vec<String>,
    },
    /// Starts a live session on an output device, controlled from the keyboard.
    Play {
        /// The device name to play through. Defaults to the default output device.
        #[arg(short, long)]
        device_name: Option<String>,
        /// The directory recordings are written to.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = synthboard::config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Instruments {} => {
            let instruments = config.instruments()?;
            println!("Instruments (count: {}):", instruments.len());
            for instrument in instruments.iter() {
                println!("- {}", instrument);
            }
            println!();
            for table in config.note_tables() {
                println!("{}", table.to_note_table()?);
            }
        }
        Commands::Devices {} => {
            let devices = list_devices()?;
            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Render {
            instrument,
            effects,
            spacing,
            output,
            notes,
        } => {
            let mut engine = Engine::new(&config, Arc::new(FsFetcher::new(config.asset_root())))?;
            engine.reverb_ready().await;

            let instrument = match instrument {
                Some(instrument) => instrument,
                None => engine
                    .dispatcher()
                    .instruments()
                    .first()
                    .map(|instrument| instrument.name().to_string())
                    .ok_or("no instruments configured")?,
            };
            let mut session = SessionState::new(&instrument);
            for effect in effects {
                session.effects.toggle(effect);
            }
            info!(session = %session, notes = notes.len(), "Rendering");

            let cancel = CancelHandle::new();
            let mut release_at: f64 = 0.0;
            engine.recording().start_recording();
            for note in notes.iter() {
                let played = match note.parse::<f64>() {
                    Ok(frequency) => {
                        engine
                            .dispatcher()
                            .trigger_frequency(&session, frequency, &cancel)
                            .await
                    }
                    Err(_) => match single_char(note) {
                        Some(key) => engine.dispatcher().trigger_key(&session, key, &cancel).await,
                        None => {
                            warn!(note = %note, "Not a key or a frequency, skipping");
                            continue;
                        }
                    },
                };
                match played {
                    Ok(played) => release_at = release_at.max(played.release_at),
                    Err(e @ PlaybackError::Sample(_)) => warn!(err = %e, "Skipping note"),
                    Err(e) => return Err(e.into()),
                }
                engine.context().lock().render_seconds(spacing)?;
            }

            {
                let mut context = engine.context().lock();
                let remaining = release_at - context.current_time();
                context.render_seconds(remaining)?;
            }
            engine.recording().stop_recording();
            info!(
                chunks = engine.recording().chunk_count(),
                events = engine.recording().events_fired(),
                frames = engine.recording().recorded_frames(),
                "Render finished"
            );

            let path = engine.recording().save()?.write_to(&output)?;
            println!("Saved {}", path.display());
        }
        Commands::Play {
            device_name,
            output,
        } => {
            let engine = Engine::new(&config, Arc::new(FsFetcher::new(config.asset_root())))?;
            let monitor = Monitor::start(engine.context().clone(), device_name.as_deref())?;
            println!("Monitoring on {}", monitor);

            let session = Session::new(
                engine.dispatcher().clone(),
                engine.recording().clone(),
                output,
            )?;
            let mut controller = Controller::new(session, Arc::new(keyboard::Driver::new()));
            controller.join().await?;
        }
    }

    Ok(())
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
