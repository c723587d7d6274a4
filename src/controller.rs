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
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::dispatcher::{Dispatcher, PlaybackError, PlayedNote, SessionState};
use crate::effects::Effect;
use crate::playsync::CancelHandle;
use crate::recording::{RecordingError, RecordingHandle};

pub mod keyboard;

/// Controller events that change the session or play notes.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Selects the instrument with the given name. Pending sample loads are cancelled.
    SelectInstrument(String),

    /// Flips an effect on or off for subsequent notes.
    ToggleEffect(Effect),

    /// Plays the note bound to a key on the current instrument.
    TriggerKey(char),

    /// Plays a frequency on the current instrument.
    TriggerFrequency(f64),

    /// Starts a new recording, discarding the previous one.
    StartRecording,

    /// Stops the current recording. If nothing is recording, does nothing.
    StopRecording,

    /// Saves the recording.
    Save,

    /// Ends the session.
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseEventError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0}")]
    UnknownCommand(String),

    #[error("command {0} needs an argument")]
    MissingArgument(String),

    #[error("invalid argument for {command}: {argument}")]
    InvalidArgument { command: String, argument: String },
}

impl FromStr for Event {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let command = parts.next().ok_or(ParseEventError::Empty)?.to_lowercase();
        let argument = parts.next();

        let invalid = |argument: &str| ParseEventError::InvalidArgument {
            command: command.clone(),
            argument: argument.to_string(),
        };
        let required = || argument.ok_or_else(|| ParseEventError::MissingArgument(command.clone()));

        match command.as_str() {
            "instrument" => Ok(Event::SelectInstrument(required()?.to_string())),
            "toggle" => {
                let argument = required()?;
                argument
                    .parse::<Effect>()
                    .map(Event::ToggleEffect)
                    .map_err(|_| invalid(argument))
            }
            "key" => {
                let argument = required()?;
                let mut chars = argument.chars();
                match (chars.next(), chars.next()) {
                    (Some(key), None) => Ok(Event::TriggerKey(key)),
                    _ => Err(invalid(argument)),
                }
            }
            "freq" => {
                let argument = required()?;
                argument
                    .parse::<f64>()
                    .ok()
                    .filter(|hz| hz.is_finite() && *hz > 0.0)
                    .map(Event::TriggerFrequency)
                    .ok_or_else(|| invalid(argument))
            }
            "record" => Ok(Event::StartRecording),
            "stop" => Ok(Event::StopRecording),
            "save" => Ok(Event::Save),
            "quit" => Ok(Event::Quit),
            _ => Err(ParseEventError::UnknownCommand(command.clone())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Recording(#[from] RecordingError),
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// The state a controller applies events to.
pub struct Session {
    dispatcher: Dispatcher,
    recording: RecordingHandle,
    state: SessionState,
    /// Held by every pending note. Replaced whenever the instrument changes.
    loads: CancelHandle,
    /// Where saved recordings are written.
    output_dir: PathBuf,
}

impl Session {
    /// Creates a session with the first configured instrument selected.
    pub fn new(
        dispatcher: Dispatcher,
        recording: RecordingHandle,
        output_dir: PathBuf,
    ) -> Result<Session, PlaybackError> {
        let instrument = dispatcher
            .instruments()
            .first()
            .ok_or_else(|| PlaybackError::UnknownInstrument(String::new()))?;
        Ok(Session {
            state: SessionState::new(instrument.name()),
            dispatcher,
            recording,
            loads: CancelHandle::new(),
            output_dir,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[cfg(test)]
    pub fn recording(&self) -> &RecordingHandle {
        &self.recording
    }

    /// Switches instruments. Notes still loading for the previous instrument never play.
    pub fn select_instrument(&mut self, name: &str) -> Result<(), PlaybackError> {
        if self.dispatcher.instruments().get(name).is_none() {
            return Err(PlaybackError::UnknownInstrument(name.to_string()));
        }

        self.loads.cancel();
        self.loads = CancelHandle::new();
        self.state.instrument = name.to_string();
        info!(instrument = name, "Instrument selected");
        Ok(())
    }

    /// Flips an effect, returning whether it is now enabled.
    pub fn toggle_effect(&mut self, effect: Effect) -> bool {
        let enabled = self.state.effects.toggle(effect);
        info!(effect = %effect, enabled, "Effect toggled");
        enabled
    }

    /// Plays a key in the background.
    pub fn trigger_key(&self, key: char) -> JoinHandle<Result<PlayedNote, PlaybackError>> {
        let dispatcher = self.dispatcher.clone();
        let state = self.state.clone();
        let cancel = self.loads.clone();
        tokio::spawn(
            async move { log_outcome(dispatcher.trigger_key(&state, key, &cancel).await) }
                .instrument(span!(Level::INFO, "key", key = %key)),
        )
    }

    /// Plays a frequency in the background.
    pub fn trigger_frequency(
        &self,
        frequency: f64,
    ) -> JoinHandle<Result<PlayedNote, PlaybackError>> {
        let dispatcher = self.dispatcher.clone();
        let state = self.state.clone();
        let cancel = self.loads.clone();
        tokio::spawn(
            async move {
                log_outcome(dispatcher.trigger_frequency(&state, frequency, &cancel).await)
            }
            .instrument(span!(Level::INFO, "frequency", hz = frequency)),
        )
    }

    /// Saves the recording into the output directory.
    pub fn save(&self) -> Result<PathBuf, RecordingError> {
        self.recording.save()?.write_to(&self.output_dir)
    }

    /// Applies an event. Returns false once the session should end.
    pub fn apply(&mut self, event: Event) -> Result<bool, ControllerError> {
        match event {
            Event::SelectInstrument(name) => self.select_instrument(&name)?,
            Event::ToggleEffect(effect) => {
                self.toggle_effect(effect);
            }
            Event::TriggerKey(key) => {
                self.trigger_key(key);
            }
            Event::TriggerFrequency(frequency) => {
                self.trigger_frequency(frequency);
            }
            Event::StartRecording => self.recording.start_recording(),
            Event::StopRecording => self.recording.stop_recording(),
            Event::Save => {
                let path = self.save()?;
                info!(path = ?path, "Composition saved");
            }
            Event::Quit => {
                self.loads.cancel();
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn log_outcome(
    result: Result<PlayedNote, PlaybackError>,
) -> Result<PlayedNote, PlaybackError> {
    match &result {
        Ok(_) => {}
        Err(PlaybackError::Cancelled) => debug!("Note cancelled"),
        Err(e) => warn!(err = %e, "Note not played"),
    }
    result
}

/// Feeds driver events into a session.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(session: Session, driver: Arc<dyn Driver>) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::trigger_events(session, driver).instrument(span)),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies events from the driver until it closes or a quit event arrives.
    async fn trigger_events(mut session: Session, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(state = %session.state(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            debug!(event = ?event, "Received event.");

            match session.apply(event) {
                Ok(true) => {}
                Ok(false) => break,
                Err(ControllerError::Recording(RecordingError::NothingToSave)) => {
                    warn!("Nothing has been recorded yet")
                }
                Err(e) => error!(err = %e, "Error applying event"),
            }
        }

        info!("Controller closing.");
        // The driver may be blocked waiting on input, so it isn't waited on after a quit.
        if join_handle.is_finished() {
            match join_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(err = %e, "Event monitor failed"),
                Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            }
        }
    }
}
