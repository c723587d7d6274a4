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
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use crate::instrument::Instruments;
use crate::recording::DEFAULT_FILE_NAME;

mod error;
mod instrument;

pub use self::error::ConfigError;
pub use self::instrument::{Instrument, NoteTable, SampleEntry, Source};

/// The built-in configuration. User files and the environment are layered on top.
const DEFAULT_CONFIG: &str = include_str!("config/default.yaml");

/// Environment variables with this prefix override configuration values. Nested keys
/// are separated by a double underscore, e.g. `SYNTHBOARD_RECORDING__FILE_NAME`.
const ENV_PREFIX: &str = "SYNTHBOARD";

const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// A YAML representation of the recording configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Recording {
    /// The name of the saved recording.
    file_name: Option<String>,

    /// How often a data-available event is fired while recording. Zero or unset
    /// captures everything in a single chunk at stop.
    timeslice_ms: Option<u64>,
}

/// The full synthboard configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Synthboard {
    /// The audio context's sample rate.
    sample_rate: Option<u32>,

    /// Assets are resolved relative to this directory.
    asset_root: Option<String>,

    /// The reverb impulse response, relative to the asset root.
    impulse_response: Option<String>,

    #[serde(default)]
    recording: Recording,

    #[serde(default)]
    note_tables: Vec<NoteTable>,

    #[serde(default)]
    instruments: Vec<Instrument>,
}

/// Loads the configuration: built-in defaults, then the optional file, then
/// `SYNTHBOARD_*` environment variables.
pub fn load(path: Option<&Path>) -> Result<Synthboard, ConfigError> {
    let mut builder =
        Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml));
    if let Some(path) = path {
        debug!(path = ?path, "Loading configuration file");
        builder = builder.add_source(File::from(path));
    }

    let synthboard = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<Synthboard>()?;
    synthboard.validate()?;
    Ok(synthboard)
}

impl Synthboard {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate()));
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn asset_root(&self) -> PathBuf {
        PathBuf::from(self.asset_root.as_deref().unwrap_or("."))
    }

    /// The impulse response path relative to the asset root, if reverb is configured.
    pub fn impulse_response(&self) -> Option<PathBuf> {
        self.impulse_response
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    pub fn recording_file_name(&self) -> &str {
        self.recording
            .file_name
            .as_deref()
            .unwrap_or(DEFAULT_FILE_NAME)
    }

    pub fn recording_timeslice(&self) -> Option<Duration> {
        self.recording
            .timeslice_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn note_tables(&self) -> &[NoteTable] {
        &self.note_tables
    }

    /// Validates the note tables and builds the configured instruments, in order.
    pub fn instruments(&self) -> Result<Instruments, ConfigError> {
        let mut tables = HashMap::new();
        for table in self.note_tables.iter() {
            let validated = Arc::new(table.to_note_table()?);
            if tables.insert(table.name().to_string(), validated).is_some() {
                return Err(ConfigError::DuplicateNoteTable(table.name().to_string()));
            }
        }

        let mut names = HashSet::new();
        let mut instruments = Vec::with_capacity(self.instruments.len());
        for instrument in self.instruments.iter() {
            if !names.insert(instrument.name()) {
                return Err(ConfigError::DuplicateInstrument(instrument.name().to_string()));
            }
            instruments.push(instrument.to_instrument(&tables)?);
        }

        if instruments.is_empty() {
            return Err(ConfigError::NoInstruments);
        }
        Ok(Instruments::new(instruments))
    }
}
