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
use std::sync::Arc;

use serde::Deserialize;

use crate::audio::Waveform;
use crate::instrument::InstrumentFamily;
use crate::notes::{NoteDefinition, NoteTable as ValidatedNoteTable};
use crate::samples::SampleMap;

use super::error::ConfigError;

/// A YAML representation of a note table.
#[derive(Deserialize, Clone, Debug)]
pub struct NoteTable {
    /// The name instruments refer to this table by.
    name: String,
    notes: Vec<NoteDefinition>,
}

impl NoteTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates the table.
    pub fn to_note_table(&self) -> Result<ValidatedNoteTable, ConfigError> {
        Ok(ValidatedNoteTable::new(&self.name, self.notes.clone())?)
    }
}

/// A single note to file mapping. Kept as a list entry rather than a map key since note
/// names are case sensitive.
#[derive(Deserialize, Clone, Debug)]
pub struct SampleEntry {
    note: String,
    file: String,
}

/// Where an instrument's sound comes from.
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// A synthesized waveform.
    Synth { waveform: Waveform },
    /// Recorded samples under a directory relative to the asset root.
    Sampler {
        directory: String,
        samples: Vec<SampleEntry>,
    },
}

/// A YAML representation of an instrument.
#[derive(Deserialize, Clone, Debug)]
pub struct Instrument {
    name: String,
    /// The note table this instrument plays.
    notes: String,
    source: Source,
}

impl Instrument {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Converts the configuration into an instrument bound to one of the given tables.
    pub fn to_instrument(
        &self,
        tables: &HashMap<String, Arc<ValidatedNoteTable>>,
    ) -> Result<crate::instrument::Instrument, ConfigError> {
        let notes = tables
            .get(&self.notes)
            .ok_or_else(|| ConfigError::UnknownNoteTable {
                instrument: self.name.clone(),
                table: self.notes.clone(),
            })?;

        let family = match &self.source {
            Source::Synth { waveform } => InstrumentFamily::Synthesized(*waveform),
            Source::Sampler { directory, samples } => {
                let mut seen = HashSet::new();
                if let Some(entry) = samples.iter().find(|entry| !seen.insert(&entry.note)) {
                    return Err(ConfigError::DuplicateSample {
                        instrument: self.name.clone(),
                        note: entry.note.clone(),
                    });
                }
                InstrumentFamily::SampleBased(SampleMap::new(
                    directory,
                    samples
                        .iter()
                        .map(|entry| (entry.note.clone(), entry.file.clone())),
                ))
            }
        };

        Ok(crate::instrument::Instrument::new(
            &self.name,
            family,
            notes.clone(),
        ))
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Result<Instrument, config::ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Instrument>()
    }

    #[test]
    fn test_sampler() -> Result<(), Box<dyn std::error::Error>> {
        let yaml = r#"
            name: guitar
            notes: guitar
            source:
              kind: sampler
              directory: assets/guitar
              samples:
                - { note: "C#6", file: "C#6_s6_01.wav" }
                - { note: "F2", file: "F2_s1_01.wav" }
        "#;

        let instrument = parse(yaml)?;
        let table = Arc::new(ValidatedNoteTable::new(
            "guitar",
            vec![NoteDefinition::new("F2", 87.31, 'w')],
        )?);
        let tables = HashMap::from([("guitar".to_string(), table)]);

        let instrument = instrument.to_instrument(&tables)?;
        let InstrumentFamily::SampleBased(samples) = instrument.family() else {
            panic!("expected a sample-based instrument");
        };
        assert_eq!(2, samples.len());
        assert_eq!(Some("C#6_s6_01.wav"), samples.file_name("C#6"));
        assert_eq!(
            Some(std::path::PathBuf::from("assets/guitar/F2_s1_01.wav")),
            samples.resolve("F2")
        );
        Ok(())
    }

    #[test]
    fn test_duplicate_sample() -> Result<(), Box<dyn std::error::Error>> {
        let instrument = parse(
            r#"
            name: piano
            notes: piano
            source:
              kind: sampler
              directory: assets/piano
              samples:
                - { note: "C3", file: "C3vL.wav" }
                - { note: "C3", file: "C3vH.wav" }
        "#,
        )?;
        let table = Arc::new(ValidatedNoteTable::new(
            "piano",
            vec![NoteDefinition::new("C3", 130.81, 'd')],
        )?);
        let tables = HashMap::from([("piano".to_string(), table)]);

        assert!(matches!(
            instrument.to_instrument(&tables),
            Err(ConfigError::DuplicateSample { instrument, note })
                if instrument == "piano" && note == "C3"
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_note_table() -> Result<(), Box<dyn std::error::Error>> {
        let instrument = parse(
            r#"
            name: organ
            notes: organ
            source: { kind: synth, waveform: sine }
        "#,
        )?;

        let result = instrument.to_instrument(&HashMap::new());
        assert!(matches!(
            result,
            Err(ConfigError::UnknownNoteTable { instrument, table })
                if instrument == "organ" && table == "organ"
        ));
        Ok(())
    }
}
