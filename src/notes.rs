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

//! Note tables: the playable notes of an instrument and the keys that trigger them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors raised when a note table violates its uniqueness invariants.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NoteTableError {
    #[error("note table '{table}' defines note '{note}' more than once")]
    DuplicateName { table: String, note: String },

    #[error("note table '{table}' binds key '{key}' to more than one note")]
    DuplicateKey { table: String, key: char },

    #[error("note table '{table}' uses frequency {frequency} Hz for more than one note")]
    DuplicateFrequency { table: String, frequency: f64 },

    #[error("note '{note}' in table '{table}' has invalid frequency {frequency}")]
    InvalidFrequency {
        table: String,
        note: String,
        frequency: f64,
    },
}

/// A single playable note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDefinition {
    /// The note name, e.g. "C3".
    #[serde(rename = "note")]
    pub name: String,
    /// The frequency in Hz.
    pub frequency: f64,
    /// The input key that triggers this note.
    pub key: char,
}

impl NoteDefinition {
    pub fn new(name: &str, frequency: f64, key: char) -> NoteDefinition {
        NoteDefinition {
            name: name.to_string(),
            frequency,
            key,
        }
    }

    /// A note for a frequency no table entry matches. Its name is empty, so it never
    /// resolves to a sample.
    pub fn unresolved(frequency: f64) -> NoteDefinition {
        NoteDefinition {
            name: String::new(),
            frequency,
            key: '\0',
        }
    }
}

impl fmt::Display for NoteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2} Hz, key '{}')",
            self.name, self.frequency, self.key
        )
    }
}

/// A validated set of notes. Names, keys and frequencies are unique within the table.
#[derive(Debug, Clone)]
pub struct NoteTable {
    name: String,
    notes: Vec<NoteDefinition>,
}

impl NoteTable {
    /// Creates a note table, checking that names, keys and frequencies are unique.
    pub fn new(name: &str, notes: Vec<NoteDefinition>) -> Result<NoteTable, NoteTableError> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        let mut frequencies = HashSet::new();

        for note in notes.iter() {
            if !note.frequency.is_finite() || note.frequency <= 0.0 {
                return Err(NoteTableError::InvalidFrequency {
                    table: name.to_string(),
                    note: note.name.clone(),
                    frequency: note.frequency,
                });
            }
            if !names.insert(note.name.as_str()) {
                return Err(NoteTableError::DuplicateName {
                    table: name.to_string(),
                    note: note.name.clone(),
                });
            }
            if !keys.insert(note.key) {
                return Err(NoteTableError::DuplicateKey {
                    table: name.to_string(),
                    key: note.key,
                });
            }
            // Frequencies are compared bit-for-bit, matching the exact lookup below.
            if !frequencies.insert(note.frequency.to_bits()) {
                return Err(NoteTableError::DuplicateFrequency {
                    table: name.to_string(),
                    frequency: note.frequency,
                });
            }
        }

        Ok(NoteTable {
            name: name.to_string(),
            notes,
        })
    }

    /// The name of the table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All notes in table order.
    pub fn notes(&self) -> &[NoteDefinition] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Finds the note bound to the given key.
    pub fn by_key(&self, key: char) -> Option<&NoteDefinition> {
        self.notes.iter().find(|note| note.key == key)
    }

    /// Finds the note with the given name.
    #[cfg(test)]
    pub fn by_name(&self, name: &str) -> Option<&NoteDefinition> {
        self.notes.iter().find(|note| note.name == name)
    }

    /// Finds the note whose frequency is exactly the given frequency. Both sides come
    /// from the same fixed table, so no tolerance is applied.
    pub fn by_frequency(&self, frequency: f64) -> Option<&NoteDefinition> {
        self.notes.iter().find(|note| note.frequency == frequency)
    }
}

impl fmt::Display for NoteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (notes: {}):", self.name, self.notes.len())?;
        for note in self.notes.iter() {
            writeln!(f, "  - {}", note)?;
        }
        Ok(())
    }
}
