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
use std::fmt;
use std::sync::Arc;

use crate::audio::Waveform;
use crate::notes::NoteTable;
use crate::samples::SampleMap;

/// How an instrument produces sound.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentFamily {
    /// A periodic waveform generated at the note's frequency.
    Synthesized(Waveform),
    /// Recorded samples, one per note.
    SampleBased(SampleMap),
}

/// A playable instrument.
#[derive(Debug, Clone)]
pub struct Instrument {
    name: String,
    family: InstrumentFamily,
    notes: Arc<NoteTable>,
}

impl Instrument {
    pub fn new(name: &str, family: InstrumentFamily, notes: Arc<NoteTable>) -> Instrument {
        Instrument {
            name: name.to_string(),
            family,
            notes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &InstrumentFamily {
        &self.family
    }

    pub fn notes(&self) -> &Arc<NoteTable> {
        &self.notes
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.family {
            InstrumentFamily::Synthesized(waveform) => write!(
                f,
                "{} (synth: {}, notes: {})",
                self.name,
                waveform,
                self.notes.name()
            ),
            InstrumentFamily::SampleBased(samples) => write!(
                f,
                "{} (sampler: {} samples in {}, notes: {})",
                self.name,
                samples.len(),
                samples.directory().display(),
                self.notes.name()
            ),
        }
    }
}

/// The instruments available to a session, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Instruments {
    instruments: Vec<Arc<Instrument>>,
}

impl Instruments {
    pub fn new(instruments: Vec<Instrument>) -> Instruments {
        Instruments {
            instruments: instruments.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Instrument>> {
        self.instruments
            .iter()
            .find(|instrument| instrument.name() == name)
            .cloned()
    }

    /// The first configured instrument, selected when a session starts.
    pub fn first(&self) -> Option<Arc<Instrument>> {
        self.instruments.first().cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Instrument>> {
        self.instruments.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.instruments.iter().map(|i| i.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
