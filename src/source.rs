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

//! Tone sources. Creating a source happens in two steps: preparing the material (which
//! may need to fetch and decode a sample) and instantiating it in the graph. Nothing is
//! added to the graph until the material is ready.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::audio::{AudioBuffer, AudioContext, GraphError, NodeId, VoiceId, Waveform};
use crate::instrument::{Instrument, InstrumentFamily};
use crate::notes::NoteDefinition;
use crate::samples::{SampleError, SampleLoader, SampleMap};

/// Every note sounds for at most this long, in seconds.
pub const NOTE_DURATION: f64 = 1.0;

/// What a source will play.
#[derive(Debug, Clone)]
pub enum SourceMaterial {
    Oscillator { waveform: Waveform, frequency: f64 },
    Sample(Arc<AudioBuffer>),
}

impl SourceMaterial {
    /// How long the source will sound, in seconds.
    pub fn estimated_duration(&self) -> f64 {
        match self {
            SourceMaterial::Oscillator { .. } => NOTE_DURATION,
            SourceMaterial::Sample(buffer) => buffer.duration().as_secs_f64().min(NOTE_DURATION),
        }
    }

    /// Adds the source to the graph, started now and stopped after the note duration.
    pub fn instantiate(
        &self,
        context: &mut AudioContext,
        voice: VoiceId,
    ) -> Result<Source, GraphError> {
        let node = match self {
            SourceMaterial::Oscillator {
                waveform,
                frequency,
            } => context.create_oscillator(voice, *waveform, *frequency),
            SourceMaterial::Sample(buffer) => context.create_buffer_source(voice, buffer.clone()),
        };

        let now = context.current_time();
        context.start(node, now)?;
        context.stop(node, now + NOTE_DURATION)?;

        Ok(Source {
            node,
            duration: self.estimated_duration(),
        })
    }
}

/// A source node in the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Source {
    pub node: NodeId,
    /// Estimated playing time in seconds.
    pub duration: f64,
}

/// Resolves a note to its sample, failing if the instrument has nothing mapped for it.
pub fn resolve_sample(
    samples: &SampleMap,
    note: &str,
    instrument: &str,
) -> Result<PathBuf, SampleError> {
    samples
        .resolve(note)
        .ok_or_else(|| SampleError::MissingSample {
            note: note.to_string(),
            instrument: instrument.to_string(),
        })
}

/// Builds source material for notes.
#[derive(Debug, Clone)]
pub struct ToneSourceFactory {
    loader: SampleLoader,
}

impl ToneSourceFactory {
    pub fn new(loader: SampleLoader) -> ToneSourceFactory {
        ToneSourceFactory { loader }
    }

    /// Prepares the material for a note. Synthesized instruments bind the note's
    /// frequency here; sample-based instruments resolve and load the note's sample.
    pub async fn prepare(
        &self,
        note: &NoteDefinition,
        instrument: &Instrument,
    ) -> Result<SourceMaterial, SampleError> {
        match instrument.family() {
            InstrumentFamily::Synthesized(waveform) => Ok(SourceMaterial::Oscillator {
                waveform: *waveform,
                frequency: note.frequency,
            }),
            InstrumentFamily::SampleBased(samples) => {
                let path = resolve_sample(samples, &note.name, instrument.name())?;
                debug!(note = %note.name, path = ?path, "Resolved sample");
                let buffer = self.loader.load(&path).await?;
                Ok(SourceMaterial::Sample(buffer))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::{NodeDescription, Schedule};
    use crate::notes::NoteTable;
    use crate::testutil::{wav_bytes, MemoryFetcher};

    fn piano(notes: Vec<NoteDefinition>) -> Instrument {
        Instrument::new(
            "piano",
            InstrumentFamily::SampleBased(SampleMap::new("piano", [("C3", "C3vL.wav")])),
            Arc::new(NoteTable::new("piano", notes).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_synth_binds_frequency() -> Result<(), Box<dyn std::error::Error>> {
        let loader = SampleLoader::new(Arc::new(MemoryFetcher::new()), 44100);
        let factory = ToneSourceFactory::new(loader);
        let note = NoteDefinition::new("A4", 440.0, 'h');
        let instrument = Instrument::new(
            "square",
            InstrumentFamily::Synthesized(Waveform::Square),
            Arc::new(NoteTable::new("oscillator", vec![note.clone()])?),
        );

        let material = factory.prepare(&note, &instrument).await?;
        let mut context = AudioContext::new(44100);
        let voice = context.begin_voice();
        let source = material.instantiate(&mut context, voice)?;

        assert_eq!(1.0, source.duration);
        assert_eq!(
            Some(NodeDescription::Oscillator {
                waveform: Waveform::Square,
                frequency: 440.0,
                schedule: Schedule {
                    start: Some(0),
                    stop: Some(44100)
                }
            }),
            context.describe(source.node)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_sample() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let factory = ToneSourceFactory::new(SampleLoader::new(fetcher.clone(), 44100));
        let note = NoteDefinition::new("D3", 146.83, 'x');

        let result = factory.prepare(&note, &piano(vec![note.clone()])).await;

        match result {
            Err(SampleError::MissingSample { note, instrument }) => {
                assert_eq!("D3", note);
                assert_eq!("piano", instrument);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(fetcher.fetches().is_empty());
    }

    #[tokio::test]
    async fn test_long_sample_is_capped() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = wav_bytes(&vec![0.1; 88200], 1, 44100)?;
        let fetcher = Arc::new(MemoryFetcher::new().with_asset("piano/C3vL.wav", bytes));
        let factory = ToneSourceFactory::new(SampleLoader::new(fetcher, 44100));
        let note = NoteDefinition::new("C3", 130.81, 'd');

        let material = factory.prepare(&note, &piano(vec![note.clone()])).await?;
        let mut context = AudioContext::new(44100);
        let voice = context.begin_voice();
        let source = material.instantiate(&mut context, voice)?;

        assert_eq!(1.0, source.duration);
        assert_eq!(
            Some(NodeDescription::BufferSource {
                frames: 88200,
                schedule: Schedule {
                    start: Some(0),
                    stop: Some(44100)
                }
            }),
            context.describe(source.node)
        );
        Ok(())
    }
}
