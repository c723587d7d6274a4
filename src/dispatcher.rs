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

use tracing::{debug, info};

use crate::audio::{AudioContext, ConvolutionKernel, GraphError, NodeId, SharedContext, VoiceId};
use crate::effects::{build_chain, Chain, EffectToggles};
use crate::instrument::{Instrument, Instruments};
use crate::notes::NoteDefinition;
use crate::playsync::CancelHandle;
use crate::reverb::KernelSlot;
use crate::samples::SampleError;
use crate::source::{SourceMaterial, ToneSourceFactory};

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("unknown instrument {0}")]
    UnknownInstrument(String),

    #[error("key '{key}' is not mapped for instrument {instrument}")]
    UnmappedKey { key: char, instrument: String },

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("note was cancelled before it could play")]
    Cancelled,

    #[error("unable to build the note's graph: {0}")]
    Graph(#[from] GraphError),
}

/// The player-facing state of a session: what's selected and which effects are on.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub instrument: String,
    pub effects: EffectToggles,
}

impl SessionState {
    pub fn new(instrument: &str) -> SessionState {
        SessionState {
            instrument: instrument.to_string(),
            effects: EffectToggles::default(),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "instrument: {}, effects: {}",
            self.instrument, self.effects
        )
    }
}

/// A note that made it into the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedNote {
    pub voice: VoiceId,
    pub source: NodeId,
    pub chain: Chain,
    /// When the voice's nodes are released, in seconds of context time.
    pub release_at: f64,
}

/// Turns note triggers into voices in the audio graph.
#[derive(Clone)]
pub struct Dispatcher {
    context: SharedContext,
    instruments: Instruments,
    factory: ToneSourceFactory,
    kernel: KernelSlot,
}

impl Dispatcher {
    pub fn new(
        context: SharedContext,
        instruments: Instruments,
        factory: ToneSourceFactory,
        kernel: KernelSlot,
    ) -> Dispatcher {
        Dispatcher {
            context,
            instruments,
            factory,
            kernel,
        }
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn instruments(&self) -> &Instruments {
        &self.instruments
    }

    fn instrument(&self, session: &SessionState) -> Result<Arc<Instrument>, PlaybackError> {
        self.instruments
            .get(&session.instrument)
            .ok_or_else(|| PlaybackError::UnknownInstrument(session.instrument.clone()))
    }

    /// Plays the note bound to the key on the session's instrument.
    pub async fn trigger_key(
        &self,
        session: &SessionState,
        key: char,
        cancel: &CancelHandle,
    ) -> Result<PlayedNote, PlaybackError> {
        let instrument = self.instrument(session)?;
        let note = instrument
            .notes()
            .by_key(key)
            .cloned()
            .ok_or_else(|| PlaybackError::UnmappedKey {
                key,
                instrument: instrument.name().to_string(),
            })?;
        self.on_note_triggered(&note, &instrument, &session.effects, cancel)
            .await
    }

    /// Plays a frequency on the session's instrument. Sample-based instruments only
    /// play frequencies that exactly match a note in their table.
    pub async fn trigger_frequency(
        &self,
        session: &SessionState,
        frequency: f64,
        cancel: &CancelHandle,
    ) -> Result<PlayedNote, PlaybackError> {
        let instrument = self.instrument(session)?;
        let note = instrument
            .notes()
            .by_frequency(frequency)
            .cloned()
            .unwrap_or_else(|| NoteDefinition::unresolved(frequency));
        self.on_note_triggered(&note, &instrument, &session.effects, cancel)
            .await
    }

    /// Creates the note's source, splices the enabled effects onto it and connects the
    /// result to both the monitor and the recording sink. Nothing is added to the graph
    /// if the source can't be prepared or the note is cancelled first.
    pub async fn on_note_triggered(
        &self,
        note: &NoteDefinition,
        instrument: &Instrument,
        effects: &EffectToggles,
        cancel: &CancelHandle,
    ) -> Result<PlayedNote, PlaybackError> {
        let material = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PlaybackError::Cancelled),
            material = self.factory.prepare(note, instrument) => material?,
        };
        if cancel.is_cancelled() {
            return Err(PlaybackError::Cancelled);
        }

        let kernel = self.kernel.kernel();
        let mut context = self.context.lock();
        let voice = context.begin_voice();
        let played = match assemble(&mut context, voice, &material, effects, kernel) {
            Ok(played) => played,
            Err(e) => {
                context.discard_voice(voice);
                return Err(e.into());
            }
        };

        info!(
            voice = %voice,
            instrument = instrument.name(),
            note = %note.name,
            frequency = note.frequency,
            stages = ?played.chain.stages,
            release_at = played.release_at,
            graph_nodes = context.node_count(),
            "Playing note"
        );
        debug!(
            voice = %voice,
            nodes = ?context
                .voice_nodes(voice)
                .iter()
                .filter_map(|id| context.describe(*id))
                .collect::<Vec<_>>(),
            "Voice graph"
        );
        Ok(played)
    }
}

fn assemble(
    context: &mut AudioContext,
    voice: VoiceId,
    material: &SourceMaterial,
    effects: &EffectToggles,
    kernel: Option<Arc<ConvolutionKernel>>,
) -> Result<PlayedNote, GraphError> {
    let source = material.instantiate(context, voice)?;
    let (chain, modulators) = build_chain(context, voice, source.node, effects, kernel)?;

    let destination = context.destination();
    let recording_sink = context.recording_sink();
    context.connect(chain.tail, destination)?;
    context.connect(chain.tail, recording_sink)?;

    let stop_at = context.current_time() + crate::source::NOTE_DURATION;
    for modulator in modulators {
        context.stop(modulator, stop_at)?;
    }

    let release_at = stop_at + chain.tail_seconds;
    context.release_voice(voice, release_at);

    Ok(PlayedNote {
        voice,
        source: source.node,
        chain,
        release_at,
    })
}
