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
// The audio context owns the routing graph, the clock, and the two long-lived
// destinations (the monitor output and the recording sink). Per-note nodes are
// grouped into voices and released together once their tails have rung out.
//

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::buffer::AudioBuffer;
use super::convolver::ConvolutionKernel;
use super::graph::{AudioGraph, GraphError, NodeId};
use super::node::{AudioParam, Node, NodeDescription, Oversample};
use super::oscillator::Waveform;
use super::RENDER_QUANTUM;

/// Default maximum delay for delay nodes, in seconds.
pub const DEFAULT_MAX_DELAY_TIME: f64 = 1.0;

/// A context shared between the controller and whatever renders it.
pub type SharedContext = Arc<Mutex<AudioContext>>;

/// Identifies the group of nodes created for one note trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice-{}", self.0)
    }
}

/// Receives every block that reaches the recording sink.
pub trait SinkListener: Send + Sync {
    fn on_block(&self, block: &[f32], sample_rate: u32);
}

struct Voice {
    nodes: Vec<NodeId>,
    release_at: Option<u64>,
}

pub struct AudioContext {
    sample_rate: u32,
    frame: u64,
    graph: AudioGraph,
    destination: NodeId,
    recording_sink: NodeId,
    voices: HashMap<VoiceId, Voice>,
    next_voice: u64,
    sink_listener: Option<Arc<dyn SinkListener>>,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> AudioContext {
        let mut graph = AudioGraph::new(sample_rate);
        let destination = graph.add_node(Node::destination());
        let recording_sink = graph.add_node(Node::recording_sink());

        AudioContext {
            sample_rate,
            frame: 0,
            graph,
            destination,
            recording_sink,
            voices: HashMap::new(),
            next_voice: 0,
            sink_listener: None,
        }
    }

    /// Wraps the context for sharing across tasks and threads.
    pub fn shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The current render position in seconds.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    #[cfg(test)]
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    /// The live monitor output.
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// The free-running sink that feeds recordings.
    pub fn recording_sink(&self) -> NodeId {
        self.recording_sink
    }

    #[cfg(test)]
    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn describe(&self, id: NodeId) -> Option<NodeDescription> {
        self.graph.describe(id)
    }

    pub fn set_sink_listener(&mut self, listener: Option<Arc<dyn SinkListener>>) {
        self.sink_listener = listener;
    }

    /// Starts a new voice. Nodes created for it are removed together.
    pub fn begin_voice(&mut self) -> VoiceId {
        let id = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.voices.insert(
            id,
            Voice {
                nodes: Vec::new(),
                release_at: None,
            },
        );
        id
    }

    /// The nodes belonging to a voice, in creation order.
    pub fn voice_nodes(&self, voice: VoiceId) -> &[NodeId] {
        self.voices
            .get(&voice)
            .map(|voice| voice.nodes.as_slice())
            .unwrap_or(&[])
    }

    #[cfg(test)]
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Schedules the voice's nodes for removal at the given time in seconds.
    pub fn release_voice(&mut self, voice: VoiceId, at: f64) {
        let frame = self.seconds_to_frame(at);
        if let Some(voice) = self.voices.get_mut(&voice) {
            voice.release_at = Some(frame);
        }
    }

    /// Removes a voice and its nodes immediately.
    pub fn discard_voice(&mut self, voice: VoiceId) {
        if let Some(removed) = self.voices.remove(&voice) {
            for node in removed.nodes {
                self.graph.remove_node(node);
            }
        }
    }

    fn add_voice_node(&mut self, voice: VoiceId, node: Node) -> NodeId {
        let id = self.graph.add_node(node);
        if let Some(voice) = self.voices.get_mut(&voice) {
            voice.nodes.push(id);
        }
        id
    }

    pub fn create_oscillator(
        &mut self,
        voice: VoiceId,
        waveform: Waveform,
        frequency: f64,
    ) -> NodeId {
        self.add_voice_node(voice, Node::oscillator(waveform, frequency))
    }

    pub fn create_buffer_source(&mut self, voice: VoiceId, buffer: Arc<AudioBuffer>) -> NodeId {
        self.add_voice_node(voice, Node::buffer_source(buffer))
    }

    pub fn create_gain(&mut self, voice: VoiceId, gain: f32) -> NodeId {
        self.add_voice_node(voice, Node::gain(gain))
    }

    pub fn create_delay(&mut self, voice: VoiceId, delay_time: f64, max_delay_time: f64) -> NodeId {
        let node = Node::delay(delay_time, max_delay_time, self.sample_rate);
        self.add_voice_node(voice, node)
    }

    pub fn create_wave_shaper(
        &mut self,
        voice: VoiceId,
        curve: Arc<Vec<f32>>,
        oversample: Oversample,
    ) -> NodeId {
        self.add_voice_node(voice, Node::wave_shaper(curve, oversample))
    }

    pub fn create_convolver(&mut self, voice: VoiceId, kernel: Arc<ConvolutionKernel>) -> NodeId {
        self.add_voice_node(voice, Node::convolver(kernel))
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.graph.connect(from, to)
    }

    pub fn connect_param(
        &mut self,
        from: NodeId,
        to: NodeId,
        param: AudioParam,
    ) -> Result<(), GraphError> {
        self.graph.connect_param(from, to, param)
    }

    /// Starts a source node at the given time in seconds.
    pub fn start(&mut self, node: NodeId, when: f64) -> Result<(), GraphError> {
        let frame = self.seconds_to_frame(when);
        self.schedule(node, |schedule| schedule.start = Some(frame))
    }

    /// Stops a source node at the given time in seconds.
    pub fn stop(&mut self, node: NodeId, when: f64) -> Result<(), GraphError> {
        let frame = self.seconds_to_frame(when);
        self.schedule(node, |schedule| schedule.stop = Some(frame))
    }

    fn schedule(
        &mut self,
        node: NodeId,
        update: impl FnOnce(&mut super::node::Schedule),
    ) -> Result<(), GraphError> {
        let schedule = self
            .graph
            .node_mut(node)
            .ok_or(GraphError::UnknownNode(node))?
            .schedule_mut()
            .ok_or(GraphError::UnknownNode(node))?;
        update(schedule);
        Ok(())
    }

    fn seconds_to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Renders one quantum and returns the monitor output. The recording sink's block is
    /// handed to the sink listener, if any.
    pub fn render_quantum(&mut self) -> Result<&[f32], GraphError> {
        self.graph.process(self.frame)?;
        self.frame += RENDER_QUANTUM as u64;

        if let Some(listener) = &self.sink_listener {
            if let Some(block) = self.graph.output(self.recording_sink) {
                listener.on_block(block, self.sample_rate);
            }
        }

        self.release_finished_voices();

        self.graph
            .output(self.destination)
            .ok_or(GraphError::UnknownNode(self.destination))
    }

    /// Renders at least the given number of seconds, returning the monitor output.
    pub fn render_seconds(&mut self, seconds: f64) -> Result<Vec<f32>, GraphError> {
        let frames = (seconds.max(0.0) * self.sample_rate as f64).ceil() as usize;
        let quanta = frames.div_ceil(RENDER_QUANTUM);
        let mut output = Vec::with_capacity(quanta * RENDER_QUANTUM);
        for _ in 0..quanta {
            output.extend_from_slice(self.render_quantum()?);
        }
        Ok(output)
    }

    fn release_finished_voices(&mut self) {
        let frame = self.frame;
        let finished: Vec<VoiceId> = self
            .voices
            .iter()
            .filter(|(_, voice)| voice.release_at.is_some_and(|at| at <= frame))
            .map(|(id, _)| *id)
            .collect();

        for id in finished {
            if let Some(voice) = self.voices.remove(&id) {
                debug!(voice = %id, nodes = voice.nodes.len(), "Releasing voice");
                for node in voice.nodes {
                    self.graph.remove_node(node);
                }
            }
        }
    }
}
