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
use petgraph::algo::toposort;
use petgraph::stable_graph::{EdgeReference, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use petgraph::Direction;
use tracing::debug;

use super::node::{AudioParam, Connection, Node, NodeDescription};
use super::RENDER_QUANTUM;

/// A handle to a node in the audio graph.
pub type NodeId = NodeIndex;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GraphError {
    #[error("connecting {from:?} to {to:?} would form a cycle without a delay")]
    Cycle { from: NodeId, to: NodeId },

    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("node {node:?} has no {param} parameter")]
    UnsupportedParam { node: NodeId, param: AudioParam },
}

/// The routing graph. Nodes are rendered in topological order, ignoring audio edges into
/// delay nodes: a delay's output only depends on input it has already seen, which is
/// what makes feedback loops through a delay line legal.
pub struct AudioGraph {
    graph: StableDiGraph<Node, Connection>,
    sample_rate: u32,
    order: Option<Vec<NodeId>>,
    input: Vec<f32>,
    param: Vec<f32>,
}

impl AudioGraph {
    pub fn new(sample_rate: u32) -> AudioGraph {
        AudioGraph {
            graph: StableDiGraph::new(),
            sample_rate,
            order: None,
            input: vec![0.0; RENDER_QUANTUM],
            param: vec![0.0; RENDER_QUANTUM],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.order = None;
        self.graph.add_node(node)
    }

    /// Removes a node and every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.order = None;
        self.graph.remove_node(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains_node(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.graph.node_weight_mut(id)
    }

    pub fn describe(&self, id: NodeId) -> Option<NodeDescription> {
        self.node(id).map(Node::describe)
    }

    /// Connects the output of one node to the audio input of another.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.add_edge(from, to, Connection::Audio)
    }

    /// Connects the output of one node to a parameter of another.
    pub fn connect_param(
        &mut self,
        from: NodeId,
        to: NodeId,
        param: AudioParam,
    ) -> Result<(), GraphError> {
        let target = self.node(to).ok_or(GraphError::UnknownNode(to))?;
        if !target.accepts_param(param) {
            return Err(GraphError::UnsupportedParam { node: to, param });
        }
        self.add_edge(from, to, Connection::Param(param))
    }

    fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        connection: Connection,
    ) -> Result<(), GraphError> {
        for id in [from, to] {
            if !self.contains(id) {
                return Err(GraphError::UnknownNode(id));
            }
        }

        // Connecting the same pair twice is a no-op.
        if self
            .graph
            .edges_connecting(from, to)
            .any(|edge| *edge.weight() == connection)
        {
            return Ok(());
        }

        let edge = self.graph.add_edge(from, to, connection);
        match self.sort() {
            Ok(order) => {
                self.order = Some(order);
                Ok(())
            }
            Err(_) => {
                self.graph.remove_edge(edge);
                Err(GraphError::Cycle { from, to })
            }
        }
    }

    /// Nodes feeding the audio input of the given node.
    #[cfg(test)]
    pub fn audio_inputs(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming, |c| c == Connection::Audio)
    }

    /// Nodes the given node's output is connected to, audio or parameter.
    #[cfg(test)]
    pub fn outputs(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing, |_| true)
    }

    /// Nodes modulating the given parameter of a node.
    #[cfg(test)]
    pub fn param_inputs(&self, id: NodeId, param: AudioParam) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming, |c| c == Connection::Param(param))
    }

    #[cfg(test)]
    fn neighbors(
        &self,
        id: NodeId,
        direction: Direction,
        filter: impl Fn(Connection) -> bool,
    ) -> Vec<NodeId> {
        let mut neighbors: Vec<NodeId> = self
            .graph
            .edges_directed(id, direction)
            .filter(|edge| filter(*edge.weight()))
            .map(|edge| match direction {
                Direction::Incoming => edge.source(),
                Direction::Outgoing => edge.target(),
            })
            .collect();
        neighbors.sort();
        neighbors
    }

    fn sort(&self) -> Result<Vec<NodeId>, petgraph::algo::Cycle<NodeId>> {
        let graph = &self.graph;
        let forward = EdgeFiltered::from_fn(graph, |edge: EdgeReference<Connection>| {
            !(*edge.weight() == Connection::Audio && graph[edge.target()].is_delay())
        });
        toposort(&forward, None)
    }

    fn processing_order(&mut self) -> Result<Vec<NodeId>, GraphError> {
        if let Some(order) = &self.order {
            return Ok(order.clone());
        }

        let order = self.sort().map_err(|cycle| GraphError::Cycle {
            from: cycle.node_id(),
            to: cycle.node_id(),
        })?;
        debug!(nodes = order.len(), "Recomputed processing order");
        self.order = Some(order.clone());
        Ok(order)
    }

    /// Renders one quantum starting at `frame`. Every node's output block is updated.
    pub fn process(&mut self, frame: u64) -> Result<(), GraphError> {
        let order = self.processing_order()?;

        for id in order.iter().copied() {
            let is_delay = self.graph[id].is_delay();
            if !is_delay {
                mix_inputs(&self.graph, id, &mut self.input, |c| c == Connection::Audio);
            }
            mix_inputs(&self.graph, id, &mut self.param, |c| {
                matches!(c, Connection::Param(_))
            });

            let sample_rate = self.sample_rate;
            let node = &mut self.graph[id];
            node.process(frame, sample_rate, &self.input, &self.param);
        }

        // Delay lines take this quantum's input only after everything has rendered.
        let delays: Vec<NodeId> = order
            .into_iter()
            .filter(|id| self.graph[*id].is_delay())
            .collect();
        for id in delays {
            mix_inputs(&self.graph, id, &mut self.input, |c| c == Connection::Audio);
            self.graph[id].write_delay_input(&self.input);
        }

        Ok(())
    }

    /// The last rendered block of a node.
    pub fn output(&self, id: NodeId) -> Option<&[f32]> {
        self.node(id).map(Node::output)
    }
}

/// Sums the outputs of the matching inputs of a node into `block`.
fn mix_inputs(
    graph: &StableDiGraph<Node, Connection>,
    id: NodeId,
    block: &mut [f32],
    filter: impl Fn(Connection) -> bool,
) {
    block.fill(0.0);
    for edge in graph.edges_directed(id, Direction::Incoming) {
        if !filter(*edge.weight()) {
            continue;
        }
        for (sum, sample) in block.iter_mut().zip(graph[edge.source()].output()) {
            *sum += sample;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::oscillator::Waveform;

    fn started(graph: &mut AudioGraph, node: Node) -> NodeId {
        let id = graph.add_node(node);
        if let Some(schedule) = graph.node_mut(id).and_then(Node::schedule_mut) {
            schedule.start = Some(0);
        }
        id
    }

    #[test]
    fn test_gain_chain() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(1000);
        let osc = started(&mut graph, Node::oscillator(Waveform::Square, 10.0));
        let gain = graph.add_node(Node::gain(0.5));
        let out = graph.add_node(Node::destination());
        graph.connect(osc, gain)?;
        graph.connect(gain, out)?;

        graph.process(0)?;

        let osc_out = graph.output(osc).unwrap().to_vec();
        let out = graph.output(out).unwrap();
        for (a, b) in osc_out.iter().zip(out) {
            assert_eq!(a * 0.5, *b);
        }
        Ok(())
    }

    #[test]
    fn test_duplicate_connect_is_ignored() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(1000);
        let gain = graph.add_node(Node::gain(1.0));
        let out = graph.add_node(Node::destination());
        graph.connect(gain, out)?;
        graph.connect(gain, out)?;

        assert_eq!(vec![gain], graph.audio_inputs(out));
        Ok(())
    }

    #[test]
    fn test_cycle_without_delay_is_rejected() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(1000);
        let a = graph.add_node(Node::gain(1.0));
        let b = graph.add_node(Node::gain(1.0));
        graph.connect(a, b)?;

        let cycle = graph.connect(b, a);
        assert_eq!(Err(GraphError::Cycle { from: b, to: a }), cycle);
        assert!(graph.audio_inputs(a).is_empty());
        Ok(())
    }

    #[test]
    fn test_feedback_through_delay_decays() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(1000);
        let source = graph.add_node(Node::buffer_source(std::sync::Arc::new(
            crate::audio::buffer::AudioBuffer::new(vec![1.0], 1000),
        )));
        if let Some(schedule) = graph.node_mut(source).and_then(Node::schedule_mut) {
            schedule.start = Some(0);
        }
        let delay = graph.add_node(Node::delay(0.2, 1.0, 1000));
        let feedback = graph.add_node(Node::gain(0.5));
        let out = graph.add_node(Node::destination());
        graph.connect(source, delay)?;
        graph.connect(delay, feedback)?;
        graph.connect(feedback, delay)?;
        graph.connect(feedback, out)?;

        let mut rendered = Vec::new();
        for block in 0..8 {
            graph.process((block * RENDER_QUANTUM) as u64)?;
            rendered.extend_from_slice(graph.output(out).unwrap());
        }

        assert_eq!(0.5, rendered[200]);
        assert_eq!(0.25, rendered[400]);
        assert_eq!(0.125, rendered[600]);
        Ok(())
    }

    #[test]
    fn test_param_modulation() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(1000);
        let lfo = started(&mut graph, Node::oscillator(Waveform::Square, 1.0));
        let delay = graph.add_node(Node::delay(0.005, 1.0, 1000));
        let out = graph.add_node(Node::destination());

        assert_eq!(
            Err(GraphError::UnsupportedParam {
                node: out,
                param: AudioParam::Gain
            }),
            graph.connect_param(lfo, out, AudioParam::Gain)
        );
        graph.connect_param(lfo, delay, AudioParam::DelayTime)?;

        assert_eq!(vec![lfo], graph.param_inputs(delay, AudioParam::DelayTime));
        assert!(graph.audio_inputs(delay).is_empty());
        assert_eq!(vec![delay], graph.outputs(lfo));
        Ok(())
    }

    #[test]
    fn test_remove_node_drops_edges() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(1000);
        let gain = graph.add_node(Node::gain(1.0));
        let out = graph.add_node(Node::destination());
        graph.connect(gain, out)?;

        graph.remove_node(gain);

        assert_eq!(1, graph.node_count());
        assert!(graph.audio_inputs(out).is_empty());
        graph.process(0)?;
        Ok(())
    }
}
