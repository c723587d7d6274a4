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

//! Processing nodes for the audio graph. Every node renders one mono render quantum
//! at a time into its own output block.

use std::fmt;
use std::sync::Arc;

use super::buffer::AudioBuffer;
use super::convolver::{ConvolutionKernel, Convolver};
use super::oscillator::{Oscillator, Waveform};
use super::RENDER_QUANTUM;

/// An automatable parameter a node exposes to modulation inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioParam {
    Gain,
    DelayTime,
}

impl fmt::Display for AudioParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioParam::Gain => write!(f, "gain"),
            AudioParam::DelayTime => write!(f, "delayTime"),
        }
    }
}

/// An edge in the audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connection {
    /// The source output is mixed into the target's audio input.
    Audio,
    /// The source output is added to the target's parameter value, per sample.
    Param(AudioParam),
}

/// Oversampling applied around the wave shaper's curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oversample {
    None,
    X4,
}

impl Oversample {
    fn factor(&self) -> usize {
        match self {
            Oversample::None => 1,
            Oversample::X4 => 4,
        }
    }
}

/// Start and stop times for source nodes, in frames since the context started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    pub start: Option<u64>,
    pub stop: Option<u64>,
}

impl Schedule {
    fn is_playing(&self, frame: u64) -> bool {
        match self.start {
            Some(start) if frame >= start => self.stop.map_or(true, |stop| frame < stop),
            _ => false,
        }
    }
}

/// A snapshot of a node's configuration, used to inspect built graphs.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeDescription {
    Oscillator {
        waveform: Waveform,
        frequency: f64,
        schedule: Schedule,
    },
    BufferSource {
        frames: usize,
        schedule: Schedule,
    },
    Gain {
        gain: f32,
    },
    Delay {
        delay_time: f64,
        max_delay_time: f64,
    },
    WaveShaper {
        curve_len: usize,
        oversample: Oversample,
    },
    Convolver {
        partitions: usize,
    },
    Destination,
    RecordingSink,
}

struct OscillatorNode {
    oscillator: Oscillator,
    schedule: Schedule,
}

struct BufferSourceNode {
    buffer: Arc<AudioBuffer>,
    position: usize,
    schedule: Schedule,
}

struct GainNode {
    gain: f32,
}

/// A delay line. Delays are read before their input is known for the current quantum,
/// so the delay is never shorter than one render quantum.
struct DelayNode {
    delay_time: f64,
    max_delay_time: f64,
    ring: Vec<f32>,
    write_pos: usize,
}

struct WaveShaperNode {
    curve: Arc<Vec<f32>>,
    oversample: Oversample,
    previous: f32,
}

enum NodeKind {
    Oscillator(OscillatorNode),
    BufferSource(BufferSourceNode),
    Gain(GainNode),
    Delay(DelayNode),
    WaveShaper(WaveShaperNode),
    Convolver(Convolver),
    Destination,
    RecordingSink,
}

/// A node in the audio graph along with its rendered output.
pub struct Node {
    kind: NodeKind,
    output: Vec<f32>,
}

impl Node {
    fn from_kind(kind: NodeKind) -> Node {
        Node {
            kind,
            output: vec![0.0; RENDER_QUANTUM],
        }
    }

    pub fn oscillator(waveform: Waveform, frequency: f64) -> Node {
        Node::from_kind(NodeKind::Oscillator(OscillatorNode {
            oscillator: Oscillator::new(waveform, frequency),
            schedule: Schedule::default(),
        }))
    }

    pub fn buffer_source(buffer: Arc<AudioBuffer>) -> Node {
        Node::from_kind(NodeKind::BufferSource(BufferSourceNode {
            buffer,
            position: 0,
            schedule: Schedule::default(),
        }))
    }

    pub fn gain(gain: f32) -> Node {
        Node::from_kind(NodeKind::Gain(GainNode { gain }))
    }

    pub fn delay(delay_time: f64, max_delay_time: f64, sample_rate: u32) -> Node {
        let max_delay_time = max_delay_time.max(delay_time);
        let capacity = (max_delay_time * sample_rate as f64).ceil() as usize + 2 * RENDER_QUANTUM;
        Node::from_kind(NodeKind::Delay(DelayNode {
            delay_time,
            max_delay_time,
            ring: vec![0.0; capacity],
            write_pos: 0,
        }))
    }

    pub fn wave_shaper(curve: Arc<Vec<f32>>, oversample: Oversample) -> Node {
        Node::from_kind(NodeKind::WaveShaper(WaveShaperNode {
            curve,
            oversample,
            previous: 0.0,
        }))
    }

    pub fn convolver(kernel: Arc<ConvolutionKernel>) -> Node {
        Node::from_kind(NodeKind::Convolver(Convolver::new(kernel)))
    }

    pub fn destination() -> Node {
        Node::from_kind(NodeKind::Destination)
    }

    pub fn recording_sink() -> Node {
        Node::from_kind(NodeKind::RecordingSink)
    }

    /// The most recently rendered block.
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.kind, NodeKind::Delay(_))
    }

    /// The parameter this node accepts modulation for, if any.
    pub fn accepts_param(&self, param: AudioParam) -> bool {
        matches!(
            (&self.kind, param),
            (NodeKind::Gain(_), AudioParam::Gain) | (NodeKind::Delay(_), AudioParam::DelayTime)
        )
    }

    /// Returns the schedule of a source node.
    pub fn schedule_mut(&mut self) -> Option<&mut Schedule> {
        match &mut self.kind {
            NodeKind::Oscillator(osc) => Some(&mut osc.schedule),
            NodeKind::BufferSource(source) => Some(&mut source.schedule),
            _ => None,
        }
    }

    pub fn describe(&self) -> NodeDescription {
        match &self.kind {
            NodeKind::Oscillator(osc) => NodeDescription::Oscillator {
                waveform: osc.oscillator.waveform(),
                frequency: osc.oscillator.frequency(),
                schedule: osc.schedule,
            },
            NodeKind::BufferSource(source) => NodeDescription::BufferSource {
                frames: source.buffer.len(),
                schedule: source.schedule,
            },
            NodeKind::Gain(gain) => NodeDescription::Gain { gain: gain.gain },
            NodeKind::Delay(delay) => NodeDescription::Delay {
                delay_time: delay.delay_time,
                max_delay_time: delay.max_delay_time,
            },
            NodeKind::WaveShaper(shaper) => NodeDescription::WaveShaper {
                curve_len: shaper.curve.len(),
                oversample: shaper.oversample,
            },
            NodeKind::Convolver(convolver) => NodeDescription::Convolver {
                partitions: convolver.kernel().partition_count(),
            },
            NodeKind::Destination => NodeDescription::Destination,
            NodeKind::RecordingSink => NodeDescription::RecordingSink,
        }
    }

    /// Renders one quantum starting at `frame`. `input` is the summed audio input and
    /// `param` the summed modulation for the node's parameter.
    pub(super) fn process(&mut self, frame: u64, sample_rate: u32, input: &[f32], param: &[f32]) {
        let output = &mut self.output;
        match &mut self.kind {
            NodeKind::Oscillator(osc) => {
                for (i, out) in output.iter_mut().enumerate() {
                    *out = if osc.schedule.is_playing(frame + i as u64) {
                        osc.oscillator.next_sample(sample_rate as f64)
                    } else {
                        0.0
                    };
                }
            }
            NodeKind::BufferSource(source) => {
                for (i, out) in output.iter_mut().enumerate() {
                    *out = if source.schedule.is_playing(frame + i as u64) {
                        let sample = source.buffer.samples().get(source.position).copied();
                        source.position += 1;
                        sample.unwrap_or(0.0)
                    } else {
                        0.0
                    };
                }
            }
            NodeKind::Gain(gain) => {
                for ((out, x), p) in output.iter_mut().zip(input).zip(param) {
                    *out = x * (gain.gain + p);
                }
            }
            NodeKind::Delay(delay) => delay.read(sample_rate, param, output),
            NodeKind::WaveShaper(shaper) => shaper.process(input, output),
            NodeKind::Convolver(convolver) => convolver.process(input, output),
            NodeKind::Destination | NodeKind::RecordingSink => output.copy_from_slice(input),
        }
    }

    /// Feeds a delay node's input for the quantum that was just rendered.
    pub(super) fn write_delay_input(&mut self, input: &[f32]) {
        if let NodeKind::Delay(delay) = &mut self.kind {
            delay.write(input);
        }
    }
}

impl DelayNode {
    fn read(&mut self, sample_rate: u32, param: &[f32], output: &mut [f32]) {
        let rate = sample_rate as f64;
        let min_delay = RENDER_QUANTUM as f64;
        let max_delay = (self.max_delay_time * rate).max(min_delay);
        let len = self.ring.len() as isize;

        for (i, (out, p)) in output.iter_mut().zip(param).enumerate() {
            let delay = ((self.delay_time + *p as f64) * rate).clamp(min_delay, max_delay);
            let position = (self.write_pos + i) as f64 - delay;
            let index = position.floor();
            let frac = (position - index) as f32;

            let i0 = (index as isize).rem_euclid(len) as usize;
            let i1 = (index as isize + 1).rem_euclid(len) as usize;
            *out = self.ring[i0] + (self.ring[i1] - self.ring[i0]) * frac;
        }
    }

    fn write(&mut self, input: &[f32]) {
        let len = self.ring.len();
        for (i, sample) in input.iter().enumerate() {
            self.ring[(self.write_pos + i) % len] = *sample;
        }
        self.write_pos = (self.write_pos + input.len()) % len;
    }
}

impl WaveShaperNode {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let factor = self.oversample.factor();
        for (out, x) in output.iter_mut().zip(input) {
            if factor == 1 {
                *out = shape(&self.curve, *x);
            } else {
                // Interpolate up, shape each sub-sample and average back down.
                let mut sum = 0.0;
                for j in 1..=factor {
                    let t = j as f32 / factor as f32;
                    sum += shape(&self.curve, self.previous + (x - self.previous) * t);
                }
                *out = sum / factor as f32;
            }
            self.previous = *x;
        }
    }
}

/// Looks up a curve value, linearly interpolating between adjacent points. Input
/// outside [-1, 1] is clamped to the curve's ends.
fn shape(curve: &[f32], x: f32) -> f32 {
    match curve.len() {
        0 => x,
        1 => curve[0],
        n => {
            let v = (n - 1) as f32 * 0.5 * (x + 1.0);
            if v <= 0.0 {
                curve[0]
            } else if v >= (n - 1) as f32 {
                curve[n - 1]
            } else {
                let k = v.floor() as usize;
                let f = v - k as f32;
                (1.0 - f) * curve[k] + f * curve[k + 1]
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SILENCE: [f32; RENDER_QUANTUM] = [0.0; RENDER_QUANTUM];

    #[test]
    fn test_oscillator_schedule() {
        let mut node = Node::oscillator(Waveform::Square, 100.0);
        node.process(0, 1000, &SILENCE, &SILENCE);
        assert!(node.output().iter().all(|s| *s == 0.0));

        if let Some(schedule) = node.schedule_mut() {
            schedule.start = Some(10);
            schedule.stop = Some(20);
        }
        node.process(0, 1000, &SILENCE, &SILENCE);
        assert!(node.output()[..10].iter().all(|s| *s == 0.0));
        assert!(node.output()[10..20].iter().any(|s| *s != 0.0));
        assert!(node.output()[20..].iter().all(|s| *s == 0.0));

        // Once stopped, later quanta stay silent.
        node.process(RENDER_QUANTUM as u64, 1000, &SILENCE, &SILENCE);
        assert!(node.output().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_buffer_source_plays_once() {
        let buffer = Arc::new(AudioBuffer::new(vec![1.0; 50], 1000));
        let mut node = Node::buffer_source(buffer);
        if let Some(schedule) = node.schedule_mut() {
            schedule.start = Some(0);
        }
        node.process(0, 1000, &SILENCE, &SILENCE);

        assert!(node.output()[..50].iter().all(|s| *s == 1.0));
        assert!(node.output()[50..].iter().all(|s| *s == 0.0));

        node.process(RENDER_QUANTUM as u64, 1000, &SILENCE, &SILENCE);
        assert!(node.output().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_gain_with_modulation() {
        let mut node = Node::gain(0.5);
        let input = [1.0; RENDER_QUANTUM];
        let param = [0.25; RENDER_QUANTUM];
        node.process(0, 44100, &input, &param);
        assert!(node.output().iter().all(|s| *s == 0.75));
        assert!(node.accepts_param(AudioParam::Gain));
        assert!(!node.accepts_param(AudioParam::DelayTime));
    }

    #[test]
    fn test_delay_line() {
        // 200 samples of delay at 1 kHz.
        let mut node = Node::delay(0.2, 1.0, 1000);
        let mut impulse = [0.0; RENDER_QUANTUM];
        impulse[0] = 1.0;

        let mut rendered = Vec::new();
        for block in 0..3 {
            node.process(
                (block * RENDER_QUANTUM) as u64,
                1000,
                &SILENCE,
                &SILENCE,
            );
            rendered.extend_from_slice(node.output());
            node.write_delay_input(if block == 0 { &impulse } else { &SILENCE });
        }

        assert_eq!(1.0, rendered[200]);
        assert_eq!(1.0, rendered.iter().sum::<f32>());
    }

    #[test]
    fn test_delay_is_at_least_one_quantum() {
        let mut node = Node::delay(0.0, 1.0, 1000);
        let mut impulse = [0.0; RENDER_QUANTUM];
        impulse[0] = 1.0;

        node.process(0, 1000, &SILENCE, &SILENCE);
        node.write_delay_input(&impulse);
        node.process(RENDER_QUANTUM as u64, 1000, &SILENCE, &SILENCE);

        assert_eq!(1.0, node.output()[0]);
    }

    #[test]
    fn test_shape_interpolates_and_clamps() {
        let curve = [-1.0, 0.0, 1.0];
        assert_eq!(-1.0, shape(&curve, -1.0));
        assert_eq!(0.0, shape(&curve, 0.0));
        assert_eq!(0.5, shape(&curve, 0.5));
        assert_eq!(1.0, shape(&curve, 4.0));
        assert_eq!(-1.0, shape(&curve, -4.0));
    }

    #[test]
    fn test_wave_shaper_oversampled_identity_curve() {
        let mut node = Node::wave_shaper(Arc::new(vec![-1.0, 1.0]), Oversample::X4);
        let input = [0.5; RENDER_QUANTUM];
        node.process(0, 44100, &input, &SILENCE);

        // The first sample ramps up from the previous (silent) input.
        assert!((node.output()[0] - 0.3125).abs() < 1e-6);
        assert!((node.output()[1] - 0.5).abs() < 1e-6);
    }
}
