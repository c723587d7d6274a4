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

//! The effect chain. Enabled effects are spliced onto a note's source in a fixed order
//! (reverb, delay, distortion, chorus) no matter when their toggles were flipped.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::audio::{
    AudioContext, AudioParam, ConvolutionKernel, GraphError, NodeId, Oversample, VoiceId, Waveform,
    DEFAULT_MAX_DELAY_TIME,
};

/// Distortion intensity.
pub const DISTORTION_AMOUNT: f64 = 400.0;
/// Number of points in the distortion curve.
pub const DISTORTION_CURVE_LEN: usize = 44100;

pub const ECHO_DELAY_TIME: f64 = 0.5;
pub const ECHO_FEEDBACK: f32 = 0.5;
pub const ECHO_MIX: f32 = 0.5;

pub const CHORUS_DELAY_TIME: f64 = 0.005;
pub const CHORUS_RATE: f64 = 1.5;
/// Peak deviation of the chorus delay time, in seconds.
pub const CHORUS_DEPTH: f32 = 0.002;
pub const CHORUS_GAIN: f32 = 1.0;

/// Echoes are considered inaudible once they fall below this level.
const ECHO_SILENCE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Reverb,
    Delay,
    Distortion,
    Chorus,
}

impl Effect {
    /// All effects in chain order.
    pub const ALL: [Effect; 4] = [
        Effect::Reverb,
        Effect::Delay,
        Effect::Distortion,
        Effect::Chorus,
    ];
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Effect::Reverb => "reverb",
            Effect::Delay => "delay",
            Effect::Distortion => "distortion",
            Effect::Chorus => "chorus",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown effect '{0}'")]
pub struct UnknownEffect(pub String);

impl FromStr for Effect {
    type Err = UnknownEffect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reverb" => Ok(Effect::Reverb),
            "delay" => Ok(Effect::Delay),
            "distortion" => Ok(Effect::Distortion),
            "chorus" => Ok(Effect::Chorus),
            other => Err(UnknownEffect(other.to_string())),
        }
    }
}

/// Which effects are switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectToggles {
    pub reverb: bool,
    pub delay: bool,
    pub distortion: bool,
    pub chorus: bool,
}

impl EffectToggles {
    pub fn is_enabled(&self, effect: Effect) -> bool {
        match effect {
            Effect::Reverb => self.reverb,
            Effect::Delay => self.delay,
            Effect::Distortion => self.distortion,
            Effect::Chorus => self.chorus,
        }
    }

    /// Flips an effect and returns its new state.
    pub fn toggle(&mut self, effect: Effect) -> bool {
        let flag = match effect {
            Effect::Reverb => &mut self.reverb,
            Effect::Delay => &mut self.delay,
            Effect::Distortion => &mut self.distortion,
            Effect::Chorus => &mut self.chorus,
        };
        *flag = !*flag;
        *flag
    }

    /// The enabled effects, in chain order.
    pub fn enabled(&self) -> Vec<Effect> {
        Effect::ALL
            .into_iter()
            .filter(|effect| self.is_enabled(*effect))
            .collect()
    }
}

impl fmt::Display for EffectToggles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enabled = self.enabled();
        if enabled.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<String> = enabled.iter().map(Effect::to_string).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Computes the soft-clipping curve used for distortion. Values are computed in double
/// precision and stored as f32, so repeated calls are bit-identical.
pub fn distortion_curve(amount: f64) -> Vec<f32> {
    let n = DISTORTION_CURVE_LEN;
    let deg = PI / 180.0;
    (0..n)
        .map(|i| {
            let x = i as f64 * 2.0 / n as f64 - 1.0;
            ((3.0 + amount) * x * 20.0 * deg / (PI + amount * x.abs())) as f32
        })
        .collect()
}

/// The result of building a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    /// The node downstream consumers connect to.
    pub tail: NodeId,
    /// The stages that were spliced in, in order.
    pub stages: Vec<Effect>,
    /// How long the chain keeps sounding after its source stops, in seconds.
    pub tail_seconds: f64,
}

/// Everything a stage needs to splice itself in.
pub struct ChainBuilder<'a> {
    context: &'a mut AudioContext,
    voice: VoiceId,
    kernel: Option<Arc<ConvolutionKernel>>,
    /// Nodes outliving the source, such as the chorus LFO, which are stopped with the voice.
    modulators: Vec<NodeId>,
}

/// A stage either splices itself in and returns the new tail, or is skipped.
struct Spliced {
    tail: NodeId,
    tail_seconds: f64,
}

type Stage = fn(&mut ChainBuilder, NodeId) -> Result<Option<Spliced>, GraphError>;

const STAGES: [(Effect, Stage); 4] = [
    (Effect::Reverb, reverb),
    (Effect::Delay, delay),
    (Effect::Distortion, distortion),
    (Effect::Chorus, chorus),
];

impl<'a> ChainBuilder<'a> {
    pub fn new(
        context: &'a mut AudioContext,
        voice: VoiceId,
        kernel: Option<Arc<ConvolutionKernel>>,
    ) -> ChainBuilder<'a> {
        ChainBuilder {
            context,
            voice,
            kernel,
            modulators: Vec::new(),
        }
    }

    /// Splices the enabled effects onto the input, left to right.
    pub fn build(&mut self, input: NodeId, toggles: &EffectToggles) -> Result<Chain, GraphError> {
        let mut chain = Chain {
            tail: input,
            stages: Vec::new(),
            tail_seconds: 0.0,
        };

        for (effect, stage) in STAGES {
            if !toggles.is_enabled(effect) {
                continue;
            }
            match stage(self, chain.tail)? {
                Some(spliced) => {
                    chain.tail = spliced.tail;
                    chain.tail_seconds += spliced.tail_seconds;
                    chain.stages.push(effect);
                }
                None => debug!(effect = %effect, "Skipping unavailable effect"),
            }
        }

        Ok(chain)
    }
}

/// Builds a chain onto the input node.
pub fn build_chain(
    context: &mut AudioContext,
    voice: VoiceId,
    input: NodeId,
    toggles: &EffectToggles,
    kernel: Option<Arc<ConvolutionKernel>>,
) -> Result<(Chain, Vec<NodeId>), GraphError> {
    let mut builder = ChainBuilder::new(context, voice, kernel);
    let chain = builder.build(input, toggles)?;
    Ok((chain, builder.modulators))
}

fn reverb(builder: &mut ChainBuilder, current: NodeId) -> Result<Option<Spliced>, GraphError> {
    let Some(kernel) = builder.kernel.clone() else {
        return Ok(None);
    };
    let tail_seconds = kernel.duration().as_secs_f64();
    let convolver = builder.context.create_convolver(builder.voice, kernel);
    builder.context.connect(current, convolver)?;
    Ok(Some(Spliced {
        tail: convolver,
        tail_seconds,
    }))
}

fn delay(builder: &mut ChainBuilder, current: NodeId) -> Result<Option<Spliced>, GraphError> {
    let context = &mut *builder.context;
    let voice = builder.voice;

    let delay = context.create_delay(voice, ECHO_DELAY_TIME, DEFAULT_MAX_DELAY_TIME);
    let feedback = context.create_gain(voice, ECHO_FEEDBACK);
    let mix = context.create_gain(voice, ECHO_MIX);

    context.connect(current, delay)?;
    context.connect(delay, feedback)?;
    context.connect(feedback, delay)?;
    // The echo tail goes straight to the monitor, bypassing later stages.
    context.connect(feedback, context.destination())?;
    context.connect(current, mix)?;

    // Repeats fall by the feedback gain every delay period.
    let repeats = (ECHO_SILENCE.ln() / (ECHO_FEEDBACK as f64).ln()).ceil();
    Ok(Some(Spliced {
        tail: mix,
        tail_seconds: ECHO_DELAY_TIME * repeats,
    }))
}

fn distortion(builder: &mut ChainBuilder, current: NodeId) -> Result<Option<Spliced>, GraphError> {
    let curve = Arc::new(distortion_curve(DISTORTION_AMOUNT));
    let shaper = builder
        .context
        .create_wave_shaper(builder.voice, curve, Oversample::X4);
    builder.context.connect(current, shaper)?;
    Ok(Some(Spliced {
        tail: shaper,
        tail_seconds: 0.0,
    }))
}

fn chorus(builder: &mut ChainBuilder, current: NodeId) -> Result<Option<Spliced>, GraphError> {
    let context = &mut *builder.context;
    let voice = builder.voice;

    let delay = context.create_delay(voice, CHORUS_DELAY_TIME, DEFAULT_MAX_DELAY_TIME);
    let lfo = context.create_oscillator(voice, Waveform::Sine, CHORUS_RATE);
    let depth = context.create_gain(voice, CHORUS_DEPTH);
    let gain = context.create_gain(voice, CHORUS_GAIN);

    context.connect(lfo, depth)?;
    context.connect_param(depth, delay, AudioParam::DelayTime)?;
    context.connect(current, delay)?;
    context.connect(delay, gain)?;
    context.start(lfo, context.current_time())?;
    builder.modulators.push(lfo);

    Ok(Some(Spliced {
        tail: gain,
        tail_seconds: CHORUS_DELAY_TIME + CHORUS_DEPTH as f64,
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::{AudioBuffer, NodeDescription};

    fn kernel() -> Arc<ConvolutionKernel> {
        let impulse = AudioBuffer::new(vec![1.0, 0.5, 0.25], 44100);
        Arc::new(ConvolutionKernel::new(&impulse))
    }

    /// Follows the chain from a node, returning the description of each hop.
    fn describe_outputs(context: &AudioContext, node: NodeId) -> Vec<NodeDescription> {
        context
            .graph()
            .outputs(node)
            .into_iter()
            .filter_map(|id| context.describe(id))
            .collect()
    }

    #[test]
    fn test_distortion_curve_is_deterministic() {
        let a = distortion_curve(DISTORTION_AMOUNT);
        let b = distortion_curve(DISTORTION_AMOUNT);

        assert_eq!(DISTORTION_CURVE_LEN, a.len());
        assert!(a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn test_distortion_curve_formula() {
        let curve = distortion_curve(400.0);
        let deg = PI / 180.0;
        for i in [0usize, 1, 11025, 22050, 30000, 44099] {
            let x = i as f64 * 2.0 / 44100.0 - 1.0;
            let expected = (403.0 * x * 20.0 * deg / (PI + 400.0 * x.abs())) as f32;
            assert_eq!(expected.to_bits(), curve[i].to_bits(), "index {}", i);
        }
        assert_eq!(0.0, curve[22050]);
        assert!(curve[0] < 0.0);
        assert!(curve[44099] > 0.0);
    }

    #[test]
    fn test_effect_names() {
        assert_eq!(Ok(Effect::Chorus), "Chorus".parse());
        assert_eq!(
            Err(UnknownEffect("flanger".to_string())),
            "flanger".parse::<Effect>()
        );
        assert_eq!("distortion", Effect::Distortion.to_string());
    }

    #[test]
    fn test_order_is_fixed_regardless_of_toggle_order() -> Result<(), GraphError> {
        let mut a = EffectToggles::default();
        for effect in [Effect::Chorus, Effect::Distortion, Effect::Delay, Effect::Reverb] {
            a.toggle(effect);
        }
        let mut b = EffectToggles::default();
        for effect in Effect::ALL {
            b.toggle(effect);
        }
        assert_eq!(a, b);

        let mut context = AudioContext::new(44100);
        let voice = context.begin_voice();
        let source = context.create_oscillator(voice, Waveform::Sine, 440.0);
        let (chain, modulators) = build_chain(&mut context, voice, source, &a, Some(kernel()))?;

        assert_eq!(Effect::ALL.to_vec(), chain.stages);
        assert_eq!(1, modulators.len());

        // Walk the primary path: source -> convolver -> mix gain -> shaper -> chorus delay -> gain.
        let convolver = context.graph().outputs(source)[0];
        assert!(matches!(
            context.describe(convolver),
            Some(NodeDescription::Convolver { .. })
        ));
        let after_reverb = describe_outputs(&context, convolver);
        assert!(after_reverb.contains(&NodeDescription::Gain { gain: ECHO_MIX }));
        assert!(after_reverb.contains(&NodeDescription::Delay {
            delay_time: ECHO_DELAY_TIME,
            max_delay_time: DEFAULT_MAX_DELAY_TIME
        }));

        let tail_inputs = context.graph().audio_inputs(chain.tail);
        assert_eq!(1, tail_inputs.len());
        let chorus_delay = tail_inputs[0];
        assert_eq!(
            Some(NodeDescription::Delay {
                delay_time: CHORUS_DELAY_TIME,
                max_delay_time: DEFAULT_MAX_DELAY_TIME
            }),
            context.describe(chorus_delay)
        );
        let wave_shaper = context.graph().audio_inputs(chorus_delay)[0];
        assert_eq!(
            Some(NodeDescription::WaveShaper {
                curve_len: DISTORTION_CURVE_LEN,
                oversample: Oversample::X4
            }),
            context.describe(wave_shaper)
        );
        Ok(())
    }

    #[test]
    fn test_unloaded_reverb_matches_disabled() -> Result<(), GraphError> {
        let toggles = EffectToggles {
            reverb: true,
            distortion: true,
            ..Default::default()
        };
        let without_reverb = EffectToggles {
            distortion: true,
            ..Default::default()
        };

        let mut a = AudioContext::new(44100);
        let voice_a = a.begin_voice();
        let source_a = a.create_oscillator(voice_a, Waveform::Sine, 440.0);
        let (chain_a, _) = build_chain(&mut a, voice_a, source_a, &toggles, None)?;

        let mut b = AudioContext::new(44100);
        let voice_b = b.begin_voice();
        let source_b = b.create_oscillator(voice_b, Waveform::Sine, 440.0);
        let (chain_b, _) = build_chain(&mut b, voice_b, source_b, &without_reverb, None)?;

        assert_eq!(chain_a, chain_b);
        assert_eq!(vec![Effect::Distortion], chain_a.stages);
        assert_eq!(a.node_count(), b.node_count());
        assert_eq!(
            a.voice_nodes(voice_a)
                .iter()
                .map(|id| a.describe(*id))
                .collect::<Vec<_>>(),
            b.voice_nodes(voice_b)
                .iter()
                .map(|id| b.describe(*id))
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn test_delay_feedback_network() -> Result<(), GraphError> {
        let mut context = AudioContext::new(44100);
        let voice = context.begin_voice();
        let source = context.create_oscillator(voice, Waveform::Sine, 440.0);
        let toggles = EffectToggles {
            delay: true,
            ..Default::default()
        };
        let (chain, _) = build_chain(&mut context, voice, source, &toggles, None)?;

        assert_eq!(
            Some(NodeDescription::Gain { gain: ECHO_MIX }),
            context.describe(chain.tail)
        );
        assert_eq!(vec![source], context.graph().audio_inputs(chain.tail));

        let graph = context.graph();
        let delay = graph
            .outputs(source)
            .into_iter()
            .find(|id| id != &chain.tail)
            .ok_or(GraphError::UnknownNode(source))?;
        let feedback = graph.outputs(delay)[0];
        assert_eq!(
            Some(NodeDescription::Gain {
                gain: ECHO_FEEDBACK
            }),
            context.describe(feedback)
        );
        let mut delay_inputs = vec![source, feedback];
        delay_inputs.sort();
        assert_eq!(delay_inputs, graph.audio_inputs(delay));
        let mut feedback_outputs = vec![delay, context.destination()];
        feedback_outputs.sort();
        assert_eq!(feedback_outputs, graph.outputs(feedback));

        // 0.5^10 is the first repeat under -60dB.
        assert!((chain.tail_seconds - 5.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_chorus_modulates_delay_time() -> Result<(), GraphError> {
        let mut context = AudioContext::new(44100);
        let voice = context.begin_voice();
        let source = context.create_oscillator(voice, Waveform::Sine, 440.0);
        let toggles = EffectToggles {
            chorus: true,
            ..Default::default()
        };
        let (chain, modulators) = build_chain(&mut context, voice, source, &toggles, None)?;

        let delay = context.graph().audio_inputs(chain.tail)[0];
        let depth = context.graph().param_inputs(delay, AudioParam::DelayTime);
        assert_eq!(1, depth.len());
        assert_eq!(
            Some(NodeDescription::Gain { gain: CHORUS_DEPTH }),
            context.describe(depth[0])
        );
        assert_eq!(modulators, context.graph().audio_inputs(depth[0]));
        assert!(matches!(
            context.describe(modulators[0]),
            Some(NodeDescription::Oscillator {
                waveform: Waveform::Sine,
                frequency,
                ..
            }) if frequency == CHORUS_RATE
        ));
        Ok(())
    }

    #[test]
    fn test_no_effects_returns_input() -> Result<(), GraphError> {
        let mut context = AudioContext::new(44100);
        let voice = context.begin_voice();
        let source = context.create_oscillator(voice, Waveform::Sine, 440.0);
        let (chain, modulators) =
            build_chain(&mut context, voice, source, &EffectToggles::default(), None)?;

        assert_eq!(source, chain.tail);
        assert!(chain.stages.is_empty());
        assert!(modulators.is_empty());
        assert_eq!(3, context.node_count());
        Ok(())
    }
}
