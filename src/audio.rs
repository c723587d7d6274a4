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

//! The audio engine: a node graph rendered in fixed-size quanta, plus decoding and the
//! live output stream.

pub mod buffer;
pub mod context;
mod convolver;
pub mod cpal;
mod decode;
pub mod graph;
pub mod node;
pub mod oscillator;

/// The number of frames rendered per graph pass.
pub const RENDER_QUANTUM: usize = 128;

pub use buffer::AudioBuffer;
pub use context::{AudioContext, SharedContext, SinkListener, VoiceId, DEFAULT_MAX_DELAY_TIME};
pub use convolver::ConvolutionKernel;
pub use decode::{decode_audio_data, decode_audio_data_blocking, DecodeError};
pub use graph::{GraphError, NodeId};
pub use node::{AudioParam, NodeDescription, Oversample, Schedule};
pub use oscillator::Waveform;
