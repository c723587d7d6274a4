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
use std::time::Duration;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Frames handed to the resampler at a time.
const RESAMPLE_BLOCK_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
#[error("unable to resample from {from} Hz to {to} Hz")]
pub struct ResamplingFailed {
    pub from: u32,
    pub to: u32,
}

/// Decoded mono audio held in memory. Buffers are shared between voices through an Arc.
#[derive(Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a new buffer from mono samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> AudioBuffer {
        AudioBuffer {
            samples,
            sample_rate,
        }
    }

    /// Creates a mono buffer from interleaved samples by averaging the channels.
    pub fn from_interleaved(
        interleaved: &[f32],
        channel_count: u16,
        sample_rate: u32,
    ) -> AudioBuffer {
        let channels = channel_count.max(1) as usize;
        let samples = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        AudioBuffer {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The playback length of the buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Returns this buffer converted to the target sample rate. The output holds
    /// `ceil(len * target / source)` frames, aligned with the input.
    pub fn resampled(self, target_rate: u32) -> Result<AudioBuffer, ResamplingFailed> {
        if self.sample_rate == target_rate || self.sample_rate == 0 || self.samples.is_empty() {
            return Ok(self);
        }

        let failed = || ResamplingFailed {
            from: self.sample_rate,
            to: target_rate,
        };
        let ratio = target_rate as f64 / self.sample_rate as f64;
        let sinc_params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            oversampling_factor: 128,
            interpolation: SincInterpolationType::Linear,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, sinc_params, RESAMPLE_BLOCK_SIZE, 1)
            .map_err(|_e| failed())?;

        let expected = (self.samples.len() as f64 * ratio).ceil() as usize;
        let delay = resampler.output_delay();
        let mut output = Vec::with_capacity(expected + delay + RESAMPLE_BLOCK_SIZE);

        let mut blocks = self.samples.chunks_exact(RESAMPLE_BLOCK_SIZE);
        for block in &mut blocks {
            let resampled = resampler
                .process(&[block], None)
                .map_err(|_e| failed())?;
            output.extend_from_slice(&resampled[0]);
        }
        let remainder = blocks.remainder();
        if !remainder.is_empty() {
            let resampled = resampler
                .process_partial(Some(&[remainder]), None)
                .map_err(|_e| failed())?;
            output.extend_from_slice(&resampled[0]);
        }

        // Flush whatever is still inside the filter.
        while output.len() < expected + delay {
            let resampled = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|_e| failed())?;
            if resampled[0].is_empty() {
                break;
            }
            output.extend_from_slice(&resampled[0]);
        }

        output.drain(..delay.min(output.len()));
        output.resize(expected, 0.0);

        Ok(AudioBuffer {
            samples: output,
            sample_rate: target_rate,
        })
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("frames", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
