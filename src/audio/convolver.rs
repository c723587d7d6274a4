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

//! Uniformly partitioned convolution. The kernel is split into render-quantum sized
//! partitions whose spectra are computed once and shared by every convolver node.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::buffer::AudioBuffer;
use super::RENDER_QUANTUM;

/// Loudness calibration applied to impulse responses, as browsers do by default.
const GAIN_CALIBRATION: f32 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000125;

/// A decoded, normalized impulse response ready for convolution.
pub struct ConvolutionKernel {
    partitions: Vec<Vec<Complex<f32>>>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    duration: Duration,
}

impl ConvolutionKernel {
    /// Builds a kernel from an impulse response already at the context sample rate.
    pub fn new(impulse_response: &AudioBuffer) -> ConvolutionKernel {
        let fft_size = RENDER_QUANTUM * 2;
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let scale = normalization_scale(impulse_response);
        let partitions = impulse_response
            .samples()
            .chunks(RENDER_QUANTUM)
            .map(|chunk| {
                let mut spectrum = vec![Complex::new(0.0, 0.0); fft_size];
                for (bin, &sample) in spectrum.iter_mut().zip(chunk.iter()) {
                    bin.re = sample * scale;
                }
                forward.process(&mut spectrum);
                spectrum
            })
            .collect();

        ConvolutionKernel {
            partitions,
            forward,
            inverse,
            duration: impulse_response.duration(),
        }
    }

    /// The number of render-quantum partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// The length of the reverb tail.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Debug for ConvolutionKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvolutionKernel")
            .field("partitions", &self.partitions.len())
            .field("duration", &self.duration)
            .finish()
    }
}

/// Computes the gain that brings an impulse response to a consistent loudness.
fn normalization_scale(impulse_response: &AudioBuffer) -> f32 {
    let samples = impulse_response.samples();
    if samples.is_empty() {
        return 1.0;
    }

    let power = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
    let power = if power.is_finite() && power >= MIN_POWER {
        power
    } else {
        MIN_POWER
    };

    let mut scale = GAIN_CALIBRATION / power;
    if impulse_response.sample_rate() > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / impulse_response.sample_rate() as f32;
    }
    scale
}

/// Per-node convolution state: a frequency-domain delay line of past input blocks.
pub struct Convolver {
    kernel: Arc<ConvolutionKernel>,
    history: VecDeque<Vec<Complex<f32>>>,
    previous_block: Vec<f32>,
    accumulator: Vec<Complex<f32>>,
}

impl Convolver {
    pub fn new(kernel: Arc<ConvolutionKernel>) -> Convolver {
        let fft_size = RENDER_QUANTUM * 2;
        Convolver {
            history: VecDeque::with_capacity(kernel.partition_count()),
            kernel,
            previous_block: vec![0.0; RENDER_QUANTUM],
            accumulator: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    pub fn kernel(&self) -> &Arc<ConvolutionKernel> {
        &self.kernel
    }

    /// Convolves one render quantum using overlap-save.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let fft_size = RENDER_QUANTUM * 2;
        if self.kernel.partitions.is_empty() {
            output.fill(0.0);
            return;
        }

        let mut spectrum: Vec<Complex<f32>> = self
            .previous_block
            .iter()
            .chain(input.iter())
            .map(|&s| Complex::new(s, 0.0))
            .collect();
        self.kernel.forward.process(&mut spectrum);

        self.history.push_front(spectrum);
        self.history.truncate(self.kernel.partitions.len());

        self.accumulator.fill(Complex::new(0.0, 0.0));
        for (block, partition) in self.history.iter().zip(self.kernel.partitions.iter()) {
            for ((acc, x), h) in self
                .accumulator
                .iter_mut()
                .zip(block.iter())
                .zip(partition.iter())
            {
                *acc += x * h;
            }
        }
        self.kernel.inverse.process(&mut self.accumulator);

        let norm = 1.0 / fft_size as f32;
        for (out, value) in output
            .iter_mut()
            .zip(self.accumulator[RENDER_QUANTUM..].iter())
        {
            *out = value.re * norm;
        }

        self.previous_block.copy_from_slice(input);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Direct-form reference convolution.
    fn convolve(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; signal.len()];
        for (n, out) in out.iter_mut().enumerate() {
            for (k, h) in kernel.iter().enumerate() {
                if k <= n {
                    *out += signal[n - k] * h;
                }
            }
        }
        out
    }

    #[test]
    fn test_matches_direct_convolution() {
        let ir: Vec<f32> = (0..300).map(|i| ((i * 7 % 13) as f32 - 6.0) / 10.0).collect();
        let buffer = AudioBuffer::new(ir.clone(), 44100);
        let scale = normalization_scale(&buffer);
        let kernel = Arc::new(ConvolutionKernel::new(&buffer));
        assert_eq!(3, kernel.partition_count());

        let signal: Vec<f32> = (0..RENDER_QUANTUM * 4)
            .map(|i| ((i * 3 % 11) as f32 - 5.0) / 8.0)
            .collect();
        let scaled_ir: Vec<f32> = ir.iter().map(|h| h * scale).collect();
        let expected = convolve(&signal, &scaled_ir);

        let mut convolver = Convolver::new(kernel);
        let mut actual = Vec::new();
        let mut block = vec![0.0; RENDER_QUANTUM];
        for chunk in signal.chunks(RENDER_QUANTUM) {
            convolver.process(chunk, &mut block);
            actual.extend_from_slice(&block);
        }

        for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
            assert!((e - a).abs() < 1e-4, "sample {}: {} != {}", i, e, a);
        }
    }

    #[test]
    fn test_silent_impulse_response_uses_min_power() {
        let buffer = AudioBuffer::new(vec![0.0; 64], 44100);
        let scale = normalization_scale(&buffer);
        assert!((scale - GAIN_CALIBRATION / MIN_POWER).abs() < 1e-3);
    }
}
