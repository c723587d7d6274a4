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
use std::collections::HashMap;
use std::error::Error;
use std::io;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::audio::Waveform;
use crate::instrument::{Instrument, InstrumentFamily, Instruments};
use crate::notes::{NoteDefinition, NoteTable};
use crate::samples::{AssetFetcher, FetchFuture, SampleMap};

/// A sine synth and a small piano with a single sample for C3. The piano's D3 has no
/// sample.
pub fn test_instruments() -> Result<Instruments, Box<dyn Error>> {
    let oscillator = Arc::new(NoteTable::new(
        "oscillator",
        vec![
            NoteDefinition::new("C4", 261.63, 'a'),
            NoteDefinition::new("A4", 440.0, 'h'),
        ],
    )?);
    let piano = Arc::new(NoteTable::new(
        "piano",
        vec![
            NoteDefinition::new("C3", 130.81, 'd'),
            NoteDefinition::new("D3", 146.83, 'x'),
        ],
    )?);
    Ok(Instruments::new(vec![
        Instrument::new(
            "sine",
            InstrumentFamily::Synthesized(Waveform::Sine),
            oscillator,
        ),
        Instrument::new(
            "piano",
            InstrumentFamily::SampleBased(SampleMap::new("piano", [("C3", "C3vL.wav")])),
            piano,
        ),
    ]))
}

/// A fetcher whose fetches never finish.
pub struct StalledFetcher;

impl AssetFetcher for StalledFetcher {
    fn fetch<'a>(&'a self, _path: &'a Path) -> FetchFuture<'a> {
        Box::pin(std::future::pending())
    }

    fn location(&self, path: &Path) -> String {
        format!("stalled:{}", path.display())
    }
}

/// Encodes interleaved float samples as a 16-bit PCM WAV file in memory.
pub fn wav_bytes(
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(
            Cursor::new(&mut bytes),
            WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )?;
        for sample in samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

/// Calculate RMS (Root Mean Square) of a signal
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Serves assets from memory. Every fetch is counted, which makes it easy to check how
/// many loads were issued.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    assets: HashMap<PathBuf, Vec<u8>>,
    fetches: Mutex<Vec<PathBuf>>,
}

impl MemoryFetcher {
    pub fn new() -> MemoryFetcher {
        MemoryFetcher::default()
    }

    /// Adds an asset.
    pub fn with_asset(mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) -> MemoryFetcher {
        self.assets.insert(path.into(), bytes);
        self
    }

    /// The paths fetched so far, in order.
    pub fn fetches(&self) -> Vec<PathBuf> {
        self.fetches.lock().clone()
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, path: &'a Path) -> FetchFuture<'a> {
        Box::pin(async move {
            self.fetches.lock().push(path.to_path_buf());
            self.assets.get(path).cloned().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                )
            })
        })
    }

    fn location(&self, path: &Path) -> String {
        format!("memory:{}", path.display())
    }
}
