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

//! Recording of the sink stream. The sink runs for the whole session; the recording
//! session decides which of its blocks are kept.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::SinkListener;

/// The default name of the saved recording.
pub const DEFAULT_FILE_NAME: &str = "composition.wav";

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("nothing has been recorded")]
    NothingToSave,

    #[error("unable to encode recording: {0}")]
    Encode(#[from] hound::Error),

    #[error("unable to write recording: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    Stopped,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "idle"),
            RecordingState::Recording => write!(f, "recording"),
            RecordingState::Stopped => write!(f, "stopped"),
        }
    }
}

/// A block of recorded audio, delivered by one data-available event.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedChunk {
    samples: Vec<f32>,
}

impl RecordedChunk {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A saved recording.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Writes the artifact into the given directory, returning the written path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, RecordingError> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        info!(path = ?path, bytes = self.bytes.len(), "Recording written");
        Ok(path)
    }
}

/// Collects chunks from the recording sink.
#[derive(Debug)]
pub struct RecordingSession {
    state: RecordingState,
    chunks: Vec<RecordedChunk>,
    /// Samples captured since the last data-available event.
    pending: Vec<f32>,
    /// Frames per data-available event. Without one, a single chunk is emitted at stop.
    timeslice: Option<usize>,
    events: usize,
    sample_rate: u32,
    file_name: String,
}

impl RecordingSession {
    pub fn new(sample_rate: u32, timeslice: Option<Duration>, file_name: &str) -> RecordingSession {
        let timeslice = timeslice
            .map(|timeslice| (timeslice.as_secs_f64() * sample_rate as f64).round() as usize)
            .filter(|frames| *frames > 0);

        RecordingSession {
            state: RecordingState::Idle,
            chunks: Vec::new(),
            pending: Vec::new(),
            timeslice,
            events: 0,
            sample_rate,
            file_name: file_name.to_string(),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    #[cfg(test)]
    pub fn chunks(&self) -> &[RecordedChunk] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The number of data-available events fired since recording last started.
    pub fn events_fired(&self) -> usize {
        self.events
    }

    /// Total frames kept.
    pub fn recorded_frames(&self) -> usize {
        self.chunks.iter().map(RecordedChunk::len).sum()
    }

    /// Clears any previous recording and starts capturing.
    pub fn start_recording(&mut self) {
        self.chunks.clear();
        self.pending.clear();
        self.events = 0;
        self.state = RecordingState::Recording;
        info!(timeslice_frames = ?self.timeslice, "Recording started");
    }

    /// Flushes captured audio and stops. Does nothing unless recording.
    pub fn stop_recording(&mut self) {
        if self.state != RecordingState::Recording {
            debug!(state = %self.state, "Not recording, ignoring stop");
            return;
        }

        self.data_available();
        self.state = RecordingState::Stopped;
        info!(
            chunks = self.chunks.len(),
            frames = self.recorded_frames(),
            "Recording stopped"
        );
    }

    /// Captures a block from the sink.
    pub fn capture(&mut self, block: &[f32]) {
        if self.state != RecordingState::Recording {
            return;
        }

        self.pending.extend_from_slice(block);
        if let Some(timeslice) = self.timeslice {
            if self.pending.len() >= timeslice {
                self.data_available();
            }
        }
    }

    fn data_available(&mut self) {
        // Empty data never becomes a chunk or an event.
        if self.pending.is_empty() {
            return;
        }

        let samples = std::mem::take(&mut self.pending);
        self.chunks.push(RecordedChunk { samples });
        self.events += 1;
    }

    /// Concatenates the recorded chunks into a mono 16-bit WAV artifact.
    pub fn save(&self) -> Result<Artifact, RecordingError> {
        if self.chunks.is_empty() {
            return Err(RecordingError::NothingToSave);
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for sample in self.chunks.iter().flat_map(|chunk| chunk.samples().iter()) {
                writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
            writer.finalize()?;
        }

        let bytes = cursor.into_inner();
        info!(
            file_name = %self.file_name,
            chunks = self.chunks.len(),
            bytes = bytes.len(),
            "Recording saved"
        );
        Ok(Artifact {
            file_name: self.file_name.clone(),
            bytes,
        })
    }
}

/// A shared recording session that listens to the recording sink.
#[derive(Debug, Clone)]
pub struct RecordingHandle {
    session: Arc<Mutex<RecordingSession>>,
}

impl RecordingHandle {
    pub fn new(session: RecordingSession) -> RecordingHandle {
        RecordingHandle {
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub fn start_recording(&self) {
        self.session.lock().start_recording();
    }

    pub fn stop_recording(&self) {
        self.session.lock().stop_recording();
    }

    pub fn save(&self) -> Result<Artifact, RecordingError> {
        self.session.lock().save()
    }

    pub fn state(&self) -> RecordingState {
        self.session.lock().state()
    }

    pub fn chunk_count(&self) -> usize {
        self.session.lock().chunk_count()
    }

    pub fn events_fired(&self) -> usize {
        self.session.lock().events_fired()
    }

    pub fn recorded_frames(&self) -> usize {
        self.session.lock().recorded_frames()
    }
}

impl SinkListener for RecordingHandle {
    fn on_block(&self, block: &[f32], _sample_rate: u32) {
        self.session.lock().capture(block);
    }
}
