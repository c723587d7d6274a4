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

//! Wires the audio context, recorder, reverb loader and dispatcher together from the
//! configuration.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audio::{AudioContext, SharedContext};
use crate::config::{ConfigError, Synthboard};
use crate::dispatcher::Dispatcher;
use crate::recording::{RecordingHandle, RecordingSession};
use crate::reverb::{ImpulseResponseLoader, KernelSlot};
use crate::samples::{AssetFetcher, SampleLoader};
use crate::source::ToneSourceFactory;

/// A running engine. Must be created inside a tokio runtime, since the impulse response
/// starts loading right away.
pub struct Engine {
    context: SharedContext,
    dispatcher: Dispatcher,
    recording: RecordingHandle,
    kernel: KernelSlot,
    reverb: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new(config: &Synthboard, fetcher: Arc<dyn AssetFetcher>) -> Result<Engine, ConfigError> {
        let instruments = config.instruments()?;
        let sample_rate = config.sample_rate();

        let recording = RecordingHandle::new(RecordingSession::new(
            sample_rate,
            config.recording_timeslice(),
            config.recording_file_name(),
        ));
        let mut context = AudioContext::new(sample_rate);
        context.set_sink_listener(Some(Arc::new(recording.clone())));
        let context = context.shared();

        let kernel = KernelSlot::new();
        let reverb = match config.impulse_response() {
            Some(path) => Some(
                ImpulseResponseLoader::new(fetcher.clone(), path, sample_rate)
                    .spawn(kernel.clone()),
            ),
            None => {
                warn!("No impulse response configured, reverb is unavailable");
                None
            }
        };

        let dispatcher = Dispatcher::new(
            context.clone(),
            instruments,
            ToneSourceFactory::new(SampleLoader::new(fetcher, sample_rate)),
            kernel.clone(),
        );

        info!(
            sample_rate,
            instruments = ?dispatcher.instruments().names(),
            "Engine started"
        );
        Ok(Engine {
            context,
            dispatcher,
            recording,
            kernel,
            reverb,
        })
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn recording(&self) -> &RecordingHandle {
        &self.recording
    }

    #[cfg(test)]
    pub fn kernel(&self) -> &KernelSlot {
        &self.kernel
    }

    /// Waits for the impulse response to finish loading, successfully or not.
    pub async fn reverb_ready(&mut self) {
        if let Some(reverb) = self.reverb.take() {
            if let Err(e) = reverb.await {
                warn!(err = %e, "Impulse response loader stopped unexpectedly");
            }
        }
        if self.kernel.is_failed() {
            warn!("Reverb is unavailable for this session");
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;
    use crate::dispatcher::SessionState;
    use crate::effects::Effect;
    use crate::playsync::CancelHandle;
    use crate::testutil::{wav_bytes, MemoryFetcher};

    fn load_config(yaml: &str) -> Result<Synthboard, Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
        file.write_all(yaml.as_bytes())?;
        Ok(crate::config::load(Some(file.path()))?)
    }

    #[tokio::test]
    async fn test_reverb_after_load() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_config("impulse_response: ir.wav\n")?;
        let ir: Vec<f32> = (0..441).map(|i| 1.0 - i as f32 / 441.0).collect();
        let bytes = wav_bytes(&ir, 1, 44100)?;
        let fetcher = Arc::new(MemoryFetcher::new().with_asset("ir.wav", bytes));

        let mut engine = Engine::new(&config, fetcher)?;
        engine.reverb_ready().await;
        assert!(engine.kernel().kernel().is_some());

        let mut session = SessionState::new("sine");
        session.effects.toggle(Effect::Reverb);
        let played = engine
            .dispatcher()
            .trigger_key(&session, 'h', &CancelHandle::new())
            .await?;
        assert_eq!(vec![Effect::Reverb], played.chain.stages);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_impulse_response() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_config("impulse_response: missing.wav\n")?;
        let mut engine = Engine::new(&config, Arc::new(MemoryFetcher::new()))?;
        engine.reverb_ready().await;
        assert!(engine.kernel().is_failed());

        let mut session = SessionState::new("square");
        session.effects.toggle(Effect::Reverb);
        session.effects.toggle(Effect::Distortion);
        let played = engine
            .dispatcher()
            .trigger_key(&session, 'a', &CancelHandle::new())
            .await?;
        assert_eq!(vec![Effect::Distortion], played.chain.stages);

        // The recorder hears everything the sink hears.
        engine.recording().start_recording();
        engine.context().lock().render_seconds(0.1)?;
        engine.recording().stop_recording();
        assert!(engine.recording().save().is_ok());
        Ok(())
    }
}
