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

//! On-demand sample loading. Every trigger fetches and decodes its own copy; concurrent
//! triggers of the same note are not de-duplicated.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::error::SampleError;
use super::fetcher::AssetFetcher;
use crate::audio::{decode_audio_data_blocking, AudioBuffer};

/// Fetches and decodes samples for playback at the context sample rate.
#[derive(Clone)]
pub struct SampleLoader {
    fetcher: Arc<dyn AssetFetcher>,
    sample_rate: u32,
}

impl SampleLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, sample_rate: u32) -> SampleLoader {
        SampleLoader {
            fetcher,
            sample_rate,
        }
    }

    /// Loads a sample into memory, resampled to the target rate.
    pub async fn load(&self, path: &Path) -> Result<Arc<AudioBuffer>, SampleError> {
        let location = self.fetcher.location(path);
        debug!(location = %location, "Loading sample");

        let bytes = self
            .fetcher
            .fetch(path)
            .await
            .map_err(|source| SampleError::SampleLoad {
                location: location.clone(),
                source,
            })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string);
        let buffer = decode_audio_data_blocking(bytes, extension, self.sample_rate)
            .await
            .map_err(|source| SampleError::Decode {
                location: location.clone(),
                source,
            })?;

        info!(
            location = %location,
            sample_rate = buffer.sample_rate(),
            duration_ms = buffer.duration().as_millis(),
            "Sample loaded"
        );
        Ok(Arc::new(buffer))
    }
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::testutil::{wav_bytes, MemoryFetcher};

    #[tokio::test]
    async fn test_load_resamples() -> Result<(), Box<dyn std::error::Error>> {
        let bytes = wav_bytes(&vec![0.25; 22050], 1, 22050)?;
        let fetcher = Arc::new(MemoryFetcher::new().with_asset("piano/C3vL.wav", bytes));
        let loader = SampleLoader::new(fetcher, 44100);

        let buffer = loader.load(Path::new("piano/C3vL.wav")).await?;

        assert_eq!(44100, buffer.sample_rate());
        assert_eq!(44100, buffer.len());
        Ok(())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_load_leaves_runtime_free() -> Result<(), Box<dyn std::error::Error>> {
        // Eight seconds at 22.05 kHz, so the decode has real resampling work to do.
        let bytes = wav_bytes(&vec![0.25; 8 * 22050], 1, 22050)?;
        let fetcher = Arc::new(MemoryFetcher::new().with_asset("long.wav", bytes));
        let loader = SampleLoader::new(fetcher, 44100);

        let ran = Arc::new(AtomicBool::new(false));
        let ticker = {
            let ran = ran.clone();
            tokio::spawn(async move { ran.store(true, Ordering::SeqCst) })
        };

        let buffer = loader.load(Path::new("long.wav")).await?;
        assert_eq!(8 * 44100, buffer.len());
        // The only thread of the runtime was free to run other tasks during the decode.
        assert!(ran.load(Ordering::SeqCst));
        ticker.await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_load_errors() {
        let fetcher = Arc::new(MemoryFetcher::new().with_asset("bad.wav", b"nope".to_vec()));
        let loader = SampleLoader::new(fetcher, 44100);

        match loader.load(Path::new("missing.wav")).await {
            Err(SampleError::SampleLoad { location, .. }) => {
                assert_eq!("memory:missing.wav", location)
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            loader.load(Path::new("bad.wav")).await,
            Err(SampleError::Decode { .. })
        ));
    }
}
