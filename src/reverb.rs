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

//! Loads the reverb impulse response once and publishes it for every note that wants
//! reverb. Until loading finishes, or if it fails, reverb is simply unavailable.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::audio::{decode_audio_data_blocking, ConvolutionKernel, DecodeError};
use crate::samples::AssetFetcher;

#[derive(Debug, thiserror::Error)]
pub enum ImpulseResponseError {
    #[error("unable to load impulse response {location}: {source}")]
    Load {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode impulse response {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug)]
enum KernelState {
    Pending,
    Loaded(Arc<ConvolutionKernel>),
    Failed,
}

/// Holds the convolution kernel once it has loaded. Written once, then read-only.
#[derive(Debug, Clone)]
pub struct KernelSlot {
    state: Arc<RwLock<KernelState>>,
}

impl Default for KernelSlot {
    fn default() -> Self {
        KernelSlot::new()
    }
}

impl KernelSlot {
    /// Creates an empty, pending slot.
    pub fn new() -> KernelSlot {
        KernelSlot {
            state: Arc::new(RwLock::new(KernelState::Pending)),
        }
    }

    /// The kernel, if it has loaded.
    pub fn kernel(&self) -> Option<Arc<ConvolutionKernel>> {
        match &*self.state.read() {
            KernelState::Loaded(kernel) => Some(kernel.clone()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        matches!(*self.state.read(), KernelState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.state.read(), KernelState::Failed)
    }

    fn resolve(&self, state: KernelState) {
        let mut current = self.state.write();
        if matches!(*current, KernelState::Pending) {
            *current = state;
        }
    }
}

/// Fetches and decodes the impulse response asset.
pub struct ImpulseResponseLoader {
    fetcher: Arc<dyn AssetFetcher>,
    path: PathBuf,
    sample_rate: u32,
}

impl ImpulseResponseLoader {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        path: impl Into<PathBuf>,
        sample_rate: u32,
    ) -> ImpulseResponseLoader {
        ImpulseResponseLoader {
            fetcher,
            path: path.into(),
            sample_rate,
        }
    }

    /// Loads the kernel.
    pub async fn load(&self) -> Result<ConvolutionKernel, ImpulseResponseError> {
        let location = self.fetcher.location(&self.path);
        let bytes = self
            .fetcher
            .fetch(&self.path)
            .await
            .map_err(|source| ImpulseResponseError::Load {
                location: location.clone(),
                source,
            })?;

        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string);
        let buffer = decode_audio_data_blocking(bytes, extension, self.sample_rate)
            .await
            .map_err(|source| ImpulseResponseError::Decode {
                location: location.clone(),
                source,
            })?;

        let kernel = ConvolutionKernel::new(&buffer);
        info!(
            location = %location,
            duration_ms = kernel.duration().as_millis(),
            partitions = kernel.partition_count(),
            "Reverb impulse response loaded"
        );
        Ok(kernel)
    }

    /// Loads the kernel into the slot. On failure the slot is marked failed and reverb
    /// stays unavailable for the rest of the session.
    pub async fn load_into(&self, slot: &KernelSlot) -> Result<(), ImpulseResponseError> {
        match self.load().await {
            Ok(kernel) => {
                slot.resolve(KernelState::Loaded(Arc::new(kernel)));
                Ok(())
            }
            Err(e) => {
                error!(err = e.to_string(), "Reverb will be unavailable");
                slot.resolve(KernelState::Failed);
                Err(e)
            }
        }
    }

    /// Loads the kernel in the background.
    pub fn spawn(self, slot: KernelSlot) -> JoinHandle<()> {
        tokio::spawn(async move {
            // Failures are already logged and recorded in the slot.
            let _ = self.load_into(&slot).await;
        })
    }
}
