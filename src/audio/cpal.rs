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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use super::context::SharedContext;
use super::RENDER_QUANTUM;

/// Pulls render quanta out of the shared context and fans the mono signal out to every
/// output channel.
struct Renderer {
    context: SharedContext,
    channels: usize,
    block: Vec<f32>,
    position: usize,
}

impl Renderer {
    fn new(context: SharedContext, channels: u16) -> Renderer {
        Renderer {
            context,
            channels: channels.max(1) as usize,
            block: vec![0.0; RENDER_QUANTUM],
            // Start exhausted so the first callback renders.
            position: RENDER_QUANTUM,
        }
    }

    fn fill(&mut self, data: &mut [f32]) {
        for frame in data.chunks_mut(self.channels) {
            if self.position >= self.block.len() {
                let mut context = self.context.lock();
                match context.render_quantum() {
                    Ok(block) => self.block.copy_from_slice(block),
                    Err(e) => {
                        error!(err = e.to_string(), "Unable to render audio");
                        self.block.fill(0.0);
                    }
                }
                self.position = 0;
            }

            frame.fill(self.block[self.position]);
            self.position += 1;
        }
    }
}

/// f32 callback: render directly into the cpal buffer.
fn create_f32_callback(
    mut renderer: Renderer,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.fill(data)
}

/// Integer callback: render and convert.
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mut renderer: Renderer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut temp = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        temp.resize(data.len(), 0.0f32);
        renderer.fill(&mut temp);
        for (dst, &src) in data.iter_mut().zip(temp.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

/// A live monitor: an output stream on a cpal device that renders the audio context in
/// real time. The stream runs until the monitor is dropped.
pub struct Monitor {
    /// The name of the device.
    name: String,
    /// The number of channels the mono signal is copied to.
    channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    stop: Arc<AtomicBool>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

/// Lists the names of the output devices on the default host.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.output_devices()? {
        match device.name() {
            Ok(name) => names.push(name),
            Err(e) => error!(err = e.to_string(), "Unable to read device name"),
        }
    }
    names.sort();
    Ok(names)
}

impl Monitor {
    /// Starts monitoring on the named output device, or the default output device.
    pub fn start(
        context: SharedContext,
        device_name: Option<&str>,
    ) -> Result<Monitor, Box<dyn Error>> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()?
                .find(|device| device.name().map(|n| n.trim() == name).unwrap_or(false))
                .ok_or_else(|| format!("no device found with name {}", name))?,
            None => host
                .default_output_device()
                .ok_or("no default output device")?,
        };
        let name = device.name()?;

        let default_config = device.default_output_config()?;
        let channels = default_config.channels();
        let sample_format = default_config.sample_format();
        let sample_rate = context.lock().sample_rate();

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        // The stream is created inside the thread, cpal streams aren't Send on every host.
        let stop_for_thread = stop.clone();
        let output_thread = thread::spawn(move || {
            let config = cpal::StreamConfig {
                channels,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            let renderer = Renderer::new(context, channels);
            let on_error = |err: cpal::StreamError| error!("CPAL output stream error: {}", err);

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &config,
                    create_f32_callback(renderer),
                    on_error,
                    None,
                ),
                cpal::SampleFormat::I16 => device.build_output_stream(
                    &config,
                    create_converting_callback::<i16>(renderer),
                    on_error,
                    None,
                ),
                cpal::SampleFormat::I32 => device.build_output_stream(
                    &config,
                    create_converting_callback::<i32>(renderer),
                    on_error,
                    None,
                ),
                other => {
                    let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", other)));
                    return;
                }
            };

            let stream = match stream_result {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to create stream: {}", e)));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start stream: {}", e)));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Keep the stream alive until the monitor is dropped.
            while !stop_for_thread.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err("output thread exited before the stream started".into()),
        }

        let monitor = Monitor {
            name,
            channels,
            host_id: host.id(),
            stop,
            output_thread: Some(output_thread),
        };
        info!(device = %monitor, sample_rate, "CPAL output stream started");
        Ok(monitor)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}
