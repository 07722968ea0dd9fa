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
    collections::VecDeque,
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::{thread_priority, AudioError, OutputDevice, StreamFormat};

/// Number of blocks the handle queue holds before writers have to wait.
const QUEUE_BLOCKS: usize = 4;

/// Summary of a cpal output device, as shown by `chopogy devices`.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Queue shared between the writer side and the cpal callback.
struct Queue {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Queue {
    /// Moves as many queued samples as fit into `data`. The shortfall is silence.
    fn fill(&self, data: &mut [f32]) {
        let mut samples = self.samples.lock();
        let available = samples.len().min(data.len());
        for (dst, src) in data.iter_mut().zip(samples.drain(..available)) {
            *dst = src;
        }
        data[available..].fill(0.0);
    }
}

/// An output handle backed by its own cpal stream. Each handle owns a queue
/// that the stream callback drains, so several handles on the same card mix
/// in the host's audio server just like several PCM handles would.
pub struct Output {
    name: String,
    format: StreamFormat,
    queue: Arc<Queue>,
    write_timeout: Duration,
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal, {})", self.name, self.format)
    }
}

/// Integer callback: drain into scratch and convert.
fn integer_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    queue: Arc<Queue>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch = Vec::new();
    let mut promoted = false;
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        if !promoted {
            thread_priority::promote_current_thread(
                thread_priority::audio_thread_priority(),
                thread_priority::rt_audio_enabled(),
            );
            promoted = true;
        }
        scratch.resize(data.len(), 0.0f32);
        queue.fill(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl Output {
    /// Opens a new handle on the named device. Fails if the device can't be
    /// found or the stream can't be built, so misconfiguration surfaces at
    /// startup rather than on the first note.
    pub fn open(name: &str, format: StreamFormat) -> Result<Output, Box<dyn Error>> {
        let device = find_device(name)?;
        let sample_format = device.default_output_config()?.sample_format();

        let queue = Arc::new(Queue {
            samples: Mutex::new(VecDeque::with_capacity(format.block_samples() * QUEUE_BLOCKS)),
            capacity: format.block_samples() * QUEUE_BLOCKS,
            closed: AtomicBool::new(false),
        });

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let output_thread = {
            let queue = queue.clone();
            let name = name.to_string();
            thread::spawn(move || {
                let span = span!(Level::INFO, "cpal output", device = name);
                let _enter = span.enter();

                let config = cpal::StreamConfig {
                    channels: format.channels,
                    sample_rate: cpal::SampleRate(format.sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                };

                let stream_result = match sample_format {
                    cpal::SampleFormat::F32 => {
                        let queue = queue.clone();
                        let mut promoted = false;
                        device.build_output_stream(
                            &config,
                            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                                if !promoted {
                                    thread_priority::promote_current_thread(
                                        thread_priority::audio_thread_priority(),
                                        thread_priority::rt_audio_enabled(),
                                    );
                                    promoted = true;
                                }
                                queue.fill(data);
                            },
                            |err| error!("CPAL output stream error: {}", err),
                            None,
                        )
                    }
                    cpal::SampleFormat::I16 => device.build_output_stream(
                        &config,
                        integer_callback::<i16>(queue.clone()),
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    ),
                    cpal::SampleFormat::I32 => device.build_output_stream(
                        &config,
                        integer_callback::<i32>(queue.clone()),
                        |err| error!("CPAL output stream error: {}", err),
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
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                info!(format = %format, "CPAL output stream started");

                // The stream lives as long as this thread.
                while !queue.closed.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(50));
                }
                debug!("CPAL output stream stopped");
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = output_thread.join();
                return Err(AudioError::Open(name.to_string(), e).into());
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(AudioError::Open(
                    name.to_string(),
                    "output thread exited before starting".to_string(),
                )
                .into());
            }
        }

        Ok(Output {
            name: name.to_string(),
            format,
            queue,
            write_timeout: (format.block_duration() * (QUEUE_BLOCKS as u32 * 4))
                .max(Duration::from_secs(1)),
            output_thread: Mutex::new(Some(output_thread)),
        })
    }
}

impl OutputDevice for Output {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn prepare(&self) -> Result<(), AudioError> {
        if self.queue.closed.load(Ordering::Acquire) {
            return Err(AudioError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn write_block(&self, block: &[f32]) -> Result<usize, AudioError> {
        let channels = self.format.channels.max(1) as usize;
        let poll = self.format.block_duration() / 4;
        let start = Instant::now();
        loop {
            if self.queue.closed.load(Ordering::Acquire) {
                return Err(AudioError::Closed(self.name.clone()));
            }
            {
                let mut samples = self.queue.samples.lock();
                // An empty queue always takes the block, even an oversized one.
                if samples.is_empty() || self.queue.capacity - samples.len() >= block.len() {
                    samples.extend(block.iter().copied());
                    return Ok(block.len() / channels);
                }
            }
            if start.elapsed() > self.write_timeout {
                return Err(AudioError::Timeout(self.name.clone(), self.write_timeout));
            }
            spin_sleep::sleep(poll);
        }
    }

    fn drain(&self) {
        self.queue.samples.lock().clear();
    }

    fn close(&self) {
        self.queue.closed.store(true, Ordering::Release);
        if let Some(handle) = self.output_thread.lock().take() {
            if handle.join().is_err() {
                error!(device = self.name, "CPAL output thread panicked");
            }
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<&super::mock::Output, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.close();
    }
}

/// Enumerates every output-capable device across all cpal hosts.
fn output_devices() -> Result<Vec<(cpal::HostId, cpal::Device, u16)>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs.map(|c| c.channels()).max().unwrap_or(0);
            if max_channels > 0 {
                devices.push((host_id, device, max_channels));
            }
        }
    }
    Ok(devices)
}

/// Lists cpal output devices.
pub fn list() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
    let mut devices = output_devices()?
        .into_iter()
        .filter_map(|(host_id, device, max_channels)| {
            Some(DeviceInfo {
                name: device.name().ok()?,
                host: host_id.name().to_string(),
                max_channels,
            })
        })
        .collect::<Vec<_>>();
    devices.sort_by_key(|device| device.name.to_string());
    Ok(devices)
}

fn find_device(name: &str) -> Result<cpal::Device, Box<dyn Error>> {
    if name == "default" {
        let _shh_stderr = shh::stderr()?;
        return cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::NotFound(name.to_string()).into());
    }
    output_devices()?
        .into_iter()
        .map(|(_, device, _)| device)
        .find(|device| {
            device
                .name()
                .map(|device_name| device_name.trim() == name)
                .unwrap_or(false)
        })
        .ok_or_else(|| AudioError::NotFound(name.to_string()).into())
}
