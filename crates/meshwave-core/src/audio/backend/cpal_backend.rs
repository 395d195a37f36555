//! cpal-based audio backend
//!
//! Devices are identified by name; indices only describe positions in the
//! snapshot returned by the last enumeration.

use super::{
    downmix_to_mono, AudioBackend, DeviceDescriptor, InputSession, SampleSink, StreamSettings,
};
use crate::error::{AudioError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Audio backend on top of the platform's default cpal host
pub struct CpalBackend {
    host: cpal::Host,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    /// Create a backend on the default host
    pub fn new() -> Self {
        let host = cpal::default_host();
        info!("Using audio host: {:?}", host.id());
        Self { host }
    }

    fn find_device(&self, descriptor: &DeviceDescriptor) -> Result<cpal::Device> {
        let devices: Vec<cpal::Device> = self
            .host
            .devices()
            .map_err(|e| AudioError::EnumerationFailed(e.to_string()))?
            .collect();

        let name_matches = |d: &cpal::Device| d.name().map(|n| n == descriptor.name).unwrap_or(false);

        // Prefer the device at the remembered position when names collide
        let position = if devices.get(descriptor.index).is_some_and(name_matches) {
            Some(descriptor.index)
        } else {
            devices.iter().position(name_matches)
        };
        position
            .and_then(|i| devices.into_iter().nth(i))
            .ok_or_else(|| AudioError::DeviceNotFound(descriptor.name.clone()))
    }
}

fn max_input_channels(device: &cpal::Device) -> u16 {
    device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

fn max_output_channels(device: &cpal::Device) -> u16 {
    device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

impl AudioBackend for CpalBackend {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        let devices = self
            .host
            .devices()
            .map_err(|e| AudioError::EnumerationFailed(e.to_string()))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| DeviceDescriptor {
                index,
                name: device
                    .name()
                    .unwrap_or_else(|_| format!("Unknown device {}", index)),
                input_channel_count: max_input_channels(&device),
                output_channel_count: max_output_channels(&device),
            })
            .collect())
    }

    fn open_input(
        &mut self,
        descriptor: &DeviceDescriptor,
        settings: &StreamSettings,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Box<dyn InputSession>> {
        let device = self.find_device(descriptor)?;

        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::StreamFailed(e.to_string()))?;
        let channels = default_config.channels();
        let sample_format = default_config.sample_format();

        let requested_rate = settings.sample_rate;
        let rate_supported = device
            .supported_input_configs()
            .map(|mut configs| {
                configs.any(|c| {
                    c.channels() == channels
                        && c.sample_format() == sample_format
                        && c.min_sample_rate().0 <= requested_rate
                        && requested_rate <= c.max_sample_rate().0
                })
            })
            .unwrap_or(false);
        let sample_rate = if rate_supported {
            requested_rate
        } else {
            let fallback = default_config.sample_rate().0;
            warn!(
                "Device '{}' does not support {} Hz, using {} Hz",
                descriptor.name, requested_rate, fallback
            );
            fallback
        };

        let block = settings.block_size as u32;
        let buffer_size = match default_config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&block) => {
                cpal::BufferSize::Fixed(block)
            }
            _ => cpal::BufferSize::Default,
        };

        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size,
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, &descriptor.name, settings.block_size, sink)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, &descriptor.name, settings.block_size, sink)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, &descriptor.name, settings.block_size, sink)
            }
            other => Err(AudioError::StreamFailed(format!(
                "Unsupported sample format: {:?}",
                other
            ))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::StreamFailed(e.to_string()))?;

        info!(
            "Audio input opened on '{}': {} Hz, {} channel(s) downmixed to mono, buffer {:?}",
            descriptor.name, sample_rate, channels, config.buffer_size
        );

        Ok(Box::new(CpalSession {
            device: descriptor.clone(),
            stream: Some(stream),
        }))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    device_name: &str,
    block_size: usize,
    sink: Arc<dyn SampleSink>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    // Buffers grow to the driver's block size once, then are reused
    let mut converted: Vec<f32> = Vec::with_capacity(block_size * channels);
    let mut mono: Vec<f32> = Vec::with_capacity(block_size);
    let name = device_name.to_string();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|&s| s.to_sample::<f32>()));
                downmix_to_mono(&converted, channels, &mut mono);
                sink.on_samples_ready(&mono);
            },
            move |err| {
                error!("Audio stream error on '{}': {}", name, err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamFailed(e.to_string()))
}

struct CpalSession {
    device: DeviceDescriptor,
    stream: Option<cpal::Stream>,
}

impl InputSession for CpalSession {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| AudioError::StreamFailed(e.to_string()))?;
        }
        Ok(())
    }
}
