//! Audio driver seam
//!
//! The engine never talks to a platform audio API directly. A backend
//! enumerates devices and opens input sessions; an open session pushes mono
//! sample blocks into a [`SampleSink`] from the driver's own thread.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "audio")]
pub mod cpal_backend;
pub mod mock;

/// Nominal capture sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// One enumerated audio device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Position in the enumerated snapshot
    pub index: usize,
    /// Driver-reported device name
    pub name: String,
    /// Maximum number of input channels
    pub input_channel_count: u16,
    /// Maximum number of output channels
    pub output_channel_count: u16,
}

impl DeviceDescriptor {
    /// Whether the device can be opened for capture
    pub fn is_input(&self) -> bool {
        self.input_channel_count > 0
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (in:{}, out:{})",
            self.index, self.name, self.input_channel_count, self.output_channel_count
        )
    }
}

/// Parameters for opening an input session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Requested sample rate in Hz
    pub sample_rate: u32,
    /// Requested samples per callback
    pub block_size: usize,
    /// Channels delivered to the sink (always mono)
    pub channels: u16,
}

impl StreamSettings {
    /// Mono settings at the nominal sample rate
    pub fn mono(block_size: usize) -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size,
            channels: 1,
        }
    }
}

/// Receives sample blocks from the audio driver thread.
///
/// Implementations must return promptly; the driver imposes a deadline.
pub trait SampleSink: Send + Sync {
    /// A block of mono samples is ready
    fn on_samples_ready(&self, samples: &[f32]);
}

/// An open capture stream. Dropping it closes the stream.
pub trait InputSession {
    /// The device this session captures from
    fn device(&self) -> &DeviceDescriptor;

    /// Stop delivering samples. Called before the session is dropped.
    fn stop(&mut self) -> Result<()>;
}

/// Platform audio binding
pub trait AudioBackend {
    /// Enumerate all devices as a fresh snapshot
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>>;

    /// Open a capture session on `device`, delivering blocks into `sink`
    fn open_input(
        &mut self,
        device: &DeviceDescriptor,
        settings: &StreamSettings,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Box<dyn InputSession>>;
}

/// Average interleaved frames down to mono, reusing `out`'s allocation
pub fn downmix_to_mono(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
