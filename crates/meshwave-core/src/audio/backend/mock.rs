//! In-process audio backend
//!
//! Simulates a driver: the device list is scripted through a [`MockHandle`],
//! and `push_samples` plays the role of the driver callback, delivering a
//! block to every open session from whatever thread calls it.

use super::{AudioBackend, DeviceDescriptor, InputSession, SampleSink, StreamSettings};
use crate::error::{AudioError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

struct MockDevice {
    name: String,
    input_channels: u16,
    output_channels: u16,
    fail_open: bool,
}

struct ActiveSink {
    session_id: u64,
    device: String,
    sink: Arc<dyn SampleSink>,
}

#[derive(Default)]
struct MockState {
    devices: Vec<MockDevice>,
    fail_enumeration: bool,
    sinks: Vec<ActiveSink>,
    next_session_id: u64,
    open_count: usize,
    last_settings: Option<StreamSettings>,
}

/// Control handle shared between a [`MockBackend`] and the test driving it
#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Plug in a device
    pub fn add_device(&self, name: &str, input_channels: u16, output_channels: u16) {
        self.state.lock().devices.push(MockDevice {
            name: name.to_string(),
            input_channels,
            output_channels,
            fail_open: false,
        });
    }

    /// Unplug a device. Open sessions on it stop receiving samples.
    pub fn remove_device(&self, name: &str) {
        self.state.lock().devices.retain(|d| d.name != name);
    }

    /// Make enumeration fail
    pub fn set_fail_enumeration(&self, fail: bool) {
        self.state.lock().fail_enumeration = fail;
    }

    /// Make opening a specific device fail
    pub fn set_fail_open(&self, name: &str, fail: bool) {
        let mut state = self.state.lock();
        for device in state.devices.iter_mut().filter(|d| d.name == name) {
            device.fail_open = fail;
        }
    }

    /// Deliver a block to every open session on a plugged-in device, returning
    /// how many received it
    pub fn push_samples(&self, samples: &[f32]) -> usize {
        let sinks: Vec<Arc<dyn SampleSink>> = {
            let state = self.state.lock();
            state
                .sinks
                .iter()
                .filter(|s| state.devices.iter().any(|d| d.name == s.device))
                .map(|s| s.sink.clone())
                .collect()
        };
        for sink in &sinks {
            sink.on_samples_ready(samples);
        }
        sinks.len()
    }

    /// Number of currently open sessions
    pub fn active_sessions(&self) -> usize {
        self.state.lock().sinks.len()
    }

    /// Total number of sessions ever opened
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Settings passed to the most recent open
    pub fn last_settings(&self) -> Option<StreamSettings> {
        self.state.lock().last_settings
    }

    fn close_session(&self, session_id: u64) {
        self.state
            .lock()
            .sinks
            .retain(|s| s.session_id != session_id);
    }
}

/// Backend whose devices and sample flow are driven by a [`MockHandle`]
pub struct MockBackend {
    handle: MockHandle,
}

impl MockBackend {
    /// Create a backend with no devices, plus its control handle
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl AudioBackend for MockBackend {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        let state = self.handle.state.lock();
        if state.fail_enumeration {
            return Err(AudioError::EnumerationFailed(
                "mock enumeration failure".to_string(),
            ));
        }
        Ok(state
            .devices
            .iter()
            .enumerate()
            .map(|(index, d)| DeviceDescriptor {
                index,
                name: d.name.clone(),
                input_channel_count: d.input_channels,
                output_channel_count: d.output_channels,
            })
            .collect())
    }

    fn open_input(
        &mut self,
        device: &DeviceDescriptor,
        settings: &StreamSettings,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Box<dyn InputSession>> {
        let mut state = self.handle.state.lock();
        let present = state.devices.iter().find(|d| d.name == device.name);
        match present {
            None => return Err(AudioError::DeviceNotFound(device.name.clone())),
            Some(d) if d.fail_open => {
                return Err(AudioError::StreamFailed(format!(
                    "mock open failure on '{}'",
                    device.name
                )))
            }
            Some(_) => {}
        }

        let session_id = state.next_session_id;
        state.next_session_id += 1;
        state.open_count += 1;
        state.last_settings = Some(*settings);
        state.sinks.push(ActiveSink {
            session_id,
            device: device.name.clone(),
            sink,
        });

        debug!("Mock session {} opened on '{}'", session_id, device.name);

        Ok(Box::new(MockSession {
            session_id,
            device: device.clone(),
            handle: self.handle.clone(),
        }))
    }
}

struct MockSession {
    session_id: u64,
    device: DeviceDescriptor,
    handle: MockHandle,
}

impl InputSession for MockSession {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn stop(&mut self) -> Result<()> {
        self.handle.close_session(self.session_id);
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.handle.close_session(self.session_id);
    }
}
