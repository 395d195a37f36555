//! Device Session Manager
//!
//! Owns the device snapshot and the (single) open input session.
//!
//! State machine: `Disabled -> Scanning -> Connected -> Disabled`. Only
//! `Connected` has a live producer. A session is always closed before a new
//! one is opened, so two producers never run at the same time.

use super::backend::{AudioBackend, DeviceDescriptor, InputSession, SampleSink, StreamSettings};
use crate::error::{AudioError, Result};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default interval between device re-scans
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session open
    Disabled,
    /// Enumeration or open in progress
    Scanning,
    /// Input session open, producer active
    Connected,
}

/// How a device is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Position in the current device snapshot
    Index(usize),
    /// Exact device name
    Name(String),
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{}", i),
            Self::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Enumerates, opens and closes the audio input stream
pub struct DeviceSessionManager {
    backend: Box<dyn AudioBackend>,
    sink: Arc<dyn SampleSink>,
    settings: StreamSettings,
    devices: Arc<[DeviceDescriptor]>,
    session: Option<Box<dyn InputSession>>,
    connected: Option<DeviceDescriptor>,
    preferred: Option<String>,
    state: SessionState,
    enabled: bool,
    rescan_interval: Duration,
    last_scan: Option<Instant>,
}

impl DeviceSessionManager {
    /// Create a manager. Sample blocks of every session go to `sink`.
    pub fn new(
        backend: Box<dyn AudioBackend>,
        sink: Arc<dyn SampleSink>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            backend,
            sink,
            settings,
            devices: Arc::from(Vec::new()),
            session: None,
            connected: None,
            preferred: None,
            state: SessionState::Disabled,
            enabled: false,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            last_scan: None,
        }
    }

    /// Replace the device snapshot.
    ///
    /// If the connected device disappeared, the session is closed. It stays
    /// preferred, so `poll` reconnects once it comes back.
    pub fn scan(&mut self) -> Result<()> {
        let previous = self.state;
        self.state = SessionState::Scanning;

        let devices = match self.backend.enumerate_devices() {
            Ok(devices) => devices,
            Err(e) => {
                self.state = previous;
                return Err(e);
            }
        };
        self.devices = Arc::from(devices);
        self.state = previous;

        debug!("Device scan found {} device(s)", self.devices.len());
        for device in self.devices.iter().filter(|d| d.is_input()) {
            debug!("  {}", device);
        }

        if let Some(connected) = self.connected.clone() {
            match self.find_by_name(&connected.name) {
                Some(current) => {
                    // Indices shift when other devices come and go
                    self.connected = Some(current);
                }
                None => {
                    warn!("Audio device '{}' disappeared, disconnecting", connected.name);
                    self.disconnect();
                }
            }
        }
        Ok(())
    }

    fn find_by_name(&self, name: &str) -> Option<DeviceDescriptor> {
        self.devices.iter().find(|d| d.name == name).cloned()
    }

    /// Resolve a selector to an input-capable device in the current snapshot
    pub fn resolve(&self, selector: &DeviceSelector) -> Result<DeviceDescriptor> {
        let device = match selector {
            DeviceSelector::Index(index) => {
                self.devices
                    .get(*index)
                    .cloned()
                    .ok_or(AudioError::InvalidDeviceIndex {
                        index: *index,
                        count: self.devices.len(),
                    })?
            }
            DeviceSelector::Name(name) => self
                .devices
                .iter()
                .find(|d| &d.name == name && d.is_input())
                .cloned()
                .ok_or_else(|| AudioError::DeviceNotFound(name.clone()))?,
        };
        if !device.is_input() {
            return Err(AudioError::NoInputChannels(device.name));
        }
        Ok(device)
    }

    /// Open a session on the selected device, closing any open one first.
    ///
    /// An invalid selector fails before anything is closed, so the current
    /// state is kept. A failed open leaves the manager `Disabled`.
    pub fn connect(&mut self, selector: &DeviceSelector) -> Result<()> {
        let device = match self.resolve(selector) {
            Ok(device) => device,
            Err(e) => {
                error!("Cannot connect to audio device {}: {}", selector, e);
                return Err(e);
            }
        };

        self.disconnect();
        self.state = SessionState::Scanning;

        match self
            .backend
            .open_input(&device, &self.settings, self.sink.clone())
        {
            Ok(session) => {
                info!("Audio input connected: {}", device);
                self.preferred = Some(device.name.clone());
                self.session = Some(session);
                self.connected = Some(device);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                error!("Failed to open audio device '{}': {}", device.name, e);
                self.state = SessionState::Disabled;
                Err(e)
            }
        }
    }

    /// Close the open session, if any. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop() {
                warn!("Error while stopping audio input: {}", e);
            }
            info!("Audio input closed: {}", session.device().name);
            drop(session);
        }
        self.connected = None;
        self.state = SessionState::Disabled;
    }

    /// Turn capture on or off.
    ///
    /// Enabling connects to the preferred device, or the first input-capable
    /// device when there is no usable preference.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.enabled = enabled;
        if !enabled {
            self.disconnect();
            return Ok(());
        }
        if self.state == SessionState::Connected {
            return Ok(());
        }
        if self.devices.is_empty() {
            self.scan()?;
        }
        let selector = self.reconnect_target().ok_or(AudioError::NoInputDevice)?;
        self.connect(&selector)
    }

    /// Select a device. Connects right away when enabled, otherwise only
    /// remembers it as preferred.
    pub fn select(&mut self, selector: &DeviceSelector) -> Result<()> {
        if self.enabled {
            return self.connect(selector);
        }
        let device = self.resolve(selector)?;
        info!("Preferred audio device set to '{}'", device.name);
        self.preferred = Some(device.name);
        Ok(())
    }

    /// Remember a device name for the next connect without validating it
    pub fn set_preferred(&mut self, name: Option<String>) {
        self.preferred = name;
    }

    fn reconnect_target(&self) -> Option<DeviceSelector> {
        if let Some(name) = &self.preferred {
            if self.devices.iter().any(|d| &d.name == name && d.is_input()) {
                return Some(DeviceSelector::Name(name.clone()));
            }
        }
        self.devices
            .iter()
            .find(|d| d.is_input())
            .map(|d| DeviceSelector::Index(d.index))
    }

    /// Periodic housekeeping: re-scan every `rescan_interval` and bring the
    /// preferred device back if it reappeared while disconnected.
    pub fn poll(&mut self, now: Instant) {
        let due = self
            .last_scan
            .map_or(true, |last| now.saturating_duration_since(last) >= self.rescan_interval);
        if !due {
            return;
        }
        self.last_scan = Some(now);

        if let Err(e) = self.scan() {
            warn!("Periodic device scan failed: {}", e);
            return;
        }

        if self.enabled && self.state == SessionState::Disabled {
            if let Some(name) = self.preferred.clone() {
                if self.find_by_name(&name).is_some_and(|d| d.is_input()) {
                    info!("Preferred audio device '{}' is back, reconnecting", name);
                    if let Err(e) = self.connect(&DeviceSelector::Name(name)) {
                        debug!("Reconnect failed: {}", e);
                    }
                }
            }
        }
    }

    /// Set the re-scan interval
    pub fn set_rescan_interval(&mut self, interval: Duration) {
        self.rescan_interval = interval;
    }

    /// Change stream settings for the next session
    pub fn set_stream_settings(&mut self, settings: StreamSettings) {
        self.settings = settings;
    }

    /// Stream settings used for new sessions
    pub fn stream_settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Current device snapshot
    pub fn devices(&self) -> Arc<[DeviceDescriptor]> {
        self.devices.clone()
    }

    /// Names of input-capable devices
    pub fn input_device_names(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| d.is_input())
            .map(|d| d.name.clone())
            .collect()
    }

    /// The connected device, if any
    pub fn connected_device(&self) -> Option<&DeviceDescriptor> {
        self.connected.as_ref()
    }

    /// Name of the connected device for display
    pub fn current_device_name(&self) -> String {
        self.connected
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| "No device selected".to_string())
    }

    /// Preferred device name
    pub fn preferred_device(&self) -> Option<&str> {
        self.preferred.as_deref()
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether capture is switched on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for DeviceSessionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}
