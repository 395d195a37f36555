//! Audio-reactive modulation engine
//!
//! Ties the pieces together across the two threads involved:
//!
//! - the audio driver thread calls [`SampleSink::on_samples_ready`] on the
//!   shared analysis state (sanitize + transform, under the lock);
//! - the update thread calls [`AudioReactivityEngine::update`] once per frame
//!   (spectrum processing + band aggregation under the lock, then mapping
//!   evaluation and parameter writes after releasing it).
//!
//! One mutex guards everything both threads touch: the working buffer, the
//! spectrum and the band energies. Nothing else is shared.

use crate::audio::analyzer::{
    SpectralAnalyzer, SpectrumFrame, DEFAULT_BLOCK_SIZE, PERFORMANCE_BLOCK_SIZE,
};
use crate::audio::backend::{AudioBackend, DeviceDescriptor, SampleSink, StreamSettings};
use crate::audio::bands::{band_label, default_band_ranges, BandAggregator, BandRange};
use crate::audio::session::{DeviceSelector, DeviceSessionManager, SessionState};
use crate::config::AudioReactivitySettings;
use crate::error::{AudioError, Result};
use crate::mapping::{BandMapping, MappingEvaluator};
use crate::params::ParameterStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default sensitivity gain
pub const DEFAULT_SENSITIVITY: f32 = 1.0;

/// Default smoothing factor
pub const DEFAULT_SMOOTHING: f32 = 0.85;

/// Upper bound for the smoothing factor
pub const MAX_SMOOTHING: f32 = 0.99;

/// Time given to an in-flight audio callback to finish during shutdown
const CALLBACK_DRAIN_DELAY: Duration = Duration::from_millis(100);

struct AnalysisState {
    analyzer: SpectralAnalyzer,
    bands: BandAggregator,
}

/// State shared with the audio driver thread
pub struct SharedAnalysis {
    state: Mutex<AnalysisState>,
}

impl SampleSink for SharedAnalysis {
    fn on_samples_ready(&self, samples: &[f32]) {
        self.state.lock().analyzer.submit_samples(samples);
    }
}

/// Derives band energies from live audio and maps them onto parameters
pub struct AudioReactivityEngine {
    shared: Arc<SharedAnalysis>,
    sessions: DeviceSessionManager,
    mappings: Vec<BandMapping>,
    evaluator: MappingEvaluator,
    /// Consumer-side copy of the smoothed bands, reused every tick
    band_snapshot: Vec<f32>,
    sensitivity: f32,
    smoothing: f32,
    normalization_enabled: bool,
    enabled: bool,
    setup_done: bool,
}

impl AudioReactivityEngine {
    /// Create an engine with default settings on top of `backend`
    pub fn new(backend: Box<dyn AudioBackend>) -> Result<Self> {
        let analyzer = SpectralAnalyzer::new(DEFAULT_BLOCK_SIZE)?;
        let bands = BandAggregator::new(analyzer.usable_bins());
        let shared = Arc::new(SharedAnalysis {
            state: Mutex::new(AnalysisState { analyzer, bands }),
        });

        let sink: Arc<dyn SampleSink> = shared.clone();
        let sessions =
            DeviceSessionManager::new(backend, sink, StreamSettings::mono(DEFAULT_BLOCK_SIZE));

        Ok(Self {
            shared,
            sessions,
            mappings: Vec::new(),
            evaluator: MappingEvaluator::new(),
            band_snapshot: Vec::new(),
            sensitivity: DEFAULT_SENSITIVITY,
            smoothing: DEFAULT_SMOOTHING,
            normalization_enabled: true,
            enabled: false,
            setup_done: false,
        })
    }

    /// Prepare the transform and scan devices.
    ///
    /// Performance mode halves the block size. Opens the input session if
    /// the engine is enabled. Device problems are logged, not returned.
    pub fn setup(&mut self, performance_mode: bool) -> Result<()> {
        let block_size = if performance_mode {
            PERFORMANCE_BLOCK_SIZE
        } else {
            DEFAULT_BLOCK_SIZE
        };
        self.set_block_size(block_size)?;

        if let Err(e) = self.sessions.scan() {
            warn!("Audio device scan failed: {}", e);
        }
        self.setup_done = true;

        info!(
            "Audio reactivity set up: block_size={}, bands={}, mappings={}",
            block_size,
            self.num_bands(),
            self.mappings.len()
        );

        if self.enabled {
            if let Err(e) = self.sessions.set_enabled(true) {
                warn!("Audio input not available: {}", e);
            }
        }
        Ok(())
    }

    fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.analyzer.block_size() == block_size && state.analyzer.is_initialized() {
            return Ok(());
        }

        let analyzer = SpectralAnalyzer::new(block_size)?;
        let old_usable = state.analyzer.usable_bins();
        let new_usable = analyzer.usable_bins();
        state.analyzer = analyzer;

        let num_bands = state.bands.num_bands();
        let was_default = state.bands.ranges() == default_band_ranges(num_bands, old_usable);
        if was_default {
            state.bands = BandAggregator::new(new_usable);
            state.bands.set_default_layout(num_bands)?;
        } else {
            state.bands.set_usable_bins(new_usable);
        }
        drop(state);

        self.sessions
            .set_stream_settings(StreamSettings::mono(block_size));
        debug!("Block size changed to {}", block_size);
        Ok(())
    }

    /// Run one frame: poll devices, analyze, aggregate, apply mappings.
    ///
    /// Returns the number of parameter writes.
    pub fn update(&mut self, store: &mut dyn ParameterStore) -> usize {
        self.update_at(store, Instant::now())
    }

    /// [`update`](Self::update) with an explicit clock, for deterministic polling
    pub fn update_at(&mut self, store: &mut dyn ParameterStore, now: Instant) -> usize {
        if self.setup_done {
            self.sessions.poll(now);
        }
        if !self.enabled {
            return 0;
        }

        {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            state.analyzer.analyze(
                self.sensitivity,
                self.smoothing,
                self.normalization_enabled,
            );
            state
                .bands
                .compute_band_energies(state.analyzer.processed_spectrum(), self.smoothing);

            self.band_snapshot.clear();
            self.band_snapshot
                .extend_from_slice(state.bands.smoothed_bands());
        }

        self.evaluator
            .evaluate(&self.mappings, &self.band_snapshot, store)
    }

    /// Stop capture and release the transform.
    ///
    /// Waits briefly after closing the stream so a callback that was already
    /// running finishes before the transform goes away. No reconnects happen
    /// until `setup` runs again.
    pub fn exit(&mut self) {
        self.setup_done = false;
        self.sessions.disconnect();
        thread::sleep(CALLBACK_DRAIN_DELAY);
        self.shared.state.lock().analyzer.release();
        info!("Audio reactivity shut down");
    }

    /// Sink that feeds samples into this engine, for wiring custom drivers
    pub fn sample_sink(&self) -> Arc<dyn SampleSink> {
        self.shared.clone()
    }

    /// Feed a block of samples directly, as a driver callback would
    pub fn submit_samples(&self, samples: &[f32]) {
        self.shared.on_samples_ready(samples);
    }

    // === Settings ===

    /// Turn audio reactivity on or off. Before `setup`, only the flag changes.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.enabled = enabled;
        if self.setup_done {
            self.sessions.set_enabled(enabled)
        } else {
            Ok(())
        }
    }

    /// Whether audio reactivity is on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Set the sensitivity gain (negative values become 0)
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity.max(0.0);
    }

    /// Sensitivity gain
    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Set the smoothing factor, clamped to `[0, 0.99]`
    pub fn set_smoothing(&mut self, smoothing: f32) {
        if smoothing.is_nan() {
            warn!("Ignoring NaN smoothing factor");
            return;
        }
        self.smoothing = smoothing.clamp(0.0, MAX_SMOOTHING);
    }

    /// Smoothing factor
    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// Enable or disable per-tick peak normalization
    pub fn set_normalization_enabled(&mut self, enabled: bool) {
        self.normalization_enabled = enabled;
    }

    /// Whether normalization is on
    pub fn is_normalization_enabled(&self) -> bool {
        self.normalization_enabled
    }

    // === Bands ===

    /// Switch to the default layout for `num_bands` bands
    pub fn set_num_bands(&mut self, num_bands: usize) -> Result<()> {
        if num_bands == 0 {
            return Err(AudioError::NoBands);
        }
        self.shared.state.lock().bands.set_default_layout(num_bands)
    }

    /// Replace the band ranges; energies restart from zero
    pub fn configure_bands(&mut self, ranges: &[BandRange]) -> Result<()> {
        self.shared.state.lock().bands.configure_bands(ranges)
    }

    /// Number of bands
    pub fn num_bands(&self) -> usize {
        self.shared.state.lock().bands.num_bands()
    }

    /// Current band ranges
    pub fn band_ranges(&self) -> Vec<BandRange> {
        self.shared.state.lock().bands.ranges().to_vec()
    }

    /// Smoothed energy of one band (0 when out of range)
    pub fn band(&self, band: usize) -> f32 {
        self.shared.state.lock().bands.band(band)
    }

    /// Smoothed energies of all bands
    pub fn bands(&self) -> Vec<f32> {
        self.shared.state.lock().bands.smoothed_bands().to_vec()
    }

    /// Unsmoothed energies of the last tick
    pub fn raw_bands(&self) -> Vec<f32> {
        self.shared.state.lock().bands.raw_bands().to_vec()
    }

    /// Display labels of all bands
    pub fn band_labels(&self) -> Vec<String> {
        let n = self.num_bands();
        (0..n).map(|i| band_label(i, n)).collect()
    }

    /// RMS level of the last audio block
    pub fn input_level(&self) -> f32 {
        self.shared.state.lock().analyzer.input_level()
    }

    /// The latest processed spectrum
    pub fn processed_spectrum(&self) -> SpectrumFrame {
        SpectrumFrame::new(self.shared.state.lock().analyzer.processed_spectrum().to_vec())
    }

    /// Transform size in use
    pub fn block_size(&self) -> usize {
        self.shared.state.lock().analyzer.block_size()
    }

    // === Mappings ===

    /// Append a mapping rule
    pub fn add_mapping(&mut self, mapping: BandMapping) {
        self.mappings.push(mapping);
    }

    /// Remove the rule at `index`; out-of-range indices are ignored
    pub fn remove_mapping(&mut self, index: usize) -> Option<BandMapping> {
        if index < self.mappings.len() {
            Some(self.mappings.remove(index))
        } else {
            None
        }
    }

    /// Remove all rules
    pub fn clear_mappings(&mut self) {
        self.mappings.clear();
        self.evaluator.reset_warnings();
    }

    /// Rules in evaluation order
    pub fn mappings(&self) -> &[BandMapping] {
        &self.mappings
    }

    // === Devices ===

    /// Re-enumerate devices now
    pub fn scan_devices(&mut self) -> Result<()> {
        self.sessions.scan()
    }

    /// Current device snapshot
    pub fn devices(&self) -> Arc<[DeviceDescriptor]> {
        self.sessions.devices()
    }

    /// Names of input-capable devices
    pub fn input_device_names(&self) -> Vec<String> {
        self.sessions.input_device_names()
    }

    /// Select an input device (connects when enabled)
    pub fn select_device(&mut self, selector: &DeviceSelector) -> Result<()> {
        self.sessions.select(selector)
    }

    /// Close the input session
    pub fn disconnect(&mut self) {
        self.sessions.disconnect();
    }

    /// Index of the connected device
    pub fn current_device_index(&self) -> Option<usize> {
        self.sessions.connected_device().map(|d| d.index)
    }

    /// Name of the connected device for display
    pub fn current_device_name(&self) -> String {
        self.sessions.current_device_name()
    }

    /// Session lifecycle state
    pub fn session_state(&self) -> SessionState {
        self.sessions.state()
    }

    /// Set how often devices are re-scanned
    pub fn set_rescan_interval(&mut self, interval: Duration) {
        self.sessions.set_rescan_interval(interval);
    }

    // === Persistence ===

    /// Replace the engine configuration with `settings`.
    ///
    /// Mappings are cleared and replaced, never merged. Invalid band ranges
    /// fall back to the default layout.
    pub fn apply_settings(&mut self, settings: &AudioReactivitySettings) {
        self.set_sensitivity(settings.sensitivity);
        self.set_smoothing(settings.smoothing);
        self.normalization_enabled = settings.normalization_enabled;

        {
            let mut state = self.shared.state.lock();
            let num_bands = settings.num_bands.max(1);
            if let Err(e) = state.bands.set_default_layout(num_bands) {
                warn!("Could not apply default band layout: {}", e);
            }
            if !settings.band_ranges.is_empty() {
                match state.bands.configure_bands(&settings.band_ranges) {
                    Ok(()) if settings.band_ranges.len() != num_bands => {
                        warn!(
                            "numBands is {} but {} band ranges are configured, using the ranges",
                            num_bands,
                            settings.band_ranges.len()
                        );
                    }
                    Ok(()) => {}
                    Err(e) => warn!("Invalid band ranges in settings, using defaults: {}", e),
                }
            }
        }

        self.clear_mappings();
        self.mappings.extend(settings.mappings.iter().cloned());

        if let Some(name) = &settings.device_name {
            self.sessions.set_preferred(Some(name.clone()));
        } else if let Some(index) = settings.device_index {
            if self.sessions.devices().is_empty() {
                if let Err(e) = self.sessions.scan() {
                    warn!("Audio device scan failed: {}", e);
                }
            }
            match self.sessions.resolve(&DeviceSelector::Index(index)) {
                Ok(device) => self.sessions.set_preferred(Some(device.name)),
                Err(e) => debug!("Saved device index not usable: {}", e),
            }
        }

        if let Err(e) = self.set_enabled(settings.enabled) {
            warn!("Could not apply enabled state: {}", e);
        }

        info!(
            "Loaded audio reactivity settings with {} mappings",
            self.mappings.len()
        );
    }

    /// Snapshot of the current configuration
    pub fn settings(&self) -> AudioReactivitySettings {
        let connected = self.sessions.connected_device();
        AudioReactivitySettings {
            enabled: self.enabled,
            normalization_enabled: self.normalization_enabled,
            sensitivity: self.sensitivity,
            smoothing: self.smoothing,
            num_bands: self.num_bands(),
            band_ranges: self.band_ranges(),
            mappings: self.mappings.clone(),
            device_name: connected
                .map(|d| d.name.clone())
                .or_else(|| self.sessions.preferred_device().map(str::to_string)),
            device_index: connected.map(|d| d.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::mock::MockBackend;
    use std::collections::HashMap;

    fn engine() -> AudioReactivityEngine {
        let (backend, _handle) = MockBackend::new();
        AudioReactivityEngine::new(Box::new(backend)).unwrap()
    }

    #[test]
    fn test_defaults() {
        let engine = engine();
        assert!(!engine.is_enabled());
        assert_eq!(engine.sensitivity(), 1.0);
        assert_eq!(engine.smoothing(), 0.85);
        assert!(engine.is_normalization_enabled());
        assert_eq!(engine.num_bands(), 8);
        assert_eq!(engine.block_size(), 1024);
        assert_eq!(engine.band_labels()[1], "bass");
    }

    #[test]
    fn test_smoothing_is_clamped() {
        let mut engine = engine();
        engine.set_smoothing(1.5);
        assert_eq!(engine.smoothing(), 0.99);
        engine.set_smoothing(-0.2);
        assert_eq!(engine.smoothing(), 0.0);
        engine.set_smoothing(f32::NAN);
        assert_eq!(engine.smoothing(), 0.0);
    }

    #[test]
    fn test_performance_mode_rescales_default_bands() {
        let mut engine = engine();
        engine.setup(true).unwrap();
        assert_eq!(engine.block_size(), 512);
        assert_eq!(engine.band_ranges(), default_band_ranges(8, 256));
        assert_eq!(engine.processed_spectrum().len(), 256);
    }

    #[test]
    fn test_performance_mode_keeps_custom_ranges() {
        let mut engine = engine();
        let ranges = [BandRange::new(1, 100), BandRange::new(279, 511)];
        engine.configure_bands(&ranges).unwrap();
        engine.setup(true).unwrap();
        assert_eq!(engine.band_ranges(), ranges);
        assert_eq!(engine.settings().band_ranges, ranges);
    }

    #[test]
    fn test_disabled_engine_writes_nothing() {
        let mut engine = engine();
        engine.setup(false).unwrap();
        engine.add_mapping(BandMapping::new(0, "zoom", 1.0, 0.0, 1.0, false));
        engine.submit_samples(&[0.5; 1024]);

        let mut params: HashMap<String, f32> = HashMap::new();
        params.insert("zoom".into(), 0.0);
        assert_eq!(engine.update(&mut params), 0);
        assert_eq!(params["zoom"], 0.0);
    }

    #[test]
    fn test_remove_mapping_out_of_range() {
        let mut engine = engine();
        engine.add_mapping(BandMapping::new(0, "zoom", 1.0, 0.0, 1.0, false));
        assert!(engine.remove_mapping(3).is_none());
        assert_eq!(engine.mappings().len(), 1);
        assert_eq!(engine.remove_mapping(0).unwrap().parameter_id, "zoom");
        assert!(engine.mappings().is_empty());
    }

    #[test]
    fn test_exit_releases_transform() {
        let mut engine = engine();
        engine.exit();
        engine.submit_samples(&[0.5; 1024]);
        assert!(!engine.shared.state.lock().analyzer.is_initialized());
    }
}
