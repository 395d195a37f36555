//! Meshwave Core - Audio-Reactive Modulation Engine
//!
//! Turns live audio input into smoothed frequency-band energies and maps
//! them onto named numeric parameters of a host application:
//! - Spectral analysis (windowed FFT, normalization, smoothing)
//! - Band aggregation over configurable bin ranges
//! - Band-to-parameter mapping rules
//! - Audio device enumeration and session management
//! - Settings persistence

#![warn(missing_docs)]

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod params;

pub use audio::{
    AudioBackend, BandAggregator, BandRange, DeviceDescriptor, DeviceSelector,
    DeviceSessionManager, SampleSink, SessionState, SpectralAnalyzer, SpectrumFrame,
    StreamSettings,
};
pub use config::AudioReactivitySettings;
pub use engine::AudioReactivityEngine;
pub use error::{AudioError, Result};
pub use logging::LogConfig;
pub use mapping::{BandMapping, MappingEvaluator};
pub use params::{ParameterStore, ParameterTable};

#[cfg(feature = "audio")]
pub use audio::backend::cpal_backend::CpalBackend;
pub use audio::backend::mock::{MockBackend, MockHandle};
