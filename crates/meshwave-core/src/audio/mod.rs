//! Audio input and analysis
//!
//! - [`analyzer`]: windowed FFT and per-bin envelope
//! - [`bands`]: bin ranges and band energies
//! - [`backend`]: driver seam (cpal, mock)
//! - [`session`]: device enumeration and the single open input session

pub mod analyzer;
pub mod backend;
pub mod bands;
pub mod session;

pub use analyzer::{SpectralAnalyzer, SpectrumFrame, DEFAULT_BLOCK_SIZE, PERFORMANCE_BLOCK_SIZE};
pub use backend::{AudioBackend, DeviceDescriptor, InputSession, SampleSink, StreamSettings};
pub use bands::{band_label, default_band_ranges, BandAggregator, BandRange, DEFAULT_NUM_BANDS};
pub use session::{DeviceSelector, DeviceSessionManager, SessionState};
