//! Error types for the audio-reactive engine.
//!
//! Only device, configuration and persistence failures surface as errors.
//! Bad audio data (empty blocks, NaN/Inf samples) is sanitized or skipped
//! and never reaches this type.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AudioError>;

/// Errors produced by the audio-reactive engine.
#[derive(Error, Debug)]
pub enum AudioError {
    /// Device enumeration failed at the driver level
    #[error("Failed to enumerate audio devices: {0}")]
    EnumerationFailed(String),

    /// No device with the requested name exists
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Device index outside the current device list
    #[error("Invalid device index: {index} (device count: {count})")]
    InvalidDeviceIndex {
        /// Requested index
        index: usize,
        /// Number of devices in the current snapshot
        count: usize,
    },

    /// Device exists but cannot capture audio
    #[error("Device '{0}' has no input channels")]
    NoInputChannels(String),

    /// No input-capable device is available at all
    #[error("No audio input device available")]
    NoInputDevice,

    /// Opening or starting the input stream failed
    #[error("Failed to open input stream: {0}")]
    StreamFailed(String),

    /// Block size is not a usable transform size
    #[error("Invalid block size: {0} (must be a power of two >= 16)")]
    InvalidBlockSize(usize),

    /// Band range with min_bin > max_bin
    #[error("Invalid band range #{index}: min_bin {min_bin} > max_bin {max_bin}")]
    InvalidBandRange {
        /// Position of the range in the submitted list
        index: usize,
        /// Lower bin
        min_bin: usize,
        /// Upper bin
        max_bin: usize,
    },

    /// Band configuration with no ranges
    #[error("At least one band is required")]
    NoBands,

    /// I/O error while reading or writing settings
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
