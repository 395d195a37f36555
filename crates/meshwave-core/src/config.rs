//! Persistence of audio reactivity settings
//!
//! Settings live under the `audioReactivity` section of a JSON document so
//! the host can keep its own sections in the same file. Loading never
//! fails: missing or malformed data falls back to defaults. A malformed
//! mapping rule drops only that rule, and malformed band ranges drop only
//! the custom layout.

use crate::audio::bands::{BandRange, DEFAULT_NUM_BANDS};
use crate::engine::{DEFAULT_SENSITIVITY, DEFAULT_SMOOTHING};
use crate::error::Result;
use crate::mapping::BandMapping;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Key of the settings section in the document
pub const SECTION_KEY: &str = "audioReactivity";

/// Persisted audio reactivity configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioReactivitySettings {
    /// Capture on or off
    pub enabled: bool,
    /// Per-tick peak normalization
    pub normalization_enabled: bool,
    /// Gain applied to the spectrum
    pub sensitivity: f32,
    /// Temporal smoothing factor
    pub smoothing: f32,
    /// Number of bands when no custom ranges are given
    pub num_bands: usize,
    /// Custom band ranges (empty means the default layout)
    #[serde(deserialize_with = "ranges_or_empty")]
    pub band_ranges: Vec<BandRange>,
    /// Mapping rules in evaluation order
    #[serde(deserialize_with = "valid_mappings")]
    pub mappings: Vec<BandMapping>,
    /// Device to restore, matched by name first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Device position, used when the name is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_index: Option<usize>,
}

impl Default for AudioReactivitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            normalization_enabled: true,
            sensitivity: DEFAULT_SENSITIVITY,
            smoothing: DEFAULT_SMOOTHING,
            num_bands: DEFAULT_NUM_BANDS,
            band_ranges: Vec::new(),
            mappings: Vec::new(),
            device_name: None,
            device_index: None,
        }
    }
}

impl AudioReactivitySettings {
    /// Default location of the settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("Meshwave");
            p.push("settings.json");
            p
        })
    }

    /// Read the settings section of `document`
    pub fn load_from_document(document: &Value) -> Self {
        let Some(section) = document.get(SECTION_KEY) else {
            debug!("No '{}' section, using defaults", SECTION_KEY);
            return Self::default();
        };
        match serde_json::from_value(section.clone()) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Malformed '{}' section, using defaults: {}", SECTION_KEY, e);
                Self::default()
            }
        }
    }

    /// Write the settings section into `document`, keeping other sections
    pub fn save_to_document(&self, document: &mut Value) -> Result<()> {
        let section = serde_json::to_value(self)?;
        if !document.is_object() {
            *document = Value::Object(Map::new());
        }
        if let Value::Object(map) = document {
            map.insert(SECTION_KEY.to_string(), section);
        }
        Ok(())
    }

    /// Load settings from a file; a missing or unreadable file yields defaults
    pub fn load_from_file(path: &Path) -> Self {
        Self::load_from_document(&read_document(path))
    }

    /// Save settings into a file, preserving the file's other sections
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let mut document = read_document(path);
        self.save_to_document(&mut document)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&document)?)?;
        debug!("Saved audio reactivity settings to {:?}", path);
        Ok(())
    }
}

fn ranges_or_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<BandRange>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Malformed band ranges, using the default layout: {}", e);
        Vec::new()
    }))
}

fn valid_mappings<'de, D>(deserializer: D) -> std::result::Result<Vec<BandMapping>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries,
        other => {
            warn!("Expected a list of mappings, found {}", other);
            return Ok(Vec::new());
        }
    };
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| match serde_json::from_value(entry) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                warn!("Skipping malformed mapping {}: {}", i, e);
                None
            }
        })
        .collect())
}

/// Read a JSON document, or an empty object if the file is missing or invalid
pub fn read_document(path: &Path) -> Value {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Settings file {:?} not readable: {}", path, e);
            return Value::Object(Map::new());
        }
    };
    match serde_json::from_str(&content) {
        Ok(document) => document,
        Err(e) => {
            warn!("Settings file {:?} is not valid JSON: {}", path, e);
            Value::Object(Map::new())
        }
    }
}
