//! Band Aggregator - reduces the bin spectrum to a few band energies
//!
//! Each band averages the spectrum over an inclusive bin interval and keeps
//! two values: the raw average of the last tick and a linear exponential
//! moving average of it.

use crate::error::{AudioError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of bands in the default layout
pub const DEFAULT_NUM_BANDS: usize = 8;

/// Usable bins of the transform size the default table is tuned for
const REFERENCE_USABLE_BINS: usize = 512;

/// Default 8-band layout for a 1024-point transform at 44.1 kHz
const DEFAULT_BAND_TABLE: [(usize, usize); DEFAULT_NUM_BANDS] = [
    (1, 2),     // Sub bass (20-60Hz)
    (3, 5),     // Bass (60-250Hz)
    (6, 11),    // Low mids (250-500Hz)
    (12, 46),   // Mids (500-2000Hz)
    (47, 92),   // High mids (2-4kHz)
    (93, 139),  // Presence (4-6kHz)
    (140, 278), // Brilliance (6-12kHz)
    (279, 511), // Air (12-20kHz)
];

const DEFAULT_BAND_LABELS: [&str; DEFAULT_NUM_BANDS] = [
    "sub-bass",
    "bass",
    "low-mids",
    "mids",
    "high-mids",
    "presence",
    "brilliance",
    "air",
];

/// Inclusive bin interval of one band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandRange {
    /// First bin (inclusive)
    #[serde(default)]
    pub min_bin: usize,
    /// Last bin (inclusive)
    #[serde(default)]
    pub max_bin: usize,
}

impl BandRange {
    /// Create a new range
    pub fn new(min_bin: usize, max_bin: usize) -> Self {
        Self { min_bin, max_bin }
    }

    /// Number of bins covered
    pub fn width(&self) -> usize {
        self.max_bin.saturating_sub(self.min_bin) + 1
    }
}

/// Default band layout for `num_bands` bands over `usable_bins` bins.
///
/// Eight bands use the logarithmic table (rescaled when the transform is not
/// 1024 points). Any other count splits the bins into equal contiguous chunks,
/// the last one absorbing the remainder.
pub fn default_band_ranges(num_bands: usize, usable_bins: usize) -> Vec<BandRange> {
    if num_bands == 0 || usable_bins == 0 {
        return Vec::new();
    }

    if num_bands == DEFAULT_NUM_BANDS {
        return DEFAULT_BAND_TABLE
            .iter()
            .map(|&(min, max)| {
                let max_bin = ((max + 1) * usable_bins / REFERENCE_USABLE_BINS)
                    .saturating_sub(1)
                    .min(usable_bins - 1);
                let min_bin = (min * usable_bins / REFERENCE_USABLE_BINS).min(max_bin);
                BandRange::new(min_bin, max_bin)
            })
            .collect();
    }

    let bins_per_band = usable_bins / num_bands;
    (0..num_bands)
        .map(|i| {
            let min_bin = (i * bins_per_band).min(usable_bins - 1);
            let max_bin = if i == num_bands - 1 {
                usable_bins - 1
            } else {
                ((i + 1) * bins_per_band).saturating_sub(1).max(min_bin)
            };
            BandRange::new(min_bin, max_bin)
        })
        .collect()
}

/// Display label for a band
pub fn band_label(band: usize, num_bands: usize) -> String {
    if num_bands == DEFAULT_NUM_BANDS {
        if let Some(label) = DEFAULT_BAND_LABELS.get(band) {
            return (*label).to_string();
        }
    }
    format!("band {}", band)
}

/// Per-band energy storage and aggregation
#[derive(Debug, Clone)]
pub struct BandAggregator {
    ranges: Vec<BandRange>,
    bands: Vec<f32>,
    smoothed_bands: Vec<f32>,
    usable_bins: usize,
}

impl BandAggregator {
    /// Create an aggregator with the default layout for the given usable bin count
    pub fn new(usable_bins: usize) -> Self {
        let ranges = default_band_ranges(DEFAULT_NUM_BANDS, usable_bins);
        let n = ranges.len();
        Self {
            ranges,
            bands: vec![0.0; n],
            smoothed_bands: vec![0.0; n],
            usable_bins,
        }
    }

    /// Replace the band ranges and zero all energies.
    ///
    /// Ranges are stored as given, even past the usable spectrum; only the
    /// bins that exist contribute when energies are computed.
    pub fn configure_bands(&mut self, ranges: &[BandRange]) -> Result<()> {
        if ranges.is_empty() {
            return Err(AudioError::NoBands);
        }
        if let Some((index, range)) = ranges
            .iter()
            .enumerate()
            .find(|(_, r)| r.min_bin > r.max_bin)
        {
            return Err(AudioError::InvalidBandRange {
                index,
                min_bin: range.min_bin,
                max_bin: range.max_bin,
            });
        }

        if let Some(range) = ranges.iter().find(|r| r.max_bin >= self.usable_bins) {
            debug!(
                "Band range {}..={} reaches past the {} usable bins",
                range.min_bin, range.max_bin, self.usable_bins
            );
        }

        self.ranges = ranges.to_vec();
        self.bands = vec![0.0; self.ranges.len()];
        self.smoothed_bands = vec![0.0; self.ranges.len()];

        debug!("Configured {} bands", self.ranges.len());
        Ok(())
    }

    /// Switch to the default layout for `num_bands` bands
    pub fn set_default_layout(&mut self, num_bands: usize) -> Result<()> {
        let ranges = default_band_ranges(num_bands, self.usable_bins);
        self.configure_bands(&ranges)
    }

    /// Change the usable bin count after a transform resize.
    ///
    /// Ranges are kept unchanged; energies restart from zero.
    pub fn set_usable_bins(&mut self, usable_bins: usize) {
        self.usable_bins = usable_bins;
        self.reset();
    }

    /// Aggregate one spectrum into band energies.
    ///
    /// Bins past the end of `spectrum` are ignored; a band with no valid
    /// bins averages to 0.
    pub fn compute_band_energies(&mut self, spectrum: &[f32], smoothing: f32) {
        for (i, range) in self.ranges.iter().enumerate() {
            let end = range.max_bin.min(spectrum.len().saturating_sub(1));
            let average = if range.min_bin < spectrum.len() {
                let slice = &spectrum[range.min_bin..=end];
                slice.iter().sum::<f32>() / slice.len() as f32
            } else {
                0.0
            };

            self.smoothed_bands[i] = average * (1.0 - smoothing) + self.smoothed_bands[i] * smoothing;
            self.bands[i] = average;
        }
    }

    /// Smoothed energy of one band, 0 when out of range
    pub fn band(&self, band: usize) -> f32 {
        self.smoothed_bands.get(band).copied().unwrap_or(0.0)
    }

    /// Smoothed energies of all bands
    pub fn smoothed_bands(&self) -> &[f32] {
        &self.smoothed_bands
    }

    /// Raw (unsmoothed) energies of the last tick
    pub fn raw_bands(&self) -> &[f32] {
        &self.bands
    }

    /// Current band ranges
    pub fn ranges(&self) -> &[BandRange] {
        &self.ranges
    }

    /// Number of bands
    pub fn num_bands(&self) -> usize {
        self.ranges.len()
    }

    /// Zero all energies, keeping the layout
    pub fn reset(&mut self) {
        self.bands.fill(0.0);
        self.smoothed_bands.fill(0.0);
    }
}
