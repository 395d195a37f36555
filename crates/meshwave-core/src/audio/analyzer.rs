//! Spectral Analyzer - windowed FFT over a circular sample buffer
//!
//! The producer side (`submit_samples`) runs on the audio driver thread: it
//! sanitizes the block, measures its RMS level and recomputes the amplitude
//! spectrum. The consumer side (`analyze`) runs once per frame on the update
//! thread and turns that amplitude spectrum into the processed spectrum:
//! sensitivity gain, squaring, per-tick peak normalization and a
//! fast-attack/slow-release envelope per bin.
//!
//! Both sides are allocation-free after construction.

use crate::error::{AudioError, Result};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Default block (and transform) size
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Block size used in reduced-load mode
pub const PERFORMANCE_BLOCK_SIZE: usize = 512;

const MIN_BLOCK_SIZE: usize = 16;

/// Fixed gain applied before squaring, on top of the user sensitivity
const SENSITIVITY_GAIN: f32 = 10.0;

/// A magnitude spectrum, one non-negative value per usable transform bin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumFrame {
    magnitudes: Vec<f32>,
}

impl SpectrumFrame {
    /// Create a frame from bin magnitudes
    pub fn new(magnitudes: Vec<f32>) -> Self {
        Self { magnitudes }
    }

    /// Bin magnitudes, lowest frequency first
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Number of bins
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    /// True if the frame holds no bins
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Magnitude of a single bin
    pub fn get(&self, bin: usize) -> Option<f32> {
        self.magnitudes.get(bin).copied()
    }
}

/// Converts raw mono sample blocks into a processed magnitude spectrum
pub struct SpectralAnalyzer {
    /// FFT instance, `None` once released
    fft: Option<Arc<dyn Fft<f32>>>,

    /// Transform size, equal to the working buffer length
    block_size: usize,

    /// Circular working buffer
    input_buffer: Vec<f32>,

    /// Next write position in the working buffer
    buffer_write_pos: usize,

    /// FFT complex buffer
    fft_buffer: Vec<Complex<f32>>,

    /// FFT scratch buffer
    scratch_buffer: Vec<Complex<f32>>,

    /// Hamming window coefficients
    window: Vec<f32>,

    /// Raw transform output (single-sided amplitude, half of block size)
    amplitudes: Vec<f32>,

    /// Whether `amplitudes` holds a computed transform
    has_output: bool,

    /// Per-tick staging for the scaled spectrum
    scaled: Vec<f32>,

    /// Processed (normalized + smoothed) spectrum
    smoothed: Vec<f32>,

    /// RMS of the last submitted block
    input_level: f32,

    /// Set once an empty tick has been reported, cleared on the next good tick
    skip_reported: bool,

    /// Debug: blocks received
    blocks_received: u64,

    /// Debug: analysis ticks completed
    ticks: u64,
}

impl SpectralAnalyzer {
    /// Create an analyzer with the given block size (power of two, >= 16)
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size < MIN_BLOCK_SIZE || !block_size.is_power_of_two() {
            return Err(AudioError::InvalidBlockSize(block_size));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_size);
        let scratch_len = fft.get_inplace_scratch_len();
        let half_size = block_size / 2;

        debug!(
            "SpectralAnalyzer created: block_size={}, usable_bins={}",
            block_size, half_size
        );

        Ok(Self {
            fft: Some(fft),
            block_size,
            input_buffer: vec![0.0; block_size],
            buffer_write_pos: 0,
            fft_buffer: vec![Complex::new(0.0, 0.0); block_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); scratch_len],
            window: hamming_window(block_size),
            amplitudes: vec![0.0; half_size],
            has_output: false,
            scaled: vec![0.0; half_size],
            smoothed: vec![0.0; half_size],
            input_level: 0.0,
            skip_reported: false,
            blocks_received: 0,
            ticks: 0,
        })
    }

    /// Feed a block of mono samples (audio thread).
    ///
    /// NaN and infinite samples are replaced with 0 before anything else
    /// sees them. Blocks longer than the working buffer keep only their
    /// newest samples in the buffer; the RMS level covers the whole block.
    pub fn submit_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            warn!("Received empty audio block");
            return;
        }

        let skip = samples.len().saturating_sub(self.block_size);
        let mut sum_squared = 0.0f64;

        for (i, &sample) in samples.iter().enumerate() {
            let sample = if sample.is_finite() { sample } else { 0.0 };
            sum_squared += f64::from(sample) * f64::from(sample);

            if i >= skip {
                self.input_buffer[self.buffer_write_pos] = sample;
                self.buffer_write_pos = (self.buffer_write_pos + 1) % self.block_size;
            }
        }

        self.input_level = (sum_squared / samples.len() as f64).sqrt() as f32;
        self.blocks_received += 1;

        if self.blocks_received % 1000 == 0 {
            trace!(
                "Analyzer: {} blocks received, level={:.4}",
                self.blocks_received,
                self.input_level
            );
        }

        self.compute_transform();
    }

    /// Window the working buffer (oldest sample first) and recompute amplitudes
    fn compute_transform(&mut self) {
        let Some(fft) = &self.fft else {
            return;
        };

        for i in 0..self.block_size {
            let src_idx = (self.buffer_write_pos + i) % self.block_size;
            self.fft_buffer[i] = Complex::new(self.input_buffer[src_idx] * self.window[i], 0.0);
        }

        fft.process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        let norm_factor = 2.0 / self.block_size as f32;
        for (amplitude, bin) in self.amplitudes.iter_mut().zip(&self.fft_buffer) {
            *amplitude = bin.norm() * norm_factor;
        }
        self.has_output = true;
    }

    /// Run one analysis tick (update thread).
    ///
    /// Returns `false` if the tick was skipped because no transform output
    /// exists yet or the transform has been released; the previous spectrum
    /// is left untouched in that case.
    pub fn analyze(&mut self, sensitivity: f32, smoothing: f32, normalize: bool) -> bool {
        if self.fft.is_none() || !self.has_output {
            if !self.skip_reported {
                warn!("Transform output is empty, skipping analysis tick");
                self.skip_reported = true;
            }
            return false;
        }
        self.skip_reported = false;

        // Peak of this tick only; nothing carries over between ticks
        let mut max_val = 0.0f32;
        for (scaled, &amplitude) in self.scaled.iter_mut().zip(&self.amplitudes) {
            let value = (amplitude * sensitivity * SENSITIVITY_GAIN).powi(2);
            if normalize {
                max_val = max_val.max(value);
            }
            *scaled = value;
        }

        if !normalize {
            max_val = 1.0;
        }

        for (smoothed, &scaled) in self.smoothed.iter_mut().zip(&self.scaled) {
            let normalized = if max_val > 0.0 { scaled / max_val } else { 0.0 };
            *smoothed = (*smoothed * smoothing).max(normalized * (1.0 - smoothing));
        }

        self.ticks += 1;
        if self.ticks % 600 == 0 {
            trace!("Analyzer tick #{}: peak={:.4}", self.ticks, max_val);
        }

        true
    }

    /// The most recently processed spectrum
    pub fn processed_spectrum(&self) -> &[f32] {
        &self.smoothed
    }

    /// Raw transform output, `None` until the first block has been transformed
    pub fn raw_amplitudes(&self) -> Option<&[f32]> {
        if self.has_output && self.fft.is_some() {
            Some(&self.amplitudes)
        } else {
            None
        }
    }

    /// RMS level of the last submitted block
    pub fn input_level(&self) -> f32 {
        self.input_level
    }

    /// Transform size
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of bins in the usable half-spectrum
    pub fn usable_bins(&self) -> usize {
        self.block_size / 2
    }

    /// Whether the transform is still available
    pub fn is_initialized(&self) -> bool {
        self.fft.is_some()
    }

    /// Drop the transform. Later blocks are ignored and ticks are skipped.
    pub fn release(&mut self) {
        self.fft = None;
        self.has_output = false;
        debug!("SpectralAnalyzer transform released");
    }

    /// Clear all buffered audio and spectra
    pub fn reset(&mut self) {
        self.input_buffer.fill(0.0);
        self.buffer_write_pos = 0;
        self.amplitudes.fill(0.0);
        self.has_output = false;
        self.scaled.fill(0.0);
        self.smoothed.fill(0.0);
        self.input_level = 0.0;
        self.skip_reported = false;
        self.blocks_received = 0;
        self.ticks = 0;

        debug!("SpectralAnalyzer reset");
    }
}

/// Hamming window coefficients for a transform of `size` samples
fn hamming_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / (size - 1) as f32;
            0.54 - 0.46 * (2.0 * std::f32::consts::PI * t).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_at_bin(bin: usize, block_size: usize, amplitude: f32) -> Vec<f32> {
        (0..block_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * bin as f32 * i as f32 / block_size as f32;
                phase.sin() * amplitude
            })
            .collect()
    }

    fn peak_bin(spectrum: &[f32]) -> usize {
        spectrum
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn test_create_analyzer() {
        let analyzer = SpectralAnalyzer::new(DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(analyzer.block_size(), 1024);
        assert_eq!(analyzer.usable_bins(), 512);
        assert_eq!(analyzer.processed_spectrum().len(), 512);
        assert!(analyzer.is_initialized());
    }

    #[test]
    fn test_invalid_block_size() {
        assert!(matches!(
            SpectralAnalyzer::new(1000),
            Err(AudioError::InvalidBlockSize(1000))
        ));
        assert!(SpectralAnalyzer::new(8).is_err());
        assert!(SpectralAnalyzer::new(PERFORMANCE_BLOCK_SIZE).is_ok());
    }

    #[test]
    fn test_rms_level() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        analyzer.submit_samples(&[0.5; 256]);
        assert!((analyzer.input_level() - 0.5).abs() < 1e-6);

        analyzer.submit_samples(&[0.0; 256]);
        assert_eq!(analyzer.input_level(), 0.0);
    }

    #[test]
    fn test_resilience_to_bad_input() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        analyzer.submit_samples(&[f32::NAN, f32::INFINITY, f32::NEG_INFINITY, 0.0]);

        assert_eq!(analyzer.input_level(), 0.0);
        assert!(analyzer.analyze(1.0, 0.0, true));
        for mag in analyzer.processed_spectrum() {
            assert!(mag.is_finite());
            assert_eq!(*mag, 0.0);
        }
    }

    #[test]
    fn test_empty_block_is_ignored() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        analyzer.submit_samples(&[0.25; 128]);
        let level = analyzer.input_level();

        analyzer.submit_samples(&[]);
        assert_eq!(analyzer.input_level(), level);
    }

    #[test]
    fn test_tick_skipped_without_data() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        assert!(!analyzer.analyze(1.0, 0.5, true));
        assert!(analyzer.raw_amplitudes().is_none());
        assert!(analyzer.processed_spectrum().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sine_peak_lands_in_its_bin() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        analyzer.submit_samples(&sine_at_bin(40, 1024, 0.8));

        let raw = analyzer.raw_amplitudes().unwrap();
        assert_eq!(peak_bin(raw), 40);

        assert!(analyzer.analyze(1.0, 0.0, true));
        assert_eq!(peak_bin(analyzer.processed_spectrum()), 40);
    }

    #[test]
    fn test_normalization_peaks_at_one() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        analyzer.submit_samples(&sine_at_bin(12, 1024, 0.3));
        analyzer.analyze(1.0, 0.0, true);

        let max = analyzer
            .processed_spectrum()
            .iter()
            .fold(0.0f32, |a, &b| a.max(b));
        assert!((max - 1.0).abs() < 1e-6, "max was {}", max);
    }

    #[test]
    fn test_normalization_disabled_uses_raw_scale() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        analyzer.submit_samples(&sine_at_bin(12, 1024, 0.3));
        analyzer.analyze(2.0, 0.0, false);

        let raw = analyzer.raw_amplitudes().unwrap()[12];
        let expected = (raw * 2.0 * 10.0).powi(2);
        let actual = analyzer.processed_spectrum()[12];
        assert!((actual - expected).abs() <= expected * 1e-5);
    }

    #[test]
    fn test_fast_attack_slow_release() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();

        analyzer.submit_samples(&sine_at_bin(20, 1024, 1.0));
        analyzer.analyze(1.0, 0.5, true);
        // max(0 * 0.5, 1.0 * 0.5)
        assert!((analyzer.processed_spectrum()[20] - 0.5).abs() < 1e-6);

        // Full block of silence flushes the working buffer
        analyzer.submit_samples(&[0.0; 1024]);
        analyzer.analyze(1.0, 0.5, true);
        assert!((analyzer.processed_spectrum()[20] - 0.25).abs() < 1e-6);

        analyzer.analyze(1.0, 0.5, true);
        assert!((analyzer.processed_spectrum()[20] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_long_block_keeps_newest_samples() {
        let mut analyzer = SpectralAnalyzer::new(64).unwrap();
        let mut block = vec![1.0f32; 64];
        block.extend(std::iter::repeat(0.0).take(64));
        analyzer.submit_samples(&block);

        // Working buffer only holds the trailing silence
        assert!(analyzer.raw_amplitudes().unwrap().iter().all(|&v| v == 0.0));
        assert!((analyzer.input_level() - 0.5f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_release_skips_ticks() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        analyzer.submit_samples(&sine_at_bin(5, 1024, 0.5));
        assert!(analyzer.analyze(1.0, 0.0, true));
        let before = analyzer.processed_spectrum().to_vec();

        analyzer.release();
        assert!(!analyzer.is_initialized());
        analyzer.submit_samples(&sine_at_bin(100, 1024, 0.5));
        assert!(!analyzer.analyze(1.0, 0.0, true));
        assert_eq!(analyzer.processed_spectrum(), before.as_slice());
    }

    #[test]
    fn test_reset() {
        let mut analyzer = SpectralAnalyzer::new(1024).unwrap();
        analyzer.submit_samples(&sine_at_bin(5, 1024, 0.5));
        analyzer.analyze(1.0, 0.0, true);

        analyzer.reset();
        assert_eq!(analyzer.input_level(), 0.0);
        assert!(analyzer.raw_amplitudes().is_none());
        assert!(analyzer.processed_spectrum().iter().all(|&v| v == 0.0));
    }
}
