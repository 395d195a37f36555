//! Band-to-parameter mapping rules
//!
//! A [`BandMapping`] turns one smoothed band energy into a parameter write:
//! `output = min + energy * scale * (max - min)`, clamped to `[min, max]`,
//! then either written directly or added to the current value.
//!
//! Rules are evaluated in list order, so when two rules target the same
//! parameter the later one wins. Bad rules (band out of range, unknown
//! parameter) are skipped and reported once.

use crate::params::ParameterStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One band-to-parameter rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BandMapping {
    /// Source band; rules naming a band that does not exist are skipped
    pub band_id: i32,
    /// Target parameter id
    pub parameter_id: String,
    /// Gain applied to the band energy
    pub scale: f32,
    /// Output lower bound
    pub min: f32,
    /// Output upper bound
    pub max: f32,
    /// Add to the current value instead of replacing it
    pub additive: bool,
}

impl Default for BandMapping {
    fn default() -> Self {
        Self {
            band_id: 0,
            parameter_id: String::new(),
            scale: 1.0,
            min: 0.0,
            max: 1.0,
            additive: true,
        }
    }
}

impl BandMapping {
    /// Create a rule
    pub fn new(
        band_id: i32,
        parameter_id: impl Into<String>,
        scale: f32,
        min: f32,
        max: f32,
        additive: bool,
    ) -> Self {
        Self {
            band_id,
            parameter_id: parameter_id.into(),
            scale,
            min,
            max,
            additive,
        }
    }

    /// Output value for a band energy, clamped to the rule's bounds
    pub fn output(&self, energy: f32) -> f32 {
        let value = self.min + energy * self.scale * (self.max - self.min);
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        value.clamp(lo, hi)
    }
}

/// Applies mapping rules to a parameter store
#[derive(Debug, Default)]
pub struct MappingEvaluator {
    warned_bands: HashSet<i32>,
    warned_parameters: HashSet<String>,
}

impl MappingEvaluator {
    /// Create an evaluator
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `mappings` against `bands` and write into `store`.
    ///
    /// Returns the number of parameter writes that took effect.
    pub fn evaluate(
        &mut self,
        mappings: &[BandMapping],
        bands: &[f32],
        store: &mut dyn ParameterStore,
    ) -> usize {
        let mut applied = 0;

        for mapping in mappings {
            let energy = usize::try_from(mapping.band_id)
                .ok()
                .and_then(|band| bands.get(band).copied());
            let Some(energy) = energy else {
                if self.warned_bands.insert(mapping.band_id) {
                    warn!(
                        "Mapping to '{}' references band {} but only {} bands exist, skipping",
                        mapping.parameter_id,
                        mapping.band_id,
                        bands.len()
                    );
                }
                continue;
            };

            let output = mapping.output(energy);
            let written = if mapping.additive {
                store.add_value(&mapping.parameter_id, output)
            } else {
                store.set_value(&mapping.parameter_id, output)
            };

            if written {
                applied += 1;
            } else {
                self.report_unknown(&mapping.parameter_id);
            }
        }

        applied
    }

    fn report_unknown(&mut self, parameter_id: &str) {
        if !self.warned_parameters.contains(parameter_id) {
            debug!("Ignoring mapping to unknown parameter '{}'", parameter_id);
            self.warned_parameters.insert(parameter_id.to_string());
        }
    }

    /// Forget which problems were already reported
    pub fn reset_warnings(&mut self) {
        self.warned_bands.clear();
        self.warned_parameters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn store(entries: &[(&str, f32)]) -> HashMap<String, f32> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_output_formula() {
        let mapping = BandMapping::new(6, "x_displace", 2.0, -0.5, 0.5, false);
        assert!((mapping.output(0.3) - 0.1).abs() < 1e-6);
        // Clamped at both ends
        assert_eq!(mapping.output(5.0), 0.5);
        assert_eq!(mapping.output(-5.0), -0.5);
    }

    #[test]
    fn test_inverted_bounds_do_not_panic() {
        let mapping = BandMapping::new(0, "zoom", 1.0, 1.0, 0.0, false);
        assert_eq!(mapping.output(0.25), 0.75);
        assert_eq!(mapping.output(2.0), 0.0);
    }

    #[test]
    fn test_replace_and_additive() {
        let mut params = store(&[("x", 0.0), ("y", 0.2)]);
        let mappings = vec![
            BandMapping::new(0, "x", 2.0, -0.5, 0.5, false),
            BandMapping::new(1, "y", 1.0, 0.0, 1.0, true),
        ];
        let mut evaluator = MappingEvaluator::new();
        let applied = evaluator.evaluate(&mappings, &[0.3, 0.1], &mut params);

        assert_eq!(applied, 2);
        assert!((params["x"] - 0.1).abs() < 1e-6);
        assert!((params["y"] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_last_write_wins() {
        let mut params = store(&[("zoom", 0.0)]);
        let mappings = vec![
            BandMapping::new(0, "zoom", 1.0, 0.0, 1.0, false),
            BandMapping::new(1, "zoom", 1.0, 0.0, 1.0, false),
        ];
        MappingEvaluator::new().evaluate(&mappings, &[0.9, 0.2], &mut params);
        assert!((params["zoom"] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_bad_rules_are_skipped() {
        let mut params = store(&[("zoom", 0.5)]);
        let mappings = vec![
            BandMapping::new(9, "zoom", 1.0, 0.0, 1.0, false),
            BandMapping::new(-1, "zoom", 1.0, 0.0, 1.0, false),
            BandMapping::new(0, "removed_param", 1.0, 0.0, 1.0, false),
            BandMapping::new(0, "removed_param", 1.0, 0.0, 1.0, true),
        ];
        let mut evaluator = MappingEvaluator::new();
        assert_eq!(evaluator.evaluate(&mappings, &[1.0], &mut params), 0);
        assert_eq!(params["zoom"], 0.5);
        assert!(!params.contains_key("removed_param"));

        // Reported once, still skipped afterwards
        assert_eq!(evaluator.evaluate(&mappings, &[1.0], &mut params), 0);
        assert_eq!(evaluator.warned_bands.len(), 2);
        assert_eq!(evaluator.warned_parameters.len(), 1);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let mapping: BandMapping = serde_json::from_str(r#"{"parameterId": "zoom"}"#).unwrap();
        assert_eq!(mapping.band_id, 0);
        assert_eq!(mapping.scale, 1.0);
        assert_eq!(mapping.max, 1.0);
        assert!(mapping.additive);
    }
}
