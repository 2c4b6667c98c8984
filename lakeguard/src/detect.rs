//! Fingerprint-drift change detection.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::dataset::{Dataset, Fingerprint};
use crate::error::{GuardError, Result};

/// Why a dataset does (or does not) need re-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// No prior fingerprint is known for the dataset
    FirstSight,
    /// Content hash differs from the last-known snapshot
    ContentChanged,
    /// Schema hash differs from the last-known snapshot
    SchemaChanged,
    /// Row count drifted beyond the configured percentage
    RowCountDrift {
        /// Absolute relative change, e.g. 0.08 for 8%
        change: f64,
    },
    /// Fingerprint matches the last-known snapshot
    Unchanged,
}

/// Configuration for the change detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeDetectorConfig {
    /// Whether change detection gates validation at all. When false, every
    /// check requests validation and only the reason is reported.
    pub enabled: bool,
    /// Relative row-count change above which validation is required
    pub row_count_threshold: f64,
    /// Whether a dataset with no prior fingerprint is validated. When false,
    /// first sight is a configuration error.
    pub validate_on_first_sight: bool,
}

impl Default for ChangeDetectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            row_count_threshold: 0.05,
            validate_on_first_sight: true,
        }
    }
}

/// Decides whether a dataset needs re-validation based on fingerprint drift.
///
/// The decision itself is pure; the detector only additionally remembers the
/// last-seen fingerprint per dataset, updated explicitly via [`record`].
///
/// [`record`]: ChangeDetector::record
#[derive(Debug, Default)]
pub struct ChangeDetector {
    config: ChangeDetectorConfig,
    fingerprints: Mutex<HashMap<String, Fingerprint>>,
}

impl ChangeDetector {
    /// Creates a detector with the given configuration.
    pub fn new(config: ChangeDetectorConfig) -> Self {
        Self {
            config,
            fingerprints: Mutex::new(HashMap::new()),
        }
    }

    /// Returns whether the dataset needs validation and why.
    pub fn check(&self, dataset: &Dataset) -> Result<(bool, ChangeReason)> {
        let key = dataset.qualified_name();
        let current = dataset.fingerprint();
        let fingerprints = self
            .fingerprints
            .lock()
            .map_err(|_| GuardError::Internal("fingerprint store poisoned".into()))?;

        let previous = match fingerprints.get(&key) {
            Some(prev) => prev,
            None => {
                if self.config.enabled && !self.config.validate_on_first_sight {
                    return Err(GuardError::configuration(format!(
                        "No prior fingerprint for {key} and first-sight validation is disabled"
                    )));
                }
                debug!(dataset = %key, "No prior fingerprint, validation required");
                return Ok((true, ChangeReason::FirstSight));
            }
        };

        let (changed, reason) = Self::compare(previous, &current, self.config.row_count_threshold);
        debug!(dataset = %key, reason = ?reason, "Change detection decision");
        if !self.config.enabled {
            return Ok((true, reason));
        }
        Ok((changed, reason))
    }

    /// Pure comparison of two fingerprints under the drift threshold.
    fn compare(previous: &Fingerprint, current: &Fingerprint, threshold: f64) -> (bool, ChangeReason) {
        if previous.content_hash != current.content_hash {
            return (true, ChangeReason::ContentChanged);
        }
        if previous.schema_hash != current.schema_hash {
            return (true, ChangeReason::SchemaChanged);
        }
        if previous.row_count != current.row_count {
            let change = if previous.row_count == 0 {
                1.0
            } else {
                (current.row_count as f64 - previous.row_count as f64).abs()
                    / previous.row_count as f64
            };
            if change > threshold {
                return (true, ChangeReason::RowCountDrift { change });
            }
        }
        (false, ChangeReason::Unchanged)
    }

    /// Records the dataset's fingerprint as the new baseline.
    ///
    /// Called after a completed validation run so the next check compares
    /// against this snapshot.
    pub fn record(&self, dataset: &Dataset) -> Result<()> {
        let mut fingerprints = self
            .fingerprints
            .lock()
            .map_err(|_| GuardError::Internal("fingerprint store poisoned".into()))?;
        fingerprints.insert(dataset.qualified_name(), dataset.fingerprint());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Layer;

    fn dataset(rows: u64, content: &str, schema: &str) -> Dataset {
        Dataset::new(Layer::Silver, "orders", "/data", rows, content, schema)
    }

    #[test]
    fn test_first_sight_validates_by_default() {
        let detector = ChangeDetector::default();
        let (needs, reason) = detector.check(&dataset(100, "c1", "s1")).unwrap();
        assert!(needs);
        assert_eq!(reason, ChangeReason::FirstSight);
    }

    #[test]
    fn test_first_sight_error_when_policy_disabled() {
        let detector = ChangeDetector::new(ChangeDetectorConfig {
            validate_on_first_sight: false,
            ..Default::default()
        });
        let result = detector.check(&dataset(100, "c1", "s1"));
        assert!(matches!(result, Err(GuardError::Configuration(_))));
    }

    #[test]
    fn test_identical_fingerprint_skips_second_call() {
        let detector = ChangeDetector::default();
        let ds = dataset(100, "c1", "s1");
        detector.record(&ds).unwrap();

        let (needs, reason) = detector.check(&ds).unwrap();
        assert!(!needs);
        assert_eq!(reason, ChangeReason::Unchanged);
    }

    #[test]
    fn test_content_and_schema_changes_trigger() {
        let detector = ChangeDetector::default();
        detector.record(&dataset(100, "c1", "s1")).unwrap();

        let (needs, reason) = detector.check(&dataset(100, "c2", "s1")).unwrap();
        assert!(needs);
        assert_eq!(reason, ChangeReason::ContentChanged);

        let (needs, reason) = detector.check(&dataset(100, "c1", "s2")).unwrap();
        assert!(needs);
        assert_eq!(reason, ChangeReason::SchemaChanged);
    }

    #[test]
    fn test_disabled_detector_always_validates() {
        let detector = ChangeDetector::new(ChangeDetectorConfig {
            enabled: false,
            ..Default::default()
        });
        let ds = dataset(100, "c1", "s1");
        detector.record(&ds).unwrap();

        // Identical fingerprint, but gating is off
        let (needs, reason) = detector.check(&ds).unwrap();
        assert!(needs);
        assert_eq!(reason, ChangeReason::Unchanged);
    }

    #[test]
    fn test_row_count_drift_threshold() {
        let detector = ChangeDetector::default();
        detector.record(&dataset(1000, "c1", "s1")).unwrap();

        // 3% drift stays under the 5% default
        let (needs, _) = detector.check(&dataset(1030, "c1", "s1")).unwrap();
        assert!(!needs);

        // 10% drift triggers
        let (needs, reason) = detector.check(&dataset(1100, "c1", "s1")).unwrap();
        assert!(needs);
        match reason {
            ChangeReason::RowCountDrift { change } => assert!((change - 0.10).abs() < 1e-9),
            other => panic!("expected drift, got {other:?}"),
        }
    }
}
