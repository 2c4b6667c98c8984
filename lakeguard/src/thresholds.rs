//! Threshold policy and severity scoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::dataset::Layer;
use crate::core::run::ValidationRun;
use crate::error::{GuardError, Result};

/// Ordinal quality-incident level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Raises the severity by one level, saturating at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            Self::Ok => Self::Low,
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High => Self::Critical,
            Self::Critical => Self::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Fully-specified limits applied to one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLimits {
    /// Minimum acceptable success rate, in [0, 1]
    pub min_success_rate: f64,
    /// Maximum failed runs tolerated within the trailing window
    pub max_failed_validations: u32,
    /// Maximum failed expectations tolerated within one run
    pub max_failed_expectations: u32,
}

impl Default for ThresholdLimits {
    fn default() -> Self {
        Self {
            min_success_rate: 0.90,
            max_failed_validations: 3,
            max_failed_expectations: 5,
        }
    }
}

/// Partial limits used for layer and dataset overrides; unset fields fall
/// through to the next level of specificity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failed_validations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failed_expectations: Option<u32>,
}

/// Declarative threshold policy loaded at startup.
///
/// Overrides are merged by specificity at lookup time: dataset-specific over
/// layer-specific over global.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub global: ThresholdLimits,
    #[serde(default)]
    pub layers: HashMap<String, ThresholdOverride>,
    #[serde(default)]
    pub datasets: HashMap<String, ThresholdOverride>,
}

impl ThresholdConfig {
    /// Parses a config from JSON, validating value ranges.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GuardError::configuration(format!("Invalid threshold config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every configured success rate lies in [0, 1].
    pub fn validate(&self) -> Result<()> {
        let mut rates = vec![("global".to_string(), Some(self.global.min_success_rate))];
        rates.extend(
            self.layers
                .iter()
                .map(|(k, v)| (format!("layer.{k}"), v.min_success_rate)),
        );
        rates.extend(
            self.datasets
                .iter()
                .map(|(k, v)| (format!("dataset.{k}"), v.min_success_rate)),
        );
        for (scope, rate) in rates {
            if let Some(rate) = rate {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(GuardError::configuration(format!(
                        "{scope}.min_success_rate must be within [0, 1], got {rate}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves the effective limits for a dataset by specificity.
    pub fn resolve(&self, layer: Layer, dataset_name: &str) -> ThresholdLimits {
        let layer_override = self.layers.get(&layer.to_string()).copied().unwrap_or_default();
        let dataset_override = self.datasets.get(dataset_name).copied().unwrap_or_default();

        ThresholdLimits {
            min_success_rate: dataset_override
                .min_success_rate
                .or(layer_override.min_success_rate)
                .unwrap_or(self.global.min_success_rate),
            max_failed_validations: dataset_override
                .max_failed_validations
                .or(layer_override.max_failed_validations)
                .unwrap_or(self.global.max_failed_validations),
            max_failed_expectations: dataset_override
                .max_failed_expectations
                .or(layer_override.max_failed_expectations)
                .unwrap_or(self.global.max_failed_expectations),
        }
    }
}

/// A single threshold breach, kept for alert messages and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Breach {
    SuccessRate { threshold: f64, actual: f64 },
    FailedValidations { threshold: u32, actual: u32 },
    FailedExpectations { threshold: u32, actual: u32 },
}

impl std::fmt::Display for Breach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuccessRate { threshold, actual } => write!(
                f,
                "success rate {:.2}% below threshold {:.2}%",
                actual * 100.0,
                threshold * 100.0
            ),
            Self::FailedValidations { threshold, actual } => {
                write!(f, "{actual} failed validations exceed limit {threshold}")
            }
            Self::FailedExpectations { threshold, actual } => {
                write!(f, "{actual} failed expectations exceed limit {threshold}")
            }
        }
    }
}

/// Outcome of scoring one run against policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub severity: Severity,
    pub limits: ThresholdLimits,
    pub breaches: Vec<Breach>,
}

impl QualityAssessment {
    /// Returns true when no threshold was breached.
    pub fn is_clean(&self) -> bool {
        self.breaches.is_empty()
    }
}

/// Configuration for the evaluator beyond the threshold policy itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Trailing window, in hours, over which failed runs are counted
    pub failed_run_window_hours: u32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            failed_run_window_hours: 24,
        }
    }
}

/// Success-rate breakpoints scanned in descending order; the first one the
/// run falls at or below assigns the severity.
const SEVERITY_BREAKPOINTS: [(Severity, f64); 4] = [
    (Severity::Critical, 0.95),
    (Severity::High, 0.90),
    (Severity::Medium, 0.80),
    (Severity::Low, 0.70),
];

/// Scores validation outcomes against layer/dataset-specific policy.
#[derive(Debug, Clone, Default)]
pub struct ThresholdEvaluator {
    config: ThresholdConfig,
    evaluator: EvaluatorConfig,
}

impl ThresholdEvaluator {
    /// Creates an evaluator over the given policy.
    pub fn new(config: ThresholdConfig, evaluator: EvaluatorConfig) -> Self {
        Self { config, evaluator }
    }

    /// Returns the trailing window over which failed runs are counted.
    pub fn failed_run_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.evaluator.failed_run_window_hours))
    }

    /// Scores a run.
    ///
    /// `recent_failed_runs` is the number of failed validations for this
    /// dataset within the trailing window, excluding the run being scored.
    pub fn evaluate(
        &self,
        layer: Layer,
        dataset_name: &str,
        run: &ValidationRun,
        recent_failed_runs: u32,
    ) -> QualityAssessment {
        let limits = self.config.resolve(layer, dataset_name);
        let mut breaches = Vec::new();

        // An incomplete or errored run counts against the validation budget
        let failed_runs = recent_failed_runs + u32::from(run.status.counts_as_failed());
        let failed_expectations = run.failed_expectations() as u32;

        if run.success_rate < limits.min_success_rate {
            breaches.push(Breach::SuccessRate {
                threshold: limits.min_success_rate,
                actual: run.success_rate,
            });
        }
        if failed_runs > limits.max_failed_validations {
            breaches.push(Breach::FailedValidations {
                threshold: limits.max_failed_validations,
                actual: failed_runs,
            });
        }
        if failed_expectations > limits.max_failed_expectations {
            breaches.push(Breach::FailedExpectations {
                threshold: limits.max_failed_expectations,
                actual: failed_expectations,
            });
        }

        let mut severity = Self::rate_severity(run.success_rate);

        // Either count dimension breaching escalates beyond what the rate
        // alone indicates; each dimension contributes one step.
        for breach in &breaches {
            if matches!(
                breach,
                Breach::FailedValidations { .. } | Breach::FailedExpectations { .. }
            ) {
                severity = severity.escalate();
            }
        }

        debug!(
            dataset = %dataset_name,
            severity = %severity,
            success_rate = run.success_rate,
            failed_runs,
            failed_expectations,
            breaches = breaches.len(),
            "Scored validation run"
        );

        QualityAssessment {
            severity,
            limits,
            breaches,
        }
    }

    /// Assigns severity from the success rate alone.
    fn rate_severity(success_rate: f64) -> Severity {
        for (severity, breakpoint) in SEVERITY_BREAKPOINTS {
            if success_rate <= breakpoint {
                return severity;
            }
        }
        Severity::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Fingerprint;
    use crate::core::expectation::ExpectationKind;
    use crate::core::run::{ExpectationOutcome, RunStatus, ValidationRun};
    use crate::sample::SampleDescriptor;

    fn run_with_rate(total: usize, failed: usize) -> ValidationRun {
        let mut outcomes = Vec::new();
        for i in 0..total {
            let mut o = ExpectationOutcome::empty(format!("e{i:03}"), ExpectationKind::Null, false);
            if i < failed {
                o.record_fail("failed");
            } else {
                o.record_pass();
            }
            o.finalize();
            outcomes.push(o);
        }
        let success_rate = ValidationRun::compute_success_rate(&outcomes);
        let status = if failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        };
        ValidationRun {
            id: "run-1".to_string(),
            dataset: "gold/fact_sales".to_string(),
            fingerprint: Fingerprint {
                content_hash: "c".into(),
                schema_hash: "s".into(),
                row_count: 100,
            },
            suite_id: "suite".to_string(),
            started_at: chrono::Utc::now(),
            duration_ms: 1,
            sample: SampleDescriptor::full(100, 42),
            outcomes,
            status,
            success_rate,
        }
    }

    fn gold_config() -> ThresholdConfig {
        let mut config = ThresholdConfig::default();
        config.layers.insert(
            "gold".to_string(),
            ThresholdOverride {
                min_success_rate: Some(0.95),
                max_failed_validations: Some(1),
                max_failed_expectations: Some(3),
            },
        );
        config
    }

    #[test]
    fn test_resolution_specificity() {
        let mut config = gold_config();
        config.datasets.insert(
            "fact_sales".to_string(),
            ThresholdOverride {
                min_success_rate: Some(0.98),
                ..Default::default()
            },
        );

        let limits = config.resolve(Layer::Gold, "fact_sales");
        assert_eq!(limits.min_success_rate, 0.98); // dataset wins
        assert_eq!(limits.max_failed_validations, 1); // layer fills the gap
        assert_eq!(limits.max_failed_expectations, 3);

        let limits = config.resolve(Layer::Gold, "dim_customer");
        assert_eq!(limits.min_success_rate, 0.95); // layer

        let limits = config.resolve(Layer::Bronze, "orders");
        assert_eq!(limits.min_success_rate, 0.90); // global
    }

    #[test]
    fn test_rate_severity_scan() {
        assert_eq!(ThresholdEvaluator::rate_severity(0.99), Severity::Ok);
        assert_eq!(ThresholdEvaluator::rate_severity(0.96), Severity::Ok);
        assert_eq!(ThresholdEvaluator::rate_severity(0.95), Severity::Critical);
        assert_eq!(ThresholdEvaluator::rate_severity(0.94), Severity::Critical);
    }

    #[test]
    fn test_gold_threshold_scenarios() {
        let evaluator = ThresholdEvaluator::new(gold_config(), EvaluatorConfig::default());

        // 94% success against a 95% gold threshold: at least High
        let run = run_with_rate(100, 6);
        let assessment = evaluator.evaluate(Layer::Gold, "fact_sales", &run, 0);
        assert!(assessment.severity >= Severity::High);
        assert!(!assessment.is_clean());

        // 99% success: clean
        let run = run_with_rate(100, 1);
        let assessment = evaluator.evaluate(Layer::Gold, "fact_sales", &run, 0);
        assert_eq!(assessment.severity, Severity::Ok);
        // one failed expectation is within the gold limit of 3
        assert!(assessment.is_clean());
    }

    #[test]
    fn test_count_breach_escalates_beyond_rate() {
        let mut config = ThresholdConfig::default();
        config.datasets.insert(
            "kpi_revenue".to_string(),
            ThresholdOverride {
                min_success_rate: Some(1.0),
                max_failed_validations: Some(0),
                max_failed_expectations: Some(0),
            },
        );
        let evaluator = ThresholdEvaluator::new(config, EvaluatorConfig::default());

        // 98% rate is above every breakpoint (Ok), but both count limits
        // breach: two escalation steps
        let run = run_with_rate(50, 1);
        let assessment = evaluator.evaluate(Layer::Gold, "kpi_revenue", &run, 0);
        assert_eq!(assessment.severity, Severity::Medium);
        assert_eq!(assessment.breaches.len(), 3);
    }

    #[test]
    fn test_incomplete_run_counts_as_failed_validation() {
        let evaluator = ThresholdEvaluator::new(gold_config(), EvaluatorConfig::default());
        let mut run = run_with_rate(10, 0);
        run.status = RunStatus::Incomplete;

        // gold allows at most 1 failed validation; 1 prior + this one breaches
        let assessment = evaluator.evaluate(Layer::Gold, "fact_sales", &run, 1);
        assert!(assessment
            .breaches
            .iter()
            .any(|b| matches!(b, Breach::FailedValidations { actual: 2, .. })));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "global": {
                "min_success_rate": 0.9,
                "max_failed_validations": 3,
                "max_failed_expectations": 5
            },
            "layers": {
                "gold": { "min_success_rate": 0.95 }
            },
            "datasets": {
                "kpi_revenue": { "min_success_rate": 1.0, "max_failed_expectations": 0 }
            }
        }"#;
        let config = ThresholdConfig::from_json(json).unwrap();
        assert_eq!(config.resolve(Layer::Gold, "other").min_success_rate, 0.95);
        assert_eq!(
            config.resolve(Layer::Gold, "kpi_revenue").max_failed_expectations,
            0
        );
    }

    #[test]
    fn test_config_rejects_bad_rate() {
        let json = r#"{ "global": { "min_success_rate": 95.0,
            "max_failed_validations": 3, "max_failed_expectations": 5 } }"#;
        assert!(matches!(
            ThresholdConfig::from_json(json),
            Err(GuardError::Configuration(_))
        ));
    }

    #[test]
    fn test_severity_ordering_and_escalation() {
        assert!(Severity::Ok < Severity::Low);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::High.escalate(), Severity::Critical);
        assert_eq!(Severity::Critical.escalate(), Severity::Critical);
    }
}
