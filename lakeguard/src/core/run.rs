//! Validation run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dataset::Fingerprint;
use super::expectation::ExpectationKind;
use crate::sample::SampleDescriptor;

/// Final status of one expectation after merging chunk-level verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Pass,
    Fail,
    Error,
}

impl OutcomeStatus {
    /// Returns true if this outcome counts as a failed expectation.
    pub fn is_failed(&self) -> bool {
        !matches!(self, Self::Pass)
    }
}

/// Merged result of one expectation across all evaluated chunks.
///
/// Chunk counts are summed commutatively during parallel execution; the
/// status follows the precedence error > fail > pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationOutcome {
    pub id: String,
    pub kind: ExpectationKind,
    pub critical: bool,
    pub status: OutcomeStatus,
    pub chunks_passed: u64,
    pub chunks_failed: u64,
    pub chunks_errored: u64,
    /// First recorded failure or error detail, if any
    pub detail: Option<String>,
}

impl ExpectationOutcome {
    /// Creates an empty accumulator for the given expectation.
    pub fn empty(id: impl Into<String>, kind: ExpectationKind, critical: bool) -> Self {
        Self {
            id: id.into(),
            kind,
            critical,
            status: OutcomeStatus::Pass,
            chunks_passed: 0,
            chunks_failed: 0,
            chunks_errored: 0,
            detail: None,
        }
    }

    /// Records a passing chunk.
    pub fn record_pass(&mut self) {
        self.chunks_passed += 1;
    }

    /// Records a failing chunk with its detail.
    pub fn record_fail(&mut self, detail: impl Into<String>) {
        self.chunks_failed += 1;
        if self.detail.is_none() {
            self.detail = Some(detail.into());
        }
    }

    /// Records an errored chunk with its message.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.chunks_errored += 1;
        if self.detail.is_none() {
            self.detail = Some(message.into());
        }
    }

    /// Merges another accumulator for the same expectation by summation.
    pub fn merge(&mut self, other: &ExpectationOutcome) {
        debug_assert_eq!(self.id, other.id);
        self.chunks_passed += other.chunks_passed;
        self.chunks_failed += other.chunks_failed;
        self.chunks_errored += other.chunks_errored;
        if self.detail.is_none() {
            self.detail = other.detail.clone();
        }
    }

    /// Finalizes the status from the accumulated chunk counts.
    pub fn finalize(&mut self) {
        self.status = if self.chunks_errored > 0 {
            OutcomeStatus::Error
        } else if self.chunks_failed > 0 {
            OutcomeStatus::Fail
        } else {
            OutcomeStatus::Pass
        };
    }
}

/// Whole-run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// All expectations passed
    Passed,
    /// One or more expectations failed or errored
    Failed,
    /// The dataset could not be read; no expectations were evaluated
    Error,
    /// The run-level timeout elapsed before all chunks completed
    Incomplete,
}

impl RunStatus {
    /// Returns true if this run counts as a failed validation for threshold
    /// purposes. `Error` and `Incomplete` runs both count.
    pub fn counts_as_failed(&self) -> bool {
        !matches!(self, Self::Passed)
    }
}

/// Immutable record of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    /// Unique run id
    pub id: String,
    /// Layer-qualified dataset name
    pub dataset: String,
    /// Fingerprint of the validated snapshot
    pub fingerprint: Fingerprint,
    /// Suite that was executed
    pub suite_id: String,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
    /// Sampling applied to the dataset
    pub sample: SampleDescriptor,
    /// Per-expectation outcomes, sorted by expectation id
    pub outcomes: Vec<ExpectationOutcome>,
    /// Whole-run status
    pub status: RunStatus,
    /// passed / total, in [0, 1]; 1.0 for an empty suite
    pub success_rate: f64,
}

impl ValidationRun {
    /// Total number of expectations evaluated.
    pub fn total_expectations(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of expectations with a non-pass outcome.
    pub fn failed_expectations(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_failed()).count()
    }

    /// Number of expectations that errored during evaluation.
    pub fn errored_expectations(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Error)
            .count()
    }

    /// Computes the success rate from outcome counts.
    pub fn compute_success_rate(outcomes: &[ExpectationOutcome]) -> f64 {
        if outcomes.is_empty() {
            return 1.0;
        }
        let failed = outcomes.iter().filter(|o| o.status.is_failed()).count();
        (outcomes.len() - failed) as f64 / outcomes.len() as f64
    }
}
