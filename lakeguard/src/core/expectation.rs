//! Expectations, suites, and the external rule-store seam.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::dataset::Layer;
use crate::error::{GuardError, Result};

/// Closed set of expectation kinds.
///
/// New kinds are added by extending this tag set rather than via open-ended
/// dynamic dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectationKind {
    Schema,
    Null,
    Range,
    Referential,
    Mathematical,
    Distribution,
}

impl std::fmt::Display for ExpectationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Schema => "schema",
            Self::Null => "null",
            Self::Range => "range",
            Self::Referential => "referential",
            Self::Mathematical => "mathematical",
            Self::Distribution => "distribution",
        };
        write!(f, "{s}")
    }
}

/// Verdict of one expectation over one data chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkVerdict {
    /// The chunk satisfies the expectation
    Pass,
    /// The chunk violates the expectation
    Fail {
        /// Human-readable description of the violation
        detail: String,
    },
}

impl ChunkVerdict {
    /// Creates a failing verdict with the given detail.
    pub fn fail(detail: impl Into<String>) -> Self {
        Self::Fail {
            detail: detail.into(),
        }
    }

    /// Returns true if this verdict is a pass.
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// An opaque, deterministic, side-effect-free quality check evaluated against
/// one chunk of records.
///
/// Implementations must be stateless: the executor may evaluate the same
/// check concurrently across chunks.
pub trait ExpectationCheck: Debug + Send + Sync {
    /// Evaluates the check against a chunk of records.
    fn evaluate(&self, chunk: &RecordBatch) -> Result<ChunkVerdict>;
}

/// A single declarative data-quality rule.
#[derive(Debug, Clone)]
pub struct Expectation {
    /// Unique id within its suite
    pub id: String,
    /// Which closed kind this rule belongs to
    pub kind: ExpectationKind,
    /// Whether a failure of this rule alone should fail the run outright
    pub critical: bool,
    /// The opaque evaluator
    pub check: Arc<dyn ExpectationCheck>,
}

impl Expectation {
    /// Creates a new expectation.
    pub fn new(
        id: impl Into<String>,
        kind: ExpectationKind,
        critical: bool,
        check: Arc<dyn ExpectationCheck>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            critical,
            check,
        }
    }
}

/// Ordered set of expectations for one dataset at one layer.
#[derive(Debug, Clone)]
pub struct ValidationSuite {
    id: String,
    layer: Layer,
    dataset_name: String,
    expectations: Vec<Expectation>,
}

impl ValidationSuite {
    /// Creates a new builder for a suite targeting the given dataset.
    pub fn builder(layer: Layer, dataset_name: impl Into<String>) -> ValidationSuiteBuilder {
        ValidationSuiteBuilder::new(layer, dataset_name)
    }

    /// Returns the suite id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the layer this suite applies to.
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Returns the dataset name this suite applies to.
    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// Returns the expectations in suite order.
    pub fn expectations(&self) -> &[Expectation] {
        &self.expectations
    }

    /// Returns a copy of this suite restricted to critical expectations.
    ///
    /// Used by the CLI's lightweight mode.
    pub fn critical_only(&self) -> Self {
        Self {
            id: self.id.clone(),
            layer: self.layer,
            dataset_name: self.dataset_name.clone(),
            expectations: self
                .expectations
                .iter()
                .filter(|e| e.critical)
                .cloned()
                .collect(),
        }
    }
}

/// Builder for [`ValidationSuite`] instances.
#[derive(Debug)]
pub struct ValidationSuiteBuilder {
    id: Option<String>,
    layer: Layer,
    dataset_name: String,
    expectations: Vec<Expectation>,
}

impl ValidationSuiteBuilder {
    /// Creates a new suite builder.
    pub fn new(layer: Layer, dataset_name: impl Into<String>) -> Self {
        Self {
            id: None,
            layer,
            dataset_name: dataset_name.into(),
            expectations: Vec::new(),
        }
    }

    /// Overrides the generated suite id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds an expectation to the suite.
    pub fn expectation(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    /// Adds multiple expectations to the suite.
    pub fn expectations<I>(mut self, expectations: I) -> Self
    where
        I: IntoIterator<Item = Expectation>,
    {
        self.expectations.extend(expectations);
        self
    }

    /// Builds the suite, enforcing id uniqueness.
    pub fn build(self) -> Result<ValidationSuite> {
        let mut seen = HashSet::new();
        for e in &self.expectations {
            if !seen.insert(e.id.as_str()) {
                return Err(GuardError::configuration(format!(
                    "Duplicate expectation id '{}' in suite for {}/{}",
                    e.id, self.layer, self.dataset_name
                )));
            }
        }

        let id = self
            .id
            .unwrap_or_else(|| format!("{}_{}_suite", self.layer, self.dataset_name));

        Ok(ValidationSuite {
            id,
            layer: self.layer,
            dataset_name: self.dataset_name,
            expectations: self.expectations,
        })
    }
}

/// External rule store seam: resolves the suite for a (layer, dataset) pair.
#[async_trait]
pub trait SuiteProvider: Send + Sync {
    /// Returns the validation suite for the given dataset, or a
    /// `Configuration` error when none is registered.
    async fn get_suite(&self, layer: Layer, dataset_name: &str) -> Result<ValidationSuite>;
}
