//! Declarative suite definitions.
//!
//! Suites can be described in JSON and turned into [`ValidationSuite`]s,
//! which is how the CLI and external rule stores define expectations without
//! writing Rust. One entry per expectation:
//!
//! ```json
//! {
//!   "expectations": [
//!     {
//!       "id": "order_id_not_null",
//!       "critical": true,
//!       "check": { "type": "null", "column": "order_id" }
//!     },
//!     {
//!       "id": "amount_in_range",
//!       "check": { "type": "range", "column": "amount", "min": 0.0, "max": 100000.0 }
//!     }
//!   ]
//! }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::checks::{NullCheck, RangeCheck, RowCountCheck, SchemaCheck, SumReconciliationCheck};
use crate::core::dataset::Layer;
use crate::core::expectation::{Expectation, ExpectationKind, ValidationSuite};
use crate::error::{GuardError, Result};

/// Serializable form of one check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSpec {
    Schema {
        columns: Vec<String>,
    },
    Null {
        column: String,
        #[serde(default)]
        max_null_fraction: f64,
    },
    Range {
        column: String,
        min: f64,
        max: f64,
    },
    RowCount {
        min_rows: usize,
        #[serde(default)]
        max_rows: Option<usize>,
    },
    SumReconciliation {
        total_column: String,
        component_columns: Vec<String>,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
}

fn default_tolerance() -> f64 {
    0.001
}

impl CheckSpec {
    fn kind(&self) -> ExpectationKind {
        match self {
            Self::Schema { .. } => ExpectationKind::Schema,
            Self::Null { .. } => ExpectationKind::Null,
            Self::Range { .. } => ExpectationKind::Range,
            Self::RowCount { .. } => ExpectationKind::Distribution,
            Self::SumReconciliation { .. } => ExpectationKind::Mathematical,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Null { max_null_fraction, column } => {
                if !(0.0..=1.0).contains(max_null_fraction) {
                    return Err(GuardError::configuration(format!(
                        "max_null_fraction for '{column}' must be within [0, 1]"
                    )));
                }
            }
            Self::Range { min, max, column } => {
                if min > max {
                    return Err(GuardError::configuration(format!(
                        "Range for '{column}' has min {min} above max {max}"
                    )));
                }
            }
            Self::RowCount { min_rows, max_rows } => {
                if let Some(max) = max_rows {
                    if min_rows > max {
                        return Err(GuardError::configuration(
                            "Row count bounds are inverted",
                        ));
                    }
                }
            }
            Self::Schema { .. } | Self::SumReconciliation { .. } => {}
        }
        Ok(())
    }

    fn build(&self) -> Arc<dyn crate::core::expectation::ExpectationCheck> {
        match self {
            Self::Schema { columns } => Arc::new(SchemaCheck::columns(columns.clone())),
            Self::Null { column, max_null_fraction } => {
                Arc::new(NullCheck::at_most(column, *max_null_fraction))
            }
            Self::Range { column, min, max } => Arc::new(RangeCheck::between(column, *min, *max)),
            Self::RowCount { min_rows, max_rows } => Arc::new(match max_rows {
                Some(max) => RowCountCheck::between(*min_rows, *max),
                None => RowCountCheck::at_least(*min_rows),
            }),
            Self::SumReconciliation { total_column, component_columns, tolerance } => Arc::new(
                SumReconciliationCheck::new(total_column, component_columns.clone(), *tolerance),
            ),
        }
    }
}

/// Serializable form of one expectation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectationSpec {
    pub id: String,
    #[serde(default)]
    pub critical: bool,
    pub check: CheckSpec,
}

/// Serializable form of a suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub expectations: Vec<ExpectationSpec>,
}

impl SuiteSpec {
    /// Parses a spec from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(json)?;
        Ok(spec)
    }

    /// Builds the concrete suite for a (layer, dataset) pair.
    pub fn into_suite(self, layer: Layer, dataset_name: &str) -> Result<ValidationSuite> {
        let mut builder = ValidationSuite::builder(layer, dataset_name);
        if let Some(id) = self.id {
            builder = builder.id(id);
        }
        for spec in self.expectations {
            spec.check.validate()?;
            let kind = spec.check.kind();
            builder = builder.expectation(Expectation::new(
                spec.id,
                kind,
                spec.critical,
                spec.check.build(),
            ));
        }
        builder.build()
    }
}
