//! Built-in expectation checks over Arrow record batches.
//!
//! Each check inspects one chunk of a dataset and reports pass or fail with a
//! detail message. Checks must be deterministic for a given chunk; the
//! executor relies on that for result caching.

pub mod spec;

pub use spec::{CheckSpec, ExpectationSpec, SuiteSpec};

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::core::expectation::{ChunkVerdict, ExpectationCheck};
use crate::error::{GuardError, Result};

fn column<'a>(chunk: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    chunk
        .column_by_name(name)
        .ok_or_else(|| GuardError::expectation(name, format!("Column '{name}' not found")))
}

/// Numeric view over a column, accepting Int64 and Float64.
fn numeric_values(name: &str, array: &ArrayRef) -> Result<Vec<Option<f64>>> {
    if let Some(ints) = array.as_any().downcast_ref::<Int64Array>() {
        return Ok(ints.iter().map(|v| v.map(|x| x as f64)).collect());
    }
    if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
        return Ok(floats.iter().collect());
    }
    Err(GuardError::expectation(
        name,
        format!(
            "Column '{name}' has non-numeric type {}",
            array.data_type()
        ),
    ))
}

/// Verifies that a set of columns exists, optionally with exact types.
#[derive(Debug, Clone)]
pub struct SchemaCheck {
    columns: Vec<(String, Option<DataType>)>,
}

impl SchemaCheck {
    /// Requires the named columns to be present, any type.
    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names.into_iter().map(|n| (n.into(), None)).collect(),
        }
    }

    /// Requires the named columns with exact types.
    pub fn typed_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(n, t)| (n.into(), Some(t)))
                .collect(),
        }
    }
}

impl ExpectationCheck for SchemaCheck {
    fn evaluate(&self, chunk: &RecordBatch) -> Result<ChunkVerdict> {
        let schema = chunk.schema();
        for (name, expected_type) in &self.columns {
            let Ok(field) = schema.field_with_name(name) else {
                return Ok(ChunkVerdict::fail(format!("Missing column '{name}'")));
            };
            if let Some(expected) = expected_type {
                if field.data_type() != expected {
                    return Ok(ChunkVerdict::fail(format!(
                        "Column '{name}' has type {}, expected {expected}",
                        field.data_type()
                    )));
                }
            }
        }
        Ok(ChunkVerdict::Pass)
    }
}

/// Bounds the null fraction of a column.
#[derive(Debug, Clone)]
pub struct NullCheck {
    column: String,
    /// Maximum tolerated null fraction, in [0, 1]
    max_null_fraction: f64,
}

impl NullCheck {
    /// Forbids any nulls in the column.
    pub fn forbid(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            max_null_fraction: 0.0,
        }
    }

    /// Tolerates up to `max_null_fraction` nulls.
    pub fn at_most(column: impl Into<String>, max_null_fraction: f64) -> Self {
        Self {
            column: column.into(),
            max_null_fraction,
        }
    }
}

impl ExpectationCheck for NullCheck {
    fn evaluate(&self, chunk: &RecordBatch) -> Result<ChunkVerdict> {
        let array = column(chunk, &self.column)?;
        if array.is_empty() {
            return Ok(ChunkVerdict::Pass);
        }
        let fraction = array.null_count() as f64 / array.len() as f64;
        if fraction > self.max_null_fraction {
            return Ok(ChunkVerdict::fail(format!(
                "Column '{}' is {:.2}% null, limit is {:.2}%",
                self.column,
                fraction * 100.0,
                self.max_null_fraction * 100.0
            )));
        }
        Ok(ChunkVerdict::Pass)
    }
}

/// Requires every non-null value of a numeric column to fall inside
/// `[min, max]`.
#[derive(Debug, Clone)]
pub struct RangeCheck {
    column: String,
    min: f64,
    max: f64,
}

impl RangeCheck {
    pub fn between(column: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            column: column.into(),
            min,
            max,
        }
    }

    /// Requires values to be non-negative.
    pub fn non_negative(column: impl Into<String>) -> Self {
        Self::between(column, 0.0, f64::INFINITY)
    }
}

impl ExpectationCheck for RangeCheck {
    fn evaluate(&self, chunk: &RecordBatch) -> Result<ChunkVerdict> {
        let array = column(chunk, &self.column)?;
        let values = numeric_values(&self.column, array)?;
        let out_of_range = values
            .iter()
            .flatten()
            .filter(|v| **v < self.min || **v > self.max)
            .count();
        if out_of_range > 0 {
            return Ok(ChunkVerdict::fail(format!(
                "Column '{}' has {out_of_range} value(s) outside [{}, {}]",
                self.column, self.min, self.max
            )));
        }
        Ok(ChunkVerdict::Pass)
    }
}

/// Bounds the number of rows in a chunk.
#[derive(Debug, Clone)]
pub struct RowCountCheck {
    min_rows: usize,
    max_rows: Option<usize>,
}

impl RowCountCheck {
    /// Requires at least `min_rows` rows.
    pub fn at_least(min_rows: usize) -> Self {
        Self {
            min_rows,
            max_rows: None,
        }
    }

    /// Requires the row count to fall inside `[min_rows, max_rows]`.
    pub fn between(min_rows: usize, max_rows: usize) -> Self {
        Self {
            min_rows,
            max_rows: Some(max_rows),
        }
    }
}

impl ExpectationCheck for RowCountCheck {
    fn evaluate(&self, chunk: &RecordBatch) -> Result<ChunkVerdict> {
        let rows = chunk.num_rows();
        if rows < self.min_rows {
            return Ok(ChunkVerdict::fail(format!(
                "Chunk has {rows} rows, expected at least {}",
                self.min_rows
            )));
        }
        if let Some(max) = self.max_rows {
            if rows > max {
                return Ok(ChunkVerdict::fail(format!(
                    "Chunk has {rows} rows, expected at most {max}"
                )));
            }
        }
        Ok(ChunkVerdict::Pass)
    }
}

/// Compares the sum of one numeric column against the sum of others, within
/// a relative tolerance. Covers reconciliation checks like
/// `total = price * quantity` precomputed into component columns.
#[derive(Debug, Clone)]
pub struct SumReconciliationCheck {
    total_column: String,
    component_columns: Vec<String>,
    tolerance: f64,
}

impl SumReconciliationCheck {
    pub fn new<I, S>(total_column: impl Into<String>, components: I, tolerance: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            total_column: total_column.into(),
            component_columns: components.into_iter().map(Into::into).collect(),
            tolerance,
        }
    }
}

impl ExpectationCheck for SumReconciliationCheck {
    fn evaluate(&self, chunk: &RecordBatch) -> Result<ChunkVerdict> {
        let total_array = column(chunk, &self.total_column)?;
        let total: f64 = numeric_values(&self.total_column, total_array)?
            .into_iter()
            .flatten()
            .sum();

        let mut component_sum = 0.0;
        for name in &self.component_columns {
            let array = column(chunk, name)?;
            component_sum += numeric_values(name, array)?
                .into_iter()
                .flatten()
                .sum::<f64>();
        }

        let scale = total.abs().max(component_sum.abs()).max(1.0);
        if (total - component_sum).abs() > self.tolerance * scale {
            return Ok(ChunkVerdict::fail(format!(
                "Sum of '{}' ({total:.4}) does not reconcile with {:?} ({component_sum:.4})",
                self.total_column, self.component_columns
            )));
        }
        Ok(ChunkVerdict::Pass)
    }
}
