//! Data sources feeding the validation executor.
//!
//! A [`DataSource`] yields a dataset as Arrow record batches with the sampling
//! plan already applied. Sampling is seeded, so the same descriptor over the
//! same data always yields the same rows.

use std::fs::File;
use std::io::Seek;
use std::path::PathBuf;

use arrow::array::BooleanArray;
use arrow::compute::filter_record_batch;
use arrow::csv::{reader::Format, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{GuardError, Result};
use crate::sample::{SampleDescriptor, SampleMethod};

/// Supplier of dataset chunks for validation.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Returns the dataset's chunks with the sampling plan applied.
    async fn chunks(&self, sample: &SampleDescriptor) -> Result<Vec<RecordBatch>>;
}

/// Applies a sampling descriptor to already-materialized batches.
///
/// Random sampling draws a seeded Bernoulli mask; stratified sampling over
/// sources without declared strata degrades to systematic row selection,
/// which preserves the target fraction and stays deterministic.
pub fn apply_sample(batches: Vec<RecordBatch>, sample: &SampleDescriptor) -> Result<Vec<RecordBatch>> {
    match sample.method {
        SampleMethod::Full => Ok(batches),
        SampleMethod::Random => {
            let mut rng = StdRng::seed_from_u64(sample.seed);
            batches
                .into_iter()
                .map(|batch| {
                    let mask: BooleanArray = (0..batch.num_rows())
                        .map(|_| Some(rng.random_bool(sample.fraction)))
                        .collect();
                    filter_record_batch(&batch, &mask).map_err(GuardError::from)
                })
                .collect()
        }
        SampleMethod::Stratified => {
            let step = (1.0 / sample.fraction).ceil().max(1.0) as u64;
            let offset = sample.seed % step;
            let mut row_index = 0u64;
            batches
                .into_iter()
                .map(|batch| {
                    let mask: BooleanArray = (0..batch.num_rows())
                        .map(|_| {
                            let keep = row_index % step == offset;
                            row_index += 1;
                            Some(keep)
                        })
                        .collect();
                    filter_record_batch(&batch, &mask).map_err(GuardError::from)
                })
                .collect()
        }
    }
}

/// In-memory source over pre-built record batches.
#[derive(Debug, Clone)]
pub struct MemorySource {
    batches: Vec<RecordBatch>,
}

impl MemorySource {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches }
    }

    pub fn row_count(&self) -> u64 {
        self.batches.iter().map(|b| b.num_rows() as u64).sum()
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn chunks(&self, sample: &SampleDescriptor) -> Result<Vec<RecordBatch>> {
        apply_sample(self.batches.clone(), sample)
    }
}

/// CSV file source with schema inference.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    batch_size: usize,
    has_header: bool,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch_size: 8192,
            has_header: true,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    fn read_batches(&self) -> Result<Vec<RecordBatch>> {
        let path = self.path.display().to_string();
        let mut file = File::open(&self.path)
            .map_err(|e| GuardError::data_access_with_source(&path, "Failed to open CSV file", e))?;

        let format = Format::default().with_header(self.has_header);
        let (schema, _) = format
            .infer_schema(&mut file, Some(1000))
            .map_err(GuardError::from)?;
        file.rewind()
            .map_err(|e| GuardError::data_access_with_source(&path, "Failed to rewind CSV file", e))?;

        let reader = ReaderBuilder::new(schema.into())
            .with_format(format)
            .with_batch_size(self.batch_size)
            .build(file)
            .map_err(GuardError::from)?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(GuardError::from)?;
        debug!(path = %path, batches = batches.len(), "Read CSV dataset");
        Ok(batches)
    }
}

#[async_trait]
impl DataSource for CsvSource {
    async fn chunks(&self, sample: &SampleDescriptor) -> Result<Vec<RecordBatch>> {
        let source = self.clone();
        let batches = tokio::task::spawn_blocking(move || source.read_batches())
            .await
            .map_err(|e| GuardError::Internal(format!("CSV read task failed: {e}")))??;
        apply_sample(batches, sample)
    }
}
