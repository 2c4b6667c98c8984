//! Parallel, cached suite execution.
//!
//! The executor turns a (dataset, suite, sample) triple into a
//! [`ValidationRun`]. Results are keyed by suite id, dataset fingerprint, and
//! sampling descriptor, so a re-validation of unchanged data with the same
//! plan is served from the cache, and concurrent requests for the same key
//! coalesce into a single execution.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::cache::ResultCache;
use crate::core::dataset::{Dataset, Fingerprint};
use crate::core::expectation::{ChunkVerdict, Expectation, ValidationSuite};
use crate::core::run::{ExpectationOutcome, RunStatus, ValidationRun};
use crate::error::{GuardError, Result};
use crate::sample::SampleDescriptor;
use crate::sources::DataSource;

/// Tunables for suite execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum expectations evaluated concurrently
    pub parallelism: usize,
    /// Wall-clock budget for one run; `None` disables the deadline
    pub run_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            run_timeout: Some(Duration::from_secs(3600)),
        }
    }
}

impl ExecutorConfig {
    /// Sizes the worker pool from the host CPU count, capped at 8.
    pub fn with_host_parallelism() -> Self {
        Self {
            parallelism: num_cpus::get().clamp(1, 8),
            ..Default::default()
        }
    }
}

/// A run plus whether it was served from the result cache.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub run: ValidationRun,
    pub from_cache: bool,
}

/// Executes validation suites with caching, coalescing, and a worker pool.
pub struct ValidationExecutor {
    cache: Arc<ResultCache>,
    config: ExecutorConfig,
    run_seq: AtomicU64,
}

impl ValidationExecutor {
    pub fn new(cache: Arc<ResultCache>, config: ExecutorConfig) -> Self {
        Self {
            cache,
            config,
            run_seq: AtomicU64::new(0),
        }
    }

    /// Cache key for a (suite, snapshot, sampling plan) triple.
    pub fn cache_key(
        suite_id: &str,
        fingerprint: &Fingerprint,
        sample: &SampleDescriptor,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(suite_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(fingerprint.content_hash.as_bytes());
        hasher.update(b"\n");
        hasher.update(fingerprint.schema_hash.as_bytes());
        hasher.update(b"\n");
        hasher.update(fingerprint.row_count.to_le_bytes());
        hasher.update(b"\n");
        hasher.update(sample.cache_token().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Runs the suite against the dataset, consulting the cache first.
    ///
    /// A cache-layer failure (for example a coalesced leader that errored)
    /// degrades to a direct re-execution rather than failing the validation.
    #[instrument(skip_all, fields(dataset = %dataset.qualified_name(), suite = %suite.id()))]
    pub async fn execute(
        &self,
        dataset: &Dataset,
        source: Arc<dyn DataSource>,
        suite: &ValidationSuite,
        sample: &SampleDescriptor,
    ) -> Result<ExecutionOutcome> {
        let key = Self::cache_key(suite.id(), &dataset.fingerprint(), sample);
        let computed = AtomicBool::new(false);

        let result = self
            .cache
            .get_or_compute(&key, || {
                computed.store(true, Ordering::SeqCst);
                self.run_suite(dataset, Arc::clone(&source), suite, sample)
            })
            .await;

        let run = match result {
            Ok(run) => run,
            Err(GuardError::Cache(message)) => {
                warn!(error = %message, "Cache path failed, re-executing directly");
                computed.store(true, Ordering::SeqCst);
                match self.run_suite(dataset, source, suite, sample).await {
                    Ok(run) => run,
                    Err(err @ GuardError::DataAccess { .. }) => {
                        self.error_run(dataset, suite, sample, &err)
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(err @ GuardError::DataAccess { .. }) => {
                computed.store(true, Ordering::SeqCst);
                self.error_run(dataset, suite, sample, &err)
            }
            Err(err) => return Err(err),
        };

        Ok(ExecutionOutcome {
            run,
            from_cache: !computed.load(Ordering::SeqCst),
        })
    }

    /// Assembles a run with status [`RunStatus::Error`] for a dataset that
    /// could not be read. The run is never cached, so the next request
    /// retries the source; it still lands in history and threshold scoring.
    fn error_run(
        &self,
        dataset: &Dataset,
        suite: &ValidationSuite,
        sample: &SampleDescriptor,
        err: &GuardError,
    ) -> ValidationRun {
        let started_at = Utc::now();
        let run_id = format!(
            "run-{}-{}",
            started_at.timestamp_millis(),
            self.run_seq.fetch_add(1, Ordering::SeqCst)
        );
        warn!(
            run.id = %run_id,
            dataset = %dataset.qualified_name(),
            error = %err,
            "Dataset unreadable, recording errored run"
        );
        ValidationRun {
            id: run_id,
            dataset: dataset.qualified_name(),
            fingerprint: dataset.fingerprint(),
            suite_id: suite.id().to_string(),
            started_at,
            duration_ms: 0,
            sample: sample.clone(),
            outcomes: Vec::new(),
            status: RunStatus::Error,
            success_rate: 0.0,
        }
    }

    /// Executes the full suite with no cache involvement.
    async fn run_suite(
        &self,
        dataset: &Dataset,
        source: Arc<dyn DataSource>,
        suite: &ValidationSuite,
        sample: &SampleDescriptor,
    ) -> Result<ValidationRun> {
        let started_at = Utc::now();
        let started = Instant::now();
        let run_id = format!(
            "run-{}-{}",
            started_at.timestamp_millis(),
            self.run_seq.fetch_add(1, Ordering::SeqCst)
        );

        let chunks = Arc::new(source.chunks(sample).await?);
        debug!(
            run.id = %run_id,
            chunks = chunks.len(),
            expectations = suite.expectations().len(),
            "Executing validation suite"
        );

        let evaluation = stream::iter(suite.expectations().to_vec())
            .map(|expectation| {
                let chunks = Arc::clone(&chunks);
                async move {
                    let id = expectation.id.clone();
                    let kind = expectation.kind;
                    let critical = expectation.critical;
                    tokio::task::spawn_blocking(move || {
                        evaluate_expectation(&expectation, &chunks)
                    })
                    .await
                    .unwrap_or_else(|join_err| {
                        let mut outcome = ExpectationOutcome::empty(id, kind, critical);
                        outcome.record_error(format!("Evaluation task failed: {join_err}"));
                        outcome.finalize();
                        outcome
                    })
                }
            })
            .buffer_unordered(self.config.parallelism.max(1))
            .collect::<Vec<_>>();

        let outcomes = match self.config.run_timeout {
            Some(timeout) => {
                let deadline = tokio::time::sleep(timeout);
                tokio::pin!(deadline);
                tokio::select! {
                    outcomes = evaluation => Some(outcomes),
                    _ = &mut deadline => None,
                }
            }
            None => Some(evaluation.await),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let run = match outcomes {
            Some(mut outcomes) => {
                outcomes.sort_by(|a, b| a.id.cmp(&b.id));
                let status = derive_status(&outcomes);
                let success_rate = ValidationRun::compute_success_rate(&outcomes);
                ValidationRun {
                    id: run_id,
                    dataset: dataset.qualified_name(),
                    fingerprint: dataset.fingerprint(),
                    suite_id: suite.id().to_string(),
                    started_at,
                    duration_ms,
                    sample: sample.clone(),
                    outcomes,
                    status,
                    success_rate,
                }
            }
            None => {
                warn!(run.id = %run_id, duration_ms, "Validation run hit its deadline");
                ValidationRun {
                    id: run_id,
                    dataset: dataset.qualified_name(),
                    fingerprint: dataset.fingerprint(),
                    suite_id: suite.id().to_string(),
                    started_at,
                    duration_ms,
                    sample: sample.clone(),
                    outcomes: Vec::new(),
                    status: RunStatus::Incomplete,
                    success_rate: 0.0,
                }
            }
        };

        debug!(
            run.id = %run.id,
            status = ?run.status,
            success_rate = run.success_rate,
            duration_ms = run.duration_ms,
            "Validation run finished"
        );
        Ok(run)
    }
}

/// Evaluates one expectation across all chunks, folding errors into the
/// outcome instead of failing the run.
fn evaluate_expectation(expectation: &Expectation, chunks: &[RecordBatch]) -> ExpectationOutcome {
    let mut outcome =
        ExpectationOutcome::empty(&expectation.id, expectation.kind, expectation.critical);
    for chunk in chunks {
        match expectation.check.evaluate(chunk) {
            Ok(ChunkVerdict::Pass) => outcome.record_pass(),
            Ok(ChunkVerdict::Fail { detail }) => outcome.record_fail(detail),
            Err(err) => outcome.record_error(err.to_string()),
        }
    }
    outcome.finalize();
    outcome
}

/// Run status from per-expectation outcomes; errors dominate failures.
fn derive_status(outcomes: &[ExpectationOutcome]) -> RunStatus {
    use crate::core::run::OutcomeStatus;
    if outcomes.iter().any(|o| o.status == OutcomeStatus::Error) {
        RunStatus::Error
    } else if outcomes.iter().any(|o| o.status == OutcomeStatus::Fail) {
        RunStatus::Failed
    } else {
        RunStatus::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{NullCheck, RangeCheck, RowCountCheck, SchemaCheck};
    use crate::core::dataset::Layer;
    use crate::core::expectation::ExpectationKind;
    use crate::sources::MemorySource;
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Mutex;

    fn orders_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("order_id", DataType::Int64, false),
            Field::new("amount", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(Float64Array::from(vec![Some(10.0), Some(20.0), Some(30.0)])),
            ],
        )
        .unwrap()
    }

    fn orders_dataset() -> Dataset {
        Dataset::new(Layer::Gold, "orders", "/data/gold/orders", 3, "c1", "s1")
    }

    fn orders_suite() -> ValidationSuite {
        ValidationSuite::builder(Layer::Gold, "orders")
            .expectation(Expectation::new(
                "schema_core_columns",
                ExpectationKind::Schema,
                true,
                Arc::new(SchemaCheck::columns(["order_id", "amount"])),
            ))
            .expectation(Expectation::new(
                "order_id_not_null",
                ExpectationKind::Null,
                true,
                Arc::new(NullCheck::forbid("order_id")),
            ))
            .expectation(Expectation::new(
                "amount_non_negative",
                ExpectationKind::Range,
                false,
                Arc::new(RangeCheck::non_negative("amount")),
            ))
            .build()
            .unwrap()
    }

    fn executor() -> ValidationExecutor {
        ValidationExecutor::new(Arc::new(ResultCache::new()), ExecutorConfig::default())
    }

    #[tokio::test]
    async fn test_passing_suite() {
        let executor = executor();
        let source = Arc::new(MemorySource::new(vec![orders_batch()]));
        let sample = SampleDescriptor::full(3, 42);

        let outcome = executor
            .execute(&orders_dataset(), source, &orders_suite(), &sample)
            .await
            .unwrap();

        assert!(!outcome.from_cache);
        assert_eq!(outcome.run.status, RunStatus::Passed);
        assert_eq!(outcome.run.success_rate, 1.0);
        assert_eq!(outcome.run.total_expectations(), 3);
        // Outcomes come back sorted by expectation id
        let ids: Vec<_> = outcome.run.outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["amount_non_negative", "order_id_not_null", "schema_core_columns"]
        );
    }

    #[tokio::test]
    async fn test_failing_expectation_yields_failed_run() {
        let executor = executor();
        let suite = ValidationSuite::builder(Layer::Gold, "orders")
            .expectation(Expectation::new(
                "impossible_row_count",
                ExpectationKind::Distribution,
                true,
                Arc::new(RowCountCheck::at_least(1000)),
            ))
            .expectation(Expectation::new(
                "order_id_not_null",
                ExpectationKind::Null,
                true,
                Arc::new(NullCheck::forbid("order_id")),
            ))
            .build()
            .unwrap();
        let source = Arc::new(MemorySource::new(vec![orders_batch()]));
        let sample = SampleDescriptor::full(3, 42);

        let outcome = executor
            .execute(&orders_dataset(), source, &suite, &sample)
            .await
            .unwrap();

        assert_eq!(outcome.run.status, RunStatus::Failed);
        assert_eq!(outcome.run.failed_expectations(), 1);
        assert!((outcome.run.success_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluation_error_is_recorded_not_propagated() {
        let executor = executor();
        // References a column the dataset does not have
        let suite = ValidationSuite::builder(Layer::Gold, "orders")
            .expectation(Expectation::new(
                "phantom_column_range",
                ExpectationKind::Range,
                false,
                Arc::new(RangeCheck::non_negative("phantom")),
            ))
            .build()
            .unwrap();
        let source = Arc::new(MemorySource::new(vec![orders_batch()]));
        let sample = SampleDescriptor::full(3, 42);

        let outcome = executor
            .execute(&orders_dataset(), source, &suite, &sample)
            .await
            .unwrap();

        assert_eq!(outcome.run.status, RunStatus::Error);
        assert_eq!(outcome.run.errored_expectations(), 1);
        let detail = outcome.run.outcomes[0].detail.as_deref().unwrap();
        assert!(detail.contains("phantom"));
    }

    #[tokio::test]
    async fn test_identical_request_is_served_from_cache() {
        let executor = executor();
        let source = Arc::new(MemorySource::new(vec![orders_batch()]));
        let suite = orders_suite();
        let sample = SampleDescriptor::full(3, 42);
        let dataset = orders_dataset();

        let first = executor
            .execute(&dataset, source.clone(), &suite, &sample)
            .await
            .unwrap();
        let second = executor
            .execute(&dataset, source.clone(), &suite, &sample)
            .await
            .unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.run.id, second.run.id);

        // A different fingerprint misses the cache
        let changed = Dataset::new(Layer::Gold, "orders", "/data/gold/orders", 3, "c2", "s1");
        let third = executor
            .execute(&changed, source, &suite, &sample)
            .await
            .unwrap();
        assert!(!third.from_cache);
    }

    #[tokio::test]
    async fn test_cache_key_sensitivity() {
        let dataset = orders_dataset();
        let sample = SampleDescriptor::full(3, 42);
        let base = ValidationExecutor::cache_key("suite_a", &dataset.fingerprint(), &sample);

        let other_suite = ValidationExecutor::cache_key("suite_b", &dataset.fingerprint(), &sample);
        assert_ne!(base, other_suite);

        let other_sample = SampleDescriptor::full(3, 7);
        let reseeded = ValidationExecutor::cache_key("suite_a", &dataset.fingerprint(), &other_sample);
        assert_ne!(base, reseeded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_deadline_yields_incomplete() {
        /// Check that outlives the run deadline by a wide margin.
        #[derive(Debug)]
        struct StallingCheck;

        impl crate::core::expectation::ExpectationCheck for StallingCheck {
            fn evaluate(&self, _chunk: &RecordBatch) -> crate::error::Result<ChunkVerdict> {
                std::thread::sleep(Duration::from_millis(500));
                Ok(ChunkVerdict::Pass)
            }
        }

        let executor = ValidationExecutor::new(
            Arc::new(ResultCache::new()),
            ExecutorConfig {
                parallelism: 1,
                run_timeout: Some(Duration::from_millis(50)),
            },
        );
        let suite = ValidationSuite::builder(Layer::Gold, "orders")
            .expectation(Expectation::new(
                "stalls",
                ExpectationKind::Distribution,
                false,
                Arc::new(StallingCheck),
            ))
            .build()
            .unwrap();
        let source = Arc::new(MemorySource::new(vec![orders_batch()]));

        let outcome = executor
            .execute(&orders_dataset(), source, &suite, &SampleDescriptor::full(3, 42))
            .await
            .unwrap();

        assert_eq!(outcome.run.status, RunStatus::Incomplete);
        assert!(outcome.run.status.counts_as_failed());
        assert!(outcome.run.outcomes.is_empty());
        // The run ended at the deadline, not when the check finished
        assert!(outcome.run.duration_ms < 500, "ran {} ms", outcome.run.duration_ms);
    }

    #[tokio::test]
    async fn test_unreadable_source_yields_errored_run() {
        /// Source whose backing data cannot be read.
        #[derive(Debug)]
        struct BrokenSource;

        #[async_trait::async_trait]
        impl DataSource for BrokenSource {
            async fn chunks(&self, _sample: &SampleDescriptor) -> Result<Vec<RecordBatch>> {
                Err(GuardError::data_access("gold/orders", "file vanished"))
            }
        }

        let executor = executor();
        let source = Arc::new(BrokenSource);
        let sample = SampleDescriptor::full(3, 42);

        let outcome = executor
            .execute(&orders_dataset(), source.clone(), &orders_suite(), &sample)
            .await
            .unwrap();

        assert_eq!(outcome.run.status, RunStatus::Error);
        assert!(!outcome.from_cache);
        assert_eq!(outcome.run.success_rate, 0.0);
        assert!(outcome.run.outcomes.is_empty());

        // Errored runs are not cached; the next request retries the source
        let again = executor
            .execute(&orders_dataset(), source, &orders_suite(), &sample)
            .await
            .unwrap();
        assert!(!again.from_cache);
        assert_ne!(outcome.run.id, again.run.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_requests_coalesce() {
        /// Source that counts how many times it is read.
        #[derive(Debug)]
        struct CountingSource {
            inner: MemorySource,
            reads: Mutex<u32>,
        }

        #[async_trait::async_trait]
        impl DataSource for CountingSource {
            async fn chunks(&self, sample: &SampleDescriptor) -> Result<Vec<RecordBatch>> {
                *self.reads.lock().unwrap() += 1;
                // Hold the computation open long enough for followers to pile up
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.inner.chunks(sample).await
            }
        }

        let executor = Arc::new(executor());
        let source = Arc::new(CountingSource {
            inner: MemorySource::new(vec![orders_batch()]),
            reads: Mutex::new(0),
        });
        let suite = Arc::new(orders_suite());
        let sample = SampleDescriptor::full(3, 42);
        let dataset = orders_dataset();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let executor = Arc::clone(&executor);
            let source: Arc<dyn DataSource> = source.clone();
            let suite = Arc::clone(&suite);
            let sample = sample.clone();
            let dataset = dataset.clone();
            handles.push(tokio::spawn(async move {
                executor.execute(&dataset, source, &suite, &sample).await
            }));
        }

        let mut run_ids = std::collections::HashSet::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            run_ids.insert(outcome.run.id);
        }

        assert_eq!(run_ids.len(), 1);
        assert_eq!(*source.reads.lock().unwrap(), 1);
    }
}
