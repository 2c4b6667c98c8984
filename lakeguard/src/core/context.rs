//! The validation pipeline engine.
//!
//! [`ValidationContext`] wires the change detector, sampler, executor,
//! threshold evaluator, escalation manager, and history store into one
//! `validate` call per dataset snapshot:
//!
//! change gate -> sampling plan -> cached parallel execution ->
//! threshold scoring -> alerting -> history.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::alerting::{
    AlertEvent, EscalationConfig, EscalationManager, NotificationDispatcher, Notifier,
    RetryPolicy, TracingNotifier,
};
use crate::cache::{ResultCache, ResultCacheConfig};
use crate::core::dataset::Dataset;
use crate::core::expectation::ValidationSuite;
use crate::core::run::{RunStatus, ValidationRun};
use crate::detect::{ChangeDetector, ChangeDetectorConfig, ChangeReason};
use crate::error::Result;
use crate::executor::{ExecutorConfig, ValidationExecutor};
use crate::history::{HistoryStore, InMemoryHistoryStore};
use crate::metrics::{MetricsSink, TracingMetricsSink};
use crate::sample::{Sampler, SamplerConfig};
use crate::sources::DataSource;
use crate::thresholds::{
    EvaluatorConfig, QualityAssessment, Severity, ThresholdConfig, ThresholdEvaluator,
};

/// Aggregate configuration for the whole engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detector: ChangeDetectorConfig,
    pub sampler: SamplerConfig,
    pub cache: ResultCacheConfig,
    pub executor: ExecutorConfig,
    pub thresholds: ThresholdConfig,
    pub evaluator: EvaluatorConfig,
    pub escalation: EscalationConfig,
}

/// What one `validate` call did.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// The dataset was unchanged; no validation ran.
    Skipped { change: ChangeReason },
    /// The dataset was validated and scored.
    Validated {
        run: ValidationRun,
        assessment: QualityAssessment,
        /// Present when the assessment crossed the alerting bar
        alert: Option<AlertEvent>,
        change: ChangeReason,
        from_cache: bool,
    },
}

impl PipelineOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// The run, when validation actually executed.
    pub fn run(&self) -> Option<&ValidationRun> {
        match self {
            Self::Skipped { .. } => None,
            Self::Validated { run, .. } => Some(run),
        }
    }

    /// The assessment, when validation actually executed.
    pub fn assessment(&self) -> Option<&QualityAssessment> {
        match self {
            Self::Skipped { .. } => None,
            Self::Validated { assessment, .. } => Some(assessment),
        }
    }
}

/// Builder wiring custom backends into the engine.
pub struct ValidationContextBuilder {
    config: EngineConfig,
    history: Option<Arc<dyn HistoryStore>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    notifier: Option<Arc<dyn Notifier>>,
    retry: RetryPolicy,
}

impl ValidationContextBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            history: None,
            metrics: None,
            notifier: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<ValidationContext> {
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier::default()));
        let dispatcher = Arc::new(NotificationDispatcher::new(notifier, self.retry));
        let escalation = Arc::new(EscalationManager::new(
            self.config.escalation.clone(),
            dispatcher,
        )?);
        let cache = Arc::new(ResultCache::with_config(self.config.cache.clone()));

        Ok(ValidationContext {
            detector: ChangeDetector::new(self.config.detector.clone()),
            sampler: Sampler::new(self.config.sampler.clone()),
            executor: ValidationExecutor::new(Arc::clone(&cache), self.config.executor.clone()),
            cache,
            evaluator: ThresholdEvaluator::new(
                self.config.thresholds.clone(),
                self.config.evaluator.clone(),
            ),
            escalation,
            history: self
                .history
                .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::new())),
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(TracingMetricsSink::new())),
        })
    }
}

/// The assembled validation engine.
pub struct ValidationContext {
    detector: ChangeDetector,
    sampler: Sampler,
    executor: ValidationExecutor,
    cache: Arc<ResultCache>,
    evaluator: ThresholdEvaluator,
    escalation: Arc<EscalationManager>,
    history: Arc<dyn HistoryStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl ValidationContext {
    /// Engine with default in-memory backends.
    pub fn new(config: EngineConfig) -> Result<Self> {
        ValidationContextBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> ValidationContextBuilder {
        ValidationContextBuilder::new(config)
    }

    /// Starts background workers (the escalation ticker).
    pub async fn start(&self) {
        self.escalation.start().await;
    }

    /// Stops background workers and waits for them.
    pub async fn shutdown(&self) {
        self.escalation.shutdown().await;
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn escalation(&self) -> &Arc<EscalationManager> {
        &self.escalation
    }

    /// Acknowledges an alert by id, freezing its escalation.
    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<AlertEvent> {
        self.escalation.acknowledge(alert_id).await
    }

    /// Runs the full pipeline for one dataset snapshot.
    #[instrument(skip_all, fields(dataset = %dataset.qualified_name()))]
    pub async fn validate(
        &self,
        dataset: &Dataset,
        source: Arc<dyn DataSource>,
        suite: &ValidationSuite,
    ) -> Result<PipelineOutcome> {
        let qualified = dataset.qualified_name();

        let (needs_validation, change) = self.detector.check(dataset)?;
        if !needs_validation {
            info!(change = ?change, "Dataset unchanged, skipping validation");
            self.metrics.run_skipped(&qualified);
            return Ok(PipelineOutcome::Skipped { change });
        }

        let sample = self.sampler.plan(dataset.row_count);
        let execution = self.executor.execute(dataset, source, suite, &sample).await?;
        if execution.from_cache {
            self.metrics.cache_hit(&qualified);
        }
        let run = execution.run;

        let cutoff = Utc::now() - self.evaluator.failed_run_window();
        let recent_failed = self.history.failed_runs_since(&qualified, cutoff).await?;
        let assessment =
            self.evaluator
                .evaluate(dataset.layer, &dataset.name, &run, recent_failed);

        let alert = if assessment.severity > Severity::Ok {
            let summary = format!(
                "success rate {:.1}%, {} failed expectation(s), {} recent failed run(s)",
                run.success_rate * 100.0,
                run.failed_expectations(),
                recent_failed
            );
            let alert = self
                .escalation
                .raise(&qualified, assessment.severity, summary)
                .await;
            // Coalesced repeats update the open alert; only creations are
            // logged to history
            if alert.occurrences == 1 {
                self.history.append_alert(alert.clone()).await?;
            }
            self.metrics.alert_raised(&qualified, assessment.severity);
            Some(alert)
        } else {
            None
        };

        // Cached runs were already recorded when first computed
        if !execution.from_cache {
            self.history.append_run(run.clone()).await?;
        }
        // Only a completed run becomes the change baseline; errored or timed
        // out snapshots must validate again next time
        if matches!(run.status, RunStatus::Passed | RunStatus::Failed) {
            self.detector.record(dataset)?;
        }
        self.metrics
            .run_completed(&qualified, run.success_rate, run.duration_ms);

        info!(
            run.id = %run.id,
            status = ?run.status,
            severity = %assessment.severity,
            from_cache = execution.from_cache,
            "Validation pipeline finished"
        );

        Ok(PipelineOutcome::Validated {
            run,
            assessment,
            alert,
            change,
            from_cache: execution.from_cache,
        })
    }
}
