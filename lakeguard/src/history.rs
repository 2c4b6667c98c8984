//! Validation history storage.
//!
//! Every completed validation run and every raised alert is appended here so
//! threshold evaluation can look back over recent failures and operators can
//! audit what happened. Storage backends implement [`HistoryStore`]; the
//! in-memory backend is the default for embedded use and tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::alerting::AlertEvent;
use crate::core::run::ValidationRun;
use crate::error::Result;

/// Append-only store of validation runs and alerts.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends a completed validation run.
    async fn append_run(&self, run: ValidationRun) -> Result<()>;

    /// Appends a raised alert.
    async fn append_alert(&self, alert: AlertEvent) -> Result<()>;

    /// Returns runs for a layer-qualified dataset name, oldest first.
    /// `since` bounds the window by start time when given.
    async fn runs(&self, dataset: &str, since: Option<DateTime<Utc>>)
        -> Result<Vec<ValidationRun>>;

    /// Returns alerts for a layer-qualified dataset name, oldest first.
    async fn alerts(&self, dataset: &str, since: Option<DateTime<Utc>>)
        -> Result<Vec<AlertEvent>>;

    /// Counts runs for the dataset that started at or after `cutoff` and did
    /// not pass.
    async fn failed_runs_since(&self, dataset: &str, cutoff: DateTime<Utc>) -> Result<u32> {
        let runs = self.runs(dataset, Some(cutoff)).await?;
        Ok(runs.iter().filter(|r| r.status.counts_as_failed()).count() as u32)
    }
}

/// In-memory history backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryStore {
    runs: Arc<RwLock<Vec<ValidationRun>>>,
    alerts: Arc<RwLock<Vec<AlertEvent>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored runs, across all datasets.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Total number of stored alerts, across all datasets.
    pub async fn alert_count(&self) -> usize {
        self.alerts.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append_run(&self, run: ValidationRun) -> Result<()> {
        debug!(
            run.id = %run.id,
            dataset = %run.dataset,
            status = ?run.status,
            "Recording validation run"
        );
        self.runs.write().await.push(run);
        Ok(())
    }

    async fn append_alert(&self, alert: AlertEvent) -> Result<()> {
        debug!(alert.id = %alert.id, dataset = %alert.dataset, "Recording alert");
        self.alerts.write().await.push(alert);
        Ok(())
    }

    async fn runs(
        &self,
        dataset: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ValidationRun>> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .filter(|r| r.dataset == dataset)
            .filter(|r| since.map_or(true, |cutoff| r.started_at >= cutoff))
            .cloned()
            .collect())
    }

    async fn alerts(
        &self,
        dataset: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AlertEvent>> {
        let alerts = self.alerts.read().await;
        Ok(alerts
            .iter()
            .filter(|a| a.dataset == dataset)
            .filter(|a| since.map_or(true, |cutoff| a.created_at >= cutoff))
            .cloned()
            .collect())
    }
}
