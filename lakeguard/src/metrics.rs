//! Engine observability counters.
//!
//! A [`MetricsSink`] receives a small set of named events as the engine runs.
//! The default sink emits them as structured trace events; deployments with a
//! metrics pipeline plug in their own implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::thresholds::Severity;

/// Receiver for engine-level counters. Implementations must be cheap; sinks
/// are called on the validation hot path.
pub trait MetricsSink: Send + Sync {
    /// A validation run finished with the given success rate.
    fn run_completed(&self, dataset: &str, success_rate: f64, duration_ms: u64);

    /// A validation was skipped because the dataset was unchanged.
    fn run_skipped(&self, dataset: &str);

    /// A cached result was served instead of re-executing.
    fn cache_hit(&self, dataset: &str);

    /// An alert was raised at the given severity.
    fn alert_raised(&self, dataset: &str, severity: Severity);
}

/// Sink that reports counters as structured trace events.
#[derive(Debug, Default)]
pub struct TracingMetricsSink {
    runs: AtomicU64,
    skips: AtomicU64,
    cache_hits: AtomicU64,
    alerts: AtomicU64,
}

impl TracingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn skip_count(&self) -> u64 {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn cache_hit_count(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn alert_count(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }
}

impl MetricsSink for TracingMetricsSink {
    fn run_completed(&self, dataset: &str, success_rate: f64, duration_ms: u64) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "lakeguard::metrics",
            dataset,
            success_rate,
            duration_ms,
            "validation_run_completed"
        );
    }

    fn run_skipped(&self, dataset: &str) {
        self.skips.fetch_add(1, Ordering::Relaxed);
        info!(target: "lakeguard::metrics", dataset, "validation_run_skipped");
    }

    fn cache_hit(&self, dataset: &str) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        info!(target: "lakeguard::metrics", dataset, "validation_cache_hit");
    }

    fn alert_raised(&self, dataset: &str, severity: Severity) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "lakeguard::metrics",
            dataset,
            severity = %severity,
            "alert_raised"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let sink = TracingMetricsSink::new();
        sink.run_completed("gold/fact_sales", 0.97, 42);
        sink.run_completed("gold/fact_sales", 0.91, 38);
        sink.run_skipped("silver/orders");
        sink.cache_hit("gold/fact_sales");
        sink.alert_raised("gold/fact_sales", Severity::High);

        assert_eq!(sink.run_count(), 2);
        assert_eq!(sink.skip_count(), 1);
        assert_eq!(sink.cache_hit_count(), 1);
        assert_eq!(sink.alert_count(), 1);
    }
}
