//! # Lakeguard - Layered Data-Store Quality Engine
//!
//! Lakeguard validates datasets flowing through a bronze/silver/gold lakehouse
//! and turns validation outcomes into operational alerts. It avoids wasted
//! work with fingerprint-based change detection, size-tiered sampling, and a
//! coalescing result cache, then scores each run against layer- and
//! dataset-specific thresholds and escalates unacknowledged incidents on a
//! timer.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use lakeguard::prelude::*;
//! use lakeguard::checks::{NullCheck, SchemaCheck};
//!
//! # async fn example() -> lakeguard::error::Result<()> {
//! let engine = ValidationContext::new(EngineConfig::default())?;
//! engine.start().await;
//!
//! let suite = ValidationSuite::builder(Layer::Gold, "fact_sales")
//!     .expectation(Expectation::new(
//!         "schema_core_columns",
//!         ExpectationKind::Schema,
//!         true,
//!         Arc::new(SchemaCheck::columns(["order_id", "amount"])),
//!     ))
//!     .expectation(Expectation::new(
//!         "order_id_not_null",
//!         ExpectationKind::Null,
//!         true,
//!         Arc::new(NullCheck::forbid("order_id")),
//!     ))
//!     .build()?;
//!
//! let dataset = Dataset::new(
//!     Layer::Gold,
//!     "fact_sales",
//!     "/data/gold/fact_sales.csv",
//!     1_000_000,
//!     "content-hash",
//!     "schema-hash",
//! );
//! let source = Arc::new(CsvSource::new("/data/gold/fact_sales.csv"));
//!
//! match engine.validate(&dataset, source, &suite).await? {
//!     PipelineOutcome::Skipped { .. } => println!("unchanged, skipped"),
//!     PipelineOutcome::Validated { run, assessment, .. } => {
//!         println!("{:?} at {:.1}%", run.status, run.success_rate * 100.0);
//!         println!("severity: {}", assessment.severity);
//!     }
//! }
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. **Change detection** - content hash, schema hash, and row-count drift
//!    against the last-seen fingerprint decide whether validation runs at all.
//! 2. **Sampling** - datasets above one million rows are validated over a
//!    seeded random sample; above ten million, a stratified one.
//! 3. **Execution** - expectations run on a bounded worker pool; identical
//!    (suite, snapshot, sample) requests coalesce into one execution and are
//!    served from an LRU+TTL cache afterwards.
//! 4. **Scoring** - success rate and failure counts are compared against
//!    thresholds resolved dataset-over-layer-over-global.
//! 5. **Alerting** - breaches raise alerts that escalate through contact
//!    levels on a timer until acknowledged; history keeps the audit trail.

pub mod alerting;
pub mod cache;
pub mod checks;
pub mod core;
pub mod detect;
pub mod error;
pub mod executor;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod prelude;
pub mod sample;
pub mod sources;
pub mod thresholds;

pub use crate::core::{EngineConfig, PipelineOutcome, ValidationContext};
pub use crate::error::{GuardError, Result};
