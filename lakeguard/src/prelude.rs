//! Prelude for commonly used types and traits in lakeguard.

pub use crate::alerting::{AlertEvent, EscalationConfig, EscalationManager, Notifier};
pub use crate::core::{
    Dataset, EngineConfig, Expectation, ExpectationCheck, ExpectationKind, Layer,
    PipelineOutcome, RunStatus, ValidationContext, ValidationRun, ValidationSuite,
};
pub use crate::error::{GuardError, Result};
pub use crate::history::HistoryStore;
pub use crate::logging::LoggingConfig;
pub use crate::sources::{CsvSource, DataSource, MemorySource};
pub use crate::thresholds::{QualityAssessment, Severity, ThresholdConfig};
