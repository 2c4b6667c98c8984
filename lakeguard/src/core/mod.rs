//! Core domain types and the validation engine.

pub mod context;
pub mod dataset;
pub mod expectation;
pub mod run;

pub use context::{
    EngineConfig, PipelineOutcome, ValidationContext, ValidationContextBuilder,
};
pub use dataset::{Dataset, Fingerprint, Layer};
pub use expectation::{
    ChunkVerdict, Expectation, ExpectationCheck, ExpectationKind, SuiteProvider, ValidationSuite,
    ValidationSuiteBuilder,
};
pub use run::{ExpectationOutcome, OutcomeStatus, RunStatus, ValidationRun};
