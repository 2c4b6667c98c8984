//! Error types for the LakeGuard validation engine.
//!
//! This module provides a comprehensive error handling strategy using `thiserror`
//! for automatic error trait implementations. All errors in the engine are
//! represented by the `GuardError` enum.

use thiserror::Error;

/// The main error type for the LakeGuard engine.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Malformed threshold or suite configuration. Fatal: aborts before any
    /// execution starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dataset unreadable or underlying storage failure. The run is recorded
    /// with status `Error` (distinct from `Failed`) and surfaced to the
    /// caller; never retried automatically.
    #[error("Data access error for '{dataset}': {message}")]
    DataAccess {
        /// Layer-qualified dataset identifier
        dataset: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single expectation raised during evaluation. Recovered locally and
    /// recorded as an `error` outcome for that expectation; the run continues.
    #[error("Expectation '{expectation}' evaluation failed: {message}")]
    ExpectationEvaluation {
        /// Id of the expectation that raised
        expectation: String,
        /// Detailed error message
        message: String,
    },

    /// Cache store unavailable or corrupt. Logged; execution falls back to
    /// full recomputation.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Notification channel failure. Retried with backoff up to a fixed
    /// attempt count, then logged and dropped.
    #[error("Notification delivery failed on {channel}: {message}")]
    Notification {
        /// Channel the delivery was attempted on
        channel: String,
        /// Detailed error message
        message: String,
    },

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, GuardError>` used throughout the engine.
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a data access error for the given dataset.
    pub fn data_access(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataAccess {
            dataset: dataset.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a data access error wrapping an underlying cause.
    pub fn data_access_with_source(
        dataset: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DataAccess {
            dataset: dataset.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an expectation evaluation error.
    pub fn expectation(expectation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExpectationEvaluation {
            expectation: expectation.into(),
            message: message.into(),
        }
    }

    /// Creates a notification delivery error.
    pub fn notification(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notification {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error should abort the calling pipeline rather
    /// than degrade to a recorded outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
