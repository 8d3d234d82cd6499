//! Harness error types.
//!
//! Only configuration problems surface as errors from the coordinators.
//! Everything that goes wrong inside an attempt or a model run is captured
//! as data in the corresponding report.

use thiserror::Error;

/// Errors returned by the evaluation harness.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// No evaluation is registered under the requested name.
    #[error("unknown evaluation: {0}")]
    UnknownEvaluation(String),

    /// An evaluation must run at least once.
    #[error("attempts must be at least 1, got {0}")]
    InvalidAttempts(u32),

    /// The run was cancelled before the attempt finished.
    #[error("attempt cancelled")]
    Cancelled,
}

impl HarnessError {
    /// Returns `true` for errors caused by the caller's configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarnessError::UnknownEvaluation(_) | HarnessError::InvalidAttempts(_)
        )
    }
}
