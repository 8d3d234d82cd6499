//! Evaluation backend error types.

use thiserror::Error;

/// Errors raised by evaluation backends.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// An evaluation was configured without a command to run.
    #[error("evaluation command is empty")]
    EmptyCommand,

    /// The evaluation command could not be started.
    #[error("failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    /// The evaluation command did not finish in time.
    #[error("evaluation timed out after {0}s")]
    Timeout(u64),
}
