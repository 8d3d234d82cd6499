//! Per-attempt run context handed to evaluation functions.

use tokio_util::sync::CancellationToken;

use crate::model::EvaluationConfig;

/// Immutable context for a single attempt.
///
/// Each attempt owns its own context; nothing in here is shared with sibling
/// attempts except the cancellation signal, which only ever flows downward.
#[derive(Debug, Clone)]
pub struct RunContext {
    attempt: u32,
    model: String,
    system_prompt: String,
    cancel: CancellationToken,
}

impl RunContext {
    /// Build the context for the 1-based `attempt` of `config`.
    pub fn new(attempt: u32, config: &EvaluationConfig, cancel: CancellationToken) -> Self {
        Self {
            attempt,
            model: config.model().to_string(),
            system_prompt: config.system_prompt().to_string(),
            cancel,
        }
    }

    /// 1-based attempt index.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Model identifier under evaluation.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// System prompt for this run. May be empty.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Cancellation signal for this attempt.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
