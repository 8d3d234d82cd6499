//! Core data model: run configuration and per-attempt results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Immutable configuration for one evaluation run.
///
/// Values are never mutated after construction; the `with_*` helpers return
/// a new configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationConfig {
    model: String,
    attempts: u32,
    system_prompt: String,
}

impl EvaluationConfig {
    /// Create a configuration, rejecting `attempts == 0`.
    pub fn new(
        model: impl Into<String>,
        attempts: u32,
        system_prompt: impl Into<String>,
    ) -> Result<Self, HarnessError> {
        if attempts == 0 {
            return Err(HarnessError::InvalidAttempts(attempts));
        }
        Ok(Self {
            model: model.into(),
            attempts,
            system_prompt: system_prompt.into(),
        })
    }

    /// Model identifier (e.g. "gpt-4o").
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of attempts per run. Always at least 1.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// System prompt passed to every attempt. May be empty.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Same configuration with a different system prompt.
    pub fn with_system_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: prompt.into(),
            ..self.clone()
        }
    }

    /// One-attempt configuration for `model`, inheriting the system prompt.
    pub fn single_attempt(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            attempts: 1,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

/// Outcome of one attempt of an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt index.
    pub index: u32,
    /// Text rendered by the evaluation report. Empty if rendering failed.
    pub report: String,
    /// Whether the evaluation reported success.
    pub succeeded: bool,
    /// Error that ended the attempt, if any.
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl Attempt {
    /// An attempt that failed without producing any report text.
    pub fn failed(index: u32, error: impl Into<String>) -> Self {
        Self {
            index,
            report: String::new(),
            succeeded: false,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Render the markdown section for this attempt.
    pub fn section(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_section(&mut out);
        out
    }

    pub(crate) fn write_section(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "## Attempt {}", self.index)?;
        writeln!(out)?;
        if !self.report.is_empty() {
            writeln!(out, "{}", self.report)?;
        }
        if let Some(error) = &self.error {
            writeln!(out, "ERROR: {error}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_section(f)
    }
}
