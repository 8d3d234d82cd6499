//! Aggregate reports with text rendering and JSON persistence.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Attempt;
use crate::statistics::{format_success_rate, success_rate};

/// Result of running one evaluation N times against one model.
///
/// Attempts are stored in index order regardless of the order in which
/// they finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    id: Uuid,
    created_at: DateTime<Utc>,
    evaluation: String,
    model: String,
    attempts: Vec<Attempt>,
    success_count: usize,
    duration_ms: u64,
}

impl AggregateReport {
    pub(crate) fn new(
        evaluation: &str,
        model: &str,
        attempts: Vec<Attempt>,
        success_count: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            evaluation: evaluation.to_string(),
            model: model.to_string(),
            attempts,
            success_count,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Name of the evaluation that produced this report.
    pub fn evaluation(&self) -> &str {
        &self.evaluation
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Attempts ordered by index, 1..=N.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.len()
    }

    pub fn success_rate(&self) -> f64 {
        success_rate(self.success_count, self.attempts.len())
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Attempts that ended with an error.
    pub fn failed_attempts(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter().filter(|a| a.is_error())
    }

    /// The closing `SUCCESS RATE: s/N (p%)` line.
    pub fn summary_line(&self) -> String {
        format!(
            "SUCCESS RATE: {}",
            format_success_rate(self.success_count, self.attempts.len())
        )
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse report JSON")
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Model: {}", self.model)?;
        writeln!(f)?;
        writeln!(f, "## All Attempts")?;
        writeln!(f)?;
        for attempt in &self.attempts {
            attempt.write_section(f)?;
        }
        writeln!(f, "## Final Report")?;
        writeln!(f)?;
        writeln!(f, "{}", self.summary_line())
    }
}

/// Outcome of the single-attempt run for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutcome {
    pub model: String,
    pub result: Result<AggregateReport, String>,
}

impl ModelOutcome {
    pub fn new(model: impl Into<String>, result: Result<AggregateReport, String>) -> Self {
        Self {
            model: model.into(),
            result,
        }
    }

    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }
}

impl fmt::Display for ModelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(report) => fmt::Display::fmt(report, f),
            Err(message) => write!(f, "ERROR: {message}"),
        }
    }
}

/// One outcome per known model, in known-model order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFanOutResult {
    pub evaluation: String,
    pub outcomes: Vec<ModelOutcome>,
}

impl ModelFanOutResult {
    /// Rendered outcome per model: the full report, or `ERROR: <message>`.
    pub fn reports(&self) -> Vec<String> {
        self.outcomes.iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Model / success rate / status table for console output.
    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table.set_header(vec!["Model", "Success Rate", "Status"]);

        for outcome in &self.outcomes {
            let (rate, status) = match &outcome.result {
                Ok(report) => (
                    format_success_rate(report.success_count(), report.total_attempts()),
                    match report.failed_attempts().next() {
                        Some(attempt) => format!(
                            "attempt error: {}",
                            attempt.error.as_deref().unwrap_or_default()
                        ),
                        None => "ok".to_string(),
                    },
                ),
                Err(message) => ("-".to_string(), format!("ERROR: {message}")),
            };
            table.add_row(vec![Cell::new(&outcome.model), Cell::new(rate), Cell::new(status)]);
        }

        table
    }
}
