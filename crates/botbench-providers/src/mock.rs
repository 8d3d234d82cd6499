//! Scripted evaluation for testing the harness without real model calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use botbench_core::{EvalReport, Evaluation, RunContext};

/// What an attempt does when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Renders and succeeds.
    Pass,
    /// Renders but reports failure.
    Fail,
    /// Rendering fails with the given message.
    RenderError(String),
    /// Rendering works, the success check fails with the given message.
    CheckError(String),
}

/// A mock evaluation whose outcome and latency are scripted per attempt.
///
/// Clones share call counters, so a test can keep a handle after
/// registering the evaluation.
#[derive(Debug, Clone)]
pub struct ScriptedEvaluation {
    default_outcome: Outcome,
    outcomes: HashMap<u32, Outcome>,
    delays: HashMap<u32, Duration>,
    evaluate_calls: Arc<AtomicU32>,
    check_calls: Arc<AtomicU32>,
    contexts: Arc<Mutex<Vec<RunContext>>>,
}

impl ScriptedEvaluation {
    /// Every attempt ends with `outcome`.
    pub fn always(outcome: Outcome) -> Self {
        Self {
            default_outcome: outcome,
            outcomes: HashMap::new(),
            delays: HashMap::new(),
            evaluate_calls: Arc::new(AtomicU32::new(0)),
            check_calls: Arc::new(AtomicU32::new(0)),
            contexts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn passing() -> Self {
        Self::always(Outcome::Pass)
    }

    /// Override the outcome of one attempt.
    pub fn with_outcome(mut self, attempt: u32, outcome: Outcome) -> Self {
        self.outcomes.insert(attempt, outcome);
        self
    }

    /// Delay one attempt's rendering by `delay`.
    pub fn with_delay(mut self, attempt: u32, delay: Duration) -> Self {
        self.delays.insert(attempt, delay);
        self
    }

    /// Number of attempts started.
    pub fn call_count(&self) -> u32 {
        self.evaluate_calls.load(Ordering::SeqCst)
    }

    /// Number of success checks performed.
    pub fn check_count(&self) -> u32 {
        self.check_calls.load(Ordering::SeqCst)
    }

    /// Contexts received, in the order attempts started.
    pub fn contexts(&self) -> Vec<RunContext> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Evaluation for ScriptedEvaluation {
    fn evaluate(&self, ctx: RunContext) -> Box<dyn EvalReport> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ctx.clone());

        let attempt = ctx.attempt();
        Box::new(ScriptedReport {
            outcome: self
                .outcomes
                .get(&attempt)
                .cloned()
                .unwrap_or_else(|| self.default_outcome.clone()),
            delay: self.delays.get(&attempt).copied().unwrap_or_default(),
            check_calls: Arc::clone(&self.check_calls),
            ctx,
        })
    }
}

struct ScriptedReport {
    ctx: RunContext,
    outcome: Outcome,
    delay: Duration,
    check_calls: Arc<AtomicU32>,
}

#[async_trait]
impl EvalReport for ScriptedReport {
    async fn render(&self) -> anyhow::Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Outcome::RenderError(message) = &self.outcome {
            anyhow::bail!("{message}");
        }
        Ok(format!(
            "{} completed attempt {}",
            self.ctx.model(),
            self.ctx.attempt()
        ))
    }

    async fn succeeded(&self) -> anyhow::Result<bool> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Outcome::Pass => Ok(true),
            Outcome::Fail | Outcome::RenderError(_) => Ok(false),
            Outcome::CheckError(message) => anyhow::bail!("{message}"),
        }
    }
}
