//! The evaluation contract consumed by the harness.
//!
//! An [`Evaluation`] is an opaque, possibly slow, possibly failing function
//! that turns a [`RunContext`] into an [`EvalReport`]. The harness never
//! looks inside; it only renders the report and asks whether it succeeded.

use async_trait::async_trait;

use crate::context::RunContext;

/// Report handle produced by one evaluation attempt.
#[async_trait]
pub trait EvalReport: Send + Sync {
    /// Render the narrative text for this attempt.
    async fn render(&self) -> anyhow::Result<String>;

    /// Whether the attempt completed its task.
    async fn succeeded(&self) -> anyhow::Result<bool>;
}

/// A named evaluation function.
pub trait Evaluation: Send + Sync {
    /// Start an attempt for `ctx` and hand back its report.
    fn evaluate(&self, ctx: RunContext) -> Box<dyn EvalReport>;
}

impl<F> Evaluation for F
where
    F: Fn(RunContext) -> Box<dyn EvalReport> + Send + Sync,
{
    fn evaluate(&self, ctx: RunContext) -> Box<dyn EvalReport> {
        self(ctx)
    }
}
