//! Single-attempt runner.
//!
//! Runs one attempt of an evaluation and turns whatever happens into an
//! [`Attempt`]. Failures never escape this function.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::context::RunContext;
use crate::error::HarnessError;
use crate::model::Attempt;
use crate::telemetry::{SpanGuard, Telemetry};
use crate::traits::{EvalReport, Evaluation};

/// Run one attempt of `eval` under `ctx`.
///
/// Render failures skip the success check. The evaluation runs inside the
/// attempt span, which is ended on every path carrying the error if there
/// was one.
pub async fn run_attempt(
    eval: Arc<dyn Evaluation>,
    ctx: RunContext,
    telemetry: Arc<dyn Telemetry>,
) -> Attempt {
    let index = ctx.attempt();
    let start = Instant::now();
    let mut span = SpanGuard::begin(telemetry.as_ref(), &format!("attempt {index}"));
    let tracing_span = span.tracing_span();

    let cancel = ctx.cancellation().clone();
    let (text, outcome) = async move {
        let report = eval.evaluate(ctx);
        drive(report.as_ref(), &cancel).await
    }
    .instrument(tracing_span.clone())
    .await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(succeeded) => Attempt {
            index,
            report: text,
            succeeded,
            error: None,
            duration_ms,
        },
        Err(err) => {
            let message = format!("{err:#}");
            tracing_span.in_scope(|| {
                tracing::warn!(attempt = index, "attempt failed: {message}");
            });
            span.record_error(&message);
            Attempt {
                index,
                report: text,
                succeeded: false,
                error: Some(message),
                duration_ms,
            }
        }
    }
}

async fn drive(
    report: &dyn EvalReport,
    cancel: &CancellationToken,
) -> (String, anyhow::Result<bool>) {
    let text = match until_cancelled(cancel, report.render()).await {
        Ok(text) => text,
        Err(err) => return (String::new(), Err(err)),
    };
    let succeeded = until_cancelled(cancel, report.succeeded()).await;
    (text, succeeded)
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HarnessError::Cancelled.into()),
        result = fut => result,
    }
}
