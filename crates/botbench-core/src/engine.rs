//! Evaluation harness: attempt fan-out and model fan-out.
//!
//! Both fan-outs launch every unit at once on the runtime, join on all of
//! them, and place each result in the slot reserved for its logical
//! position. Completion order never leaks into the output.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::context::RunContext;
use crate::error::HarnessError;
use crate::model::{Attempt, EvaluationConfig};
use crate::registry::EvalRegistry;
use crate::report::{AggregateReport, ModelFanOutResult, ModelOutcome};
use crate::runner::run_attempt;
use crate::telemetry::{SpanGuard, Telemetry, TracingTelemetry};

/// Models covered by [`Harness::evaluate_all_models_once`] unless overridden.
pub const KNOWN_MODELS: [&str; 4] = [
    "gpt-4o",
    "gemini-2.0-flash",
    "claude-3-5-sonnet-latest",
    "claude-3-7-sonnet-latest",
];

/// The evaluation harness.
///
/// Cheap to clone; the registry and telemetry are shared. Configuration
/// changes return a new harness and leave the original untouched.
#[derive(Clone)]
pub struct Harness {
    registry: Arc<EvalRegistry>,
    telemetry: Arc<dyn Telemetry>,
    known_models: Arc<[String]>,
    config: EvaluationConfig,
    cancel: CancellationToken,
}

impl Harness {
    /// A harness over `registry` running with `config`, reporting spans
    /// through [`TracingTelemetry`] and fanning out over [`KNOWN_MODELS`].
    pub fn new(registry: EvalRegistry, config: EvaluationConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            telemetry: Arc::new(TracingTelemetry),
            known_models: KNOWN_MODELS.iter().map(|m| m.to_string()).collect(),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the span collaborator.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Models covered by [`Harness::evaluate_all_models_once`], in report
    /// order.
    pub fn with_known_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a cancellation signal. Cancelling it fails every in-flight
    /// attempt with [`HarnessError::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A harness running with `config` instead of the current configuration.
    pub fn with_config(&self, config: EvaluationConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    /// Set the system prompt for future evaluations.
    pub fn with_system_prompt(&self, prompt: impl Into<String>) -> Self {
        self.with_config(self.config.with_system_prompt(prompt))
    }

    /// The current run configuration.
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn known_models(&self) -> &[String] {
        &self.known_models
    }

    /// Token that cancels this harness's in-flight attempts.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The evaluations that can be run, sorted by name.
    pub fn eval_names(&self) -> &[String] {
        self.registry.names()
    }

    /// Sleep for `seconds`. Use between runs when a provider is rate limiting.
    pub async fn backoff(self, seconds: u64) -> Self {
        tracing::info!("backing off for {seconds}s");
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        self
    }

    /// Run evaluation `name` once per configured attempt, all concurrently.
    ///
    /// Fails only if `name` is not registered; nothing is launched in that
    /// case. Attempt failures are recorded in the report.
    pub async fn evaluate(&self, name: &str) -> Result<AggregateReport, HarnessError> {
        let eval = self.registry.resolve(name)?;
        let attempts = self.config.attempts();
        if attempts == 0 {
            return Err(HarnessError::InvalidAttempts(attempts));
        }

        let start = Instant::now();
        tracing::info!(
            evaluation = name,
            model = self.config.model(),
            attempts,
            "starting evaluation"
        );

        let successes = Arc::new(AtomicUsize::new(0));
        let mut join_set = JoinSet::new();

        for index in 1..=attempts {
            let eval = Arc::clone(&eval);
            let telemetry = Arc::clone(&self.telemetry);
            let successes = Arc::clone(&successes);
            let ctx = RunContext::new(index, &self.config, self.cancel.child_token());

            join_set.spawn(async move {
                let attempt = match AssertUnwindSafe(run_attempt(eval, ctx, telemetry))
                    .catch_unwind()
                    .await
                {
                    Ok(attempt) => attempt,
                    Err(panic) => {
                        let message = format!("attempt panicked: {}", panic_message(&*panic));
                        tracing::error!(attempt = index, "{message}");
                        Attempt::failed(index, message)
                    }
                };
                if attempt.succeeded {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
                (index, attempt)
            }
            .in_current_span());
        }

        let mut slots: Vec<Option<Attempt>> = vec![None; attempts as usize];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, attempt)) => slots[(index - 1) as usize] = Some(attempt),
                Err(e) => tracing::error!("attempt task failed to join: {e}"),
            }
        }

        let ordered: Vec<Attempt> = slots
            .into_iter()
            .zip(1..)
            .map(|(slot, index)| {
                slot.unwrap_or_else(|| Attempt::failed(index, "attempt did not complete"))
            })
            .collect();
        let success_count = successes.load(Ordering::SeqCst);

        tracing::info!(
            evaluation = name,
            model = self.config.model(),
            "finished evaluation: {success_count}/{attempts} succeeded"
        );

        Ok(AggregateReport::new(
            name,
            self.config.model(),
            ordered,
            success_count,
            start.elapsed(),
        ))
    }

    /// Run evaluation `name` once against every known model, concurrently.
    ///
    /// Always returns one outcome per known model, in list order. A model
    /// whose run fails gets an error outcome; the others are unaffected.
    pub async fn evaluate_all_models_once(&self, name: &str) -> ModelFanOutResult {
        tracing::info!(
            evaluation = name,
            models = self.known_models.len(),
            "evaluating across all known models"
        );

        let mut join_set = JoinSet::new();

        for (position, model) in self.known_models.iter().enumerate() {
            let harness = self.with_config(self.config.single_attempt(model.as_str()));
            let name = name.to_string();
            let model = model.clone();

            join_set.spawn(async move {
                let mut span =
                    SpanGuard::begin(harness.telemetry.as_ref(), &format!("model: {model}"));
                let result = harness
                    .evaluate(&name)
                    .instrument(span.tracing_span())
                    .await
                    .map_err(|e| {
                        span.record_error(&e);
                        e.to_string()
                    });
                drop(span);
                (position, ModelOutcome::new(model, result))
            });
        }

        let mut slots: Vec<Option<ModelOutcome>> = vec![None; self.known_models.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, outcome)) => slots[position] = Some(outcome),
                Err(e) => tracing::error!("model task failed to join: {e}"),
            }
        }

        let outcomes = slots
            .into_iter()
            .zip(self.known_models.iter())
            .map(|(slot, model)| {
                slot.unwrap_or_else(|| {
                    ModelOutcome::new(model.as_str(), Err("model run did not complete".into()))
                })
            })
            .collect();

        ModelFanOutResult {
            evaluation: name.to_string(),
            outcomes,
        }
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("registry", &self.registry)
            .field("known_models", &self.known_models)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
