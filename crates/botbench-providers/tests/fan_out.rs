//! End-to-end fan-out tests driving the harness with scripted and
//! process-backed evaluations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use botbench_core::telemetry::RecordingTelemetry;
use botbench_core::{
    EvalRegistry, EvalReport, EvaluationConfig, Harness, HarnessError, RunContext, KNOWN_MODELS,
};
use botbench_providers::{
    build_harness, BotbenchConfig, Outcome, ProcessEvalConfig, ScriptedEvaluation,
};

fn harness_with(name: &str, eval: ScriptedEvaluation, attempts: u32) -> Harness {
    let registry = EvalRegistry::builder().register(name, eval).build();
    let config = EvaluationConfig::new("gpt-4o", attempts, "").unwrap();
    Harness::new(registry, config)
}

fn section_positions(text: &str, attempts: u32) -> Vec<usize> {
    (1..=attempts)
        .map(|i| {
            text.find(&format!("## Attempt {i}\n"))
                .unwrap_or_else(|| panic!("missing section for attempt {i}"))
        })
        .collect()
}

// --- Attempt fan-out ---

#[tokio::test(start_paused = true)]
async fn attempts_ordered_by_index_when_later_ones_finish_first() {
    let attempts = 5;
    let mut eval = ScriptedEvaluation::passing();
    for i in 1..=attempts {
        // Attempt 1 is the slowest, attempt 5 the fastest.
        eval = eval.with_delay(i, Duration::from_millis(u64::from(attempts - i + 1) * 100));
    }
    let harness = harness_with("SingleState", eval, attempts);

    let report = harness.evaluate("SingleState").await.unwrap();

    let indexes: Vec<u32> = report.attempts().iter().map(|a| a.index).collect();
    assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
    let positions = section_positions(&report.to_string(), attempts);
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn attempts_run_concurrently() {
    let mut eval = ScriptedEvaluation::passing();
    for i in 1..=4 {
        eval = eval.with_delay(i, Duration::from_secs(10));
    }
    let harness = harness_with("SingleState", eval, 4);

    let start = tokio::time::Instant::now();
    harness.evaluate("SingleState").await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(20));
}

#[tokio::test]
async fn three_passing_attempts() {
    let harness = harness_with("SingleState", ScriptedEvaluation::passing(), 3);

    let text = harness.evaluate("SingleState").await.unwrap().to_string();

    assert_eq!(text.matches("## Attempt ").count(), 3);
    assert!(text.contains("SUCCESS RATE: 3/3 (100%)"));
}

#[tokio::test]
async fn render_failure_on_attempt_two() {
    let eval = ScriptedEvaluation::passing()
        .with_outcome(2, Outcome::RenderError("transcript unavailable".into()));
    let handle = eval.clone();
    let harness = harness_with("SingleState", eval, 3);

    let report = harness.evaluate("SingleState").await.unwrap();
    let text = report.to_string();

    assert_eq!(text.matches("## Attempt ").count(), 3);
    assert!(text.contains("## Attempt 2\n\nERROR: transcript unavailable\n"));
    assert!(text.contains("SUCCESS RATE: 2/3 (67%)"));
    assert_eq!(report.attempts()[0].report, "gpt-4o completed attempt 1");
    assert_eq!(report.attempts()[2].report, "gpt-4o completed attempt 3");
    // The failed attempt never reached its success check.
    assert_eq!(handle.check_count(), 2);
}

#[tokio::test]
async fn success_check_errors_count_as_failures() {
    let eval = ScriptedEvaluation::always(Outcome::Fail)
        .with_outcome(1, Outcome::Pass)
        .with_outcome(4, Outcome::CheckError("grader crashed".into()));
    let harness = harness_with("SingleState", eval, 4);

    let report = harness.evaluate("SingleState").await.unwrap();

    assert_eq!(report.success_count(), 1);
    assert_eq!(report.success_rate(), 0.25);
    assert_eq!(report.attempts()[3].error.as_deref(), Some("grader crashed"));
    assert!(report.attempts()[3].section().contains("completed attempt 4"));
}

#[tokio::test]
async fn unknown_evaluation_starts_nothing() {
    let eval = ScriptedEvaluation::passing();
    let handle = eval.clone();
    let telemetry = RecordingTelemetry::new();
    let harness =
        harness_with("SingleState", eval, 3).with_telemetry(Arc::new(telemetry.clone()));

    let err = harness.evaluate("not-a-real-name").await.unwrap_err();

    assert_eq!(err, HarnessError::UnknownEvaluation("not-a-real-name".into()));
    assert_eq!(handle.call_count(), 0);
    assert!(telemetry.events().is_empty());
}

#[tokio::test]
async fn every_attempt_sees_its_own_context() {
    let eval = ScriptedEvaluation::passing();
    let handle = eval.clone();
    let harness = harness_with("SingleState", eval, 4).with_system_prompt("Plan first.");

    harness.evaluate("SingleState").await.unwrap();

    let mut seen: Vec<u32> = handle.contexts().iter().map(|c| c.attempt()).collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4]);
    assert!(handle
        .contexts()
        .iter()
        .all(|c| c.model() == "gpt-4o" && c.system_prompt() == "Plan first."));
}

#[tokio::test(start_paused = true)]
async fn cancellation_fails_in_flight_attempts() {
    let eval = ScriptedEvaluation::passing()
        .with_delay(1, Duration::from_secs(3600))
        .with_delay(2, Duration::from_secs(3600));
    let harness = harness_with("SingleState", eval, 2);
    let cancel = harness.cancellation_token().clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });
    let report = harness.evaluate("SingleState").await.unwrap();

    assert_eq!(report.success_count(), 0);
    assert!(report
        .attempts()
        .iter()
        .all(|a| a.error.as_deref() == Some("attempt cancelled")));
}

// --- Model fan-out ---

/// Slower for models earlier in the known list; fails on one model.
struct ByModel {
    model: String,
}

#[async_trait]
impl EvalReport for ByModel {
    async fn render(&self) -> anyhow::Result<String> {
        let position = KNOWN_MODELS
            .iter()
            .position(|m| *m == self.model)
            .unwrap_or(0);
        let delay = (KNOWN_MODELS.len() - position) as u64 * 100;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if self.model == "gemini-2.0-flash" {
            anyhow::bail!("provider returned 503");
        }
        Ok(format!("{} solved it", self.model))
    }

    async fn succeeded(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn model_outcomes_follow_known_model_order() {
    let registry = EvalRegistry::builder()
        .register("SingleState", |ctx: RunContext| -> Box<dyn EvalReport> {
            Box::new(ByModel {
                model: ctx.model().to_string(),
            })
        })
        .build();
    let config = EvaluationConfig::new("", 3, "inherited prompt").unwrap();
    let telemetry = RecordingTelemetry::new();
    let harness = Harness::new(registry, config).with_telemetry(Arc::new(telemetry.clone()));

    let result = harness.evaluate_all_models_once("SingleState").await;

    assert_eq!(result.len(), KNOWN_MODELS.len());
    let models: Vec<&str> = result.outcomes.iter().map(|o| o.model.as_str()).collect();
    assert_eq!(models, KNOWN_MODELS);

    let reports = result.reports();
    for (model, report) in KNOWN_MODELS.iter().zip(&reports) {
        assert!(report.starts_with(&format!("# Model: {model}\n")));
        if *model == "gemini-2.0-flash" {
            assert!(report.contains("ERROR: provider returned 503"));
            assert!(report.contains("SUCCESS RATE: 0/1 (0%)"));
        } else {
            assert!(report.contains("SUCCESS RATE: 1/1 (100%)"));
        }
    }

    let model_spans: Vec<String> = telemetry
        .ended()
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| name.starts_with("model: "))
        .collect();
    assert_eq!(model_spans.len(), KNOWN_MODELS.len());
}

#[tokio::test]
async fn model_fan_out_inherits_system_prompt() {
    let eval = ScriptedEvaluation::passing();
    let handle = eval.clone();
    let harness = harness_with("SingleState", eval, 3)
        .with_system_prompt("Be decisive.")
        .with_known_models(["model-a", "model-b"]);

    let result = harness.evaluate_all_models_once("SingleState").await;

    assert_eq!(result.len(), 2);
    assert_eq!(handle.call_count(), 2);
    let contexts = handle.contexts();
    assert!(contexts
        .iter()
        .all(|c| c.attempt() == 1 && c.system_prompt() == "Be decisive."));
}

#[tokio::test]
async fn model_fan_out_with_unknown_evaluation() {
    let harness = harness_with("SingleState", ScriptedEvaluation::passing(), 1);

    let result = harness.evaluate_all_models_once("Nope").await;

    assert_eq!(
        result.reports(),
        vec!["ERROR: unknown evaluation: Nope"; KNOWN_MODELS.len()]
    );
}

// --- Process-backed evaluations from config ---

#[tokio::test]
async fn process_evaluations_from_config() {
    let mut config = BotbenchConfig {
        model: "gpt-4o".into(),
        attempts: 3,
        ..BotbenchConfig::default()
    };
    let mut eval = ProcessEvalConfig::new([
        "sh",
        "-c",
        "echo \"attempt $BOTBENCH_ATTEMPT on $BOTBENCH_MODEL\"; \
         if [ \"$BOTBENCH_ATTEMPT\" = 2 ]; then exit 1; fi; echo PASS",
    ]);
    eval.success_marker = Some("PASS".into());
    config.evaluations.insert("ShellEval".into(), eval);

    let harness = build_harness(&config).unwrap();
    assert_eq!(harness.eval_names(), &["ShellEval"]);

    let report = harness.evaluate("ShellEval").await.unwrap();

    assert_eq!(report.success_count(), 2);
    assert_eq!(report.attempts()[1].report, "attempt 2 on gpt-4o");
    assert!(!report.attempts()[1].succeeded);
    assert!(report.to_string().contains("SUCCESS RATE: 2/3 (67%)"));
}
