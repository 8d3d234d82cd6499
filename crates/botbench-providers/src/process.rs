//! Process-backed evaluation.
//!
//! Hands each attempt to an external command. The command learns which
//! attempt it is running through environment variables, its stdout becomes
//! the attempt's report, and its exit status decides success.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::OnceCell;

use botbench_core::{EvalReport, Evaluation, RunContext};

use crate::error::ProviderError;

/// Environment variable carrying the model identifier.
pub const ENV_MODEL: &str = "BOTBENCH_MODEL";
/// Environment variable carrying the 1-based attempt index.
pub const ENV_ATTEMPT: &str = "BOTBENCH_ATTEMPT";
/// Environment variable carrying the system prompt.
pub const ENV_SYSTEM_PROMPT: &str = "BOTBENCH_SYSTEM_PROMPT";

/// Configuration for one process-backed evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEvalConfig {
    /// Program and arguments.
    pub command: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the command.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// If set, stdout must contain this text for the attempt to succeed.
    #[serde(default)]
    pub success_marker: Option<String>,
    /// Timeout per attempt in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl ProcessEvalConfig {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
            working_dir: None,
            success_marker: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// An evaluation that runs an external command per attempt.
#[derive(Debug, Clone)]
pub struct ProcessEvaluation {
    config: Arc<ProcessEvalConfig>,
}

impl ProcessEvaluation {
    pub fn new(config: ProcessEvalConfig) -> Result<Self, ProviderError> {
        if config.command.is_empty() {
            return Err(ProviderError::EmptyCommand);
        }
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ProcessEvalConfig {
        &self.config
    }
}

impl Evaluation for ProcessEvaluation {
    fn evaluate(&self, ctx: RunContext) -> Box<dyn EvalReport> {
        Box::new(ProcessReport {
            config: Arc::clone(&self.config),
            ctx,
            output: OnceCell::new(),
        })
    }
}

/// Captured result of one command run.
#[derive(Debug)]
struct ProcessOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

/// Report for a single attempt. The command runs on first use and its
/// output is shared by `render` and `succeeded`.
struct ProcessReport {
    config: Arc<ProcessEvalConfig>,
    ctx: RunContext,
    output: OnceCell<ProcessOutput>,
}

impl ProcessReport {
    async fn output(&self) -> Result<&ProcessOutput> {
        self.output
            .get_or_try_init(|| run_command(&self.config, &self.ctx))
            .await
    }
}

#[async_trait]
impl EvalReport for ProcessReport {
    async fn render(&self) -> Result<String> {
        let output = self.output().await?;
        let mut text = output.stdout.trim_end().to_string();
        let stderr = output.stderr.trim_end();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str("stderr:\n");
            text.push_str(stderr);
        }
        Ok(text)
    }

    async fn succeeded(&self) -> Result<bool> {
        let output = self.output().await?;
        let marker_found = match &self.config.success_marker {
            Some(marker) => output.stdout.contains(marker.as_str()),
            None => true,
        };
        Ok(output.success && marker_found)
    }
}

async fn run_command(config: &ProcessEvalConfig, ctx: &RunContext) -> Result<ProcessOutput> {
    let (program, args) = config
        .command
        .split_first()
        .ok_or(ProviderError::EmptyCommand)?;
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .env(ENV_MODEL, ctx.model())
        .env(ENV_ATTEMPT, ctx.attempt().to_string())
        .env(ENV_SYSTEM_PROMPT, ctx.system_prompt())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, val) in &config.env {
        cmd.env(key, val);
    }
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    let result = tokio::time::timeout(Duration::from_secs(config.timeout_secs), cmd.output())
        .await
        .map_err(|_| ProviderError::Timeout(config.timeout_secs))?
        .map_err(|e| ProviderError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;

    tracing::debug!(
        program = %program,
        attempt = ctx.attempt(),
        status = %result.status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "evaluation command finished"
    );

    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        success: result.status.success(),
    })
}
