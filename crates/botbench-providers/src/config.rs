//! Harness configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use botbench_core::{EvalRegistry, EvaluationConfig, Harness, HarnessError, KNOWN_MODELS};

use crate::process::{ProcessEvalConfig, ProcessEvaluation};

/// Top-level botbench configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotbenchConfig {
    /// Model evaluated by single-model runs.
    #[serde(default)]
    pub model: String,
    /// Attempts per single-model run.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// System prompt passed to every attempt.
    #[serde(default)]
    pub system_prompt: String,
    /// Models covered by all-model runs, in report order.
    #[serde(default = "default_known_models")]
    pub known_models: Vec<String>,
    /// Process-backed evaluations keyed by name.
    #[serde(default)]
    pub evaluations: HashMap<String, ProcessEvalConfig>,
}

fn default_attempts() -> u32 {
    2
}
fn default_known_models() -> Vec<String> {
    KNOWN_MODELS.iter().map(|m| m.to_string()).collect()
}

impl Default for BotbenchConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            attempts: default_attempts(),
            system_prompt: String::new(),
            known_models: default_known_models(),
            evaluations: HashMap::new(),
        }
    }
}

impl BotbenchConfig {
    /// The run configuration described by this file.
    pub fn evaluation_config(&self) -> Result<EvaluationConfig, HarnessError> {
        EvaluationConfig::new(&self.model, self.attempts, &self.system_prompt)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Only `[A-Za-z_][A-Za-z0-9_]*` names are substituted; anything else, such
/// as the shell default `${VAR:-fallback}`, is left for the command to
/// expand. Substituted values are not scanned again. `$${` produces a
/// literal `${`.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("$${") {
            result.push_str("${");
            rest = after;
            continue;
        }
        if let Some((name, after)) = tail
            .strip_prefix("${")
            .and_then(|body| body.split_once('}'))
            .filter(|(name, _)| is_env_var_name(name))
        {
            result.push_str(&std::env::var(name).unwrap_or_default());
            rest = after;
            continue;
        }
        result.push('$');
        rest = &tail[1..];
    }
    result.push_str(rest);
    result
}

fn is_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Resolve env vars in an evaluation's command, env and working directory.
fn resolve_eval_config(config: &ProcessEvalConfig) -> ProcessEvalConfig {
    ProcessEvalConfig {
        command: config.command.iter().map(|c| resolve_env_vars(c)).collect(),
        env: config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), resolve_env_vars(v)))
            .collect(),
        working_dir: config
            .working_dir
            .as_ref()
            .map(|d| PathBuf::from(resolve_env_vars(&d.to_string_lossy()))),
        ..config.clone()
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `botbench.toml` in the current directory
/// 2. `~/.config/botbench/config.toml`
///
/// Environment variable overrides: `BOTBENCH_MODEL`, `BOTBENCH_ATTEMPTS`,
/// `BOTBENCH_SYSTEM_PROMPT`.
pub fn load_config() -> Result<BotbenchConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<BotbenchConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("botbench.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<BotbenchConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => BotbenchConfig::default(),
    };

    apply_env_overrides(&mut config)?;

    config.evaluations = config
        .evaluations
        .iter()
        .map(|(name, eval)| (name.clone(), resolve_eval_config(eval)))
        .collect();

    Ok(config)
}

fn apply_env_overrides(config: &mut BotbenchConfig) -> Result<()> {
    if let Ok(model) = std::env::var("BOTBENCH_MODEL") {
        config.model = model;
    }
    if let Ok(attempts) = std::env::var("BOTBENCH_ATTEMPTS") {
        config.attempts = attempts
            .trim()
            .parse()
            .with_context(|| format!("invalid BOTBENCH_ATTEMPTS: '{attempts}'"))?;
    }
    if let Ok(prompt) = std::env::var("BOTBENCH_SYSTEM_PROMPT") {
        config.system_prompt = prompt;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("botbench"))
}

/// Build the evaluation registry described by `config`.
pub fn build_registry(config: &BotbenchConfig) -> Result<EvalRegistry> {
    let mut builder = EvalRegistry::builder();
    for (name, eval_config) in &config.evaluations {
        let eval = ProcessEvaluation::new(eval_config.clone())
            .with_context(|| format!("invalid evaluation '{name}'"))?;
        builder = builder.register(name.clone(), eval);
    }
    Ok(builder.build())
}

/// Build a harness with the registry, run configuration and known models
/// from `config`.
pub fn build_harness(config: &BotbenchConfig) -> Result<Harness> {
    anyhow::ensure!(
        !config.known_models.is_empty(),
        "known_models must list at least one model"
    );
    let registry = build_registry(config)?;
    let evaluation_config = config.evaluation_config()?;
    Ok(Harness::new(registry, evaluation_config).with_known_models(config.known_models.clone()))
}
