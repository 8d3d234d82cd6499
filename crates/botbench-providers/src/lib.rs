//! botbench-providers — Evaluation backends and configuration.
//!
//! Supplies concrete [`Evaluation`](botbench_core::Evaluation)
//! implementations: a process-backed adapter that hands each attempt to an
//! external command, and a scripted evaluation for tests. Also loads the
//! `botbench.toml` configuration and assembles a ready-to-use harness.

pub mod config;
pub mod error;
pub mod mock;
pub mod process;

pub use config::{build_harness, build_registry, load_config, load_config_from, BotbenchConfig};
pub use error::ProviderError;
pub use mock::{Outcome, ScriptedEvaluation};
pub use process::{ProcessEvalConfig, ProcessEvaluation};
