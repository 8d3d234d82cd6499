//! botbench-core — Concurrent evaluation orchestrator.
//!
//! Runs a named evaluation several times in parallel against one model, or
//! once against every known model, and folds the outcomes into ordered
//! reports with a success rate.

pub mod context;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod report;
pub mod runner;
pub mod statistics;
pub mod telemetry;
pub mod traits;

pub use context::RunContext;
pub use engine::{Harness, KNOWN_MODELS};
pub use error::HarnessError;
pub use model::{Attempt, EvaluationConfig};
pub use registry::EvalRegistry;
pub use report::{AggregateReport, ModelFanOutResult, ModelOutcome};
pub use traits::{EvalReport, Evaluation};
