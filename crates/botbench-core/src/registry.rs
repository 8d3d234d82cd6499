//! Immutable name → evaluation mapping.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::HarnessError;
use crate::traits::Evaluation;

/// Registry of evaluations, fixed once built.
///
/// Lookups are read-only, so a registry can be shared across any number of
/// concurrent runs behind an `Arc`.
pub struct EvalRegistry {
    evals: HashMap<String, Arc<dyn Evaluation>>,
    sorted_names: OnceLock<Vec<String>>,
}

impl EvalRegistry {
    /// Start an empty [`RegistryBuilder`].
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Resolve `name` to its evaluation.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Evaluation>, HarnessError> {
        self.evals
            .get(name)
            .cloned()
            .ok_or_else(|| HarnessError::UnknownEvaluation(name.to_string()))
    }

    /// All registered names, sorted. Computed on first use.
    pub fn names(&self) -> &[String] {
        self.sorted_names.get_or_init(|| {
            let mut names: Vec<String> = self.evals.keys().cloned().collect();
            names.sort();
            names
        })
    }

    /// Whether an evaluation is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.evals.contains_key(name)
    }

    /// Number of registered evaluations.
    pub fn len(&self) -> usize {
        self.evals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evals.is_empty()
    }
}

impl fmt::Debug for EvalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Collects evaluations before freezing them into an [`EvalRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    evals: HashMap<String, Arc<dyn Evaluation>>,
}

impl RegistryBuilder {
    /// Register `eval` under `name`. A later registration replaces an earlier one.
    pub fn register(self, name: impl Into<String>, eval: impl Evaluation + 'static) -> Self {
        self.register_arc(name, Arc::new(eval))
    }

    /// Register an already shared evaluation. Logs a warning when `name`
    /// was registered before.
    pub fn register_arc(mut self, name: impl Into<String>, eval: Arc<dyn Evaluation>) -> Self {
        let name = name.into();
        if self.evals.insert(name.clone(), eval).is_some() {
            tracing::warn!("evaluation '{name}' registered twice, keeping the last one");
        }
        self
    }

    /// Freeze the collected evaluations.
    pub fn build(self) -> EvalRegistry {
        EvalRegistry {
            evals: self.evals,
            sorted_names: OnceLock::new(),
        }
    }
}
