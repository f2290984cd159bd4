use thiserror::Error;

use crate::parse::ParseError;
use crate::{CompileError, ConstructionError, EvaluationError, InstanceError};

/// Unified error type covering loading, compiling, and evaluating rules.
///
/// Returned by convenience methods like [`Engine::from_json()`](crate::Engine::from_json)
/// and [`Engine::evaluate()`](crate::Engine::evaluate).
#[derive(Debug, Error)]
pub enum RulegraphError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("compilation failed: {}", failed.join("; "))]
    CompilationFailed { failed: Vec<String> },

    #[error("unknown ruleset '{name}'")]
    UnknownRuleSet { name: String },

    #[error("unknown data model '{name}'")]
    UnknownModel { name: String },
}
