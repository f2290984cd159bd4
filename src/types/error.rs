use thiserror::Error;

/// A compile-time failure scoped to a single unit (data model, rule or ruleset).
///
/// Units are compiled in isolation: one failing unit is recorded in the
/// [`CompilationResult`](crate::CompilationResult) and does not stop its
/// siblings from compiling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("syntax error in '{unit}': {message}")]
    Syntax { unit: String, message: String },

    #[error("unresolved field path '{path}' in '{unit}'")]
    UnresolvedPath { unit: String, path: String },

    #[error("type mismatch in '{unit}' at '{fragment}': {message}")]
    TypeMismatch {
        unit: String,
        fragment: String,
        message: String,
    },

    #[error("value '{fragment}' in '{unit}' is not coercible to {expected}")]
    NotCoercible {
        unit: String,
        fragment: String,
        expected: String,
    },

    #[error("unknown type '{type_name}' in '{unit}'")]
    UnknownType { unit: String, type_name: String },

    #[error("unknown data model '{model}' referenced by '{unit}'")]
    UnknownModel { unit: String, model: String },

    #[error("duplicate field '{field}' in data model '{model}'")]
    DuplicateField { model: String, field: String },

    #[error("duplicate data model '{name}'")]
    DuplicateModel { name: String },

    #[error("duplicate ruleset '{name}'")]
    DuplicateRuleSet { name: String },

    #[error("duplicate rule name '{rule}' in ruleset '{ruleset}'")]
    DuplicateRule { ruleset: String, rule: String },

    #[error("unknown ruleset '{reference}' referenced by '{unit}'")]
    UnknownRuleSet { unit: String, reference: String },

    #[error("rule '{unit}' uses the Bind adapter without a binding")]
    MissingBinding { unit: String },

    #[error("invalid binding in '{unit}': {message}")]
    InvalidBinding { unit: String, message: String },

    #[error("unsupported rule type in '{unit}'")]
    UnsupportedRuleType { unit: String },

    #[error("unknown adapter '{adapter}' in '{unit}'")]
    UnknownAdapter { unit: String, adapter: String },

    #[error("cyclic ruleset references: {}", path.join(" -> "))]
    CyclicRuleSets { path: Vec<String> },
}

/// Raised when a rule-shaped value is assembled without a required part.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    #[error("missing delegate for adapter '{adapter}'")]
    MissingDelegate { adapter: String },

    #[error("rule '{rule}' has no condition")]
    MissingCondition { rule: String },

    #[error("binder '{binder}' has no bind factory")]
    MissingFactory { binder: String },

    #[error("duplicate rule name '{rule}' in ruleset '{ruleset}'")]
    DuplicateRule { ruleset: String, rule: String },
}

/// A failure raised while a compiled predicate or mutator runs.
///
/// The engine never recovers these: they abort the enclosing `evaluate` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("null reference while reading '{path}'")]
    NullReference { path: String },

    #[error("expected a collection for '{rule}', found {found}")]
    NotACollection { rule: String, found: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("{0}")]
    Custom(String),
}

/// A JSON document could not be turned into an instance of a data model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value at '{path}': {message}")]
pub struct InstanceError {
    pub path: String,
    pub message: String,
}
