pub(crate) mod adapters;
pub(crate) mod compilation;
pub(crate) mod context;
pub(crate) mod definition;
pub(crate) mod error;
pub(crate) mod expr;
pub(crate) mod record;
pub(crate) mod rule;
pub(crate) mod ruleset;
pub(crate) mod schema;
pub(crate) mod value;

pub use adapters::{AfterExecute, BindFactory, Binder, BinderBuilder, CollectionAdapter, RulesetAsRuleAdapter};
pub use compilation::{CompilationResult, UnitResult, UnitType};
pub use context::{ContextEntry, ContextMark, RootContext, RuleContext, Snapshot, SnapshotData};
pub use definition::{
    BindingAdapter, DataModelDefinition, EngineDefinition, FieldDefinition, RuleDefinition,
    RuleSetDefinition, RuleTestDefinition,
};
pub use error::{CompileError, ConstructionError, EvaluationError, InstanceError};
pub use expr::{ArithOp, Assignment, CompareOp, Expr};
pub use record::Record;
pub use rule::{Data, Mutator, Predicate, Rule, RuleBuilder, StandardRule};
pub use ruleset::{ExecutionMode, RuleSet, RuleSetBuilder};
pub use schema::{DataModel, FieldType, ModelField, SchemaRegistry};
pub use value::{Value, parse_date};
