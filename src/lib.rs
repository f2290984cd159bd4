//! A schema-typed business rule engine.
//!
//! Rules are declared in a JSON configuration: data models, then rulesets of
//! rules whose conditions and actions are small expressions over the model's
//! fields. [`Engine::compile`] type-checks everything in three passes and
//! links rulesets (including nested ones) into a graph that evaluates data
//! in place and records an audit trail in a [`RootContext`].
//!
//! ```
//! use rulegraph::{Engine, Value};
//! use serde_json::json;
//!
//! let engine = Engine::from_json(r#"{
//!     "dataModels": [{ "name": "Customer", "fields": [
//!         { "name": "TotalSpend", "type": "decimal" },
//!         { "name": "IsHighValue", "type": "bool" }
//!     ]}],
//!     "ruleSets": [{
//!         "name": "CustomerEvaluation",
//!         "dataType": "Customer",
//!         "rules": [{
//!             "type": "StandardRule",
//!             "ruleName": "EvaluateSpend",
//!             "conditions": "TotalSpend > 1000",
//!             "onSuccess": "IsHighValue = true",
//!             "onFailure": "IsHighValue = false"
//!         }]
//!     }]
//! }"#).unwrap();
//!
//! let mut customer = engine
//!     .instance_from_json("Customer", &json!({ "TotalSpend": 1200 }))
//!     .unwrap();
//! let evaluation = engine.evaluate("CustomerEvaluation", &mut customer).unwrap();
//! assert!(evaluation.passed);
//! assert_eq!(customer.get("IsHighValue"), Some(&Value::Bool(true)));
//! ```
//!
//! The generic core ([`Rule`], [`RuleSet`] and the adapters) also works
//! directly over native Rust types.

mod compile;
mod engine;
mod error;
mod evaluate;
pub mod parse;
mod types;

pub use compile::{compile_actions, compile_condition};
pub use engine::{Engine, Evaluation, TestOutcome, TestReport};
pub use error::RulegraphError;
pub use types::{
    AfterExecute, ArithOp, Assignment, BindFactory, Binder, BinderBuilder, BindingAdapter,
    CollectionAdapter, CompareOp, CompilationResult, CompileError, ConstructionError,
    ContextEntry, ContextMark, Data, DataModel, DataModelDefinition, EngineDefinition,
    EvaluationError, ExecutionMode, Expr, FieldDefinition, FieldType, InstanceError, ModelField,
    Mutator, Predicate, Record, RootContext, Rule, RuleBuilder, RuleContext, RuleDefinition,
    RuleSet, RuleSetBuilder, RuleSetDefinition, RuleTestDefinition, RulesetAsRuleAdapter,
    SchemaRegistry, Snapshot, SnapshotData, StandardRule, UnitResult, UnitType, Value, parse_date,
};
