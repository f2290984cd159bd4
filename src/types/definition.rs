//! Serde model of the configuration document.
//!
//! These types only check the JSON shape. Everything else (types, paths,
//! references) is validated by the compiler, one unit at a time.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ruleset::ExecutionMode;
use crate::error::RulegraphError;

/// The whole configuration: data models plus rulesets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDefinition {
    #[serde(default)]
    pub data_models: Vec<DataModelDefinition>,
    #[serde(default)]
    pub rule_sets: Vec<RuleSetDefinition>,
}

impl EngineDefinition {
    /// # Errors
    ///
    /// Returns [`RulegraphError::Json`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self, RulegraphError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    ///
    /// Returns [`RulegraphError::Io`] if the file cannot be read and
    /// [`RulegraphError::Json`] if it is malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RulegraphError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModelDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetDefinition {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub tests: Vec<RuleTestDefinition>,
}

/// A rule entry inside a ruleset, discriminated by its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuleDefinition {
    #[serde(rename_all = "camelCase")]
    StandardRule {
        rule_name: String,
        #[serde(default)]
        adapters: Vec<String>,
        #[serde(default)]
        binding: Option<BindingAdapter>,
        #[serde(default)]
        conditions: String,
        #[serde(default)]
        on_success: String,
        #[serde(default)]
        on_failure: String,
    },
    #[serde(rename_all = "camelCase")]
    NestedRuleSet {
        rule_name: String,
        #[serde(default)]
        adapters: Vec<String>,
        #[serde(default)]
        binding: Option<BindingAdapter>,
        ruleset_name: String,
        data_type: String,
    },
    /// Any other tag. Reported as an unsupported rule type at compile time.
    #[serde(other)]
    Unsupported,
}

impl RuleDefinition {
    /// The rule's name, or `None` for an unsupported entry.
    #[must_use]
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            RuleDefinition::StandardRule { rule_name, .. }
            | RuleDefinition::NestedRuleSet { rule_name, .. } => Some(rule_name),
            RuleDefinition::Unsupported => None,
        }
    }

    #[must_use]
    pub fn adapters(&self) -> &[String] {
        match self {
            RuleDefinition::StandardRule { adapters, .. }
            | RuleDefinition::NestedRuleSet { adapters, .. } => adapters,
            RuleDefinition::Unsupported => &[],
        }
    }

    #[must_use]
    pub fn binding(&self) -> Option<&BindingAdapter> {
        match self {
            RuleDefinition::StandardRule { binding, .. }
            | RuleDefinition::NestedRuleSet { binding, .. } => binding.as_ref(),
            RuleDefinition::Unsupported => None,
        }
    }
}

/// Type-transforming binding used by the `Bind` adapter.
///
/// `bind_factory` is an expression over `sourceData` producing the target;
/// `after_execute` is a statement list over `sourceData` and `targetData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingAdapter {
    #[serde(default)]
    pub bind_source_type: String,
    #[serde(default)]
    pub bind_target_type: String,
    #[serde(default)]
    pub bind_factory: String,
    #[serde(default)]
    pub after_execute: Option<String>,
}

/// A test case: input data plus a boolean expression checked afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTestDefinition {
    pub data: serde_json::Value,
    pub expect: String,
}
