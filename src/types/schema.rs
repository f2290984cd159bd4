use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::definition::DataModelDefinition;
use super::error::{CompileError, InstanceError};
use super::record::Record;
use super::value::{Value, parse_date};
use crate::parse::{self, TypeName};

/// The declared type of a data-model field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Date,
    /// A reference to another declared data model.
    Model(String),
    List(Box<FieldType>),
}

impl FieldType {
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float)
    }

    /// Whether a value statically typed as `source` may be stored in a field
    /// of this type without a literal conversion.
    #[must_use]
    pub fn accepts(&self, source: &FieldType) -> bool {
        self == source || (*self == FieldType::Float && *source == FieldType::Int)
    }

    /// Coerce a value to this type.
    ///
    /// Integers widen to floats, strings parse into dates, and `null` is only
    /// accepted by object and list types. Returns `None` if no coercion applies.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (FieldType::Model(_) | FieldType::List(_), Value::Null) => Some(Value::Null),
            (FieldType::String, v @ Value::String(_))
            | (FieldType::Int, v @ Value::Int(_))
            | (FieldType::Float, v @ Value::Float(_))
            | (FieldType::Bool, v @ Value::Bool(_))
            | (FieldType::Date, v @ Value::Date(_)) => Some(v),
            (FieldType::Float, Value::Int(n)) => Some(Value::Float(n as f64)),
            (FieldType::Date, Value::String(s)) => parse_date(&s).map(Value::Date),
            (FieldType::Model(name), Value::Object(record)) if record.model_name() == name => {
                Some(Value::Object(record))
            }
            (FieldType::List(inner), Value::List(items)) => items
                .into_iter()
                .map(|item| inner.coerce(item))
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            _ => None,
        }
    }
}

impl FieldType {
    /// Shallow runtime check: does `value` have this type at the top level?
    /// `null` matches object and list types.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Model(_) | FieldType::List(_), Value::Null)
            | (FieldType::String, Value::String(_))
            | (FieldType::Int, Value::Int(_))
            | (FieldType::Float, Value::Float(_))
            | (FieldType::Bool, Value::Bool(_))
            | (FieldType::Date, Value::Date(_))
            | (FieldType::List(_), Value::List(_)) => true,
            (FieldType::Model(name), Value::Object(record)) => record.model_name() == name,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Date => write!(f, "date"),
            FieldType::Model(name) => write!(f, "{name}"),
            FieldType::List(inner) => write!(f, "List<{inner}>"),
        }
    }
}

/// A compiled field: name plus resolved type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelField {
    name: String,
    field_type: FieldType,
}

impl ModelField {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }
}

/// A compiled data model. Immutable once registered.
#[derive(Debug)]
pub struct DataModel {
    name: String,
    fields: Vec<ModelField>,
    index: HashMap<String, usize>,
}

impl DataModel {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[ModelField] {
        &self.fields
    }

    /// Position of a field within the model, used as its slot in a [`Record`].
    #[must_use]
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    #[must_use]
    pub fn field(&self, field: &str) -> Option<&ModelField> {
        self.index_of(field).map(|idx| &self.fields[idx])
    }
}

/// Holds every compiled [`DataModel`] by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    models: HashMap<String, Arc<DataModel>>,
    order: Vec<String>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a set of model definitions, failing on the first bad one.
    ///
    /// # Errors
    ///
    /// Returns the first [`CompileError`] encountered.
    pub fn from_definitions(defs: &[DataModelDefinition]) -> Result<Self, CompileError> {
        let (registry, outcomes) = Self::compile_models(defs);
        for (_, outcome) in outcomes {
            outcome?;
        }
        Ok(registry)
    }

    /// Compile each definition as an isolated unit. Failed units are left out
    /// of the registry; their errors are returned alongside the unit name.
    pub(crate) fn compile_models(
        defs: &[DataModelDefinition],
    ) -> (Self, Vec<(String, Result<(), CompileError>)>) {
        let mut registry = Self::new();
        let mut outcomes = Vec::with_capacity(defs.len());

        let mut declared = HashSet::new();
        let mut duplicate = vec![false; defs.len()];
        for (i, def) in defs.iter().enumerate() {
            if !declared.insert(def.name.as_str()) {
                duplicate[i] = true;
            }
        }

        for (i, def) in defs.iter().enumerate() {
            let outcome = if duplicate[i] {
                Err(CompileError::DuplicateModel {
                    name: def.name.clone(),
                })
            } else {
                Self::compile_model(def, &declared).map(|model| {
                    debug!(model = %model.name, fields = model.fields.len(), "model registered");
                    registry.order.push(model.name.clone());
                    registry.models.insert(model.name.clone(), Arc::new(model));
                })
            };
            outcomes.push((def.name.clone(), outcome));
        }

        (registry, outcomes)
    }

    fn compile_model(
        def: &DataModelDefinition,
        declared: &HashSet<&str>,
    ) -> Result<DataModel, CompileError> {
        let mut fields = Vec::with_capacity(def.fields.len());
        let mut index = HashMap::with_capacity(def.fields.len());
        for field in &def.fields {
            if index.insert(field.name.clone(), fields.len()).is_some() {
                return Err(CompileError::DuplicateField {
                    model: def.name.clone(),
                    field: field.name.clone(),
                });
            }
            let field_type = resolve_type_name(&field.field_type, declared).ok_or_else(|| {
                CompileError::UnknownType {
                    unit: format!("{}.{}", def.name, field.name),
                    type_name: field.field_type.clone(),
                }
            })?;
            fields.push(ModelField {
                name: field.name.clone(),
                field_type,
            });
        }
        Ok(DataModel {
            name: def.name.clone(),
            fields,
            index,
        })
    }

    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Arc<DataModel>> {
        self.models.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Model names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Resolve a textual type name (`"int"`, `"List<Customer>"`, ...) against
    /// the registered models.
    #[must_use]
    pub fn resolve_type(&self, text: &str) -> Option<FieldType> {
        let declared: HashSet<&str> = self.models.keys().map(String::as_str).collect();
        resolve_type_name(text, &declared)
    }

    /// Deep check that `value` has type `ty` under this registry. Every
    /// record met along the way must be laid out like the registered model
    /// of the same name, since compiled paths address fields by position.
    #[must_use]
    pub fn conforms(&self, ty: &FieldType, value: &Value) -> bool {
        match (ty, value) {
            (FieldType::Model(name), Value::Object(record)) => {
                let Some(model) = self.models.get(name) else {
                    return false;
                };
                let shaped = std::ptr::eq(&**model, record.model())
                    || (record.model_name() == name && record.model().fields() == model.fields());
                shaped
                    && model
                        .fields()
                        .iter()
                        .zip(record.fields())
                        .all(|(field, (_, v))| self.conforms(field.field_type(), v))
            }
            (FieldType::List(inner), Value::List(items)) => {
                items.iter().all(|item| self.conforms(inner, item))
            }
            _ => ty.matches(value),
        }
    }

    /// Synthesize a default-valued instance of a model.
    ///
    /// Strings default to `""`, numbers to `0`, bools to `false`, dates to the
    /// Unix epoch, lists to empty, and nested objects to their own default
    /// instance. A model that contains itself defaults the inner field to `null`.
    #[must_use]
    pub fn default_instance(&self, model: &str) -> Option<Value> {
        self.contains(model)
            .then(|| self.default_value_inner(&FieldType::Model(model.to_owned()), &mut Vec::new()))
    }

    /// The default value of a type under the same coercion table as
    /// [`default_instance`](Self::default_instance).
    #[must_use]
    pub fn default_value(&self, ty: &FieldType) -> Value {
        self.default_value_inner(ty, &mut Vec::new())
    }

    fn default_value_inner(&self, ty: &FieldType, visiting: &mut Vec<String>) -> Value {
        match ty {
            FieldType::String => Value::String(String::new()),
            FieldType::Int => Value::Int(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Date => Value::Date(DateTime::<Utc>::UNIX_EPOCH),
            FieldType::List(_) => Value::List(Vec::new()),
            FieldType::Model(name) => {
                if visiting.contains(name) {
                    return Value::Null;
                }
                let Some(model) = self.models.get(name) else {
                    return Value::Null;
                };
                visiting.push(name.clone());
                let values = model
                    .fields()
                    .iter()
                    .map(|f| self.default_value_inner(f.field_type(), visiting))
                    .collect();
                visiting.pop();
                Value::Object(Record::from_parts(Arc::clone(model), values))
            }
        }
    }

    /// Build an instance of `model` from a JSON document.
    ///
    /// Missing fields take their default value; an explicit `null` on an object
    /// or list field is kept as [`Value::Null`]. Field names match exactly, then
    /// case-insensitively. Unknown JSON keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError`] if the model is unknown or a value has the
    /// wrong shape for its field.
    pub fn instance_from_json(
        &self,
        model: &str,
        json: &serde_json::Value,
    ) -> Result<Value, InstanceError> {
        if !self.contains(model) {
            return Err(InstanceError {
                path: model.to_owned(),
                message: "unknown data model".to_owned(),
            });
        }
        if !json.is_object() {
            return Err(InstanceError {
                path: model.to_owned(),
                message: format!("expected object, found {}", json_kind(json)),
            });
        }
        self.from_json(&FieldType::Model(model.to_owned()), json, model)
    }

    /// Build a value of any resolved type from JSON, under the same rules as
    /// [`instance_from_json`](Self::instance_from_json).
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError`] if a value has the wrong shape for its type.
    pub fn value_from_json(
        &self,
        ty: &FieldType,
        json: &serde_json::Value,
    ) -> Result<Value, InstanceError> {
        self.from_json(ty, json, &ty.to_string())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn from_json(
        &self,
        ty: &FieldType,
        json: &serde_json::Value,
        path: &str,
    ) -> Result<Value, InstanceError> {
        use serde_json::Value as Json;

        let mismatch = || InstanceError {
            path: path.to_owned(),
            message: format!("expected {ty}, found {}", json_kind(json)),
        };

        match (ty, json) {
            (FieldType::Model(_) | FieldType::List(_), Json::Null) => Ok(Value::Null),
            (_, Json::Null) => Ok(self.default_value(ty)),
            (FieldType::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
            (FieldType::Int, Json::Number(n)) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Value::Int(i)),
                (None, Some(f)) if f.fract() == 0.0 => {
                    // i64::MAX as f64 rounds up to 2^63, which is already out of range
                    if (i64::MIN as f64..i64::MAX as f64).contains(&f) {
                        Ok(Value::Int(f as i64))
                    } else {
                        Err(InstanceError {
                            path: path.to_owned(),
                            message: format!("{n} is out of range for int"),
                        })
                    }
                }
                _ => Err(mismatch()),
            },
            (FieldType::Float, Json::Number(n)) => {
                n.as_f64().map(Value::Float).ok_or_else(mismatch)
            }
            (FieldType::String, Json::String(s)) => Ok(Value::String(s.clone())),
            (FieldType::Date, Json::String(s)) => {
                parse_date(s).map(Value::Date).ok_or_else(|| InstanceError {
                    path: path.to_owned(),
                    message: format!("'{s}' is not a date"),
                })
            }
            (FieldType::List(inner), Json::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.from_json(inner, item, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (FieldType::Model(name), Json::Object(map)) => {
                let model = self.models.get(name).ok_or_else(|| InstanceError {
                    path: path.to_owned(),
                    message: format!("unknown data model '{name}'"),
                })?;
                let values = model
                    .fields()
                    .iter()
                    .map(|field| {
                        let found = map.get(field.name()).or_else(|| {
                            map.iter()
                                .find(|(key, _)| key.eq_ignore_ascii_case(field.name()))
                                .map(|(_, v)| v)
                        });
                        match found {
                            Some(v) => self.from_json(
                                field.field_type(),
                                v,
                                &format!("{path}.{}", field.name()),
                            ),
                            None => Ok(self.default_value(field.field_type())),
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Object(Record::from_parts(Arc::clone(model), values)))
            }
            _ => Err(mismatch()),
        }
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn resolve_type_name(text: &str, declared: &HashSet<&str>) -> Option<FieldType> {
    let parsed = parse::parse_type(text).ok()?;
    resolve_parsed(&parsed, declared)
}

fn resolve_parsed(name: &TypeName, declared: &HashSet<&str>) -> Option<FieldType> {
    match name {
        TypeName::List(inner) => resolve_parsed(inner, declared).map(|t| FieldType::List(Box::new(t))),
        TypeName::Named(n) => {
            if declared.contains(n.as_str()) {
                return Some(FieldType::Model(n.clone()));
            }
            match n.to_ascii_lowercase().as_str() {
                "string" => Some(FieldType::String),
                "int" | "integer" | "long" | "int32" | "int64" => Some(FieldType::Int),
                "float" | "double" | "decimal" => Some(FieldType::Float),
                "bool" | "boolean" => Some(FieldType::Bool),
                "date" | "datetime" => Some(FieldType::Date),
                _ => None,
            }
        }
    }
}
