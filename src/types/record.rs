use std::fmt;
use std::sync::Arc;

use super::error::EvaluationError;
use super::schema::DataModel;
use super::value::Value;

/// An instance of a [`DataModel`]: one value per declared field, stored in
/// declaration order.
///
/// Compiled expressions address fields by position, so a record is always
/// shaped exactly like its model.
#[derive(Debug, Clone)]
pub struct Record {
    model: Arc<DataModel>,
    values: Vec<Value>,
}

impl Record {
    pub(crate) fn from_parts(model: Arc<DataModel>, values: Vec<Value>) -> Self {
        debug_assert_eq!(model.fields().len(), values.len());
        Self { model, values }
    }

    #[must_use]
    pub fn model(&self) -> &DataModel {
        &self.model
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Look up a field by name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.model.index_of(field).map(|idx| &self.values[idx])
    }

    /// Mutable lookup of a field by name. Writes through this reference are
    /// not type-checked; prefer [`set`](Self::set).
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.model.index_of(field).map(|idx| &mut self.values[idx])
    }

    /// Set a field, coercing the value to the field's declared type.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::NullReference`] for an unknown field and
    /// [`EvaluationError::TypeMismatch`] if the value is not coercible.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), EvaluationError> {
        let idx = self
            .model
            .index_of(field)
            .ok_or_else(|| EvaluationError::NullReference {
                path: format!("{}.{field}", self.model.name()),
            })?;
        let ty = self.model.fields()[idx].field_type();
        let value = value.into();
        let found = value.type_name();
        self.values[idx] = ty.coerce(value).ok_or_else(|| EvaluationError::TypeMismatch {
            expected: ty.to_string(),
            found,
        })?;
        Ok(())
    }

    /// Iterate over `(field name, value)` pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.model
            .fields()
            .iter()
            .map(|f| f.name())
            .zip(self.values.iter())
    }

    /// The value at a compiled field index. A miss means the record was
    /// built from a model of another shape than the one compiled against.
    #[inline]
    pub(crate) fn slot(&self, index: usize) -> Result<&Value, EvaluationError> {
        match self.values.get(index) {
            Some(value) => Ok(value),
            None => Err(misshapen(&self.model)),
        }
    }

    #[inline]
    pub(crate) fn slot_mut(&mut self, index: usize) -> Result<&mut Value, EvaluationError> {
        match self.values.get_mut(index) {
            Some(value) => Ok(value),
            None => Err(misshapen(&self.model)),
        }
    }
}

fn misshapen(model: &DataModel) -> EvaluationError {
    EvaluationError::TypeMismatch {
        expected: format!("{} record", model.name()),
        found: format!("{} record of another shape", model.name()),
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name() && self.values == other.values
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.model.name())?;
        for (i, (name, value)) in self.fields().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {name}: {value}")?;
        }
        write!(f, " }}")
    }
}
