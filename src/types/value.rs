use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use super::error::EvaluationError;
use super::expr::{ArithOp, CompareOp};
use super::record::Record;

/// A dynamically typed value flowing through compiled rules.
///
/// `Clone` is a full structural copy; it is what execution-trace snapshots
/// are made of.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An absent object or collection.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// A UTC timestamp.
    Date(DateTime<Utc>),
    /// An instance of a declared data model.
    Object(Record),
    /// An ordered sequence of values.
    List(Vec<Value>),
}

impl Value {
    /// A short name of this value's runtime type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::Bool(_) => "bool".to_owned(),
            Value::Int(_) => "int".to_owned(),
            Value::Float(_) => "float".to_owned(),
            Value::String(_) => "string".to_owned(),
            Value::Date(_) => "date".to_owned(),
            Value::Object(record) => record.model_name().to_owned(),
            Value::List(_) => "list".to_owned(),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a value by dot-separated field path, e.g. `"Customer.TotalSpend"`.
    ///
    /// Returns `None` if a segment does not name a field or crosses a non-object.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(self, |current, segment| current.as_record()?.get(segment))
    }

    /// Set a value at a dot-separated field path, coercing it to the field's
    /// declared type.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::NullReference`] if the path crosses a null or
    /// unknown field, and [`EvaluationError::TypeMismatch`] if the value is not
    /// coercible to the field's type.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), EvaluationError> {
        let (parents, last) = match path.rsplit_once('.') {
            Some((parents, last)) => (Some(parents), last),
            None => (None, path),
        };
        let mut current = self;
        if let Some(parents) = parents {
            for segment in parents.split('.') {
                current = current
                    .as_record_mut()
                    .and_then(|r| r.get_mut(segment))
                    .ok_or_else(|| EvaluationError::NullReference {
                        path: path.to_owned(),
                    })?;
            }
        }
        let record = current
            .as_record_mut()
            .ok_or_else(|| EvaluationError::NullReference {
                path: path.to_owned(),
            })?;
        record.set(last, value)
    }

    /// Compare this value to another using the given operator.
    /// Returns `None` for incompatible types or unsupported operations.
    #[must_use]
    pub fn compare(&self, op: CompareOp, other: &Value) -> Option<bool> {
        if matches!(op, CompareOp::Eq | CompareOp::Neq) {
            if let Some(equal) = self.structural_eq(other) {
                return Some(if op == CompareOp::Eq { equal } else { !equal });
            }
        }
        let ord = self.partial_cmp_value(other)?;
        Some(match op {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Neq => ord != Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
        })
    }

    /// Equality for values that have no ordering: nulls, objects and lists.
    fn structural_eq(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(true),
            (Value::Null, _) | (_, Value::Null) => Some(false),
            (Value::Object(a), Value::Object(b)) => Some(a == b),
            (Value::List(a), Value::List(b)) => Some(a == b),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            // Ordering of bools is rejected when expressions are compiled.
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Apply an arithmetic operator. Integers stay integers; any float operand
    /// promotes the result to float. `+` also concatenates strings.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError`] on type mismatch, integer overflow, or a
    /// zero divisor.
    #[allow(clippy::cast_precision_loss)]
    pub fn arithmetic(&self, op: ArithOp, other: &Value) -> Result<Value, EvaluationError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                let (a, b) = (*a, *b);
                let result = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    ArithOp::Mul => a.checked_mul(b),
                    ArithOp::Div | ArithOp::Rem if b == 0 => {
                        return Err(EvaluationError::DivisionByZero);
                    }
                    ArithOp::Div => a.checked_div(b),
                    ArithOp::Rem => a.checked_rem(b),
                };
                result.map(Value::Int).ok_or(EvaluationError::Overflow)
            }
            (Value::String(a), Value::String(b)) if op == ArithOp::Add => {
                Ok(Value::String(format!("{a}{b}")))
            }
            _ => {
                let (Some(a), Some(b)) = (self.as_float(), other.as_float()) else {
                    return Err(EvaluationError::TypeMismatch {
                        expected: "number".to_owned(),
                        found: format!("{} {op} {}", self.type_name(), other.type_name()),
                    });
                };
                if matches!(op, ArithOp::Div | ArithOp::Rem) && b == 0.0 {
                    return Err(EvaluationError::DivisionByZero);
                }
                Ok(Value::Float(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Rem => a % b,
                }))
            }
        }
    }

    /// Convert to a JSON value for reporting. Dates render as RFC 3339.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => {
                serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Object(record) => serde_json::Value::Object(
                record
                    .fields()
                    .map(|(name, value)| (name.to_owned(), value.to_json()))
                    .collect(),
            ),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

/// Parse a date literal: RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
#[must_use]
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Object(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::Date(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Object(record) => write!(f, "{record}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_primitives() {
        assert_eq!(Value::from(42_i64), Value::Int(42));
        assert_eq!(Value::from(3.5_f64), Value::Float(3.5));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("hello"), Value::String("hello".to_owned()));
    }

    #[test]
    fn display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::String("hello".into()).to_string(), "\"hello\"");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(-1)]).to_string(),
            "[1, -1]"
        );
    }

    #[test]
    fn compare_int() {
        let a = Value::Int(10);
        let b = Value::Int(20);
        assert_eq!(a.compare(CompareOp::Eq, &b), Some(false));
        assert_eq!(a.compare(CompareOp::Neq, &b), Some(true));
        assert_eq!(a.compare(CompareOp::Lt, &b), Some(true));
        assert_eq!(a.compare(CompareOp::Lte, &b), Some(true));
        assert_eq!(a.compare(CompareOp::Gt, &b), Some(false));
        assert_eq!(a.compare(CompareOp::Gte, &a), Some(true));
    }

    #[test]
    fn compare_int_float_cross_type() {
        let i = Value::Int(1200);
        let f = Value::Float(1000.0);
        assert_eq!(i.compare(CompareOp::Gt, &f), Some(true));
        assert_eq!(f.compare(CompareOp::Lt, &i), Some(true));
        assert_eq!(Value::Int(10).compare(CompareOp::Eq, &Value::Float(10.0)), Some(true));
    }

    #[test]
    fn compare_null() {
        assert_eq!(Value::Null.compare(CompareOp::Eq, &Value::Null), Some(true));
        assert_eq!(Value::Null.compare(CompareOp::Neq, &Value::Int(1)), Some(true));
        assert_eq!(Value::Null.compare(CompareOp::Gt, &Value::Int(1)), None);
    }

    #[test]
    fn compare_dates() {
        let early = parse_date("2020-01-01").unwrap();
        let late = parse_date("2021-06-30T12:00:00Z").unwrap();
        assert_eq!(
            Value::Date(early).compare(CompareOp::Lt, &Value::Date(late)),
            Some(true)
        );
    }

    #[test]
    fn compare_type_mismatch_returns_none() {
        let i = Value::Int(1);
        let s = Value::String("hello".into());
        assert_eq!(i.compare(CompareOp::Gt, &s), None);
        assert_eq!(s.compare(CompareOp::Eq, &Value::Bool(true)), None);
    }

    #[test]
    fn arithmetic_int_and_float() {
        assert_eq!(
            Value::Int(7).arithmetic(ArithOp::Add, &Value::Int(3)),
            Ok(Value::Int(10))
        );
        assert_eq!(
            Value::Int(7).arithmetic(ArithOp::Mul, &Value::Float(0.5)),
            Ok(Value::Float(3.5))
        );
        assert_eq!(
            Value::Int(7).arithmetic(ArithOp::Rem, &Value::Int(4)),
            Ok(Value::Int(3))
        );
    }

    #[test]
    fn arithmetic_errors() {
        assert_eq!(
            Value::Int(1).arithmetic(ArithOp::Div, &Value::Int(0)),
            Err(EvaluationError::DivisionByZero)
        );
        assert_eq!(
            Value::Int(i64::MAX).arithmetic(ArithOp::Add, &Value::Int(1)),
            Err(EvaluationError::Overflow)
        );
        assert!(matches!(
            Value::Bool(true).arithmetic(ArithOp::Add, &Value::Int(1)),
            Err(EvaluationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            Value::from("ab").arithmetic(ArithOp::Add, &Value::from("cd")),
            Ok(Value::from("abcd"))
        );
    }

    #[test]
    fn parse_date_formats() {
        assert!(parse_date("2024-02-29").is_some());
        assert!(parse_date("2024-02-29T10:30:00+02:00").is_some());
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn to_json_primitives() {
        assert_eq!(Value::Int(3).to_json(), serde_json::json!(3));
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
        assert_eq!(
            Value::Date(parse_date("1970-01-01").unwrap()).to_json(),
            serde_json::json!("1970-01-01T00:00:00Z")
        );
    }
}
