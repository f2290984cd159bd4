use std::borrow::Cow;

use crate::types::expr::{CompiledAssignment, CompiledExpr, CompiledPath};
use crate::{CompareOp, EvaluationError, Value};

/// Read access to the values a compiled expression's paths start from.
pub(crate) trait Roots {
    fn root(&self, index: usize) -> Option<&Value>;
}

/// Write access for compiled assignments.
pub(crate) trait RootsMut: Roots {
    fn root_mut(&mut self, index: usize) -> Option<&mut Value>;
}

impl Roots for [&Value] {
    fn root(&self, index: usize) -> Option<&Value> {
        self.get(index).copied()
    }
}

impl Roots for [&mut Value] {
    fn root(&self, index: usize) -> Option<&Value> {
        self.get(index).map(|v| &**v)
    }
}

impl RootsMut for [&mut Value] {
    fn root_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.get_mut(index).map(|v| &mut **v)
    }
}

/// Roots of a binding's after-execute statements: the source is writable,
/// the target is read-only.
pub(crate) struct BindingRoots<'a> {
    pub(crate) source: &'a mut Value,
    pub(crate) target: &'a Value,
}

impl Roots for BindingRoots<'_> {
    fn root(&self, index: usize) -> Option<&Value> {
        match index {
            0 => Some(&*self.source),
            1 => Some(self.target),
            _ => None,
        }
    }
}

impl RootsMut for BindingRoots<'_> {
    fn root_mut(&mut self, index: usize) -> Option<&mut Value> {
        // Only source paths compile as assignment targets.
        (index == 0).then_some(&mut *self.source)
    }
}

pub(crate) fn eval<'a, R: Roots + ?Sized>(
    expr: &'a CompiledExpr,
    roots: &'a R,
) -> Result<Cow<'a, Value>, EvaluationError> {
    match expr {
        CompiledExpr::Literal(value) => Ok(Cow::Borrowed(value)),
        CompiledExpr::Path(path) => read_path(path, roots).map(Cow::Borrowed),
        CompiledExpr::Compare { left, op, right } => {
            let l = eval(left, roots)?;
            let r = eval(right, roots)?;
            compare(&l, *op, &r).map(|b| Cow::Owned(Value::Bool(b)))
        }
        CompiledExpr::Arith { left, op, right } => {
            let l = eval(left, roots)?;
            let r = eval(right, roots)?;
            l.arithmetic(*op, &r).map(Cow::Owned)
        }
        CompiledExpr::And(a, b) => {
            let result = eval_bool(a, roots)? && eval_bool(b, roots)?;
            Ok(Cow::Owned(Value::Bool(result)))
        }
        CompiledExpr::Or(a, b) => {
            let result = eval_bool(a, roots)? || eval_bool(b, roots)?;
            Ok(Cow::Owned(Value::Bool(result)))
        }
        CompiledExpr::Not(inner) => Ok(Cow::Owned(Value::Bool(!eval_bool(inner, roots)?))),
        CompiledExpr::Neg(inner) => match &*eval(inner, roots)? {
            Value::Int(n) => n
                .checked_neg()
                .map(|n| Cow::Owned(Value::Int(n)))
                .ok_or(EvaluationError::Overflow),
            Value::Float(f) => Ok(Cow::Owned(Value::Float(-f))),
            other => Err(EvaluationError::TypeMismatch {
                expected: "number".to_owned(),
                found: other.type_name(),
            }),
        },
    }
}

pub(crate) fn eval_bool<R: Roots + ?Sized>(
    expr: &CompiledExpr,
    roots: &R,
) -> Result<bool, EvaluationError> {
    match &*eval(expr, roots)? {
        Value::Bool(b) => Ok(*b),
        other => Err(EvaluationError::TypeMismatch {
            expected: "bool".to_owned(),
            found: other.type_name(),
        }),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, EvaluationError> {
    match left.compare(op, right) {
        Some(result) => Ok(result),
        // NaN never orders; only `!=` holds.
        None if left.as_float().is_some() && right.as_float().is_some() => {
            Ok(op == CompareOp::Neq)
        }
        None => Err(EvaluationError::TypeMismatch {
            expected: left.type_name(),
            found: right.type_name(),
        }),
    }
}

fn unbound(path: &CompiledPath) -> EvaluationError {
    EvaluationError::NullReference {
        path: path.text.clone(),
    }
}

/// Follow a compiled path. Reading through a `null` object is an error;
/// a `null` at the end of the path is returned as is.
pub(crate) fn read_path<'a, R: Roots + ?Sized>(
    path: &CompiledPath,
    roots: &'a R,
) -> Result<&'a Value, EvaluationError> {
    let mut current = roots.root(path.root).ok_or_else(|| unbound(path))?;
    for &field in &path.fields {
        current = match current {
            Value::Object(record) => record.slot(field)?,
            Value::Null => return Err(unbound(path)),
            other => {
                return Err(EvaluationError::TypeMismatch {
                    expected: "object".to_owned(),
                    found: other.type_name(),
                });
            }
        };
    }
    Ok(current)
}

pub(crate) fn place_mut<'a, R: RootsMut + ?Sized>(
    path: &CompiledPath,
    roots: &'a mut R,
) -> Result<&'a mut Value, EvaluationError> {
    let mut current = roots.root_mut(path.root).ok_or_else(|| unbound(path))?;
    for &field in &path.fields {
        current = match current {
            Value::Object(record) => record.slot_mut(field)?,
            Value::Null => return Err(unbound(path)),
            other => {
                return Err(EvaluationError::TypeMismatch {
                    expected: "object".to_owned(),
                    found: other.type_name(),
                });
            }
        };
    }
    Ok(current)
}

/// Run one assignment: evaluate the right-hand side against the current
/// state, coerce it to the target field's type, then store it.
pub(crate) fn assign<R: RootsMut + ?Sized>(
    stmt: &CompiledAssignment,
    roots: &mut R,
) -> Result<(), EvaluationError> {
    let value = eval(&stmt.value, &*roots)?.into_owned();
    let found = value.type_name();
    let value = stmt
        .target_type
        .coerce(value)
        .ok_or_else(|| EvaluationError::TypeMismatch {
            expected: stmt.target_type.to_string(),
            found,
        })?;
    *place_mut(&stmt.target, roots)? = value;
    Ok(())
}
