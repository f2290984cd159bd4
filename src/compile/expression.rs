//! Schema-typed expression compiler.
//!
//! Parsed expressions are resolved against a [`Scope`] of typed roots: field
//! paths become slot indices, literals are coerced to the type they meet, and
//! every operator is checked against its operand types. The output is a
//! [`CompiledExpr`] tree the interpreter runs without further checks.

use std::fmt;
use std::sync::Arc;

use crate::evaluate::{self, BindingRoots, Roots, RootsMut};
use crate::parse;
use crate::types::expr::{CompiledAssignment, CompiledExpr, CompiledPath};
use crate::types::schema::FieldType;
use crate::{
    ArithOp, Assignment, CompareOp, CompileError, EvaluationError, Expr, Mutator, Predicate,
    RootContext, SchemaRegistry, Value,
};

/// Static type of a compiled expression.
#[derive(Debug, Clone, PartialEq)]
enum Ty {
    Known(FieldType),
    /// The `null` literal.
    Null,
}

impl Ty {
    fn field(&self) -> Option<&FieldType> {
        match self {
            Ty::Known(t) => Some(t),
            Ty::Null => None,
        }
    }

    fn is(&self, ty: &FieldType) -> bool {
        self.field() == Some(ty)
    }

    fn is_numeric(&self) -> bool {
        self.field().is_some_and(FieldType::is_numeric)
    }

    fn is_nullable(&self) -> bool {
        matches!(
            self,
            Ty::Null | Ty::Known(FieldType::Model(_) | FieldType::List(_))
        )
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Known(t) => write!(f, "{t}"),
            Ty::Null => write!(f, "null"),
        }
    }
}

struct ScopeRoot {
    name: Option<&'static str>,
    ty: FieldType,
}

/// The typed roots an expression may read from.
///
/// A path whose first segment names a root starts there; any other path
/// starts at the implicit root, if the scope has one.
pub(crate) struct Scope<'a> {
    registry: &'a SchemaRegistry,
    unit: String,
    roots: Vec<ScopeRoot>,
    implicit: Option<usize>,
}

pub(crate) const SOURCE_ROOT: &str = "sourceData";
pub(crate) const TARGET_ROOT: &str = "targetData";
pub(crate) const TEST_ROOT: &str = "data";

impl<'a> Scope<'a> {
    /// A single implicit root of type `ty`: the scope of rule conditions and
    /// actions.
    pub(crate) fn data(registry: &'a SchemaRegistry, unit: impl Into<String>, ty: FieldType) -> Self {
        Self {
            registry,
            unit: unit.into(),
            roots: vec![ScopeRoot { name: None, ty }],
            implicit: Some(0),
        }
    }

    /// Like [`data`](Self::data), with the root also reachable as `data`.
    pub(crate) fn test(registry: &'a SchemaRegistry, unit: impl Into<String>, ty: FieldType) -> Self {
        Self {
            registry,
            unit: unit.into(),
            roots: vec![ScopeRoot {
                name: Some(TEST_ROOT),
                ty,
            }],
            implicit: Some(0),
        }
    }

    /// `sourceData` (root 0) and `targetData` (root 1), no implicit root.
    pub(crate) fn binding(
        registry: &'a SchemaRegistry,
        unit: impl Into<String>,
        source: FieldType,
        target: FieldType,
    ) -> Self {
        Self {
            registry,
            unit: unit.into(),
            roots: vec![
                ScopeRoot {
                    name: Some(SOURCE_ROOT),
                    ty: source,
                },
                ScopeRoot {
                    name: Some(TARGET_ROOT),
                    ty: target,
                },
            ],
            implicit: None,
        }
    }

    /// The scope a bind factory compiles in: `sourceData` alone, since the
    /// target only exists once the factory has produced it.
    fn factory_scope(&self) -> Self {
        Self {
            registry: self.registry,
            unit: self.unit.clone(),
            roots: self
                .roots
                .iter()
                .filter(|r| r.name == Some(SOURCE_ROOT))
                .map(|r| ScopeRoot {
                    name: r.name,
                    ty: r.ty.clone(),
                })
                .collect(),
            implicit: None,
        }
    }

    pub(crate) fn unit(&self) -> &str {
        &self.unit
    }

    fn syntax(&self, err: &parse::ParseError) -> CompileError {
        CompileError::Syntax {
            unit: self.unit.clone(),
            message: err.message().to_owned(),
        }
    }

    fn mismatch(&self, fragment: impl fmt::Display, message: impl Into<String>) -> CompileError {
        CompileError::TypeMismatch {
            unit: self.unit.clone(),
            fragment: fragment.to_string(),
            message: message.into(),
        }
    }

    fn resolve_path(&self, segments: &[String]) -> Result<(CompiledPath, FieldType), CompileError> {
        let text = segments.join(".");
        let unresolved = || CompileError::UnresolvedPath {
            unit: self.unit.clone(),
            path: text.clone(),
        };

        let named = segments.first().and_then(|first| {
            self.roots
                .iter()
                .position(|r| r.name.is_some_and(|n| n == first.as_str()))
        });
        let (root, rest) = match (named, self.implicit) {
            (Some(idx), _) => (idx, &segments[1..]),
            (None, Some(idx)) => (idx, segments),
            (None, None) => return Err(unresolved()),
        };

        let mut ty = self.roots[root].ty.clone();
        let mut fields = Vec::with_capacity(rest.len());
        for segment in rest {
            let FieldType::Model(model_name) = &ty else {
                return Err(unresolved());
            };
            let model = self.registry.model(model_name).ok_or_else(unresolved)?;
            let idx = model.index_of(segment).ok_or_else(unresolved)?;
            fields.push(idx);
            ty = model.fields()[idx].field_type().clone();
        }

        Ok((CompiledPath { root, fields, text }, ty))
    }

    fn compile_expr(&self, expr: &Expr) -> Result<(CompiledExpr, Ty), CompileError> {
        match expr {
            Expr::Literal(value) => {
                let ty = literal_type(value)
                    .ok_or_else(|| self.mismatch(expr, "unsupported literal"))?;
                Ok((CompiledExpr::Literal(value.clone()), ty))
            }
            Expr::Path(segments) => {
                let (path, ty) = self.resolve_path(segments)?;
                Ok((CompiledExpr::Path(path), Ty::Known(ty)))
            }
            Expr::Compare { left, op, right } => {
                let (l, lt) = self.compile_expr(left)?;
                let (r, rt) = self.compile_expr(right)?;
                let (l, r) = self.check_comparison(expr, *op, (l, &lt), (r, &rt))?;
                Ok((
                    CompiledExpr::Compare {
                        left: Box::new(l),
                        op: *op,
                        right: Box::new(r),
                    },
                    Ty::Known(FieldType::Bool),
                ))
            }
            Expr::Arith { left, op, right } => {
                let (l, lt) = self.compile_expr(left)?;
                let (r, rt) = self.compile_expr(right)?;
                let ty = match (&lt, &rt) {
                    (Ty::Known(FieldType::Int), Ty::Known(FieldType::Int)) => FieldType::Int,
                    _ if lt.is_numeric() && rt.is_numeric() => FieldType::Float,
                    (Ty::Known(FieldType::String), Ty::Known(FieldType::String))
                        if *op == ArithOp::Add =>
                    {
                        FieldType::String
                    }
                    _ => {
                        return Err(self.mismatch(expr, format!("cannot apply {lt} {op} {rt}")));
                    }
                };
                Ok((
                    CompiledExpr::Arith {
                        left: Box::new(l),
                        op: *op,
                        right: Box::new(r),
                    },
                    Ty::Known(ty),
                ))
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                let a = self.compile_bool(a)?;
                let b = self.compile_bool(b)?;
                let compiled = if matches!(expr, Expr::And(..)) {
                    CompiledExpr::And(Box::new(a), Box::new(b))
                } else {
                    CompiledExpr::Or(Box::new(a), Box::new(b))
                };
                Ok((compiled, Ty::Known(FieldType::Bool)))
            }
            Expr::Not(inner) => {
                let inner = self.compile_bool(inner)?;
                Ok((
                    CompiledExpr::Not(Box::new(inner)),
                    Ty::Known(FieldType::Bool),
                ))
            }
            Expr::Neg(inner) => {
                let (compiled, ty) = self.compile_expr(inner)?;
                if !ty.is_numeric() {
                    return Err(self.mismatch(expr, format!("cannot negate {ty}")));
                }
                Ok((CompiledExpr::Neg(Box::new(compiled)), ty))
            }
        }
    }

    fn compile_bool(&self, expr: &Expr) -> Result<CompiledExpr, CompileError> {
        let (compiled, ty) = self.compile_expr(expr)?;
        if !ty.is(&FieldType::Bool) {
            return Err(self.mismatch(expr, format!("expected bool, found {ty}")));
        }
        Ok(compiled)
    }

    fn check_comparison(
        &self,
        expr: &Expr,
        op: CompareOp,
        (left, lt): (CompiledExpr, &Ty),
        (right, rt): (CompiledExpr, &Ty),
    ) -> Result<(CompiledExpr, CompiledExpr), CompileError> {
        let ordered = match (lt, rt) {
            _ if lt.is_numeric() && rt.is_numeric() => true,
            (Ty::Known(FieldType::String), Ty::Known(FieldType::String))
            | (Ty::Known(FieldType::Date), Ty::Known(FieldType::Date)) => true,
            (Ty::Known(FieldType::Bool), Ty::Known(FieldType::Bool)) => false,
            (Ty::Known(FieldType::Date), Ty::Known(FieldType::String)) => {
                let right = self.date_literal(right)?;
                return Ok((left, right));
            }
            (Ty::Known(FieldType::String), Ty::Known(FieldType::Date)) => {
                let left = self.date_literal(left)?;
                return Ok((left, right));
            }
            _ if lt.is_nullable() && rt.is_nullable() && (lt == rt || *lt == Ty::Null || *rt == Ty::Null) => {
                false
            }
            _ => {
                return Err(self.mismatch(expr, format!("cannot compare {lt} {op} {rt}")));
            }
        };
        if !ordered && !op.is_equality() {
            return Err(self.mismatch(expr, format!("{lt} values only support == and !=")));
        }
        Ok((left, right))
    }

    /// A string literal used as a date, parsed now rather than per evaluation.
    fn date_literal(&self, expr: CompiledExpr) -> Result<CompiledExpr, CompileError> {
        match expr {
            CompiledExpr::Literal(value) => {
                let fragment = value.to_string();
                FieldType::Date
                    .coerce(value)
                    .map(CompiledExpr::Literal)
                    .ok_or_else(|| CompileError::NotCoercible {
                        unit: self.unit.clone(),
                        fragment,
                        expected: FieldType::Date.to_string(),
                    })
            }
            _ => Err(self.mismatch(
                "date comparison",
                "dates compare with dates or date literals",
            )),
        }
    }

    fn compile_assignment(&self, stmt: &Assignment) -> Result<CompiledAssignment, CompileError> {
        let (target, target_type) = self.resolve_path(&stmt.target)?;
        if target.fields.is_empty() {
            return Err(self.mismatch(stmt, "assignment target must be a field"));
        }
        let (value, ty) = self.compile_expr(&stmt.value)?;

        let value = match (value, &ty) {
            (value, Ty::Known(source)) if target_type.accepts(source) => value,
            (CompiledExpr::Literal(literal), _) => {
                let fragment = literal.to_string();
                let coerced =
                    target_type
                        .coerce(literal)
                        .ok_or_else(|| CompileError::NotCoercible {
                            unit: self.unit.clone(),
                            fragment,
                            expected: target_type.to_string(),
                        })?;
                CompiledExpr::Literal(coerced)
            }
            _ => {
                return Err(self.mismatch(
                    stmt,
                    format!("cannot assign {ty} to a {target_type} field"),
                ));
            }
        };

        Ok(CompiledAssignment {
            target,
            target_type,
            value,
        })
    }

    /// Compile a condition. Blank source is the constant-false condition.
    pub(crate) fn condition(&self, source: &str) -> Result<CompiledCondition, CompileError> {
        let parsed = parse::parse_condition(source).map_err(|e| self.syntax(&e))?;
        let expr = parsed.map(|e| self.compile_bool(&e)).transpose()?;
        Ok(CompiledCondition { expr })
    }

    /// Compile a `;`-separated statement list. Blank source is a no-op.
    pub(crate) fn actions(&self, source: &str) -> Result<CompiledActions, CompileError> {
        let parsed = parse::parse_actions(source).map_err(|e| self.syntax(&e))?;
        let statements = parsed
            .iter()
            .map(|stmt| self.compile_assignment(stmt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledActions { statements })
    }

    /// Compile a value expression whose type must be exactly `expected`.
    pub(crate) fn expression(
        &self,
        source: &str,
        expected: &FieldType,
    ) -> Result<CompiledExpression, CompileError> {
        let parsed = parse::parse_expression(source).map_err(|e| self.syntax(&e))?;
        let (expr, ty) = self.compile_expr(&parsed)?;
        if !ty.is(expected) {
            return Err(self.mismatch(&parsed, format!("expected {expected}, found {ty}")));
        }
        let place = match &expr {
            CompiledExpr::Path(path) => Some(path.clone()),
            _ => None,
        };
        Ok(CompiledExpression { expr, place })
    }
}

fn literal_type(value: &Value) -> Option<Ty> {
    Some(match value {
        Value::Null => Ty::Null,
        Value::Bool(_) => Ty::Known(FieldType::Bool),
        Value::Int(_) => Ty::Known(FieldType::Int),
        Value::Float(_) => Ty::Known(FieldType::Float),
        Value::String(_) => Ty::Known(FieldType::String),
        Value::Date(_) => Ty::Known(FieldType::Date),
        Value::Object(_) | Value::List(_) => return None,
    })
}

/// A compiled boolean condition. `None` is the constant-false condition.
#[derive(Debug, Clone)]
pub(crate) struct CompiledCondition {
    expr: Option<CompiledExpr>,
}

impl CompiledCondition {
    pub(crate) fn test<R: Roots + ?Sized>(&self, roots: &R) -> Result<bool, EvaluationError> {
        match &self.expr {
            Some(expr) => evaluate::eval_bool(expr, roots),
            None => Ok(false),
        }
    }

    pub(crate) fn into_predicate(self) -> Predicate<Value> {
        Arc::new(move |data: &Value, _ctx: &RootContext| self.test(&[data][..]))
    }
}

/// A compiled statement list, run in order.
#[derive(Debug, Clone, Default)]
pub(crate) struct CompiledActions {
    statements: Vec<CompiledAssignment>,
}

impl CompiledActions {
    pub(crate) fn run<R: RootsMut + ?Sized>(&self, roots: &mut R) -> Result<(), EvaluationError> {
        for stmt in &self.statements {
            evaluate::assign(stmt, roots)?;
        }
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Whether every statement writes below the given root.
    pub(crate) fn writes_only(&self, root: usize) -> bool {
        self.statements.iter().all(|s| s.target.root == root)
    }

    pub(crate) fn into_mutator(self) -> Mutator<Value> {
        Arc::new(move |data: &mut Value, _ctx: &RootContext| self.run(&mut [data][..]))
    }
}

/// A compiled value expression. `place` is set when the expression is a
/// plain field path, so the result can be written back where it came from.
#[derive(Debug, Clone)]
pub(crate) struct CompiledExpression {
    expr: CompiledExpr,
    place: Option<CompiledPath>,
}

impl CompiledExpression {
    pub(crate) fn eval<R: Roots + ?Sized>(&self, roots: &R) -> Result<Value, EvaluationError> {
        evaluate::eval(&self.expr, roots).map(std::borrow::Cow::into_owned)
    }

    pub(crate) fn place(&self) -> Option<&CompiledPath> {
        self.place.as_ref()
    }
}

/// The executable parts of a `Bind` adapter.
#[derive(Debug, Clone)]
pub(crate) struct CompiledBinding {
    factory: CompiledExpression,
    after_execute: CompiledActions,
}

impl CompiledBinding {
    /// Build the bound target from the source. A `null` target is a null
    /// reference: rules always run against an object.
    pub(crate) fn bind(&self, source: &Value) -> Result<Value, EvaluationError> {
        let target = self.factory.eval(&[source][..])?;
        if target.is_null() {
            return Err(EvaluationError::NullReference {
                path: self
                    .factory
                    .place()
                    .map_or_else(|| SOURCE_ROOT.to_owned(), |p| p.text.clone()),
            });
        }
        Ok(target)
    }

    /// Write the evaluated target back to the factory's source path (if it is
    /// one), then run the after-execute statements.
    pub(crate) fn after_execute(&self, source: &mut Value, target: &Value) -> Result<(), EvaluationError> {
        if let Some(place) = self.factory.place() {
            *evaluate::place_mut(place, &mut [&mut *source][..])? = target.clone();
        }
        self.after_execute.run(&mut BindingRoots { source, target })
    }
}

/// Compile a binding's factory and after-execute statements.
pub(crate) fn compile_binding(
    scope: &Scope<'_>,
    factory: &str,
    after_execute: Option<&str>,
    target: &FieldType,
) -> Result<CompiledBinding, CompileError> {
    if factory.trim().is_empty() {
        return Err(CompileError::InvalidBinding {
            unit: scope.unit().to_owned(),
            message: "bindFactory is empty".to_owned(),
        });
    }
    let factory = scope.factory_scope().expression(factory, target)?;
    let after_execute = match after_execute {
        Some(source) => scope.actions(source)?,
        None => CompiledActions::default(),
    };
    if !after_execute.is_empty() && !after_execute.writes_only(0) {
        return Err(CompileError::InvalidBinding {
            unit: scope.unit().to_owned(),
            message: format!("afterExecute may only assign {SOURCE_ROOT} fields"),
        });
    }
    Ok(CompiledBinding {
        factory,
        after_execute,
    })
}

/// Compile a condition over instances of `data_type` into a [`Predicate`].
///
/// A blank condition is the constant-false predicate.
///
/// # Errors
///
/// Returns a [`CompileError`] naming `unit` if the type is unknown, the
/// source does not parse, a path does not resolve, or types do not match.
pub fn compile_condition(
    registry: &SchemaRegistry,
    unit: &str,
    data_type: &str,
    source: &str,
) -> Result<Predicate<Value>, CompileError> {
    let ty = resolve_type(registry, unit, data_type)?;
    Ok(Scope::data(registry, unit, ty)
        .condition(source)?
        .into_predicate())
}

/// Compile a `;`-separated list of assignments over instances of
/// `data_type` into a [`Mutator`]. A blank list is the no-op mutator.
///
/// # Errors
///
/// As [`compile_condition`]; additionally a literal that cannot be coerced
/// to its target field's type is [`CompileError::NotCoercible`].
pub fn compile_actions(
    registry: &SchemaRegistry,
    unit: &str,
    data_type: &str,
    source: &str,
) -> Result<Mutator<Value>, CompileError> {
    let ty = resolve_type(registry, unit, data_type)?;
    Ok(Scope::data(registry, unit, ty).actions(source)?.into_mutator())
}

pub(crate) fn resolve_type(
    registry: &SchemaRegistry,
    unit: &str,
    type_name: &str,
) -> Result<FieldType, CompileError> {
    registry
        .resolve_type(type_name)
        .ok_or_else(|| CompileError::UnknownType {
            unit: unit.to_owned(),
            type_name: type_name.to_owned(),
        })
}
