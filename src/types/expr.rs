use std::fmt;

use super::schema::FieldType;
use super::value::Value;

/// Comparison operators supported in rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Neq)
    }
}

/// Arithmetic operators supported in rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Parsed expression AST. Field paths are still strings; they are resolved
/// against a schema by the expression compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    Arith {
        left: Box<Expr>,
        op: ArithOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
}

/// A parsed `path = expr` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: Vec<String>,
    pub value: Expr,
}

/// A field path resolved to slot indices: which root it starts from, then the
/// field position at each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompiledPath {
    pub(crate) root: usize,
    pub(crate) fields: Vec<usize>,
    pub(crate) text: String,
}

/// Compiled expression with every field path resolved to slot indices and
/// every literal already coerced to the type it is compared or combined with.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompiledExpr {
    Literal(Value),
    Path(CompiledPath),
    Compare {
        left: Box<CompiledExpr>,
        op: CompareOp,
        right: Box<CompiledExpr>,
    },
    Arith {
        left: Box<CompiledExpr>,
        op: ArithOp,
        right: Box<CompiledExpr>,
    },
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
    Not(Box<CompiledExpr>),
    Neg(Box<CompiledExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledAssignment {
    pub(crate) target: CompiledPath,
    pub(crate) target_type: FieldType,
    pub(crate) value: CompiledExpr,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Neq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithOp::Add => write!(f, "+"),
            ArithOp::Sub => write!(f, "-"),
            ArithOp::Mul => write!(f, "*"),
            ArithOp::Div => write!(f, "/"),
            ArithOp::Rem => write!(f, "%"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Path(segments) => write!(f, "{}", segments.join(".")),
            Expr::Compare { left, op, right } => write!(f, "({left} {op} {right})"),
            Expr::Arith { left, op, right } => write!(f, "({left} {op} {right})"),
            Expr::And(a, b) => write!(f, "({a} && {b})"),
            Expr::Or(a, b) => write!(f, "({a} || {b})"),
            Expr::Not(inner) => write!(f, "!{inner}"),
            Expr::Neg(inner) => write!(f, "-{inner}"),
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.target.join("."), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Expr {
        Expr::Path(p.split('.').map(str::to_owned).collect())
    }

    #[test]
    fn display_nested_expression() {
        let expr = Expr::And(
            Box::new(Expr::Compare {
                left: Box::new(path("Customer.TotalSpend")),
                op: CompareOp::Gt,
                right: Box::new(Expr::Literal(Value::Int(1000))),
            }),
            Box::new(Expr::Not(Box::new(path("IsBlocked")))),
        );
        assert_eq!(
            expr.to_string(),
            "((Customer.TotalSpend > 1000) && !IsBlocked)"
        );
    }

    #[test]
    fn display_assignment() {
        let stmt = Assignment {
            target: vec!["IsHighValue".into()],
            value: Expr::Literal(Value::Bool(true)),
        };
        assert_eq!(stmt.to_string(), "IsHighValue = true");
    }

    #[test]
    fn equality_ops() {
        assert!(CompareOp::Eq.is_equality());
        assert!(CompareOp::Neq.is_equality());
        assert!(!CompareOp::Gte.is_equality());
    }
}
