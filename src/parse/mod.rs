//! Front-end for the rule expression language.
//!
//! Conditions are boolean expressions over dotted field paths, actions are
//! `path = expr` statements separated by `;`. Field type names used in data
//! model declarations share the same lexer.

mod error;
mod grammar;

use winnow::Parser;

pub use error::ParseError;

use crate::{Assignment, Expr};

/// A parsed, not yet resolved, type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    Named(String),
    List(Box<TypeName>),
}

/// Parse a condition. A blank condition yields `None`, which compiles to
/// the constant-false predicate.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid expression.
pub fn parse_condition(input: &str) -> Result<Option<Expr>, ParseError> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    parse_expression(input).map(Some)
}

/// Parse a single expression.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid expression.
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    grammar::expression
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}

/// Parse a `;`-separated list of assignments. Blank input yields no statements.
///
/// # Errors
///
/// Returns [`ParseError`] if a statement is malformed.
pub fn parse_actions(input: &str) -> Result<Vec<Assignment>, ParseError> {
    grammar::statements
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}

/// Parse a field type name such as `int`, `List<Customer>` or `Line[]`.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a type name.
pub fn parse_type(input: &str) -> Result<TypeName, ParseError> {
    grammar::full_type
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}
