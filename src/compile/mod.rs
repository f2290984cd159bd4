mod expression;
mod graph;

pub use expression::{compile_actions, compile_condition};

pub(crate) use expression::Scope;
pub(crate) use graph::compile;
