use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::context::{ContextEntry, RootContext, RuleContext, Snapshot};
use super::error::{ConstructionError, EvaluationError};
use super::rule::{Data, Rule};

/// How a [`RuleSet`] reacts to individual rule outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Evaluate every rule.
    #[default]
    All,
    /// Stop, returning `true`, at the first rule whose condition holds.
    StopOnFirstSuccess,
    /// Stop, returning `false`, at the first rule whose condition fails.
    StopOnFirstFailure,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::All => write!(f, "All"),
            ExecutionMode::StopOnFirstSuccess => write!(f, "StopOnFirstSuccess"),
            ExecutionMode::StopOnFirstFailure => write!(f, "StopOnFirstFailure"),
        }
    }
}

type RuleFactory<T> = Box<dyn Fn() -> Arc<dyn Rule<T>> + Send + Sync>;

/// A rule built on first use and shared afterwards.
enum LazyRule<T> {
    Ready(Arc<dyn Rule<T>>),
    Deferred {
        cell: OnceLock<Arc<dyn Rule<T>>>,
        factory: RuleFactory<T>,
    },
}

impl<T> LazyRule<T> {
    fn ready(rule: Arc<dyn Rule<T>>) -> Self {
        LazyRule::Ready(rule)
    }

    fn deferred(factory: RuleFactory<T>) -> Self {
        LazyRule::Deferred {
            cell: OnceLock::new(),
            factory,
        }
    }

    /// Racing first callers block until the single construction finishes.
    fn get(&self) -> &Arc<dyn Rule<T>> {
        match self {
            LazyRule::Ready(rule) => rule,
            LazyRule::Deferred { cell, factory } => cell.get_or_init(|| factory()),
        }
    }
}

/// An ordered group of rule-shaped values plus an [`ExecutionMode`].
///
/// Immutable once built and safe to share across threads behind `Arc`; the
/// only interior mutability is the construct-once cell of each deferred rule.
pub struct RuleSet<T> {
    name: String,
    mode: ExecutionMode,
    rules: Vec<LazyRule<T>>,
}

impl<T: Data> RuleSet<T> {
    #[must_use]
    pub fn builder(name: &str) -> RuleSetBuilder<T> {
        RuleSetBuilder {
            name: name.to_owned(),
            mode: ExecutionMode::All,
            rules: Vec::new(),
            names: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule in declaration order into `ctx`.
    ///
    /// Each rule gets a [`RuleContext`] keyed by its name holding snapshots of
    /// the data before and after its branch ran. Short-circuit modes return
    /// as soon as they fire. Otherwise the result is a recursive verification
    /// of every context entry written during this call.
    ///
    /// # Errors
    ///
    /// Any [`EvaluationError`] from a rule aborts the call.
    pub fn evaluate(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        let mark = ctx.mark();

        for lazy in &self.rules {
            let rule = lazy.get();
            let key = rule.name().to_owned();
            ctx.insert(
                key.clone(),
                ContextEntry::Rule(RuleContext::new(key.clone(), Snapshot::capture(data))),
            );

            let passed = rule.evaluate(data, ctx)?;
            debug!(ruleset = %self.name, rule = %key, passed, "rule evaluated");

            if passed {
                let output = rule.success(data, ctx)?;
                ctx.complete_rule(&key, true, Some(output), Snapshot::capture(data));
                if self.mode == ExecutionMode::StopOnFirstSuccess {
                    trace!(ruleset = %self.name, rule = %key, "stopping on first success");
                    return Ok(true);
                }
            } else {
                let output = rule.failure(data, ctx)?;
                ctx.complete_rule(&key, false, Some(output), Snapshot::capture(data));
                if self.mode == ExecutionMode::StopOnFirstFailure {
                    trace!(ruleset = %self.name, rule = %key, "stopping on first failure");
                    return Ok(false);
                }
            }
        }

        Ok(ctx.verify_since(mark))
    }

    /// Evaluate into a fresh [`RootContext`] and return it with the result.
    ///
    /// # Errors
    ///
    /// Any [`EvaluationError`] from a rule aborts the call.
    pub fn run(&self, data: &mut T) -> Result<(bool, RootContext), EvaluationError> {
        let mut ctx = RootContext::new();
        let passed = self.evaluate(data, &mut ctx)?;
        Ok((passed, ctx))
    }
}

impl<T: Data> Rule<T> for RuleSet<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        RuleSet::evaluate(self, data, ctx)
    }

    fn success(&self, _data: &mut T, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(true)
    }

    fn failure(&self, _data: &mut T, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(false)
    }
}

impl<T> fmt::Debug for RuleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl<T> fmt::Display for RuleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuleSet({}, {} rules, mode {})",
            self.name,
            self.rules.len(),
            self.mode
        )
    }
}

/// Builder for a [`RuleSet`].
///
/// # Example
///
/// ```
/// use rulegraph::{ExecutionMode, RuleSet, StandardRule};
///
/// let ruleset = RuleSet::builder("Checks")
///     .mode(ExecutionMode::StopOnFirstFailure)
///     .rule(StandardRule::builder("positive").when(|n: &i64, _| *n > 0).build().unwrap())
///     .rule(StandardRule::builder("small").when(|n: &i64, _| *n < 100).build().unwrap())
///     .build()
///     .unwrap();
///
/// let (passed, ctx) = ruleset.run(&mut 42).unwrap();
/// assert!(passed);
/// assert_eq!(ctx.len(), 2);
/// ```
pub struct RuleSetBuilder<T> {
    name: String,
    mode: ExecutionMode,
    rules: Vec<LazyRule<T>>,
    names: Vec<String>,
}

impl<T: Data> RuleSetBuilder<T> {
    #[must_use]
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add an already-built rule.
    #[must_use]
    pub fn rule(self, rule: impl Rule<T> + 'static) -> Self {
        self.shared_rule(Arc::new(rule))
    }

    #[must_use]
    pub fn shared_rule(mut self, rule: Arc<dyn Rule<T>>) -> Self {
        self.names.push(rule.name().to_owned());
        self.rules.push(LazyRule::ready(rule));
        self
    }

    /// Add a rule that is constructed on first evaluation, exactly once.
    ///
    /// `name` must match the name of the rule the factory produces.
    #[must_use]
    pub fn deferred_rule(
        mut self,
        name: &str,
        factory: impl Fn() -> Arc<dyn Rule<T>> + Send + Sync + 'static,
    ) -> Self {
        self.names.push(name.to_owned());
        self.rules.push(LazyRule::deferred(Box::new(factory)));
        self
    }

    /// # Errors
    ///
    /// Returns [`ConstructionError::DuplicateRule`] if two rules share a name.
    pub fn build(self) -> Result<RuleSet<T>, ConstructionError> {
        let mut seen = HashSet::new();
        for name in &self.names {
            if !seen.insert(name.as_str()) {
                return Err(ConstructionError::DuplicateRule {
                    ruleset: self.name.clone(),
                    rule: name.clone(),
                });
            }
        }
        Ok(RuleSet {
            name: self.name,
            mode: self.mode,
            rules: self.rules,
        })
    }
}
