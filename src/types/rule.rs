use std::fmt;
use std::sync::Arc;

use super::context::RootContext;
use super::error::{ConstructionError, EvaluationError};

/// Anything a rule can run against. Blanket-implemented.
pub trait Data: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Data for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// A compiled condition: reads the data (and optionally the trace so far).
pub type Predicate<T> =
    Arc<dyn Fn(&T, &RootContext) -> Result<bool, EvaluationError> + Send + Sync>;

/// A compiled action list: mutates the data in place.
pub type Mutator<T> =
    Arc<dyn Fn(&mut T, &RootContext) -> Result<(), EvaluationError> + Send + Sync>;

/// The capability set shared by rules, rulesets and adapters.
///
/// `evaluate` decides pass/fail; `success` or `failure` then runs the matching
/// branch. Both branches return an outcome token (`true` for success, `false`
/// for failure), not the effect of the branch.
pub trait Rule<T>: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Propagates any [`EvaluationError`] raised by compiled code.
    fn evaluate(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError>;

    /// # Errors
    ///
    /// Propagates any [`EvaluationError`] raised by the success branch.
    fn success(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError>;

    /// # Errors
    ///
    /// Propagates any [`EvaluationError`] raised by the failure branch.
    fn failure(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError>;
}

/// The atomic rule: a condition plus success and optional failure actions.
pub struct StandardRule<T> {
    name: String,
    condition: Predicate<T>,
    on_success: Mutator<T>,
    on_failure: Option<Mutator<T>>,
}

impl<T> StandardRule<T> {
    pub fn new(
        name: impl Into<String>,
        condition: Predicate<T>,
        on_success: Mutator<T>,
        on_failure: Option<Mutator<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            on_success,
            on_failure,
        }
    }

    /// Start building a rule from closures.
    #[must_use]
    pub fn builder(name: &str) -> RuleBuilder<T> {
        RuleBuilder {
            name: name.to_owned(),
            condition: None,
            on_success: None,
            on_failure: None,
        }
    }
}

impl<T: Data> Rule<T> for StandardRule<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        (self.condition)(data, ctx)
    }

    fn success(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        (self.on_success)(data, ctx)?;
        Ok(true)
    }

    fn failure(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        if let Some(on_failure) = &self.on_failure {
            on_failure(data, ctx)?;
        }
        Ok(false)
    }
}

impl<T> fmt::Debug for StandardRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardRule")
            .field("name", &self.name)
            .field("has_failure_branch", &self.on_failure.is_some())
            .finish_non_exhaustive()
    }
}

fn noop<T: 'static>() -> Mutator<T> {
    Arc::new(|_: &mut T, _: &RootContext| Ok::<(), EvaluationError>(()))
}

/// Builder for a [`StandardRule`] over native Rust data.
///
/// # Example
///
/// ```
/// use rulegraph::{RootContext, Rule, StandardRule};
///
/// #[derive(Debug, Clone)]
/// struct Customer { total_spend: f64, high_value: bool }
///
/// let rule = StandardRule::builder("EvaluateSpend")
///     .when(|c: &Customer, _| c.total_spend > 1000.0)
///     .then(|c: &mut Customer, _| c.high_value = true)
///     .otherwise(|c: &mut Customer, _| c.high_value = false)
///     .build()
///     .unwrap();
///
/// let mut customer = Customer { total_spend: 1200.0, high_value: false };
/// let mut ctx = RootContext::new();
/// assert!(rule.evaluate(&mut customer, &mut ctx).unwrap());
/// ```
pub struct RuleBuilder<T> {
    name: String,
    condition: Option<Predicate<T>>,
    on_success: Option<Mutator<T>>,
    on_failure: Option<Mutator<T>>,
}

impl<T: Data> RuleBuilder<T> {
    #[must_use]
    pub fn when(self, f: impl Fn(&T, &RootContext) -> bool + Send + Sync + 'static) -> Self {
        self.try_when(move |data, ctx| Ok(f(data, ctx)))
    }

    #[must_use]
    pub fn try_when(
        mut self,
        f: impl Fn(&T, &RootContext) -> Result<bool, EvaluationError> + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn then(self, f: impl Fn(&mut T, &RootContext) + Send + Sync + 'static) -> Self {
        self.try_then(move |data, ctx| {
            f(data, ctx);
            Ok(())
        })
    }

    #[must_use]
    pub fn try_then(
        mut self,
        f: impl Fn(&mut T, &RootContext) -> Result<(), EvaluationError> + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn otherwise(self, f: impl Fn(&mut T, &RootContext) + Send + Sync + 'static) -> Self {
        self.try_otherwise(move |data, ctx| {
            f(data, ctx);
            Ok(())
        })
    }

    #[must_use]
    pub fn try_otherwise(
        mut self,
        f: impl Fn(&mut T, &RootContext) -> Result<(), EvaluationError> + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(f));
        self
    }

    /// # Errors
    ///
    /// Returns [`ConstructionError::MissingCondition`] if `when` was never called.
    pub fn build(self) -> Result<StandardRule<T>, ConstructionError> {
        let condition = self.condition.ok_or_else(|| ConstructionError::MissingCondition {
            rule: self.name.clone(),
        })?;
        let on_success = self.on_success.unwrap_or_else(noop);
        Ok(StandardRule::new(self.name, condition, on_success, self.on_failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Account {
        balance: i64,
        flagged: bool,
    }

    fn overdraft_rule() -> StandardRule<Account> {
        StandardRule::builder("Overdraft")
            .when(|a: &Account, _| a.balance < 0)
            .then(|a: &mut Account, _| a.flagged = true)
            .build()
            .unwrap()
    }

    #[test]
    fn evaluate_reads_condition() {
        let rule = overdraft_rule();
        let mut ctx = RootContext::new();
        let mut account = Account { balance: -5, flagged: false };
        assert!(rule.evaluate(&mut account, &mut ctx).unwrap());
        account.balance = 5;
        assert!(!rule.evaluate(&mut account, &mut ctx).unwrap());
        assert!(!account.flagged, "evaluate must not run actions");
    }

    #[test]
    fn success_returns_true_token() {
        let rule = overdraft_rule();
        let mut ctx = RootContext::new();
        let mut account = Account::default();
        assert!(rule.success(&mut account, &mut ctx).unwrap());
        assert!(account.flagged);
    }

    #[test]
    fn failure_without_branch_is_noop() {
        let rule = overdraft_rule();
        let mut ctx = RootContext::new();
        let mut account = Account { balance: 3, flagged: false };
        assert!(!rule.failure(&mut account, &mut ctx).unwrap());
        assert_eq!(account.balance, 3);
        assert!(!account.flagged);
    }

    #[test]
    fn failure_branch_runs() {
        let rule = StandardRule::builder("Reset")
            .when(|_: &Account, _| false)
            .otherwise(|a: &mut Account, _| a.balance = 0)
            .build()
            .unwrap();
        let mut account = Account { balance: 9, flagged: false };
        assert!(!rule.failure(&mut account, &mut RootContext::new()).unwrap());
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn mutator_errors_propagate() {
        let rule = StandardRule::builder("Boom")
            .when(|_: &Account, _| true)
            .try_then(|_: &mut Account, _| Err(EvaluationError::Custom("boom".into())))
            .build()
            .unwrap();
        let err = rule
            .success(&mut Account::default(), &mut RootContext::new())
            .unwrap_err();
        assert_eq!(err, EvaluationError::Custom("boom".into()));
    }

    #[test]
    fn builder_without_condition_fails() {
        let result = StandardRule::<Account>::builder("bad_rule").build();
        assert!(matches!(
            result,
            Err(ConstructionError::MissingCondition { rule }) if rule == "bad_rule"
        ));
    }
}
