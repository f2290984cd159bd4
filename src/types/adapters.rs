//! Decorators that change the input type or multiplicity of a rule.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::context::{ContextEntry, RootContext, RuleContext, Snapshot};
use super::error::{ConstructionError, EvaluationError};
use super::rule::{Data, Rule};
use super::ruleset::RuleSet;
use super::value::Value;

/// Runs a `Rule<T>` over every element of a `Vec<T>`.
///
/// Every element is evaluated in its own [`RootContext`], stored in the
/// parent under `"<inner>[<index>]"`. All elements are always evaluated,
/// whatever the enclosing ruleset's mode; the result is the AND of the
/// per-element results.
pub struct CollectionAdapter<T> {
    name: String,
    inner: Arc<dyn Rule<T>>,
}

impl<T: Data> CollectionAdapter<T> {
    pub fn new(inner: Arc<dyn Rule<T>>) -> Self {
        Self {
            name: format!("{}[Collection]", inner.name()),
            inner,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConstructionError::MissingDelegate`] if `inner` is `None`.
    pub fn try_new(inner: Option<Arc<dyn Rule<T>>>) -> Result<Self, ConstructionError> {
        inner
            .map(Self::new)
            .ok_or_else(|| ConstructionError::MissingDelegate {
                adapter: "CollectionAdapter".to_owned(),
            })
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Rule<T>> {
        &self.inner
    }

    fn evaluate_items(
        &self,
        items: &mut [T],
        ctx: &mut RootContext,
    ) -> Result<bool, EvaluationError> {
        let inner_name = self.inner.name().to_owned();
        let mut all_passed = true;

        for (i, item) in items.iter_mut().enumerate() {
            let mut element_ctx = RootContext::new();
            element_ctx.insert(
                inner_name.clone(),
                ContextEntry::Rule(RuleContext::new(inner_name.clone(), Snapshot::capture(item))),
            );
            let passed = self.inner.evaluate(item, &mut element_ctx)?;
            element_ctx.complete_rule(&inner_name, passed, None, Snapshot::capture(item));
            trace!(rule = %inner_name, index = i, passed, "collection element evaluated");

            all_passed &= passed;
            ctx.insert(format!("{inner_name}[{i}]"), ContextEntry::Root(element_ctx));
        }

        Ok(all_passed)
    }
}

impl<T: Data> Rule<Vec<T>> for CollectionAdapter<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, data: &mut Vec<T>, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        self.evaluate_items(data, ctx)
    }

    fn success(&self, _data: &mut Vec<T>, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(true)
    }

    fn failure(&self, _data: &mut Vec<T>, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(false)
    }
}

/// The interpreted form: the data is a [`Value::List`].
impl Rule<Value> for CollectionAdapter<Value> {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, data: &mut Value, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        match data {
            Value::List(items) => self.evaluate_items(items, ctx),
            Value::Null => Err(EvaluationError::NullReference {
                path: self.name.clone(),
            }),
            other => Err(EvaluationError::NotACollection {
                rule: self.name.clone(),
                found: other.type_name(),
            }),
        }
    }

    fn success(&self, _data: &mut Value, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(true)
    }

    fn failure(&self, _data: &mut Value, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(false)
    }
}

impl<T> fmt::Debug for CollectionAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionAdapter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Presents a [`RuleSet`] as a single rule.
///
/// The ruleset runs in a fresh [`RootContext`] which is then stored in the
/// caller's context under the ruleset's name.
pub struct RulesetAsRuleAdapter<T> {
    ruleset: Arc<RuleSet<T>>,
}

impl<T: Data> RulesetAsRuleAdapter<T> {
    pub fn new(ruleset: Arc<RuleSet<T>>) -> Self {
        Self { ruleset }
    }

    /// # Errors
    ///
    /// Returns [`ConstructionError::MissingDelegate`] if `ruleset` is `None`.
    pub fn try_new(ruleset: Option<Arc<RuleSet<T>>>) -> Result<Self, ConstructionError> {
        ruleset
            .map(Self::new)
            .ok_or_else(|| ConstructionError::MissingDelegate {
                adapter: "RulesetAsRuleAdapter".to_owned(),
            })
    }

    #[must_use]
    pub fn ruleset(&self) -> &Arc<RuleSet<T>> {
        &self.ruleset
    }
}

impl<T: Data> Rule<T> for RulesetAsRuleAdapter<T> {
    fn name(&self) -> &str {
        self.ruleset.name()
    }

    fn evaluate(&self, data: &mut T, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        let mut nested = RootContext::new();
        let passed = self.ruleset.evaluate(data, &mut nested)?;
        ctx.insert(self.ruleset.name().to_owned(), ContextEntry::Root(nested));
        Ok(passed)
    }

    fn success(&self, _data: &mut T, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(true)
    }

    fn failure(&self, _data: &mut T, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(false)
    }
}

impl<T: Data> fmt::Debug for RulesetAsRuleAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RulesetAsRuleAdapter")
            .field(&self.ruleset.name())
            .finish()
    }
}

/// Produces the target value a [`Binder`] evaluates its inner rule against.
pub type BindFactory<S, T> = Arc<dyn Fn(&S) -> Result<T, EvaluationError> + Send + Sync>;

/// Copies results from the target back onto the source after evaluation.
pub type AfterExecute<S, T> = Arc<dyn Fn(&mut S, &T) -> Result<(), EvaluationError> + Send + Sync>;

/// Lets a `Rule<T>` run against an `S` by transforming the data first.
///
/// The inner rule writes straight into the caller's context, so its entries
/// become siblings of the caller's own. `after_execute` runs whether the inner
/// rule passed or not.
pub struct Binder<S, T> {
    inner: Arc<dyn Rule<T>>,
    factory: BindFactory<S, T>,
    after_execute: Option<AfterExecute<S, T>>,
}

impl<S: Data, T: Data> Binder<S, T> {
    pub fn new(
        inner: Arc<dyn Rule<T>>,
        factory: BindFactory<S, T>,
        after_execute: Option<AfterExecute<S, T>>,
    ) -> Self {
        Self {
            inner,
            factory,
            after_execute,
        }
    }

    #[must_use]
    pub fn builder() -> BinderBuilder<S, T> {
        BinderBuilder {
            inner: None,
            factory: None,
            after_execute: None,
        }
    }
}

impl<S: Data, T: Data> Rule<S> for Binder<S, T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn evaluate(&self, data: &mut S, ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        let mut target = (self.factory)(data)?;
        let passed = self.inner.evaluate(&mut target, ctx)?;
        if let Some(after_execute) = &self.after_execute {
            after_execute(data, &target)?;
        }
        Ok(passed)
    }

    fn success(&self, _data: &mut S, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(true)
    }

    fn failure(&self, _data: &mut S, _ctx: &mut RootContext) -> Result<bool, EvaluationError> {
        Ok(false)
    }
}

impl<S, T> fmt::Debug for Binder<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("inner", &self.inner.name())
            .field("has_after_execute", &self.after_execute.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Binder`].
///
/// # Example
///
/// ```
/// use rulegraph::{Binder, RootContext, Rule, StandardRule};
///
/// #[derive(Debug, Clone)]
/// struct Order { total: i64, large: bool }
///
/// let is_large = StandardRule::builder("IsLarge")
///     .when(|total: &i64, _| *total > 100)
///     .build()
///     .unwrap();
///
/// let binder = Binder::builder()
///     .delegate(is_large)
///     .factory(|order: &Order| order.total)
///     .after_execute(|order: &mut Order, total: &i64| order.large = *total > 100)
///     .build()
///     .unwrap();
///
/// let mut order = Order { total: 250, large: false };
/// assert!(binder.evaluate(&mut order, &mut RootContext::new()).unwrap());
/// assert!(order.large);
/// ```
pub struct BinderBuilder<S, T> {
    inner: Option<Arc<dyn Rule<T>>>,
    factory: Option<BindFactory<S, T>>,
    after_execute: Option<AfterExecute<S, T>>,
}

impl<S: Data, T: Data> BinderBuilder<S, T> {
    #[must_use]
    pub fn delegate(self, inner: impl Rule<T> + 'static) -> Self {
        self.shared_delegate(Arc::new(inner))
    }

    #[must_use]
    pub fn shared_delegate(mut self, inner: Arc<dyn Rule<T>>) -> Self {
        self.inner = Some(inner);
        self
    }

    #[must_use]
    pub fn factory(self, f: impl Fn(&S) -> T + Send + Sync + 'static) -> Self {
        self.try_factory(move |source| Ok(f(source)))
    }

    #[must_use]
    pub fn try_factory(
        mut self,
        f: impl Fn(&S) -> Result<T, EvaluationError> + Send + Sync + 'static,
    ) -> Self {
        self.factory = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn after_execute(self, f: impl Fn(&mut S, &T) + Send + Sync + 'static) -> Self {
        self.try_after_execute(move |source, target| {
            f(source, target);
            Ok(())
        })
    }

    #[must_use]
    pub fn try_after_execute(
        mut self,
        f: impl Fn(&mut S, &T) -> Result<(), EvaluationError> + Send + Sync + 'static,
    ) -> Self {
        self.after_execute = Some(Arc::new(f));
        self
    }

    /// # Errors
    ///
    /// Returns [`ConstructionError::MissingDelegate`] without a delegate and
    /// [`ConstructionError::MissingFactory`] without a bind factory.
    pub fn build(self) -> Result<Binder<S, T>, ConstructionError> {
        let inner = self.inner.ok_or_else(|| ConstructionError::MissingDelegate {
            adapter: "Binder".to_owned(),
        })?;
        let factory = self.factory.ok_or_else(|| ConstructionError::MissingFactory {
            binder: inner.name().to_owned(),
        })?;
        Ok(Binder::new(inner, factory, self.after_execute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutionMode, StandardRule};

    fn positive() -> Arc<dyn Rule<i64>> {
        Arc::new(
            StandardRule::builder("Positive")
                .when(|n: &i64, _| *n > 0)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn collection_evaluates_every_element() {
        let adapter = CollectionAdapter::new(positive());
        assert_eq!(Rule::<Vec<i64>>::name(&adapter), "Positive[Collection]");

        let mut ctx = RootContext::new();
        let passed = adapter.evaluate(&mut vec![1, -1, 2], &mut ctx).unwrap();
        assert!(!passed);
        assert_eq!(
            ctx.keys().collect::<Vec<_>>(),
            ["Positive[0]", "Positive[1]", "Positive[2]"]
        );
        let results: Vec<bool> = (0..3)
            .map(|i| ctx.nested(&format!("Positive[{i}]")).unwrap().verify())
            .collect();
        assert_eq!(results, [true, false, true]);
    }

    #[test]
    fn empty_collection_passes() {
        let adapter = CollectionAdapter::new(positive());
        let mut ctx = RootContext::new();
        assert!(adapter.evaluate(&mut Vec::new(), &mut ctx).unwrap());
        assert!(ctx.is_empty());
    }

    #[test]
    fn collection_over_value_rejects_non_lists() {
        let inner: Arc<dyn Rule<Value>> = Arc::new(
            StandardRule::builder("Any")
                .when(|_: &Value, _| true)
                .build()
                .unwrap(),
        );
        let adapter = CollectionAdapter::new(inner);
        let mut ctx = RootContext::new();
        assert!(matches!(
            Rule::<Value>::evaluate(&adapter, &mut Value::Int(3), &mut ctx),
            Err(EvaluationError::NotACollection { .. })
        ));
        assert!(matches!(
            Rule::<Value>::evaluate(&adapter, &mut Value::Null, &mut ctx),
            Err(EvaluationError::NullReference { .. })
        ));
        assert!(
            Rule::<Value>::evaluate(
                &adapter,
                &mut Value::List(vec![Value::Int(1), Value::Int(2)]),
                &mut ctx
            )
            .unwrap()
        );
    }

    #[test]
    fn missing_delegates_are_rejected() {
        assert!(matches!(
            CollectionAdapter::<i64>::try_new(None),
            Err(ConstructionError::MissingDelegate { .. })
        ));
        assert!(matches!(
            RulesetAsRuleAdapter::<i64>::try_new(None),
            Err(ConstructionError::MissingDelegate { .. })
        ));
        assert!(matches!(
            Binder::<i64, i64>::builder().factory(|n| *n).build(),
            Err(ConstructionError::MissingDelegate { .. })
        ));
        assert!(matches!(
            Binder::<i64, i64>::builder().shared_delegate(positive()).build(),
            Err(ConstructionError::MissingFactory { .. })
        ));
    }

    #[test]
    fn ruleset_adapter_isolates_context() {
        let inner = RuleSet::builder("Inner")
            .shared_rule(positive())
            .build()
            .unwrap();
        let adapter = RulesetAsRuleAdapter::new(Arc::new(inner));
        let mut ctx = RootContext::new();
        assert!(adapter.evaluate(&mut 5, &mut ctx).unwrap());
        assert_eq!(ctx.keys().collect::<Vec<_>>(), ["Inner"]);
        assert!(ctx.nested("Inner").unwrap().rule("Positive").is_some());
        assert_eq!(format!("{adapter:?}"), "RulesetAsRuleAdapter(\"Inner\")");
    }

    #[test]
    fn binder_flattens_context_and_runs_after_execute() {
        let inner = RuleSet::builder("Digits")
            .mode(ExecutionMode::All)
            .shared_rule(positive())
            .build()
            .unwrap();
        let binder = Binder::builder()
            .delegate(inner)
            .factory(|s: &String| s.len() as i64 - 3)
            .after_execute(|s: &mut String, n: &i64| s.push_str(&n.to_string()))
            .build()
            .unwrap();

        let mut ctx = RootContext::new();
        ctx.insert_value("Sibling", 1_i64);
        let mut data = String::from("ab");
        assert!(!binder.evaluate(&mut data, &mut ctx).unwrap());
        assert_eq!(data, "ab-1", "after_execute runs on failure too");
        assert_eq!(ctx.keys().collect::<Vec<_>>(), ["Sibling", "Positive"]);
    }

    #[test]
    fn binder_factory_errors_propagate() {
        let binder = Binder::builder()
            .shared_delegate(positive())
            .try_factory(|_: &String| {
                Err(EvaluationError::NullReference {
                    path: "sourceData.Customer".into(),
                })
            })
            .build()
            .unwrap();
        assert!(matches!(
            binder.evaluate(&mut String::new(), &mut RootContext::new()),
            Err(EvaluationError::NullReference { .. })
        ));
    }
}
