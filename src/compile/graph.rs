//! The three compile passes: data models, standard rules, rulesets.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{info, warn};

use super::expression::{CompiledBinding, Scope, compile_binding, resolve_type};
use crate::engine::{Engine, TestSuite};
use crate::types::compilation::{CompilationResult, UnitResult, UnitType};
use crate::types::definition::{BindingAdapter, EngineDefinition, RuleDefinition, RuleSetDefinition};
use crate::types::schema::FieldType;
use crate::{
    Binder, CollectionAdapter, CompileError, ConstructionError, ExecutionMode, Rule, RuleSet,
    RulesetAsRuleAdapter, SchemaRegistry, StandardRule, Value,
};

const AS_RULE: &str = "AsRule";
const FOR_COLLECTION: &str = "ForCollection";
const BIND: &str = "Bind";

pub(crate) fn compile(def: &EngineDefinition) -> CompilationResult {
    let mut units = Vec::new();

    info!(count = def.data_models.len(), "compiling data models");
    let (registry, outcomes) = SchemaRegistry::compile_models(&def.data_models);
    for ((name, outcome), model) in outcomes.into_iter().zip(&def.data_models) {
        let meta = model
            .fields
            .iter()
            .map(|f| format!("{}: {}", f.name, f.field_type))
            .collect::<Vec<_>>()
            .join(", ");
        push_unit(&mut units, UnitResult::new(UnitType::DataModel, name, meta, outcome));
    }
    if has_failures(&units) {
        return finish(units, None);
    }
    let registry = Arc::new(registry);

    info!(count = def.rule_sets.len(), "compiling rules");
    let rules = compile_rules(def, &registry, &mut units);
    if has_failures(&units) {
        return finish(units, None);
    }

    info!(count = def.rule_sets.len(), "linking rulesets");
    let rulesets = link_rulesets(def, &registry, &rules, &mut units);
    if has_failures(&units) {
        return finish(units, None);
    }

    let mut typed = HashMap::with_capacity(rulesets.len());
    let mut tests = Vec::new();
    for (name, ruleset) in rulesets {
        let Some(rs_def) = def.rule_sets.iter().find(|rs| rs.name == name) else {
            continue;
        };
        let Some(data_type) = registry.resolve_type(&rs_def.data_type) else {
            continue;
        };
        if !rs_def.tests.is_empty() {
            tests.push(TestSuite {
                ruleset: name.clone(),
                data_type: data_type.clone(),
                tests: rs_def.tests.clone(),
            });
        }
        typed.insert(name, (ruleset, data_type));
    }
    // declaration order, so test reports are stable
    tests.sort_by_key(|suite| def.rule_sets.iter().position(|rs| rs.name == suite.ruleset));
    finish(units, Some(Engine::new(registry, typed, tests)))
}

fn push_unit(units: &mut Vec<UnitResult>, unit: UnitResult) {
    if !unit.success {
        warn!(unit_type = %unit.unit_type, unit = %unit.name, error = %unit.message, "unit failed to compile");
    }
    units.push(unit);
}

fn has_failures(units: &[UnitResult]) -> bool {
    units.iter().any(|u| !u.success)
}

fn finish(units: Vec<UnitResult>, engine: Option<Engine>) -> CompilationResult {
    let failed = units.iter().filter(|u| !u.success).count();
    if failed == 0 {
        info!(units = units.len(), "compilation succeeded");
    } else {
        warn!(units = units.len(), failed, "compilation failed");
    }
    CompilationResult::new(units, engine)
}

// -- Adapter shape ----------------------------------------------------------

struct BindShape<'d> {
    def: &'d BindingAdapter,
    target: FieldType,
}

/// A rule definition's adapters, resolved against its ruleset's data type.
struct RuleShape<'d> {
    as_rule: bool,
    for_collection: bool,
    bind: Option<BindShape<'d>>,
    /// The type the innermost rule or ruleset runs against.
    base_type: FieldType,
}

/// Work out which adapters apply and the type each layer sees. Adapters wrap
/// in a fixed order (base, collection, binder), so the base type is found by
/// peeling them off the ruleset's type from the outside in.
fn rule_shape<'d>(
    registry: &SchemaRegistry,
    unit: &str,
    rule: &'d RuleDefinition,
    ruleset_type: &FieldType,
) -> Result<RuleShape<'d>, CompileError> {
    let (mut as_rule, mut for_collection, mut bind) = (false, false, false);
    for adapter in rule.adapters() {
        match adapter.as_str() {
            AS_RULE => as_rule = true,
            FOR_COLLECTION => for_collection = true,
            BIND => bind = true,
            other => {
                return Err(CompileError::UnknownAdapter {
                    unit: unit.to_owned(),
                    adapter: other.to_owned(),
                });
            }
        }
    }

    let bind = if bind {
        let def = rule
            .binding()
            .filter(|b| !b.bind_source_type.trim().is_empty() && !b.bind_target_type.trim().is_empty())
            .ok_or_else(|| CompileError::MissingBinding {
                unit: unit.to_owned(),
            })?;
        let source = resolve_type(registry, unit, &def.bind_source_type)?;
        let target = resolve_type(registry, unit, &def.bind_target_type)?;
        if source != *ruleset_type {
            return Err(CompileError::InvalidBinding {
                unit: unit.to_owned(),
                message: format!(
                    "bindSourceType {source} does not match the ruleset data type {ruleset_type}"
                ),
            });
        }
        Some(BindShape { def, target })
    } else {
        None
    };

    let bound = bind
        .as_ref()
        .map_or_else(|| ruleset_type.clone(), |b| b.target.clone());
    let base_type = if for_collection {
        match bound {
            FieldType::List(inner) => *inner,
            other => {
                return Err(CompileError::TypeMismatch {
                    unit: unit.to_owned(),
                    fragment: FOR_COLLECTION.to_owned(),
                    message: format!("{FOR_COLLECTION} needs a list type, found {other}"),
                });
            }
        }
    } else {
        bound
    };

    Ok(RuleShape {
        as_rule,
        for_collection,
        bind,
        base_type,
    })
}

// -- Pass 2: standard rules -------------------------------------------------

type RuleKey = (usize, usize);

fn rule_unit(ruleset: &RuleSetDefinition, index: usize, rule: &RuleDefinition) -> String {
    match rule.rule_name() {
        Some(name) => format!("{}.{name}", ruleset.name),
        None => format!("{}[{index}]", ruleset.name),
    }
}

fn compile_rules(
    def: &EngineDefinition,
    registry: &SchemaRegistry,
    units: &mut Vec<UnitResult>,
) -> HashMap<RuleKey, Arc<dyn Rule<Value>>> {
    let mut compiled = HashMap::new();

    for (rs_index, ruleset) in def.rule_sets.iter().enumerate() {
        for (rule_index, rule) in ruleset.rules.iter().enumerate() {
            let unit = rule_unit(ruleset, rule_index, rule);
            let outcome = match rule {
                RuleDefinition::StandardRule {
                    rule_name,
                    conditions,
                    on_success,
                    on_failure,
                    ..
                } => {
                    let meta = format!(
                        "when: {conditions}; then: {on_success}; otherwise: {on_failure}"
                    );
                    let result = compile_standard_rule(
                        registry,
                        &unit,
                        ruleset,
                        rule,
                        rule_name,
                        [conditions, on_success, on_failure],
                    )
                    .map(|built| {
                        compiled.insert((rs_index, rule_index), built);
                    });
                    Some((meta, result))
                }
                RuleDefinition::NestedRuleSet { .. } => None,
                RuleDefinition::Unsupported => Some((
                    String::new(),
                    Err(CompileError::UnsupportedRuleType { unit: unit.clone() }),
                )),
            };
            if let Some((meta, result)) = outcome {
                push_unit(units, UnitResult::new(UnitType::Rule, unit, meta, result));
            }
        }
    }

    compiled
}

fn compile_standard_rule(
    registry: &SchemaRegistry,
    unit: &str,
    ruleset: &RuleSetDefinition,
    rule: &RuleDefinition,
    rule_name: &str,
    [conditions, on_success, on_failure]: [&String; 3],
) -> Result<Arc<dyn Rule<Value>>, CompileError> {
    let ruleset_type = resolve_type(registry, unit, &ruleset.data_type)?;
    let shape = rule_shape(registry, unit, rule, &ruleset_type)?;
    let scope = Scope::data(registry, unit, shape.base_type);

    let condition = scope.condition(conditions)?;
    let on_success = scope.actions(on_success)?;
    let on_failure = scope.actions(on_failure)?;
    let on_failure = (!on_failure.is_empty()).then(|| on_failure.into_mutator());

    Ok(Arc::new(StandardRule::new(
        rule_name,
        condition.into_predicate(),
        on_success.into_mutator(),
        on_failure,
    )))
}

// -- Pass 3: rulesets -------------------------------------------------------

enum BaseRule {
    Standard(Arc<dyn Rule<Value>>),
    Nested(String),
}

struct PlannedRule {
    /// The name the assembled rule reports, used as its context key.
    name: String,
    base: BaseRule,
    as_rule: bool,
    for_collection: bool,
    binding: Option<Arc<CompiledBinding>>,
}

struct PlannedRuleSet {
    name: String,
    mode: ExecutionMode,
    rules: Vec<PlannedRule>,
    dependencies: Vec<String>,
}

fn link_rulesets(
    def: &EngineDefinition,
    registry: &SchemaRegistry,
    rules: &HashMap<RuleKey, Arc<dyn Rule<Value>>>,
    units: &mut Vec<UnitResult>,
) -> HashMap<String, Arc<RuleSet<Value>>> {
    // First declaration of each name wins; later ones are duplicates.
    let mut declared: HashMap<&str, Option<FieldType>> = HashMap::new();
    let mut outcomes: Vec<Result<(), CompileError>> = Vec::with_capacity(def.rule_sets.len());
    let mut plans: HashMap<String, PlannedRuleSet> = HashMap::new();

    for ruleset in &def.rule_sets {
        if !declared.contains_key(ruleset.name.as_str()) {
            declared.insert(&ruleset.name, registry.resolve_type(&ruleset.data_type));
        }
    }

    let mut seen = HashSet::new();
    for (rs_index, ruleset) in def.rule_sets.iter().enumerate() {
        let outcome = if seen.insert(ruleset.name.as_str()) {
            plan_ruleset(registry, rs_index, ruleset, rules, &declared).map(|plan| {
                plans.insert(ruleset.name.clone(), plan);
            })
        } else {
            Err(CompileError::DuplicateRuleSet {
                name: ruleset.name.clone(),
            })
        };
        outcomes.push(outcome);
    }

    let order = match topological_sort(&plans) {
        Ok(order) => order,
        Err(cyclic) => {
            for (ruleset, outcome) in def.rule_sets.iter().zip(outcomes.iter_mut()) {
                if let Some(path) = cyclic.get(&ruleset.name)
                    && outcome.is_ok()
                {
                    *outcome = Err(CompileError::CyclicRuleSets { path: path.clone() });
                }
            }
            Vec::new()
        }
    };

    let mut built: HashMap<String, Arc<RuleSet<Value>>> = HashMap::new();
    if outcomes.iter().all(Result::is_ok) {
        for name in order {
            let Some(plan) = plans.remove(&name) else {
                continue;
            };
            match build_ruleset(plan, &built) {
                Ok(ruleset) => {
                    built.insert(name, Arc::new(ruleset));
                }
                Err(err) => {
                    if let Some(idx) = def.rule_sets.iter().position(|rs| rs.name == name) {
                        outcomes[idx] = Err(err);
                    }
                }
            }
        }
    }

    for (ruleset, outcome) in def.rule_sets.iter().zip(outcomes) {
        let meta = format!(
            "dataType: {}; mode: {}; rules: [{}]",
            ruleset.data_type,
            ruleset.execution_mode,
            ruleset
                .rules
                .iter()
                .filter_map(RuleDefinition::rule_name)
                .collect::<Vec<_>>()
                .join(", ")
        );
        push_unit(
            units,
            UnitResult::new(UnitType::RuleSet, ruleset.name.clone(), meta, outcome),
        );
    }

    built
}

fn plan_ruleset(
    registry: &SchemaRegistry,
    rs_index: usize,
    ruleset: &RuleSetDefinition,
    rules: &HashMap<RuleKey, Arc<dyn Rule<Value>>>,
    declared: &HashMap<&str, Option<FieldType>>,
) -> Result<PlannedRuleSet, CompileError> {
    let unit = ruleset.name.as_str();
    let ruleset_type = resolve_type(registry, unit, &ruleset.data_type)?;

    let mut declared_names = HashSet::new();
    let mut effective_names = HashSet::new();
    let mut planned = Vec::with_capacity(ruleset.rules.len());
    let mut dependencies = Vec::new();

    for (rule_index, rule) in ruleset.rules.iter().enumerate() {
        let rule_unit = rule_unit(ruleset, rule_index, rule);
        let Some(rule_name) = rule.rule_name() else {
            return Err(CompileError::UnsupportedRuleType { unit: rule_unit });
        };
        if !declared_names.insert(rule_name) {
            return Err(CompileError::DuplicateRule {
                ruleset: ruleset.name.clone(),
                rule: rule_name.to_owned(),
            });
        }

        let shape = rule_shape(registry, &rule_unit, rule, &ruleset_type)?;

        let (base, base_name) = match rule {
            RuleDefinition::NestedRuleSet {
                ruleset_name,
                data_type,
                ..
            } => {
                let referenced = declared.get(ruleset_name.as_str()).ok_or_else(|| {
                    CompileError::UnknownRuleSet {
                        unit: rule_unit.clone(),
                        reference: ruleset_name.clone(),
                    }
                })?;
                let declared_type = resolve_type(registry, &rule_unit, data_type)?;
                if let Some(referenced) = referenced
                    && *referenced != declared_type
                {
                    return Err(CompileError::TypeMismatch {
                        unit: rule_unit,
                        fragment: ruleset_name.clone(),
                        message: format!(
                            "ruleset '{ruleset_name}' evaluates {referenced}, not {declared_type}"
                        ),
                    });
                }
                if shape.base_type != declared_type {
                    return Err(CompileError::TypeMismatch {
                        unit: rule_unit,
                        fragment: ruleset_name.clone(),
                        message: format!(
                            "ruleset '{ruleset_name}' evaluates {declared_type}, but the rule supplies {}",
                            shape.base_type
                        ),
                    });
                }
                dependencies.push(ruleset_name.clone());
                (BaseRule::Nested(ruleset_name.clone()), ruleset_name.clone())
            }
            _ => {
                let built = rules.get(&(rs_index, rule_index)).ok_or_else(|| {
                    CompileError::UnsupportedRuleType {
                        unit: rule_unit.clone(),
                    }
                })?;
                (BaseRule::Standard(Arc::clone(built)), rule_name.to_owned())
            }
        };

        let binding = match &shape.bind {
            Some(bind) => {
                let scope = Scope::binding(
                    registry,
                    rule_unit.clone(),
                    ruleset_type.clone(),
                    bind.target.clone(),
                );
                Some(Arc::new(compile_binding(
                    &scope,
                    &bind.def.bind_factory,
                    bind.def.after_execute.as_deref(),
                    &bind.target,
                )?))
            }
            None => None,
        };

        let name = if shape.for_collection {
            format!("{base_name}[Collection]")
        } else {
            base_name
        };
        if !effective_names.insert(name.clone()) {
            return Err(CompileError::DuplicateRule {
                ruleset: ruleset.name.clone(),
                rule: name,
            });
        }

        planned.push(PlannedRule {
            name,
            base,
            as_rule: shape.as_rule,
            for_collection: shape.for_collection,
            binding,
        });
    }

    Ok(PlannedRuleSet {
        name: ruleset.name.clone(),
        mode: ruleset.execution_mode,
        rules: planned,
        dependencies,
    })
}

fn build_ruleset(
    plan: PlannedRuleSet,
    built: &HashMap<String, Arc<RuleSet<Value>>>,
) -> Result<RuleSet<Value>, CompileError> {
    let mut builder = RuleSet::builder(&plan.name).mode(plan.mode);

    for rule in plan.rules {
        let base: Arc<dyn Rule<Value>> = match rule.base {
            BaseRule::Standard(rule) => rule,
            BaseRule::Nested(name) => {
                let nested = built.get(&name).ok_or_else(|| CompileError::UnknownRuleSet {
                    unit: plan.name.clone(),
                    reference: name.clone(),
                })?;
                if rule.as_rule {
                    Arc::new(RulesetAsRuleAdapter::new(Arc::clone(nested)))
                } else {
                    Arc::clone(nested) as Arc<dyn Rule<Value>>
                }
            }
        };
        let for_collection = rule.for_collection;
        let binding = rule.binding;
        builder = builder.deferred_rule(&rule.name, move || {
            assemble(Arc::clone(&base), for_collection, binding.as_ref())
        });
    }

    builder.build().map_err(|err| match err {
        ConstructionError::DuplicateRule { ruleset, rule } => {
            CompileError::DuplicateRule { ruleset, rule }
        }
        other => CompileError::InvalidBinding {
            unit: plan.name.clone(),
            message: other.to_string(),
        },
    })
}

/// Wrap a base rule in its adapters, innermost first.
fn assemble(
    base: Arc<dyn Rule<Value>>,
    for_collection: bool,
    binding: Option<&Arc<CompiledBinding>>,
) -> Arc<dyn Rule<Value>> {
    let mut rule = base;
    if for_collection {
        rule = Arc::new(CollectionAdapter::new(rule));
    }
    if let Some(binding) = binding {
        let (bind, after) = (Arc::clone(binding), Arc::clone(binding));
        rule = Arc::new(Binder::new(
            rule,
            Arc::new(move |source: &Value| bind.bind(source)),
            Some(Arc::new(move |source: &mut Value, target: &Value| {
                after.after_execute(source, target)
            })),
        ));
    }
    rule
}

// -- Dependency ordering ----------------------------------------------------

/// Kahn's algorithm over nested-ruleset references: dependencies come first.
/// On failure, returns the cycle reachable from each ruleset left unsorted.
fn topological_sort(
    plans: &HashMap<String, PlannedRuleSet>,
) -> Result<Vec<String>, HashMap<String, Vec<String>>> {
    // dependents[X] = rulesets that nest X (X must be built before them)
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for name in plans.keys() {
        in_degree.entry(name.as_str()).or_insert(0);
        dependents.entry(name.as_str()).or_default();
    }

    for (name, plan) in plans {
        for dep in &plan.dependencies {
            if plans.contains_key(dep) {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
                *in_degree.entry(name.as_str()).or_insert(0) += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut sorted = Vec::with_capacity(plans.len());

    while let Some(name) = queue.pop_front() {
        if let Some(deps) = dependents.get(name) {
            for dependent in deps {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
        sorted.push(name.to_owned());
    }

    if sorted.len() == plans.len() {
        return Ok(sorted);
    }

    let sorted: HashSet<&str> = sorted.iter().map(String::as_str).collect();
    Err(plans
        .keys()
        .filter(|name| !sorted.contains(name.as_str()))
        .map(|name| (name.clone(), find_cycle(name, plans)))
        .collect())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}

/// DFS-based cycle finder for error reporting.
fn find_cycle(start: &str, plans: &HashMap<String, PlannedRuleSet>) -> Vec<String> {
    fn dfs<'a>(
        node: &'a str,
        plans: &'a HashMap<String, PlannedRuleSet>,
        state: &mut HashMap<&'a str, DfsState>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        state.insert(node, DfsState::InStack);
        stack.push(node);
        let deps = plans.get(node).map(|p| p.dependencies.as_slice()).unwrap_or_default();
        for dep in deps {
            match state.get(dep.as_str()).copied().unwrap_or(DfsState::Unvisited) {
                DfsState::InStack => {
                    let pos = stack.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[pos..].iter().map(|s| (*s).to_owned()).collect();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                DfsState::Unvisited if plans.contains_key(dep) => {
                    if let Some(cycle) = dfs(dep, plans, state, stack) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }
        stack.pop();
        state.insert(node, DfsState::Done);
        None
    }

    let mut state = HashMap::new();
    let mut stack = Vec::new();
    dfs(start, plans, &mut state, &mut stack).unwrap_or_else(|| vec![start.to_owned()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::definition::{DataModelDefinition, FieldDefinition};

    fn models() -> Vec<DataModelDefinition> {
        vec![
            DataModelDefinition {
                name: "Customer".into(),
                fields: vec![
                    FieldDefinition::new("TotalSpend", "decimal"),
                    FieldDefinition::new("IsHighValue", "bool"),
                ],
            },
            DataModelDefinition {
                name: "Order".into(),
                fields: vec![
                    FieldDefinition::new("Customer", "Customer"),
                    FieldDefinition::new("IsHighValue", "bool"),
                ],
            },
        ]
    }

    fn standard(name: &str, condition: &str) -> RuleDefinition {
        RuleDefinition::StandardRule {
            rule_name: name.into(),
            adapters: vec![],
            binding: None,
            conditions: condition.into(),
            on_success: String::new(),
            on_failure: String::new(),
        }
    }

    fn nested(name: &str, data_type: &str) -> RuleDefinition {
        RuleDefinition::NestedRuleSet {
            rule_name: name.into(),
            adapters: vec![AS_RULE.into()],
            binding: None,
            ruleset_name: name.into(),
            data_type: data_type.into(),
        }
    }

    fn ruleset(name: &str, data_type: &str, rules: Vec<RuleDefinition>) -> RuleSetDefinition {
        RuleSetDefinition {
            name: name.into(),
            data_type: data_type.into(),
            execution_mode: ExecutionMode::All,
            rules,
            tests: vec![],
        }
    }

    fn compile_sets(rule_sets: Vec<RuleSetDefinition>) -> CompilationResult {
        compile(&EngineDefinition {
            data_models: models(),
            rule_sets,
        })
    }

    #[test]
    fn compiles_simple_definition() {
        let result = compile_sets(vec![ruleset(
            "CustomerEvaluation",
            "Customer",
            vec![standard("EvaluateSpend", "TotalSpend > 1000")],
        )]);
        assert!(result.success(), "{result}");
        let kinds: Vec<UnitType> = result.units().iter().map(|u| u.unit_type).collect();
        assert_eq!(
            kinds,
            [
                UnitType::DataModel,
                UnitType::DataModel,
                UnitType::Rule,
                UnitType::RuleSet
            ]
        );
        assert!(result.engine().unwrap().ruleset("CustomerEvaluation").is_some());
    }

    #[test]
    fn failed_pass_stops_later_passes() {
        let result = compile_sets(vec![ruleset(
            "CustomerEvaluation",
            "Customer",
            vec![
                standard("Bad", "Age > 3"),
                standard("Good", "TotalSpend > 3"),
            ],
        )]);
        assert!(!result.success());
        let bad = result.unit("CustomerEvaluation.Bad").unwrap();
        assert!(matches!(bad.error, Some(CompileError::UnresolvedPath { .. })));
        assert!(result.unit("CustomerEvaluation.Good").unwrap().success);
        assert!(result.unit("CustomerEvaluation").is_none(), "pass 3 must not run");
    }

    #[test]
    fn unknown_adapter_and_missing_binding() {
        let mut rule = standard("R", "TotalSpend > 0");
        if let RuleDefinition::StandardRule { adapters, .. } = &mut rule {
            adapters.push("Memoize".into());
        }
        let result = compile_sets(vec![ruleset("A", "Customer", vec![rule])]);
        assert!(matches!(
            result.unit("A.R").unwrap().error,
            Some(CompileError::UnknownAdapter { .. })
        ));

        let mut rule = standard("R", "TotalSpend > 0");
        if let RuleDefinition::StandardRule { adapters, .. } = &mut rule {
            adapters.push(BIND.into());
        }
        let result = compile_sets(vec![ruleset("A", "Order", vec![rule])]);
        assert!(matches!(
            result.unit("A.R").unwrap().error,
            Some(CompileError::MissingBinding { .. })
        ));
    }

    #[test]
    fn unknown_nested_reference() {
        let result = compile_sets(vec![ruleset("A", "Customer", vec![nested("Nope", "Customer")])]);
        assert!(matches!(
            result.unit("A").unwrap().error,
            Some(CompileError::UnknownRuleSet { .. })
        ));
    }

    #[test]
    fn nested_type_mismatch() {
        let result = compile_sets(vec![
            ruleset("Inner", "Customer", vec![standard("R", "TotalSpend > 0")]),
            ruleset("Outer", "Order", vec![nested("Inner", "Customer")]),
        ]);
        assert!(matches!(
            result.unit("Outer").unwrap().error,
            Some(CompileError::TypeMismatch { .. })
        ));
        assert!(result.unit("Inner").unwrap().success);
    }

    #[test]
    fn cycles_are_rejected() {
        let result = compile_sets(vec![
            ruleset("A", "Customer", vec![nested("B", "Customer")]),
            ruleset("B", "Customer", vec![nested("A", "Customer")]),
            ruleset("C", "Customer", vec![standard("R", "TotalSpend > 0")]),
        ]);
        assert!(!result.success());
        let a = result.unit("A").unwrap();
        assert!(
            matches!(&a.error, Some(CompileError::CyclicRuleSets { path }) if path.len() == 3),
            "{a:?}"
        );
        assert!(result.unit("C").unwrap().success);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let result = compile_sets(vec![ruleset("A", "Customer", vec![nested("A", "Customer")])]);
        assert!(matches!(
            &result.unit("A").unwrap().error,
            Some(CompileError::CyclicRuleSets { path }) if path == &["A", "A"]
        ));
    }

    #[test]
    fn duplicates_are_rejected() {
        let result = compile_sets(vec![
            ruleset(
                "A",
                "Customer",
                vec![standard("R", "TotalSpend > 0"), standard("R", "TotalSpend > 1")],
            ),
            ruleset("B", "Customer", vec![]),
            ruleset("B", "Customer", vec![]),
        ]);
        assert!(matches!(
            result.units().iter().find(|u| u.name == "A" && u.unit_type == UnitType::RuleSet).unwrap().error,
            Some(CompileError::DuplicateRule { .. })
        ));
        let b: Vec<_> = result.units().iter().filter(|u| u.name == "B").collect();
        assert!(b[0].success);
        assert!(matches!(b[1].error, Some(CompileError::DuplicateRuleSet { .. })));
    }

    #[test]
    fn unsupported_rule_type() {
        let result = compile_sets(vec![ruleset("A", "Customer", vec![RuleDefinition::Unsupported])]);
        assert!(matches!(
            result.unit("A[0]").unwrap().error,
            Some(CompileError::UnsupportedRuleType { .. })
        ));
    }

    #[test]
    fn for_collection_requires_list() {
        let mut rule = standard("R", "TotalSpend > 0");
        if let RuleDefinition::StandardRule { adapters, .. } = &mut rule {
            adapters.push(FOR_COLLECTION.into());
        }
        let result = compile_sets(vec![ruleset("A", "Customer", vec![rule])]);
        assert!(matches!(
            result.unit("A.R").unwrap().error,
            Some(CompileError::TypeMismatch { .. })
        ));
    }
}
