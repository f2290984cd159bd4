use std::sync::Arc;

use rulegraph::{
    Binder, CollectionAdapter, CompilationResult, CompileError, ConstructionError, ContextEntry,
    DataModelDefinition, Engine, EngineDefinition, EvaluationError, FieldDefinition, RootContext,
    Rule, RuleSet, RulegraphError, RulesetAsRuleAdapter, SchemaRegistry, StandardRule, UnitType,
    Value,
};
use serde_json::json;

fn models() -> serde_json::Value {
    json!([
        { "name": "Customer", "fields": [
            { "name": "Name", "type": "string" },
            { "name": "TotalSpend", "type": "decimal" },
            { "name": "Score", "type": "int" },
            { "name": "Zero", "type": "int" },
            { "name": "Since", "type": "date" },
            { "name": "IsHighValue", "type": "bool" }
        ]},
        { "name": "Order", "fields": [
            { "name": "Customer", "type": "Customer" },
            { "name": "IsHighValue", "type": "bool" }
        ]}
    ])
}

fn compile(rule_sets: serde_json::Value) -> CompilationResult {
    let def: EngineDefinition =
        serde_json::from_value(json!({ "dataModels": models(), "ruleSets": rule_sets })).unwrap();
    Engine::compile(&def)
}

fn customer_rule(name: &str, conditions: &str, on_success: &str) -> serde_json::Value {
    json!({
        "type": "StandardRule",
        "ruleName": name,
        "conditions": conditions,
        "onSuccess": on_success
    })
}

fn error_of<'a>(result: &'a CompilationResult, unit: &str) -> &'a CompileError {
    result
        .unit(unit)
        .and_then(|u| u.error.as_ref())
        .unwrap_or_else(|| panic!("no error for {unit}:\n{result}"))
}

// --- Compile-time failures ---

#[test]
fn unresolved_path_is_a_unit_error() {
    let result = compile(json!([{
        "name": "CustomerEvaluation",
        "dataType": "Customer",
        "rules": [
            customer_rule("Bad", "Age > 18", ""),
            customer_rule("Good", "TotalSpend > 1000", "IsHighValue = true")
        ]
    }]));
    assert!(!result.success());
    assert_eq!(
        error_of(&result, "CustomerEvaluation.Bad").to_string(),
        "unresolved field path 'Age' in 'CustomerEvaluation.Bad'"
    );
    // siblings still compile, but the ruleset pass never runs
    assert!(result.unit("CustomerEvaluation.Good").unwrap().success);
    assert!(result.unit("CustomerEvaluation").is_none());

    let err = result.into_engine().unwrap_err();
    assert!(matches!(err, RulegraphError::CompilationFailed { ref failed } if failed.len() == 1));
}

#[test]
fn literal_must_coerce_to_field_type() {
    let result = compile(json!([{
        "name": "R",
        "dataType": "Customer",
        "rules": [customer_rule("Flag", "TotalSpend > 0", "IsHighValue = \"yes\"")]
    }]));
    assert!(matches!(
        error_of(&result, "R.Flag"),
        CompileError::NotCoercible { expected, .. } if expected == "bool"
    ));
}

#[test]
fn syntax_error_names_the_unit() {
    let result = compile(json!([{
        "name": "R",
        "dataType": "Customer",
        "rules": [customer_rule("Broken", "TotalSpend >", "")]
    }]));
    assert!(matches!(
        error_of(&result, "R.Broken"),
        CompileError::Syntax { unit, .. } if unit == "R.Broken"
    ));
}

#[test]
fn unknown_field_type_stops_after_first_pass() {
    let def: EngineDefinition = serde_json::from_value(json!({
        "dataModels": [{ "name": "Broken", "fields": [{ "name": "X", "type": "Widget" }] }],
        "ruleSets": [{ "name": "R", "dataType": "Broken", "rules": [] }]
    }))
    .unwrap();
    let result = Engine::compile(&def);
    assert!(!result.success());
    assert_eq!(result.units().len(), 1);
    assert_eq!(result.units()[0].unit_type, UnitType::DataModel);
    assert!(matches!(
        error_of(&result, "Broken"),
        CompileError::UnknownType { type_name, .. } if type_name == "Widget"
    ));
}

#[test]
fn unsupported_rule_type_tag() {
    let result = compile(json!([{
        "name": "R",
        "dataType": "Customer",
        "rules": [{ "type": "ScriptRule", "ruleName": "S" }]
    }]));
    assert!(matches!(
        error_of(&result, "R[0]"),
        CompileError::UnsupportedRuleType { .. }
    ));
}

#[test]
fn cyclic_nested_rulesets_are_rejected() {
    let nested = |target: &str| {
        json!({
            "type": "NestedRuleSet",
            "ruleName": target,
            "rulesetName": target,
            "dataType": "Customer",
            "adapters": ["AsRule"]
        })
    };
    let result = compile(json!([
        { "name": "A", "dataType": "Customer", "rules": [nested("B")] },
        { "name": "B", "dataType": "Customer", "rules": [nested("C")] },
        { "name": "C", "dataType": "Customer", "rules": [nested("A")] }
    ]));
    let CompileError::CyclicRuleSets { path } = error_of(&result, "A") else {
        panic!("expected a cycle:\n{result}");
    };
    assert_eq!(path.first(), path.last());
    assert_eq!(path.len(), 4);
}

#[test]
fn bind_without_binding() {
    let result = compile(json!([{
        "name": "R",
        "dataType": "Order",
        "rules": [{
            "type": "StandardRule",
            "ruleName": "Bound",
            "adapters": ["Bind"],
            "conditions": "TotalSpend > 0"
        }]
    }]));
    assert!(matches!(
        error_of(&result, "R.Bound"),
        CompileError::MissingBinding { .. }
    ));
}

#[test]
fn unknown_adapter() {
    let result = compile(json!([{
        "name": "R",
        "dataType": "Customer",
        "rules": [{
            "type": "StandardRule",
            "ruleName": "Cached",
            "adapters": ["Memoize"],
            "conditions": "TotalSpend > 0"
        }]
    }]));
    assert!(matches!(
        error_of(&result, "R.Cached"),
        CompileError::UnknownAdapter { adapter, .. } if adapter == "Memoize"
    ));
}

#[test]
fn after_execute_may_not_write_the_target() {
    let result = compile(json!([
        { "name": "CustomerEvaluation", "dataType": "Customer",
          "rules": [customer_rule("Spend", "TotalSpend > 0", "")] },
        { "name": "OrderEvaluation", "dataType": "Order", "rules": [{
            "type": "NestedRuleSet",
            "ruleName": "CustomerEvaluation",
            "rulesetName": "CustomerEvaluation",
            "dataType": "Customer",
            "adapters": ["AsRule", "Bind"],
            "binding": {
                "bindSourceType": "Order",
                "bindTargetType": "Customer",
                "bindFactory": "sourceData.Customer",
                "afterExecute": "targetData.IsHighValue = sourceData.IsHighValue"
            }
        }]}
    ]));
    assert!(matches!(
        error_of(&result, "OrderEvaluation"),
        CompileError::InvalidBinding { .. }
    ));
    assert!(result.unit("CustomerEvaluation").unwrap().success);
}

#[test]
fn bind_factory_cannot_read_the_target() {
    let result = compile(json!([
        { "name": "CustomerEvaluation", "dataType": "Customer",
          "rules": [customer_rule("Spend", "TotalSpend > 0", "")] },
        { "name": "OrderEvaluation", "dataType": "Order", "rules": [{
            "type": "NestedRuleSet",
            "ruleName": "CustomerEvaluation",
            "rulesetName": "CustomerEvaluation",
            "dataType": "Customer",
            "adapters": ["AsRule", "Bind"],
            "binding": {
                "bindSourceType": "Order",
                "bindTargetType": "Customer",
                "bindFactory": "targetData"
            }
        }]}
    ]));
    assert!(!result.success());
    assert!(matches!(
        error_of(&result, "OrderEvaluation"),
        CompileError::UnresolvedPath { path, .. } if path == "targetData"
    ));
    assert!(result.into_engine().is_err());
}

#[test]
fn duplicate_rule_names() {
    let result = compile(json!([{
        "name": "R",
        "dataType": "Customer",
        "rules": [
            customer_rule("Same", "TotalSpend > 0", ""),
            customer_rule("Same", "TotalSpend > 1", "")
        ]
    }]));
    assert!(matches!(
        error_of(&result, "R"),
        CompileError::DuplicateRule { rule, .. } if rule == "Same"
    ));
}

// --- Evaluation ---

#[test]
fn nested_ruleset_without_as_rule_shares_the_context() {
    let engine = compile(json!([
        { "name": "Inner", "dataType": "Customer",
          "rules": [customer_rule("Spend", "TotalSpend > 10", "")] },
        { "name": "Outer", "dataType": "Customer", "rules": [
            { "type": "NestedRuleSet", "ruleName": "Inner", "rulesetName": "Inner", "dataType": "Customer" }
        ]}
    ]))
    .into_engine()
    .unwrap();

    let mut customer = engine.default_instance("Customer").unwrap();
    let evaluation = engine.evaluate("Outer", &mut customer).unwrap();
    assert!(!evaluation.passed);
    assert_eq!(evaluation.context.keys().collect::<Vec<_>>(), ["Inner", "Spend"]);
}

#[test]
fn runtime_error_aborts_evaluation() {
    let engine = compile(json!([{
        "name": "R",
        "dataType": "Customer",
        "rules": [customer_rule("Divide", "true", "Score = Score / Zero")]
    }]))
    .into_engine()
    .unwrap();
    let mut customer = engine.default_instance("Customer").unwrap();
    let err = engine.evaluate("R", &mut customer).unwrap_err();
    assert!(matches!(
        err,
        RulegraphError::Evaluation(EvaluationError::DivisionByZero)
    ));
}

#[test]
fn date_fields_compare_with_string_literals() {
    let engine = compile(json!([{
        "name": "Loyalty",
        "dataType": "Customer",
        "rules": [customer_rule("Longstanding", "Since < \"2020-01-01\"", "IsHighValue = true")]
    }]))
    .into_engine()
    .unwrap();

    let (customer, evaluation) = engine
        .evaluate_json("Loyalty", &json!({ "Since": "2015-06-01T00:00:00Z" }))
        .unwrap();
    assert!(evaluation.passed);
    assert_eq!(customer.get("IsHighValue"), Some(&Value::Bool(true)));

    let (_, evaluation) = engine
        .evaluate_json("Loyalty", &json!({ "Since": "2023-02-03" }))
        .unwrap();
    assert!(!evaluation.passed);
}

#[test]
fn empty_ruleset_passes_vacuously() {
    let ruleset = RuleSet::<i64>::builder("empty").build().unwrap();
    let (passed, ctx) = ruleset.run(&mut 0).unwrap();
    assert!(passed);
    assert!(ctx.is_empty());
}

#[test]
fn plain_values_in_context_verify_as_passing() {
    let mut ctx = RootContext::new();
    ctx.insert_value("note", "checked by hand");
    assert!(ctx.verify());
    assert!(matches!(ctx.get("note"), Some(ContextEntry::Value(_))));
}

#[test]
fn binder_sibling_collision_is_last_write_wins() {
    let positive = StandardRule::builder("check")
        .when(|n: &i64, _| *n > 0)
        .build()
        .unwrap();
    let negative = StandardRule::builder("check")
        .when(|n: &i64, _| *n < 0)
        .build()
        .unwrap();
    let inner = RuleSet::builder("inner").rule(negative).build().unwrap();
    let binder = Binder::builder()
        .delegate(inner)
        .factory(|n: &i64| -*n)
        .build()
        .unwrap();

    let ruleset = RuleSet::builder("outer").rule(positive).rule(binder).build().unwrap();
    let (passed, ctx) = ruleset.run(&mut 5).unwrap();
    // the inner "check" (on -5) overwrote the outer one in place
    assert!(passed);
    assert_eq!(ctx.keys().collect::<Vec<_>>(), ["check", "inner"]);
    let before = ctx.rule("check").unwrap().data_before().downcast_ref::<i64>();
    assert_eq!(before, Some(&-5));
}

// --- Foreign records ---

fn spend_engine() -> Engine {
    compile(json!([
        { "name": "Spend", "dataType": "Customer",
          "rules": [customer_rule("Big", "TotalSpend > 1000", "IsHighValue = true")] },
        { "name": "OrderSpend", "dataType": "Order",
          "rules": [{
              "type": "StandardRule",
              "ruleName": "BigCustomer",
              "conditions": "Customer.TotalSpend > 1000",
              "onSuccess": "IsHighValue = true"
          }] }
    ]))
    .into_engine()
    .unwrap()
}

fn name_only_customer() -> Value {
    SchemaRegistry::from_definitions(&[DataModelDefinition {
        name: "Customer".into(),
        fields: vec![FieldDefinition::new("Name", "string")],
    }])
    .unwrap()
    .default_instance("Customer")
    .unwrap()
}

#[test]
fn record_from_another_schema_is_a_type_mismatch() {
    let engine = spend_engine();
    let mut customer = name_only_customer();
    let err = engine.evaluate("Spend", &mut customer).unwrap_err();
    assert!(matches!(
        err,
        RulegraphError::Evaluation(EvaluationError::TypeMismatch { .. })
    ));
}

#[test]
fn nested_record_from_another_schema_is_a_type_mismatch() {
    let engine = spend_engine();
    let mut order = engine.default_instance("Order").unwrap();
    let Value::Object(record) = &mut order else {
        panic!("expected an object");
    };
    *record.get_mut("Customer").unwrap() = name_only_customer();

    let err = engine.evaluate("OrderSpend", &mut order).unwrap_err();
    assert!(matches!(
        err,
        RulegraphError::Evaluation(EvaluationError::TypeMismatch { .. })
    ));
}

#[test]
fn identically_shaped_schema_is_accepted() {
    let engine = spend_engine();
    let defs: Vec<DataModelDefinition> = serde_json::from_value(models()).unwrap();
    let twin = SchemaRegistry::from_definitions(&defs).unwrap();
    let mut customer = twin
        .instance_from_json("Customer", &json!({ "TotalSpend": 2000 }))
        .unwrap();

    let evaluation = engine.evaluate("Spend", &mut customer).unwrap();
    assert!(evaluation.passed);
    assert_eq!(customer.get("IsHighValue"), Some(&Value::Bool(true)));
}

// --- Construction ---

#[test]
fn adapters_reject_missing_delegates() {
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
        StandardRule::<i64>::builder("no-condition").build(),
        Err(ConstructionError::MissingCondition { .. })
    ));

    let rule: Arc<dyn Rule<i64>> = Arc::new(
        StandardRule::builder("r").when(|_: &i64, _| true).build().unwrap(),
    );
    assert!(matches!(
        Binder::<i64, i64>::builder().shared_delegate(rule).build(),
        Err(ConstructionError::MissingFactory { .. })
    ));
}
