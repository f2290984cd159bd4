use rulegraph::parse::{TypeName, parse_actions, parse_condition, parse_expression, parse_type};
use rulegraph::{ArithOp, CompareOp, Expr, Value};

fn path(p: &str) -> Expr {
    Expr::Path(p.split('.').map(str::to_owned).collect())
}

fn lit(v: impl Into<Value>) -> Expr {
    Expr::Literal(v.into())
}

#[test]
fn comparison_of_path_and_literal() {
    assert_eq!(
        parse_expression("TotalSpend > 1000").unwrap(),
        Expr::Compare {
            left: Box::new(path("TotalSpend")),
            op: CompareOp::Gt,
            right: Box::new(lit(1000_i64)),
        }
    );
}

#[test]
fn and_binds_tighter_than_or() {
    let parsed = parse_expression("a || b && c").unwrap();
    assert_eq!(
        parsed,
        Expr::Or(
            Box::new(path("a")),
            Box::new(Expr::And(Box::new(path("b")), Box::new(path("c"))))
        )
    );
}

#[test]
fn parentheses_override_precedence() {
    let parsed = parse_expression("(a || b) && c").unwrap();
    assert!(matches!(parsed, Expr::And(_, _)));
}

#[test]
fn dotted_paths_and_arithmetic() {
    let parsed = parse_expression("Customer.TotalSpend * 2 >= Limit - 1").unwrap();
    let Expr::Compare { left, op, right } = parsed else {
        panic!("expected comparison");
    };
    assert_eq!(op, CompareOp::Gte);
    assert_eq!(
        *left,
        Expr::Arith {
            left: Box::new(path("Customer.TotalSpend")),
            op: ArithOp::Mul,
            right: Box::new(lit(2_i64)),
        }
    );
    assert!(matches!(*right, Expr::Arith { op: ArithOp::Sub, .. }));
}

#[test]
fn literals() {
    assert_eq!(parse_expression("true").unwrap(), lit(true));
    assert_eq!(parse_expression("null").unwrap(), Expr::Literal(Value::Null));
    assert!(parse_expression("'it''s'").is_err());
    assert_eq!(parse_expression("\"Alice\"").unwrap(), lit("Alice"));
    assert_eq!(parse_expression("2.5").unwrap(), lit(2.5));
    // `trueish` is a field, not a keyword
    assert_eq!(parse_expression("trueish").unwrap(), path("trueish"));
}

#[test]
fn blank_condition_is_none() {
    assert_eq!(parse_condition("").unwrap(), None);
    assert_eq!(parse_condition("   ").unwrap(), None);
    assert!(parse_condition("x == 1").unwrap().is_some());
}

#[test]
fn chained_comparison_is_rejected() {
    assert!(parse_expression("a < b < c").is_err());
}

#[test]
fn trailing_garbage_is_rejected() {
    let err = parse_expression("a == 1 )").unwrap_err();
    assert!(err.to_string().starts_with("parse error"));
}

#[test]
fn actions_split_on_semicolons() {
    let actions = parse_actions("IsHighValue = true; Score = Score + 1;").unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].target, ["IsHighValue"]);
    assert_eq!(actions[0].value, lit(true));
    assert_eq!(actions[1].target, ["Score"]);
    assert!(parse_actions("").unwrap().is_empty());
}

#[test]
fn assignment_needs_a_path_target() {
    assert!(parse_actions("1 = x").is_err());
    assert!(parse_actions("x == 1").is_err());
}

#[test]
fn type_names() {
    assert_eq!(parse_type("int").unwrap(), TypeName::Named("int".into()));
    assert_eq!(
        parse_type("List<Customer>").unwrap(),
        TypeName::List(Box::new(TypeName::Named("Customer".into())))
    );
    assert_eq!(parse_type("Line[]").unwrap(), parse_type("List<Line>").unwrap());
    assert!(parse_type("List<").is_err());
}
