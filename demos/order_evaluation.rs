use rulegraph::{ContextEntry, Engine, RootContext};
use serde_json::json;

fn print_trace(ctx: &RootContext, depth: usize) {
    let indent = "  ".repeat(depth);
    for (key, entry) in ctx.iter() {
        match entry {
            ContextEntry::Rule(rule) => {
                let status = if rule.result() { "PASS" } else { "FAIL" };
                println!("{indent}{key}: {status}");
            }
            ContextEntry::Root(nested) => {
                println!("{indent}{key}:");
                print_trace(nested, depth + 1);
            }
            ContextEntry::Value(value) => println!("{indent}{key} = {value}"),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rulegraph=info".into()),
        )
        .init();

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/orders.json");
    let engine = Engine::from_file(path).expect("failed to compile rules");
    println!("Compiled rulesets: {:?}", engine.ruleset_names());

    let order = json!({
        "Customer": { "Name": "Alice", "TotalSpend": 1200 },
        "Lines": [
            { "Sku": "A-100", "Value": 3 },
            { "Sku": "B-200", "Value": 0 }
        ]
    });

    for ruleset in ["OrderEvaluation", "OrderLines"] {
        let (data, evaluation) = engine
            .evaluate_json(ruleset, &order)
            .expect("evaluation failed");
        println!("\n{ruleset}: {}", if evaluation.passed { "passed" } else { "failed" });
        print_trace(&evaluation.context, 1);
        println!("  result data: {}", data.to_json());
    }

    println!("\n{}", engine.run_tests());
}
