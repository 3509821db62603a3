//! Integration tests for the project pipeline
//!
//! Tests use temporary directories with real file fixtures to verify:
//! - Project config loading
//! - Parsing and compiling every flow file
//! - Formatting stability of the printer
//! - Resolving node schema settings through the registry
//! - Error reporting for broken sources

use std::sync::Arc;
use tempfile::TempDir;
use weft_core::ast::Printer;
use weft_core::parser::parse;
use weft_core::schema::ObjectSchema;
use weft_core::{Config, Error, FlowError, QualityOfService, Registry, Value};

const ORDERS: &str = r#"
// Order intake pipeline
config {
  qos: "at-least-once"
}

flow "orders" {
  config {
    buffer_size: 32,
    retries: 4
  }

  node "ingest" {
    type: passthrough
    to: check
  }

  node "check" {
    type: validate
    schema: "order"
    version: "2.0.0"
    to: stamp
  }

  node "stamp" {
    type: tag
    key: "stage"
    value: "validated"
  }
}
"#;

/// Helper to create a temporary project directory with standard structure.
///
/// Returns a `TempDir` that automatically cleans up when dropped.
fn setup_project(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("flows")).unwrap();
    std::fs::write(dir.path().join("weft.yaml"), config).unwrap();
    dir
}

// =============================================================================
// Complete Pipeline Tests
// =============================================================================

#[test]
fn test_load_and_compile_project() {
    let dir = setup_project("name: integration\nruntime:\n  buffer_size: 8\n");
    std::fs::write(dir.path().join("flows/orders.weft"), ORDERS).unwrap();

    let config = Config::load(dir.path()).unwrap();
    assert_eq!(config.project.runtime.buffer_size, 8);

    let flows = config.load_flows().unwrap();
    assert_eq!(flows.len(), 1);
    let orders = &flows[0];
    assert_eq!(orders.buffer_size(), Some(32));
    assert_eq!(orders.retries(), Some(4));
    assert_eq!(orders.qos(), Some(QualityOfService::AtLeastOnce));
    assert_eq!(orders.topological_order(), ["ingest", "check", "stamp"]);
    assert_eq!(
        orders.node("stamp").unwrap().settings.get("value"),
        Some(&Value::from("validated"))
    );
}

#[test]
fn test_node_schema_settings_resolve_through_registry() {
    let dir = setup_project("name: integration\n");
    std::fs::write(dir.path().join("flows/orders.weft"), ORDERS).unwrap();
    let flow = Config::load(dir.path())
        .unwrap()
        .load_flow("orders")
        .unwrap();

    let registry = Registry::new();
    let order = ObjectSchema::with_version("2.0.0")
        .required_property("id", registry.get_latest("string").unwrap())
        .required_property("total", registry.get_latest("float").unwrap());
    // object schemas register under the "object" type name
    registry.register(Arc::new(order)).unwrap();

    let check = flow.node("check").unwrap();
    let version = check.settings.get("version").and_then(Value::as_str).unwrap();
    let schema = registry.get("object", version).unwrap();

    let good = Value::from(serde_json::json!({"id": "o-1", "total": 10.5}));
    let bad = Value::from(serde_json::json!({"id": "o-2"}));
    assert!(schema.validate(&good).is_ok());
    assert!(schema.validate(&bad).is_err());
}

// =============================================================================
// Formatting Tests
// =============================================================================

#[test]
fn test_formatting_is_stable() {
    let (program, errors) = parse(ORDERS);
    assert!(errors.is_empty(), "{errors:?}");

    let printer = Printer::default();
    let once = printer.print(&program);
    let (reparsed, errors) = parse(&once);
    assert!(errors.is_empty(), "{errors:?}");
    let twice = printer.print(&reparsed);

    assert_eq!(once, twice);
    for keyword in ["flow", "node", "config", "\"orders\"", "retries", "32", "validate"] {
        assert!(once.contains(keyword), "missing {keyword} in:\n{once}");
    }
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_syntax_errors_name_the_file() {
    let dir = setup_project("name: broken\n");
    std::fs::write(
        dir.path().join("flows/bad.weft"),
        "flow \"bad\" {\n  node \"n\" {\n    type:\n  }\n",
    )
    .unwrap();

    let err = Config::load(dir.path()).unwrap().load_flows().unwrap_err();
    match err {
        Error::Syntax { source_name, errors } => {
            assert!(source_name.contains("bad.weft"));
            assert!(errors.iter().any(|e| e.message.contains("expected next token")));
        }
        other => panic!("Expected syntax error, got {other:?}"),
    }
}

#[test]
fn test_semantic_errors_surface_as_flow_errors() {
    let dir = setup_project("name: broken\n");
    std::fs::write(
        dir.path().join("flows/cycle.weft"),
        r#"flow "loop" { node "a" { to: b } node "b" { to: a } }"#,
    )
    .unwrap();

    let err = Config::load(dir.path()).unwrap().load_flows().unwrap_err();
    assert!(matches!(err, Error::Flow(FlowError::Cycle { .. })));
}
