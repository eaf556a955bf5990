//! End-to-end executor runs over parsed documents

use idyll_evaluator::{
    ConfigError, DocumentExecutor, ErrorCode, ExecutionHooks, ExecutionMode, ExecutionRequest, ExecutorConfig,
    FunctionRegistry, NodeExecutionContext, NodeExecutionError, NodeExecutionResult, ParameterSchema,
    RegisteredFunction,
};
use idyll_parser::{parse_document, ExecutableNode, IdyllDocument};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn doc(source: &str) -> IdyllDocument {
    parse_document(source).expect("document should parse")
}

/// Returns how many previous results the function could see
fn counting() -> RegisteredFunction {
    RegisteredFunction::from_fn(|_params, _content, context: NodeExecutionContext| async move {
        Ok(json!(context.previous_results.len()))
    })
}

fn failing() -> RegisteredFunction {
    RegisteredFunction::from_fn(|_params, _content, _context| async move {
        Err::<Value, _>(anyhow::anyhow!("upstream unavailable"))
    })
}

fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register("count", counting()).unwrap();
    registry.register("fail", failing()).unwrap();
    registry
        .register(
            "never",
            RegisteredFunction::from_fn(|_params, _content, _context| async move {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }),
        )
        .unwrap();
    registry
        .register(
            "echo",
            RegisteredFunction::from_fn(|_params, content, _context| async move { Ok(json!(content)) }),
        )
        .unwrap();
    registry
        .register(
            "web:search",
            RegisteredFunction::from_fn(|params, _content, _context| async move { Ok(Value::Object(params)) })
                .with_schema(
                    ParameterSchema::new(json!({
                        "type": "object",
                        "properties": { "query": { "type": "string" } },
                        "required": ["query"]
                    }))
                    .unwrap(),
                ),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_sequential_context_chaining() {
    init_tracing();
    let document = doc(r#"<document id="d">
        <fncall id="first" idyll-fn="count"/>
        <p id="between">Some prose</p>
        <ul id="list"><li id="item"><fncall id="second" idyll-fn="count"/></li></ul>
        <trigger id="third" idyll-trigger="count"/>
    </document>"#);

    let report = DocumentExecutor::new(registry()).execute_document(&document).await.unwrap();

    assert_eq!(report.metadata.order, vec!["first", "second", "third"]);
    assert_eq!(report.result("first").unwrap().value, Some(json!(0)));
    assert_eq!(report.result("second").unwrap().value, Some(json!(1)));
    assert_eq!(report.result("third").unwrap().value, Some(json!(2)));
    assert_eq!(report.metadata.succeeded, 3);
    assert!(report.is_success());

    println!("✓ Each node sees the results of the nodes before it");
}

#[tokio::test]
async fn test_timeout_records_failure() {
    let document = doc(r#"<document id="d"><fncall id="slow" idyll-fn="never"/></document>"#);
    let executor = DocumentExecutor::new(registry())
        .with_config(ExecutorConfig::default().with_node_timeout_ms(50))
        .unwrap();

    let started = std::time::Instant::now();
    let report = executor.execute_document(&document).await.unwrap();

    let result = report.result("slow").unwrap();
    assert!(!result.success);
    assert_eq!(result.error_code(), Some(ErrorCode::ExecutionTimeout));
    assert!(result.duration_ms >= 50, "duration was {}ms", result.duration_ms);
    assert!(started.elapsed() < Duration::from_secs(5));

    println!("✓ Hanging function times out after {}ms", result.duration_ms);
}

#[tokio::test]
async fn test_function_not_found() {
    let document = doc(r#"<document id="d"><fncall id="f" idyll-fn="missing:fn"/></document>"#);

    let report = DocumentExecutor::new(registry()).execute_document(&document).await.unwrap();

    let error = report.result("f").unwrap().error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::FunctionNotFound);
    assert!(error.message.contains("missing:fn"));
}

#[tokio::test]
async fn test_parameter_validation() {
    let document = doc(r#"<document id="d">
        <fncall id="bad" idyll-fn="web:search"><params><![CDATA[{"query": 7}]]></params></fncall>
        <fncall id="good" idyll-fn="web:search"><params><![CDATA[{"query": "rust"}]]></params></fncall>
    </document>"#);

    let report = DocumentExecutor::new(registry()).execute_document(&document).await.unwrap();

    let bad = report.result("bad").unwrap();
    let error = bad.error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::ParameterValidationError);
    assert!(matches!(&error.details, Some(Value::Array(details)) if details.len() == 1));

    let good = report.result("good").unwrap();
    assert_eq!(good.value, Some(json!({ "query": "rust" })));
    assert_eq!(report.metadata.failed, 1);
}

#[tokio::test]
async fn test_execution_error_message() {
    let document = doc(r#"<document id="d"><fncall id="f" idyll-fn="fail"/></document>"#);

    let report = DocumentExecutor::new(registry()).execute_document(&document).await.unwrap();

    let error = report.result("f").unwrap().error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::ExecutionError);
    assert_eq!(error.message, "upstream unavailable");
}

#[tokio::test]
async fn test_stop_on_error() {
    let document = doc(r#"<document id="d">
        <fncall id="a" idyll-fn="count"/>
        <fncall id="b" idyll-fn="fail"/>
        <fncall id="c" idyll-fn="count"/>
    </document>"#);

    let keep_going = DocumentExecutor::new(registry()).execute_document(&document).await.unwrap();
    assert_eq!(keep_going.metadata.order.len(), 3);
    assert!(!keep_going.metadata.stopped_early);
    // failed results are still visible to later nodes
    assert_eq!(keep_going.result("c").unwrap().value, Some(json!(2)));

    let stopping = DocumentExecutor::new(registry())
        .with_config(ExecutorConfig::default().with_stop_on_error(true))
        .unwrap()
        .execute_document(&document)
        .await
        .unwrap();
    assert_eq!(stopping.metadata.order, vec!["a", "b"]);
    assert!(stopping.metadata.stopped_early);
    assert!(stopping.result("c").is_none());
}

#[tokio::test]
async fn test_stop_on_error_with_only_disabled_nodes_left() {
    let document = doc(r#"<document id="d">
        <fncall id="a" idyll-fn="fail"/>
        <trigger id="off" idyll-trigger="count" enabled="false"/>
    </document>"#);

    let report = DocumentExecutor::new(registry())
        .with_config(ExecutorConfig::default().with_stop_on_error(true))
        .unwrap()
        .execute_document(&document)
        .await
        .unwrap();

    assert_eq!(report.metadata.order, vec!["a"]);
    assert!(!report.metadata.stopped_early);
}

#[test]
fn test_zero_timeout_config_rejected() {
    let result = DocumentExecutor::new(registry()).with_config(ExecutorConfig::default().with_node_timeout_ms(0));
    assert!(matches!(result, Err(ConfigError::ZeroTimeout)));
}

#[tokio::test]
async fn test_disabled_nodes_skipped() {
    let document = doc(r#"<document id="d">
        <trigger id="off" idyll-trigger="count" enabled="false"/>
        <fncall id="on" idyll-fn="count"/>
    </document>"#);

    let report = DocumentExecutor::new(registry()).execute_document(&document).await.unwrap();

    assert_eq!(report.metadata.total, 2);
    assert_eq!(report.metadata.skipped, 1);
    assert!(report.result("off").is_none());
    assert_eq!(report.result("on").unwrap().value, Some(json!(0)));
}

#[tokio::test]
async fn test_single_mode_uses_only_preceding_results() {
    let document = doc(r#"<document id="d">
        <fncall id="a" idyll-fn="count"/>
        <fncall id="b" idyll-fn="count"/>
        <fncall id="c" idyll-fn="count"/>
    </document>"#);

    let supplied = |value: Value| NodeExecutionResult::succeeded(value, 1);
    let previous_results = BTreeMap::from([
        ("a".to_string(), supplied(json!("from a"))),
        ("c".to_string(), supplied(json!("from c"))),
        ("elsewhere".to_string(), supplied(json!("stale"))),
    ]);

    let report = DocumentExecutor::new(registry())
        .execute(
            &document,
            ExecutionRequest::Single {
                node_id: "b".to_string(),
                previous_results,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.metadata.mode, ExecutionMode::Single);
    assert_eq!(report.nodes.len(), 1);
    assert_eq!(report.result("b").unwrap().value, Some(json!(1)));
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ExecutionHooks for Recorder {
    fn before_execution(&self, node: &ExecutableNode, _context: &NodeExecutionContext) {
        self.events.lock().unwrap().push(format!("before:{}", node.id));
    }

    fn after_execution(&self, node: &ExecutableNode, result: &NodeExecutionResult) {
        self.events
            .lock()
            .unwrap()
            .push(format!("after:{}:{}", node.id, result.success));
    }

    fn on_error(&self, node: &ExecutableNode, error: &NodeExecutionError) {
        self.events.lock().unwrap().push(format!("error:{}:{}", node.id, error.code));
    }
}

#[tokio::test]
async fn test_hooks_observe_every_node() {
    let document = doc(r#"<document id="d">
        <fncall id="a" idyll-fn="count"/>
        <fncall id="b" idyll-fn="fail"/>
    </document>"#);
    let recorder = Arc::new(Recorder::default());

    DocumentExecutor::new(registry())
        .with_hooks(recorder.clone())
        .execute_document(&document)
        .await
        .unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "before:a",
            "after:a:true",
            "before:b",
            "error:b:EXECUTION_ERROR",
            "after:b:false",
        ]
    );
}

#[tokio::test]
async fn test_variables_interpolated_into_instructions() {
    let document = doc(r#"<document id="d">
        <fncall id="f" idyll-fn="echo"><content>Weather in <variable name="city" prompt="Which city?"/> for <variable name="days"/> days</content></fncall>
    </document>"#);
    let variables = BTreeMap::from([("city".to_string(), json!("Lisbon")), ("days".to_string(), json!(3))]);

    let interpolated = DocumentExecutor::new(registry())
        .with_variables(variables.clone())
        .execute_document(&document)
        .await
        .unwrap();
    assert_eq!(interpolated.result("f").unwrap().value, Some(json!("Weather in Lisbon for 3 days")));

    let raw = DocumentExecutor::new(registry())
        .with_variables(variables)
        .with_config(ExecutorConfig::default().with_interpolate_variables(false))
        .unwrap()
        .execute_document(&document)
        .await
        .unwrap();
    assert_eq!(raw.result("f").unwrap().value, Some(json!("Weather in {{city}} for {{days}} days")));
}

#[tokio::test]
async fn test_report_serializes_camel_case() {
    let document = doc(r#"<document id="d"><fncall id="f" idyll-fn="missing"/></document>"#);

    let report = DocumentExecutor::new(registry()).execute_document(&document).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["nodes"]["f"]["error"]["code"], json!("FUNCTION_NOT_FOUND"));
    assert!(json["nodes"]["f"]["durationMs"].is_u64());
    assert_eq!(json["metadata"]["stoppedEarly"], json!(false));
    assert_eq!(json["metadata"]["mode"], json!("document"));
}
