//! # Document Executor
//!
//! Runs the executable nodes of a document (function calls and triggers)
//! strictly one after another, in document pre-order.
//!
//! ## Run Lifecycle
//!
//! ```text
//! Idle ──execute()──► Running(1 of n) ──► ... ──► Running(n of n) ──► Completed
//!                          │
//!                          └── failure + stop_on_error ──► Completed (stopped early)
//! ```
//!
//! Each node sees a snapshot of every result recorded before it, so later
//! nodes can build on earlier output. Per-node failures never abort the run
//! with an `Err`; they are recorded as data in the [`ExecutionReport`] with a
//! stable [`ErrorCode`]. Only a malformed request (unknown node id, node that
//! is not executable) surfaces as an [`ExecutorError`].
//!
//! ## Timeouts
//!
//! A function call runs in its own tokio task raced against the configured
//! node timeout. When the timeout wins the task is aborted; the function is
//! cancelled at its next await point.

use crate::config::{ConfigError, ExecutorConfig};
use crate::registry::FunctionRegistry;
use crate::variables::{content_to_text, interpolate_content};
use chrono::{DateTime, Utc};
use idyll_parser::{find_node, traverse_nodes, ExecutableNode, IdyllDocument, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node '{0}' is not executable")]
    NotExecutable(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Stable failure codes recorded on node results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    FunctionNotFound,
    ParameterValidationError,
    ExecutionTimeout,
    ExecutionError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FunctionNotFound => "FUNCTION_NOT_FOUND",
            ErrorCode::ParameterValidationError => "PARAMETER_VALIDATION_ERROR",
            ErrorCode::ExecutionTimeout => "EXECUTION_TIMEOUT",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionError {
    pub message: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl NodeExecutionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeExecutionError>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl NodeExecutionResult {
    pub fn succeeded(value: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: NodeExecutionError, duration_ms: u64) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error),
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// What a function sees about the run it is part of
#[derive(Debug, Clone)]
pub struct NodeExecutionContext {
    pub current_node_id: String,
    /// Results recorded before this node, keyed by node id
    pub previous_results: BTreeMap<String, NodeExecutionResult>,
    pub document: Arc<IdyllDocument>,
}

impl NodeExecutionContext {
    /// Value produced by an earlier successful node
    pub fn previous_value(&self, node_id: &str) -> Option<&Value> {
        self.previous_results.get(node_id).and_then(|r| r.value.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionRequest {
    /// Every enabled executable node, in document order
    Document,

    /// One node, with results of earlier nodes supplied by the caller
    Single {
        node_id: String,
        previous_results: BTreeMap<String, NodeExecutionResult>,
    },
}

impl ExecutionRequest {
    pub fn single(node_id: impl Into<String>) -> Self {
        ExecutionRequest::Single {
            node_id: node_id.into(),
            previous_results: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            ExecutionRequest::Document => ExecutionMode::Document,
            ExecutionRequest::Single { .. } => ExecutionMode::Single,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Document,
    Single,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub mode: ExecutionMode,
    /// Ids of the nodes that ran, in execution order
    pub order: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stopped_early: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub nodes: BTreeMap<String, NodeExecutionResult>,
    pub metadata: ExecutionMetadata,
}

impl ExecutionReport {
    pub fn result(&self, node_id: &str) -> Option<&NodeExecutionResult> {
        self.nodes.get(node_id)
    }

    pub fn is_success(&self) -> bool {
        self.metadata.failed == 0
    }
}

/// Observer callbacks around each node. Invoked synchronously on the
/// executor's task; they see results but cannot change them.
pub trait ExecutionHooks: Send + Sync {
    fn before_execution(&self, _node: &ExecutableNode, _context: &NodeExecutionContext) {}

    fn after_execution(&self, _node: &ExecutableNode, _result: &NodeExecutionResult) {}

    fn on_error(&self, _node: &ExecutableNode, _error: &NodeExecutionError) {}
}

pub struct DocumentExecutor {
    registry: Arc<FunctionRegistry>,
    config: ExecutorConfig,
    hooks: Option<Arc<dyn ExecutionHooks>>,
    variables: BTreeMap<String, Value>,
}

impl DocumentExecutor {
    pub fn new(registry: impl Into<Arc<FunctionRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            config: ExecutorConfig::default(),
            hooks: None,
            variables: BTreeMap::new(),
        }
    }

    /// Replace the configuration; rejects configs that fail validation
    pub fn with_config(mut self, config: ExecutorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ExecutionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Values substituted for variables when flattening instructions
    pub fn with_variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    #[instrument(skip(self, document, request), fields(document_id = %document.id, mode = ?request.mode()))]
    pub async fn execute(&self, document: &IdyllDocument, request: ExecutionRequest) -> ExecutorResult<ExecutionReport> {
        let mode = request.mode();
        let (targets, mut results) = match request {
            ExecutionRequest::Document => (executable_nodes(&document.nodes), BTreeMap::new()),
            ExecutionRequest::Single {
                node_id,
                previous_results,
            } => {
                let node = match find_node(&document.nodes, &node_id) {
                    Some(Node::Executable(node)) => node,
                    Some(Node::Content(_)) => return Err(ExecutorError::NotExecutable(node_id)),
                    None => return Err(ExecutorError::NodeNotFound(node_id)),
                };
                let preceding = preceding_executable_ids(&document.nodes, &node_id);
                let previous = previous_results
                    .into_iter()
                    .filter(|(id, _)| preceding.contains(id.as_str()))
                    .collect();
                (vec![node], previous)
            }
        };

        info!(nodes = targets.len(), "Starting execution");

        let shared = Arc::new(document.clone());
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut report = BTreeMap::new();
        let mut order = Vec::new();
        let (mut succeeded, mut failed, mut skipped) = (0, 0, 0);
        let mut stopped_early = false;

        for (position, node) in targets.iter().enumerate() {
            if !node.is_enabled() {
                debug!(node_id = %node.id, "Skipping disabled node");
                skipped += 1;
                continue;
            }

            let context = NodeExecutionContext {
                current_node_id: node.id.clone(),
                previous_results: results.clone(),
                document: Arc::clone(&shared),
            };
            let result = self.execute_node(node, context).await;

            order.push(node.id.clone());
            let node_failed = !result.success;
            if node_failed {
                failed += 1;
            } else {
                succeeded += 1;
            }
            results.insert(node.id.clone(), result.clone());
            report.insert(node.id.clone(), result);

            if node_failed && self.config.stop_on_error {
                let remaining = targets[position + 1..].iter().filter(|n| n.is_enabled()).count();
                stopped_early = remaining > 0;
                if stopped_early {
                    warn!(node_id = %node.id, remaining, "Stopping after failed node");
                }
                break;
            }
        }

        let metadata = ExecutionMetadata {
            mode,
            order,
            started_at,
            completed_at: Utc::now(),
            duration_ms: elapsed_ms(clock),
            total: targets.len(),
            succeeded,
            failed,
            skipped,
            stopped_early,
        };

        info!(
            succeeded = metadata.succeeded,
            failed = metadata.failed,
            skipped = metadata.skipped,
            duration_ms = metadata.duration_ms,
            "Execution complete"
        );

        Ok(ExecutionReport { nodes: report, metadata })
    }

    pub async fn execute_document(&self, document: &IdyllDocument) -> ExecutorResult<ExecutionReport> {
        self.execute(document, ExecutionRequest::Document).await
    }

    async fn execute_node(&self, node: &ExecutableNode, context: NodeExecutionContext) -> NodeExecutionResult {
        if let Some(hooks) = &self.hooks {
            hooks.before_execution(node, &context);
        }

        let clock = Instant::now();
        let result = match self.invoke(node, context).await {
            Ok(value) => NodeExecutionResult::succeeded(value, elapsed_ms(clock)),
            Err(error) => {
                warn!(node_id = %node.id, function = %node.fn_name, code = %error.code, "{}", error.message);
                if let Some(hooks) = &self.hooks {
                    hooks.on_error(node, &error);
                }
                NodeExecutionResult::failed(error, elapsed_ms(clock))
            }
        };

        debug!(node_id = %node.id, success = result.success, duration_ms = result.duration_ms, "Node executed");

        if let Some(hooks) = &self.hooks {
            hooks.after_execution(node, &result);
        }
        result
    }

    async fn invoke(&self, node: &ExecutableNode, context: NodeExecutionContext) -> Result<Value, NodeExecutionError> {
        let function = self.registry.get(&node.fn_name).ok_or_else(|| {
            NodeExecutionError::new(
                ErrorCode::FunctionNotFound,
                format!("Function '{}' is not registered", node.fn_name),
            )
        })?;

        function.schema.validate(&node.parameters).map_err(|errors| {
            NodeExecutionError::new(
                ErrorCode::ParameterValidationError,
                format!("Invalid parameters for '{}'", node.fn_name),
            )
            .with_details(Value::from(errors))
        })?;

        let content = if self.config.interpolate_variables {
            interpolate_content(&node.instructions, &self.variables)
        } else {
            content_to_text(&node.instructions)
        };

        let executor = Arc::clone(&function.executor);
        let params = node.parameters.clone();
        let task = tokio::spawn(async move { executor.execute(params, content, context).await });
        let abort = task.abort_handle();
        let timeout = self.config.node_timeout();

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(error))) => Err(NodeExecutionError::new(ErrorCode::ExecutionError, format!("{error:#}"))),
            Ok(Err(join_error)) => Err(NodeExecutionError::new(
                ErrorCode::ExecutionError,
                if join_error.is_panic() {
                    format!("Function '{}' panicked", node.fn_name)
                } else {
                    format!("Function '{}' was cancelled", node.fn_name)
                },
            )),
            Err(_) => {
                abort.abort();
                Err(NodeExecutionError::new(
                    ErrorCode::ExecutionTimeout,
                    format!("Function '{}' timed out after {}ms", node.fn_name, timeout.as_millis()),
                ))
            }
        }
    }
}

/// Executable nodes in pre-order, disabled ones included
fn executable_nodes(nodes: &[Node]) -> Vec<&ExecutableNode> {
    traverse_nodes(nodes).filter_map(Node::as_executable).collect()
}

fn preceding_executable_ids<'a>(nodes: &'a [Node], node_id: &str) -> HashSet<&'a str> {
    executable_nodes(nodes)
        .into_iter()
        .map(|node| node.id.as_str())
        .take_while(|id| *id != node_id)
        .collect()
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegisteredFunction;
    use idyll_parser::parse_document;
    use serde_json::json;

    fn registry() -> FunctionRegistry {
        FunctionRegistry::new()
            .with_function(
                "echo",
                RegisteredFunction::from_fn(|params, content, _context| async move {
                    Ok(json!({ "params": params, "content": content }))
                }),
            )
            .unwrap()
    }

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(serde_json::to_value(ErrorCode::ExecutionTimeout).unwrap(), json!("EXECUTION_TIMEOUT"));
        assert_eq!(ErrorCode::ParameterValidationError.to_string(), "PARAMETER_VALIDATION_ERROR");
    }

    #[test]
    fn test_preceding_ids_stop_at_target() {
        let doc = parse_document(
            r#"<document id="d">
                <fncall id="a" idyll-fn="echo"/>
                <p id="p">text</p>
                <fncall id="b" idyll-fn="echo"/>
                <fncall id="c" idyll-fn="echo"/>
            </document>"#,
        )
        .unwrap();

        let ids = preceding_executable_ids(&doc.nodes, "c");
        assert_eq!(ids, HashSet::from(["a", "b"]));
    }

    #[tokio::test]
    async fn test_single_mode_rejects_unknown_and_content_nodes() {
        let doc = parse_document(r#"<document id="d"><p id="p">text</p></document>"#).unwrap();
        let executor = DocumentExecutor::new(registry());

        assert_eq!(
            executor.execute(&doc, ExecutionRequest::single("nope")).await.unwrap_err(),
            ExecutorError::NodeNotFound("nope".to_string())
        );
        assert_eq!(
            executor.execute(&doc, ExecutionRequest::single("p")).await.unwrap_err(),
            ExecutorError::NotExecutable("p".to_string())
        );
    }

    #[tokio::test]
    async fn test_instructions_passed_as_text() {
        let doc = parse_document(
            r#"<document id="d"><fncall id="f" idyll-fn="echo"><params><![CDATA[{"q": 1}]]></params><content>Find <b>it</b></content></fncall></document>"#,
        )
        .unwrap();

        let report = DocumentExecutor::new(registry()).execute_document(&doc).await.unwrap();

        let value = report.result("f").unwrap().value.as_ref().unwrap();
        assert_eq!(value["content"], json!("Find it"));
        assert_eq!(value["params"]["q"], json!(1));
    }
}
