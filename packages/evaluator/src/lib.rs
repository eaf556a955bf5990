//! # Idyll Evaluator
//!
//! Runs the executable parts of an Idyll document.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌────────────────────┐   ┌──────────────────┐
//! │ IdyllDocument │──►│ DocumentExecutor   │──►│ ExecutionReport  │
//! └───────────────┘   │ sequential,        │   │ per-node results │
//!                     │ per-node timeout   │   │ + run metadata   │
//!                     └─────────┬──────────┘   └──────────────────┘
//!                               │ fn name
//!                     ┌─────────▼──────────┐
//!                     │ FunctionRegistry   │  host-supplied async functions,
//!                     │ + ParameterSchema  │  parameters checked by JSON Schema
//!                     └────────────────────┘
//! ```
//!
//! Variables are resolved separately (see [`variables`]) and handed to the
//! executor, which substitutes them into instructions before each call.
//!
//! ## Example
//!
//! ```no_run
//! use idyll_evaluator::{DocumentExecutor, FunctionRegistry, RegisteredFunction};
//! use serde_json::json;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let registry = FunctionRegistry::new().with_function(
//!     "demo:greet",
//!     RegisteredFunction::from_fn(|_params, content, _ctx| async move { Ok(json!(content)) }),
//! )?;
//!
//! let doc = idyll_parser::parse_document(
//!     r#"<document id="d"><fncall id="g" idyll-fn="demo:greet"><content>Hi</content></fncall></document>"#,
//! )?;
//! let report = DocumentExecutor::new(registry).execute_document(&doc).await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod registry;
pub mod variables;

pub use config::{ConfigError, ExecutorConfig, DEFAULT_CONFIG_NAME};
pub use executor::{
    DocumentExecutor, ErrorCode, ExecutionHooks, ExecutionMetadata, ExecutionMode, ExecutionReport, ExecutionRequest,
    ExecutorError, ExecutorResult, NodeExecutionContext, NodeExecutionError, NodeExecutionResult,
};
pub use registry::{FnExecutor, FunctionExecutor, FunctionRegistry, ParameterSchema, RegisteredFunction, RegistryError};
pub use variables::{
    apply_resolved_variables, check_variable_redeclaration, content_to_text, extract_variable_definitions,
    interpolate_content, resolve_variables, ResolutionContext, ResolvedVariables, StaticResolver, VariableConflict,
    VariableDefinition, VariableResolutionError, VariableResolver,
};
