//! Function registry: the callables executable nodes refer to by name.
//!
//! The engine never performs I/O itself. Hosts register functions here, each
//! with a JSON Schema for its parameters; the executor validates parameters
//! against that schema before calling the function.

use crate::executor::NodeExecutionContext;
use async_trait::async_trait;
use idyll_parser::{is_valid_function_name, Props};
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Invalid function name '{0}': expected (module:)?name")]
    InvalidName(String),

    #[error("Function '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Invalid parameter schema: {0}")]
    InvalidSchema(String),
}

/// Async implementation of a registered function
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    /// `content` is the node's instructions flattened to text
    async fn execute(&self, params: Props, content: String, context: NodeExecutionContext) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`FunctionExecutor`]
pub struct FnExecutor<F>(pub F);

#[async_trait]
impl<F, Fut> FunctionExecutor for FnExecutor<F>
where
    F: Fn(Props, String, NodeExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn execute(&self, params: Props, content: String, context: NodeExecutionContext) -> anyhow::Result<Value> {
        (self.0)(params, content, context).await
    }
}

/// Compiled JSON Schema for a function's parameters
#[derive(Clone)]
pub struct ParameterSchema {
    schema: Value,
    validator: Option<Arc<Validator>>,
}

impl ParameterSchema {
    /// Compile `schema`; fails if it is not a valid JSON Schema
    pub fn new(schema: Value) -> Result<Self, RegistryError> {
        let validator = jsonschema::validator_for(&schema).map_err(|e| RegistryError::InvalidSchema(e.to_string()))?;
        Ok(Self {
            schema,
            validator: Some(Arc::new(validator)),
        })
    }

    /// Accepts any parameter map
    pub fn any() -> Self {
        Self {
            schema: Value::Bool(true),
            validator: None,
        }
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Check parameters, collecting every violation
    pub fn validate(&self, params: &Props) -> Result<(), Vec<String>> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };

        let instance = Value::Object(params.clone());
        if validator.is_valid(&instance) {
            return Ok(());
        }
        Err(validator.iter_errors(&instance).map(|e| e.to_string()).collect())
    }
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Debug for ParameterSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSchema").field("schema", &self.schema).finish()
    }
}

#[derive(Clone)]
pub struct RegisteredFunction {
    pub schema: ParameterSchema,
    pub description: Option<String>,
    pub executor: Arc<dyn FunctionExecutor>,
}

impl RegisteredFunction {
    pub fn new(executor: impl FunctionExecutor + 'static) -> Self {
        Self {
            schema: ParameterSchema::any(),
            description: None,
            executor: Arc::new(executor),
        }
    }

    /// Register an async closure
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Props, String, NodeExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(FnExecutor(f))
    }

    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("schema", &self.schema)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Name → function table. Names follow the `(module:)?name` grammar.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RegisteredFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, function: RegisteredFunction) -> Result<(), RegistryError> {
        let name = name.into();
        if !is_valid_function_name(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.functions.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }

        debug!(function = %name, "Registering function");
        self.functions.insert(name, function);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_function(mut self, name: impl Into<String>, function: RegisteredFunction) -> Result<Self, RegistryError> {
        self.register(name, function)?;
        Ok(self)
    }

    pub fn unregister(&mut self, name: &str) -> Option<RegisteredFunction> {
        self.functions.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> RegisteredFunction {
        RegisteredFunction::from_fn(|params, _content, _context| async move { Ok(Value::Object(params)) })
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = FunctionRegistry::new();
        registry.register("tools:echo", echo().with_description("Echo")).unwrap();
        registry.register("ping", echo()).unwrap();

        assert_eq!(registry.names(), vec!["ping", "tools:echo"]);
        assert_eq!(registry.get("tools:echo").unwrap().description.as_deref(), Some("Echo"));
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn test_register_rejects_bad_names_and_duplicates() {
        let mut registry = FunctionRegistry::new();
        assert_eq!(
            registry.register("bad name", echo()).unwrap_err(),
            RegistryError::InvalidName("bad name".to_string())
        );

        registry.register("echo", echo()).unwrap();
        assert!(matches!(registry.register("echo", echo()), Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn test_schema_validation() {
        let schema = ParameterSchema::new(json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        }))
        .unwrap();

        let mut params = Props::new();
        assert!(schema.validate(&params).is_err());

        params.insert("query".to_string(), json!("rust"));
        assert!(schema.validate(&params).is_ok());

        params.insert("query".to_string(), json!(42));
        assert_eq!(schema.validate(&params).unwrap_err().len(), 1);
    }

    #[test]
    fn test_invalid_schema_rejected() {
        assert!(matches!(
            ParameterSchema::new(json!({ "type": "not-a-type" })),
            Err(RegistryError::InvalidSchema(_))
        ));
    }
}
