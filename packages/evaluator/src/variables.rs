//! # Variable Resolution
//!
//! Variables are declared once and used many times: the first occurrence of
//! a name (with its `prompt`) is the definition, later occurrences are
//! references. Definitions are handed to a pluggable [`VariableResolver`]
//! (often backed by an LLM or the user); failures yield a `{{name}}`
//! placeholder instead of aborting the batch.

use async_trait::async_trait;
use futures::future::join_all;
use idyll_parser::{traverse_nodes, traverse_rich_content, IdyllDocument, Node, Props, RichContent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Node holding the first occurrence
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableConflict {
    pub name: String,
    pub error: String,
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableResolutionError {
    #[error("Variable '{name}' could not be resolved: {message}")]
    Failed { name: String, message: String },

    #[error("No value available for variable '{0}'")]
    NoValue(String),
}

impl VariableResolutionError {
    pub fn name(&self) -> &str {
        match self {
            VariableResolutionError::Failed { name, .. } | VariableResolutionError::NoValue(name) => name,
        }
    }
}

/// What a resolver may consult besides the definition itself
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pub document: Option<Arc<IdyllDocument>>,
    /// Host-supplied hints (user profile, conversation state, ...)
    pub extra: Props,
}

impl ResolutionContext {
    pub fn for_document(document: Arc<IdyllDocument>) -> Self {
        Self {
            document: Some(document),
            extra: Props::new(),
        }
    }
}

#[async_trait]
pub trait VariableResolver: Send + Sync {
    async fn resolve(
        &self,
        definition: &VariableDefinition,
        context: &ResolutionContext,
    ) -> Result<Value, VariableResolutionError>;
}

/// Resolver backed by a fixed table of values
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    values: BTreeMap<String, Value>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl VariableResolver for StaticResolver {
    async fn resolve(
        &self,
        definition: &VariableDefinition,
        _context: &ResolutionContext,
    ) -> Result<Value, VariableResolutionError> {
        self.values
            .get(&definition.name)
            .cloned()
            .ok_or_else(|| VariableResolutionError::NoValue(definition.name.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedVariables {
    pub variables: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<VariableResolutionError>,
}

/// Every variable occurrence in pre-order, with the id of its node
fn occurrences(nodes: &[Node]) -> impl Iterator<Item = (&str, &str, Option<&str>)> {
    traverse_nodes(nodes).flat_map(|node| {
        traverse_rich_content(node.rich_content()).filter_map(move |item| match item {
            RichContent::Variable(variable) => Some((
                node.id(),
                variable.name.as_str(),
                variable.prompt.as_deref().filter(|p| !p.trim().is_empty()),
            )),
            _ => None,
        })
    })
}

/// First-occurrence definitions, one per name
pub fn extract_variable_definitions(nodes: &[Node]) -> Vec<VariableDefinition> {
    let mut definitions: Vec<VariableDefinition> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for (node_id, name, prompt) in occurrences(nodes) {
        match index.get(name) {
            Some(&position) => {
                let definition = &mut definitions[position];
                if definition.prompt.is_none() {
                    definition.prompt = prompt.map(str::to_string);
                }
            }
            None => {
                index.insert(name, definitions.len());
                definitions.push(VariableDefinition {
                    name: name.to_string(),
                    prompt: prompt.map(str::to_string),
                    node_id: node_id.to_string(),
                });
            }
        }
    }

    definitions
}

/// Names reused with a different non-empty prompt; at most one entry per name
pub fn check_variable_redeclaration(nodes: &[Node]) -> Vec<VariableConflict> {
    let mut first_prompts: HashMap<&str, &str> = HashMap::new();
    let mut reported: HashSet<&str> = HashSet::new();
    let mut conflicts = Vec::new();

    for (node_id, name, prompt) in occurrences(nodes) {
        let Some(prompt) = prompt else {
            continue;
        };
        match first_prompts.get(name) {
            None => {
                first_prompts.insert(name, prompt);
            }
            Some(&first) if first != prompt && reported.insert(name) => {
                conflicts.push(VariableConflict {
                    name: name.to_string(),
                    error: format!(
                        "Variable '{name}' is redeclared in node '{node_id}' with prompt \"{prompt}\"; it was first declared with \"{first}\""
                    ),
                });
            }
            Some(_) => {}
        }
    }

    conflicts
}

/// Resolve all definitions concurrently. The result does not depend on the
/// order in which resolutions finish.
pub async fn resolve_variables(
    definitions: &[VariableDefinition],
    resolver: &dyn VariableResolver,
    context: &ResolutionContext,
) -> ResolvedVariables {
    let outcomes = join_all(
        definitions
            .iter()
            .map(|definition| async move { (definition, resolver.resolve(definition, context).await) }),
    )
    .await;

    let mut resolved = ResolvedVariables::default();
    for (definition, outcome) in outcomes {
        match outcome {
            Ok(value) => {
                resolved.variables.insert(definition.name.clone(), value);
            }
            Err(error) => {
                warn!(variable = %definition.name, error = %error, "Variable resolution failed");
                resolved
                    .variables
                    .insert(definition.name.clone(), Value::String(placeholder(&definition.name)));
                resolved.errors.push(error);
            }
        }
    }

    debug!(
        resolved = resolved.variables.len().saturating_sub(resolved.errors.len()),
        failed = resolved.errors.len(),
        "Variables resolved"
    );
    resolved
}

/// Deep copy with `resolved_value` set on every matching variable
pub fn apply_resolved_variables(nodes: &[Node], variables: &BTreeMap<String, Value>) -> Vec<Node> {
    let mut nodes = nodes.to_vec();
    for node in &mut nodes {
        apply_to_node(node, variables);
    }
    nodes
}

fn apply_to_node(node: &mut Node, variables: &BTreeMap<String, Value>) {
    apply_to_content(node.rich_content_mut(), variables);
    if let Some(children) = node.children_mut() {
        for child in children {
            apply_to_node(child, variables);
        }
    }
}

fn apply_to_content(content: &mut [RichContent], variables: &BTreeMap<String, Value>) {
    for item in content {
        if let RichContent::Variable(variable) = item {
            if let Some(value) = variables.get(&variable.name) {
                variable.resolved_value = Some(value.clone());
            }
        } else if let Some(nested) = item.nested_mut() {
            apply_to_content(nested, variables);
        }
    }
}

pub fn placeholder(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

/// Flatten rich content to plain text. A variable renders as its value in
/// `variables`, else its own resolved value, else `{{name}}`.
pub fn interpolate_content(content: &[RichContent], variables: &BTreeMap<String, Value>) -> String {
    let mut out = String::new();
    write_content(content, Some(variables), &mut out);
    out
}

/// Flatten rich content with every variable left as `{{name}}`
pub fn content_to_text(content: &[RichContent]) -> String {
    let mut out = String::new();
    write_content(content, None, &mut out);
    out
}

fn write_content(content: &[RichContent], variables: Option<&BTreeMap<String, Value>>, out: &mut String) {
    for item in content {
        match item {
            RichContent::Text(text) => out.push_str(&text.text),
            RichContent::Variable(variable) => {
                let value = variables.and_then(|vars| vars.get(&variable.name).or(variable.resolved_value.as_ref()));
                match value {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => out.push_str(&placeholder(&variable.name)),
                }
            }
            RichContent::Mention(mention) => {
                out.push('@');
                out.push_str(&mention.label);
            }
            RichContent::Link(link) => write_content(&link.content, variables, out),
            RichContent::Annotation(annotation) => write_content(&annotation.content, variables, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idyll_parser::{parse_document, ContentNode};
    use serde_json::json;

    fn doc(source: &str) -> Vec<Node> {
        parse_document(source).unwrap().nodes
    }

    #[test]
    fn test_extract_dedupes_in_first_occurrence_order() {
        let nodes = doc(
            r#"<document id="d">
                <p id="a"><variable name="city"/> and <variable name="date" prompt="When?"/></p>
                <ul id="l"><li id="i"><variable name="city" prompt="Which city?"/></li></ul>
            </document>"#,
        );

        let definitions = extract_variable_definitions(&nodes);

        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].name, "city");
        assert_eq!(definitions[0].prompt.as_deref(), Some("Which city?"));
        assert_eq!(definitions[0].node_id, "a");
        assert_eq!(definitions[1].name, "date");
    }

    #[test]
    fn test_redeclaration_reported_once() {
        let nodes = doc(
            r#"<document id="d">
                <p id="a"><variable name="x" prompt="First?"/></p>
                <p id="b"><variable name="x" prompt="Second?"/> <variable name="x" prompt="Third?"/></p>
                <p id="c"><variable name="x"/><variable name="y" prompt="Same"/><variable name="y" prompt="Same"/></p>
            </document>"#,
        );

        let conflicts = check_variable_redeclaration(&nodes);

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].name, "x");
        assert!(conflicts[0].error.contains("Second?"));
    }

    #[test]
    fn test_variables_inside_executable_instructions() {
        let nodes = doc(
            r#"<document id="d"><fncall id="f" idyll-fn="go"><content>Visit <link href="x"><variable name="place"/></link></content></fncall></document>"#,
        );
        let definitions = extract_variable_definitions(&nodes);
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].node_id, "f");
    }

    #[tokio::test]
    async fn test_resolve_with_placeholders() {
        let definitions = vec![
            VariableDefinition {
                name: "known".to_string(),
                prompt: None,
                node_id: "a".to_string(),
            },
            VariableDefinition {
                name: "unknown".to_string(),
                prompt: Some("?".to_string()),
                node_id: "a".to_string(),
            },
        ];
        let resolver = StaticResolver::new().with_value("known", 42);

        let resolved = resolve_variables(&definitions, &resolver, &ResolutionContext::default()).await;

        assert_eq!(resolved.variables["known"], json!(42));
        assert_eq!(resolved.variables["unknown"], json!("{{unknown}}"));
        assert_eq!(resolved.errors, vec![VariableResolutionError::NoValue("unknown".to_string())]);
    }

    #[test]
    fn test_apply_resolved_variables_is_a_copy() {
        let nodes = vec![ContentNode::new("p", "paragraph")
            .with_content(vec![RichContent::variable("name", None)])
            .into()];
        let variables = BTreeMap::from([("name".to_string(), json!("Ada"))]);

        let applied = apply_resolved_variables(&nodes, &variables);

        assert!(matches!(
            &applied[0].rich_content()[0],
            RichContent::Variable(v) if v.resolved_value == Some(json!("Ada"))
        ));
        assert!(matches!(
            &nodes[0].rich_content()[0],
            RichContent::Variable(v) if v.resolved_value.is_none()
        ));
    }

    #[test]
    fn test_interpolate_content() {
        let content = vec![
            RichContent::text("Hello "),
            RichContent::variable("name", None),
            RichContent::text(", you owe "),
            RichContent::variable("amount", None),
            RichContent::text(" "),
            RichContent::variable("missing", None),
        ];
        let variables = BTreeMap::from([("name".to_string(), json!("Ada")), ("amount".to_string(), json!(12.5))]);

        assert_eq!(interpolate_content(&content, &variables), "Hello Ada, you owe 12.5 {{missing}}");
        assert_eq!(content_to_text(&content), "Hello {{name}}, you owe {{amount}} {{missing}}");
    }
}
