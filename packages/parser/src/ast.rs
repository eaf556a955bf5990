use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::operations::EditOperation;

/// Open attribute/parameter map. Backed by a `BTreeMap`, so iteration order
/// is stable and serialization is deterministic.
pub type Props = Map<String, Value>;

/// Canonical order for text styles. Style lists are kept deduplicated and
/// sorted by this order so equal formatting always compares equal.
pub const STYLE_ORDER: [&str; 5] = ["bold", "italic", "underline", "strikethrough", "code"];

/// Sort and deduplicate a style list into canonical order. Unknown styles
/// sort after the known ones, alphabetically.
pub fn canonicalize_styles<I, S>(styles: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut styles: Vec<String> = styles.into_iter().map(Into::into).collect();
    styles.sort_by(|a, b| {
        let rank = |s: &str| STYLE_ORDER.iter().position(|known| *known == s).unwrap_or(STYLE_ORDER.len());
        rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
    });
    styles.dedup();
    styles
}

/// A single entry in the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Function call or trigger
    Executable(ExecutableNode),

    /// Paragraphs, headings, lists, definition blocks
    Content(ContentNode),
}

/// Rich-text block, optionally a container of further nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Props,
    #[serde(default)]
    pub content: Vec<RichContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutableKind {
    FunctionCall,
    Trigger,
}

impl ExecutableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutableKind::FunctionCall => "function_call",
            ExecutableKind::Trigger => "trigger",
        }
    }
}

/// Node invoking a registered function with parameters and instructions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ExecutableKind,
    #[serde(rename = "fn")]
    pub fn_name: String,
    #[serde(default)]
    pub parameters: Props,
    #[serde(default)]
    pub instructions: Vec<RichContent>,
    #[serde(default)]
    pub metadata: ExecutableMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableMetadata {
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Props,
}

impl Default for ExecutableMetadata {
    fn default() -> Self {
        Self {
            enabled: true,
            extra: Props::new(),
        }
    }
}

/// Inline content unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichContent {
    Text(TextContent),
    Variable(VariableElement),
    Mention(MentionElement),
    Link(LinkElement),
    Annotation(AnnotationElement),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableElement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionElement {
    pub mention_type: String,
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkElement {
    pub href: String,
    #[serde(default)]
    pub content: Vec<RichContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub content: Vec<RichContent>,
}

/// Root document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdyllDocument {
    pub id: String,
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Props>,
}

/// Document describing an agent: regular nodes plus agent identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDocument {
    #[serde(flatten)]
    pub document: IdyllDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Ordered list of edits targeting some other document. Not executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_document: Option<String>,
    pub operations: Vec<EditOperation>,
}

/// Any document the parser can produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedDocument {
    Idyll(IdyllDocument),
    Agent(AgentDocument),
    Diff(DiffDocument),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Content(node) => &node.id,
            Node::Executable(node) => &node.id,
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        match self {
            Node::Content(node) => node.id = id.into(),
            Node::Executable(node) => node.id = id.into(),
        }
    }

    /// Semantic AST type (`paragraph`, `function_call`, ...)
    pub fn node_type(&self) -> &str {
        match self {
            Node::Content(node) => &node.node_type,
            Node::Executable(node) => node.kind.as_str(),
        }
    }

    pub fn is_content_node(&self) -> bool {
        matches!(self, Node::Content(_))
    }

    pub fn is_executable_node(&self) -> bool {
        matches!(self, Node::Executable(_))
    }

    pub fn as_content(&self) -> Option<&ContentNode> {
        match self {
            Node::Content(node) => Some(node),
            Node::Executable(_) => None,
        }
    }

    pub fn as_executable(&self) -> Option<&ExecutableNode> {
        match self {
            Node::Executable(node) => Some(node),
            Node::Content(_) => None,
        }
    }

    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Content(node) => node.children.as_deref(),
            Node::Executable(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Content(node) => node.children.as_mut(),
            Node::Executable(_) => None,
        }
    }

    /// Content of a content node, instructions of an executable node
    pub fn rich_content(&self) -> &[RichContent] {
        match self {
            Node::Content(node) => &node.content,
            Node::Executable(node) => &node.instructions,
        }
    }

    pub fn rich_content_mut(&mut self) -> &mut Vec<RichContent> {
        match self {
            Node::Content(node) => &mut node.content,
            Node::Executable(node) => &mut node.instructions,
        }
    }

    pub fn paragraph(id: impl Into<String>, text: impl Into<String>) -> Self {
        Node::Content(ContentNode::new(id, "paragraph").with_content(vec![RichContent::text(text)]))
    }

    pub fn function_call(id: impl Into<String>, fn_name: impl Into<String>) -> Self {
        Node::Executable(ExecutableNode::new(id, ExecutableKind::FunctionCall, fn_name))
    }
}

impl From<ContentNode> for Node {
    fn from(node: ContentNode) -> Self {
        Node::Content(node)
    }
}

impl From<ExecutableNode> for Node {
    fn from(node: ExecutableNode) -> Self {
        Node::Executable(node)
    }
}

impl ContentNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            props: Props::new(),
            content: Vec::new(),
            children: None,
        }
    }

    pub fn with_content(mut self, content: Vec<RichContent>) -> Self {
        self.content = content;
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

impl ExecutableNode {
    pub fn new(id: impl Into<String>, kind: ExecutableKind, fn_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            fn_name: fn_name.into(),
            parameters: Props::new(),
            instructions: Vec::new(),
            metadata: ExecutableMetadata::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: Props) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_instructions(mut self, instructions: Vec<RichContent>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled
    }
}

impl RichContent {
    pub fn text(text: impl Into<String>) -> Self {
        RichContent::Text(TextContent {
            text: text.into(),
            styles: Vec::new(),
        })
    }

    pub fn styled<I, S>(text: impl Into<String>, styles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RichContent::Text(TextContent {
            text: text.into(),
            styles: canonicalize_styles(styles),
        })
    }

    pub fn variable(name: impl Into<String>, prompt: Option<&str>) -> Self {
        RichContent::Variable(VariableElement {
            name: name.into(),
            prompt: prompt.map(str::to_string),
            resolved_value: None,
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, RichContent::Text(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, RichContent::Variable(_))
    }

    /// Nested inline content of container variants
    pub fn nested(&self) -> Option<&[RichContent]> {
        match self {
            RichContent::Link(link) => Some(&link.content),
            RichContent::Annotation(annotation) => Some(&annotation.content),
            _ => None,
        }
    }

    pub fn nested_mut(&mut self) -> Option<&mut Vec<RichContent>> {
        match self {
            RichContent::Link(link) => Some(&mut link.content),
            RichContent::Annotation(annotation) => Some(&mut annotation.content),
            _ => None,
        }
    }
}

impl IdyllDocument {
    pub fn new(id: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            id: id.into(),
            nodes,
            metadata: None,
        }
    }
}

impl ParsedDocument {
    /// Underlying node document; `None` for diff documents
    pub fn as_idyll(&self) -> Option<&IdyllDocument> {
        match self {
            ParsedDocument::Idyll(doc) => Some(doc),
            ParsedDocument::Agent(agent) => Some(&agent.document),
            ParsedDocument::Diff(_) => None,
        }
    }

    pub fn into_idyll(self) -> Option<IdyllDocument> {
        match self {
            ParsedDocument::Idyll(doc) => Some(doc),
            ParsedDocument::Agent(agent) => Some(agent.document),
            ParsedDocument::Diff(_) => None,
        }
    }

    pub fn as_diff(&self) -> Option<&DiffDocument> {
        match self {
            ParsedDocument::Diff(diff) => Some(diff),
            _ => None,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        self.as_idyll().map(|doc| doc.nodes.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_style_order() {
        let styles = canonicalize_styles(["code", "italic", "bold", "italic"]);
        assert_eq!(styles, vec!["bold", "italic", "code"]);
    }

    #[test]
    fn test_node_json_discriminates_variants() {
        let json = r#"[
            {"id": "p1", "type": "paragraph", "content": [{"type": "text", "text": "Hi"}]},
            {"id": "f1", "type": "function_call", "fn": "web:search", "parameters": {"q": "rust"}}
        ]"#;
        let nodes: Vec<Node> = serde_json::from_str(json).unwrap();

        assert!(nodes[0].is_content_node());
        assert!(nodes[1].is_executable_node());
        let exec = nodes[1].as_executable().unwrap();
        assert_eq!(exec.fn_name, "web:search");
        assert!(exec.is_enabled());
    }
}
