use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::grammar::{idyll_grammar, CompiledGrammar, ContentModel, ElementKind};
use crate::id_generator::{get_document_id, IDGenerator};
use crate::operations::EditOperation;
use crate::xml::{read_tree, XmlElement, XmlNode};
use serde_json::Value;
use tracing::debug;

/// Root attributes that are not document metadata
const DOCUMENT_ATTRIBUTES: &[&str] = &["id"];
const AGENT_ATTRIBUTES: &[&str] = &["id", "name", "description", "model"];

/// Style carried by an inline formatting element type
fn style_for_type(ast_type: &str) -> Option<&'static str> {
    match ast_type {
        "bold" => Some("bold"),
        "italic" => Some("italic"),
        "underline" => Some("underline"),
        "strikethrough" => Some("strikethrough"),
        "inline_code" => Some("code"),
        _ => None,
    }
}

/// Grammar-driven parser for Idyll markup
pub struct Parser<'g> {
    grammar: &'g CompiledGrammar,
    id_generator: IDGenerator,
    path: Vec<String>,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g CompiledGrammar) -> Self {
        Self {
            grammar,
            id_generator: IDGenerator::from_seed("node"),
            path: Vec::new(),
        }
    }

    /// Parse a complete document
    pub fn parse(&mut self, source: &str) -> ParseResult<ParsedDocument> {
        let root = read_tree(source)?;

        let mut ids = Vec::new();
        root.collect_ids(&mut ids);
        let document_id = root
            .attr("id")
            .map(str::to_string)
            .unwrap_or_else(|| get_document_id(source));
        self.id_generator = IDGenerator::from_seed(document_id.clone()).with_reserved(ids);
        self.path = vec![root.name.clone()];

        let parsed = match root.name.as_str() {
            "document" => ParsedDocument::Idyll(self.parse_document(&root, document_id, DOCUMENT_ATTRIBUTES)?),
            "agent" => {
                let document = self.parse_document(&root, document_id, AGENT_ATTRIBUTES)?;
                ParsedDocument::Agent(AgentDocument {
                    document,
                    name: root.attr("name").map(str::to_string),
                    description: root.attr("description").map(str::to_string),
                    model: root.attr("model").map(str::to_string),
                })
            }
            "diff" => ParsedDocument::Diff(self.parse_diff(&root)?),
            other => {
                return Err(ParseError::invalid_syntax(
                    self.current_path(),
                    format!("expected <document>, <agent> or <diff> as root element, found <{other}>"),
                ))
            }
        };

        debug!(root = %root.name, "Parsed document");
        Ok(parsed)
    }

    fn current_path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    fn validate_attributes(&self, element: &XmlElement) -> ParseResult<()> {
        let errors = self.grammar.validate_attributes(&element.name, &element.attributes);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ParseError::InvalidAttributes {
                path: self.current_path(),
                errors,
            })
        }
    }

    fn ast_type(&self, element: &XmlElement) -> ParseResult<String> {
        self.grammar
            .element_to_type(&element.name)
            .map(str::to_string)
            .ok_or_else(|| ParseError::UnknownElement {
                element: element.name.clone(),
                path: self.current_path(),
            })
    }

    /// Reject `child` unless the grammar allows it inside `parent`
    fn check_child(&self, parent: &XmlElement, parent_type: &str, child: &XmlElement) -> ParseResult<()> {
        if !self.grammar.is_valid_element(&child.name) {
            return Err(ParseError::UnknownElement {
                element: child.name.clone(),
                path: self.current_path(),
            });
        }
        if !self.grammar.is_valid_child(parent_type, &child.name) {
            return Err(ParseError::InvalidChild {
                parent: parent.name.clone(),
                child: child.name.clone(),
                path: self.current_path(),
            });
        }
        Ok(())
    }

    fn with_segment<T>(&mut self, segment: String, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        self.path.push(segment);
        let result = f(self);
        self.path.pop();
        result
    }

    fn parse_document(&mut self, root: &XmlElement, id: String, reserved: &[&str]) -> ParseResult<IdyllDocument> {
        self.validate_attributes(root)?;
        let root_type = self.ast_type(root)?;
        let nodes = self.parse_block_children(root, &root_type)?;

        let metadata: Props = root
            .attributes
            .iter()
            .filter(|(key, _)| !reserved.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();

        Ok(IdyllDocument {
            id,
            nodes,
            metadata: (!metadata.is_empty()).then_some(metadata),
        })
    }

    /// Block-level children; only whitespace may appear between them
    fn parse_block_children(&mut self, parent: &XmlElement, parent_type: &str) -> ParseResult<Vec<Node>> {
        let mut nodes = Vec::new();
        for child in &parent.children {
            match child {
                XmlNode::Text(text) | XmlNode::CData(text) => {
                    if !text.trim().is_empty() {
                        return Err(ParseError::invalid_syntax(
                            self.current_path(),
                            format!("text is not allowed directly inside <{}>", parent.name),
                        ));
                    }
                }
                XmlNode::Element(element) => {
                    self.check_child(parent, parent_type, element)?;
                    let segment = format!("{}[{}]", element.name, nodes.len());
                    let node = self.with_segment(segment, |p| p.parse_node(element))?;
                    nodes.push(node);
                }
            }
        }
        Ok(nodes)
    }

    fn parse_node(&mut self, element: &XmlElement) -> ParseResult<Node> {
        self.validate_attributes(element)?;
        let kind = self.grammar.element_spec(&element.name).map(|spec| spec.kind);
        match kind {
            Some(ElementKind::Executable) => self.parse_executable(element).map(Node::Executable),
            Some(ElementKind::Block) => self.parse_content_node(element).map(Node::Content),
            _ => Err(ParseError::invalid_syntax(
                self.current_path(),
                format!("<{}> is not a block element", element.name),
            )),
        }
    }

    fn node_id(&mut self, element: &XmlElement) -> String {
        element
            .attr("id")
            .map(str::to_string)
            .unwrap_or_else(|| self.id_generator.new_id())
    }

    fn parse_content_node(&mut self, element: &XmlElement) -> ParseResult<ContentNode> {
        let node_type = self.ast_type(element)?;
        let id = self.node_id(element);

        let mut props: Props = element
            .attributes
            .iter()
            .filter(|(key, _)| key != "id")
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        if node_type == "heading" {
            let level = element.name[1..].parse::<u64>().unwrap_or(1);
            props.insert("level".to_string(), Value::from(level));
        }

        let content_model = self.grammar.content_model(&element.name).unwrap_or(ContentModel::None);
        let (content, children) = match content_model {
            ContentModel::Rich => {
                let mut content = Vec::new();
                let mut children = Vec::new();
                self.parse_mixed(element, &node_type, &mut content, &mut children)?;
                (content, (!children.is_empty()).then_some(children))
            }
            ContentModel::Text => {
                if let Some(child) = element.elements().next() {
                    return Err(ParseError::InvalidChild {
                        parent: element.name.clone(),
                        child: child.name.clone(),
                        path: self.current_path(),
                    });
                }
                let text = element.text();
                let content = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![RichContent::text(text)]
                };
                (content, None)
            }
            ContentModel::None | ContentModel::Json => {
                let has_children_rule = self
                    .grammar
                    .element_spec(&element.name)
                    .is_some_and(|spec| spec.children.is_some());
                if has_children_rule {
                    (Vec::new(), Some(self.parse_block_children(element, &node_type)?))
                } else {
                    self.expect_empty(element)?;
                    (Vec::new(), None)
                }
            }
        };

        Ok(ContentNode {
            id,
            node_type,
            props,
            content,
            children,
        })
    }

    /// Rich content mixed with block children (list items holding nested lists)
    fn parse_mixed(
        &mut self,
        element: &XmlElement,
        element_type: &str,
        content: &mut Vec<RichContent>,
        children: &mut Vec<Node>,
    ) -> ParseResult<()> {
        for child in &element.children {
            match child {
                XmlNode::Text(text) | XmlNode::CData(text) => push_text(content, text, &[]),
                XmlNode::Element(inner) => {
                    self.check_child(element, element_type, inner)?;
                    if self.grammar.is_inline_element(&inner.name) {
                        self.parse_inline(inner, &[], content)?;
                    } else {
                        let segment = format!("{}[{}]", inner.name, children.len());
                        let node = self.with_segment(segment, |p| p.parse_node(inner))?;
                        children.push(node);
                    }
                }
            }
        }
        Ok(())
    }

    /// Inline-only content (links, annotations, `<content>` blocks)
    fn parse_rich(&mut self, element: &XmlElement, styles: &[String]) -> ParseResult<Vec<RichContent>> {
        let element_type = self.ast_type(element)?;
        let mut content = Vec::new();
        for child in &element.children {
            match child {
                XmlNode::Text(text) | XmlNode::CData(text) => push_text(&mut content, text, styles),
                XmlNode::Element(inner) => {
                    self.check_child(element, &element_type, inner)?;
                    if !self.grammar.is_inline_element(&inner.name) {
                        return Err(ParseError::InvalidChild {
                            parent: element.name.clone(),
                            child: inner.name.clone(),
                            path: self.current_path(),
                        });
                    }
                    self.parse_inline(inner, styles, &mut content)?;
                }
            }
        }
        Ok(content)
    }

    /// Flatten one inline element into `out`. Formatting elements do not
    /// produce spans; they extend the style list of the text inside them.
    fn parse_inline(&mut self, element: &XmlElement, styles: &[String], out: &mut Vec<RichContent>) -> ParseResult<()> {
        self.validate_attributes(element)?;
        let element_type = self.ast_type(element)?;

        if let Some(style) = style_for_type(&element_type) {
            let styles = canonicalize_styles(styles.iter().cloned().chain([style.to_string()]));
            for item in self.parse_rich(element, &styles)? {
                push_content(out, item);
            }
            return Ok(());
        }

        match element_type.as_str() {
            "span" => {
                let extra = element.attr("styles").unwrap_or_default().split_whitespace();
                let styles = canonicalize_styles(styles.iter().map(String::as_str).chain(extra));
                for item in self.parse_rich(element, &styles)? {
                    push_content(out, item);
                }
            }
            "link" => {
                let content = self.parse_rich(element, styles)?;
                out.push(RichContent::Link(LinkElement {
                    href: element.attr("href").unwrap_or_default().to_string(),
                    content,
                }));
            }
            "annotation" => {
                let content = self.parse_rich(element, styles)?;
                out.push(RichContent::Annotation(AnnotationElement {
                    title: element.attr("title").map(str::to_string),
                    comment: element.attr("comment").map(str::to_string),
                    content,
                }));
            }
            "variable" => {
                self.expect_empty(element)?;
                out.push(RichContent::Variable(VariableElement {
                    name: element.attr("name").unwrap_or_default().to_string(),
                    prompt: element.attr("prompt").filter(|p| !p.is_empty()).map(str::to_string),
                    resolved_value: element.attr("value").map(|v| Value::String(v.to_string())),
                }));
            }
            "mention" => {
                self.expect_empty(element)?;
                out.push(RichContent::Mention(MentionElement {
                    mention_type: element.attr("type").unwrap_or_default().to_string(),
                    id: element.attr("id").unwrap_or_default().to_string(),
                    label: element.attr("label").unwrap_or_default().to_string(),
                }));
            }
            other => {
                return Err(ParseError::invalid_syntax(
                    self.current_path(),
                    format!("<{}> ({other}) is not an inline element", element.name),
                ))
            }
        }
        Ok(())
    }

    fn expect_empty(&self, element: &XmlElement) -> ParseResult<()> {
        if let Some(child) = element.elements().next() {
            return Err(ParseError::InvalidChild {
                parent: element.name.clone(),
                child: child.name.clone(),
                path: self.current_path(),
            });
        }
        if !element.text().trim().is_empty() {
            return Err(ParseError::invalid_syntax(
                self.current_path(),
                format!("<{}> must not contain text", element.name),
            ));
        }
        Ok(())
    }

    fn parse_executable(&mut self, element: &XmlElement) -> ParseResult<ExecutableNode> {
        let (kind, fn_attribute) = match element.name.as_str() {
            "trigger" => (ExecutableKind::Trigger, "idyll-trigger"),
            _ => (ExecutableKind::FunctionCall, "idyll-fn"),
        };
        let element_type = self.ast_type(element)?;
        let id = self.node_id(element);

        let extra: Props = element
            .attributes
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "id" | "enabled") && key != fn_attribute)
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();

        let mut parameters = None;
        let mut instructions = None;
        for child in &element.children {
            match child {
                XmlNode::Text(text) | XmlNode::CData(text) => {
                    if !text.trim().is_empty() {
                        return Err(ParseError::invalid_syntax(
                            self.current_path(),
                            format!("text inside <{}> must be wrapped in <content>", element.name),
                        ));
                    }
                }
                XmlNode::Element(inner) => {
                    self.check_child(element, &element_type, inner)?;
                    let segment = inner.name.clone();
                    match inner.name.as_str() {
                        "params" if parameters.is_none() => {
                            parameters = Some(self.with_segment(segment, |p| p.parse_json_object(inner))?);
                        }
                        "content" if instructions.is_none() => {
                            instructions = Some(self.with_segment(segment, |p| p.parse_rich(inner, &[]))?);
                        }
                        duplicate => {
                            return Err(ParseError::invalid_syntax(
                                self.current_path(),
                                format!("duplicate <{duplicate}> in <{}>", element.name),
                            ))
                        }
                    }
                }
            }
        }

        Ok(ExecutableNode {
            id,
            kind,
            fn_name: element.attr(fn_attribute).unwrap_or_default().to_string(),
            parameters: parameters.unwrap_or_default(),
            instructions: instructions.unwrap_or_default(),
            metadata: ExecutableMetadata {
                enabled: element.attr("enabled") != Some("false"),
                extra,
            },
        })
    }

    fn parse_json_object(&mut self, element: &XmlElement) -> ParseResult<Props> {
        self.validate_attributes(element)?;
        if let Some(child) = element.elements().next() {
            return Err(ParseError::InvalidChild {
                parent: element.name.clone(),
                child: child.name.clone(),
                path: self.current_path(),
            });
        }

        let raw = element.text();
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Props::new());
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ParseError::InvalidJson {
                path: self.current_path(),
                message: "expected a JSON object".to_string(),
            }),
            Err(e) => Err(ParseError::InvalidJson {
                path: self.current_path(),
                message: e.to_string(),
            }),
        }
    }

    fn parse_diff(&mut self, root: &XmlElement) -> ParseResult<DiffDocument> {
        self.validate_attributes(root)?;
        let root_type = self.ast_type(root)?;

        let mut operations = Vec::new();
        for child in &root.children {
            match child {
                XmlNode::Text(text) | XmlNode::CData(text) => {
                    if !text.trim().is_empty() {
                        return Err(ParseError::invalid_syntax(
                            self.current_path(),
                            "text is not allowed directly inside <diff>",
                        ));
                    }
                }
                XmlNode::Element(element) => {
                    self.check_child(root, &root_type, element)?;
                    let segment = format!("{}[{}]", element.name, operations.len());
                    let operation = self.with_segment(segment, |p| p.parse_operation(element))?;
                    operations.push(operation);
                }
            }
        }

        Ok(DiffDocument {
            target_document: root.attr("target").map(str::to_string),
            operations,
        })
    }

    fn parse_operation(&mut self, element: &XmlElement) -> ParseResult<EditOperation> {
        self.validate_attributes(element)?;
        let element_type = self.ast_type(element)?;
        let attr = |name: &str| element.attr(name).unwrap_or_default().to_string();
        let optional = |name: &str| element.attr(name).map(str::to_string);

        let operation = match element.name.as_str() {
            "edit:attr" => EditOperation::EditAttr {
                block_id: attr("blockId"),
                name: attr("name"),
                value: Value::String(attr("value")),
            },
            "edit:content" => EditOperation::EditContent {
                block_id: attr("blockId"),
                content: self.parse_rich(element, &[])?,
            },
            "edit:params" => EditOperation::EditParams {
                block_id: attr("blockId"),
                params: self.parse_json_object(element)?,
            },
            "edit:id" => EditOperation::EditId {
                block_id: attr("blockId"),
                new_id: attr("newId"),
            },
            "insert" => EditOperation::Insert {
                after_block_id: optional("afterBlockId"),
                at_start: element.flag("atStart"),
                at_end: element.flag("atEnd"),
                nodes: self.parse_block_children(element, &element_type)?,
            },
            "delete" => EditOperation::Delete {
                block_id: attr("blockId"),
            },
            "replace" => EditOperation::Replace {
                block_id: attr("blockId"),
                nodes: self.parse_block_children(element, &element_type)?,
            },
            "move" => EditOperation::Move {
                block_id: optional("blockId"),
                block_ids: element.attr("blockIds").map(|ids| {
                    ids.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                }),
                from_block_id: optional("fromBlockId"),
                to_block_id: optional("toBlockId"),
                after_block_id: optional("afterBlockId"),
                at_start: element.flag("atStart"),
                at_end: element.flag("atEnd"),
            },
            other => {
                return Err(ParseError::invalid_syntax(
                    self.current_path(),
                    format!("<{other}> is not an edit operation"),
                ))
            }
        };

        Ok(operation)
    }
}

/// Append text, merging into the previous run when the styles match
fn push_text(content: &mut Vec<RichContent>, text: &str, styles: &[String]) {
    if text.is_empty() {
        return;
    }
    if let Some(RichContent::Text(last)) = content.last_mut() {
        if last.styles == styles {
            last.text.push_str(text);
            return;
        }
    }
    content.push(RichContent::Text(TextContent {
        text: text.to_string(),
        styles: styles.to_vec(),
    }));
}

fn push_content(content: &mut Vec<RichContent>, item: RichContent) {
    match item {
        RichContent::Text(text) => push_text(content, &text.text, &text.styles),
        other => content.push(other),
    }
}

/// Parse markup with the built-in Idyll grammar
pub fn parse(source: &str) -> ParseResult<ParsedDocument> {
    Parser::new(idyll_grammar()).parse(source)
}

/// Parse markup that must be a `<document>` or `<agent>`
pub fn parse_document(source: &str) -> ParseResult<IdyllDocument> {
    match parse(source)? {
        ParsedDocument::Idyll(doc) => Ok(doc),
        ParsedDocument::Agent(agent) => Ok(agent.document),
        ParsedDocument::Diff(_) => Err(ParseError::invalid_syntax("/diff", "expected a document, found a diff")),
    }
}

/// Parse markup that must be a `<diff>`
pub fn parse_diff(source: &str) -> ParseResult<DiffDocument> {
    match parse(source)? {
        ParsedDocument::Diff(diff) => Ok(diff),
        _ => Err(ParseError::invalid_syntax("/", "expected a <diff> document")),
    }
}
