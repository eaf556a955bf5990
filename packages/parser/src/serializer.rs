use crate::ast::*;
use crate::grammar::{idyll_grammar, CompiledGrammar, ContentModel};
use crate::operations::EditOperation;
use quick_xml::escape::escape;
use serde_json::Value;

/// Serializer converts AST back to Idyll markup
///
/// Output re-parses to an equal tree: styles are written as canonical
/// `<span styles="...">` runs, parameters as CDATA JSON, and block children
/// are indented (whitespace between blocks is not significant). List items
/// that hold nested lists are written on one line, since whitespace inside
/// rich content is.
pub struct Serializer {
    grammar: &'static CompiledGrammar,
    indent_level: usize,
    indent_string: String,
    compact: bool,
}

impl Serializer {
    pub fn new() -> Self {
        Self {
            grammar: idyll_grammar(),
            indent_level: 0,
            indent_string: "  ".to_string(), // 2 spaces
            compact: false,
        }
    }

    pub fn with_indent(indent: &str) -> Self {
        Self {
            indent_string: indent.to_string(),
            ..Self::new()
        }
    }

    /// Serialize any parsed document
    pub fn serialize(&mut self, doc: &ParsedDocument) -> String {
        let mut output = String::new();
        match doc {
            ParsedDocument::Idyll(document) => self.serialize_root("document", document, &[], &mut output),
            ParsedDocument::Agent(agent) => {
                let identity: Vec<(&str, &str)> = [
                    ("name", agent.name.as_deref()),
                    ("description", agent.description.as_deref()),
                    ("model", agent.model.as_deref()),
                ]
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, v)))
                .collect();
                self.serialize_root("agent", &agent.document, &identity, &mut output)
            }
            ParsedDocument::Diff(diff) => self.serialize_diff(diff, &mut output),
        }
        output
    }

    pub fn serialize_document(&mut self, doc: &IdyllDocument) -> String {
        let mut output = String::new();
        self.serialize_root("document", doc, &[], &mut output);
        output
    }

    /// Serialize a node list without a root element
    pub fn serialize_nodes(&mut self, nodes: &[Node]) -> String {
        let mut output = String::new();
        for node in nodes {
            self.serialize_node(node, &mut output);
        }
        output
    }

    fn serialize_root(&mut self, element: &str, doc: &IdyllDocument, identity: &[(&str, &str)], output: &mut String) {
        output.push('<');
        output.push_str(element);
        write_attr(output, "id", &doc.id);
        for (key, value) in identity {
            write_attr(output, key, value);
        }
        if let Some(metadata) = &doc.metadata {
            for (key, value) in metadata {
                write_attr(output, key, &value_text(value));
            }
        }

        if doc.nodes.is_empty() {
            output.push_str("/>\n");
            return;
        }

        output.push_str(">\n");
        self.serialize_block_list(&doc.nodes, output);
        output.push_str("</");
        output.push_str(element);
        output.push_str(">\n");
    }

    fn serialize_block_list(&mut self, nodes: &[Node], output: &mut String) {
        self.indent_level += 1;
        for node in nodes {
            self.serialize_node(node, output);
        }
        self.indent_level -= 1;
    }

    fn serialize_node(&mut self, node: &Node, output: &mut String) {
        match node {
            Node::Content(content) => self.serialize_content_node(content, output),
            Node::Executable(exec) => self.serialize_executable(exec, output),
        }
    }

    fn element_for(&self, node: &ContentNode) -> String {
        if node.node_type == "heading" {
            // Levels set through markup diffs arrive as strings
            let level = node
                .props
                .get("level")
                .and_then(|v| v.as_u64().or_else(|| v.as_str()?.trim().parse().ok()))
                .unwrap_or(1)
                .clamp(1, 6);
            return format!("h{level}");
        }
        self.grammar
            .type_to_elements(&node.node_type)
            .first()
            .cloned()
            .unwrap_or_else(|| node.node_type.clone())
    }

    fn serialize_content_node(&mut self, node: &ContentNode, output: &mut String) {
        let element = self.element_for(node);

        self.write_indent(output);
        output.push('<');
        output.push_str(&element);
        write_attr(output, "id", &node.id);
        for (key, value) in &node.props {
            if node.node_type == "heading" && key == "level" {
                continue;
            }
            write_attr(output, key, &value_text(value));
        }

        let children = node.children.as_deref().unwrap_or_default();
        if node.content.is_empty() && children.is_empty() {
            output.push_str("/>");
            self.end_line(output);
            return;
        }
        output.push('>');

        match self.grammar.content_model(&element) {
            Some(ContentModel::Text) => {
                for item in &node.content {
                    if let RichContent::Text(text) = item {
                        output.push_str(&escape(text.text.as_str()));
                    }
                }
            }
            Some(ContentModel::Rich) => {
                serialize_rich(&node.content, output);
                if !children.is_empty() {
                    let compact = std::mem::replace(&mut self.compact, true);
                    for child in children {
                        self.serialize_node(child, output);
                    }
                    self.compact = compact;
                }
            }
            _ => {
                self.open_block(output);
                self.serialize_block_list(children, output);
                self.write_indent(output);
            }
        }

        output.push_str("</");
        output.push_str(&element);
        output.push('>');
        self.end_line(output);
    }

    fn serialize_executable(&mut self, exec: &ExecutableNode, output: &mut String) {
        let (element, fn_attribute) = match exec.kind {
            ExecutableKind::FunctionCall => ("fncall", "idyll-fn"),
            ExecutableKind::Trigger => ("trigger", "idyll-trigger"),
        };

        self.write_indent(output);
        output.push('<');
        output.push_str(element);
        write_attr(output, "id", &exec.id);
        write_attr(output, fn_attribute, &exec.fn_name);
        if !exec.metadata.enabled {
            write_attr(output, "enabled", "false");
        }
        for (key, value) in &exec.metadata.extra {
            write_attr(output, key, &value_text(value));
        }

        if exec.parameters.is_empty() && exec.instructions.is_empty() {
            output.push_str("/>");
            self.end_line(output);
            return;
        }

        output.push('>');
        self.open_block(output);
        self.indent_level += 1;
        if !exec.parameters.is_empty() {
            self.write_indent(output);
            output.push_str("<params>");
            write_cdata_json(output, &exec.parameters);
            output.push_str("</params>");
            self.end_line(output);
        }
        if !exec.instructions.is_empty() {
            self.write_indent(output);
            output.push_str("<content>");
            serialize_rich(&exec.instructions, output);
            output.push_str("</content>");
            self.end_line(output);
        }
        self.indent_level -= 1;

        self.write_indent(output);
        output.push_str("</");
        output.push_str(element);
        output.push('>');
        self.end_line(output);
    }

    fn serialize_diff(&mut self, diff: &DiffDocument, output: &mut String) {
        output.push_str("<diff");
        if let Some(target) = &diff.target_document {
            write_attr(output, "target", target);
        }
        if diff.operations.is_empty() {
            output.push_str("/>\n");
            return;
        }
        output.push_str(">\n");

        self.indent_level += 1;
        for operation in &diff.operations {
            self.serialize_operation(operation, output);
        }
        self.indent_level -= 1;

        output.push_str("</diff>\n");
    }

    fn serialize_operation(&mut self, operation: &EditOperation, output: &mut String) {
        let element = operation.name();
        self.write_indent(output);
        output.push('<');
        output.push_str(element);

        match operation {
            EditOperation::EditAttr { block_id, name, value } => {
                write_attr(output, "blockId", block_id);
                write_attr(output, "name", name);
                write_attr(output, "value", &value_text(value));
                output.push_str("/>");
            }
            EditOperation::EditContent { block_id, content } => {
                write_attr(output, "blockId", block_id);
                output.push('>');
                serialize_rich(content, output);
                close_tag(output, element);
            }
            EditOperation::EditParams { block_id, params } => {
                write_attr(output, "blockId", block_id);
                if params.is_empty() {
                    output.push_str("/>");
                } else {
                    output.push('>');
                    write_cdata_json(output, params);
                    close_tag(output, element);
                }
            }
            EditOperation::EditId { block_id, new_id } => {
                write_attr(output, "blockId", block_id);
                write_attr(output, "newId", new_id);
                output.push_str("/>");
            }
            EditOperation::Delete { block_id } => {
                write_attr(output, "blockId", block_id);
                output.push_str("/>");
            }
            EditOperation::Insert {
                after_block_id,
                at_start,
                at_end,
                nodes,
            } => {
                write_position(output, after_block_id.as_deref(), *at_start, *at_end);
                self.serialize_operation_nodes(element, nodes, output);
            }
            EditOperation::Replace { block_id, nodes } => {
                write_attr(output, "blockId", block_id);
                self.serialize_operation_nodes(element, nodes, output);
            }
            EditOperation::Move {
                block_id,
                block_ids,
                from_block_id,
                to_block_id,
                after_block_id,
                at_start,
                at_end,
            } => {
                if let Some(id) = block_id {
                    write_attr(output, "blockId", id);
                }
                if let Some(ids) = block_ids {
                    write_attr(output, "blockIds", &ids.join(","));
                }
                if let Some(from) = from_block_id {
                    write_attr(output, "fromBlockId", from);
                }
                if let Some(to) = to_block_id {
                    write_attr(output, "toBlockId", to);
                }
                write_position(output, after_block_id.as_deref(), *at_start, *at_end);
                output.push_str("/>");
            }
        }
        output.push('\n');
    }

    fn serialize_operation_nodes(&mut self, element: &str, nodes: &[Node], output: &mut String) {
        if nodes.is_empty() {
            output.push_str("/>");
            return;
        }
        output.push_str(">\n");
        self.serialize_block_list(nodes, output);
        self.write_indent(output);
        close_tag(output, element);
    }

    fn open_block(&self, output: &mut String) {
        if !self.compact {
            output.push('\n');
        }
    }

    fn end_line(&self, output: &mut String) {
        if !self.compact {
            output.push('\n');
        }
    }

    fn write_indent(&self, output: &mut String) {
        if self.compact {
            return;
        }
        for _ in 0..self.indent_level {
            output.push_str(&self.indent_string);
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

fn close_tag(output: &mut String, element: &str) {
    output.push_str("</");
    output.push_str(element);
    output.push('>');
}

fn write_attr(output: &mut String, name: &str, value: &str) {
    output.push(' ');
    output.push_str(name);
    output.push_str("=\"");
    output.push_str(&escape(value));
    output.push('"');
}

fn write_position(output: &mut String, after_block_id: Option<&str>, at_start: bool, at_end: bool) {
    if let Some(anchor) = after_block_id {
        write_attr(output, "afterBlockId", anchor);
    }
    if at_start {
        write_attr(output, "atStart", "true");
    }
    if at_end {
        write_attr(output, "atEnd", "true");
    }
}

/// Strings are written raw, anything else as JSON
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `]]>` cannot appear inside a CDATA section, so it is split across two
fn write_cdata_json(output: &mut String, params: &Props) {
    let json = Value::Object(params.clone()).to_string();
    output.push_str("<![CDATA[");
    output.push_str(&json.replace("]]>", "]]]]><![CDATA[>"));
    output.push_str("]]>");
}

fn serialize_rich(content: &[RichContent], output: &mut String) {
    for item in content {
        match item {
            RichContent::Text(text) => {
                if text.styles.is_empty() {
                    output.push_str(&escape(text.text.as_str()));
                } else {
                    output.push_str("<span");
                    write_attr(output, "styles", &canonicalize_styles(text.styles.iter().cloned()).join(" "));
                    output.push('>');
                    output.push_str(&escape(text.text.as_str()));
                    output.push_str("</span>");
                }
            }
            RichContent::Variable(variable) => {
                output.push_str("<variable");
                write_attr(output, "name", &variable.name);
                if let Some(prompt) = &variable.prompt {
                    write_attr(output, "prompt", prompt);
                }
                if let Some(value) = &variable.resolved_value {
                    write_attr(output, "value", &value_text(value));
                }
                output.push_str("/>");
            }
            RichContent::Mention(mention) => {
                output.push_str("<mention");
                write_attr(output, "id", &mention.id);
                write_attr(output, "type", &mention.mention_type);
                write_attr(output, "label", &mention.label);
                output.push_str("/>");
            }
            RichContent::Link(link) => {
                output.push_str("<link");
                write_attr(output, "href", &link.href);
                output.push('>');
                serialize_rich(&link.content, output);
                output.push_str("</link>");
            }
            RichContent::Annotation(annotation) => {
                output.push_str("<annotation");
                if let Some(title) = &annotation.title {
                    write_attr(output, "title", title);
                }
                if let Some(comment) = &annotation.comment {
                    write_attr(output, "comment", comment);
                }
                output.push('>');
                serialize_rich(&annotation.content, output);
                output.push_str("</annotation>");
            }
        }
    }
}

/// Convenience function to serialize a parsed document
pub fn serialize(doc: &ParsedDocument) -> String {
    Serializer::new().serialize(doc)
}

pub fn serialize_document(doc: &IdyllDocument) -> String {
    Serializer::new().serialize_document(doc)
}

pub fn serialize_nodes(nodes: &[Node]) -> String {
    Serializer::new().serialize_nodes(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn round_trip(source: &str) -> (ParsedDocument, ParsedDocument) {
        let first = parse(source).unwrap();
        let markup = serialize(&first);
        let second = parse(&markup).unwrap_or_else(|e| panic!("re-parse failed: {e}\n{markup}"));
        (first, second)
    }

    #[test]
    fn test_serialize_simple_document() {
        let doc = IdyllDocument::new("d", vec![Node::paragraph("p1", "Hello & welcome")]);
        let markup = serialize_document(&doc);

        assert_eq!(markup, "<document id=\"d\">\n  <p id=\"p1\">Hello &amp; welcome</p>\n</document>\n");
    }

    #[test]
    fn test_styles_written_as_spans() {
        let mut out = String::new();
        serialize_rich(&[RichContent::styled("x", ["italic", "bold"])], &mut out);
        assert_eq!(out, r#"<span styles="bold italic">x</span>"#);
    }

    #[test]
    fn test_heading_uses_level() {
        let node: Node = ContentNode::new("h", "heading")
            .with_prop("level", 3)
            .with_content(vec![RichContent::text("Title")])
            .into();
        assert_eq!(serialize_nodes(&[node]), "<h3 id=\"h\">Title</h3>\n");
    }

    #[test]
    fn test_heading_level_from_string_prop() {
        let node: Node = ContentNode::new("h", "heading")
            .with_prop("level", "4")
            .with_content(vec![RichContent::text("Title")])
            .into();
        assert_eq!(serialize_nodes(&[node]), "<h4 id=\"h\">Title</h4>\n");
    }

    #[test]
    fn test_cdata_terminator_is_split() {
        let mut params = Props::new();
        params.insert("raw".to_string(), Value::from("a]]>b"));
        let node: Node = ExecutableNode::new("f", ExecutableKind::FunctionCall, "echo")
            .with_parameters(params)
            .into();

        let markup = serialize_document(&IdyllDocument::new("d", vec![node.clone()]));
        let parsed = crate::parser::parse_document(&markup).unwrap();
        assert_eq!(parsed.nodes[0], node);
    }

    #[test]
    fn test_round_trip_rich_document() {
        let (first, second) = round_trip(
            r#"<document id="d" theme="dark">
                <h1 id="t">Report <i>draft</i></h1>
                <p id="p1">Ask <mention id="u" type="user" label="Ada &amp; Co"/> about <b>the <u>plan</u></b> <link href="https://a.b/c?x=1&amp;y=2">here</link></p>
                <ul id="l"><li id="i1">One<ol id="l2"><li id="i2">Nested</li></ol></li><li id="i3">Two</li></ul>
                <pre id="c" language="rust">fn main() {
    println!("&lt;hi&gt;");
}</pre>
                <hr id="sep"/>
                <fncall id="f" idyll-fn="web:search" enabled="false" retries="3">
                    <params><![CDATA[{"q": "x", "n": [1, 2]}]]></params>
                    <content>Use <variable name="topic" prompt="Topic?"/> <annotation title="note">carefully</annotation></content>
                </fncall>
                <tool id="tool1" name="lookup" description="Find things"><p id="tp">Body</p></tool>
            </document>"#,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_round_trip_diff() {
        let (first, second) = round_trip(
            r#"<diff target="d">
                <edit:attr blockId="p" name="align" value="left"/>
                <edit:content blockId="p">New <b>text</b></edit:content>
                <edit:params blockId="f"><![CDATA[{"a": true}]]></edit:params>
                <edit:id blockId="p" newId="p2"/>
                <insert atStart="true"><p id="n">Fresh</p></insert>
                <replace blockId="x"><hr id="y"/></replace>
                <move fromBlockId="a" toBlockId="c" afterBlockId="z"/>
                <delete blockId="q"/>
            </diff>"#,
        );
        assert_eq!(first, second);
    }
}
