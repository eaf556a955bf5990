use super::{compile, AttributeSpec, CompiledGrammar, ContentModel, ElementKind, ElementSpec, GrammarRules, Rule};
use crate::ast::STYLE_ORDER;
use once_cell::sync::Lazy;

const BOOLEAN: &[&str] = &["true", "false"];
const ID_PATTERN: &str = r"[A-Za-z0-9_][A-Za-z0-9_.:-]*";
const VARIABLE_NAME_PATTERN: &str = r"[A-Za-z_][A-Za-z0-9_.-]*";

static IDYLL_GRAMMAR: Lazy<CompiledGrammar> = Lazy::new(|| compile(&idyll_rules()));

/// The built-in Idyll grammar, compiled on first use and shared process-wide
pub fn idyll_grammar() -> &'static CompiledGrammar {
    &IDYLL_GRAMMAR
}

fn non_empty(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("value must not be empty".to_string())
    } else {
        Ok(())
    }
}

fn href(value: &str) -> Result<(), String> {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        Err(format!("'{value}' is not a valid link target"))
    } else {
        Ok(())
    }
}

fn style_list(value: &str) -> Result<(), String> {
    match value.split_whitespace().find(|style| !STYLE_ORDER.contains(style)) {
        Some(unknown) => Err(format!("unknown style '{unknown}'")),
        None => Ok(()),
    }
}

fn id_list(value: &str) -> Result<(), String> {
    if value.split(',').map(str::trim).any(str::is_empty) {
        Err(format!("'{value}' is not a comma-separated id list"))
    } else {
        Ok(())
    }
}

fn id_attr() -> AttributeSpec {
    AttributeSpec::new("id").pattern(ID_PATTERN)
}

fn block_id_attr(name: &str) -> AttributeSpec {
    AttributeSpec::new(name).pattern(ID_PATTERN)
}

fn rich_block(element: &str) -> Rule {
    Rule::element(
        ElementSpec::new(element, ElementKind::Block)
            .content(ContentModel::Rich)
            .attr(id_attr())
            .children(Rule::repeat(Rule::reference("inline"))),
    )
}

fn container(element: &str, children: Rule) -> ElementSpec {
    ElementSpec::new(element, ElementKind::Block)
        .attr(id_attr())
        .children(children)
}

fn style_element(element: &str) -> Rule {
    Rule::element(
        ElementSpec::new(element, ElementKind::Inline)
            .content(ContentModel::Rich)
            .children(Rule::repeat(Rule::reference("inline"))),
    )
}

fn executable(element: &str, fn_attribute: &str) -> Rule {
    Rule::element(
        ElementSpec::new(element, ElementKind::Executable)
            .attr(id_attr())
            .attr(AttributeSpec::new(fn_attribute).required())
            .attr(AttributeSpec::new("enabled").one_of(BOOLEAN))
            .children(Rule::sequence(vec![
                Rule::optional(Rule::reference("params")),
                Rule::optional(Rule::reference("content")),
            ])),
    )
}

fn position_attrs(spec: ElementSpec) -> ElementSpec {
    spec.attr(block_id_attr("afterBlockId"))
        .attr(AttributeSpec::new("atStart").one_of(BOOLEAN))
        .attr(AttributeSpec::new("atEnd").one_of(BOOLEAN))
}

/// Rule set for Idyll markup, agent documents and diff documents
pub fn idyll_rules() -> GrammarRules {
    let block = vec![
        Rule::reference("paragraph"),
        Rule::reference("heading"),
        Rule::reference("quote"),
        Rule::reference("code"),
        Rule::reference("separator"),
        Rule::reference("list"),
        Rule::reference("definition"),
        Rule::reference("executable"),
    ];

    GrammarRules::new()
        .rule(
            "document",
            Rule::element(
                ElementSpec::new("document", ElementKind::Structural)
                    .attr(id_attr())
                    .children(Rule::repeat(Rule::reference("block"))),
            ),
        )
        .rule(
            "agent",
            Rule::element(
                ElementSpec::new("agent", ElementKind::Structural)
                    .attr(id_attr())
                    .attr(AttributeSpec::new("name").validate_with(non_empty))
                    .attr(AttributeSpec::new("description"))
                    .attr(AttributeSpec::new("model").validate_with(non_empty))
                    .children(Rule::repeat(Rule::reference("block"))),
            ),
        )
        .rule(
            "diff",
            Rule::element(
                ElementSpec::new("diff", ElementKind::Structural)
                    .attr(AttributeSpec::new("target").pattern(ID_PATTERN))
                    .children(Rule::repeat(Rule::reference("operation"))),
            ),
        )
        .rule("block", Rule::choice(block))
        .rule("paragraph", rich_block("p"))
        .rule(
            "heading",
            Rule::choice(["h1", "h2", "h3", "h4", "h5", "h6"].into_iter().map(rich_block).collect()),
        )
        .rule("quote", rich_block("blockquote"))
        .rule(
            "code",
            Rule::element(
                ElementSpec::new("pre", ElementKind::Block)
                    .content(ContentModel::Text)
                    .attr(id_attr())
                    .attr(AttributeSpec::new("language")),
            ),
        )
        .rule(
            "separator",
            Rule::element(ElementSpec::new("hr", ElementKind::Block).attr(id_attr())),
        )
        .rule(
            "list",
            Rule::choice(vec![
                Rule::element(container("ul", Rule::repeat(Rule::reference("list_item")))),
                Rule::element(container("ol", Rule::repeat(Rule::reference("list_item")))),
            ]),
        )
        .rule(
            "list_item",
            Rule::element(
                ElementSpec::new("li", ElementKind::Block)
                    .content(ContentModel::Rich)
                    .attr(id_attr())
                    .children(Rule::repeat(Rule::choice(vec![
                        Rule::reference("inline"),
                        Rule::reference("list"),
                        Rule::reference("executable"),
                    ]))),
            ),
        )
        .rule(
            "definition",
            Rule::choice(vec![
                Rule::element(
                    container("function", Rule::repeat(Rule::reference("block")))
                        .attr(AttributeSpec::new("name").required().validate_with(non_empty))
                        .attr(AttributeSpec::new("description")),
                ),
                Rule::element(
                    container("tool", Rule::repeat(Rule::reference("block")))
                        .attr(AttributeSpec::new("name").required().validate_with(non_empty))
                        .attr(AttributeSpec::new("description")),
                ),
            ]),
        )
        .rule(
            "executable",
            Rule::choice(vec![executable("fncall", "idyll-fn"), executable("trigger", "idyll-trigger")]),
        )
        .rule(
            "params",
            Rule::element(ElementSpec::new("params", ElementKind::Structural).content(ContentModel::Json)),
        )
        .rule(
            "content",
            Rule::element(
                ElementSpec::new("content", ElementKind::Structural)
                    .content(ContentModel::Rich)
                    .children(Rule::repeat(Rule::reference("inline"))),
            ),
        )
        .rule(
            "inline",
            Rule::choice(vec![
                style_element("b"),
                style_element("strong"),
                style_element("i"),
                style_element("em"),
                style_element("u"),
                style_element("s"),
                style_element("del"),
                style_element("code"),
                Rule::element(
                    ElementSpec::new("span", ElementKind::Inline)
                        .content(ContentModel::Rich)
                        .attr(AttributeSpec::new("styles").validate_with(style_list))
                        .children(Rule::repeat(Rule::reference("inline"))),
                ),
                Rule::element(
                    ElementSpec::new("link", ElementKind::Inline)
                        .content(ContentModel::Rich)
                        .attr(AttributeSpec::new("href").required().validate_with(href))
                        .children(Rule::repeat(Rule::reference("inline"))),
                ),
                Rule::element(
                    ElementSpec::new("variable", ElementKind::Inline)
                        .attr(AttributeSpec::new("name").required().pattern(VARIABLE_NAME_PATTERN))
                        .attr(AttributeSpec::new("prompt"))
                        .attr(AttributeSpec::new("value")),
                ),
                Rule::element(
                    ElementSpec::new("mention", ElementKind::Inline)
                        .attr(AttributeSpec::new("id").required().validate_with(non_empty))
                        .attr(AttributeSpec::new("type").required().validate_with(non_empty))
                        .attr(AttributeSpec::new("label").required()),
                ),
                Rule::element(
                    ElementSpec::new("annotation", ElementKind::Inline)
                        .content(ContentModel::Rich)
                        .attr(AttributeSpec::new("title"))
                        .attr(AttributeSpec::new("comment"))
                        .children(Rule::repeat(Rule::reference("inline"))),
                ),
            ]),
        )
        .rule(
            "operation",
            Rule::choice(vec![
                Rule::element(
                    ElementSpec::new("edit:attr", ElementKind::Operation)
                        .attr(block_id_attr("blockId").required())
                        .attr(AttributeSpec::new("name").required().validate_with(non_empty))
                        .attr(AttributeSpec::new("value").required()),
                ),
                Rule::element(
                    ElementSpec::new("edit:content", ElementKind::Operation)
                        .content(ContentModel::Rich)
                        .attr(block_id_attr("blockId").required())
                        .children(Rule::repeat(Rule::reference("inline"))),
                ),
                Rule::element(
                    ElementSpec::new("edit:params", ElementKind::Operation)
                        .content(ContentModel::Json)
                        .attr(block_id_attr("blockId").required()),
                ),
                Rule::element(
                    ElementSpec::new("edit:id", ElementKind::Operation)
                        .attr(block_id_attr("blockId").required())
                        .attr(block_id_attr("newId").required()),
                ),
                Rule::element(
                    position_attrs(ElementSpec::new("insert", ElementKind::Operation))
                        .children(Rule::repeat(Rule::reference("block"))),
                ),
                Rule::element(
                    ElementSpec::new("delete", ElementKind::Operation).attr(block_id_attr("blockId").required()),
                ),
                Rule::element(
                    ElementSpec::new("replace", ElementKind::Operation)
                        .attr(block_id_attr("blockId").required())
                        .children(Rule::repeat(Rule::reference("block"))),
                ),
                Rule::element(
                    position_attrs(ElementSpec::new("move", ElementKind::Operation))
                        .attr(block_id_attr("blockId"))
                        .attr(AttributeSpec::new("blockIds").validate_with(id_list))
                        .attr(block_id_attr("fromBlockId"))
                        .attr(block_id_attr("toBlockId")),
                ),
            ]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_builtin_grammar_has_no_diagnostics() {
        assert!(idyll_grammar().diagnostics().is_empty());
    }

    #[test]
    fn test_element_type_maps() {
        let grammar = idyll_grammar();
        assert_eq!(grammar.element_to_type("h2"), Some("heading"));
        assert_eq!(grammar.element_to_type("fncall"), Some("function_call"));
        assert_eq!(grammar.type_to_elements("heading").len(), 6);
        assert_eq!(grammar.type_to_elements("bold"), ["b".to_string(), "strong".to_string()]);
    }

    #[test]
    fn test_child_validity() {
        let grammar = idyll_grammar();
        assert!(grammar.is_valid_child("document", "p"));
        assert!(grammar.is_valid_child("document", "fncall"));
        assert!(grammar.is_valid_child("bullet_list", "li"));
        assert!(grammar.is_valid_child("list_item", "ul"));
        assert!(grammar.is_valid_child("list_item", "fncall"));
        assert!(grammar.is_valid_child("list_item", "trigger"));
        assert!(grammar.is_valid_child("paragraph", "variable"));
        assert!(grammar.is_valid_child("function_call", "params"));
        assert!(grammar.is_valid_child("diff", "edit:attr"));
        assert!(!grammar.is_valid_child("paragraph", "p"));
        assert!(!grammar.is_valid_child("bullet_list", "p"));
        assert!(!grammar.is_valid_child("document", "li"));
    }

    #[test]
    fn test_classification_sets() {
        let grammar = idyll_grammar();
        assert!(grammar.block_types().contains("paragraph"));
        assert!(grammar.block_types().contains("function_call"));
        assert!(grammar.inline_elements().contains("mention"));
        assert!(!grammar.inline_elements().contains("p"));
    }

    #[test]
    fn test_fncall_attributes() {
        let grammar = idyll_grammar();
        assert!(grammar
            .validate_attributes("fncall", &attrs(&[("idyll-fn", "web:search")]))
            .is_empty());

        let errors = grammar.validate_attributes("fncall", &attrs(&[("enabled", "maybe")]));
        assert_eq!(errors.len(), 2);
    }
}
