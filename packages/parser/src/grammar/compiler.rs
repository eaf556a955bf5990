use super::{ContentModel, ElementKind, ElementSpec, GrammarRules, Rule};
use crate::error::{GrammarError, ValidationError, ValidationErrorType};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// AST type produced by an element. Elements whose markup name differs from
/// their semantic type go through a fixed override table.
pub fn infer_ast_type(element: &str) -> String {
    let ast_type = match element {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
        "fncall" => "function_call",
        "p" => "paragraph",
        "ul" => "bullet_list",
        "ol" => "numbered_list",
        "li" => "list_item",
        "blockquote" => "quote",
        "pre" => "code",
        "hr" => "separator",
        "function" => "function_definition",
        "tool" => "tool_definition",
        "b" | "strong" => "bold",
        "i" | "em" => "italic",
        "u" => "underline",
        "s" | "del" => "strikethrough",
        "code" => "inline_code",
        other => other,
    };
    ast_type.to_string()
}

#[derive(Debug)]
struct CompiledElement {
    spec: ElementSpec,
    patterns: HashMap<String, Regex>,
}

/// Lookup tables derived from a [`GrammarRules`] set
#[derive(Debug, Default)]
pub struct CompiledGrammar {
    element_to_type: HashMap<String, String>,
    type_to_elements: HashMap<String, Vec<String>>,
    elements: HashMap<String, CompiledElement>,
    valid_children: HashMap<String, HashSet<String>>,
    block_types: HashSet<String>,
    inline_elements: HashSet<String>,
    diagnostics: Vec<GrammarError>,
}

/// Compile a rule set. Never fails: malformed pieces (unresolved references,
/// bad patterns) are skipped and recorded in [`CompiledGrammar::diagnostics`].
pub fn compile(rules: &GrammarRules) -> CompiledGrammar {
    let mut grammar = CompiledGrammar::default();

    let mut names = HashSet::new();
    for (name, _) in rules.iter() {
        if !names.insert(name) {
            grammar.diagnostics.push(GrammarError::DuplicateRule(name.to_string()));
        }
    }

    let mut visited = HashSet::new();
    let mut terminals = Vec::new();
    for (_, rule) in rules.iter() {
        collect_terminals(rules, rule, true, &mut visited, &mut terminals, &mut grammar.diagnostics);
    }

    for spec in terminals {
        grammar.register(rules, spec);
    }

    debug!(
        elements = grammar.elements.len(),
        types = grammar.type_to_elements.len(),
        diagnostics = grammar.diagnostics.len(),
        "Grammar compiled"
    );

    grammar
}

/// Walk a rule graph collecting reachable terminals. `descend` controls
/// whether a terminal's own children rule is walked too. Terminals and
/// references are keyed structurally so self-referential rules terminate.
fn collect_terminals<'r>(
    rules: &'r GrammarRules,
    rule: &'r Rule,
    descend: bool,
    visited: &mut HashSet<String>,
    out: &mut Vec<&'r ElementSpec>,
    diagnostics: &mut Vec<GrammarError>,
) {
    match rule {
        Rule::Terminal(spec) => {
            if !visited.insert(format!("el:{}", spec.element)) {
                return;
            }
            out.push(spec);
            if descend {
                if let Some(children) = &spec.children {
                    collect_terminals(rules, children, descend, visited, out, diagnostics);
                }
            }
        }
        Rule::Choice(alternatives) | Rule::Sequence(alternatives) => {
            for alternative in alternatives {
                collect_terminals(rules, alternative, descend, visited, out, diagnostics);
            }
        }
        Rule::Repeat(inner) | Rule::Optional(inner) => {
            collect_terminals(rules, inner, descend, visited, out, diagnostics);
        }
        Rule::Ref(name) => {
            if !visited.insert(format!("ref:{name}")) {
                return;
            }
            match rules.get(name) {
                Some(target) => collect_terminals(rules, target, descend, visited, out, diagnostics),
                None => {
                    warn!(rule = %name, "Unresolved grammar reference");
                    diagnostics.push(GrammarError::UnresolvedReference(name.clone()));
                }
            }
        }
    }
}

impl CompiledGrammar {
    fn register(&mut self, rules: &GrammarRules, spec: &ElementSpec) {
        let ast_type = infer_ast_type(&spec.element);

        self.element_to_type.insert(spec.element.clone(), ast_type.clone());
        let elements = self.type_to_elements.entry(ast_type.clone()).or_default();
        if !elements.contains(&spec.element) {
            elements.push(spec.element.clone());
        }

        match spec.kind {
            ElementKind::Block | ElementKind::Executable => {
                self.block_types.insert(ast_type.clone());
            }
            ElementKind::Inline => {
                self.inline_elements.insert(spec.element.clone());
            }
            ElementKind::Structural | ElementKind::Operation => {}
        }

        let mut patterns = HashMap::new();
        for attribute in &spec.attributes {
            let Some(pattern) = &attribute.pattern else {
                continue;
            };
            match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(regex) => {
                    patterns.insert(attribute.name.clone(), regex);
                }
                Err(e) => self.diagnostics.push(GrammarError::InvalidPattern {
                    element: spec.element.clone(),
                    attribute: attribute.name.clone(),
                    message: e.to_string(),
                }),
            }
        }

        if let Some(children) = &spec.children {
            let mut direct = Vec::new();
            collect_terminals(rules, children, false, &mut HashSet::new(), &mut direct, &mut Vec::new());
            self.valid_children
                .entry(ast_type)
                .or_default()
                .extend(direct.into_iter().map(|child| child.element.clone()));
        }

        self.elements.insert(
            spec.element.clone(),
            CompiledElement {
                spec: spec.clone(),
                patterns,
            },
        );
    }

    pub fn element_to_type(&self, element: &str) -> Option<&str> {
        self.element_to_type.get(element).map(String::as_str)
    }

    /// Elements producing `ast_type`, in declaration order
    pub fn type_to_elements(&self, ast_type: &str) -> &[String] {
        self.type_to_elements.get(ast_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_valid_element(&self, element: &str) -> bool {
        self.elements.contains_key(element)
    }

    pub fn is_valid_child(&self, parent_type: &str, child_element: &str) -> bool {
        self.valid_children
            .get(parent_type)
            .is_some_and(|children| children.contains(child_element))
    }

    pub fn element_spec(&self, element: &str) -> Option<&ElementSpec> {
        self.elements.get(element).map(|compiled| &compiled.spec)
    }

    pub fn content_model(&self, element: &str) -> Option<ContentModel> {
        self.element_spec(element).map(|spec| spec.content)
    }

    pub fn block_types(&self) -> &HashSet<String> {
        &self.block_types
    }

    pub fn inline_elements(&self) -> &HashSet<String> {
        &self.inline_elements
    }

    pub fn is_inline_element(&self, element: &str) -> bool {
        self.inline_elements.contains(element)
    }

    pub fn diagnostics(&self) -> &[GrammarError] {
        &self.diagnostics
    }

    /// Check an element's attributes against its spec, reporting every
    /// violation rather than stopping at the first.
    pub fn validate_attributes(&self, element: &str, attrs: &[(String, String)]) -> Vec<ValidationError> {
        let Some(compiled) = self.elements.get(element) else {
            return vec![ValidationError::new(
                ValidationErrorType::UnknownElement,
                element,
                format!("Unknown element <{element}>"),
            )];
        };

        let mut errors = Vec::new();
        for attribute in &compiled.spec.attributes {
            let path = format!("{element}@{}", attribute.name);
            let value = attrs
                .iter()
                .find(|(name, _)| *name == attribute.name)
                .map(|(_, value)| value.as_str());

            let Some(value) = value else {
                if attribute.required {
                    errors.push(ValidationError::new(
                        ValidationErrorType::MissingAttribute,
                        path,
                        format!("Missing required attribute '{}' on <{element}>", attribute.name),
                    ));
                }
                continue;
            };

            if let Some(allowed) = &attribute.values {
                if !allowed.iter().any(|candidate| candidate == value) {
                    errors.push(ValidationError::new(
                        ValidationErrorType::InvalidAttributeValue,
                        path.clone(),
                        format!(
                            "Attribute '{}' on <{element}> must be one of [{}], got '{value}'",
                            attribute.name,
                            allowed.join(", ")
                        ),
                    ));
                }
            }

            if let Some(regex) = compiled.patterns.get(&attribute.name) {
                if !regex.is_match(value) {
                    errors.push(ValidationError::new(
                        ValidationErrorType::PatternMismatch,
                        path.clone(),
                        format!(
                            "Attribute '{}' on <{element}> does not match pattern '{}'",
                            attribute.name,
                            attribute.pattern.as_deref().unwrap_or_default()
                        ),
                    ));
                }
            }

            if let Some(validator) = attribute.validator {
                if let Err(message) = validator(value) {
                    errors.push(ValidationError::new(ValidationErrorType::CustomValidation, path, message));
                }
            }
        }

        errors
    }
}
