//! # Grammar DSL
//!
//! Declarative description of the markup: which elements exist, which AST
//! type each one produces, which attributes it accepts and which elements may
//! appear inside it.
//!
//! Rules are built from six combinators:
//!
//! ```text
//! Terminal(ElementSpec)   binds one XML element
//! Choice([..])            any of
//! Sequence([..])          all of, in order
//! Repeat(rule)            zero or more
//! Optional(rule)          zero or one
//! Ref("name")             another top-level rule, resolved at compile time
//! ```
//!
//! A [`GrammarRules`] set is compiled once into a [`CompiledGrammar`] lookup
//! structure; see [`compile`].

mod compiler;
mod idyll;

pub use compiler::{compile, infer_ast_type, CompiledGrammar};
pub use idyll::{idyll_grammar, idyll_rules};

/// Custom attribute check. Returns the failure message on rejection.
pub type AttributeValidator = fn(&str) -> Result<(), String>;

/// How an element's children are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentModel {
    /// Literal text only
    Text,
    /// Inline rich content (styled text, links, variables, ...)
    Rich,
    /// A JSON object, usually wrapped in CDATA
    Json,
    /// No inline content; structural children only
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Block,
    Inline,
    Executable,
    Structural,
    Operation,
}

#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: String,
    pub required: bool,
    pub values: Option<Vec<String>>,
    pub pattern: Option<String>,
    pub validator: Option<AttributeValidator>,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            values: None,
            pattern: None,
            validator: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn validate_with(mut self, validator: AttributeValidator) -> Self {
        self.validator = Some(validator);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub element: String,
    pub kind: ElementKind,
    pub content: ContentModel,
    pub attributes: Vec<AttributeSpec>,
    pub children: Option<Box<Rule>>,
}

impl ElementSpec {
    pub fn new(element: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            element: element.into(),
            kind,
            content: ContentModel::None,
            attributes: Vec::new(),
            children: None,
        }
    }

    pub fn content(mut self, content: ContentModel) -> Self {
        self.content = content;
        self
    }

    pub fn attr(mut self, attribute: AttributeSpec) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn children(mut self, rule: Rule) -> Self {
        self.children = Some(Box::new(rule));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone)]
pub enum Rule {
    Terminal(ElementSpec),
    Choice(Vec<Rule>),
    Sequence(Vec<Rule>),
    Repeat(Box<Rule>),
    Optional(Box<Rule>),
    Ref(String),
}

impl Rule {
    pub fn element(spec: ElementSpec) -> Self {
        Rule::Terminal(spec)
    }

    pub fn choice(rules: Vec<Rule>) -> Self {
        Rule::Choice(rules)
    }

    pub fn sequence(rules: Vec<Rule>) -> Self {
        Rule::Sequence(rules)
    }

    pub fn repeat(rule: Rule) -> Self {
        Rule::Repeat(Box::new(rule))
    }

    pub fn optional(rule: Rule) -> Self {
        Rule::Optional(Box::new(rule))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Rule::Ref(name.into())
    }
}

/// Named top-level rules, in declaration order
#[derive(Debug, Clone, Default)]
pub struct GrammarRules {
    rules: Vec<(String, Rule)>,
}

impl GrammarRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.rules.push((name.into(), rule));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(n, r)| (n.as_str(), r))
    }
}
