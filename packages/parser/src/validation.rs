//! Tree-level validation: id uniqueness and executable naming.
//!
//! These checks are separate from parsing. A document with a badly named
//! function still parses; it just fails validation.

use crate::ast::{IdyllDocument, Node};
use crate::error::{ValidationError, ValidationErrorType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static FUNCTION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z_][A-Za-z0-9_.-]*:)?[A-Za-z_][A-Za-z0-9_-]*$").expect("function name pattern is valid")
});

/// `(module:)?name`
pub fn is_valid_function_name(name: &str) -> bool {
    FUNCTION_NAME.is_match(name)
}

pub fn validate_nodes(nodes: &[Node]) -> Vec<ValidationError> {
    let mut validator = TreeValidator::default();
    validator.visit_list(nodes, "nodes");
    validator.errors
}

pub fn validate_document(document: &IdyllDocument) -> Vec<ValidationError> {
    validate_nodes(&document.nodes)
}

#[derive(Default)]
struct TreeValidator<'a> {
    seen: HashMap<&'a str, String>,
    errors: Vec<ValidationError>,
}

impl<'a> TreeValidator<'a> {
    fn visit_list(&mut self, nodes: &'a [Node], path: &str) {
        for (index, node) in nodes.iter().enumerate() {
            let node_path = format!("{path}[{index}]");
            self.visit_node(node, &node_path);
            if let Some(children) = node.children() {
                self.visit_list(children, &format!("{node_path}.children"));
            }
        }
    }

    fn visit_node(&mut self, node: &'a Node, path: &str) {
        let id = node.id();
        if id.trim().is_empty() {
            self.errors.push(ValidationError::new(
                ValidationErrorType::EmptyId,
                path,
                "Node id must not be empty",
            ));
        } else if let Some(first) = self.seen.get(id) {
            self.errors.push(ValidationError::new(
                ValidationErrorType::DuplicateId,
                path,
                format!("Duplicate node id '{id}' (first used at {first})"),
            ));
        } else {
            self.seen.insert(id, path.to_string());
        }

        if let Node::Executable(exec) = node {
            if !is_valid_function_name(&exec.fn_name) {
                self.errors.push(ValidationError::new(
                    ValidationErrorType::InvalidFunctionName,
                    path,
                    format!("Invalid function name '{}': expected (module:)?name", exec.fn_name),
                ));
            }
        }
    }
}
