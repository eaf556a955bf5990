//! # Idyll Parser
//!
//! Grammar-driven parser and serializer for Idyll markup: rich documents,
//! agent documents, and diff documents describing edits to them.
//!
//! ```text
//! markup ──parse──▶ ParsedDocument ──serialize──▶ markup
//! ```
//!
//! Parsing then serializing then parsing again yields a tree equal to the
//! first parse. The AST is plain data and serializes to JSON with serde.

pub mod ast;
pub mod error;
pub mod grammar;
pub mod id_generator;
pub mod operations;
pub mod parser;
pub mod serializer;
pub mod traverse;
pub mod validation;
mod xml;

pub use ast::*;
pub use error::{GrammarError, ParseError, ParseResult, ValidationError, ValidationErrorType};
pub use grammar::{compile, idyll_grammar, CompiledGrammar, GrammarRules};
pub use id_generator::{get_document_id, IDGenerator};
pub use operations::{resolve_move_target, resolve_position, EditOperation, MoveTarget, Position};
pub use parser::{parse, parse_diff, parse_document, Parser};
pub use serializer::{serialize, serialize_document, serialize_nodes, Serializer};
pub use traverse::{collect_ids, contains_id, find_node, find_node_mut, traverse_nodes, traverse_rich_content};
pub use validation::{is_valid_function_name, validate_document, validate_nodes};
