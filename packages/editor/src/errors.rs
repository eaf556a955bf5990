//! Error types for the diff applier

use idyll_parser::ValidationError;
use thiserror::Error;

/// Failure of a single operation, before its position in the batch is known
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node id already in use: {0}")]
    DuplicateId(String),

    #[error("Node is not executable: {0}")]
    NotExecutable(String),

    #[error("Node is not a content node: {0}")]
    NotContentNode(String),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffError {
    #[error("Input tree is invalid: {}", join(.0))]
    InvalidInput(Vec<ValidationError>),

    #[error("Operation {index} ({operation}) failed: {source}")]
    Operation {
        index: usize,
        operation: &'static str,
        source: OperationError,
    },

    #[error("Resulting tree is invalid: {}", join(.0))]
    InvalidResult(Vec<ValidationError>),

    #[error("Diff targets document '{expected}' but was applied to '{found}'")]
    TargetMismatch { expected: String, found: String },
}

impl DiffError {
    /// Index of the failing operation, when one operation is to blame
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            DiffError::Operation { index, .. } => Some(*index),
            _ => None,
        }
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
