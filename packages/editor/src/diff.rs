//! # Diff Application
//!
//! Applies an ordered batch of [`EditOperation`]s to a node list.
//!
//! ## Semantics
//!
//! - **All-or-nothing**: the input tree and every operation's shape are
//!   validated before anything is applied. Operations then run in order
//!   against a copy; the first failure discards the copy and hands the
//!   original vector back untouched.
//! - **In order**: later operations see the results of earlier ones, so an
//!   operation may target a node inserted earlier in the same batch.
//! - **Unique ids**: checked on the input and again on the result, together
//!   with the function-name grammar of executable nodes.

use crate::errors::DiffError;
use crate::operation::DiffOp;
use idyll_parser::{validate_nodes, DiffDocument, EditOperation, IdyllDocument, Node};
use tracing::{debug, info, warn};

pub type DiffOutcome<T> = Result<T, DiffError>;

/// Result of [`apply_diff`]. On failure `nodes` is the caller's original list.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult {
    pub success: bool,
    pub nodes: Vec<Node>,
    pub error: Option<DiffError>,
}

/// Apply a batch, taking ownership of the tree and always giving a tree back
pub fn apply_diff(nodes: Vec<Node>, operations: &[EditOperation]) -> DiffResult {
    match apply_to_copy(&nodes, operations) {
        Ok(updated) => DiffResult {
            success: true,
            nodes: updated,
            error: None,
        },
        Err(error) => {
            warn!(error = %error, "Diff rejected, tree left unchanged");
            DiffResult {
                success: false,
                nodes,
                error: Some(error),
            }
        }
    }
}

/// Apply a batch to a borrowed tree, returning the edited copy
pub fn try_apply_diff(nodes: &[Node], operations: &[EditOperation]) -> DiffOutcome<Vec<Node>> {
    apply_to_copy(nodes, operations)
}

/// Apply a diff document, checking that it targets `document`
pub fn apply_diff_document(document: &IdyllDocument, diff: &DiffDocument) -> DiffOutcome<IdyllDocument> {
    if let Some(target) = &diff.target_document {
        if *target != document.id {
            return Err(DiffError::TargetMismatch {
                expected: target.clone(),
                found: document.id.clone(),
            });
        }
    }

    Ok(IdyllDocument {
        id: document.id.clone(),
        nodes: apply_to_copy(&document.nodes, &diff.operations)?,
        metadata: document.metadata.clone(),
    })
}

fn apply_to_copy(nodes: &[Node], operations: &[EditOperation]) -> DiffOutcome<Vec<Node>> {
    let errors = validate_nodes(nodes);
    if !errors.is_empty() {
        return Err(DiffError::InvalidInput(errors));
    }

    for (index, operation) in operations.iter().enumerate() {
        operation.validate().map_err(|source| DiffError::Operation {
            index,
            operation: operation.name(),
            source,
        })?;
    }

    let mut working = nodes.to_vec();
    for (index, operation) in operations.iter().enumerate() {
        debug!(index, operation = operation.name(), "Applying operation");
        operation.apply(&mut working).map_err(|source| DiffError::Operation {
            index,
            operation: operation.name(),
            source,
        })?;
    }

    let errors = validate_nodes(&working);
    if !errors.is_empty() {
        return Err(DiffError::InvalidResult(errors));
    }

    info!(operations = operations.len(), nodes = working.len(), "Diff applied");
    Ok(working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OperationError;

    fn doc_nodes() -> Vec<Node> {
        vec![Node::paragraph("a", "A"), Node::paragraph("b", "B")]
    }

    #[test]
    fn test_failure_returns_original_allocation() {
        let nodes = doc_nodes();
        let ptr = nodes.as_ptr();

        let result = apply_diff(nodes, &[EditOperation::delete("a"), EditOperation::delete("missing")]);

        assert!(!result.success);
        assert_eq!(result.nodes.as_ptr(), ptr);
        assert_eq!(result.nodes, doc_nodes());
        assert_eq!(result.error.as_ref().and_then(DiffError::operation_index), Some(1));
    }

    #[test]
    fn test_shape_errors_caught_before_apply() {
        let ops = vec![
            EditOperation::delete("a"),
            EditOperation::move_node("b"),
        ];
        let err = try_apply_diff(&doc_nodes(), &ops).unwrap_err();
        assert!(matches!(
            err,
            DiffError::Operation {
                index: 1,
                source: OperationError::InvalidOperation(_),
                ..
            }
        ));
    }

    #[test]
    fn test_target_mismatch() {
        let document = IdyllDocument::new("doc-1", doc_nodes());
        let diff = DiffDocument {
            target_document: Some("doc-2".to_string()),
            operations: vec![],
        };
        assert!(matches!(apply_diff_document(&document, &diff), Err(DiffError::TargetMismatch { .. })));
    }
}
