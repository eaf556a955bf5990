//! Per-operation validation and application.
//!
//! Operations work on a node list in place. The batch logic in
//! [`crate::diff`] runs them against a private copy, so a failing operation
//! never leaves a half-edited tree visible to callers.

use crate::errors::OperationError;
use idyll_parser::{
    collect_ids, contains_id, find_node_mut, resolve_move_target, resolve_position, traverse_nodes, EditOperation,
    MoveTarget, Node, Position,
};
use std::collections::HashSet;
use tracing::debug;

/// Trait for edit operations
///
/// Each operation provides:
/// - Shape validation (markers, required ids) independent of any tree
/// - Apply logic against a node list
pub trait DiffOp {
    /// Check the operation on its own, before any tree is touched
    fn validate(&self) -> Result<(), OperationError>;

    /// Apply this operation to the node list
    fn apply(&self, nodes: &mut Vec<Node>) -> Result<(), OperationError>;

    /// Get a debug name for this operation
    fn name(&self) -> &'static str;
}

impl DiffOp for EditOperation {
    fn validate(&self) -> Result<(), OperationError> {
        match self {
            EditOperation::EditAttr { block_id, name, .. } => {
                require_id("blockId", block_id)?;
                if name.trim().is_empty() {
                    return Err(OperationError::InvalidOperation("attribute name must not be empty".to_string()));
                }
                if name == "id" {
                    return Err(OperationError::InvalidOperation(
                        "node ids are changed with edit:id, not edit:attr".to_string(),
                    ));
                }
                Ok(())
            }
            EditOperation::EditContent { block_id, .. }
            | EditOperation::EditParams { block_id, .. }
            | EditOperation::Delete { block_id } => require_id("blockId", block_id),
            EditOperation::EditId { block_id, new_id } => {
                require_id("blockId", block_id)?;
                require_id("newId", new_id)
            }
            EditOperation::Insert {
                after_block_id,
                at_start,
                at_end,
                nodes,
            } => {
                resolve_position(after_block_id.as_deref(), *at_start, *at_end)
                    .map_err(OperationError::InvalidOperation)?;
                require_nodes(nodes)
            }
            EditOperation::Replace { block_id, nodes } => {
                require_id("blockId", block_id)?;
                require_nodes(nodes)
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
                resolve_move_target(
                    block_id.as_deref(),
                    block_ids.as_deref(),
                    from_block_id.as_deref(),
                    to_block_id.as_deref(),
                )
                .map_err(OperationError::InvalidOperation)?;
                resolve_position(after_block_id.as_deref(), *at_start, *at_end)
                    .map_err(OperationError::InvalidOperation)?;
                Ok(())
            }
        }
    }

    fn apply(&self, nodes: &mut Vec<Node>) -> Result<(), OperationError> {
        match self {
            EditOperation::EditAttr { block_id, name, value } => {
                let node = find_node_mut(nodes, block_id).ok_or_else(|| OperationError::NodeNotFound(block_id.clone()))?;
                match node {
                    Node::Content(content) => {
                        content.props.insert(name.clone(), value.clone());
                        Ok(())
                    }
                    Node::Executable(_) => Err(OperationError::NotContentNode(block_id.clone())),
                }
            }

            EditOperation::EditContent { block_id, content } => {
                let node = find_node_mut(nodes, block_id).ok_or_else(|| OperationError::NodeNotFound(block_id.clone()))?;
                *node.rich_content_mut() = content.clone();
                Ok(())
            }

            EditOperation::EditParams { block_id, params } => {
                let node = find_node_mut(nodes, block_id).ok_or_else(|| OperationError::NodeNotFound(block_id.clone()))?;
                match node {
                    Node::Executable(exec) => {
                        exec.parameters = params.clone();
                        Ok(())
                    }
                    Node::Content(_) => Err(OperationError::NotExecutable(block_id.clone())),
                }
            }

            EditOperation::EditId { block_id, new_id } => {
                if !contains_id(nodes, block_id) {
                    return Err(OperationError::NodeNotFound(block_id.clone()));
                }
                if block_id == new_id {
                    return Ok(());
                }
                if contains_id(nodes, new_id) {
                    return Err(OperationError::DuplicateId(new_id.clone()));
                }
                if let Some(node) = find_node_mut(nodes, block_id) {
                    node.set_id(new_id.clone());
                }
                Ok(())
            }

            EditOperation::Insert {
                after_block_id,
                at_start,
                at_end,
                nodes: inserted,
            } => {
                let position = resolve_position(after_block_id.as_deref(), *at_start, *at_end)
                    .map_err(OperationError::InvalidOperation)?;
                check_fresh_ids(nodes, inserted)?;
                insert_at(nodes, &position, inserted.clone())
            }

            EditOperation::Delete { block_id } => {
                remove_node(nodes, block_id)?;
                Ok(())
            }

            EditOperation::Replace {
                block_id,
                nodes: replacement,
            } => {
                let path = locate(nodes, block_id).ok_or_else(|| OperationError::NodeNotFound(block_id.clone()))?;
                let (index, parent_path) = split_path(&path)?;
                let siblings = container_mut(nodes, parent_path)
                    .ok_or_else(|| OperationError::InvalidStructure(format!("parent of {block_id} has no children")))?;
                siblings.remove(index);
                check_fresh_ids(nodes, replacement)?;

                let siblings = container_mut(nodes, parent_path)
                    .ok_or_else(|| OperationError::InvalidStructure(format!("parent of {block_id} has no children")))?;
                siblings.splice(index..index, replacement.iter().cloned());
                Ok(())
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
                let target = resolve_move_target(
                    block_id.as_deref(),
                    block_ids.as_deref(),
                    from_block_id.as_deref(),
                    to_block_id.as_deref(),
                )
                .map_err(OperationError::InvalidOperation)?;
                let position = resolve_position(after_block_id.as_deref(), *at_start, *at_end)
                    .map_err(OperationError::InvalidOperation)?;
                apply_move(nodes, target, position)
            }
        }
    }

    fn name(&self) -> &'static str {
        EditOperation::name(self)
    }
}

fn require_id(attribute: &str, id: &str) -> Result<(), OperationError> {
    if id.trim().is_empty() {
        return Err(OperationError::InvalidOperation(format!("{attribute} must not be empty")));
    }
    Ok(())
}

fn require_nodes(nodes: &[Node]) -> Result<(), OperationError> {
    if nodes.is_empty() {
        return Err(OperationError::InvalidOperation("operation carries no nodes".to_string()));
    }
    if let Some(node) = traverse_nodes(nodes).find(|node| node.id().trim().is_empty()) {
        return Err(OperationError::InvalidOperation(format!(
            "carried {} node has an empty id",
            node.node_type()
        )));
    }
    Ok(())
}

/// New nodes may not reuse ids of the tree or of each other
fn check_fresh_ids(tree: &[Node], incoming: &[Node]) -> Result<(), OperationError> {
    let existing: HashSet<&str> = collect_ids(tree).into_iter().collect();
    let mut seen = HashSet::new();
    for id in collect_ids(incoming) {
        if existing.contains(id) || !seen.insert(id) {
            return Err(OperationError::DuplicateId(id.to_string()));
        }
    }
    Ok(())
}

/// Child-index path from the top-level list down to the node with `id`
fn locate(nodes: &[Node], id: &str) -> Option<Vec<usize>> {
    for (index, node) in nodes.iter().enumerate() {
        if node.id() == id {
            return Some(vec![index]);
        }
        if let Some(children) = node.children() {
            if let Some(mut path) = locate(children, id) {
                path.insert(0, index);
                return Some(path);
            }
        }
    }
    None
}

fn split_path(path: &[usize]) -> Result<(usize, &[usize]), OperationError> {
    path.split_last()
        .map(|(index, parent)| (*index, parent))
        .ok_or_else(|| OperationError::InvalidStructure("empty node path".to_string()))
}

/// The sibling list reached by following `parent_path`
fn container_mut<'a>(nodes: &'a mut Vec<Node>, parent_path: &[usize]) -> Option<&'a mut Vec<Node>> {
    let Some((first, rest)) = parent_path.split_first() else {
        return Some(nodes);
    };
    let children = nodes.get_mut(*first)?.children_mut()?;
    container_mut(children, rest)
}

/// Remove a node (and its subtree) wherever it sits
fn remove_node(nodes: &mut Vec<Node>, id: &str) -> Result<Node, OperationError> {
    let path = locate(nodes, id).ok_or_else(|| OperationError::NodeNotFound(id.to_string()))?;
    let (index, parent_path) = split_path(&path)?;
    let siblings = container_mut(nodes, parent_path)
        .ok_or_else(|| OperationError::InvalidStructure(format!("parent of {id} has no children")))?;
    Ok(siblings.remove(index))
}

fn insert_at(nodes: &mut Vec<Node>, position: &Position, inserted: Vec<Node>) -> Result<(), OperationError> {
    match position {
        Position::Start => {
            nodes.splice(0..0, inserted);
        }
        Position::End => nodes.extend(inserted),
        Position::After(anchor) => {
            let path = locate(nodes, anchor).ok_or_else(|| OperationError::NodeNotFound(anchor.clone()))?;
            let (index, parent_path) = split_path(&path)?;
            let siblings = container_mut(nodes, parent_path)
                .ok_or_else(|| OperationError::InvalidStructure(format!("parent of {anchor} has no children")))?;
            siblings.splice(index + 1..index + 1, inserted);
        }
    }
    Ok(())
}

fn apply_move(nodes: &mut Vec<Node>, target: MoveTarget, position: Position) -> Result<(), OperationError> {
    let ids = match target {
        MoveTarget::Single(id) => {
            if position == Position::After(id.clone()) {
                // Anchored on itself: already in place
                return if contains_id(nodes, &id) {
                    Ok(())
                } else {
                    Err(OperationError::NodeNotFound(id))
                };
            }
            vec![id]
        }
        MoveTarget::Bulk(ids) => in_document_order(nodes, ids)?,
        MoveTarget::Range { from, to } => range_ids(nodes, &from, &to)?,
    };

    // Moved subtrees may not contain one another or the anchor
    let mut covered: HashSet<String> = HashSet::new();
    for id in &ids {
        let path = locate(nodes, id).ok_or_else(|| OperationError::NodeNotFound(id.clone()))?;
        if covered.contains(id) {
            return Err(OperationError::InvalidStructure(format!(
                "{id} is nested inside another moved node"
            )));
        }
        let subtree = node_at(nodes, &path).map(|node| collect_ids(std::slice::from_ref(node)));
        covered.extend(subtree.into_iter().flatten().map(str::to_string));
    }
    if let Position::After(anchor) = &position {
        if covered.contains(anchor) {
            return Err(OperationError::InvalidStructure(format!(
                "cannot move nodes after {anchor}, which is being moved"
            )));
        }
    }

    let mut moved = Vec::with_capacity(ids.len());
    for id in &ids {
        moved.push(remove_node(nodes, id)?);
    }

    debug!(count = moved.len(), "Moving nodes");
    insert_at(nodes, &position, moved)
}

fn node_at<'a>(nodes: &'a [Node], path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    let node = nodes.get(*first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        node_at(node.children()?, rest)
    }
}

/// Deduplicate and sort ids by pre-order position in the tree
fn in_document_order(nodes: &[Node], ids: Vec<String>) -> Result<Vec<String>, OperationError> {
    let wanted: HashSet<String> = ids.into_iter().collect();
    let ordered: Vec<String> = traverse_nodes(nodes)
        .map(Node::id)
        .filter(|id| wanted.contains(*id))
        .map(str::to_string)
        .collect();

    if ordered.len() != wanted.len() {
        let missing = wanted
            .iter()
            .find(|id| !ordered.contains(id))
            .cloned()
            .unwrap_or_default();
        return Err(OperationError::NodeNotFound(missing));
    }
    Ok(ordered)
}

/// Ids of the contiguous sibling run `from..=to`
fn range_ids(nodes: &[Node], from: &str, to: &str) -> Result<Vec<String>, OperationError> {
    let from_path = locate(nodes, from).ok_or_else(|| OperationError::NodeNotFound(from.to_string()))?;
    let to_path = locate(nodes, to).ok_or_else(|| OperationError::NodeNotFound(to.to_string()))?;
    let (start, from_parent) = split_path(&from_path)?;
    let (end, to_parent) = split_path(&to_path)?;

    if from_parent != to_parent {
        return Err(OperationError::InvalidStructure(format!(
            "{from} and {to} are not siblings"
        )));
    }
    if start > end {
        return Err(OperationError::InvalidStructure(format!("{from} comes after {to}")));
    }

    let siblings = if from_parent.is_empty() {
        nodes
    } else {
        node_at(nodes, from_parent)
            .and_then(Node::children)
            .ok_or_else(|| OperationError::InvalidStructure(format!("parent of {from} has no children")))?
    };
    Ok(siblings[start..=end].iter().map(|node| node.id().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idyll_parser::ContentNode;

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(Node::id).collect()
    }

    fn list(id: &str, items: &[&str]) -> Node {
        ContentNode::new(id, "bullet_list")
            .with_children(items.iter().map(|item| ContentNode::new(*item, "list_item").into()).collect())
            .into()
    }

    #[test]
    fn test_locate_nested() {
        let nodes = vec![Node::paragraph("a", ""), list("l", &["x", "y"])];
        assert_eq!(locate(&nodes, "y"), Some(vec![1, 1]));
        assert_eq!(locate(&nodes, "missing"), None);
    }

    #[test]
    fn test_validate_rejects_conflicting_markers() {
        let op = EditOperation::insert_at_start(vec![Node::paragraph("n", "")]).to(Position::End);
        assert!(matches!(op.validate(), Err(OperationError::InvalidOperation(_))));

        let op = EditOperation::edit_attr("p", "id", "q");
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_delete_nested_node() {
        let mut nodes = vec![list("l", &["x", "y"])];
        EditOperation::delete("x").apply(&mut nodes).unwrap();
        assert_eq!(ids(nodes[0].children().unwrap()), vec!["y"]);
    }

    #[test]
    fn test_insert_after_nested_anchor() {
        let mut nodes = vec![list("l", &["x", "y"])];
        EditOperation::insert_after("x", vec![ContentNode::new("new", "list_item").into()])
            .apply(&mut nodes)
            .unwrap();
        assert_eq!(ids(nodes[0].children().unwrap()), vec!["x", "new", "y"]);
    }

    #[test]
    fn test_range_requires_siblings() {
        let nodes = vec![Node::paragraph("a", ""), list("l", &["x", "y"])];
        assert!(range_ids(&nodes, "a", "y").is_err());
        assert_eq!(range_ids(&nodes, "x", "y").unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_move_into_own_subtree_fails() {
        let mut nodes = vec![list("l", &["x", "y"]), Node::paragraph("p", "")];
        let err = EditOperation::move_node("l")
            .to(Position::After("x".to_string()))
            .apply(&mut nodes)
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidStructure(_)));
    }
}
