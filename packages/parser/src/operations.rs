//! Edit operations carried by diff documents.
//!
//! Operations keep their position markers exactly as written (several
//! optional fields) so that conflicting or missing markers can be reported
//! by the diff applier. [`resolve_position`] and [`resolve_move_target`] turn
//! the raw markers into a single unambiguous target.

use crate::ast::{Node, Props, RichContent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EditOperation {
    /// Set one prop on a content node
    #[serde(rename = "edit:attr", rename_all = "camelCase")]
    EditAttr {
        block_id: String,
        name: String,
        value: Value,
    },

    /// Replace content (instructions, for executable nodes) wholesale
    #[serde(rename = "edit:content", rename_all = "camelCase")]
    EditContent {
        block_id: String,
        content: Vec<RichContent>,
    },

    /// Replace the parameters of an executable node wholesale
    #[serde(rename = "edit:params", rename_all = "camelCase")]
    EditParams { block_id: String, params: Props },

    #[serde(rename = "edit:id", rename_all = "camelCase")]
    EditId { block_id: String, new_id: String },

    #[serde(rename = "insert", rename_all = "camelCase")]
    Insert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_block_id: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        at_start: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        at_end: bool,
        nodes: Vec<Node>,
    },

    #[serde(rename = "delete", rename_all = "camelCase")]
    Delete { block_id: String },

    #[serde(rename = "replace", rename_all = "camelCase")]
    Replace { block_id: String, nodes: Vec<Node> },

    #[serde(rename = "move", rename_all = "camelCase")]
    Move {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_ids: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_block_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_block_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_block_id: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        at_start: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        at_end: bool,
    },
}

/// Where inserted or moved nodes land
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    After(String),
    Start,
    End,
}

/// Which nodes a move relocates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    Single(String),
    Bulk(Vec<String>),
    Range { from: String, to: String },
}

/// Exactly one of `afterBlockId`, `atStart`, `atEnd` must be given
pub fn resolve_position(after_block_id: Option<&str>, at_start: bool, at_end: bool) -> Result<Position, String> {
    match (after_block_id, at_start, at_end) {
        (Some(anchor), false, false) => Ok(Position::After(anchor.to_string())),
        (None, true, false) => Ok(Position::Start),
        (None, false, true) => Ok(Position::End),
        (None, false, false) => Err("missing position: expected one of afterBlockId, atStart, atEnd".to_string()),
        _ => Err("conflicting positions: only one of afterBlockId, atStart, atEnd may be given".to_string()),
    }
}

/// Exactly one of `blockId`, `blockIds`, or the `fromBlockId`/`toBlockId` pair
pub fn resolve_move_target(
    block_id: Option<&str>,
    block_ids: Option<&[String]>,
    from_block_id: Option<&str>,
    to_block_id: Option<&str>,
) -> Result<MoveTarget, String> {
    let range = match (from_block_id, to_block_id) {
        (Some(from), Some(to)) => Some((from, to)),
        (None, None) => None,
        _ => return Err("range moves need both fromBlockId and toBlockId".to_string()),
    };

    match (block_id, block_ids, range) {
        (Some(id), None, None) => Ok(MoveTarget::Single(id.to_string())),
        (None, Some(ids), None) => {
            if ids.is_empty() {
                return Err("blockIds must not be empty".to_string());
            }
            Ok(MoveTarget::Bulk(ids.to_vec()))
        }
        (None, None, Some((from, to))) => Ok(MoveTarget::Range {
            from: from.to_string(),
            to: to.to_string(),
        }),
        (None, None, None) => Err("missing move target: expected blockId, blockIds, or fromBlockId/toBlockId".to_string()),
        _ => Err("conflicting move targets: only one of blockId, blockIds, fromBlockId/toBlockId may be given".to_string()),
    }
}

impl EditOperation {
    /// Markup element name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            EditOperation::EditAttr { .. } => "edit:attr",
            EditOperation::EditContent { .. } => "edit:content",
            EditOperation::EditParams { .. } => "edit:params",
            EditOperation::EditId { .. } => "edit:id",
            EditOperation::Insert { .. } => "insert",
            EditOperation::Delete { .. } => "delete",
            EditOperation::Replace { .. } => "replace",
            EditOperation::Move { .. } => "move",
        }
    }

    pub fn edit_attr(block_id: impl Into<String>, name: impl Into<String>, value: impl Into<Value>) -> Self {
        EditOperation::EditAttr {
            block_id: block_id.into(),
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn insert_after(anchor: impl Into<String>, nodes: Vec<Node>) -> Self {
        EditOperation::Insert {
            after_block_id: Some(anchor.into()),
            at_start: false,
            at_end: false,
            nodes,
        }
    }

    pub fn insert_at_start(nodes: Vec<Node>) -> Self {
        EditOperation::Insert {
            after_block_id: None,
            at_start: true,
            at_end: false,
            nodes,
        }
    }

    pub fn insert_at_end(nodes: Vec<Node>) -> Self {
        EditOperation::Insert {
            after_block_id: None,
            at_start: false,
            at_end: true,
            nodes,
        }
    }

    pub fn delete(block_id: impl Into<String>) -> Self {
        EditOperation::Delete {
            block_id: block_id.into(),
        }
    }

    pub fn replace(block_id: impl Into<String>, nodes: Vec<Node>) -> Self {
        EditOperation::Replace {
            block_id: block_id.into(),
            nodes,
        }
    }

    /// Move a single node; the destination is set with [`EditOperation::to`]
    pub fn move_node(block_id: impl Into<String>) -> Self {
        EditOperation::Move {
            block_id: Some(block_id.into()),
            block_ids: None,
            from_block_id: None,
            to_block_id: None,
            after_block_id: None,
            at_start: false,
            at_end: false,
        }
    }

    pub fn move_nodes<I, S>(block_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EditOperation::Move {
            block_id: None,
            block_ids: Some(block_ids.into_iter().map(Into::into).collect()),
            from_block_id: None,
            to_block_id: None,
            after_block_id: None,
            at_start: false,
            at_end: false,
        }
    }

    pub fn move_range(from: impl Into<String>, to: impl Into<String>) -> Self {
        EditOperation::Move {
            block_id: None,
            block_ids: None,
            from_block_id: Some(from.into()),
            to_block_id: Some(to.into()),
            after_block_id: None,
            at_start: false,
            at_end: false,
        }
    }

    /// Set the destination of an insert or move. Markers accumulate, so
    /// calling this twice yields a conflicting operation.
    pub fn to(mut self, position: Position) -> Self {
        if let EditOperation::Insert {
            after_block_id,
            at_start,
            at_end,
            ..
        }
        | EditOperation::Move {
            after_block_id,
            at_start,
            at_end,
            ..
        } = &mut self
        {
            match position {
                Position::After(anchor) => *after_block_id = Some(anchor),
                Position::Start => *at_start = true,
                Position::End => *at_end = true,
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_json_uses_markup_names() {
        let op = EditOperation::edit_attr("p1", "level", 2);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "edit:attr");
        assert_eq!(json["blockId"], "p1");

        let parsed: EditOperation =
            serde_json::from_str(r#"{"type": "move", "blockIds": ["a", "b"], "atEnd": true}"#).unwrap();
        assert_eq!(parsed, EditOperation::move_nodes(["a", "b"]).to(Position::End));
    }

    #[test]
    fn test_position_markers_must_be_exclusive() {
        assert_eq!(resolve_position(Some("a"), false, false), Ok(Position::After("a".to_string())));
        assert!(resolve_position(None, true, true).is_err());
        assert!(resolve_position(Some("a"), false, true).is_err());
        assert!(resolve_position(None, false, false).is_err());
    }

    #[test]
    fn test_move_targets_must_be_exclusive() {
        let ids = vec!["a".to_string()];
        assert!(resolve_move_target(Some("a"), Some(&ids), None, None).is_err());
        assert!(resolve_move_target(None, None, Some("a"), None).is_err());
        assert_eq!(
            resolve_move_target(None, None, Some("a"), Some("c")),
            Ok(MoveTarget::Range {
                from: "a".to_string(),
                to: "c".to_string()
            })
        );
    }
}
