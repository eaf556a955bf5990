//! Depth-first traversal helpers over node and inline-content trees.
//!
//! Iterators are lazy and pre-order. Each call to [`traverse_nodes`] starts a
//! fresh walk, so the same tree can be traversed any number of times.

use crate::ast::{Node, RichContent};

/// Pre-order iterator over a node forest, descending into `children`
#[derive(Debug, Clone)]
pub struct NodeIter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Some(children) = node.children() {
            self.stack.extend(children.iter().rev());
        }
        Some(node)
    }
}

pub fn traverse_nodes(nodes: &[Node]) -> NodeIter<'_> {
    NodeIter {
        stack: nodes.iter().rev().collect(),
    }
}

/// Pre-order iterator over inline content, descending into links and annotations
#[derive(Debug, Clone)]
pub struct RichContentIter<'a> {
    stack: Vec<&'a RichContent>,
}

impl<'a> Iterator for RichContentIter<'a> {
    type Item = &'a RichContent;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.stack.pop()?;
        if let Some(nested) = item.nested() {
            self.stack.extend(nested.iter().rev());
        }
        Some(item)
    }
}

pub fn traverse_rich_content(content: &[RichContent]) -> RichContentIter<'_> {
    RichContentIter {
        stack: content.iter().rev().collect(),
    }
}

pub fn find_node<'a>(nodes: &'a [Node], id: &str) -> Option<&'a Node> {
    traverse_nodes(nodes).find(|node| node.id() == id)
}

pub fn find_node_mut<'a>(nodes: &'a mut [Node], id: &str) -> Option<&'a mut Node> {
    for node in nodes.iter_mut() {
        if node.id() == id {
            return Some(node);
        }
        if let Some(children) = node.children_mut() {
            if let Some(found) = find_node_mut(children, id) {
                return Some(found);
            }
        }
    }
    None
}

pub fn contains_id(nodes: &[Node], id: &str) -> bool {
    find_node(nodes, id).is_some()
}

/// Every node id in document order
pub fn collect_ids(nodes: &[Node]) -> Vec<&str> {
    traverse_nodes(nodes).map(Node::id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ContentNode, LinkElement};

    fn nested_tree() -> Vec<Node> {
        vec![
            Node::paragraph("a", "first"),
            ContentNode::new("list", "bullet_list")
                .with_children(vec![
                    ContentNode::new("item-1", "list_item")
                        .with_children(vec![Node::function_call("call", "search")])
                        .into(),
                    ContentNode::new("item-2", "list_item").into(),
                ])
                .into(),
            Node::paragraph("b", "last"),
        ]
    }

    #[test]
    fn test_traversal_is_pre_order() {
        let nodes = nested_tree();
        assert_eq!(collect_ids(&nodes), vec!["a", "list", "item-1", "call", "item-2", "b"]);
    }

    #[test]
    fn test_traversal_is_restartable() {
        let nodes = nested_tree();
        let first: Vec<_> = traverse_nodes(&nodes).map(Node::id).collect();
        let second: Vec<_> = traverse_nodes(&nodes).map(Node::id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_find_nested_node() {
        let mut nodes = nested_tree();
        assert!(find_node(&nodes, "call").unwrap().is_executable_node());
        find_node_mut(&mut nodes, "item-2").unwrap().set_id("renamed");
        assert!(contains_id(&nodes, "renamed"));
        assert!(!contains_id(&nodes, "item-2"));
    }

    #[test]
    fn test_rich_content_descends_into_links() {
        let content = vec![
            RichContent::text("see "),
            RichContent::Link(LinkElement {
                href: "https://example.com".to_string(),
                content: vec![RichContent::variable("site", None)],
            }),
        ];
        let variables = traverse_rich_content(&content).filter(|c| c.is_variable()).count();
        assert_eq!(variables, 1);
    }
}
