//! Neighbour access for rewrite rules.
//!
//! Rules operate on a `Vec<Node>` and an index. Taking a neighbour out of
//! the vector shifts the index of everything after it, so the helpers
//! that remove to the left update the caller's index in place.

use crate::ast::{Node, NodeKind};
use crate::error::{Error, Result};

/// Which neighbour to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Side {
    Left,
    Right,
}

impl Side {
    fn name(self) -> &'static str {
        match self {
            Side::Left => "lhs",
            Side::Right => "rhs",
        }
    }
}

/// Removes and returns the nearest operand on `side` of `*at`.
///
/// Newlines in between are discarded. A `;` or `,` ends the search.
pub(super) fn take(nodes: &mut Vec<Node>, at: &mut usize, side: Side) -> Option<Node> {
    match side {
        Side::Right => {
            let j = *at + 1;
            while j < nodes.len() {
                if nodes[j].is_separator() {
                    break;
                }
                let node = nodes.remove(j);
                if node.kind != NodeKind::Newline {
                    return Some(node);
                }
            }
            None
        }
        Side::Left => {
            while *at > 0 {
                let j = *at - 1;
                if nodes[j].is_separator() {
                    break;
                }
                let node = nodes.remove(j);
                *at -= 1;
                if node.kind != NodeKind::Newline {
                    return Some(node);
                }
            }
            None
        }
    }
}

/// Like [`take`], but a missing operand is an error positioned at `*at`.
pub(super) fn consume(nodes: &mut Vec<Node>, at: &mut usize, side: Side) -> Result<Node> {
    let (line, column) = (nodes[*at].line, nodes[*at].column);
    take(nodes, at, side)
        .ok_or_else(|| Error::parse(format!("missing token on {}", side.name()), line, column))
}

/// Index of the node [`take`] would return.
pub(super) fn peek_index(nodes: &[Node], at: usize, side: Side) -> Option<usize> {
    let mut j = at;
    loop {
        j = match side {
            Side::Right => j + 1,
            Side::Left => j.checked_sub(1)?,
        };
        let node = nodes.get(j)?;
        if node.is_separator() {
            return None;
        }
        if node.kind != NodeKind::Newline {
            return Some(j);
        }
    }
}

/// The node [`take`] would return, left in place.
pub(super) fn peek(nodes: &[Node], at: usize, side: Side) -> Option<&Node> {
    peek_index(nodes, at, side).map(|j| &nodes[j])
}

/// Removes the node right after `at` if it starts an operand on the same
/// line.
pub(super) fn take_same_line(nodes: &mut Vec<Node>, at: usize) -> Option<Node> {
    let next = nodes.get(at + 1)?;
    if next.kind == NodeKind::Newline || next.is_separator() {
        return None;
    }
    Some(nodes.remove(at + 1))
}

/// True for a node that cannot end an operand, so an operator after it
/// must be a prefix.
pub(super) fn opens_operand(node: &Node) -> bool {
    match node.kind {
        NodeKind::Operator1 | NodeKind::Operator2 => {
            node.children.is_empty() && node.text != "()"
        }
        NodeKind::Keyword | NodeKind::Newline => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: NodeKind, text: &str) -> Node {
        Node::new(kind, text, 1, 0)
    }

    fn row() -> Vec<Node> {
        vec![
            leaf(NodeKind::Label, "a"),
            leaf(NodeKind::Newline, ""),
            leaf(NodeKind::Operator2, "+"),
            leaf(NodeKind::Newline, ""),
            leaf(NodeKind::Label, "b"),
            leaf(NodeKind::Operator1, ";"),
            leaf(NodeKind::Label, "c"),
        ]
    }

    #[test]
    fn test_take_skips_newlines() {
        let mut nodes = row();
        let mut at = 2;
        let rhs = take(&mut nodes, &mut at, Side::Right).unwrap();
        assert_eq!(rhs.text, "b");
        let lhs = take(&mut nodes, &mut at, Side::Left).unwrap();
        assert_eq!(lhs.text, "a");
        assert_eq!(at, 0);
        assert_eq!(nodes[at].text, "+");
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn test_take_stops_at_separator() {
        let mut nodes = row();
        let mut at = 6;
        assert!(take(&mut nodes, &mut at, Side::Left).is_none());
        assert_eq!(at, 6);
        let err = consume(&mut nodes, &mut at, Side::Right).unwrap_err();
        assert!(err.to_string().contains("missing token on rhs"));
    }

    #[test]
    fn test_peek_leaves_nodes() {
        let nodes = row();
        assert_eq!(peek(&nodes, 2, Side::Right).unwrap().text, "b");
        assert_eq!(peek_index(&nodes, 2, Side::Left), Some(0));
        assert_eq!(nodes.len(), 7);
    }

    #[test]
    fn test_take_same_line() {
        let mut nodes = row();
        assert!(take_same_line(&mut nodes, 0).is_none());
        assert!(take_same_line(&mut nodes, 4).is_none());
        assert_eq!(take_same_line(&mut nodes, 3).unwrap().text, "b");
    }
}
