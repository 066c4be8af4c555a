//! Clean-up passes run over the grouped forest.
//!
//! Grouping leaves intermediate shapes behind: argument wrappers, nested
//! comma pairs and raw bracket nodes. [`walk`] settles what every bracket
//! means and [`finish`] converts what is left into final node kinds.

use crate::ast::{BuildKind, Node, NodeKind};
use crate::error::{Error, Result};

/// Replaces every child of `kind` by its own children, recursively.
fn splice_nested(children: &mut Vec<Node>, kind: NodeKind) {
    while let Some(j) = children.iter().position(|c| c.kind == kind) {
        let nested = children.remove(j);
        children.splice(j..j, nested.children);
    }
}

pub(super) fn walk(node: &mut Node) -> Result<()> {
    let mut i = 0;
    while i < node.children.len() {
        let child = &mut node.children[i];
        if matches!(child.kind, NodeKind::Args | NodeKind::Build(BuildKind::List)) {
            splice_nested(&mut child.children, NodeKind::TupleSeparator);
        }
        walk(child)?;

        let kind = child.kind;
        match kind {
            NodeKind::Operator1 if child.text == "()" => match child.children.len() {
                0 => {
                    child.kind = NodeKind::Build(BuildKind::Tuple);
                    child.text.clear();
                }
                1 => {
                    let mut inner = child.children.remove(0);
                    if inner.kind == NodeKind::TupleSeparator {
                        inner.kind = NodeKind::Tuple;
                    }
                    *child = inner;
                }
                _ => {}
            },
            NodeKind::Block if child.text == "{}" => settle_block(child)?,
            NodeKind::Args => {
                let args = node.children.remove(i);
                let count = args.children.len();
                node.children.splice(i..i, args.children);
                i += count;
                continue;
            }
            NodeKind::Slice => splice_nested(&mut child.children, NodeKind::Slice),
            NodeKind::TupleSeparator => {
                splice_nested(&mut child.children, NodeKind::TupleSeparator)
            }
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

/// Decides whether braces hold statements, a set or a map.
fn settle_block(block: &mut Node) -> Result<()> {
    match block.children.len() {
        0 => {
            block.kind = NodeKind::Build(BuildKind::Set);
            block.text.clear();
        }
        1 => {
            let child = block.children.remove(0);
            match child.kind {
                NodeKind::Slice => {
                    block.kind = NodeKind::Build(BuildKind::Map);
                    block.text.clear();
                    block.children = child.children;
                }
                NodeKind::TupleSeparator => {
                    let is_map = child
                        .children
                        .first()
                        .is_some_and(|c| c.kind == NodeKind::Slice);
                    let mut build = child;
                    build.text.clear();
                    if is_map {
                        build.kind = NodeKind::Build(BuildKind::Map);
                        build.children = map_entries(std::mem::take(&mut build.children))?;
                    } else {
                        build.kind = NodeKind::Build(BuildKind::Set);
                    }
                    *block = build;
                }
                _ => *block = child,
            }
        }
        _ => {}
    }
    Ok(())
}

/// Flattens `k: v` slices into alternating keys and values; `**x`
/// entries stay whole.
fn map_entries(entries: Vec<Node>) -> Result<Vec<Node>> {
    let mut flat = Vec::with_capacity(entries.len() * 2);
    for entry in entries {
        match entry.kind {
            NodeKind::Prefix if entry.text == "**" => flat.push(entry),
            NodeKind::Slice => flat.extend(entry.children),
            _ => {
                return Err(Error::parse(
                    "unexpected map element",
                    entry.line,
                    entry.column,
                ));
            }
        }
    }
    Ok(flat)
}

/// Turns leftover comma pairs into tuples and unwraps `(a, b) => ...`
/// parameter lists.
pub(super) fn finish(node: &mut Node) {
    for child in &mut node.children {
        finish(child);
        let kind = child.kind;
        match kind {
            NodeKind::TupleSeparator => child.kind = NodeKind::Tuple,
            NodeKind::ParamList
                if child.children.len() == 1 && child.children[0].kind == NodeKind::Tuple =>
            {
                let tuple = child.children.remove(0);
                child.children = tuple.children;
            }
            _ => {}
        }
    }
}
