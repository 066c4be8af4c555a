//! Structural rules: brackets, attribute access, exec lines, imports and
//! string concatenation.

use super::Parent;
use super::cursor::{Side, consume};
use super::rules::group;
use crate::ast::{BuildKind, Node, NodeKind};
use crate::error::{Error, Result};

fn closing(open: &str) -> Option<&'static str> {
    match open {
        "(" => Some(")"),
        "[" => Some("]"),
        "{" => Some("}"),
        _ => None,
    }
}

fn is_bracket(node: &Node) -> bool {
    node.kind == NodeKind::Operator1 && closing(&node.text).is_some()
}

pub(super) fn visit_grouping(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if !matches!(node.kind, NodeKind::Operator1 | NodeKind::Operator2)
        || !node.children.is_empty()
        || !operators.contains(&node.text.as_str())
    {
        return Ok(1);
    }

    let op = node.text.clone();
    let mut at = at;
    match op.as_str() {
        "(" | "[" | "{" => {
            collect(nodes, &mut at)?;
            let node = &mut nodes[at];
            match node.kind {
                NodeKind::Call => group(&mut node.children[1].children, Some(Parent::Call))?,
                NodeKind::Subscr => group(&mut node.children[1].children, Some(Parent::Subscr))?,
                NodeKind::Build(BuildKind::List) => {
                    group(&mut node.children, Some(Parent::List))?;
                    if node.children.len() == 1
                        && node.children[0].kind == NodeKind::ListComprehension
                    {
                        if let Some(comprehension) = node.children.pop() {
                            *node = comprehension;
                        }
                    }
                }
                NodeKind::Block => group(&mut node.children, Some(Parent::Block))?,
                _ => group(&mut node.children, Some(Parent::Paren))?,
            }
            Ok(0)
        }
        "->" => {
            if nodes.get(at + 1).is_some_and(is_bracket) {
                let next = &nodes[at + 1];
                return Err(Error::parse("illegal after ->", next.line, next.column));
            }
            let mut rhs = consume(nodes, &mut at, Side::Right)?;
            let lhs = consume(nodes, &mut at, Side::Left)?;
            match rhs.kind {
                NodeKind::Label => rhs.kind = NodeKind::String,
                NodeKind::Number => {}
                _ => {
                    return Err(Error::parse(
                        "expected label or number after ->",
                        rhs.line,
                        rhs.column,
                    ));
                }
            }
            let node = &mut nodes[at];
            let drill = Node::at(NodeKind::Label, "__es_drill__", node);
            node.kind = NodeKind::Call;
            node.text.clear();
            node.children = vec![drill, lhs, rhs];
            Ok(0)
        }
        "." => {
            let mut rhs = consume(nodes, &mut at, Side::Right)?;
            let lhs = consume(nodes, &mut at, Side::Left)?;
            rhs.kind = NodeKind::AttrLabel;
            let node = &mut nodes[at];
            node.kind = NodeKind::Attr;
            node.text.clear();
            node.children = vec![lhs, rhs];
            Ok(0)
        }
        "?." => {
            // a?.[0], a?.(x) and a?.->k guard the following access
            let bare = nodes
                .get(at + 1)
                .is_some_and(|next| is_bracket(next) || next.is_operator("->"));
            let rhs = if bare {
                None
            } else {
                let mut rhs = consume(nodes, &mut at, Side::Right)?;
                rhs.kind = NodeKind::AttrLabel;
                Some(rhs)
            };
            let lhs = consume(nodes, &mut at, Side::Left)?;
            let node = &mut nodes[at];
            node.kind = NodeKind::OptionalAttr;
            node.text.clear();
            node.children.push(lhs);
            node.children.extend(rhs);
            Ok(0)
        }
        _ => Ok(1),
    }
}

/// Moves everything between the bracket at `*at` and its partner into
/// the bracket's children, then decides what the pair means.
fn collect(nodes: &mut Vec<Node>, at: &mut usize) -> Result<()> {
    let open = nodes[*at].text.clone();
    let close = closing(&open).unwrap_or(")");

    let mut depth = 0usize;
    let mut end = None;
    for (j, node) in nodes.iter().enumerate().skip(*at + 1) {
        if node.kind != NodeKind::Operator1 {
            continue;
        }
        if node.text == open {
            depth += 1;
        } else if node.text == close {
            if depth == 0 {
                end = Some(j);
                break;
            }
            depth -= 1;
        }
    }
    let Some(end) = end else {
        let node = &nodes[*at];
        return Err(Error::parse(
            format!("Unterminated {}", open),
            node.line,
            node.column,
        ));
    };

    let inner: Vec<Node> = nodes.drain(*at + 1..end).collect();
    nodes.remove(*at + 1);

    let previous = at.checked_sub(1).map(|j| &nodes[j]);
    let takes_callee = match open.as_str() {
        "(" => previous.is_some_and(Node::is_callable),
        "[" => previous
            .is_some_and(|p| p.is_callable() || matches!(p.kind, NodeKind::Build(_))),
        _ => false,
    };

    if takes_callee {
        let callee = nodes.remove(*at - 1);
        *at -= 1;
        let node = &mut nodes[*at];
        let args = Node::at(NodeKind::Args, "", node).with_children(inner);
        node.kind = if open == "(" {
            NodeKind::Call
        } else {
            NodeKind::Subscr
        };
        node.text.clear();
        node.children = vec![callee, args];
        return Ok(());
    }

    let node = &mut nodes[*at];
    node.children = inner;
    match open.as_str() {
        "[" => {
            node.kind = NodeKind::Build(BuildKind::List);
            node.text.clear();
        }
        "{" => {
            node.kind = NodeKind::Block;
            node.text = "{}".to_string();
        }
        _ => node.text = "()".to_string(),
    }
    Ok(())
}

fn ends_exec(node: &Node) -> bool {
    match node.kind {
        NodeKind::Newline => true,
        NodeKind::Operator1 => matches!(node.text.as_str(), ";" | "," | ")" | "}" | "]"),
        NodeKind::Operator2 => node.text == "|>",
        _ => false,
    }
}

fn ends_import(node: &Node) -> bool {
    match node.kind {
        NodeKind::Newline => true,
        NodeKind::Operator1 => matches!(node.text.as_str(), ";" | ")" | "}" | "]"),
        _ => false,
    }
}

pub(super) fn visit_exec(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Keyword || !operators.contains(&node.text.as_str()) {
        return Ok(1);
    }

    let mut at = at;
    let mut args = Vec::new();
    while nodes.get(at + 1).is_some_and(|next| !ends_exec(next)) {
        args.push(consume(nodes, &mut at, Side::Right)?);
    }
    let node = &mut nodes[at];
    if args.is_empty() {
        return Err(Error::parse("exec with no arguments", node.line, node.column));
    }
    node.kind = NodeKind::ExecProcess;
    node.children = transform_exec(node, args)?;
    Ok(1)
}

/// Turns the words of an exec line into call arguments and folds
/// redirections into `Proc.Redirect(mode, lhs, rhs)` calls.
fn transform_exec(node: &Node, mut args: Vec<Node>) -> Result<Vec<Node>> {
    for arg in &mut args {
        match arg.kind {
            NodeKind::Label => arg.kind = NodeKind::String,
            NodeKind::Substitution => arg.kind = NodeKind::Label,
            NodeKind::Operator2 => {
                if arg.text != ">" && arg.text != ">>" {
                    return Err(Error::parse(
                        "invalid operator in exec statement",
                        arg.line,
                        arg.column,
                    ));
                }
            }
            NodeKind::String
            | NodeKind::FormatString
            | NodeKind::GlobString
            | NodeKind::ByteString
            | NodeKind::Number => {}
            _ => arg.kind = NodeKind::String,
        }
    }

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg.kind != NodeKind::Operator2 || !arg.children.is_empty() {
            i += 1;
            continue;
        }
        let mode = if arg.text == ">" { "1" } else { "2" };
        let mut at = i;
        let rhs = consume(&mut args, &mut at, Side::Right)?;
        let lhs = consume(&mut args, &mut at, Side::Left)?;
        let op = &args[at];
        let redirect = Node::at(NodeKind::Attr, "", op).with_children(vec![
            Node::at(NodeKind::Label, "Proc", op),
            Node::at(NodeKind::AttrLabel, "Redirect", op),
        ]);
        let mode = Node::at(NodeKind::Number, mode, op);
        let call = Node::at(NodeKind::Call, "", op).with_children(vec![redirect, mode, lhs, rhs]);
        args[at] = call;
        i = at + 1;
    }

    args.insert(0, Node::at(NodeKind::Label, "Proc", node));
    Ok(args)
}

pub(super) fn visit_import(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Keyword || !operators.contains(&node.text.as_str()) {
        return Ok(1);
    }

    let mut at = at;
    let mut fromlist = Node::at(NodeKind::Tuple, "", node);
    let mut name = if node.text == "from" {
        if at > 0 && nodes[at - 1].is_keyword("yield") {
            return Ok(1);
        }
        let name = consume(nodes, &mut at, Side::Right)?;
        let keyword = consume(nodes, &mut at, Side::Right)?;
        if !keyword.is_keyword("import") {
            return Err(Error::parse("expected import", keyword.line, keyword.column));
        }
        while let Some(next) = nodes.get(at + 1) {
            if next.is_operator("as") {
                return Err(Error::parse("unexpected keyword", next.line, next.column));
            }
            if ends_import(next) {
                break;
            }
            let target = consume(nodes, &mut at, Side::Right)?;
            let renamed = at + 2 < nodes.len() && nodes[at + 1].is_operator("as");
            if renamed {
                let mut alias = consume(nodes, &mut at, Side::Right)?;
                let dest = consume(nodes, &mut at, Side::Right)?;
                alias.children = vec![target, dest];
                fromlist.children.push(alias);
            } else {
                fromlist.children.push(target);
            }
        }
        name
    } else {
        consume(nodes, &mut at, Side::Right)?
    };

    let level = name.text.chars().take_while(|&c| c == '.').count();
    name.text.drain(..level);
    name.kind = NodeKind::String;

    let node = &mut nodes[at];
    node.kind = NodeKind::Import;
    node.text = name.text.split('.').next().unwrap_or_default().to_string();
    let level = Node::at(NodeKind::Number, level.to_string(), node);
    node.children = vec![level, name, fromlist];
    Ok(1)
}

pub(super) fn visit_string(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    _operators: &[&str],
) -> Result<usize> {
    if nodes[at].kind != NodeKind::String {
        return Ok(1);
    }
    while nodes.get(at + 1).is_some_and(|n| n.kind == NodeKind::String) {
        let next = nodes.remove(at + 1);
        nodes[at].text.push_str(&next.text);
    }
    Ok(1)
}
