//! Operator rules: unary, binary, comparison chains, lambdas, slices,
//! the conditional operator, commas and decorators.

use super::Parent;
use super::cursor::{Side, consume, opens_operand, take};
use crate::ast::{Node, NodeKind};
use crate::error::{Error, Result};

/// True for an operator token that no rule has reduced yet.
fn is_free_operator(node: &Node, operators: &[&str]) -> bool {
    matches!(node.kind, NodeKind::Operator1 | NodeKind::Operator2)
        && node.children.is_empty()
        && operators.contains(&node.text.as_str())
}

pub(super) fn visit_unary(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    if !is_free_operator(&nodes[at], operators) {
        return Ok(1);
    }
    let prefix = at == 0 || opens_operand(&nodes[at - 1]);
    if !prefix {
        return Ok(1);
    }

    let mut at = at;
    let operand = consume(nodes, &mut at, Side::Right)?;
    let node = &mut nodes[at];
    node.kind = NodeKind::Prefix;
    node.children.push(operand);
    Ok(0)
}

pub(super) fn visit_unary_fix(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Operator2 || !is_free_operator(node, operators) {
        return Ok(1);
    }

    let lhs = at.checked_sub(1).map(|j| &nodes[j]);
    let rhs = nodes.get(at + 1);
    let postfix = lhs.is_some_and(|l| !opens_operand(l)) && rhs.is_none_or(opens_operand);
    let prefix = !postfix && lhs.is_none_or(opens_operand);

    let mut at = at;
    if postfix {
        let operand = consume(nodes, &mut at, Side::Left)?;
        let node = &mut nodes[at];
        node.kind = NodeKind::Postfix;
        node.children.push(operand);
        Ok(1)
    } else if prefix {
        let operand = consume(nodes, &mut at, Side::Right)?;
        let node = &mut nodes[at];
        node.kind = NodeKind::Prefix;
        node.children.push(operand);
        Ok(0)
    } else {
        Ok(1)
    }
}

pub(super) fn visit_binary(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Operator2 || !is_free_operator(node, operators) {
        return Ok(1);
    }
    let mut at = at;
    let rhs = consume(nodes, &mut at, Side::Right)?;
    let lhs = consume(nodes, &mut at, Side::Left)?;
    nodes[at].children = vec![lhs, rhs];
    Ok(0)
}

pub(super) fn visit_proc_pipe(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Operator2 || !is_free_operator(node, operators) {
        return Ok(1);
    }
    let mut at = at;
    let rhs = consume(nodes, &mut at, Side::Right)?;
    let lhs = consume(nodes, &mut at, Side::Left)?;
    let source = if lhs.kind == NodeKind::ExecProcess && lhs.text == "|>" {
        lhs
    } else {
        Node::at(NodeKind::Call, "", &lhs).with_children(vec![lhs])
    };
    let node = &mut nodes[at];
    node.kind = NodeKind::ExecProcess;
    node.children = vec![rhs, source];
    Ok(0)
}

/// Builds `[a, <, b, <, c]` chains out of adjacent comparisons.
pub(super) fn visit_compare(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Operator2 || !is_free_operator(node, operators) {
        return Ok(1);
    }

    let is_pair = |n: &Node| {
        n.kind == NodeKind::Operator2
            && n.children.len() == 2
            && operators.contains(&n.text.as_str())
    };

    let mut at = at;
    let rhs = consume(nodes, &mut at, Side::Right)?;
    let lhs = consume(nodes, &mut at, Side::Left)?;
    let node = &nodes[at];
    let op = Node::at(NodeKind::Operator2, node.text.clone(), node);

    let mut chained = false;
    let mut children = Vec::new();
    match lhs.kind {
        NodeKind::MultiCompare => {
            children.extend(lhs.children);
            children.push(op.clone());
            chained = true;
        }
        _ if is_pair(&lhs) => {
            let inner = Node::at(NodeKind::Operator2, lhs.text.clone(), &lhs);
            let mut parts = lhs.children.into_iter();
            children.extend(parts.next());
            children.push(inner);
            children.extend(parts.next());
            children.push(op.clone());
            chained = true;
        }
        _ => children.push(lhs),
    }
    match rhs.kind {
        NodeKind::MultiCompare => {
            if !chained {
                children.push(op);
            }
            children.extend(rhs.children);
            chained = true;
        }
        _ if is_pair(&rhs) => {
            if !chained {
                children.push(op);
            }
            let inner = Node::at(NodeKind::Operator2, rhs.text.clone(), &rhs);
            let mut parts = rhs.children.into_iter();
            children.extend(parts.next());
            children.push(inner);
            children.extend(parts.next());
            chained = true;
        }
        _ => children.push(rhs),
    }

    let node = &mut nodes[at];
    if chained {
        node.kind = NodeKind::MultiCompare;
        node.text.clear();
    }
    node.children = children;
    Ok(0)
}

/// `params => body` becomes `Lambda(name)[ParamList, LambdaClosure, body]`.
pub(super) fn visit_lambda(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Operator2 || !is_free_operator(node, operators) {
        return Ok(1);
    }

    let mut at = at;
    let body = consume(nodes, &mut at, Side::Right)?;
    let mut lhs = consume(nodes, &mut at, Side::Left)?;

    let mut name = String::new();
    let mut params = Node::at(NodeKind::ParamList, "", &lhs);
    match lhs.kind {
        NodeKind::Call => {
            let mut parts = lhs.children.drain(..);
            let callee = parts.next();
            let args: Vec<Node> = parts.collect();
            match callee {
                Some(callee) if callee.kind == NodeKind::Label => name = callee.text,
                Some(callee) => {
                    return Err(Error::parse(
                        "invalid function definition. expected label",
                        callee.line,
                        callee.column,
                    ));
                }
                None => {}
            }
            params.children = args;
        }
        NodeKind::Operator1 if lhs.text == "()" => params.children = lhs.children,
        NodeKind::Label => params.children = vec![lhs],
        _ => {
            return Err(Error::parse(
                "invalid function definition. expected label",
                lhs.line,
                lhs.column,
            ));
        }
    }

    let node = &mut nodes[at];
    let closure = Node::at(NodeKind::LambdaClosure, "", node);
    node.kind = NodeKind::Lambda;
    node.text = name;
    node.children = vec![params, closure, body];

    // (x) => {x}(1) calls the new lambda right away
    while nodes
        .get(at + 1)
        .is_some_and(|n| n.kind == NodeKind::Operator1 && n.text == "()")
    {
        let group = nodes.remove(at + 1);
        let callee = std::mem::replace(&mut nodes[at], Node::at(NodeKind::Call, "", &group));
        let args = Node::at(NodeKind::Args, "", &group).with_children(group.children);
        nodes[at].children = vec![callee, args];
    }
    Ok(0)
}

pub(super) fn visit_slice(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Operator1 || !is_free_operator(node, operators) {
        return Ok(1);
    }

    let mut at = at;
    let rhs = take(nodes, &mut at, Side::Right);
    let lhs = take(nodes, &mut at, Side::Left);
    let advance = usize::from(lhs.is_none());

    let node = &mut nodes[at];
    node.kind = NodeKind::Slice;
    node.text.clear();
    if lhs.is_some() || rhs.is_some() {
        let empty = Node::at(NodeKind::Empty, "", node);
        node.children = vec![lhs.unwrap_or_else(|| empty.clone()), rhs.unwrap_or(empty)];
    }
    Ok(advance)
}

/// `a ? b : c` becomes `Branch[a, b, c]`; the slice rule already paired
/// `b : c`.
pub(super) fn visit_ternary(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Operator1 || !is_free_operator(node, operators) {
        return Ok(1);
    }

    let mut at = at;
    let rhs = consume(nodes, &mut at, Side::Right)?;
    if rhs.kind != NodeKind::Slice || rhs.children.len() != 2 {
        return Err(Error::parse(
            "expected ':' in conditional expression",
            rhs.line,
            rhs.column,
        ));
    }
    let lhs = consume(nodes, &mut at, Side::Left)?;
    let node = &mut nodes[at];
    node.kind = NodeKind::Branch;
    node.text.clear();
    node.children.push(lhs);
    node.children.extend(rhs.children);
    Ok(0)
}

fn is_enclosed(parent: Option<Parent>) -> bool {
    matches!(parent, Some(Parent::Paren | Parent::Call | Parent::List))
}

fn visit_comma(nodes: &mut Vec<Node>, at: usize, operators: &[&str]) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Operator1 || !is_free_operator(node, operators) {
        return Ok(1);
    }
    let mut at = at;
    let rhs = take(nodes, &mut at, Side::Right);
    let lhs = consume(nodes, &mut at, Side::Left)?;
    let node = &mut nodes[at];
    node.kind = NodeKind::TupleSeparator;
    node.children.push(lhs);
    node.children.extend(rhs);
    Ok(0)
}

/// Commas outside `()`, calls and lists bind tighter than assignment, so
/// `a, b = b, a` swaps.
pub(super) fn visit_comma_open(
    nodes: &mut Vec<Node>,
    at: usize,
    parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    if is_enclosed(parent) {
        return Ok(1);
    }
    visit_comma(nodes, at, operators)
}

/// Commas inside `()`, calls and lists bind looser than assignment, so
/// `f(a=1, b=2)` passes two keyword arguments.
pub(super) fn visit_comma_enclosed(
    nodes: &mut Vec<Node>,
    at: usize,
    parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    if !is_enclosed(parent) {
        return Ok(1);
    }
    visit_comma(nodes, at, operators)
}

/// `@dec target` becomes `dec(target)`, and `name = dec(target)` when the
/// target is a named lambda.
pub(super) fn visit_decorator(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Prefix || !operators.contains(&node.text.as_str()) {
        return Ok(1);
    }

    let mut at = at;
    let target = consume(nodes, &mut at, Side::Right)?;
    let name = (target.kind == NodeKind::Lambda && !target.text.is_empty())
        .then(|| target.text.clone());

    let node = &mut nodes[at];
    node.kind = NodeKind::Call;
    node.text.clear();
    node.children.push(target);

    if let Some(name) = name {
        let assign = Node::at(NodeKind::Operator2, "=", node);
        let call = std::mem::replace(node, assign);
        let label = Node::at(NodeKind::Label, name, &call);
        node.children = vec![label, call];
    }
    Ok(1)
}

pub(super) fn visit_separator(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind == NodeKind::Newline || is_free_operator(node, operators) {
        nodes.remove(at);
        return Ok(0);
    }
    Ok(1)
}
