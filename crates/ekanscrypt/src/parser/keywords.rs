//! Keyword rules: declarations, control flow, comprehensions and classes.

use super::Parent;
use super::cursor::{Side, consume, peek, peek_index, take_same_line};
use crate::ast::{Node, NodeKind};
use crate::error::{Error, Result};

fn unexpected(node: &Node, message: &str) -> Error {
    Error::parse(message, node.line, node.column)
}

pub(super) fn visit_loop_escape(
    nodes: &mut Vec<Node>,
    at: usize,
    _parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Keyword || !operators.contains(&node.text.as_str()) {
        return Ok(1);
    }

    let depth = take_same_line(nodes, at);
    let node = &mut nodes[at];
    if let Some(depth) = depth {
        if depth.kind != NodeKind::Number {
            return Err(unexpected(
                &depth,
                &format!("Unexpected symbol after {}", node.text),
            ));
        }
        node.children.push(depth);
    }
    node.kind = if node.text == "continue" {
        NodeKind::Continue
    } else {
        NodeKind::Break
    };
    Ok(1)
}

pub(super) fn visit_keyword(
    nodes: &mut Vec<Node>,
    at: usize,
    parent: Option<Parent>,
    operators: &[&str],
) -> Result<usize> {
    let node = &nodes[at];
    if node.kind != NodeKind::Keyword || !operators.contains(&node.text.as_str()) {
        return Ok(1);
    }

    let keyword = node.text.clone();
    match keyword.as_str() {
        "var" => collect_declaration(nodes, at, NodeKind::DefineVar)?,
        "final" => collect_declaration(nodes, at, NodeKind::DefineFinal)?,
        "static" => collect_declaration(nodes, at, NodeKind::DefineStatic)?,
        "if" => collect_branch(nodes, at)?,
        "do" => collect_do_while(nodes, at)?,
        "while" => collect_while(nodes, at)?,
        "switch" => collect_switch(nodes, at)?,
        "case" => collect_case(nodes, at)?,
        "default" => collect_default(nodes, at)?,
        "return" => collect_optional(nodes, at, NodeKind::Return),
        "raise" => collect_optional(nodes, at, NodeKind::Raise),
        "for" => collect_for(nodes, at, parent)?,
        "with" => collect_with(nodes, at)?,
        "try" => collect_try(nodes, at)?,
        "yield" => collect_yield(nodes, at)?,
        "class" => collect_class(nodes, at)?,
        "else" => return Err(unexpected(&nodes[at], "else without matching if")),
        "catch" => return Err(unexpected(&nodes[at], "unexpected catch without matching try")),
        "finally" => {
            return Err(unexpected(
                &nodes[at],
                "unexpected finally without matching try",
            ));
        }
        "from" => return Err(unexpected(&nodes[at], "unexpected from without matching yield")),
        _ => {}
    }
    Ok(1)
}

fn collect_declaration(nodes: &mut Vec<Node>, at: usize, kind: NodeKind) -> Result<()> {
    let mut at = at;
    let target = consume(nodes, &mut at, Side::Right)?;
    let node = &mut nodes[at];
    node.kind = kind;
    node.children = vec![target];
    Ok(())
}

/// `if test body [else [if ...] body]`
fn collect_branch(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let test = consume(nodes, &mut at, Side::Right)?;
    let body = consume(nodes, &mut at, Side::Right)?;

    let orelse = if peek(nodes, at, Side::Right).is_some_and(|n| n.is_keyword("else")) {
        consume(nodes, &mut at, Side::Right)?;
        if let Some(j) = peek_index(nodes, at, Side::Right) {
            if nodes[j].is_keyword("if") {
                collect_branch(nodes, j)?;
            }
        }
        consume(nodes, &mut at, Side::Right)?
    } else {
        Node::at(NodeKind::Empty, "", &nodes[at])
    };

    let node = &mut nodes[at];
    node.kind = NodeKind::Branch;
    node.children = vec![test, body, orelse];
    Ok(())
}

fn collect_do_while(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let body = consume(nodes, &mut at, Side::Right)?;
    let keyword = consume(nodes, &mut at, Side::Right)?;
    if !keyword.is_keyword("while") {
        return Err(unexpected(&keyword, "expected keyword while"));
    }
    let test = consume(nodes, &mut at, Side::Right)?;
    let node = &mut nodes[at];
    node.kind = NodeKind::DoWhile;
    node.children = vec![body, test];
    Ok(())
}

fn collect_while(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let test = consume(nodes, &mut at, Side::Right)?;
    let body = consume(nodes, &mut at, Side::Right)?;
    let node = &mut nodes[at];
    node.kind = NodeKind::While;
    node.children = vec![test, body];
    Ok(())
}

fn collect_switch(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let value = consume(nodes, &mut at, Side::Right)?;
    let body = consume(nodes, &mut at, Side::Right)?;
    if body.kind != NodeKind::Block {
        return Err(unexpected(&body, "expected block"));
    }
    let node = &mut nodes[at];
    node.kind = NodeKind::Switch;
    node.children = vec![value];
    node.children.extend(body.children);
    Ok(())
}

/// A case or default label directly followed by another label falls
/// through and has no body.
fn has_case_body(nodes: &[Node], at: usize) -> bool {
    peek(nodes, at, Side::Right)
        .is_some_and(|n| !n.is_keyword("case") && !n.is_keyword("default"))
}

fn collect_case(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let value = consume(nodes, &mut at, Side::Right)?;
    let mut children = vec![value];
    if has_case_body(nodes, at) {
        children.push(consume(nodes, &mut at, Side::Right)?);
    }
    let node = &mut nodes[at];
    node.kind = NodeKind::SwitchCase;
    node.children = children;
    Ok(())
}

fn collect_default(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let mut children = Vec::new();
    if has_case_body(nodes, at) {
        children.push(consume(nodes, &mut at, Side::Right)?);
    }
    let node = &mut nodes[at];
    node.kind = NodeKind::SwitchDefault;
    node.children = children;
    Ok(())
}

/// `return` and `raise` take an operand only from the same line.
fn collect_optional(nodes: &mut Vec<Node>, at: usize, kind: NodeKind) {
    let value = take_same_line(nodes, at);
    let node = &mut nodes[at];
    node.kind = kind;
    node.children.extend(value);
}

fn collect_for(nodes: &mut Vec<Node>, at: usize, parent: Option<Parent>) -> Result<()> {
    let comprehension = parent.is_some()
        && at == 1
        && nodes.len() > 2
        && peek(nodes, at, Side::Left).is_some()
        && !nodes.iter().any(|n| n.is_operator(";"));

    let kind = match parent {
        Some(Parent::Paren | Parent::Call | Parent::List) if comprehension => {
            Some(NodeKind::ListComprehension)
        }
        Some(Parent::Block) if comprehension => {
            if nodes[0].kind == NodeKind::Slice {
                Some(NodeKind::DictComprehension)
            } else {
                Some(NodeKind::SetComprehension)
            }
        }
        _ => None,
    };

    match kind {
        Some(kind) => collect_comprehension(nodes, at, kind),
        None => collect_foreach(nodes, at),
    }
}

/// `body for x in xs if cond ...` becomes `Comp[clauses, body]` where each
/// clause holds the next one as its last child.
fn collect_comprehension(nodes: &mut Vec<Node>, at: usize, kind: NodeKind) -> Result<()> {
    let mut at = at;
    let body = consume(nodes, &mut at, Side::Left)?;

    let mut clauses = Vec::new();
    while !nodes.is_empty() {
        if nodes[0].kind != NodeKind::Keyword {
            return Err(unexpected(&nodes[0], "unexpected symbol in comprehension"));
        }
        let mut at = 0;
        let operand = consume(nodes, &mut at, Side::Right)?;
        let mut clause = nodes.remove(0);
        match clause.text.as_str() {
            "for" => {
                if !operand.is_operator("in") || operand.children.len() != 2 {
                    return Err(unexpected(&operand, "expected 'in'"));
                }
                clause.children = operand.children;
            }
            "if" => clause.children = vec![operand],
            _ => return Err(unexpected(&clause, "unexpected keyword in comprehension")),
        }
        clauses.push(clause);
    }

    let chain = clauses.into_iter().rev().reduce(|next, mut clause| {
        clause.children.push(next);
        clause
    });
    let Some(chain) = chain else {
        return Err(unexpected(&body, "unexpected symbol in comprehension"));
    };

    let comprehension = Node::at(kind, "", &body).with_children(vec![chain, body]);
    nodes.insert(0, comprehension);
    Ok(())
}

fn collect_foreach(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let mut header = consume(nodes, &mut at, Side::Right)?;
    if header.kind == NodeKind::Operator1 && header.text == "()" && header.children.len() == 1 {
        header = header.children.remove(0);
    }
    if !header.is_operator("in") {
        return Err(unexpected(&nodes[at], "expected 'in'"));
    }
    if header.children.len() != 2 {
        return Err(unexpected(&header, "invalid expression"));
    }
    let body = consume(nodes, &mut at, Side::Right)?;
    let node = &mut nodes[at];
    node.kind = NodeKind::Foreach;
    node.children = header.children;
    node.children.push(body);
    Ok(())
}

fn collect_with(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let mut items = consume(nodes, &mut at, Side::Right)?;
    if items.kind == NodeKind::Operator1 && items.text == "()" {
        if items.children.len() != 1 {
            return Err(unexpected(&items, "expected label or operator="));
        }
        items = items.children.remove(0);
    }
    let body = consume(nodes, &mut at, Side::Right)?;
    let node = &mut nodes[at];
    node.kind = NodeKind::With;
    node.children = vec![items, body];
    Ok(())
}

/// `try body (catch test body)* [finally body]`
fn collect_try(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let mut children = vec![consume(nodes, &mut at, Side::Right)?];

    while peek(nodes, at, Side::Right).is_some_and(|n| n.is_keyword("catch")) {
        let mut clause = consume(nodes, &mut at, Side::Right)?;
        let test = consume(nodes, &mut at, Side::Right)?;
        let body = consume(nodes, &mut at, Side::Right)?;
        clause.children = vec![test, body];
        children.push(clause);
    }

    if peek(nodes, at, Side::Right).is_some_and(|n| n.is_keyword("finally")) {
        let mut clause = consume(nodes, &mut at, Side::Right)?;
        clause.children = vec![consume(nodes, &mut at, Side::Right)?];
        children.push(clause);
    }

    let node = &mut nodes[at];
    if children.len() < 2 {
        return Err(unexpected(node, "missing catch or finally block"));
    }
    node.kind = NodeKind::TryCatch;
    node.children = children;
    Ok(())
}

fn collect_yield(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let mut at = at;
    let value = take_same_line(nodes, at);
    let node_kind = match value {
        Some(ref v) if v.is_keyword("from") => NodeKind::YieldFrom,
        _ => NodeKind::Yield,
    };
    let value = if node_kind == NodeKind::YieldFrom {
        Some(consume(nodes, &mut at, Side::Right)?)
    } else {
        value
    };
    let node = &mut nodes[at];
    node.kind = node_kind;
    node.children.extend(value);
    Ok(())
}

/// `class Name(bases) body` becomes
/// `Class(Name)[ClassParamList, Lambda("cls.Name")]` whose body binds
/// `__class__` and records the module and qualified name.
fn collect_class(nodes: &mut Vec<Node>, at: usize) -> Result<()> {
    let keyword = nodes.remove(at);
    let Some(header) = nodes.get_mut(at) else {
        return Err(unexpected(&keyword, "expected class name and parameter list"));
    };
    if header.kind != NodeKind::Call {
        return Err(unexpected(header, "expected class name and parameter list"));
    }
    let callee = header.children.remove(0);
    if callee.kind != NodeKind::Label {
        return Err(unexpected(&callee, "expected class name and parameter list"));
    }
    header.kind = NodeKind::ClassParamList;

    let mut at = at;
    let body = consume(nodes, &mut at, Side::Right)?;
    let name = callee.text;
    let (line, column) = (body.line, body.column);
    let synthetic = |kind: NodeKind, text: &str| Node::new(kind, text, line, column);

    let class_cell = synthetic(NodeKind::Closure, "")
        .with_children(vec![synthetic(NodeKind::Reference, "__class__")]);
    let block = synthetic(NodeKind::Block, "").with_children(vec![
        class_cell,
        synthetic(NodeKind::ClassInit, &name),
        body,
        synthetic(NodeKind::ClassInit2, &name),
    ]);
    let lambda = synthetic(NodeKind::Lambda, &format!("cls.{}", name)).with_children(vec![
        synthetic(NodeKind::ParamList, ""),
        synthetic(NodeKind::LambdaClosure, ""),
        block,
    ]);

    let bases = std::mem::replace(&mut nodes[at], Node::at(NodeKind::Class, name, &keyword));
    nodes[at].children = vec![bases, lambda];
    Ok(())
}
