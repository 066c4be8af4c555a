//! Operators, calls, containers and assignment targets.

use super::{discard, Compiler};
use crate::ast::{BuildKind, Node, NodeKind};
use crate::compiler::bytecode::{compare_index, Instr, OpCode};
use crate::compiler::code::Constant;
use crate::error::Result;
use crate::resolver::Access;

fn binary_opcode(op: &str) -> Option<OpCode> {
    let opcode = match op {
        "+" => OpCode::BinaryAdd,
        "-" => OpCode::BinarySubtract,
        "*" => OpCode::BinaryMultiply,
        "/" => OpCode::BinaryTrueDivide,
        "//" => OpCode::BinaryFloorDivide,
        "%" => OpCode::BinaryModulo,
        "**" => OpCode::BinaryPower,
        "@" => OpCode::BinaryMatrixMultiply,
        "<<" => OpCode::BinaryLshift,
        ">>" => OpCode::BinaryRshift,
        "&" => OpCode::BinaryAnd,
        "^" => OpCode::BinaryXor,
        "|" => OpCode::BinaryOr,
        _ => return None,
    };
    Some(opcode)
}

fn compare_operand(op: &str) -> Option<u32> {
    match op {
        "===" => compare_index("is"),
        "!==" => compare_index("is not"),
        "in" | "not in" | "is" | "is not" | "<" | "<=" | "==" | "!=" | ">" | ">=" => {
            compare_index(op)
        }
        _ => None,
    }
}

/// `+=` and friends map to the plain operator.
fn augmented_opcode(op: &str) -> Option<OpCode> {
    op.strip_suffix('=').filter(|base| !base.is_empty()).and_then(binary_opcode)
}

fn is_star(node: &Node, star: &str) -> bool {
    node.kind == NodeKind::Prefix && node.text == star
}

impl Compiler<'_> {
    // ========================================================================
    // Operators
    // ========================================================================

    pub(super) fn compile_operator(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let op = node.text.as_str();
        let [lhs, rhs] = node.children.as_slice() else {
            return Err(match op {
                "()" => self.error("unexpected parenthesis group", node),
                _ => self.error(format!("unexpected operator {}", op), node),
            });
        };

        if op == "=" {
            let mut instrs = self.compile(rhs, true)?;
            if production {
                instrs.push(Instr::op(OpCode::DupTop));
            }
            instrs.extend(self.compile_store(lhs)?);
            return Ok(instrs);
        }

        if op == "&&" || op == "||" {
            let end = self.new_label();
            let jump = if op == "&&" {
                OpCode::JumpIfFalseOrPop
            } else {
                OpCode::JumpIfTrueOrPop
            };
            let mut instrs = self.compile(lhs, true)?;
            instrs.push(Instr::jump(jump, end));
            instrs.extend(self.compile(rhs, true)?);
            instrs.push(Instr::op(OpCode::Nop).labeled(end));
            discard(&mut instrs, production);
            return Ok(instrs);
        }

        if let Some(cmp) = compare_operand(op) {
            let mut instrs = self.compile(lhs, true)?;
            instrs.extend(self.compile(rhs, true)?);
            instrs.push(Instr::new(OpCode::CompareOp, cmp).at(node.line));
            discard(&mut instrs, production);
            return Ok(instrs);
        }

        if let Some(opcode) = binary_opcode(op) {
            let mut instrs = self.compile(lhs, true)?;
            instrs.extend(self.compile(rhs, true)?);
            instrs.push(Instr::op(opcode).at(node.line));
            discard(&mut instrs, production);
            return Ok(instrs);
        }

        if let Some(opcode) = augmented_opcode(op) {
            let mut instrs = self.compile(lhs, true)?;
            instrs.extend(self.compile(rhs, true)?);
            instrs.push(Instr::op(opcode).at(node.line));
            instrs.extend(self.compile_store(lhs)?);
            instrs.extend(self.compile(lhs, production)?);
            return Ok(instrs);
        }

        Err(self.error(format!("unexpected operator {}", op), node))
    }

    /// `a < b <= c`: the middle operands are evaluated once.
    pub(super) fn compile_multi_compare(
        &mut self,
        node: &Node,
        production: bool,
    ) -> Result<Vec<Instr>> {
        let children = node.children.as_slice();
        if children.len() < 3 || children.len() % 2 == 0 {
            return Err(self.error("malformed comparison chain", node));
        }

        let cleanup = self.new_label();
        let end = self.new_label();
        let mut instrs = self.compile(&children[0], true)?;
        let pairs: Vec<_> = children[1..].chunks(2).collect();
        for (i, pair) in pairs.iter().enumerate() {
            let [op, operand] = pair else {
                return Err(self.error("malformed comparison chain", node));
            };
            let Some(cmp) = compare_operand(&op.text) else {
                return Err(self.error(format!("unexpected operator {}", op.text), op));
            };
            instrs.extend(self.compile(operand, true)?);
            if i + 1 < pairs.len() {
                instrs.push(Instr::op(OpCode::DupTop));
                instrs.push(Instr::op(OpCode::RotThree));
                instrs.push(Instr::new(OpCode::CompareOp, cmp).at(op.line));
                instrs.push(Instr::jump(OpCode::JumpIfFalseOrPop, cleanup));
            } else {
                instrs.push(Instr::new(OpCode::CompareOp, cmp).at(op.line));
                instrs.push(Instr::jump(OpCode::JumpForward, end));
            }
        }
        instrs.push(Instr::op(OpCode::RotTwo).labeled(cleanup));
        instrs.push(Instr::op(OpCode::PopTop));
        instrs.push(Instr::op(OpCode::Nop).labeled(end));
        discard(&mut instrs, production);
        Ok(instrs)
    }

    pub(super) fn compile_prefix(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let op = node.text.as_str();
        if op == "++" || op == "--" {
            return self.compile_increment(node, production);
        }

        let unary = match op {
            "+" => OpCode::UnaryPositive,
            "-" => OpCode::UnaryNegative,
            "!" => OpCode::UnaryNot,
            "~" => OpCode::UnaryInvert,
            _ => return Err(self.error(format!("unexpected {}", op), node)),
        };
        let [operand] = node.children.as_slice() else {
            return Err(self.error(format!("missing operand for {}", op), node));
        };
        let mut instrs = self.compile(operand, true)?;
        instrs.push(Instr::op(unary).at(node.line));
        discard(&mut instrs, production);
        Ok(instrs)
    }

    /// `++x`, `--x` and nested forms fold into a single add.
    fn compile_increment(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let mut step = 0i64;
        let mut target = node;
        while target.kind == NodeKind::Prefix && (target.text == "++" || target.text == "--") {
            step += if target.text == "++" { 1 } else { -1 };
            match target.children.first() {
                Some(inner) => target = inner,
                None => return Err(self.error("missing operand", target)),
            }
        }

        let store = self.compile_store(target)?;
        let mut instrs = self.compile(target, true)?;
        let index = self.slots.constant(Constant::Int(step));
        instrs.push(Instr::new(OpCode::LoadConst, index));
        instrs.push(Instr::op(OpCode::BinaryAdd));
        if production {
            instrs.push(Instr::op(OpCode::DupTop));
        }
        instrs.extend(store);
        Ok(instrs)
    }

    /// `x++` leaves the old value.
    pub(super) fn compile_postfix(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [target] = node.children.as_slice() else {
            return Err(self.error("missing operand", node));
        };
        let opcode = match node.text.as_str() {
            "++" => OpCode::BinaryAdd,
            "--" => OpCode::BinarySubtract,
            other => return Err(self.error(format!("unexpected {}", other), node)),
        };

        let store = self.compile_store(target)?;
        let mut instrs = self.compile(target, true)?;
        if production {
            instrs.push(Instr::op(OpCode::DupTop));
        }
        let one = self.slots.constant(Constant::Int(1));
        instrs.push(Instr::new(OpCode::LoadConst, one));
        instrs.push(Instr::op(opcode));
        instrs.extend(store);
        Ok(instrs)
    }

    // ========================================================================
    // Assignment targets
    // ========================================================================

    /// Stores TOS into an assignment target.
    pub(super) fn compile_store(&mut self, target: &Node) -> Result<Vec<Instr>> {
        match target.kind {
            NodeKind::Label | NodeKind::Reference => Ok(vec![self.store_label(target)?]),
            NodeKind::Tuple
            | NodeKind::Build(BuildKind::Tuple)
            | NodeKind::Build(BuildKind::List) => {
                let mut instrs = vec![Instr::new(
                    OpCode::UnpackSequence,
                    target.children.len() as u32,
                )];
                for child in &target.children {
                    if is_star(child, "*") {
                        return Err(self.error("starred assignment is not supported", child));
                    }
                    instrs.extend(self.compile_store(child)?);
                }
                Ok(instrs)
            }
            NodeKind::Subscr => {
                let Some((object, indices)) = target.children.split_first() else {
                    return Err(self.error("expected subscript", target));
                };
                let mut instrs = self.compile(object, true)?;
                instrs.extend(self.compile_index(target, indices)?);
                instrs.push(Instr::op(OpCode::StoreSubscr));
                Ok(instrs)
            }
            NodeKind::Attr => {
                let [object, attr] = target.children.as_slice() else {
                    return Err(self.error("expected attribute", target));
                };
                let mut instrs = self.compile(object, true)?;
                let name = self.slots.name(&attr.text);
                instrs.push(Instr::new(OpCode::StoreAttr, name));
                Ok(instrs)
            }
            _ => Err(self.error(format!("cannot assign to {}", target.to_sexpr()), target)),
        }
    }

    // ========================================================================
    // Attribute access, subscripts and calls
    // ========================================================================

    pub(super) fn compile_attr(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [object, attr] = node.children.as_slice() else {
            return Err(self.error("expected attribute", node));
        };
        let mut instrs = self.compile(object, true)?;
        let name = self.slots.name(&attr.text);
        instrs.push(Instr::new(OpCode::LoadAttr, name).at(attr.line));
        discard(&mut instrs, production);
        Ok(instrs)
    }

    /// `a?.b` leaves a none `a` untouched.
    pub(super) fn compile_optional_attr(
        &mut self,
        node: &Node,
        production: bool,
    ) -> Result<Vec<Instr>> {
        let mut instrs = Vec::new();
        match node.children.as_slice() {
            [object] => instrs.extend(self.compile(object, true)?),
            [object, attr] => {
                let end = self.new_label();
                instrs.extend(self.compile(object, true)?);
                instrs.extend(self.none_guard(end));
                let name = self.slots.name(&attr.text);
                instrs.push(Instr::new(OpCode::LoadAttr, name).at(attr.line));
                instrs.push(Instr::op(OpCode::Nop).labeled(end));
            }
            _ => return Err(self.error("expected attribute", node)),
        }
        discard(&mut instrs, production);
        Ok(instrs)
    }

    /// Jumps to `end` with TOS kept when it is none.
    fn none_guard(&mut self, end: crate::compiler::bytecode::Label) -> Vec<Instr> {
        let is = compare_index("is").unwrap_or_default();
        vec![
            Instr::op(OpCode::DupTop),
            Instr::new(OpCode::LoadConst, 0),
            Instr::new(OpCode::CompareOp, is),
            Instr::jump(OpCode::PopJumpIfTrue, end),
        ]
    }

    /// Loads the callee or subscripted object, guarding `a?.(...)`.
    fn compile_guarded(
        &mut self,
        object: &Node,
    ) -> Result<(Vec<Instr>, Option<crate::compiler::bytecode::Label>)> {
        match (object.kind, object.children.as_slice()) {
            (NodeKind::OptionalAttr, [inner]) => {
                let end = self.new_label();
                let mut instrs = self.compile(inner, true)?;
                instrs.extend(self.none_guard(end));
                Ok((instrs, Some(end)))
            }
            _ => Ok((self.compile(object, true)?, None)),
        }
    }

    fn compile_index(&mut self, node: &Node, indices: &[Node]) -> Result<Vec<Instr>> {
        match indices {
            [] => Err(self.error("expected index", node)),
            [index] => self.compile(index, true),
            _ => {
                let mut instrs = Vec::new();
                for index in indices {
                    instrs.extend(self.compile(index, true)?);
                }
                instrs.push(Instr::new(OpCode::BuildTuple, indices.len() as u32));
                Ok(instrs)
            }
        }
    }

    pub(super) fn compile_subscr(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let Some((object, indices)) = node.children.split_first() else {
            return Err(self.error("expected subscript", node));
        };
        let (mut instrs, end) = self.compile_guarded(object)?;
        instrs.extend(self.compile_index(node, indices)?);
        instrs.push(Instr::op(OpCode::BinarySubscr).at(node.line));
        if let Some(end) = end {
            instrs.push(Instr::op(OpCode::Nop).labeled(end));
        }
        discard(&mut instrs, production);
        Ok(instrs)
    }

    pub(super) fn compile_call(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let Some((callee, args)) = node.children.split_first() else {
            return Err(self.error("expected callee", node));
        };
        let (mut instrs, end) = self.compile_guarded(callee)?;
        let mut call = self.compile_arguments(args, 0)?;
        if let Some(last) = call.last_mut() {
            last.line = Some(node.line);
        }
        instrs.extend(call);
        if let Some(end) = end {
            instrs.push(Instr::op(OpCode::Nop).labeled(end));
        }
        discard(&mut instrs, production);
        Ok(instrs)
    }

    /// Loads call arguments and emits the call. `pushed` positional
    /// values already sit on the stack above the callee.
    pub(super) fn compile_arguments(&mut self, args: &[Node], pushed: u32) -> Result<Vec<Instr>> {
        let mut positional = Vec::new();
        let mut keywords: Vec<(&Node, &Node)> = Vec::new();
        let mut stars = Vec::new();
        let mut double_stars = Vec::new();

        for arg in args {
            if is_star(arg, "*") {
                stars.push(arg);
                continue;
            }
            if is_star(arg, "**") {
                double_stars.push(arg);
                continue;
            }
            if arg.is_operator("=") {
                let [name, value] = arg.children.as_slice() else {
                    return Err(self.error("expected label", arg));
                };
                if name.kind != NodeKind::Label {
                    return Err(self.error("expected label", name));
                }
                keywords.push((name, value));
                continue;
            }
            if !keywords.is_empty() || !double_stars.is_empty() {
                return Err(self.error("positional after keyword argument", arg));
            }
            if !stars.is_empty() {
                return Err(self.error("positional argument after *", arg));
            }
            positional.push(arg);
        }

        let mut instrs = Vec::new();
        for arg in &positional {
            instrs.extend(self.compile(arg, true)?);
        }
        let npos = pushed + positional.len() as u32;

        if stars.is_empty() && double_stars.is_empty() {
            if keywords.is_empty() {
                instrs.push(Instr::new(OpCode::CallFunction, npos));
                return Ok(instrs);
            }
            for (_, value) in &keywords {
                instrs.extend(self.compile(value, true)?);
            }
            for (name, _) in &keywords {
                let index = self.slots.constant(Constant::Str(name.text.clone()));
                instrs.push(Instr::new(OpCode::LoadConst, index));
            }
            let nkw = keywords.len() as u32;
            instrs.push(Instr::new(OpCode::BuildTuple, nkw));
            instrs.push(Instr::new(OpCode::CallFunctionKw, npos + nkw));
            return Ok(instrs);
        }

        let mut tuples = 0;
        if npos > 0 {
            instrs.push(Instr::new(OpCode::BuildTuple, npos));
            tuples += 1;
        }
        for star in &stars {
            for inner in &star.children {
                instrs.extend(self.compile(inner, true)?);
            }
            tuples += 1;
        }
        let mut maps = 0;
        if tuples > 1 {
            instrs.push(Instr::new(OpCode::BuildTupleUnpackWithCall, tuples));
        } else if tuples == 0 {
            instrs.push(Instr::new(OpCode::BuildTuple, 0));
        }

        if !keywords.is_empty() {
            for (name, value) in &keywords {
                let index = self.slots.constant(Constant::Str(name.text.clone()));
                instrs.push(Instr::new(OpCode::LoadConst, index));
                instrs.extend(self.compile(value, true)?);
            }
            instrs.push(Instr::new(OpCode::BuildMap, keywords.len() as u32));
            maps += 1;
        }
        for double in &double_stars {
            for inner in &double.children {
                instrs.extend(self.compile(inner, true)?);
            }
            maps += 1;
        }
        if maps > 1 {
            instrs.push(Instr::new(OpCode::BuildMapUnpackWithCall, maps));
        }
        instrs.push(Instr::new(OpCode::CallFunctionEx, u32::from(maps > 0)));
        Ok(instrs)
    }

    // ========================================================================
    // Containers and strings
    // ========================================================================

    pub(super) fn compile_build(
        &mut self,
        node: &Node,
        kind: BuildKind,
        production: bool,
    ) -> Result<Vec<Instr>> {
        let star = if kind == BuildKind::Map { "**" } else { "*" };
        let (build, unpack) = match kind {
            BuildKind::List => (OpCode::BuildList, OpCode::BuildListUnpack),
            BuildKind::Tuple => (OpCode::BuildTuple, OpCode::BuildTupleUnpack),
            BuildKind::Set => (OpCode::BuildSet, OpCode::BuildSetUnpack),
            BuildKind::Map => (OpCode::BuildMap, OpCode::BuildMapUnpack),
        };
        let count = |n: u32| if kind == BuildKind::Map { n / 2 } else { n };

        let mut instrs = Vec::new();
        if !node.children.iter().any(|c| is_star(c, star)) {
            if kind == BuildKind::Map && node.children.len() % 2 != 0 {
                return Err(self.error("unexpected map element", node));
            }
            for child in &node.children {
                instrs.extend(self.compile(child, true)?);
            }
            instrs.push(Instr::new(build, count(node.children.len() as u32)).at(node.line));
            discard(&mut instrs, production);
            return Ok(instrs);
        }

        let mut segments = 0;
        let mut pending = 0u32;
        for child in &node.children {
            if is_star(child, star) {
                if pending > 0 {
                    if kind == BuildKind::Map && pending % 2 != 0 {
                        return Err(self.error("unexpected map element", child));
                    }
                    instrs.push(Instr::new(tuple_or_map(kind), count(pending)));
                    segments += 1;
                    pending = 0;
                }
                for inner in &child.children {
                    instrs.extend(self.compile(inner, true)?);
                }
                segments += 1;
            } else {
                instrs.extend(self.compile(child, true)?);
                pending += 1;
            }
        }
        if pending > 0 {
            if kind == BuildKind::Map && pending % 2 != 0 {
                return Err(self.error("unexpected map element", node));
            }
            instrs.push(Instr::new(tuple_or_map(kind), count(pending)));
            segments += 1;
        }
        instrs.push(Instr::new(unpack, segments).at(node.line));
        discard(&mut instrs, production);
        Ok(instrs)
    }

    pub(super) fn compile_slice(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        if node.children.len() > 3 {
            return Err(self.error("too many slice operands", node));
        }
        let mut instrs = Vec::new();
        for child in &node.children {
            match child.kind {
                NodeKind::Empty => instrs.push(Instr::new(OpCode::LoadConst, 0)),
                _ => instrs.extend(self.compile(child, true)?),
            }
        }
        let mut count = node.children.len() as u32;
        while count < 2 {
            instrs.push(Instr::new(OpCode::LoadConst, 0));
            count += 1;
        }
        instrs.push(Instr::new(OpCode::BuildSlice, count));
        discard(&mut instrs, production);
        Ok(instrs)
    }

    /// Format, glob and regex literals call their runtime helper.
    pub(super) fn compile_helper_string(
        &mut self,
        helper: &str,
        node: &Node,
        production: bool,
    ) -> Vec<Instr> {
        let function = self.slots.resolve(helper, Access::Load).load();
        let text = self.slots.constant(Constant::Str(node.text.clone()));
        let mut instrs = vec![
            function,
            Instr::new(OpCode::LoadConst, text),
            Instr::new(OpCode::CallFunction, 1),
        ];
        discard(&mut instrs, production);
        instrs
    }

    /// Exec lines and pipes. Statements run the process.
    pub(super) fn compile_exec(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        if node.children.is_empty() {
            return Err(self.error("empty exec line", node));
        }
        let mut instrs = Vec::new();
        for child in &node.children {
            instrs.extend(self.compile(child, true)?);
        }
        instrs.push(Instr::new(OpCode::CallFunction, node.children.len() as u32 - 1));
        if production {
            return Ok(instrs);
        }

        if node.text == "|>" {
            let communicate = self.slots.resolve("__es_communicate__", Access::Load).load();
            instrs.push(communicate);
            instrs.push(Instr::op(OpCode::RotTwo));
            instrs.push(Instr::new(OpCode::CallFunction, 1));
        } else {
            let run = self.slots.name("run2");
            instrs.push(Instr::new(OpCode::LoadAttr, run));
            instrs.push(Instr::new(OpCode::CallFunction, 0));
        }
        instrs.push(Instr::op(OpCode::PopTop));
        Ok(instrs)
    }

    // ========================================================================
    // Comprehensions
    // ========================================================================

    pub(super) fn compile_comprehension(
        &mut self,
        node: &Node,
        production: bool,
    ) -> Result<Vec<Instr>> {
        let [chain, body] = node.children.as_slice() else {
            return Err(self.error("malformed comprehension", node));
        };
        let build = match node.kind {
            NodeKind::SetComprehension => OpCode::BuildSet,
            NodeKind::DictComprehension => OpCode::BuildMap,
            _ => OpCode::BuildList,
        };
        let mut instrs = vec![Instr::new(build, 0).at(node.line)];
        instrs.extend(self.comprehension_clause(node.kind, chain, body, 1)?);
        discard(&mut instrs, production);
        Ok(instrs)
    }

    /// `depth` is one plus the number of iterators on the stack.
    fn comprehension_clause(
        &mut self,
        kind: NodeKind,
        clause: &Node,
        body: &Node,
        depth: u32,
    ) -> Result<Vec<Instr>> {
        match (clause.text.as_str(), clause.children.as_slice()) {
            ("for", [target, iterable, rest @ ..]) if clause.kind == NodeKind::Keyword => {
                let next = self.new_label();
                let done = self.new_label();
                let mut instrs = self.compile(iterable, true)?;
                instrs.push(Instr::op(OpCode::GetIter));
                instrs.push(Instr::jump(OpCode::ForIter, done).labeled(next));
                instrs.extend(self.compile_store(target)?);
                instrs.extend(match rest {
                    [inner] => self.comprehension_clause(kind, inner, body, depth + 1)?,
                    _ => self.comprehension_add(kind, body, depth + 1)?,
                });
                instrs.push(Instr::jump(OpCode::JumpAbsolute, next));
                instrs.push(Instr::op(OpCode::Nop).labeled(done));
                Ok(instrs)
            }
            ("if", [test, rest @ ..]) if clause.kind == NodeKind::Keyword => {
                let skip = self.new_label();
                let mut instrs = self.compile(test, true)?;
                instrs.push(Instr::jump(OpCode::PopJumpIfFalse, skip));
                instrs.extend(match rest {
                    [inner] => self.comprehension_clause(kind, inner, body, depth)?,
                    _ => self.comprehension_add(kind, body, depth)?,
                });
                instrs.push(Instr::op(OpCode::Nop).labeled(skip));
                Ok(instrs)
            }
            _ => Err(self.error("expected for or if clause", clause)),
        }
    }

    fn comprehension_add(&mut self, kind: NodeKind, body: &Node, depth: u32) -> Result<Vec<Instr>> {
        match kind {
            NodeKind::DictComprehension => {
                let [key, value] = body.children.as_slice() else {
                    return Err(self.error("expected key: value", body));
                };
                if body.kind != NodeKind::Slice {
                    return Err(self.error("expected key: value", body));
                }
                let mut instrs = self.compile(key, true)?;
                instrs.extend(self.compile(value, true)?);
                instrs.push(Instr::new(OpCode::MapAdd, depth));
                Ok(instrs)
            }
            NodeKind::SetComprehension => {
                let mut instrs = self.compile(body, true)?;
                instrs.push(Instr::new(OpCode::SetAdd, depth));
                Ok(instrs)
            }
            _ => {
                let mut instrs = self.compile(body, true)?;
                instrs.push(Instr::new(OpCode::ListAppend, depth));
                Ok(instrs)
            }
        }
    }
}

/// Segment builder used before an unpack.
fn tuple_or_map(kind: BuildKind) -> OpCode {
    if kind == BuildKind::Map {
        OpCode::BuildMap
    } else {
        OpCode::BuildTuple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_tables() {
        assert_eq!(binary_opcode("//"), Some(OpCode::BinaryFloorDivide));
        assert_eq!(augmented_opcode("**="), Some(OpCode::BinaryPower));
        assert_eq!(augmented_opcode("=="), None);
        assert_eq!(augmented_opcode("="), None);
        assert_eq!(compare_operand("==="), compare_index("is"));
        assert_eq!(compare_operand("+"), None);
    }
}
