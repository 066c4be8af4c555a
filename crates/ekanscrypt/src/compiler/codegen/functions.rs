//! Lambdas, classes, imports and generators.

use std::sync::Arc;

use super::{discard, Compiler};
use crate::ast::{Node, NodeKind};
use crate::compiler::bytecode::{Instr, OpCode};
use crate::compiler::code::{CodeFlags, Constant};
use crate::error::{Error, Result};
use crate::resolver::{label_of, Access};

/// `MAKE_FUNCTION` flag: a tuple of defaults is on the stack.
const MAKE_DEFAULTS: u32 = 0x01;
/// `MAKE_FUNCTION` flag: a tuple of cells is on the stack.
const MAKE_CLOSURE: u32 = 0x08;

const CLASS_CELL: &str = "__class__";

impl Compiler<'_> {
    // ========================================================================
    // Lambdas and classes
    // ========================================================================

    fn lambda_name(&self, node: &Node, class_body: bool) -> String {
        if class_body {
            let class = node.text.strip_prefix("cls.").unwrap_or(&node.text);
            return format!("{}.{}", self.name, label_of(class));
        }
        if node.text.is_empty() {
            format!(
                "{}.lambda.Anonymous_{}_{}_{}",
                self.name, node.line, node.column, self.depth
            )
        } else {
            format!("{}.lambda.{}", self.name, label_of(&node.text))
        }
    }

    /// Compiles the body into its own code object and emits
    /// `MAKE_FUNCTION`.
    pub(super) fn compile_lambda(
        &mut self,
        node: &Node,
        production: bool,
        class_body: bool,
    ) -> Result<Vec<Instr>> {
        let [params, closure, body] = node.children.as_slice() else {
            return Err(self.error("malformed lambda", node));
        };
        let qualname = self.lambda_name(node, class_body);
        let mut sub = self.nested(qualname.clone(), class_body, node.line);

        let mut instrs = Vec::new();
        let mut make_flags = 0;
        let mut defaults = 0;
        let mut rest = Vec::new();
        for param in &params.children {
            match (param.kind, param.children.as_slice()) {
                (NodeKind::Label, _) => {
                    if !rest.is_empty() {
                        return Err(self.error("positional after keyword argument", param));
                    }
                    if defaults > 0 {
                        return Err(self.error("parameter without default after default", param));
                    }
                    sub.slots.varnames.push(param.text.clone());
                    sub.argcount += 1;
                }
                (NodeKind::Operator2, [name, default]) if param.text == "=" => {
                    if !rest.is_empty() {
                        return Err(self.error("positional after keyword argument", param));
                    }
                    instrs.extend(self.compile(default, true)?);
                    defaults += 1;
                    sub.slots.varnames.push(name.text.clone());
                    sub.argcount += 1;
                }
                (NodeKind::Prefix, [name]) if param.text == "*" || param.text == "**" => {
                    let flag = if param.text == "*" {
                        CodeFlags::VARARGS
                    } else {
                        CodeFlags::VARKEYWORDS
                    };
                    if sub.flags.contains(flag) {
                        return Err(self.error(format!("duplicate {} parameter", param.text), param));
                    }
                    sub.flags.insert(flag);
                    rest.push(name.text.clone());
                }
                _ => return Err(self.error("expected parameter", param)),
            }
        }
        sub.slots.varnames.extend(rest);
        if defaults > 0 {
            instrs.push(Instr::new(OpCode::BuildTuple, defaults));
            make_flags |= MAKE_DEFAULTS;
        }

        let mut cells = Vec::new();
        if self.slots.no_fast {
            if let Some(index) = self.slots.deref(CLASS_CELL) {
                cells.push(Instr::new(OpCode::LoadClosure, index));
                sub.slots.freevars.push(CLASS_CELL.to_string());
            }
        }
        for reference in &closure.children {
            if sub.slots.freevars.contains(&reference.text) {
                continue;
            }
            let Some(index) = self.slots.deref(&reference.text) else {
                return Err(Error::Internal(format!(
                    "captured {} is not a cell of {}",
                    reference.text, self.name
                )));
            };
            cells.push(Instr::new(OpCode::LoadClosure, index));
            sub.slots.freevars.push(reference.text.clone());
        }
        if !cells.is_empty() {
            let count = cells.len() as u32;
            instrs.extend(cells);
            instrs.push(Instr::new(OpCode::BuildTuple, count));
            make_flags |= MAKE_CLOSURE;
        }

        let mut body_instrs = sub.compile(body, true)?;
        if !body_instrs.last().is_some_and(Instr::is_return) {
            body_instrs.push(Instr::op(OpCode::ReturnValue));
        }
        let code = sub.finish(body_instrs)?;

        let code = self.slots.constant(Constant::Code(Arc::new(code)));
        let name = self.slots.constant(Constant::Str(qualname));
        instrs.push(Instr::new(OpCode::LoadConst, code));
        instrs.push(Instr::new(OpCode::LoadConst, name));
        instrs.push(Instr::new(OpCode::MakeFunction, make_flags).at(node.line));

        if class_body || node.text.is_empty() {
            discard(&mut instrs, production);
        } else {
            if production {
                instrs.push(Instr::op(OpCode::DupTop));
            }
            instrs.push(self.store_name(&node.text));
        }
        Ok(instrs)
    }

    /// Declares the cells owned by the current body.
    pub(super) fn compile_closure(&mut self, node: &Node) -> Result<Vec<Instr>> {
        for reference in &node.children {
            if reference.kind != NodeKind::Reference {
                return Err(Error::Internal(format!(
                    "unexpected {:?} in cell list of {}",
                    reference.kind, self.name
                )));
            }
            if !self.slots.cellvars.contains(&reference.text) {
                self.slots.cellvars.push(reference.text.clone());
            }
            if self.mode.exports() {
                self.exports.insert(reference.text.clone());
            }
        }
        Ok(Vec::new())
    }

    /// `__build_class__(body, name, *bases, **keywords)`.
    pub(super) fn compile_class(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [bases, body] = node.children.as_slice() else {
            return Err(self.error("malformed class", node));
        };
        let mut instrs = vec![Instr::op(OpCode::LoadBuildClass).at(node.line)];
        instrs.extend(self.compile_lambda(body, true, true)?);
        let name = self
            .slots
            .constant(Constant::Str(label_of(&node.text).to_string()));
        instrs.push(Instr::new(OpCode::LoadConst, name));

        let object;
        let args = if bases.children.is_empty() {
            object = [Node::at(NodeKind::Label, "object", bases)];
            &object[..]
        } else {
            &bases.children[..]
        };
        instrs.extend(self.compile_arguments(args, 2)?);

        if production {
            instrs.push(Instr::op(OpCode::DupTop));
        }
        instrs.push(self.store_name(&node.text));
        Ok(instrs)
    }

    /// Records the module and qualified name in the class name-space.
    pub(super) fn compile_class_init(&mut self, node: &Node) -> Result<Vec<Instr>> {
        let qualname = self.slots.constant(Constant::Str(self.name.clone()));
        Ok(vec![
            self.slots.resolve("__name__", Access::Load).load().at(node.line),
            self.slots.resolve("__module__", Access::Store).store(),
            Instr::new(OpCode::LoadConst, qualname),
            self.slots.resolve("__qualname__", Access::Store).store(),
        ])
    }

    /// Returns the `__class__` cell so the class builder can fill it.
    pub(super) fn compile_class_cell(&mut self, node: &Node) -> Result<Vec<Instr>> {
        let Some(index) = self.slots.deref(CLASS_CELL) else {
            return Err(Error::Internal(format!(
                "class body {} has no {} cell",
                self.name, CLASS_CELL
            )));
        };
        Ok(vec![
            Instr::new(OpCode::LoadClosure, index).at(node.line),
            Instr::op(OpCode::DupTop),
            self.slots.resolve("__classcell__", Access::Store).store(),
            Instr::op(OpCode::ReturnValue),
        ])
    }

    // ========================================================================
    // Imports
    // ========================================================================

    pub(super) fn compile_import(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [level, module, fromlist] = node.children.as_slice() else {
            return Err(self.error("malformed import", node));
        };
        let level = self.literal(level)?;
        let mut instrs = vec![Instr::new(OpCode::LoadConst, level).at(node.line)];

        let mut entries = Vec::new();
        for entry in &fromlist.children {
            match (entry.kind, entry.children.as_slice()) {
                (NodeKind::Label, _) => entries.push((label_of(&entry.text).to_string(), entry)),
                (_, [source, alias]) if entry.is_operator("as") => {
                    entries.push((source.text.clone(), alias));
                }
                _ => return Err(self.error("expected label", entry)),
            }
        }

        if entries.is_empty() {
            instrs.push(Instr::new(OpCode::LoadConst, 0));
        } else {
            for (source, _) in &entries {
                let index = self.slots.constant(Constant::Str(source.clone()));
                instrs.push(Instr::new(OpCode::LoadConst, index));
            }
            instrs.push(Instr::new(OpCode::BuildTuple, entries.len() as u32));
        }
        let name = self.slots.name(&module.text);
        instrs.push(Instr::new(OpCode::ImportName, name));

        for (source, target) in entries {
            let index = self.slots.name(&source);
            instrs.push(Instr::new(OpCode::ImportFrom, index));
            instrs.push(self.store_name(&target.text));
        }

        if production {
            instrs.push(Instr::op(OpCode::DupTop));
        }
        instrs.push(self.store_name(&node.text));
        Ok(instrs)
    }

    // ========================================================================
    // Generators
    // ========================================================================

    pub(super) fn compile_yield(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        if self.mode.exports() {
            return Err(self.error("yield in global scope", node));
        }
        self.flags.insert(CodeFlags::GENERATOR);
        let mut instrs = match node.children.first() {
            Some(value) => self.compile(value, true)?,
            None => vec![Instr::new(OpCode::LoadConst, 0)],
        };
        instrs.push(Instr::op(OpCode::YieldValue).at(node.line));
        discard(&mut instrs, production);
        Ok(instrs)
    }

    pub(super) fn compile_yield_from(
        &mut self,
        node: &Node,
        production: bool,
    ) -> Result<Vec<Instr>> {
        if self.mode.exports() {
            return Err(self.error("yield in global scope", node));
        }
        let Some(value) = node.children.first() else {
            return Err(self.error("expected expression after yield from", node));
        };
        self.flags.insert(CodeFlags::GENERATOR);
        let mut instrs = self.compile(value, true)?;
        instrs.push(Instr::op(OpCode::GetYieldFromIter));
        instrs.push(Instr::new(OpCode::LoadConst, 0));
        instrs.push(Instr::op(OpCode::YieldFrom).at(node.line));
        discard(&mut instrs, production);
        Ok(instrs)
    }
}
