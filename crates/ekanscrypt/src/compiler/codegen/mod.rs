//! Code generation from the resolved forest to symbolic instructions.
//!
//! Every node kind has one translation case, parameterized by the
//! production flag: `true` when the caller needs the value on the stack,
//! `false` when the node is a statement. A case returns its instruction
//! list and the caller concatenates.

mod control;
mod expressions;
mod functions;
mod storage;

#[cfg(test)]
mod tests;

pub use storage::{Slots, Storage};

use std::collections::BTreeSet;

use crate::ast::{BuildKind, Node, NodeKind};
use crate::compiler::assembler::{self, CodeParts};
use crate::compiler::bytecode::{EscapeKind, Instr, Label, OpCode};
use crate::compiler::code::{CodeFlags, CodeObject, Constant};
use crate::config::{CompileMode, CompileOptions};
use crate::error::{Error, Result};
use crate::lexer::literals::{self, Number};
use crate::resolver::{label_of, Access};

/// Compiles one body into a code object.
pub struct Compiler<'a> {
    options: &'a CompileOptions,
    mode: CompileMode,
    /// Qualified name of the body
    pub name: String,
    depth: u32,
    first_line: u32,
    /// Constant, name and variable pools
    pub slots: Slots,
    flags: CodeFlags,
    argcount: u32,
    exports: BTreeSet<String>,
    next_label: u32,
}

impl<'a> Compiler<'a> {
    /// Creates the compiler of a unit's top level.
    pub fn new(options: &'a CompileOptions) -> Self {
        Self {
            options,
            mode: options.mode,
            name: options.name.clone(),
            depth: 0,
            first_line: 1,
            slots: Slots::new(options.globals.clone(), false),
            flags: CodeFlags::default(),
            argcount: 0,
            exports: BTreeSet::new(),
            next_label: 0,
        }
    }

    /// Creates the compiler of a nested function or class body.
    fn nested(&self, name: String, no_fast: bool, line: u32) -> Compiler<'a> {
        Compiler {
            options: self.options,
            mode: CompileMode::Function,
            name,
            depth: self.depth + 1,
            first_line: line,
            slots: Slots::new(self.options.globals.clone(), no_fast),
            flags: CodeFlags::default(),
            argcount: 0,
            exports: BTreeSet::new(),
            next_label: 0,
        }
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Compiles a unit's top-level statements.
    pub fn compile_module(mut self, nodes: &[Node]) -> Result<CodeObject> {
        if let Some(first) = nodes.first() {
            self.first_line = first.line;
        }
        let repl = self.mode == CompileMode::Repl;
        let mut instrs = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let production = repl && i + 1 == nodes.len() && node.kind != NodeKind::ExecProcess;
            instrs.extend(self.compile(node, production)?);
            if production {
                instrs.push(self.store_name("_"));
            }
        }
        self.finish(instrs)
    }

    /// Resolves returns, appends the tail and assembles.
    fn finish(mut self, instrs: Vec<Instr>) -> Result<CodeObject> {
        let mut instrs = control::rewrite_escapes(instrs, |escape| match escape.kind {
            EscapeKind::Return => {
                let mut seq = std::mem::take(&mut escape.unwind);
                seq.push(Instr::op(OpCode::ReturnValue));
                Ok(Some(seq))
            }
            EscapeKind::Break => Err(Error::compile(
                "break outside loop",
                escape.line,
                escape.column,
            )),
            EscapeKind::Continue => Err(Error::compile(
                "continue outside loop",
                escape.line,
                escape.column,
            )),
        })?;

        if self.mode.exports() {
            let exports = std::mem::take(&mut self.exports);
            for name in &exports {
                let key = self.slots.constant(Constant::Str(label_of(name).to_string()));
                instrs.push(Instr::new(OpCode::LoadConst, key));
                instrs.push(self.slots.resolve(name, Access::Load).load());
            }
            instrs.push(Instr::new(OpCode::BuildMap, exports.len() as u32));
            instrs.push(Instr::op(OpCode::ReturnValue));
        } else if !instrs.last().is_some_and(Instr::is_return) {
            instrs.push(Instr::new(OpCode::LoadConst, 0));
            instrs.push(Instr::op(OpCode::ReturnValue));
        }

        let parts = CodeParts {
            name: self.name,
            filename: self.options.filename.clone(),
            first_line: self.first_line,
            argcount: self.argcount,
            flags: self.flags,
            constants: self.slots.constants,
            names: self.slots.names,
            varnames: self.slots.varnames,
            cellvars: self.slots.cellvars,
            freevars: self.slots.freevars,
        };
        assembler::assemble(instrs, parts, self.options.layout_warn_after)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Translates one node.
    pub fn compile(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let mut instrs = match node.kind {
            NodeKind::Label | NodeKind::Reference => {
                let mut instrs = vec![self.load(node)?];
                discard(&mut instrs, production);
                instrs
            }
            NodeKind::Number
            | NodeKind::String
            | NodeKind::ByteString
            | NodeKind::True
            | NodeKind::False
            | NodeKind::Null
            | NodeKind::Nan
            | NodeKind::Infinity => {
                let index = self.literal(node)?;
                let mut instrs = vec![Instr::new(OpCode::LoadConst, index)];
                discard(&mut instrs, production);
                instrs
            }
            NodeKind::Empty => self.none(production),
            NodeKind::FormatString => self.compile_helper_string("__es_format__", node, production),
            NodeKind::GlobString => self.compile_helper_string("__es_glob__", node, production),
            NodeKind::RegexString => self.compile_helper_string("__es_regex__", node, production),

            NodeKind::Attr => self.compile_attr(node, production)?,
            NodeKind::OptionalAttr => self.compile_optional_attr(node, production)?,
            NodeKind::Call => self.compile_call(node, production)?,
            NodeKind::Subscr => self.compile_subscr(node, production)?,
            NodeKind::Build(kind) => self.compile_build(node, kind, production)?,
            NodeKind::Tuple => self.compile_build(node, BuildKind::Tuple, production)?,
            NodeKind::Slice => self.compile_slice(node, production)?,
            NodeKind::MultiCompare => self.compile_multi_compare(node, production)?,
            NodeKind::Prefix => self.compile_prefix(node, production)?,
            NodeKind::Postfix => self.compile_postfix(node, production)?,
            NodeKind::Operator1 | NodeKind::Operator2 => self.compile_operator(node, production)?,
            NodeKind::ExecProcess => self.compile_exec(node, production)?,
            NodeKind::ListComprehension
            | NodeKind::SetComprehension
            | NodeKind::DictComprehension => self.compile_comprehension(node, production)?,

            NodeKind::Block => self.compile_block(node, production)?,
            NodeKind::Branch => self.compile_branch(node, production)?,
            NodeKind::While => self.compile_while(node, production)?,
            NodeKind::DoWhile => self.compile_do_while(node, production)?,
            NodeKind::Foreach => self.compile_foreach(node, production)?,
            NodeKind::Switch => self.compile_switch(node, production)?,
            NodeKind::TryCatch => self.compile_try(node, production)?,
            NodeKind::With => self.compile_with(node, production)?,
            NodeKind::Return => self.compile_return(node)?,
            NodeKind::Raise => self.compile_raise(node)?,
            NodeKind::Break => self.compile_escape(node, EscapeKind::Break)?,
            NodeKind::Continue => self.compile_escape(node, EscapeKind::Continue)?,

            NodeKind::Lambda => self.compile_lambda(node, production, false)?,
            NodeKind::Closure => self.compile_closure(node)?,
            NodeKind::Class => self.compile_class(node, production)?,
            NodeKind::ClassInit => self.compile_class_init(node)?,
            NodeKind::ClassInit2 => self.compile_class_cell(node)?,
            NodeKind::Import => self.compile_import(node, production)?,
            NodeKind::Yield => self.compile_yield(node, production)?,
            NodeKind::YieldFrom => self.compile_yield_from(node, production)?,

            NodeKind::Keyword => {
                return Err(self.error(format!("unexpected keyword {}", node.text), node));
            }
            NodeKind::Newline
            | NodeKind::Substitution
            | NodeKind::Args
            | NodeKind::TupleSeparator
            | NodeKind::AttrLabel
            | NodeKind::ParamList
            | NodeKind::LambdaClosure
            | NodeKind::ClassParamList
            | NodeKind::SwitchCase
            | NodeKind::SwitchDefault
            | NodeKind::DefineVar
            | NodeKind::DefineFinal
            | NodeKind::DefineStatic => {
                return Err(self.error(format!("unexpected {:?} node", node.kind), node));
            }
        };

        if let Some(first) = instrs.first_mut() {
            if first.line.is_none() {
                first.line = Some(node.line);
            }
        }
        Ok(instrs)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn error(&self, message: impl Into<String>, node: &Node) -> Error {
        Error::compile(message, node.line, node.column)
    }

    fn new_label(&mut self) -> Label {
        self.next_label += 1;
        Label(self.next_label)
    }

    /// `LOAD_CONST None` when producing, nothing otherwise.
    fn none(&self, production: bool) -> Vec<Instr> {
        if production {
            vec![Instr::new(OpCode::LoadConst, 0)]
        } else {
            Vec::new()
        }
    }

    /// Pool index of a literal leaf.
    fn literal(&mut self, node: &Node) -> Result<u32> {
        let constant = match node.kind {
            NodeKind::Number => match literals::parse_number(&node.text) {
                Ok(Number::Int(i)) => Constant::Int(i),
                Ok(Number::BigInt(i)) => Constant::BigInt(i),
                Ok(Number::Float(x)) => Constant::Float(x),
                Ok(Number::Imaginary(x)) => Constant::Complex(x),
                Err(message) => return Err(self.error(message, node)),
            },
            NodeKind::String => Constant::Str(node.text.clone()),
            NodeKind::ByteString => Constant::Bytes(node.text.as_bytes().to_vec()),
            NodeKind::True => Constant::Bool(true),
            NodeKind::False => Constant::Bool(false),
            NodeKind::Null => Constant::None,
            NodeKind::Nan => Constant::Float(f64::NAN),
            NodeKind::Infinity => Constant::Float(f64::INFINITY),
            _ => return Err(self.error("expected literal", node)),
        };
        Ok(self.slots.constant(constant))
    }

    /// Reads a label or a reference.
    fn load(&mut self, node: &Node) -> Result<Instr> {
        match node.kind {
            NodeKind::Reference => match self.slots.deref(&node.text) {
                Some(i) => Ok(Instr::new(OpCode::LoadDeref, i)),
                None => Err(Error::Internal(format!(
                    "reference {} is not a cell of {}",
                    node.text, self.name
                ))),
            },
            _ => Ok(self.slots.resolve(&node.text, Access::Load).load()),
        }
    }

    /// Stores TOS into `name`, recording top-level exports.
    fn store_name(&mut self, name: &str) -> Instr {
        if self.mode.exports() {
            self.exports.insert(name.to_string());
        }
        self.slots.resolve(name, Access::Store).store()
    }

    /// Stores TOS into a label or reference node.
    fn store_label(&mut self, node: &Node) -> Result<Instr> {
        match node.kind {
            NodeKind::Reference => match self.slots.deref(&node.text) {
                Some(i) => Ok(Instr::new(OpCode::StoreDeref, i)),
                None => Err(Error::Internal(format!(
                    "reference {} is not a cell of {}",
                    node.text, self.name
                ))),
            },
            NodeKind::Label => Ok(self.store_name(&node.text)),
            _ => Err(self.error("expected label", node)),
        }
    }

    fn delete_label(&mut self, node: &Node) -> Result<Instr> {
        match node.kind {
            NodeKind::Reference => match self.slots.deref(&node.text) {
                Some(i) => Ok(Instr::new(OpCode::DeleteDeref, i)),
                None => Err(Error::Internal(format!(
                    "reference {} is not a cell of {}",
                    node.text, self.name
                ))),
            },
            _ => Ok(self.slots.resolve(&node.text, Access::Store).delete()),
        }
    }

    /// Statement bodies: every child but the last discards its value.
    fn compile_block(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let Some((last, rest)) = node.children.split_last() else {
            return Ok(self.none(production));
        };
        let mut instrs = Vec::new();
        for child in rest {
            instrs.extend(self.compile(child, false)?);
        }
        instrs.extend(self.compile(last, production)?);
        Ok(instrs)
    }
}

/// Appends `POP_TOP` in statement position.
fn discard(instrs: &mut Vec<Instr>, production: bool) {
    if !production {
        instrs.push(Instr::op(OpCode::PopTop));
    }
}
