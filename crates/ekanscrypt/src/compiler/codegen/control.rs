//! Branches, loops, protected regions and escapes.
//!
//! `break`, `continue` and `return` compile to placeholders carrying an
//! [`Escape`]. Each enclosing construct rewrites the placeholders found in
//! its body: a loop resolves the escapes aimed at it into jumps and a
//! protected region prepends its clean-up to the ones leaving it. What is
//! left at the end of a body is handled by the function tail.

use super::Compiler;
use crate::ast::{Node, NodeKind};
use crate::compiler::bytecode::{compare_index, Escape, EscapeKind, Instr, Label, OpCode};
use crate::config::CompileMode;
use crate::error::{Error, Result};
use crate::lexer::literals::{self, Number};

/// Rewrites every pending escape in `instrs`.
///
/// `rewrite` returns the replacement sequence, or `None` to keep the
/// placeholder pending. Labels on a replaced placeholder move to the first
/// replacement instruction.
pub(super) fn rewrite_escapes<F>(instrs: Vec<Instr>, mut rewrite: F) -> Result<Vec<Instr>>
where
    F: FnMut(&mut Escape) -> Result<Option<Vec<Instr>>>,
{
    let mut out = Vec::with_capacity(instrs.len());
    for mut instr in instrs {
        let Some(escape) = instr.escape.as_mut() else {
            out.push(instr);
            continue;
        };
        match rewrite(escape)? {
            None => out.push(instr),
            Some(mut replacement) => {
                if replacement.is_empty() {
                    replacement.push(Instr::op(OpCode::Nop));
                }
                let first = &mut replacement[0];
                first.labels.splice(0..0, instr.labels);
                if first.line.is_none() {
                    first.line = instr.line;
                }
                out.extend(replacement);
            }
        }
    }
    Ok(out)
}

/// How a loop treats the escapes of its body.
struct LoopExit {
    continue_to: Label,
    break_to: Label,
    /// Unwind of a `break` or `continue` crossing the loop
    step: Vec<Instr>,
    /// Unwind of a `return` crossing the loop
    return_step: Vec<Instr>,
}

fn resolve_loop(instrs: Vec<Instr>, exit: &LoopExit) -> Result<Vec<Instr>> {
    rewrite_escapes(instrs, |escape| {
        match escape.kind {
            EscapeKind::Return => escape.unwind.extend(exit.return_step.iter().cloned()),
            EscapeKind::Break | EscapeKind::Continue if escape.depth > 1 => {
                escape.depth -= 1;
                escape.unwind.extend(exit.step.iter().cloned());
            }
            kind => {
                let target = if kind == EscapeKind::Break {
                    exit.break_to
                } else {
                    exit.continue_to
                };
                let mut seq = std::mem::take(&mut escape.unwind);
                seq.push(Instr::jump(OpCode::JumpAbsolute, target));
                return Ok(Some(seq));
            }
        }
        Ok(None)
    })
}

/// Appends the clean-up of a region to every escape leaving it.
fn cross_region(instrs: Vec<Instr>, unwind: &[Instr], return_prefix: &[Instr]) -> Result<Vec<Instr>> {
    rewrite_escapes(instrs, |escape| {
        if escape.kind == EscapeKind::Return {
            escape.unwind.extend(return_prefix.iter().cloned());
        }
        escape.unwind.extend(unwind.iter().cloned());
        Ok(None)
    })
}

fn has_escape(instrs: &[Instr]) -> bool {
    instrs.iter().any(|i| i.escape.is_some())
}

impl Compiler<'_> {
    // ========================================================================
    // Branches and loops
    // ========================================================================

    pub(super) fn compile_branch(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [test, on_true, on_false] = node.children.as_slice() else {
            return Err(self.error("malformed if", node));
        };
        let otherwise = self.new_label();
        let end = self.new_label();

        let mut instrs = self.compile(test, true)?;
        instrs.push(Instr::jump(OpCode::PopJumpIfFalse, otherwise));
        instrs.extend(self.compile(on_true, production)?);
        instrs.push(Instr::jump(OpCode::JumpAbsolute, end));
        instrs.push(Instr::op(OpCode::Nop).labeled(otherwise));
        instrs.extend(self.compile(on_false, production)?);
        instrs.push(Instr::op(OpCode::Nop).labeled(end));
        Ok(instrs)
    }

    pub(super) fn compile_while(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [test, body] = node.children.as_slice() else {
            return Err(self.error("malformed while", node));
        };
        let exit = LoopExit {
            continue_to: self.new_label(),
            break_to: self.new_label(),
            step: Vec::new(),
            return_step: Vec::new(),
        };

        let mut instrs = self.compile(test, true)?;
        instrs[0].labels.push(exit.continue_to);
        instrs.push(Instr::jump(OpCode::PopJumpIfFalse, exit.break_to));
        instrs.extend(resolve_loop(self.compile(body, false)?, &exit)?);
        instrs.push(Instr::jump(OpCode::JumpAbsolute, exit.continue_to));
        instrs.push(Instr::op(OpCode::Nop).labeled(exit.break_to));
        if production {
            instrs.extend(self.compile(test, true)?);
        }
        Ok(instrs)
    }

    pub(super) fn compile_do_while(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [body, test] = node.children.as_slice() else {
            return Err(self.error("malformed do while", node));
        };
        let start = self.new_label();
        let exit = LoopExit {
            continue_to: self.new_label(),
            break_to: self.new_label(),
            step: Vec::new(),
            return_step: Vec::new(),
        };

        let mut instrs = resolve_loop(self.compile(body, false)?, &exit)?;
        if instrs.is_empty() {
            instrs.push(Instr::op(OpCode::Nop));
        }
        instrs[0].labels.push(start);
        let mut condition = self.compile(test, true)?;
        condition[0].labels.push(exit.continue_to);
        instrs.extend(condition);
        instrs.push(Instr::jump(OpCode::PopJumpIfTrue, start));
        instrs.push(Instr::op(OpCode::Nop).labeled(exit.break_to));
        instrs.extend(self.none(production));
        Ok(instrs)
    }

    pub(super) fn compile_foreach(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [target, iterable, body] = node.children.as_slice() else {
            return Err(self.error("malformed for", node));
        };
        let done = self.new_label();
        let exit = LoopExit {
            continue_to: self.new_label(),
            break_to: self.new_label(),
            step: vec![Instr::op(OpCode::PopTop)],
            return_step: vec![Instr::op(OpCode::RotTwo), Instr::op(OpCode::PopTop)],
        };

        let mut instrs = self.compile(iterable, true)?;
        instrs.push(Instr::op(OpCode::GetIter));
        instrs.push(Instr::jump(OpCode::ForIter, done).labeled(exit.continue_to));
        instrs.extend(self.compile_store(target)?);
        instrs.extend(resolve_loop(self.compile(body, false)?, &exit)?);
        instrs.push(Instr::jump(OpCode::JumpAbsolute, exit.continue_to));
        // a break still has the iterator on the stack
        instrs.push(Instr::op(OpCode::PopTop).labeled(exit.break_to));
        instrs.push(Instr::op(OpCode::Nop).labeled(done));
        instrs.extend(self.none(production));
        Ok(instrs)
    }

    pub(super) fn compile_switch(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let Some((value, clauses)) = node.children.split_first() else {
            return Err(self.error("malformed switch", node));
        };
        let end = self.new_label();
        let equal = compare_index("==").unwrap_or_default();

        let mut tests = self.compile(value, true)?;
        let mut bodies = Vec::new();
        let mut default = None;

        for clause in clauses {
            let entry = self.new_label();
            let body = match clause.kind {
                NodeKind::SwitchCase => {
                    let Some((case, body)) = clause.children.split_first() else {
                        return Err(self.error("expected case value", clause));
                    };
                    let next = self.new_label();
                    tests.push(Instr::op(OpCode::DupTop).at(clause.line));
                    tests.extend(self.compile(case, true)?);
                    tests.push(Instr::new(OpCode::CompareOp, equal));
                    tests.push(Instr::jump(OpCode::PopJumpIfFalse, next));
                    tests.push(Instr::op(OpCode::PopTop));
                    tests.push(Instr::jump(OpCode::JumpForward, entry));
                    tests.push(Instr::op(OpCode::Nop).labeled(next));
                    body.first()
                }
                NodeKind::SwitchDefault => {
                    if default.is_some() {
                        return Err(self.error("multiple default targets", clause));
                    }
                    default = Some(entry);
                    clause.children.first()
                }
                _ => return Err(self.error("expected keyword case or default", clause)),
            };
            bodies.push(Instr::op(OpCode::Nop).labeled(entry));
            if let Some(body) = body {
                bodies.extend(self.compile(body, false)?);
            }
        }

        // no case matched
        tests.push(Instr::op(OpCode::PopTop));
        tests.push(Instr::jump(OpCode::JumpForward, default.unwrap_or(end)));

        let bodies = rewrite_escapes(bodies, |escape| match escape.kind {
            EscapeKind::Break if escape.depth == 1 => {
                let mut seq = std::mem::take(&mut escape.unwind);
                seq.push(Instr::jump(OpCode::JumpAbsolute, end));
                Ok(Some(seq))
            }
            EscapeKind::Break => {
                escape.depth -= 1;
                Ok(None)
            }
            _ => Ok(None),
        })?;

        tests.extend(bodies);
        tests.push(Instr::op(OpCode::Nop).labeled(end));
        tests.extend(self.none(production));
        Ok(tests)
    }

    // ========================================================================
    // Protected regions
    // ========================================================================

    /// Clean-up run by an escape leaving a `finally` region.
    fn finally_unwind(&mut self, body: &Node) -> Result<Vec<Instr>> {
        let mut unwind = vec![Instr::op(OpCode::PopBlock), Instr::op(OpCode::BeginFinally)];
        unwind.extend(self.compile(body, false)?);
        unwind.push(Instr::op(OpCode::EndFinally));
        Ok(unwind)
    }

    /// Adds the `finally` clean-up to each escape leaving `instrs`.
    fn cross_finally(&mut self, instrs: Vec<Instr>, body: Option<&Node>) -> Result<Vec<Instr>> {
        let Some(body) = body else {
            return Ok(instrs);
        };
        if !has_escape(&instrs) {
            return Ok(instrs);
        }
        rewrite_escapes(instrs, |escape| {
            let unwind = self.finally_unwind(body)?;
            escape.unwind.extend(unwind);
            Ok(None)
        })
    }

    pub(super) fn compile_try(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let Some((body, clauses)) = node.children.split_first() else {
            return Err(self.error("malformed try", node));
        };
        let mut catches = Vec::new();
        let mut finally = None;
        for clause in clauses {
            match (clause.text.as_str(), clause.children.as_slice()) {
                ("catch", [test, handler]) => catches.push((clause, test, handler)),
                ("finally", [handler]) => finally = Some(handler),
                _ => return Err(self.error("expected catch or finally", clause)),
            }
        }

        let finally_body = finally.map(|handler| self.compile(handler, false)).transpose()?;
        if let Some(compiled) = &finally_body {
            if let Some(escape) = compiled.iter().find_map(|i| i.escape.as_deref()) {
                let word = match escape.kind {
                    EscapeKind::Break => "break",
                    EscapeKind::Continue => "continue",
                    EscapeKind::Return => "return",
                };
                return Err(Error::compile(
                    format!("{} inside finally block", word),
                    escape.line,
                    escape.column,
                ));
            }
        }

        let after = self.new_label();
        let handler = self.new_label();
        let mut instrs = Vec::new();
        if finally.is_some() {
            instrs.push(Instr::jump(OpCode::SetupFinally, handler).at(node.line));
        }

        if catches.is_empty() {
            let protected = self.compile(body, false)?;
            instrs.extend(self.cross_finally(protected, finally)?);
        } else {
            let mut next = self.new_label();
            instrs.push(Instr::jump(OpCode::SetupFinally, next).at(node.line));
            let protected = cross_region(self.compile(body, false)?, &[Instr::op(OpCode::PopBlock)], &[])?;
            instrs.extend(self.cross_finally(protected, finally)?);
            instrs.push(Instr::op(OpCode::PopBlock));
            instrs.push(Instr::jump(OpCode::JumpForward, after));

            let matches = compare_index("exception match").unwrap_or_default();
            for (clause, test, handler_body) in catches {
                let skip = self.new_label();
                let (filter, name) = match test.children.as_slice() {
                    [filter, name] if test.is_operator("as") => (filter, Some(name)),
                    _ => (test, None),
                };

                let mut segment = vec![Instr::op(OpCode::DupTop).at(clause.line).labeled(next)];
                segment.extend(self.compile(filter, true)?);
                segment.push(Instr::new(OpCode::CompareOp, matches));
                segment.push(Instr::jump(OpCode::PopJumpIfFalse, skip));

                match name {
                    Some(name) => {
                        let cleanup = self.new_label();
                        // The binding is deleted after the handler, so it is never exported.
                        let exported = self.exports.contains(&name.text);
                        let store = self.store_label(name)?;
                        if !exported {
                            self.exports.remove(&name.text);
                        }
                        let delete = self.delete_label(name)?;
                        let clear = vec![
                            Instr::new(OpCode::LoadConst, 0),
                            store.clone(),
                            delete.clone(),
                        ];
                        let mut unwind = vec![Instr::op(OpCode::PopBlock), Instr::op(OpCode::PopExcept)];
                        unwind.extend(clear.iter().cloned());

                        segment.push(store);
                        segment.push(Instr::jump(OpCode::SetupFinally, cleanup));
                        let handled = cross_region(self.compile(handler_body, false)?, &unwind, &[])?;
                        segment.extend(self.cross_finally(handled, finally)?);
                        segment.push(Instr::op(OpCode::PopBlock));
                        segment.push(Instr::op(OpCode::BeginFinally));
                        let mut clear = clear.into_iter();
                        if let Some(first) = clear.next() {
                            segment.push(first.labeled(cleanup));
                        }
                        segment.extend(clear);
                        segment.push(Instr::op(OpCode::EndFinally));
                    }
                    None => {
                        segment.push(Instr::op(OpCode::PopTop));
                        let handled = cross_region(
                            self.compile(handler_body, false)?,
                            &[Instr::op(OpCode::PopExcept)],
                            &[],
                        )?;
                        segment.extend(self.cross_finally(handled, finally)?);
                    }
                }
                segment.push(Instr::op(OpCode::PopExcept));
                segment.push(Instr::jump(OpCode::JumpForward, after));
                instrs.extend(segment);
                next = skip;
            }
            // nothing matched
            instrs.push(Instr::op(OpCode::EndFinally).labeled(next));
        }

        match finally_body {
            Some(compiled) => {
                instrs.push(Instr::op(OpCode::PopBlock).labeled(after));
                instrs.push(Instr::op(OpCode::BeginFinally));
                let mut compiled = compiled;
                if compiled.is_empty() {
                    compiled.push(Instr::op(OpCode::Nop));
                }
                compiled[0].labels.push(handler);
                instrs.extend(compiled);
                instrs.push(Instr::op(OpCode::EndFinally));
            }
            None => instrs.push(Instr::op(OpCode::Nop).labeled(after)),
        }
        instrs.extend(self.none(production));
        Ok(instrs)
    }

    pub(super) fn compile_with(&mut self, node: &Node, production: bool) -> Result<Vec<Instr>> {
        let [items, body] = node.children.as_slice() else {
            return Err(self.error("malformed with", node));
        };
        let items = match items.kind {
            NodeKind::Tuple => items.children.as_slice(),
            _ => std::slice::from_ref(items),
        };

        let mut instrs = Vec::new();
        let mut cleanups = Vec::new();
        for item in items {
            let cleanup = self.new_label();
            let (target, context) = match item.children.as_slice() {
                [name, expr] if item.kind == NodeKind::Slice || item.is_operator("=") => {
                    (Some(name), expr)
                }
                _ => (None, item),
            };
            instrs.extend(self.compile(context, true)?);
            instrs.push(Instr::jump(OpCode::SetupWith, cleanup).at(item.line));
            match target {
                Some(name) => instrs.extend(self.compile_store(name)?),
                None => instrs.push(Instr::op(OpCode::PopTop)),
            }
            cleanups.push(cleanup);
        }

        let mut inner = self.compile(body, false)?;
        for cleanup in cleanups.into_iter().rev() {
            let exit = [
                Instr::op(OpCode::PopBlock),
                Instr::op(OpCode::BeginFinally),
                Instr::op(OpCode::WithCleanupStart),
                Instr::op(OpCode::WithCleanupFinish),
                Instr::op(OpCode::EndFinally),
            ];
            inner = cross_region(inner, &exit, &[Instr::op(OpCode::RotTwo)])?;
            inner.push(Instr::op(OpCode::PopBlock));
            inner.push(Instr::op(OpCode::BeginFinally));
            inner.push(Instr::op(OpCode::WithCleanupStart).labeled(cleanup));
            inner.push(Instr::op(OpCode::WithCleanupFinish));
            inner.push(Instr::op(OpCode::EndFinally));
        }
        instrs.extend(inner);
        instrs.extend(self.none(production));
        Ok(instrs)
    }

    // ========================================================================
    // Escapes
    // ========================================================================

    pub(super) fn compile_return(&mut self, node: &Node) -> Result<Vec<Instr>> {
        if matches!(self.mode, CompileMode::Module | CompileMode::Repl) {
            return Err(self.error("return in global scope", node));
        }
        let mut instrs = match node.children.first() {
            Some(value) => self.compile(value, true)?,
            None => vec![Instr::new(OpCode::LoadConst, 0)],
        };
        instrs.push(Instr::escape(EscapeKind::Return, 1, node.line, node.column));
        Ok(instrs)
    }

    pub(super) fn compile_raise(&mut self, node: &Node) -> Result<Vec<Instr>> {
        if self.mode == CompileMode::Module {
            return Err(self.error("return in global scope", node));
        }
        let mut instrs = Vec::new();
        for child in &node.children {
            instrs.extend(self.compile(child, true)?);
        }
        instrs.push(Instr::new(OpCode::RaiseVarargs, node.children.len() as u32).at(node.line));
        Ok(instrs)
    }

    pub(super) fn compile_escape(&mut self, node: &Node, kind: EscapeKind) -> Result<Vec<Instr>> {
        let depth = match node.children.first() {
            None => 1,
            Some(level) => match literals::parse_number(&level.text) {
                Ok(Number::Int(n)) if level.kind == NodeKind::Number && n >= 1 => n as u32,
                _ => return Err(self.error("expected integer", level)),
            },
        };
        Ok(vec![Instr::escape(kind, depth, node.line, node.column)])
    }
}
