//! Turns a laid-out instruction list into a [`CodeObject`].

use std::sync::Arc;

use super::bytecode::{Instr, OpCode};
use super::code::{CodeFlags, CodeObject, Constant};
use super::layout::{self, Layout};
use crate::error::{Error, Result};

/// Everything a code object needs besides its instructions.
#[derive(Debug, Clone, Default)]
pub struct CodeParts {
    /// Qualified name
    pub name: String,
    /// Source file
    pub filename: Arc<str>,
    /// Line of the definition
    pub first_line: u32,
    /// Positional parameter count
    pub argcount: u32,
    /// Flag bits
    pub flags: CodeFlags,
    /// Constant pool
    pub constants: Vec<Constant>,
    /// Name pool
    pub names: Vec<String>,
    /// Fast slots
    pub varnames: Vec<String>,
    /// Owned cells
    pub cellvars: Vec<String>,
    /// Captured cells
    pub freevars: Vec<String>,
}

/// Lays out, analyses and encodes `instrs`.
pub fn assemble(mut instrs: Vec<Instr>, parts: CodeParts, warn_after: u32) -> Result<CodeObject> {
    let layout = layout::layout(&mut instrs, &parts.name, warn_after)?;
    layout::fill_lines(&mut instrs, parts.first_line);
    let stacksize = max_stack_depth(&instrs, &layout, &parts.name)?;
    let (code, lines) = encode(&instrs, &layout);

    let code = CodeObject {
        name: parts.name,
        filename: parts.filename,
        first_line: parts.first_line,
        argcount: parts.argcount,
        flags: parts.flags,
        stacksize,
        code,
        constants: parts.constants,
        names: parts.names,
        varnames: parts.varnames,
        cellvars: parts.cellvars,
        freevars: parts.freevars,
        lines,
    };
    tracing::debug!(
        name = %code.name,
        bytes = code.code.len(),
        stacksize,
        passes = layout.passes,
        "assembled code object"
    );
    Ok(code)
}

/// Walks every reachable path and returns the deepest value stack.
pub fn max_stack_depth(instrs: &[Instr], layout: &Layout, name: &str) -> Result<u32> {
    let mut depths: Vec<Option<i32>> = vec![None; instrs.len()];
    let mut pending = vec![(0usize, 0i32)];
    let mut max = 0i32;
    let mut budget = instrs.len().saturating_mul(8).max(64);

    while let Some((index, depth)) = pending.pop() {
        if index >= instrs.len() {
            continue;
        }
        if depths[index].is_some_and(|seen| seen >= depth) {
            continue;
        }
        budget = budget.checked_sub(1).ok_or_else(|| {
            Error::Internal(format!("stack depth analysis did not settle in {}", name))
        })?;
        depths[index] = Some(depth);
        max = max.max(depth);

        let instr = &instrs[index];
        let underflow = |after: i32| {
            if after < 0 {
                Err(Error::Internal(format!(
                    "stack underflow at {} (offset {}) in {}",
                    instr.opcode, layout.offsets[index], name
                )))
            } else {
                Ok(after)
            }
        };

        if let Some(target) = instr.target {
            let after = underflow(depth + instr.opcode.stack_effect(instr.arg, true))?;
            max = max.max(after);
            pending.push((layout.labels[&target], after));
        }
        if !instr.opcode.is_terminal() {
            let after = underflow(depth + instr.opcode.stack_effect(instr.arg, false))?;
            max = max.max(after);
            pending.push((index + 1, after));
        }
    }
    Ok(max as u32)
}

/// Emits the byte string and the `(offset, line)` table.
fn encode(instrs: &[Instr], layout: &Layout) -> (Vec<u8>, Vec<(u32, u32)>) {
    let mut code = Vec::new();
    let mut lines: Vec<(u32, u32)> = Vec::new();
    for (instr, offset) in instrs.iter().zip(&layout.offsets) {
        if let Some(line) = instr.line {
            if lines.last().map(|(_, l)| *l) != Some(line) {
                lines.push((*offset, line));
            }
        }
        let units = instr.size / 2;
        for k in (1..units).rev() {
            code.push(OpCode::ExtendedArg as u8);
            code.push(instr.arg.checked_shr(8 * k).unwrap_or(0) as u8);
        }
        code.push(instr.opcode as u8);
        code.push(instr.arg as u8);
    }
    (code, lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::Label;

    fn parts() -> CodeParts {
        CodeParts {
            name: "t".to_string(),
            filename: Arc::from("t.es"),
            first_line: 1,
            constants: vec![Constant::None, Constant::Int(1)],
            ..CodeParts::default()
        }
    }

    #[test]
    fn test_stack_depth_straight_line() {
        let instrs = vec![
            Instr::new(OpCode::LoadConst, 1),
            Instr::new(OpCode::LoadConst, 1),
            Instr::op(OpCode::BinaryAdd),
            Instr::op(OpCode::ReturnValue),
        ];
        let code = assemble(instrs, parts(), 10).unwrap();
        assert_eq!(code.stacksize, 2);
        assert_eq!(code.code.len(), 8);
    }

    #[test]
    fn test_stack_depth_follows_both_paths() {
        // FOR_ITER pushes on fall-through and pops the iterator on exit.
        let instrs = vec![
            Instr::op(OpCode::BuildList),
            Instr::op(OpCode::GetIter),
            Instr::jump(OpCode::ForIter, Label(1)).labeled(Label(0)),
            Instr::op(OpCode::PopTop),
            Instr::jump(OpCode::JumpAbsolute, Label(0)),
            Instr::new(OpCode::LoadConst, 0).labeled(Label(1)),
            Instr::op(OpCode::ReturnValue),
        ];
        let code = assemble(instrs, parts(), 10).unwrap();
        assert_eq!(code.stacksize, 2);
    }

    #[test]
    fn test_underflow_is_internal() {
        let instrs = vec![Instr::op(OpCode::PopTop), Instr::op(OpCode::ReturnValue)];
        assert!(matches!(
            assemble(instrs, parts(), 10),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_extended_arg_encoding() {
        let instrs = vec![
            Instr::new(OpCode::LoadConst, 0x1_0203),
            Instr::op(OpCode::ReturnValue),
        ];
        let code = assemble(instrs, parts(), 10).unwrap();
        assert_eq!(
            &code.code[..6],
            &[
                OpCode::ExtendedArg as u8,
                0x01,
                OpCode::ExtendedArg as u8,
                0x02,
                OpCode::LoadConst as u8,
                0x03
            ]
        );
        assert_eq!(code.decode(0).map(|d| d.arg), Some(0x1_0203));
    }

    #[test]
    fn test_line_table_records_changes() {
        let instrs = vec![
            Instr::new(OpCode::LoadConst, 1).at(1),
            Instr::op(OpCode::PopTop),
            Instr::new(OpCode::LoadConst, 0).at(4),
            Instr::op(OpCode::ReturnValue).at(4),
        ];
        let code = assemble(instrs, parts(), 10).unwrap();
        assert_eq!(code.lines, vec![(0, 1), (4, 4)]);
    }
}
