//! Fixed-point jump layout.
//!
//! Every instruction starts at the width its operand needs. Resolving a
//! label may push a jump operand past a byte boundary, which widens the
//! jump and shifts every later offset, which may widen other jumps.
//! Widths only ever grow and are bounded by 8 bytes, so the walk reaches
//! a fixed point within a small number of passes.

use rustc_hash::FxHashMap;

use super::bytecode::{encoded_width, Instr, Label};
use crate::error::{Error, Result};

/// Result of a successful layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Byte offset of every instruction
    pub offsets: Vec<u32>,
    /// Index of the instruction carrying each label
    pub labels: FxHashMap<Label, usize>,
    /// Passes needed to converge
    pub passes: u32,
}

/// Collects label positions; a label attached twice is a compiler defect.
pub fn label_positions(instrs: &[Instr], name: &str) -> Result<FxHashMap<Label, usize>> {
    let mut labels = FxHashMap::default();
    for (index, instr) in instrs.iter().enumerate() {
        for label in &instr.labels {
            if labels.insert(*label, index).is_some() {
                return Err(Error::Internal(format!(
                    "label {} attached twice in {}",
                    label, name
                )));
            }
        }
    }
    Ok(labels)
}

/// Resolves every jump operand in place.
///
/// Passing `max(20, 3 * jumps + 2)` passes is an internal error; a
/// warning is logged once `warn_after` passes have run.
pub fn layout(instrs: &mut [Instr], name: &str, warn_after: u32) -> Result<Layout> {
    let labels = label_positions(instrs, name)?;

    let mut jumps = 0u32;
    for instr in instrs.iter_mut() {
        if instr.escape.is_some() {
            return Err(Error::Internal(format!(
                "unresolved escape reached layout in {}",
                name
            )));
        }
        match instr.target {
            Some(target) if !labels.contains_key(&target) => {
                return Err(Error::Internal(format!(
                    "jump to undefined label {} in {}",
                    target, name
                )));
            }
            Some(_) => jumps += 1,
            None => {}
        }
        instr.size = instr.size.max(encoded_width(instr.arg));
    }

    let bound = (3 * jumps + 2).max(20);
    let mut offsets = vec![0u32; instrs.len()];
    let mut stable = 0;
    let mut passes = 0;

    while stable < 2 {
        passes += 1;
        if passes > bound {
            return Err(Error::Internal(format!(
                "failed to finalize {}: layout did not converge after {} passes",
                name, bound
            )));
        }
        if passes == warn_after + 1 {
            tracing::warn!(name, passes, "jump layout is slow to converge");
        }

        let mut offset = 0u32;
        for (i, instr) in instrs.iter().enumerate() {
            offsets[i] = offset;
            offset += instr.size;
        }

        let mut changed = 0;
        for i in 0..instrs.len() {
            let Some(target) = instrs[i].target else {
                continue;
            };
            let destination = offsets[labels[&target]];
            let end = offsets[i] + instrs[i].size;
            let arg = if instrs[i].opcode.is_relative_jump() {
                destination.checked_sub(end).ok_or_else(|| {
                    Error::Internal(format!(
                        "backward relative {} at offset {} in {}",
                        instrs[i].opcode, offsets[i], name
                    ))
                })?
            } else {
                destination
            };
            let size = instrs[i].size.max(encoded_width(arg));
            if size != instrs[i].size {
                changed += 1;
            }
            instrs[i].arg = arg;
            instrs[i].size = size;
        }

        tracing::trace!(name, pass = passes, changed, "layout pass");
        if changed == 0 {
            stable += 1;
        } else {
            stable = 0;
        }
    }

    Ok(Layout {
        offsets,
        labels,
        passes,
    })
}

/// Gives every instruction without a line the line of the one before it.
pub fn fill_lines(instrs: &mut [Instr], first_line: u32) {
    let mut current = first_line;
    for instr in instrs {
        match instr.line {
            Some(line) => current = line,
            None => instr.line = Some(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::bytecode::OpCode;

    fn nops(n: usize) -> Vec<Instr> {
        (0..n).map(|_| Instr::op(OpCode::Nop)).collect()
    }

    #[test]
    fn test_short_jumps() {
        let mut instrs = vec![Instr::jump(OpCode::JumpForward, Label(0))];
        instrs.extend(nops(3));
        instrs.push(Instr::op(OpCode::ReturnValue).labeled(Label(0)));

        let result = layout(&mut instrs, "t", 10).unwrap();
        assert_eq!(result.offsets, vec![0, 2, 4, 6, 8]);
        assert_eq!(instrs[0].arg, 6);
        assert_eq!(instrs[0].size, 2);
        assert_eq!(result.passes, 2);
    }

    #[test]
    fn test_wide_jump_grows() {
        let mut instrs = vec![Instr::op(OpCode::Nop).labeled(Label(0))];
        instrs.extend(nops(200));
        instrs.push(Instr::jump(OpCode::JumpAbsolute, Label(0)));
        instrs.push(Instr::jump(OpCode::JumpForward, Label(1)));
        instrs.extend(nops(200));
        instrs.push(Instr::op(OpCode::ReturnValue).labeled(Label(1)));

        let result = layout(&mut instrs, "t", 10).unwrap();
        let back = &instrs[201];
        assert_eq!((back.arg, back.size), (0, 2));
        let forward = &instrs[202];
        assert_eq!(forward.size, 4);
        assert_eq!(forward.arg, 400);
        let end = result.offsets[202] + forward.size;
        assert_eq!(end + forward.arg, result.offsets[403]);
    }

    #[test]
    fn test_cascading_growth_converges() {
        // The backward jump needs two bytes of operand only once the
        // forward jump in front of it has grown.
        let mut instrs = vec![Instr::jump(OpCode::JumpForward, Label(1))];
        instrs.extend(nops(126));
        instrs.push(Instr::op(OpCode::Nop).labeled(Label(0)));
        instrs.push(Instr::jump(OpCode::JumpAbsolute, Label(0)));
        instrs.push(Instr::op(OpCode::ReturnValue).labeled(Label(1)));

        let result = layout(&mut instrs, "t", 10).unwrap();
        let target = result.offsets[127];
        assert_eq!(target, 256);
        assert_eq!(instrs[128].arg, target);
        assert_eq!(instrs[128].size, 4);
        let end = result.offsets[0] + instrs[0].size;
        assert_eq!(end + instrs[0].arg, result.offsets[129]);
        assert!(result.passes >= 2);
    }

    #[test]
    fn test_undefined_label() {
        let mut instrs = vec![Instr::jump(OpCode::JumpAbsolute, Label(9))];
        assert!(matches!(layout(&mut instrs, "t", 10), Err(Error::Internal(_))));
    }

    #[test]
    fn test_duplicate_label() {
        let mut instrs = vec![
            Instr::op(OpCode::Nop).labeled(Label(1)),
            Instr::op(OpCode::Nop).labeled(Label(1)),
        ];
        assert!(matches!(layout(&mut instrs, "t", 10), Err(Error::Internal(_))));
    }

    #[test]
    fn test_fill_lines() {
        let mut instrs = nops(4);
        instrs[1].line = Some(3);
        fill_lines(&mut instrs, 1);
        let lines: Vec<_> = instrs.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![Some(1), Some(3), Some(3), Some(3)]);
    }
}
