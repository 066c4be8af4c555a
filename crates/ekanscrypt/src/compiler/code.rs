//! The immutable compiled unit and its disassembler.

use std::fmt::{self, Write};
use std::sync::Arc;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::bytecode::{OpCode, COMPARE_OPS};

/// Entry of a constant pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constant {
    /// `null`
    None,
    /// `true` / `false`
    Bool(bool),
    /// Integer that fits in 64 bits
    Int(i64),
    /// Integer that does not
    BigInt(BigInt),
    /// Floating point number
    Float(#[serde(with = "float_bits")] f64),
    /// Imaginary number `0 + im*j`
    Complex(#[serde(with = "float_bits")] f64),
    /// Text
    Str(String),
    /// Byte string
    Bytes(Vec<u8>),
    /// Body of a nested function or class
    Code(Arc<CodeObject>),
}

/// Floats persist as their bit pattern: JSON has no `nan` or infinities,
/// and `-0.0` must stay distinct.
mod float_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

impl Constant {
    /// Pool identity: equal values of the same type share a slot.
    ///
    /// Floats compare by bit pattern so `nan` deduplicates and `-0.0`
    /// stays distinct from `0.0`. Code objects are never shared.
    pub fn same(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::None, Constant::None) => true,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::BigInt(a), Constant::BigInt(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Complex(a), Constant::Complex(b)) => a.to_bits() == b.to_bits(),
            (Constant::Str(a), Constant::Str(b)) => a == b,
            (Constant::Bytes(a), Constant::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Code(a), Constant::Code(b)) => a == b,
            _ => self.same(other),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => f.write_str("None"),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::BigInt(i) => write!(f, "{}", i),
            Constant::Float(x) => write!(f, "{:?}", x),
            Constant::Complex(x) => write!(f, "{:?}j", x),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Constant::Code(code) => write!(f, "<code {}>", code.name),
        }
    }
}

/// Code object flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFlags(pub u32);

impl CodeFlags {
    /// Takes `*args`
    pub const VARARGS: u32 = 0x04;
    /// Takes `**kwargs`
    pub const VARKEYWORDS: u32 = 0x08;
    /// Body contains `yield`
    pub const GENERATOR: u32 = 0x20;

    /// True when every bit of `flag` is set.
    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Sets `flag`.
    pub fn insert(&mut self, flag: u32) {
        self.0 |= flag;
    }
}

/// A fully assembled function, class or module body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeObject {
    /// Qualified name
    pub name: String,
    /// Source file
    pub filename: Arc<str>,
    /// Line of the definition
    pub first_line: u32,
    /// Number of positional parameters
    pub argcount: u32,
    /// Flag bits
    pub flags: CodeFlags,
    /// Maximum value stack depth
    pub stacksize: u32,
    /// Encoded instructions
    pub code: Vec<u8>,
    /// Constant pool; slot 0 is always none
    pub constants: Vec<Constant>,
    /// Attribute, global and name-space names
    pub names: Vec<String>,
    /// Fast slots; parameters come first
    pub varnames: Vec<String>,
    /// Cells owned by this body
    pub cellvars: Vec<String>,
    /// Cells captured from enclosing bodies
    pub freevars: Vec<String>,
    /// `(offset, line)` at every line change
    pub lines: Vec<(u32, u32)>,
}

/// One decoded instruction, with its extended-argument prefixes folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Offset of the first byte, prefixes included
    pub offset: usize,
    /// Offset of the next instruction
    pub next: usize,
    /// The operation
    pub opcode: OpCode,
    /// Full operand
    pub arg: u32,
}

impl CodeObject {
    /// Decodes the instruction starting at `offset`.
    pub fn decode(&self, offset: usize) -> Option<Decoded> {
        let mut pc = offset;
        let mut arg = 0u32;
        loop {
            let op = OpCode::from_byte(*self.code.get(pc)?)?;
            arg = (arg << 8) | u32::from(*self.code.get(pc + 1)?);
            pc += 2;
            if op != OpCode::ExtendedArg {
                return Some(Decoded {
                    offset,
                    next: pc,
                    opcode: op,
                    arg,
                });
            }
        }
    }

    /// Iterates over every decoded instruction.
    pub fn instructions(&self) -> impl Iterator<Item = Decoded> + '_ {
        std::iter::successors(self.decode(0), move |d| self.decode(d.next))
    }

    /// Source line of the instruction at `offset`.
    pub fn line_at(&self, offset: usize) -> u32 {
        self.lines
            .iter()
            .take_while(|(start, _)| *start as usize <= offset)
            .last()
            .map(|(_, line)| *line)
            .unwrap_or(self.first_line)
    }

    /// Name of the deref slot `index`: cellvars first, then freevars.
    pub fn deref_name(&self, index: usize) -> Option<&str> {
        let name = if index < self.cellvars.len() {
            self.cellvars.get(index)
        } else {
            self.freevars.get(index - self.cellvars.len())
        };
        name.map(String::as_str)
    }

    fn describe(&self, d: &Decoded) -> String {
        let index = d.arg as usize;
        let text = match d.opcode {
            OpCode::LoadConst => self.constants.get(index).map(Constant::to_string),
            OpCode::LoadName
            | OpCode::StoreName
            | OpCode::DeleteName
            | OpCode::LoadGlobal
            | OpCode::StoreGlobal
            | OpCode::DeleteGlobal
            | OpCode::LoadAttr
            | OpCode::StoreAttr
            | OpCode::ImportName
            | OpCode::ImportFrom => self.names.get(index).cloned(),
            OpCode::LoadFast | OpCode::StoreFast | OpCode::DeleteFast => {
                self.varnames.get(index).cloned()
            }
            OpCode::LoadDeref
            | OpCode::StoreDeref
            | OpCode::DeleteDeref
            | OpCode::LoadClosure => self.deref_name(index).map(str::to_string),
            OpCode::CompareOp => COMPARE_OPS.get(index).map(|s| s.to_string()),
            op if op.is_relative_jump() => Some(format!("to {}", d.next + index)),
            op if op.is_absolute_jump() => Some(format!("to {}", index)),
            _ => None,
        };
        text.map(|t| format!("({})", t)).unwrap_or_default()
    }

    /// Renders `offset line OPCODE arg (resolved operand)` listings for
    /// this body and every nested code object.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "Disassembly of <code {}> ({}:{}) stacksize={}",
            self.name, self.filename, self.first_line, self.stacksize
        );
        let mut last_line = None;
        for d in self.instructions() {
            let line = self.line_at(d.offset);
            let shown = if last_line == Some(line) {
                String::new()
            } else {
                line.to_string()
            };
            last_line = Some(line);
            let arg = if d.opcode.has_arg() {
                d.arg.to_string()
            } else {
                String::new()
            };
            let _ = writeln!(
                out,
                "{:>6} {:>4} {:<28} {:>5} {}",
                d.offset,
                shown,
                d.opcode.name(),
                arg,
                self.describe(&d)
            );
        }
        for constant in &self.constants {
            if let Constant::Code(code) = constant {
                out.push('\n');
                code.disassemble_into(out);
            }
        }
    }
}

impl fmt::Display for CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.disassemble())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeObject {
        CodeObject {
            name: "<module>".to_string(),
            filename: Arc::from("t.es"),
            first_line: 1,
            argcount: 0,
            flags: CodeFlags::default(),
            stacksize: 1,
            code: vec![
                OpCode::LoadConst as u8,
                1,
                OpCode::ExtendedArg as u8,
                1,
                OpCode::JumpAbsolute as u8,
                2,
                OpCode::ReturnValue as u8,
                0,
            ],
            constants: vec![Constant::None, Constant::Int(7)],
            names: vec![],
            varnames: vec![],
            cellvars: vec!["a".to_string()],
            freevars: vec!["b".to_string()],
            lines: vec![(0, 1), (6, 3)],
        }
    }

    #[test]
    fn test_decode_folds_extended_arg() {
        let code = sample();
        let decoded: Vec<_> = code.instructions().collect();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[1].opcode, OpCode::JumpAbsolute);
        assert_eq!(decoded[1].arg, 0x102);
        assert_eq!((decoded[1].offset, decoded[1].next), (2, 6));
    }

    #[test]
    fn test_line_at() {
        let code = sample();
        assert_eq!(code.line_at(0), 1);
        assert_eq!(code.line_at(4), 1);
        assert_eq!(code.line_at(6), 3);
    }

    #[test]
    fn test_deref_name() {
        let code = sample();
        assert_eq!(code.deref_name(0), Some("a"));
        assert_eq!(code.deref_name(1), Some("b"));
        assert_eq!(code.deref_name(2), None);
    }

    #[test]
    fn test_disassemble_resolves_operands() {
        let text = sample().disassemble();
        assert!(text.contains("LOAD_CONST"));
        assert!(text.contains("(7)"));
        assert!(text.contains("(to 258)"));
    }

    #[test]
    fn test_constant_identity() {
        assert!(Constant::Float(f64::NAN).same(&Constant::Float(f64::NAN)));
        assert!(!Constant::Float(0.0).same(&Constant::Float(-0.0)));
        assert!(!Constant::Int(1).same(&Constant::Bool(true)));
        assert!(!Constant::Int(1).same(&Constant::Float(1.0)));
    }

    #[test]
    fn test_non_finite_floats_survive_json() {
        let pool = vec![
            Constant::Float(f64::NAN),
            Constant::Float(f64::NEG_INFINITY),
            Constant::Float(-0.0),
            Constant::Complex(f64::INFINITY),
        ];
        let json = serde_json::to_string(&pool).unwrap();
        assert!(!json.contains("null"));
        let back: Vec<Constant> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pool);
    }
}
