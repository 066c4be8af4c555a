//! Bytecode definitions.
//!
//! Code generation works on a symbolic [`Instr`] list: jump operands are
//! [`Label`]s and escapes (`break`, `continue`, `return`) stay pending
//! until the construct that owns them rewrites them. The layout pass
//! turns the list into concrete offsets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operators addressed by `COMPARE_OP`.
pub const COMPARE_OPS: &[&str] = &[
    "<",
    "<=",
    "==",
    "!=",
    ">",
    ">=",
    "in",
    "not in",
    "is",
    "is not",
    "exception match",
];

/// Index of a comparison operator in [`COMPARE_OPS`].
pub fn compare_index(op: &str) -> Option<u32> {
    COMPARE_OPS.iter().position(|c| *c == op).map(|i| i as u32)
}

/// Opcodes at or above this value carry an argument byte that means
/// something. Below it the argument byte is zero.
pub const HAVE_ARGUMENT: u8 = 90;

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $byte:literal => $name:literal, )*) => {
        /// Operation codes for the VM.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum OpCode {
            $( $(#[$doc])* $variant = $byte, )*
        }

        impl OpCode {
            /// Decodes an opcode byte.
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(OpCode::$variant), )*
                    _ => None,
                }
            }

            /// The mnemonic used by the disassembler.
            pub fn name(self) -> &'static str {
                match self {
                    $( OpCode::$variant => $name, )*
                }
            }
        }
    };
}

opcodes! {
    // Stack operations
    /// Discard TOS
    PopTop = 1 => "POP_TOP",
    /// Swap the two top items
    RotTwo = 2 => "ROT_TWO",
    /// Lift the second and third items one up, move TOS down to third
    RotThree = 3 => "ROT_THREE",
    /// Duplicate TOS
    DupTop = 4 => "DUP_TOP",
    /// Duplicate the two top items
    DupTopTwo = 5 => "DUP_TOP_TWO",
    /// Do nothing; used as a label anchor
    Nop = 9 => "NOP",

    // Unary operations
    /// `+x`
    UnaryPositive = 10 => "UNARY_POSITIVE",
    /// `-x`
    UnaryNegative = 11 => "UNARY_NEGATIVE",
    /// `!x`
    UnaryNot = 12 => "UNARY_NOT",
    /// `~x`
    UnaryInvert = 15 => "UNARY_INVERT",

    // Binary operations
    /// `a @ b`
    BinaryMatrixMultiply = 16 => "BINARY_MATRIX_MULTIPLY",
    /// `a ** b`
    BinaryPower = 19 => "BINARY_POWER",
    /// `a * b`
    BinaryMultiply = 20 => "BINARY_MULTIPLY",
    /// `a % b`
    BinaryModulo = 22 => "BINARY_MODULO",
    /// `a + b`
    BinaryAdd = 23 => "BINARY_ADD",
    /// `a - b`
    BinarySubtract = 24 => "BINARY_SUBTRACT",
    /// `a[b]`
    BinarySubscr = 25 => "BINARY_SUBSCR",
    /// `a // b`
    BinaryFloorDivide = 26 => "BINARY_FLOOR_DIVIDE",
    /// `a / b`
    BinaryTrueDivide = 27 => "BINARY_TRUE_DIVIDE",
    /// `a << b`
    BinaryLshift = 62 => "BINARY_LSHIFT",
    /// `a >> b`
    BinaryRshift = 63 => "BINARY_RSHIFT",
    /// `a & b`
    BinaryAnd = 64 => "BINARY_AND",
    /// `a ^ b`
    BinaryXor = 65 => "BINARY_XOR",
    /// `a | b`
    BinaryOr = 66 => "BINARY_OR",

    // Protected regions
    /// Enter a finally body on the normal path (pushes none)
    BeginFinally = 53 => "BEGIN_FINALLY",
    /// Call the context manager exit with the pending marker
    WithCleanupStart = 81 => "WITH_CLEANUP_START",
    /// Silence the marker when the exit call returned true
    WithCleanupFinish = 82 => "WITH_CLEANUP_FINISH",
    /// Pop the innermost block
    PopBlock = 87 => "POP_BLOCK",
    /// Pop the marker; re-raise it unless it is none
    EndFinally = 88 => "END_FINALLY",
    /// Leave an exception handler
    PopExcept = 89 => "POP_EXCEPT",

    // Subscript stores
    /// `TOS1[TOS] = TOS2`
    StoreSubscr = 60 => "STORE_SUBSCR",
    /// `del TOS1[TOS]`
    DeleteSubscr = 61 => "DELETE_SUBSCR",

    // Iteration and generators
    /// `iter(TOS)`
    GetIter = 68 => "GET_ITER",
    /// Like `GET_ITER`, but keeps generators as they are
    GetYieldFromIter = 69 => "GET_YIELD_FROM_ITER",
    /// Push the class builder
    LoadBuildClass = 71 => "LOAD_BUILD_CLASS",
    /// Delegate to a sub-iterator
    YieldFrom = 72 => "YIELD_FROM",
    /// Return TOS to the caller
    ReturnValue = 83 => "RETURN_VALUE",
    /// Suspend the frame, yielding TOS
    YieldValue = 86 => "YIELD_VALUE",

    // Names
    /// Store in the name-space
    StoreName = 90 => "STORE_NAME",
    /// Delete from the name-space
    DeleteName = 91 => "DELETE_NAME",
    /// Unpack TOS into `arg` values
    UnpackSequence = 92 => "UNPACK_SEQUENCE",
    /// Advance the iterator at TOS or jump forward when exhausted
    ForIter = 93 => "FOR_ITER",
    /// `TOS.name = TOS1`
    StoreAttr = 95 => "STORE_ATTR",
    /// Store in the globals
    StoreGlobal = 97 => "STORE_GLOBAL",
    /// Delete from the globals
    DeleteGlobal = 98 => "DELETE_GLOBAL",
    /// Push a constant
    LoadConst = 100 => "LOAD_CONST",
    /// Load from locals, globals, then builtins
    LoadName = 101 => "LOAD_NAME",

    // Containers
    /// Build a tuple from `arg` items
    BuildTuple = 102 => "BUILD_TUPLE",
    /// Build a list from `arg` items
    BuildList = 103 => "BUILD_LIST",
    /// Build a set from `arg` items
    BuildSet = 104 => "BUILD_SET",
    /// Build a map from `arg` key/value pairs
    BuildMap = 105 => "BUILD_MAP",
    /// `TOS.name`
    LoadAttr = 106 => "LOAD_ATTR",
    /// Compare the two top items
    CompareOp = 107 => "COMPARE_OP",
    /// Import a module
    ImportName = 108 => "IMPORT_NAME",
    /// Load an attribute of the module at TOS
    ImportFrom = 109 => "IMPORT_FROM",

    // Jumps
    /// Relative jump
    JumpForward = 110 => "JUMP_FORWARD",
    /// Jump if TOS is false, else pop
    JumpIfFalseOrPop = 111 => "JUMP_IF_FALSE_OR_POP",
    /// Jump if TOS is true, else pop
    JumpIfTrueOrPop = 112 => "JUMP_IF_TRUE_OR_POP",
    /// Absolute jump
    JumpAbsolute = 113 => "JUMP_ABSOLUTE",
    /// Pop TOS and jump if it was false
    PopJumpIfFalse = 114 => "POP_JUMP_IF_FALSE",
    /// Pop TOS and jump if it was true
    PopJumpIfTrue = 115 => "POP_JUMP_IF_TRUE",
    /// Load from the globals, then builtins
    LoadGlobal = 116 => "LOAD_GLOBAL",
    /// Push a protected region
    SetupFinally = 122 => "SETUP_FINALLY",

    // Locals and cells
    /// Load a fast slot
    LoadFast = 124 => "LOAD_FAST",
    /// Store a fast slot
    StoreFast = 125 => "STORE_FAST",
    /// Clear a fast slot
    DeleteFast = 126 => "DELETE_FAST",
    /// Raise with `arg` operands
    RaiseVarargs = 130 => "RAISE_VARARGS",
    /// Call with `arg` positional arguments
    CallFunction = 131 => "CALL_FUNCTION",
    /// Build a function from code, qualname and the flagged extras
    MakeFunction = 132 => "MAKE_FUNCTION",
    /// Build a slice from `arg` items
    BuildSlice = 133 => "BUILD_SLICE",
    /// Push the cell itself
    LoadClosure = 135 => "LOAD_CLOSURE",
    /// Load the contents of a cell
    LoadDeref = 136 => "LOAD_DEREF",
    /// Store into a cell
    StoreDeref = 137 => "STORE_DEREF",
    /// Clear a cell
    DeleteDeref = 138 => "DELETE_DEREF",
    /// Call with keyword names in a tuple at TOS
    CallFunctionKw = 141 => "CALL_FUNCTION_KW",
    /// Call with an argument tuple and an optional keyword map
    CallFunctionEx = 142 => "CALL_FUNCTION_EX",
    /// Enter a context manager and push a protected region
    SetupWith = 143 => "SETUP_WITH",
    /// Prefix carrying the higher argument bytes
    ExtendedArg = 144 => "EXTENDED_ARG",

    // Comprehensions and unpacking
    /// Append TOS to the list `arg` items down
    ListAppend = 145 => "LIST_APPEND",
    /// Add TOS to the set `arg` items down
    SetAdd = 146 => "SET_ADD",
    /// Insert TOS1: TOS into the map `arg` items down
    MapAdd = 147 => "MAP_ADD",
    /// Concatenate `arg` iterables into a list
    BuildListUnpack = 149 => "BUILD_LIST_UNPACK",
    /// Merge `arg` maps
    BuildMapUnpack = 150 => "BUILD_MAP_UNPACK",
    /// Merge `arg` keyword maps, rejecting duplicates
    BuildMapUnpackWithCall = 151 => "BUILD_MAP_UNPACK_WITH_CALL",
    /// Concatenate `arg` iterables into a tuple
    BuildTupleUnpack = 152 => "BUILD_TUPLE_UNPACK",
    /// Concatenate `arg` iterables into a set
    BuildSetUnpack = 153 => "BUILD_SET_UNPACK",
    /// Concatenate `arg` iterables into a call argument tuple
    BuildTupleUnpackWithCall = 158 => "BUILD_TUPLE_UNPACK_WITH_CALL",
}

impl OpCode {
    /// True when the argument byte is meaningful.
    pub fn has_arg(self) -> bool {
        self as u8 >= HAVE_ARGUMENT
    }

    /// Jumps whose operand is a byte offset from the start of the code.
    pub fn is_absolute_jump(self) -> bool {
        matches!(
            self,
            OpCode::JumpAbsolute
                | OpCode::PopJumpIfFalse
                | OpCode::PopJumpIfTrue
                | OpCode::JumpIfFalseOrPop
                | OpCode::JumpIfTrueOrPop
        )
    }

    /// Jumps whose operand is measured from the end of the instruction.
    pub fn is_relative_jump(self) -> bool {
        matches!(
            self,
            OpCode::JumpForward | OpCode::ForIter | OpCode::SetupFinally | OpCode::SetupWith
        )
    }

    /// True for any instruction with a label operand.
    pub fn is_jump(self) -> bool {
        self.is_absolute_jump() || self.is_relative_jump()
    }

    /// True when control never falls through to the next instruction.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OpCode::ReturnValue
                | OpCode::RaiseVarargs
                | OpCode::JumpAbsolute
                | OpCode::JumpForward
        )
    }

    /// Stack effect of the instruction.
    ///
    /// `jump` selects the effect when the branch is taken; for
    /// protected regions this is the effect on handler entry.
    pub fn stack_effect(self, arg: u32, jump: bool) -> i32 {
        let n = arg as i32;
        match self {
            OpCode::Nop
            | OpCode::RotTwo
            | OpCode::RotThree
            | OpCode::UnaryPositive
            | OpCode::UnaryNegative
            | OpCode::UnaryNot
            | OpCode::UnaryInvert
            | OpCode::GetIter
            | OpCode::GetYieldFromIter
            | OpCode::YieldValue
            | OpCode::PopBlock
            | OpCode::PopExcept
            | OpCode::WithCleanupStart
            | OpCode::LoadAttr
            | OpCode::JumpForward
            | OpCode::JumpAbsolute
            | OpCode::ExtendedArg
            | OpCode::DeleteName
            | OpCode::DeleteGlobal
            | OpCode::DeleteFast
            | OpCode::DeleteDeref => 0,

            OpCode::PopTop
            | OpCode::BinaryMatrixMultiply
            | OpCode::BinaryPower
            | OpCode::BinaryMultiply
            | OpCode::BinaryModulo
            | OpCode::BinaryAdd
            | OpCode::BinarySubtract
            | OpCode::BinarySubscr
            | OpCode::BinaryFloorDivide
            | OpCode::BinaryTrueDivide
            | OpCode::BinaryLshift
            | OpCode::BinaryRshift
            | OpCode::BinaryAnd
            | OpCode::BinaryXor
            | OpCode::BinaryOr
            | OpCode::YieldFrom
            | OpCode::ReturnValue
            | OpCode::EndFinally
            | OpCode::WithCleanupFinish
            | OpCode::StoreName
            | OpCode::StoreGlobal
            | OpCode::StoreFast
            | OpCode::StoreDeref
            | OpCode::CompareOp
            | OpCode::ImportName
            | OpCode::ListAppend
            | OpCode::SetAdd
            | OpCode::PopJumpIfFalse
            | OpCode::PopJumpIfTrue => -1,

            OpCode::DupTop
            | OpCode::LoadBuildClass
            | OpCode::BeginFinally
            | OpCode::LoadConst
            | OpCode::LoadName
            | OpCode::LoadGlobal
            | OpCode::LoadFast
            | OpCode::LoadClosure
            | OpCode::LoadDeref
            | OpCode::ImportFrom => 1,

            OpCode::DupTopTwo => 2,
            OpCode::StoreAttr | OpCode::DeleteSubscr | OpCode::MapAdd => -2,
            OpCode::StoreSubscr => -3,

            OpCode::UnpackSequence => n - 1,
            OpCode::BuildTuple
            | OpCode::BuildList
            | OpCode::BuildSet
            | OpCode::BuildSlice
            | OpCode::BuildListUnpack
            | OpCode::BuildMapUnpack
            | OpCode::BuildMapUnpackWithCall
            | OpCode::BuildTupleUnpack
            | OpCode::BuildSetUnpack
            | OpCode::BuildTupleUnpackWithCall => 1 - n,
            OpCode::BuildMap => 1 - 2 * n,

            OpCode::RaiseVarargs => -n,
            OpCode::CallFunction => -n,
            OpCode::CallFunctionKw => -n - 1,
            OpCode::CallFunctionEx => -1 - (n & 0x01),
            OpCode::MakeFunction => -1 - (n & 0x0f).count_ones() as i32,

            OpCode::ForIter => {
                if jump {
                    -1
                } else {
                    1
                }
            }
            OpCode::JumpIfFalseOrPop | OpCode::JumpIfTrueOrPop => {
                if jump {
                    0
                } else {
                    -1
                }
            }
            OpCode::SetupFinally => {
                if jump {
                    1
                } else {
                    0
                }
            }
            // Falls through with the exit callable and the entered value;
            // the handler sees the exit callable and the exception.
            OpCode::SetupWith => 1,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Symbolic jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The statement a pending escape came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeKind {
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `return`; the value is already on the stack
    Return,
}

/// An escape not yet resolved by the loop or function that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct Escape {
    /// What kind of statement produced it
    pub kind: EscapeKind,
    /// Loops still to leave
    pub depth: u32,
    /// Clean-up collected from the regions crossed so far, innermost first
    pub unwind: Vec<Instr>,
    /// Source line of the statement
    pub line: u32,
    /// Source column of the statement
    pub column: u32,
}

/// A symbolic instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    /// The operation code
    pub opcode: OpCode,
    /// Operand; recomputed by the layout pass for jumps
    pub arg: u32,
    /// Source line, forward-filled during layout
    pub line: Option<u32>,
    /// Labels attached to this instruction
    pub labels: Vec<Label>,
    /// Jump target
    pub target: Option<Label>,
    /// Set on the placeholder of a pending escape
    pub escape: Option<Box<Escape>>,
    /// Encoded width in bytes; only ever grows
    pub size: u32,
}

impl Instr {
    /// Creates an instruction with an operand.
    pub fn new(opcode: OpCode, arg: u32) -> Self {
        Self {
            opcode,
            arg,
            line: None,
            labels: Vec::new(),
            target: None,
            escape: None,
            size: 0,
        }
    }

    /// Creates an instruction without an operand.
    pub fn op(opcode: OpCode) -> Self {
        Self::new(opcode, 0)
    }

    /// Creates a jump to `target`.
    pub fn jump(opcode: OpCode, target: Label) -> Self {
        let mut instr = Self::new(opcode, 0);
        instr.target = Some(target);
        instr
    }

    /// Creates the placeholder of a pending escape.
    pub fn escape(kind: EscapeKind, depth: u32, line: u32, column: u32) -> Self {
        let mut instr = Self::new(OpCode::Nop, 0);
        instr.line = Some(line);
        instr.escape = Some(Box::new(Escape {
            kind,
            depth,
            unwind: Vec::new(),
            line,
            column,
        }));
        instr
    }

    /// Builder: sets the source line.
    pub fn at(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Builder: attaches a label.
    pub fn labeled(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// True for a `RETURN_VALUE` or a pending return.
    pub fn is_return(&self) -> bool {
        match &self.escape {
            Some(escape) => escape.kind == EscapeKind::Return,
            None => self.opcode == OpCode::ReturnValue,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{}: ", label)?;
        }
        if let Some(escape) = &self.escape {
            return write!(f, "<{:?} {}>", escape.kind, escape.depth);
        }
        write!(f, "{}", self.opcode)?;
        match self.target {
            Some(target) => write!(f, " {}", target),
            None if self.opcode.has_arg() => write!(f, " {}", self.arg),
            None => Ok(()),
        }
    }
}

/// Width in bytes needed to encode `arg`.
pub fn encoded_width(arg: u32) -> u32 {
    match arg {
        0..=0xff => 2,
        0x100..=0xffff => 4,
        0x1_0000..=0xff_ffff => 6,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip_byte() {
        for op in [OpCode::PopTop, OpCode::LoadConst, OpCode::BuildTupleUnpackWithCall] {
            assert_eq!(OpCode::from_byte(op as u8), Some(op));
        }
        assert_eq!(OpCode::from_byte(0), None);
    }

    #[test]
    fn test_opcode_argument_classes() {
        assert!(!OpCode::BinaryAdd.has_arg());
        assert!(OpCode::LoadConst.has_arg());
        assert!(OpCode::ForIter.is_relative_jump());
        assert!(OpCode::PopJumpIfFalse.is_absolute_jump());
        assert!(!OpCode::LoadAttr.is_jump());
    }

    #[test]
    fn test_encoded_width() {
        assert_eq!(encoded_width(0), 2);
        assert_eq!(encoded_width(255), 2);
        assert_eq!(encoded_width(256), 4);
        assert_eq!(encoded_width(0x1_0000), 6);
        assert_eq!(encoded_width(0x100_0000), 8);
    }

    #[test]
    fn test_compare_index() {
        assert_eq!(compare_index("<"), Some(0));
        assert_eq!(compare_index("is not"), Some(9));
        assert_eq!(compare_index("exception match"), Some(10));
        assert_eq!(compare_index("<>"), None);
    }

    #[test]
    fn test_instr_display() {
        let instr = Instr::jump(OpCode::JumpAbsolute, Label(3)).labeled(Label(1));
        assert_eq!(instr.to_string(), "L1: JUMP_ABSOLUTE L3");
        assert_eq!(Instr::new(OpCode::LoadConst, 2).to_string(), "LOAD_CONST 2");
        assert_eq!(Instr::op(OpCode::PopTop).to_string(), "POP_TOP");
    }
}
