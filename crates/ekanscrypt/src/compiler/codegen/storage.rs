//! Pools and storage selection for one code object.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::compiler::bytecode::{Instr, OpCode};
use crate::compiler::code::Constant;
use crate::resolver::Access;

/// Where a variable lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Fast slot of the frame
    Fast(u32),
    /// Cell: cellvars first, then freevars
    Deref(u32),
    /// Global environment, by name index
    Global(u32),
    /// Frame name-space, by name index
    Name(u32),
}

impl Storage {
    /// Instruction reading the variable.
    pub fn load(self) -> Instr {
        match self {
            Storage::Fast(i) => Instr::new(OpCode::LoadFast, i),
            Storage::Deref(i) => Instr::new(OpCode::LoadDeref, i),
            Storage::Global(i) => Instr::new(OpCode::LoadGlobal, i),
            Storage::Name(i) => Instr::new(OpCode::LoadName, i),
        }
    }

    /// Instruction writing TOS into the variable.
    pub fn store(self) -> Instr {
        match self {
            Storage::Fast(i) => Instr::new(OpCode::StoreFast, i),
            Storage::Deref(i) => Instr::new(OpCode::StoreDeref, i),
            Storage::Global(i) => Instr::new(OpCode::StoreGlobal, i),
            Storage::Name(i) => Instr::new(OpCode::StoreName, i),
        }
    }

    /// Instruction unbinding the variable.
    pub fn delete(self) -> Instr {
        match self {
            Storage::Fast(i) => Instr::new(OpCode::DeleteFast, i),
            Storage::Deref(i) => Instr::new(OpCode::DeleteDeref, i),
            Storage::Global(i) => Instr::new(OpCode::DeleteGlobal, i),
            Storage::Name(i) => Instr::new(OpCode::DeleteName, i),
        }
    }
}

/// The pools of a code object under construction.
#[derive(Debug, Clone)]
pub struct Slots {
    /// Constant pool; slot 0 is none
    pub constants: Vec<Constant>,
    /// Attribute, global and name-space names
    pub names: Vec<String>,
    /// Fast slots
    pub varnames: Vec<String>,
    /// Owned cells
    pub cellvars: Vec<String>,
    /// Captured cells
    pub freevars: Vec<String>,
    /// Class bodies keep every variable in their name-space
    pub no_fast: bool,
    globals: Arc<FxHashSet<String>>,
}

impl Slots {
    /// Creates empty pools.
    pub fn new(globals: Arc<FxHashSet<String>>, no_fast: bool) -> Self {
        Self {
            constants: vec![Constant::None],
            names: Vec::new(),
            varnames: Vec::new(),
            cellvars: Vec::new(),
            freevars: Vec::new(),
            no_fast,
            globals,
        }
    }

    /// Interns a constant. Equal values of the same type share a slot.
    pub fn constant(&mut self, value: Constant) -> u32 {
        if !matches!(value, Constant::Code(_)) {
            if let Some(i) = self.constants.iter().position(|c| c.same(&value)) {
                return i as u32;
            }
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    /// Interns a name.
    pub fn name(&mut self, name: &str) -> u32 {
        intern(&mut self.names, name)
    }

    /// Deref index of a cell or free variable.
    pub fn deref(&self, name: &str) -> Option<u32> {
        if let Some(i) = self.cellvars.iter().position(|c| c == name) {
            return Some(i as u32);
        }
        self.freevars
            .iter()
            .position(|f| f == name)
            .map(|i| (self.cellvars.len() + i) as u32)
    }

    /// Picks the storage of `name`, allocating a slot on first use.
    pub fn resolve(&mut self, name: &str, access: Access) -> Storage {
        if !(self.no_fast && access == Access::Store) {
            if let Some(i) = self.deref(name) {
                return Storage::Deref(i);
            }
        }
        if self.globals.contains(name) {
            return Storage::Global(self.name(name));
        }
        if !self.no_fast {
            if let Some(i) = self.varnames.iter().position(|v| v == name) {
                return Storage::Fast(i as u32);
            }
        }
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return Storage::Name(i as u32);
        }
        if access == Access::Load || self.no_fast {
            Storage::Name(self.name(name))
        } else {
            Storage::Fast(intern(&mut self.varnames, name))
        }
    }
}

fn intern(pool: &mut Vec<String>, name: &str) -> u32 {
    match pool.iter().position(|n| n == name) {
        Some(i) => i as u32,
        None => {
            pool.push(name.to_string());
            (pool.len() - 1) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(no_fast: bool) -> Slots {
        let globals: FxHashSet<String> = ["print".to_string()].into_iter().collect();
        Slots::new(Arc::new(globals), no_fast)
    }

    #[test]
    fn test_constants_deduplicate() {
        let mut s = slots(false);
        assert_eq!(s.constant(Constant::None), 0);
        let one = s.constant(Constant::Int(1));
        assert_eq!(s.constant(Constant::Int(1)), one);
        assert_ne!(s.constant(Constant::Float(1.0)), one);
        assert_ne!(s.constant(Constant::Bool(true)), one);
    }

    #[test]
    fn test_store_then_load_is_fast() {
        let mut s = slots(false);
        assert_eq!(s.resolve("x", Access::Store), Storage::Fast(0));
        assert_eq!(s.resolve("x", Access::Load), Storage::Fast(0));
        assert_eq!(s.resolve("y", Access::Load), Storage::Name(0));
        assert_eq!(s.resolve("y", Access::Store), Storage::Name(0));
    }

    #[test]
    fn test_globals_and_cells() {
        let mut s = slots(false);
        s.cellvars.push("c".into());
        s.freevars.push("f".into());
        assert_eq!(s.resolve("print", Access::Load), Storage::Global(0));
        assert_eq!(s.resolve("c", Access::Store), Storage::Deref(0));
        assert_eq!(s.resolve("f", Access::Load), Storage::Deref(1));
    }

    #[test]
    fn test_class_body_uses_names() {
        let mut s = slots(true);
        s.freevars.push("a".into());
        assert_eq!(s.resolve("x", Access::Store), Storage::Name(0));
        assert_eq!(s.resolve("a", Access::Load), Storage::Deref(0));
        assert_eq!(s.resolve("a", Access::Store), Storage::Name(1));
    }
}
