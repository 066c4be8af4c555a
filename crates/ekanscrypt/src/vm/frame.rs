//! Activation records.

use std::rc::Rc;
use std::sync::Arc;

use crate::compiler::CodeObject;
use crate::resolver::label_of;
use crate::runtime::exception::{Raised, RunResult};
use crate::runtime::object::{Cell, Namespace};
use crate::runtime::value::Value;

/// A protected region pushed by `SETUP_FINALLY` or `SETUP_WITH`.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    /// Handler offset
    pub handler: usize,
    /// Value stack depth to restore
    pub level: usize,
    /// Depth of the handled-exception stack to restore
    pub handled: usize,
}

/// The state of one executing code object.
pub struct Frame {
    /// Code being executed
    pub code: Arc<CodeObject>,
    /// Constant pool converted to values
    pub constants: Rc<[Value]>,
    /// Fast slots
    pub fast: Vec<Option<Value>>,
    /// Owned cells followed by captured cells
    pub cells: Vec<Rc<Cell>>,
    /// Name-space of class bodies
    pub locals: Option<Namespace>,
    /// Module globals
    pub globals: Namespace,
    /// Value stack
    pub stack: Vec<Value>,
    /// Protected regions, innermost last
    pub blocks: Vec<Block>,
    /// Exceptions being handled, innermost last
    pub handled: Vec<Value>,
    /// Offset of the next instruction
    pub pc: usize,
    /// Module bodies publish their variables into the globals
    pub module_scope: bool,
}

impl Frame {
    /// Creates a frame with unbound fast slots and fresh cells.
    pub fn new(code: Arc<CodeObject>, constants: Rc<[Value]>, globals: Namespace) -> Self {
        let fast = vec![None; code.varnames.len()];
        let cells = code.cellvars.iter().map(|_| Rc::new(Cell::new())).collect();
        Self {
            stack: Vec::with_capacity(code.stacksize as usize),
            code,
            constants,
            fast,
            cells,
            locals: None,
            globals,
            blocks: Vec::new(),
            handled: Vec::new(),
            pc: 0,
            module_scope: false,
        }
    }

    /// Pushes a value.
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops a value.
    pub fn pop(&mut self) -> RunResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Raised::new("RuntimeError", "value stack underflow"))
    }

    /// Pops `n` values, in push order.
    pub fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        if n > self.stack.len() {
            return Err(Raised::new("RuntimeError", "value stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// The value `n` slots down; `peek(1)` is the top.
    pub fn peek(&self, n: usize) -> RunResult<&Value> {
        self.stack
            .len()
            .checked_sub(n)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| Raised::new("RuntimeError", "value stack underflow"))
    }

    /// Source line of the instruction being executed.
    pub fn line(&self) -> u32 {
        self.code.line_at(self.pc.saturating_sub(2))
    }

    /// Looks a label up the way a running body sees it: fast slots,
    /// cells, the class name-space, then the globals.
    pub fn lookup(&self, label: &str) -> Option<Value> {
        let fast = self
            .code
            .varnames
            .iter()
            .zip(&self.fast)
            .rev()
            .find_map(|(name, value)| match value {
                Some(value) if label_of(name) == label => Some(value.clone()),
                _ => None,
            });
        if fast.is_some() {
            return fast;
        }
        let cell = self
            .cells
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, cell)| match self.code.deref_name(i) {
                Some(name) if label_of(name) == label => cell.get(),
                _ => None,
            });
        if cell.is_some() {
            return cell;
        }
        if let Some(value) = self
            .locals
            .as_ref()
            .and_then(|locals| locals.borrow().get(label).cloned())
        {
            return Some(value);
        }
        self.globals.borrow().get(label).cloned()
    }
}
