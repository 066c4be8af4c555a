//! The bytecode interpreter.
//!
//! Executes code objects directly from their encoded bytes. Calls
//! recurse on the Rust stack; generators keep their frame boxed between
//! resumptions.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::frame::{Block, Frame};
use super::operators;
use crate::builtins::{self, Output};
use crate::compiler::{CodeObject, OpCode};
use crate::error::{Error, Result};
use crate::loader::ModuleLoader;
use crate::resolver::label_of;
use crate::runtime::exception::{Raised, RunResult, name_error, type_error};
use crate::runtime::object::{Args, Class, Instance, Namespace};
use crate::runtime::value::{Dict, Value};

/// Default limit on nested calls.
pub const MAX_DEPTH: usize = 200;

/// How a frame stopped running.
pub(crate) enum Exit {
    /// `RETURN_VALUE`
    Return(Value),
    /// `YIELD_VALUE` or a delegated yield
    Yield(Value),
}

/// The reference interpreter.
///
/// One interpreter owns the builtins, the imported modules and the print
/// sink. It is single threaded.
pub struct Interpreter {
    pub(super) builtins: FxHashMap<String, Value>,
    pub(super) output: Output,
    pub(super) loader: Option<Arc<ModuleLoader>>,
    pub(super) modules: FxHashMap<PathBuf, Value>,
    constants: FxHashMap<usize, (Arc<CodeObject>, Rc<[Value]>)>,
    pub(super) depth: usize,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates an interpreter printing to stdout.
    pub fn new() -> Self {
        Self {
            builtins: builtins::register_builtins(),
            output: Output::Stdout,
            loader: None,
            modules: FxHashMap::default(),
            constants: FxHashMap::default(),
            depth: 0,
            max_depth: MAX_DEPTH,
        }
    }

    /// Redirects `print` and `eprint`.
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Enables `import` through a module loader.
    pub fn with_loader(mut self, loader: Arc<ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Changes the nested call limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The print sink.
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Looks up a builtin by name.
    pub fn builtin(&self, name: &str) -> Option<Value> {
        self.builtins.get(name).cloned()
    }

    /// Names of every builtin.
    pub fn builtin_names(&self) -> impl Iterator<Item = &str> {
        self.builtins.keys().map(String::as_str)
    }

    /// Runs a top-level code object against `globals`.
    ///
    /// Module and REPL bodies return their export map; other bodies
    /// return their value.
    pub fn run(&mut self, code: &Arc<CodeObject>, globals: &Namespace) -> Result<Value> {
        let span = tracing::debug_span!("run", unit = %code.name);
        let _guard = span.enter();

        globals
            .borrow_mut()
            .entry("__name__".to_string())
            .or_insert_with(|| Value::str("__main__"));
        let mut frame = self.frame(code, globals.clone());
        frame.module_scope = true;
        let result = self.execute(&mut frame);
        match result {
            Ok(Exit::Return(value)) => Ok(value),
            Ok(Exit::Yield(_)) => Err(Error::Internal("yield outside a generator".to_string())),
            Err(raised) => Err(self.uncaught(raised)),
        }
    }

    /// Calls a value with positional arguments.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        self.call_value(callee, Args::new(args), None)
            .map_err(|raised| self.uncaught(raised))
    }

    fn uncaught(&mut self, raised: Raised) -> Error {
        let message = match &raised {
            Raised::Value(value @ Value::Instance(instance)) if !instance.class.is_exception() => {
                match self.to_str(value) {
                    Ok(text) => format!("{}: {}", instance.class.name, text),
                    Err(_) => raised.describe(),
                }
            }
            _ => raised.describe(),
        };
        tracing::debug!(%message, "uncaught exception");
        Error::Runtime(message)
    }

    // ========================================================================
    // Frames and unwinding
    // ========================================================================

    /// Creates a frame, converting the constant pool once per code object.
    pub(crate) fn frame(&mut self, code: &Arc<CodeObject>, globals: Namespace) -> Frame {
        let key = Arc::as_ptr(code) as usize;
        let constants = match self.constants.get(&key) {
            Some((_, values)) => values.clone(),
            None => {
                let values: Rc<[Value]> = code.constants.iter().map(Value::from_constant).collect();
                self.constants.insert(key, (code.clone(), values.clone()));
                values
            }
        };
        Frame::new(code.clone(), constants, globals)
    }

    /// Runs an already-bound frame under the call depth limit.
    pub(crate) fn run_frame(&mut self, frame: &mut Frame) -> RunResult<Exit> {
        self.depth += 1;
        if self.depth > self.max_depth {
            self.depth -= 1;
            return Err(Raised::new(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        let result = self.execute(frame);
        self.depth -= 1;
        result
    }

    /// Runs a frame until it returns or yields, unwinding raised
    /// exceptions into the innermost protected region.
    pub(crate) fn execute(&mut self, frame: &mut Frame) -> RunResult<Exit> {
        loop {
            let raised = match self.dispatch(frame) {
                Ok(exit) => return Ok(exit),
                Err(raised) => raised,
            };
            let Some(block) = frame.blocks.pop() else {
                return Err(raised);
            };
            let exception = self.materialize(raised);
            frame.stack.truncate(block.level);
            frame.handled.truncate(block.handled);
            frame.handled.push(exception.clone());
            frame.push(exception);
            frame.pc = block.handler;
        }
    }

    /// Turns a pending builtin exception into an instance.
    pub(crate) fn materialize(&self, raised: Raised) -> Value {
        match raised {
            Raised::Value(value) => value,
            Raised::Pending { class, message } => self.new_exception(class, message),
        }
    }

    /// Instantiates a builtin exception class.
    pub(crate) fn new_exception(&self, class: &str, message: String) -> Value {
        let class = match self.builtins.get(class) {
            Some(Value::Class(class)) => class.clone(),
            _ => Rc::new(Class::new(class, Vec::new())),
        };
        let instance = Instance::new(class);
        instance
            .attrs
            .borrow_mut()
            .insert("args".to_string(), Value::tuple(vec![Value::str(message)]));
        Value::Instance(Rc::new(instance))
    }

    fn dispatch(&mut self, frame: &mut Frame) -> RunResult<Exit> {
        loop {
            let Some(decoded) = frame.code.decode(frame.pc) else {
                return Err(Raised::new(
                    "RuntimeError",
                    format!("no instruction at offset {} of {}", frame.pc, frame.code.name),
                ));
            };
            frame.pc = decoded.next;
            if let Some(exit) = self.step(frame, decoded.opcode, decoded.arg, decoded.offset)? {
                return Ok(exit);
            }
        }
    }

    // ========================================================================
    // Instruction dispatch
    // ========================================================================

    fn step(
        &mut self,
        frame: &mut Frame,
        op: OpCode,
        arg: u32,
        offset: usize,
    ) -> RunResult<Option<Exit>> {
        let index = arg as usize;
        match op {
            OpCode::Nop | OpCode::ExtendedArg => {}

            OpCode::PopTop => {
                frame.pop()?;
            }
            OpCode::RotTwo => {
                let top = frame.pop()?;
                let second = frame.pop()?;
                frame.push(top);
                frame.push(second);
            }
            OpCode::RotThree => {
                let top = frame.pop()?;
                let second = frame.pop()?;
                let third = frame.pop()?;
                frame.push(top);
                frame.push(third);
                frame.push(second);
            }
            OpCode::DupTop => {
                let top = frame.peek(1)?.clone();
                frame.push(top);
            }
            OpCode::DupTopTwo => {
                let top = frame.peek(1)?.clone();
                let second = frame.peek(2)?.clone();
                frame.push(second);
                frame.push(top);
            }

            OpCode::UnaryPositive
            | OpCode::UnaryNegative
            | OpCode::UnaryNot
            | OpCode::UnaryInvert => {
                let value = frame.pop()?;
                let result = operators::unary(op, &value)?;
                frame.push(result);
            }

            OpCode::BinaryMatrixMultiply
            | OpCode::BinaryPower
            | OpCode::BinaryMultiply
            | OpCode::BinaryModulo
            | OpCode::BinaryAdd
            | OpCode::BinarySubtract
            | OpCode::BinaryFloorDivide
            | OpCode::BinaryTrueDivide
            | OpCode::BinaryLshift
            | OpCode::BinaryRshift
            | OpCode::BinaryAnd
            | OpCode::BinaryXor
            | OpCode::BinaryOr => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                let result = self.binary(op, &left, &right)?;
                frame.push(result);
            }
            OpCode::BinarySubscr => {
                let index = frame.pop()?;
                let container = frame.pop()?;
                let result = self.subscript(&container, &index)?;
                frame.push(result);
            }
            OpCode::StoreSubscr => {
                let index = frame.pop()?;
                let container = frame.pop()?;
                let value = frame.pop()?;
                self.store_subscript(&container, &index, value)?;
            }
            OpCode::DeleteSubscr => {
                let index = frame.pop()?;
                let container = frame.pop()?;
                self.delete_subscript(&container, &index)?;
            }

            OpCode::BeginFinally => frame.push(Value::None),
            OpCode::PopBlock => {
                frame.blocks.pop();
            }
            OpCode::PopExcept => {
                frame.handled.pop();
            }
            OpCode::EndFinally => {
                let marker = frame.pop()?;
                if !marker.is_none() {
                    return Err(Raised::Value(marker));
                }
            }
            OpCode::SetupFinally => push_block(frame, index),
            OpCode::SetupWith => self.setup_with(frame, index)?,
            OpCode::WithCleanupStart => self.with_cleanup_start(frame)?,
            OpCode::WithCleanupFinish => {
                let result = frame.pop()?;
                let marker = frame.pop()?;
                if !marker.is_none() && result.truthy() {
                    frame.handled.pop();
                    frame.push(Value::None);
                } else {
                    frame.push(marker);
                }
            }

            OpCode::GetIter => {
                let value = frame.pop()?;
                let iterator = self.iterate(&value)?;
                frame.push(iterator);
            }
            OpCode::GetYieldFromIter => {
                let value = frame.pop()?;
                let iterator = match value {
                    Value::Generator(_) => value,
                    other => self.iterate(&other)?,
                };
                frame.push(iterator);
            }
            OpCode::ForIter => {
                let iterator = frame.peek(1)?.clone();
                match self.next(&iterator)? {
                    Some(value) => frame.push(value),
                    None => {
                        frame.pop()?;
                        frame.pc += index;
                    }
                }
            }
            OpCode::YieldValue => return Ok(Some(Exit::Yield(frame.pop()?))),
            OpCode::YieldFrom => return self.yield_from(frame, offset),
            OpCode::ReturnValue => return Ok(Some(Exit::Return(frame.pop()?))),

            OpCode::LoadConst => {
                let value = frame
                    .constants
                    .get(index)
                    .cloned()
                    .ok_or_else(|| bad_operand("constant", index))?;
                frame.push(value);
            }
            OpCode::LoadName => {
                let name = name_at(frame, index)?;
                let value = self.load_name(frame, label_of(&name))?;
                frame.push(value);
            }
            OpCode::StoreName => {
                let name = name_at(frame, index)?;
                let value = frame.pop()?;
                let namespace = frame.locals.as_ref().unwrap_or(&frame.globals);
                namespace
                    .borrow_mut()
                    .insert(label_of(&name).to_string(), value);
            }
            OpCode::DeleteName => {
                let name = name_at(frame, index)?;
                let namespace = frame.locals.as_ref().unwrap_or(&frame.globals);
                if namespace.borrow_mut().remove(label_of(&name)).is_none() {
                    return Err(name_error(label_of(&name)));
                }
            }
            OpCode::LoadGlobal => {
                let name = name_at(frame, index)?;
                let value = self.load_global(frame, label_of(&name))?;
                frame.push(value);
            }
            OpCode::StoreGlobal => {
                let name = name_at(frame, index)?;
                let value = frame.pop()?;
                frame
                    .globals
                    .borrow_mut()
                    .insert(label_of(&name).to_string(), value);
            }
            OpCode::DeleteGlobal => {
                let name = name_at(frame, index)?;
                if frame.globals.borrow_mut().remove(label_of(&name)).is_none() {
                    return Err(name_error(label_of(&name)));
                }
            }
            OpCode::LoadFast => {
                let value = self.load_fast(frame, index)?;
                frame.push(value);
            }
            OpCode::StoreFast => {
                let value = frame.pop()?;
                store_fast(frame, index, value)?;
            }
            OpCode::DeleteFast => delete_fast(frame, index)?,
            OpCode::LoadClosure => {
                let cell = frame
                    .cells
                    .get(index)
                    .cloned()
                    .ok_or_else(|| bad_operand("cell", index))?;
                frame.push(Value::Cell(cell));
            }
            OpCode::LoadDeref => {
                let value = self.load_deref(frame, index)?;
                frame.push(value);
            }
            OpCode::StoreDeref => {
                let value = frame.pop()?;
                store_deref(frame, index, value)?;
            }
            OpCode::DeleteDeref => {
                let cell = frame
                    .cells
                    .get(index)
                    .ok_or_else(|| bad_operand("cell", index))?;
                cell.clear();
            }

            OpCode::LoadAttr => {
                let name = name_at(frame, index)?;
                let object = frame.pop()?;
                let value = self.get_attr(&object, &name)?;
                frame.push(value);
            }
            OpCode::StoreAttr => {
                let name = name_at(frame, index)?;
                let object = frame.pop()?;
                let value = frame.pop()?;
                self.set_attr(&object, &name, value)?;
            }
            OpCode::CompareOp => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                let result = self.compare(index, &left, &right)?;
                frame.push(result);
            }

            OpCode::UnpackSequence => {
                let value = frame.pop()?;
                let items = self.collect(&value)?;
                if items.len() != index {
                    let message = if items.len() < index {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            index,
                            items.len()
                        )
                    } else {
                        format!("too many values to unpack (expected {})", index)
                    };
                    return Err(Raised::new("ValueError", message));
                }
                frame.stack.extend(items.into_iter().rev());
            }
            OpCode::BuildTuple => {
                let items = frame.pop_n(index)?;
                frame.push(Value::tuple(items));
            }
            OpCode::BuildList => {
                let items = frame.pop_n(index)?;
                frame.push(Value::list(items));
            }
            OpCode::BuildSet => {
                let items = frame.pop_n(index)?;
                let set = set_of(items)?;
                frame.push(set);
            }
            OpCode::BuildMap => {
                let items = frame.pop_n(index * 2)?;
                let mut dict = Dict::new();
                let mut pairs = items.into_iter();
                while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
                    insert_key(&mut dict, key, value)?;
                }
                frame.push(Value::map(dict));
            }
            OpCode::BuildSlice => {
                let mut items = frame.pop_n(index)?;
                items.resize(3, Value::None);
                let [start, stop, step]: [Value; 3] = items
                    .try_into()
                    .map_err(|_| bad_operand("slice", index))?;
                frame.push(Value::Slice(Rc::new([start, stop, step])));
            }
            OpCode::ListAppend => {
                let value = frame.pop()?;
                match frame.peek(index)? {
                    Value::List(list) => list.borrow_mut().push(value),
                    other => return Err(bad_container("list", other)),
                }
            }
            OpCode::SetAdd => {
                let value = frame.pop()?;
                match frame.peek(index)? {
                    Value::Set(set) => insert_key(&mut set.borrow_mut(), value, Value::None)?,
                    other => return Err(bad_container("set", other)),
                }
            }
            OpCode::MapAdd => {
                let value = frame.pop()?;
                let key = frame.pop()?;
                match frame.peek(index)? {
                    Value::Map(map) => insert_key(&mut map.borrow_mut(), key, value)?,
                    other => return Err(bad_container("dict", other)),
                }
            }
            OpCode::BuildListUnpack
            | OpCode::BuildTupleUnpack
            | OpCode::BuildTupleUnpackWithCall
            | OpCode::BuildSetUnpack => {
                let parts = frame.pop_n(index)?;
                let mut items = Vec::new();
                for part in &parts {
                    items.extend(self.collect(part)?);
                }
                let value = match op {
                    OpCode::BuildListUnpack => Value::list(items),
                    OpCode::BuildSetUnpack => set_of(items)?,
                    _ => Value::tuple(items),
                };
                frame.push(value);
            }
            OpCode::BuildMapUnpack | OpCode::BuildMapUnpackWithCall => {
                let parts = frame.pop_n(index)?;
                let merged = merge_maps(&parts, op == OpCode::BuildMapUnpackWithCall)?;
                frame.push(merged);
            }

            OpCode::JumpForward => frame.pc += index,
            OpCode::JumpAbsolute => frame.pc = index,
            OpCode::PopJumpIfFalse => {
                if !frame.pop()?.truthy() {
                    frame.pc = index;
                }
            }
            OpCode::PopJumpIfTrue => {
                if frame.pop()?.truthy() {
                    frame.pc = index;
                }
            }
            OpCode::JumpIfFalseOrPop => {
                if frame.peek(1)?.truthy() {
                    frame.pop()?;
                } else {
                    frame.pc = index;
                }
            }
            OpCode::JumpIfTrueOrPop => {
                if frame.peek(1)?.truthy() {
                    frame.pc = index;
                } else {
                    frame.pop()?;
                }
            }

            OpCode::CallFunction => {
                let args = frame.pop_n(index)?;
                let callee = frame.pop()?;
                let result = self.call_value(&callee, Args::new(args), Some(&*frame))?;
                frame.push(result);
            }
            OpCode::CallFunctionKw => {
                let names = frame.pop()?;
                let mut positional = frame.pop_n(index)?;
                let Value::Tuple(names) = names else {
                    return Err(bad_operand("keyword names", index));
                };
                let values = positional.split_off(positional.len().saturating_sub(names.len()));
                let keywords = names
                    .iter()
                    .map(|name| name.to_string())
                    .zip(values)
                    .collect();
                let callee = frame.pop()?;
                let args = Args {
                    positional,
                    keywords,
                };
                let result = self.call_value(&callee, args, Some(&*frame))?;
                frame.push(result);
            }
            OpCode::CallFunctionEx => {
                let keywords = if index & 0x01 != 0 {
                    keywords_of(&frame.pop()?)?
                } else {
                    Vec::new()
                };
                let positional = frame.pop()?;
                let positional = self.collect(&positional)?;
                let callee = frame.pop()?;
                let args = Args {
                    positional,
                    keywords,
                };
                let result = self.call_value(&callee, args, Some(&*frame))?;
                frame.push(result);
            }
            OpCode::MakeFunction => {
                let function = self.make_function(frame, arg)?;
                frame.push(function);
            }
            OpCode::LoadBuildClass => {
                let builder = self.load_global(frame, "__build_class__")?;
                frame.push(builder);
            }
            OpCode::RaiseVarargs => return Err(self.raise(frame, index)?),

            OpCode::ImportName => {
                let name = name_at(frame, index)?;
                let fromlist = frame.pop()?;
                let level = frame.pop()?;
                let level = level.as_int().unwrap_or(0).max(0) as u32;
                let module = self.import(frame, &name, level, &fromlist)?;
                frame.push(module);
            }
            OpCode::ImportFrom => {
                let name = name_at(frame, index)?;
                let module = frame.peek(1)?.clone();
                let value = self.import_from(&module, &name)?;
                frame.push(value);
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Variables
    // ========================================================================

    fn load_global(&self, frame: &Frame, label: &str) -> RunResult<Value> {
        if let Some(value) = frame.globals.borrow().get(label) {
            return Ok(value.clone());
        }
        self.builtins
            .get(label)
            .cloned()
            .ok_or_else(|| name_error(label))
    }

    fn load_name(&self, frame: &Frame, label: &str) -> RunResult<Value> {
        if let Some(locals) = &frame.locals {
            if let Some(value) = locals.borrow().get(label) {
                return Ok(value.clone());
            }
        }
        self.load_global(frame, label)
    }

    /// Module bodies fall back to the globals so a REPL line can read
    /// names bound by earlier lines.
    fn load_fast(&self, frame: &Frame, index: usize) -> RunResult<Value> {
        if let Some(Some(value)) = frame.fast.get(index) {
            return Ok(value.clone());
        }
        let name = frame
            .code
            .varnames
            .get(index)
            .ok_or_else(|| bad_operand("local", index))?;
        if frame.module_scope {
            return self.load_global(frame, label_of(name));
        }
        Err(Raised::new(
            "NameError",
            format!(
                "local variable '{}' referenced before assignment",
                label_of(name)
            ),
        ))
    }

    fn load_deref(&self, frame: &Frame, index: usize) -> RunResult<Value> {
        let cell = frame
            .cells
            .get(index)
            .ok_or_else(|| bad_operand("cell", index))?;
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let name = frame.code.deref_name(index).unwrap_or("?");
        if frame.module_scope {
            return self.load_global(frame, label_of(name));
        }
        Err(Raised::new(
            "NameError",
            format!(
                "free variable '{}' referenced before assignment in enclosing scope",
                label_of(name)
            ),
        ))
    }

    // ========================================================================
    // Protected regions
    // ========================================================================

    fn setup_with(&mut self, frame: &mut Frame, delta: usize) -> RunResult<()> {
        let manager = frame.pop()?;
        let enter = self.get_attr(&manager, "__enter__")?;
        let exit = self.get_attr(&manager, "__exit__")?;
        frame.push(exit);
        push_block(frame, delta);
        let entered = self.call_value(&enter, Args::default(), Some(&*frame))?;
        frame.push(entered);
        Ok(())
    }

    fn with_cleanup_start(&mut self, frame: &mut Frame) -> RunResult<()> {
        let marker = frame.pop()?;
        let exit = frame.pop()?;
        let args = match &marker {
            Value::None => vec![Value::None, Value::None, Value::None],
            Value::Instance(instance) => vec![
                Value::Class(instance.class.clone()),
                marker.clone(),
                Value::None,
            ],
            other => vec![Value::str(other.type_name()), marker.clone(), Value::None],
        };
        let result = self.call_value(&exit, Args::new(args), Some(&*frame))?;
        frame.push(marker);
        frame.push(result);
        Ok(())
    }

    fn raise(&mut self, frame: &mut Frame, count: usize) -> RunResult<Raised> {
        let exception = match count {
            0 => {
                return Ok(match frame.handled.last() {
                    Some(active) => Raised::Value(active.clone()),
                    None => Raised::new("RuntimeError", "No active exception to reraise"),
                });
            }
            1 => frame.pop()?,
            _ => {
                frame.pop_n(count - 1)?;
                frame.pop()?
            }
        };
        match exception {
            Value::Class(class) if class.is_exception() => {
                let instance = self.call_value(&Value::Class(class), Args::default(), Some(&*frame))?;
                Ok(Raised::Value(instance))
            }
            Value::Instance(instance) if instance.class.is_exception() => {
                Ok(Raised::Value(Value::Instance(instance)))
            }
            other => Ok(type_error(format!(
                "exceptions must derive from Exception, not {}",
                other.type_name()
            ))),
        }
    }

    fn yield_from(&mut self, frame: &mut Frame, offset: usize) -> RunResult<Option<Exit>> {
        let sent = frame.pop()?;
        let iterator = frame.peek(1)?.clone();
        match self.send(&iterator, sent)? {
            super::calls::Resumed::Yield(value) => {
                frame.pc = offset;
                Ok(Some(Exit::Yield(value)))
            }
            super::calls::Resumed::Return(value) => {
                frame.pop()?;
                frame.push(value);
                Ok(None)
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn bad_operand(what: &str, index: usize) -> Raised {
    Raised::new(
        "RuntimeError",
        format!("invalid {} operand {}", what, index),
    )
}

fn bad_container(expected: &str, found: &Value) -> Raised {
    Raised::new(
        "RuntimeError",
        format!("expected {} under the iterator, found {}", expected, found.type_name()),
    )
}

fn name_at(frame: &Frame, index: usize) -> RunResult<String> {
    frame
        .code
        .names
        .get(index)
        .cloned()
        .ok_or_else(|| bad_operand("name", index))
}

fn push_block(frame: &mut Frame, delta: usize) {
    let block = Block {
        handler: frame.pc + delta,
        level: frame.stack.len(),
        handled: frame.handled.len(),
    };
    frame.blocks.push(block);
}

fn store_fast(frame: &mut Frame, index: usize, value: Value) -> RunResult<()> {
    if frame.module_scope {
        if let Some(name) = frame.code.varnames.get(index) {
            frame
                .globals
                .borrow_mut()
                .insert(label_of(name).to_string(), value.clone());
        }
    }
    let slot = frame
        .fast
        .get_mut(index)
        .ok_or_else(|| bad_operand("local", index))?;
    *slot = Some(value);
    Ok(())
}

fn delete_fast(frame: &mut Frame, index: usize) -> RunResult<()> {
    let name = frame
        .code
        .varnames
        .get(index)
        .cloned()
        .ok_or_else(|| bad_operand("local", index))?;
    let slot = frame
        .fast
        .get_mut(index)
        .ok_or_else(|| bad_operand("local", index))?;
    if slot.take().is_none() {
        return Err(name_error(label_of(&name)));
    }
    if frame.module_scope {
        frame.globals.borrow_mut().remove(label_of(&name));
    }
    Ok(())
}

fn store_deref(frame: &mut Frame, index: usize, value: Value) -> RunResult<()> {
    if frame.module_scope && index < frame.code.cellvars.len() {
        if let Some(name) = frame.code.deref_name(index) {
            frame
                .globals
                .borrow_mut()
                .insert(label_of(name).to_string(), value.clone());
        }
    }
    let cell = frame
        .cells
        .get(index)
        .ok_or_else(|| bad_operand("cell", index))?;
    cell.set(value);
    Ok(())
}

fn insert_key(dict: &mut Dict, key: Value, value: Value) -> RunResult<()> {
    let type_name = key.type_name();
    if dict.insert(key, value) {
        Ok(())
    } else {
        Err(type_error(format!("unhashable type: '{}'", type_name)))
    }
}

pub(crate) fn set_of(items: Vec<Value>) -> RunResult<Value> {
    let mut dict = Dict::new();
    for item in items {
        insert_key(&mut dict, item, Value::None)?;
    }
    Ok(Value::Set(Rc::new(std::cell::RefCell::new(dict))))
}

fn merge_maps(parts: &[Value], reject_duplicates: bool) -> RunResult<Value> {
    let mut merged = Dict::new();
    for part in parts {
        let Value::Map(map) = part else {
            return Err(type_error(format!(
                "'{}' object is not a mapping",
                part.type_name()
            )));
        };
        for (key, value) in map.borrow().iter() {
            if reject_duplicates && merged.contains(key) {
                return Err(type_error(format!(
                    "got multiple values for keyword argument '{}'",
                    key
                )));
            }
            insert_key(&mut merged, key.clone(), value.clone())?;
        }
    }
    Ok(Value::map(merged))
}

fn keywords_of(value: &Value) -> RunResult<Vec<(String, Value)>> {
    let Value::Map(map) = value else {
        return Err(type_error(format!(
            "argument after ** must be a mapping, not {}",
            value.type_name()
        )));
    };
    map.borrow()
        .iter()
        .map(|(key, value)| match key {
            Value::Str(key) => Ok((key.to_string(), value.clone())),
            _ => Err(type_error("keywords must be strings")),
        })
        .collect()
}
