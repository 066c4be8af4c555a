//! Calls, argument binding, class construction and generators.

use std::cell::RefCell;
use std::rc::Rc;

use super::frame::Frame;
use super::interpreter::{Exit, Interpreter};
use crate::builtins::methods;
use crate::compiler::CodeFlags;
use crate::resolver::label_of;
use crate::runtime::exception::{Raised, RunResult, type_error};
use crate::runtime::object::{
    Args, BoundMethod, Class, Function, Generator, Instance, IterState, namespace,
};
use crate::runtime::value::{Dict, Value};

/// `MAKE_FUNCTION` flag: a tuple of defaults is on the stack.
const MAKE_DEFAULTS: u32 = 0x01;
/// `MAKE_FUNCTION` flag: a tuple of cells is on the stack.
const MAKE_CLOSURE: u32 = 0x08;

/// Outcome of resuming a generator or delegating to an iterator.
pub(crate) enum Resumed {
    /// The generator yielded
    Yield(Value),
    /// The generator finished with this value
    Return(Value),
}

impl Interpreter {
    /// Calls any callable value.
    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        args: Args,
        caller: Option<&Frame>,
    ) -> RunResult<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, args),
            Value::Builtin(builtin) => (builtin.func)(self, caller, args),
            Value::BoundMethod(method) => match &**method {
                BoundMethod::Function { receiver, function } => {
                    let mut args = args;
                    args.positional.insert(0, receiver.clone());
                    self.call_value(function, args, caller)
                }
                BoundMethod::Native { receiver, name } => {
                    methods::call_method(self, receiver, name, args)
                }
            },
            Value::Class(class) => self.instantiate(class, args, caller),
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Binds arguments and runs the body; generator functions return a
    /// suspended generator instead.
    pub(crate) fn call_function(&mut self, function: &Function, args: Args) -> RunResult<Value> {
        let mut frame = self.frame(&function.code, function.globals.clone());
        bind_arguments(function, &mut frame, args)?;

        if function.code.flags.contains(CodeFlags::GENERATOR) {
            let generator = Generator::new(function.name.clone(), frame);
            return Ok(Value::Generator(Rc::new(RefCell::new(generator))));
        }
        match self.run_frame(&mut frame)? {
            Exit::Return(value) => Ok(value),
            Exit::Yield(_) => Err(Raised::new("RuntimeError", "yield outside a generator")),
        }
    }

    fn instantiate(&mut self, class: &Rc<Class>, args: Args, caller: Option<&Frame>) -> RunResult<Value> {
        let instance = Instance::new(class.clone());
        if class.is_exception() {
            instance
                .attrs
                .borrow_mut()
                .insert("args".to_string(), Value::tuple(args.positional.clone()));
        }
        let value = Value::Instance(Rc::new(instance));
        match class.lookup("__init__") {
            Some(init) => {
                let mut args = args;
                args.positional.insert(0, value.clone());
                self.call_value(&init, args, caller)?;
            }
            None if class.is_exception() => {}
            None if !args.positional.is_empty() || !args.keywords.is_empty() => {
                return Err(type_error(format!("{}() takes no arguments", class.name)));
            }
            None => {}
        }
        Ok(value)
    }

    /// `MAKE_FUNCTION`: pops the qualified name, the code, then the
    /// flagged closure and defaults tuples.
    pub(crate) fn make_function(&mut self, frame: &mut Frame, flags: u32) -> RunResult<Value> {
        let name = frame.pop()?;
        let Value::Code(code) = frame.pop()? else {
            return Err(Raised::new("RuntimeError", "MAKE_FUNCTION expects a code object"));
        };
        let mut closure = Vec::new();
        if flags & MAKE_CLOSURE != 0 {
            let Value::Tuple(cells) = frame.pop()? else {
                return Err(Raised::new("RuntimeError", "MAKE_FUNCTION expects a cell tuple"));
            };
            for cell in cells.iter() {
                match cell {
                    Value::Cell(cell) => closure.push(cell.clone()),
                    other => {
                        return Err(Raised::new(
                            "RuntimeError",
                            format!("expected a cell, found {}", other.type_name()),
                        ));
                    }
                }
            }
        }
        let defaults = if flags & MAKE_DEFAULTS != 0 {
            match frame.pop()? {
                Value::Tuple(defaults) => defaults.to_vec(),
                _ => return Err(Raised::new("RuntimeError", "MAKE_FUNCTION expects a defaults tuple")),
            }
        } else {
            Vec::new()
        };
        Ok(Value::Function(Rc::new(Function {
            name: name.to_string(),
            code,
            globals: frame.globals.clone(),
            defaults,
            closure,
        })))
    }

    /// `__build_class__(body, name, *bases)`: runs the body with a fresh
    /// name-space, creates the class and fills the `__class__` cell the
    /// body returns.
    pub(crate) fn build_class(&mut self, args: Args) -> RunResult<Value> {
        let mut positional = args.positional.into_iter();
        let (Some(Value::Function(body)), Some(name)) = (positional.next(), positional.next())
        else {
            return Err(type_error("__build_class__: expected a function and a name"));
        };
        let mut bases = Vec::new();
        for base in positional {
            match base {
                Value::Class(class) => bases.push(class),
                other => {
                    return Err(type_error(format!(
                        "cannot inherit from '{}'",
                        other.type_name()
                    )));
                }
            }
        }

        let names = namespace();
        let mut frame = self.frame(&body.code, body.globals.clone());
        frame.locals = Some(names.clone());
        frame.cells.extend(body.closure.iter().cloned());
        let cell = match self.run_frame(&mut frame)? {
            Exit::Return(value) => value,
            Exit::Yield(_) => return Err(Raised::new("RuntimeError", "yield in a class body")),
        };

        let class = Rc::new(Class::new(name.to_string(), bases));
        {
            let mut attrs = class.attrs.borrow_mut();
            for (key, value) in names.borrow().iter() {
                if key != "__classcell__" {
                    attrs.insert(key.clone(), value.clone());
                }
            }
        }
        if let Value::Cell(cell) = cell {
            cell.set(Value::Class(class.clone()));
        }
        tracing::trace!(class = %class.name, "built class");
        Ok(Value::Class(class))
    }

    // ========================================================================
    // Iteration and generators
    // ========================================================================

    /// `iter(value)`.
    pub(crate) fn iterate(&mut self, value: &Value) -> RunResult<Value> {
        let state = match value {
            Value::Iterator(_) | Value::Generator(_) => return Ok(value.clone()),
            Value::Instance(instance) => {
                if let Some(method) = instance.class.lookup("__iter__") {
                    let args = Args::new(vec![value.clone()]);
                    return self.call_value(&method, args, None);
                }
                if instance.class.lookup("__next__").is_some() {
                    return Ok(value.clone());
                }
                return Err(not_iterable(value));
            }
            Value::List(list) => IterState::List {
                list: list.clone(),
                index: 0,
            },
            Value::Tuple(items) => IterState::Items {
                items: items.to_vec(),
                index: 0,
            },
            Value::Str(s) => IterState::Items {
                items: s.chars().map(|c| Value::str(c.to_string())).collect(),
                index: 0,
            },
            Value::Bytes(bytes) => IterState::Items {
                items: bytes.iter().map(|b| Value::Int(i64::from(*b))).collect(),
                index: 0,
            },
            Value::Map(dict) | Value::Set(dict) => IterState::Items {
                items: dict.borrow().keys().cloned().collect(),
                index: 0,
            },
            Value::Range(start, stop, step) => IterState::Range {
                next: *start,
                stop: *stop,
                step: *step,
            },
            other => return Err(not_iterable(other)),
        };
        Ok(Value::Iterator(Rc::new(RefCell::new(state))))
    }

    /// Advances an iterator; `None` once exhausted.
    pub(crate) fn next(&mut self, iterator: &Value) -> RunResult<Option<Value>> {
        match iterator {
            Value::Iterator(state) => Ok(state.borrow_mut().next_value()),
            Value::Generator(generator) => match self.resume(generator, Value::None)? {
                Resumed::Yield(value) => Ok(Some(value)),
                Resumed::Return(_) => Ok(None),
            },
            Value::Instance(instance) => {
                let Some(method) = instance.class.lookup("__next__") else {
                    return Err(not_iterator(iterator));
                };
                match self.call_value(&method, Args::new(vec![iterator.clone()]), None) {
                    Ok(value) => Ok(Some(value)),
                    Err(raised) if self.is_stop_iteration(&raised) => Ok(None),
                    Err(raised) => Err(raised),
                }
            }
            other => Err(not_iterator(other)),
        }
    }

    /// Drains any iterable into a vector.
    pub(crate) fn collect(&mut self, value: &Value) -> RunResult<Vec<Value>> {
        match value {
            Value::List(items) => return Ok(items.borrow().clone()),
            Value::Tuple(items) => return Ok(items.to_vec()),
            _ => {}
        }
        let iterator = self.iterate(value)?;
        let mut items = Vec::new();
        while let Some(item) = self.next(&iterator)? {
            items.push(item);
        }
        Ok(items)
    }

    /// Sends a value into a generator, or advances a plain iterator.
    pub(crate) fn send(&mut self, iterator: &Value, sent: Value) -> RunResult<Resumed> {
        match iterator {
            Value::Generator(generator) => self.resume(generator, sent),
            other => Ok(match self.next(other)? {
                Some(value) => Resumed::Yield(value),
                None => Resumed::Return(Value::None),
            }),
        }
    }

    /// Runs a generator frame until its next yield or its return.
    pub(crate) fn resume(
        &mut self,
        generator: &Rc<RefCell<Generator>>,
        sent: Value,
    ) -> RunResult<Resumed> {
        let mut frame = {
            let mut state = generator.borrow_mut();
            if state.running {
                return Err(Raised::new("ValueError", "generator already executing"));
            }
            let Some(mut frame) = state.frame.take() else {
                return Ok(Resumed::Return(Value::None));
            };
            if state.started {
                frame.push(sent);
            } else if !sent.is_none() {
                state.frame = Some(frame);
                return Err(type_error(
                    "can't send non-None value to a just-started generator",
                ));
            }
            state.started = true;
            state.running = true;
            frame
        };

        let result = self.run_frame(&mut frame);
        let mut state = generator.borrow_mut();
        state.running = false;
        match result? {
            Exit::Yield(value) => {
                state.frame = Some(frame);
                Ok(Resumed::Yield(value))
            }
            Exit::Return(value) => Ok(Resumed::Return(value)),
        }
    }

    /// True when the exception is a `StopIteration`.
    pub(crate) fn is_stop_iteration(&self, raised: &Raised) -> bool {
        match raised {
            Raised::Pending { class, .. } => *class == "StopIteration",
            Raised::Value(Value::Instance(instance)) => match self.builtins.get("StopIteration") {
                Some(Value::Class(stop)) => instance.class.is_subclass(stop),
                _ => false,
            },
            Raised::Value(_) => false,
        }
    }
}

/// Places positional, keyword and default arguments in the fast slots,
/// then copies captured parameters into their cells.
fn bind_arguments(function: &Function, frame: &mut Frame, args: Args) -> RunResult<()> {
    let code = function.code.clone();
    let argcount = code.argcount as usize;
    let varargs = code.flags.contains(CodeFlags::VARARGS);
    let varkeywords = code.flags.contains(CodeFlags::VARKEYWORDS);
    let name = function.short_name();

    let Args {
        positional,
        keywords,
    } = args;
    let given = positional.len();
    let mut positional = positional.into_iter();
    for (slot, value) in positional.by_ref().take(argcount).enumerate() {
        frame.fast[slot] = Some(value);
    }
    let extra: Vec<Value> = positional.collect();
    if varargs {
        frame.fast[argcount] = Some(Value::tuple(extra));
    } else if !extra.is_empty() {
        return Err(type_error(format!(
            "{}() takes {} positional arguments but {} were given",
            name, argcount, given
        )));
    }

    let mut rest = Dict::new();
    for (key, value) in keywords {
        match code.varnames[..argcount]
            .iter()
            .position(|param| label_of(param) == key)
        {
            Some(slot) if frame.fast[slot].is_some() => {
                return Err(type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    name, key
                )));
            }
            Some(slot) => frame.fast[slot] = Some(value),
            None if varkeywords => {
                rest.insert(Value::str(&key), value);
            }
            None => {
                return Err(type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, key
                )));
            }
        }
    }
    if varkeywords {
        frame.fast[argcount + usize::from(varargs)] = Some(Value::map(rest));
    }

    let first_default = argcount.saturating_sub(function.defaults.len());
    for slot in 0..argcount {
        if frame.fast[slot].is_some() {
            continue;
        }
        if slot < first_default {
            return Err(type_error(format!(
                "{}() missing required argument '{}'",
                name,
                label_of(&code.varnames[slot])
            )));
        }
        frame.fast[slot] = Some(function.defaults[slot - first_default].clone());
    }

    frame.cells.extend(function.closure.iter().cloned());
    for (i, cell) in code.cellvars.iter().enumerate() {
        let bound = code
            .varnames
            .iter()
            .position(|param| param == cell)
            .and_then(|slot| frame.fast[slot].clone());
        if let Some(value) = bound {
            frame.cells[i].set(value);
        }
    }
    Ok(())
}

fn not_iterable(value: &Value) -> Raised {
    type_error(format!("'{}' object is not iterable", value.type_name()))
}

fn not_iterator(value: &Value) -> Raised {
    type_error(format!("'{}' object is not an iterator", value.type_name()))
}
