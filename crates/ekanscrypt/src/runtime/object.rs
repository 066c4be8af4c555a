//! Heap objects: functions, classes, instances, modules, cells and
//! iterators.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::exception::RunResult;
use super::value::Value;
use crate::compiler::CodeObject;
use crate::vm::{Frame, Interpreter};

/// A shared, mutable name-space (module globals, class bodies).
pub type Namespace = Rc<RefCell<FxHashMap<String, Value>>>;

/// Creates an empty name-space.
pub fn namespace() -> Namespace {
    Rc::new(RefCell::new(FxHashMap::default()))
}

// ============================================================================
// Functions
// ============================================================================

/// A function created by `MAKE_FUNCTION`.
pub struct Function {
    /// Qualified name
    pub name: String,
    /// Compiled body
    pub code: Arc<CodeObject>,
    /// Globals of the defining module
    pub globals: Namespace,
    /// Defaults of the trailing parameters
    pub defaults: Vec<Value>,
    /// Captured cells, in `freevars` order
    pub closure: Vec<Rc<Cell>>,
}

impl Function {
    /// Short name, without the qualifying prefix.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// Positional and keyword arguments of a call.
#[derive(Default, Clone)]
pub struct Args {
    /// Positional arguments
    pub positional: Vec<Value>,
    /// Keyword arguments, in call order
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    /// Positional-only arguments.
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    /// Looks up a keyword argument.
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// Native function signature.
///
/// The caller frame is present when the call comes from script code.
pub type NativeFn = fn(&mut Interpreter, Option<&Frame>, Args) -> RunResult<Value>;

/// A function implemented in Rust.
pub struct Builtin {
    /// Name shown by `repr`
    pub name: String,
    /// Implementation
    pub func: NativeFn,
}

impl Builtin {
    /// Wraps a native function into a value.
    pub fn value(name: &str, func: NativeFn) -> Value {
        Value::Builtin(Rc::new(Builtin {
            name: name.to_string(),
            func,
        }))
    }
}

/// A callable bound to its receiver.
pub enum BoundMethod {
    /// Script function found on a class
    Function {
        /// The instance
        receiver: Value,
        /// The function
        function: Value,
    },
    /// Method of a builtin type, dispatched by name
    Native {
        /// The receiver
        receiver: Value,
        /// Method name
        name: String,
    },
}

impl BoundMethod {
    /// Name shown by `repr`.
    pub fn name(&self) -> String {
        match self {
            BoundMethod::Function { function, .. } => match function {
                Value::Function(f) => f.name.clone(),
                other => other.to_string(),
            },
            BoundMethod::Native { receiver, name } => {
                format!("{}.{}", receiver.type_name(), name)
            }
        }
    }
}

// ============================================================================
// Classes
// ============================================================================

/// A class: user defined, builtin or an exception type.
pub struct Class {
    /// Class name
    pub name: String,
    /// Direct bases
    pub bases: Vec<Rc<Class>>,
    /// Method resolution order, without the class itself
    pub mro: Vec<Rc<Class>>,
    /// Class attributes and methods
    pub attrs: RefCell<FxHashMap<String, Value>>,
}

impl Class {
    /// Creates a class and computes its lookup order.
    ///
    /// Bases are searched depth first, left to right, skipping classes
    /// already visited.
    pub fn new(name: impl Into<String>, bases: Vec<Rc<Class>>) -> Self {
        let mut mro: Vec<Rc<Class>> = Vec::new();
        for base in &bases {
            for class in std::iter::once(base).chain(base.mro.iter()) {
                if !mro.iter().any(|seen| Rc::ptr_eq(seen, class)) {
                    mro.push(class.clone());
                }
            }
        }
        Self {
            name: name.into(),
            bases,
            mro,
            attrs: RefCell::new(FxHashMap::default()),
        }
    }

    /// Finds an attribute on the class or its bases.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attrs.borrow().get(name) {
            return Some(value.clone());
        }
        self.mro
            .iter()
            .find_map(|class| class.attrs.borrow().get(name).cloned())
    }

    /// True when `self` is `other` or derives from it.
    pub fn is_subclass(&self, other: &Class) -> bool {
        std::ptr::eq(self, other) || self.mro.iter().any(|c| std::ptr::eq(&**c, other))
    }

    /// True for exception classes.
    pub fn is_exception(&self) -> bool {
        self.name == "Exception" || self.mro.iter().any(|c| c.name == "Exception")
    }
}

/// An instance of a class.
pub struct Instance {
    /// The class
    pub class: Rc<Class>,
    /// Instance attributes
    pub attrs: RefCell<FxHashMap<String, Value>>,
}

impl Instance {
    /// Creates an instance with no attributes.
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            attrs: RefCell::new(FxHashMap::default()),
        }
    }

    /// Exception message: the first constructor argument.
    pub fn message(&self) -> Option<String> {
        match self.attrs.borrow().get("args") {
            Some(Value::Tuple(args)) => Some(match args.first() {
                Some(first) => first.to_string(),
                None => String::new(),
            }),
            _ => None,
        }
    }
}

// ============================================================================
// Modules, cells and iterators
// ============================================================================

/// An imported module.
pub struct Module {
    /// Dotted name
    pub name: String,
    /// Exported attributes; submodules are added on import
    pub attrs: RefCell<FxHashMap<String, Value>>,
}

/// A closure cell.
#[derive(Default)]
pub struct Cell(RefCell<Option<Value>>);

impl Cell {
    /// Creates an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents.
    pub fn get(&self) -> Option<Value> {
        self.0.borrow().clone()
    }

    /// Replaces the contents.
    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = Some(value);
    }

    /// Empties the cell.
    pub fn clear(&self) {
        *self.0.borrow_mut() = None;
    }
}

/// State of a builtin iterator.
pub enum IterState {
    /// Snapshot of values
    Items {
        /// Remaining values
        items: Vec<Value>,
        /// Next position
        index: usize,
    },
    /// Live view of a list; sees appends made during iteration
    List {
        /// The list
        list: Rc<RefCell<Vec<Value>>>,
        /// Next position
        index: usize,
    },
    /// Arithmetic progression
    Range {
        /// Next value
        next: i64,
        /// Exclusive bound
        stop: i64,
        /// Step, never zero
        step: i64,
    },
}

impl IterState {
    /// Advances the iterator.
    pub fn next_value(&mut self) -> Option<Value> {
        match self {
            IterState::Items { items, index } => {
                let value = items.get(*index).cloned();
                *index += 1;
                value
            }
            IterState::List { list, index } => {
                let value = list.borrow().get(*index).cloned();
                *index += 1;
                value
            }
            IterState::Range { next, stop, step } => {
                let more = if *step > 0 { *next < *stop } else { *next > *stop };
                if !more {
                    return None;
                }
                let value = *next;
                *next += *step;
                Some(Value::Int(value))
            }
        }
    }
}

/// A generator: a suspended frame.
pub struct Generator {
    /// Qualified name of the generator function
    pub name: String,
    /// The frame; `None` once finished or while running
    pub frame: Option<Box<Frame>>,
    /// True after the first resume
    pub started: bool,
    /// True while the frame executes
    pub running: bool,
}

impl Generator {
    /// Wraps a fresh frame.
    pub fn new(name: String, frame: Frame) -> Self {
        Self {
            name,
            frame: Some(Box::new(frame)),
            started: false,
            running: false,
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<generator {}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mro_is_depth_first_without_repeats() {
        let base = Rc::new(Class::new("Base", vec![]));
        let left = Rc::new(Class::new("Left", vec![base.clone()]));
        let right = Rc::new(Class::new("Right", vec![base.clone()]));
        let child = Class::new("Child", vec![left.clone(), right.clone()]);
        let names: Vec<&str> = child.mro.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Left", "Base", "Right"]);
        assert!(child.is_subclass(&base));
        assert!(!base.is_subclass(&left));
    }

    #[test]
    fn test_attribute_lookup_follows_bases() {
        let base = Rc::new(Class::new("Base", vec![]));
        base.attrs.borrow_mut().insert("x".into(), Value::Int(1));
        let child = Class::new("Child", vec![base]);
        assert_eq!(child.lookup("x"), Some(Value::Int(1)));
        child.attrs.borrow_mut().insert("x".into(), Value::Int(2));
        assert_eq!(child.lookup("x"), Some(Value::Int(2)));
        assert!(child.lookup("y").is_none());
    }

    #[test]
    fn test_range_iterator() {
        let mut state = IterState::Range {
            next: 5,
            stop: 0,
            step: -2,
        };
        let mut seen = Vec::new();
        while let Some(value) = state.next_value() {
            seen.push(value);
        }
        assert_eq!(seen, vec![Value::Int(5), Value::Int(3), Value::Int(1)]);
    }

    #[test]
    fn test_cell() {
        let cell = Cell::new();
        assert!(cell.get().is_none());
        cell.set(Value::Int(3));
        assert_eq!(cell.get(), Some(Value::Int(3)));
        cell.clear();
        assert!(cell.get().is_none());
    }
}
