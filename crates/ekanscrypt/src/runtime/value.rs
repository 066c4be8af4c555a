//! Runtime value representation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rustc_hash::FxHashMap;

use super::object::{
    BoundMethod, Builtin, Cell, Class, Function, Generator, Instance, IterState, Module,
};
use crate::compiler::{CodeObject, Constant};

/// A value manipulated by the interpreter.
///
/// Values are reference counted with `Rc`; the interpreter is single
/// threaded.
#[derive(Clone)]
pub enum Value {
    /// none
    None,
    /// Boolean
    Bool(bool),
    /// Machine integer
    Int(i64),
    /// Integer beyond `i64`
    BigInt(Rc<BigInt>),
    /// IEEE 754 double
    Float(f64),
    /// Complex number `(re, im)`
    Complex(f64, f64),
    /// Text
    Str(Rc<str>),
    /// Byte string
    Bytes(Rc<[u8]>),
    /// Mutable list
    List(Rc<RefCell<Vec<Value>>>),
    /// Immutable tuple
    Tuple(Rc<[Value]>),
    /// Insertion ordered map
    Map(Rc<RefCell<Dict>>),
    /// Set; a map whose values are none
    Set(Rc<RefCell<Dict>>),
    /// `start:stop:step`
    Slice(Rc<[Value; 3]>),
    /// `range(start, stop, step)`
    Range(i64, i64, i64),
    /// Compiled function
    Function(Rc<Function>),
    /// Native function
    Builtin(Rc<Builtin>),
    /// Method bound to its receiver
    BoundMethod(Rc<BoundMethod>),
    /// User or builtin class
    Class(Rc<Class>),
    /// Class instance, exceptions included
    Instance(Rc<Instance>),
    /// Imported module
    Module(Rc<Module>),
    /// Closure cell
    Cell(Rc<Cell>),
    /// Builtin iterator
    Iterator(Rc<RefCell<IterState>>),
    /// Suspended generator frame
    Generator(Rc<RefCell<Generator>>),
    /// Compiled regular expression
    Regex(Rc<regex::Regex>),
    /// Code constant awaiting `MAKE_FUNCTION`
    Code(Arc<CodeObject>),
}

impl Value {
    /// Creates a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Creates a list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Creates a tuple value.
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    /// Creates a map value.
    pub fn map(dict: Dict) -> Self {
        Value::Map(Rc::new(RefCell::new(dict)))
    }

    /// Creates an integer, demoting a big integer that fits in `i64`.
    pub fn from_bigint(n: BigInt) -> Self {
        match n.to_i64() {
            Some(i) => Value::Int(i),
            None => Value::BigInt(Rc::new(n)),
        }
    }

    /// Converts a pool constant.
    pub fn from_constant(constant: &Constant) -> Self {
        match constant {
            Constant::None => Value::None,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::BigInt(n) => Value::from_bigint(n.clone()),
            Constant::Float(x) => Value::Float(*x),
            Constant::Complex(im) => Value::Complex(0.0, *im),
            Constant::Str(s) => Value::str(s),
            Constant::Bytes(b) => Value::Bytes(Rc::from(b.as_slice())),
            Constant::Code(code) => Value::Code(code.clone()),
        }
    }

    /// Returns true for none.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::BigInt(_) => true,
            Value::Float(x) => *x != 0.0,
            Value::Complex(re, im) => *re != 0.0 || *im != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Map(dict) | Value::Set(dict) => !dict.borrow().is_empty(),
            Value::Range(start, stop, step) => range_len(*start, *stop, *step) > 0,
            _ => true,
        }
    }

    /// Name of the value's type, as shown in error messages.
    pub fn type_name(&self) -> String {
        let name = match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::BigInt(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(..) => "complex",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "dict",
            Value::Set(_) => "set",
            Value::Slice(_) => "slice",
            Value::Range(..) => "range",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
            Value::BoundMethod(_) => "method",
            Value::Class(_) => "type",
            Value::Instance(instance) => return instance.class.name.clone(),
            Value::Module(_) => "module",
            Value::Cell(_) => "cell",
            Value::Iterator(_) => "iterator",
            Value::Generator(_) => "generator",
            Value::Regex(_) => "regex",
            Value::Code(_) => "code",
        };
        name.to_string()
    }

    /// Integer view of ints and bools.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Float view of numbers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::BigInt(n) => n.to_f64(),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Key used by maps and sets; `None` for unhashable values.
    pub fn hash_key(&self) -> Option<HashKey> {
        let key = match self {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(i64::from(*b)),
            Value::Int(i) => HashKey::Int(*i),
            Value::BigInt(n) => HashKey::BigInt(n.to_string()),
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 9.0e15 => HashKey::Int(*x as i64),
            Value::Float(x) => HashKey::Float(x.to_bits()),
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Bytes(b) => HashKey::Bytes(b.clone()),
            Value::Tuple(items) => {
                let keys: Option<Vec<_>> = items.iter().map(Value::hash_key).collect();
                HashKey::Tuple(keys?)
            }
            Value::List(_) | Value::Map(_) | Value::Set(_) | Value::Slice(_) => return None,
            other => HashKey::Identity(other.identity()),
        };
        Some(key)
    }

    /// Address of the shared allocation, or 0 for plain values.
    pub fn identity(&self) -> usize {
        match self {
            Value::BigInt(rc) => Rc::as_ptr(rc) as usize,
            Value::Str(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Value::Bytes(rc) => Rc::as_ptr(rc) as *const u8 as usize,
            Value::List(rc) => Rc::as_ptr(rc) as usize,
            Value::Tuple(rc) => Rc::as_ptr(rc) as *const Value as usize,
            Value::Map(rc) | Value::Set(rc) => Rc::as_ptr(rc) as usize,
            Value::Slice(rc) => Rc::as_ptr(rc) as usize,
            Value::Function(rc) => Rc::as_ptr(rc) as usize,
            Value::Builtin(rc) => Rc::as_ptr(rc) as usize,
            Value::BoundMethod(rc) => Rc::as_ptr(rc) as usize,
            Value::Class(rc) => Rc::as_ptr(rc) as usize,
            Value::Instance(rc) => Rc::as_ptr(rc) as usize,
            Value::Module(rc) => Rc::as_ptr(rc) as usize,
            Value::Cell(rc) => Rc::as_ptr(rc) as usize,
            Value::Iterator(rc) => Rc::as_ptr(rc) as usize,
            Value::Generator(rc) => Rc::as_ptr(rc) as usize,
            Value::Regex(rc) => Rc::as_ptr(rc) as usize,
            Value::Code(arc) => Arc::as_ptr(arc) as usize,
            _ => 0,
        }
    }

    /// `a is b`.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Range(..), _) | (Value::Complex(..), _) => false,
            _ => {
                let id = self.identity();
                id != 0 && id == other.identity()
            }
        }
    }

    /// The `repr()` text.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            Value::Bytes(b) => {
                let body: String = b
                    .iter()
                    .map(|byte| match byte {
                        b'\\' => "\\\\".to_string(),
                        b'\'' => "\\'".to_string(),
                        0x20..=0x7e => (*byte as char).to_string(),
                        b'\n' => "\\n".to_string(),
                        b'\t' => "\\t".to_string(),
                        b'\r' => "\\r".to_string(),
                        _ => format!("\\x{:02x}", byte),
                    })
                    .collect();
                format!("b'{}'", body)
            }
            _ => self.to_string(),
        }
    }
}

/// Number of elements of a range.
pub fn range_len(start: i64, stop: i64, step: i64) -> i64 {
    if step > 0 && start < stop {
        (stop - start - 1) / step + 1
    } else if step < 0 && start > stop {
        (start - stop - 1) / (-step) + 1
    } else {
        0
    }
}

fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        x.to_string()
    }
}

fn join_repr<'a>(items: impl Iterator<Item = &'a Value>) -> String {
    items.map(Value::repr).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::BigInt(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Complex(re, im) if *re == 0.0 => write!(f, "{}j", format_float(*im)),
            Value::Complex(re, im) => {
                write!(f, "({}{:+}j)", format_float(*re), im)
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Bytes(_) => write!(f, "{}", self.repr()),
            Value::List(items) => write!(f, "[{}]", join_repr(items.borrow().iter())),
            Value::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0].repr()),
            Value::Tuple(items) => write!(f, "({})", join_repr(items.iter())),
            Value::Map(dict) => {
                let dict = dict.borrow();
                let body: Vec<String> = dict
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                write!(f, "{{{}}}", body.join(", "))
            }
            Value::Set(dict) => {
                let dict = dict.borrow();
                if dict.is_empty() {
                    write!(f, "set()")
                } else {
                    write!(f, "{{{}}}", join_repr(dict.keys()))
                }
            }
            Value::Slice(parts) => write!(
                f,
                "slice({}, {}, {})",
                parts[0].repr(),
                parts[1].repr(),
                parts[2].repr()
            ),
            Value::Range(start, stop, 1) => write!(f, "range({}, {})", start, stop),
            Value::Range(start, stop, step) => write!(f, "range({}, {}, {})", start, stop, step),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name),
            Value::BoundMethod(method) => write!(f, "<bound method {}>", method.name()),
            Value::Class(class) => write!(f, "<class '{}'>", class.name),
            Value::Instance(instance) => match instance.message() {
                Some(message) if instance.class.is_exception() => write!(f, "{}", message),
                _ => write!(f, "<{} object>", instance.class.name),
            },
            Value::Module(module) => write!(f, "<module '{}'>", module.name),
            Value::Cell(_) => write!(f, "<cell>"),
            Value::Iterator(_) => write!(f, "<iterator>"),
            Value::Generator(_) => write!(f, "<generator>"),
            Value::Regex(regex) => write!(f, "re.compile({})", quote(regex.as_str())),
            Value::Code(code) => write!(f, "<code {}>", code.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Complex(a, b), Value::Complex(c, d)) => a == c && b == d,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len()
                        && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| w == v))
                }
            }
            (Value::Set(a), Value::Set(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len() && a.keys().all(|k| b.contains(k))
                }
            }
            (Value::Range(a, b, c), Value::Range(d, e, g)) => (a, b, c) == (d, e, g),
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a.as_float(), b.as_float()) {
                    (Some(x), Some(y)) => x == y,
                    _ => {
                        let id = a.identity();
                        id != 0 && id == b.identity()
                    }
                },
            },
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

// ============================================================================
// Hashing
// ============================================================================

/// Hashable projection of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    /// none
    None,
    /// ints, bools and integral floats
    Int(i64),
    /// Big integer, by decimal text
    BigInt(String),
    /// Non-integral float bits
    Float(u64),
    /// Text
    Str(Rc<str>),
    /// Bytes
    Bytes(Rc<[u8]>),
    /// Tuple of hashable values
    Tuple(Vec<HashKey>),
    /// Objects hash by identity
    Identity(usize),
}

/// Insertion ordered hash map keyed by hashable values.
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: FxHashMap<HashKey, usize>,
}

impl Dict {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces; `false` when the key is unhashable.
    pub fn insert(&mut self, key: Value, value: Value) -> bool {
        let Some(hash) = key.hash_key() else {
            return false;
        };
        match self.index.get(&hash) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push((key, value));
            }
        }
        true
    }

    /// Looks up a key.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hash = key.hash_key()?;
        self.index.get(&hash).map(|&i| &self.entries[i].1)
    }

    /// True when the key is present.
    pub fn contains(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Removes a key, keeping the order of the others.
    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let hash = key.hash_key()?;
        let i = self.index.remove(&hash)?;
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl FromIterator<(Value, Value)> for Dict {
    fn from_iter<T: IntoIterator<Item = (Value, Value)>>(iter: T) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::str("x").truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(!Value::Range(3, 3, 1).truthy());
    }

    #[test]
    fn test_display_and_repr() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::str("a").repr(), "'a'");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::str("b")]).to_string(),
            "[1, 'b']"
        );
        assert_eq!(Value::tuple(vec![Value::Int(1)]).to_string(), "(1,)");
        assert_eq!(Value::Bool(true).to_string(), "True");
    }

    #[test]
    fn test_numeric_equality_across_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::str("1"), Value::Int(1));
    }

    #[test]
    fn test_dict_keeps_insertion_order() {
        let mut dict = Dict::new();
        dict.insert(Value::str("b"), Value::Int(1));
        dict.insert(Value::str("a"), Value::Int(2));
        dict.insert(Value::Int(1), Value::Int(3));
        assert_eq!(dict.get(&Value::Float(1.0)), Some(&Value::Int(3)));
        dict.remove(&Value::str("b"));
        let keys: Vec<String> = dict.keys().map(Value::to_string).collect();
        assert_eq!(keys, vec!["a", "1"]);
        assert!(!dict.insert(Value::list(vec![]), Value::None));
    }

    #[test]
    fn test_identity() {
        let list = Value::list(vec![]);
        assert!(list.is(&list.clone()));
        assert!(!list.is(&Value::list(vec![])));
        assert!(Value::None.is(&Value::None));
    }
}
