//! Conversions, iteration helpers and class construction.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed};

use super::{arg, at_most, int_arg};
use crate::compiler::OpCode;
use crate::runtime::exception::{Raised, RunResult, type_error, value_error};
use crate::runtime::object::{Args, IterState};
use crate::runtime::value::{Dict, Value, range_len};
use crate::vm::{Frame, Interpreter};

// ============================================================================
// Sequences
// ============================================================================

/// `range(stop)`, `range(start, stop[, step])`
pub fn range(_interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 3, "range")?;
    let (start, stop, step) = match args.positional.len() {
        0 => return Err(type_error("range expected at least 1 argument, got 0")),
        1 => (0, int_arg(&args, 0, "range")?, 1),
        2 => (int_arg(&args, 0, "range")?, int_arg(&args, 1, "range")?, 1),
        _ => (
            int_arg(&args, 0, "range")?,
            int_arg(&args, 1, "range")?,
            int_arg(&args, 2, "range")?,
        ),
    };
    if step == 0 {
        return Err(value_error("range() arg 3 must not be zero"));
    }
    Ok(Value::Range(start, stop, step))
}

/// `len(value)`
pub fn len(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let value = arg(&args, 0, "len")?;
    let len = match value {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Map(dict) | Value::Set(dict) => dict.borrow().len(),
        Value::Range(start, stop, step) => range_len(*start, *stop, *step) as usize,
        Value::Instance(instance) if instance.class.lookup("__len__").is_some() => {
            let method = interp.get_attr(value, "__len__")?;
            return interp.call_value(&method, Args::default(), None);
        }
        other => {
            return Err(type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(len as i64))
}

/// `list([iterable])`
pub fn list(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 1, "list")?;
    match args.positional.first() {
        Some(iterable) => Ok(Value::list(interp.collect(iterable)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

/// `tuple([iterable])`
pub fn tuple(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 1, "tuple")?;
    match args.positional.first() {
        Some(Value::Tuple(items)) => Ok(Value::Tuple(items.clone())),
        Some(iterable) => Ok(Value::tuple(interp.collect(iterable)?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

/// `dict([mapping or pairs], **entries)`
pub fn dict(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 1, "dict")?;
    let mut dict = match args.positional.first() {
        None => Dict::new(),
        Some(Value::Map(source)) => source.borrow().clone(),
        Some(iterable) => {
            let mut dict = Dict::new();
            for (i, pair) in interp.collect(iterable)?.into_iter().enumerate() {
                let items = interp.collect(&pair)?;
                let [key, value] = <[Value; 2]>::try_from(items).map_err(|items| {
                    value_error(format!(
                        "dictionary update sequence element #{} has length {}; 2 is required",
                        i,
                        items.len()
                    ))
                })?;
                insert(&mut dict, key, value)?;
            }
            dict
        }
    };
    for (key, value) in args.keywords {
        dict.insert(Value::str(key), value);
    }
    Ok(Value::map(dict))
}

/// `set([iterable])`
pub fn set(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 1, "set")?;
    let mut dict = Dict::new();
    if let Some(iterable) = args.positional.first() {
        for item in interp.collect(iterable)? {
            insert(&mut dict, item, Value::None)?;
        }
    }
    Ok(Value::Set(Rc::new(RefCell::new(dict))))
}

fn insert(dict: &mut Dict, key: Value, value: Value) -> RunResult<()> {
    let type_name = key.type_name();
    if dict.insert(key, value) {
        Ok(())
    } else {
        Err(type_error(format!("unhashable type: '{}'", type_name)))
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// `str([value])`
pub fn str(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 1, "str")?;
    match args.positional.first() {
        Some(value @ Value::Str(_)) => Ok(value.clone()),
        Some(value) => Ok(Value::str(interp.to_str(value)?)),
        None => Ok(Value::str("")),
    }
}

/// `repr(value)`
pub fn repr(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let value = arg(&args, 0, "repr")?;
    Ok(Value::str(interp.repr_of(value)?))
}

/// `bool([value])`
pub fn bool(_interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 1, "bool")?;
    Ok(Value::Bool(args.positional.first().is_some_and(Value::truthy)))
}

/// `int([value[, base]])`
pub fn int(_interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 2, "int")?;
    let Some(value) = args.positional.first() else {
        return Ok(Value::Int(0));
    };
    let base = match args.positional.get(1).or_else(|| args.keyword("base")) {
        Some(base) => base
            .as_int()
            .filter(|b| (2..=36).contains(b))
            .ok_or_else(|| value_error("int() base must be >= 2 and <= 36"))?
            as u32,
        None => 10,
    };
    match value {
        Value::Str(s) => parse_int(s, base),
        _ if args.positional.len() > 1 => {
            Err(type_error("int() can't convert non-string with explicit base"))
        }
        Value::Int(_) | Value::BigInt(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) => {
            let n = BigInt::from_f64(x.trunc()).ok_or_else(|| {
                Raised::new(
                    "OverflowError",
                    format!("cannot convert float {} to integer", x),
                )
            })?;
            Ok(Value::from_bigint(n))
        }
        other => Err(type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_int(text: &str, base: u32) -> RunResult<Value> {
    let trimmed = text.trim();
    let digits = trimmed.replace('_', "");
    if let Ok(i) = i64::from_str_radix(&digits, base) {
        return Ok(Value::Int(i));
    }
    BigInt::parse_bytes(digits.as_bytes(), base)
        .map(Value::from_bigint)
        .ok_or_else(|| {
            value_error(format!(
                "invalid literal for int() with base {}: {}",
                base,
                Value::str(text).repr()
            ))
        })
}

/// `float([value])`
pub fn float(_interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    at_most(&args, 1, "float")?;
    let Some(value) = args.positional.first() else {
        return Ok(Value::Float(0.0));
    };
    if let Value::Str(s) = value {
        let text = s.trim();
        let parsed = match text.to_ascii_lowercase().as_str() {
            "nan" | "+nan" | "-nan" => Some(f64::NAN),
            "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
            "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
            _ => text.parse::<f64>().ok(),
        };
        return parsed.map(Value::Float).ok_or_else(|| {
            value_error(format!("could not convert string to float: {}", value.repr()))
        });
    }
    value.as_float().map(Value::Float).ok_or_else(|| {
        type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            value.type_name()
        ))
    })
}

/// `abs(x)`
pub fn abs(_interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    match arg(&args, 0, "abs")? {
        Value::Int(i) => Ok(match i.checked_abs() {
            Some(a) => Value::Int(a),
            None => Value::from_bigint(BigInt::from(*i).abs()),
        }),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::BigInt(n) => Ok(Value::from_bigint(n.abs())),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        Value::Complex(re, im) => Ok(Value::Float(re.hypot(*im))),
        other => Err(type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

/// `isinstance(value, class or tuple of classes)`
pub fn isinstance(
    _interp: &mut Interpreter,
    _caller: Option<&Frame>,
    args: Args,
) -> RunResult<Value> {
    let value = arg(&args, 0, "isinstance")?;
    let filter = arg(&args, 1, "isinstance")?;
    Ok(Value::Bool(instance_of(value, filter)?))
}

fn instance_of(value: &Value, filter: &Value) -> RunResult<bool> {
    match filter {
        Value::Tuple(filters) => {
            for filter in filters.iter() {
                if instance_of(value, filter)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Class(class) => Ok(match value {
            Value::Instance(instance) => instance.class.is_subclass(class),
            _ => class.name == "object",
        }),
        // Conversion builtins double as the builtin types.
        Value::Builtin(builtin) => Ok(match builtin.name.as_str() {
            "int" => matches!(value, Value::Int(_) | Value::BigInt(_) | Value::Bool(_)),
            "float" | "str" | "list" | "tuple" | "dict" | "set" | "bool" | "range" => {
                value.type_name() == builtin.name
            }
            _ => false,
        }),
        other => Err(type_error(format!(
            "isinstance() arg 2 must be a type or tuple of types, not {}",
            other.type_name()
        ))),
    }
}

// ============================================================================
// Reductions
// ============================================================================

/// `min(iterable)` or `min(a, b, ...)`, with an optional `key`.
pub fn min(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    extreme(interp, args, "min", Ordering::Less)
}

/// `max(iterable)` or `max(a, b, ...)`, with an optional `key`.
pub fn max(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    extreme(interp, args, "max", Ordering::Greater)
}

fn extreme(
    interp: &mut Interpreter,
    args: Args,
    name: &str,
    wanted: Ordering,
) -> RunResult<Value> {
    let items = match args.positional.as_slice() {
        [] => return Err(type_error(format!("{} expected at least 1 argument, got 0", name))),
        [iterable] => interp.collect(iterable)?,
        _ => args.positional.clone(),
    };
    let key = args.keyword("key").cloned();
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let rank = match &key {
            Some(key) => interp.call_value(key, Args::new(vec![item.clone()]), None)?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_rank, _)) => compare(interp, &rank, best_rank)? == wanted,
        };
        if replace {
            best = Some((rank, item));
        }
    }
    best.map(|(_, item)| item)
        .ok_or_else(|| value_error(format!("{}() arg is an empty sequence", name)))
}

/// `sum(iterable[, start])`
pub fn sum(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let iterable = arg(&args, 0, "sum")?;
    let mut total = args
        .positional
        .get(1)
        .or_else(|| args.keyword("start"))
        .cloned()
        .unwrap_or(Value::Int(0));
    for item in interp.collect(iterable)? {
        total = interp.binary(OpCode::BinaryAdd, &total, &item)?;
    }
    Ok(total)
}

/// `sorted(iterable, key=None, reverse=False)`
pub fn sorted(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let iterable = arg(&args, 0, "sorted")?;
    let items = interp.collect(iterable)?;
    let mut ranked = Vec::with_capacity(items.len());
    for item in items {
        let rank = match args.keyword("key") {
            Some(Value::None) | None => item.clone(),
            Some(key) => interp.call_value(key, Args::new(vec![item.clone()]), None)?,
        };
        ranked.push((rank, item));
    }

    let mut failure = None;
    ranked.sort_by(|(a, _), (b, _)| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        compare(interp, a, b).unwrap_or_else(|raised| {
            failure = Some(raised);
            Ordering::Equal
        })
    });
    if let Some(raised) = failure {
        return Err(raised);
    }

    let mut items: Vec<Value> = ranked.into_iter().map(|(_, item)| item).collect();
    if args.keyword("reverse").is_some_and(Value::truthy) {
        items.reverse();
    }
    Ok(Value::list(items))
}

/// Orders two values through `<`, honouring `__lt__`.
fn compare(interp: &mut Interpreter, a: &Value, b: &Value) -> RunResult<Ordering> {
    if interp.compare(0, a, b)?.truthy() {
        Ok(Ordering::Less)
    } else if interp.compare(0, b, a)?.truthy() {
        Ok(Ordering::Greater)
    } else {
        Ok(Ordering::Equal)
    }
}

// ============================================================================
// Iteration
// ============================================================================

/// `iter(iterable)`
pub fn iter(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let iterable = arg(&args, 0, "iter")?;
    interp.iterate(iterable)
}

/// `next(iterator[, default])`
pub fn next(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let iterator = arg(&args, 0, "next")?;
    match interp.next(iterator)? {
        Some(value) => Ok(value),
        None => match args.positional.get(1) {
            Some(default) => Ok(default.clone()),
            None => Err(Raised::new("StopIteration", "")),
        },
    }
}

/// `__build_class__(body, name, *bases)`
pub fn build_class(
    interp: &mut Interpreter,
    _caller: Option<&Frame>,
    args: Args,
) -> RunResult<Value> {
    interp.build_class(args)
}

/// Snapshot iterator over values; used by methods returning views.
pub(crate) fn iterator_of(items: Vec<Value>) -> Value {
    Value::Iterator(Rc::new(RefCell::new(IterState::Items { items, index: 0 })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(func: crate::runtime::object::NativeFn, args: Vec<Value>) -> RunResult<Value> {
        let mut interp = Interpreter::new();
        func(&mut interp, None, Args::new(args))
    }

    #[test]
    fn test_range_and_len() {
        let range = call(super::range, vec![Value::Int(1), Value::Int(10), Value::Int(3)]).unwrap();
        assert_eq!(range, Value::Range(1, 10, 3));
        assert_eq!(call(len, vec![range]).unwrap(), Value::Int(3));
        assert!(call(super::range, vec![Value::Int(1), Value::Int(2), Value::Int(0)]).is_err());
        assert_eq!(call(len, vec![Value::str("héllo")]).unwrap(), Value::Int(5));
        assert!(call(len, vec![Value::Int(3)]).is_err());
    }

    #[test]
    fn test_int_conversions() {
        assert_eq!(call(int, vec![Value::str(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(
            call(int, vec![Value::str("ff"), Value::Int(16)]).unwrap(),
            Value::Int(255)
        );
        assert_eq!(call(int, vec![Value::Float(-3.9)]).unwrap(), Value::Int(-3));
        assert!(matches!(
            call(int, vec![Value::str("99999999999999999999")]).unwrap(),
            Value::BigInt(_)
        ));
        assert!(call(int, vec![Value::str("x1")]).is_err());
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(call(float, vec![Value::str("2.5")]).unwrap(), Value::Float(2.5));
        assert!(matches!(call(float, vec![Value::str("nan")]).unwrap(), Value::Float(x) if x.is_nan()));
        assert_eq!(call(float, vec![Value::Int(2)]).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_reductions() {
        let items = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call(min, vec![items.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call(max, vec![Value::Int(4), Value::Int(9)]).unwrap(), Value::Int(9));
        assert_eq!(call(sum, vec![items.clone()]).unwrap(), Value::Int(6));
        assert_eq!(
            call(sorted, vec![items]).unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert!(call(min, vec![Value::list(vec![])]).is_err());
        assert!(call(sorted, vec![Value::list(vec![Value::Int(1), Value::str("a")])]).is_err());
    }

    #[test]
    fn test_dict_from_pairs() {
        let pairs = Value::list(vec![
            Value::tuple(vec![Value::str("a"), Value::Int(1)]),
            Value::tuple(vec![Value::str("b"), Value::Int(2)]),
        ]);
        let Value::Map(map) = call(dict, vec![pairs]).unwrap() else {
            panic!("expected a map");
        };
        assert_eq!(map.borrow().get(&Value::str("b")), Some(&Value::Int(2)));
    }

    #[test]
    fn test_isinstance_builtin_types() {
        let mut interp = Interpreter::new();
        let int_type = interp.builtin("int").unwrap();
        let args = Args::new(vec![Value::Bool(true), int_type]);
        assert_eq!(isinstance(&mut interp, None, args).unwrap(), Value::Bool(true));
    }
}
