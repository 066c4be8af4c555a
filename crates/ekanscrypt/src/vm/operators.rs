//! Arithmetic, comparison, containment and subscripts of builtin types.
//!
//! Integers follow floor semantics for `//` and `%` and promote to big
//! integers on overflow. Instances with operator methods are dispatched
//! by the interpreter before these functions run.

use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::compiler::OpCode;
use crate::runtime::exception::{
    index_error, key_error, type_error, value_error, zero_division, RunResult,
};
use crate::runtime::value::{range_len, Dict, Value};

/// Integer results wider than this raise `OverflowError` instead of
/// exhausting memory.
const MAX_INT_BITS: u64 = 1 << 28;

/// Symbol of a binary opcode, for error messages.
pub fn symbol(op: OpCode) -> &'static str {
    match op {
        OpCode::BinaryMatrixMultiply => "@",
        OpCode::BinaryPower => "**",
        OpCode::BinaryMultiply => "*",
        OpCode::BinaryModulo => "%",
        OpCode::BinaryAdd => "+",
        OpCode::BinarySubtract => "-",
        OpCode::BinaryFloorDivide => "//",
        OpCode::BinaryTrueDivide => "/",
        OpCode::BinaryLshift => "<<",
        OpCode::BinaryRshift => ">>",
        OpCode::BinaryAnd => "&",
        OpCode::BinaryXor => "^",
        OpCode::BinaryOr => "|",
        _ => "?",
    }
}

/// Name of the operator method tried on instances.
pub fn method_name(op: OpCode) -> Option<&'static str> {
    let name = match op {
        OpCode::BinaryAdd => "__add__",
        OpCode::BinarySubtract => "__sub__",
        OpCode::BinaryMultiply => "__mul__",
        OpCode::BinaryTrueDivide => "__truediv__",
        OpCode::BinaryFloorDivide => "__floordiv__",
        OpCode::BinaryModulo => "__mod__",
        OpCode::BinaryPower => "__pow__",
        OpCode::BinaryMatrixMultiply => "__matmul__",
        OpCode::BinaryAnd => "__and__",
        OpCode::BinaryOr => "__or__",
        OpCode::BinaryXor => "__xor__",
        OpCode::BinaryLshift => "__lshift__",
        OpCode::BinaryRshift => "__rshift__",
        _ => return None,
    };
    Some(name)
}

fn unsupported(op: OpCode, a: &Value, b: &Value) -> crate::runtime::Raised {
    type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol(op),
        a.type_name(),
        b.type_name()
    ))
}

fn to_bigint(value: &Value) -> Option<BigInt> {
    match value {
        Value::Int(i) => Some(BigInt::from(*i)),
        Value::Bool(b) => Some(BigInt::from(u8::from(*b))),
        Value::BigInt(n) => Some((**n).clone()),
        _ => None,
    }
}

fn is_integer(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Bool(_) | Value::BigInt(_))
}

fn is_number(value: &Value) -> bool {
    is_integer(value) || matches!(value, Value::Float(_))
}

fn as_complex(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Complex(re, im) => Some((*re, *im)),
        other => other.as_float().map(|x| (x, 0.0)),
    }
}

/// Applies a binary opcode to builtin values.
pub fn binary(op: OpCode, a: &Value, b: &Value) -> RunResult<Value> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if !(matches!(a, Value::Bool(_)) && matches!(b, Value::Bool(_))
            && matches!(op, OpCode::BinaryAnd | OpCode::BinaryOr | OpCode::BinaryXor))
        {
            return int_binary(op, x, y);
        }
        let result = match op {
            OpCode::BinaryAnd => x & y,
            OpCode::BinaryOr => x | y,
            _ => x ^ y,
        };
        return Ok(Value::Bool(result != 0));
    }
    if is_integer(a) && is_integer(b) {
        if let (Some(x), Some(y)) = (to_bigint(a), to_bigint(b)) {
            return big_binary(op, x, y);
        }
    }
    if is_number(a) && is_number(b) {
        if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
            return float_binary(op, x, y);
        }
    }
    if matches!(a, Value::Complex(..)) || matches!(b, Value::Complex(..)) {
        if let (Some(x), Some(y)) = (as_complex(a), as_complex(b)) {
            return complex_binary(op, x, y).ok_or_else(|| unsupported(op, a, b));
        }
    }
    sequence_binary(op, a, b)
}

fn int_binary(op: OpCode, x: i64, y: i64) -> RunResult<Value> {
    let checked = match op {
        OpCode::BinaryAdd => x.checked_add(y),
        OpCode::BinarySubtract => x.checked_sub(y),
        OpCode::BinaryMultiply => x.checked_mul(y),
        OpCode::BinaryTrueDivide => {
            if y == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        OpCode::BinaryFloorDivide => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            x.checked_div(y)
                .map(|q| if x % y != 0 && (x < 0) != (y < 0) { q - 1 } else { q })
        }
        OpCode::BinaryModulo => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            x.checked_rem(y).map(|r| if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
        }
        OpCode::BinaryPower => {
            if y < 0 {
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            u32::try_from(y).ok().and_then(|e| x.checked_pow(e))
        }
        OpCode::BinaryLshift => {
            if y < 0 {
                return Err(value_error("negative shift count"));
            }
            if y < 63 && x.unsigned_abs().leading_zeros() as i64 > y + 1 {
                Some(x << y)
            } else {
                None
            }
        }
        OpCode::BinaryRshift => {
            if y < 0 {
                return Err(value_error("negative shift count"));
            }
            Some(x >> y.min(63))
        }
        OpCode::BinaryAnd => Some(x & y),
        OpCode::BinaryOr => Some(x | y),
        OpCode::BinaryXor => Some(x ^ y),
        _ => return Err(unsupported(op, &Value::Int(x), &Value::Int(y))),
    };
    match checked {
        Some(value) => Ok(Value::Int(value)),
        None => big_binary(op, BigInt::from(x), BigInt::from(y)),
    }
}

fn big_binary(op: OpCode, x: BigInt, y: BigInt) -> RunResult<Value> {
    let result = match op {
        OpCode::BinaryAdd => x + y,
        OpCode::BinarySubtract => x - y,
        OpCode::BinaryMultiply => x * y,
        OpCode::BinaryTrueDivide => {
            if y.is_zero() {
                return Err(zero_division("division by zero"));
            }
            let (Some(a), Some(b)) = (x.to_f64(), y.to_f64()) else {
                return Err(crate::runtime::Raised::new(
                    "OverflowError",
                    "integer division result too large for a float",
                ));
            };
            return Ok(Value::Float(a / b));
        }
        OpCode::BinaryFloorDivide | OpCode::BinaryModulo => {
            if y.is_zero() {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let mut q = &x / &y;
            let mut r = &x % &y;
            if !r.is_zero() && (r.is_negative() != y.is_negative()) {
                q -= 1;
                r += &y;
            }
            if op == OpCode::BinaryModulo { r } else { q }
        }
        OpCode::BinaryPower => {
            if y.is_negative() {
                let (a, b) = (x.to_f64().unwrap_or(f64::INFINITY), y.to_f64().unwrap_or(0.0));
                return Ok(Value::Float(a.powf(b)));
            }
            let Some(exponent) = y.to_u32() else {
                return Err(crate::runtime::Raised::new("OverflowError", "exponent too large"));
            };
            if x.bits() > 1 && x.bits().saturating_mul(u64::from(exponent)) > MAX_INT_BITS {
                return Err(crate::runtime::Raised::new("OverflowError", "exponent too large"));
            }
            num_traits::pow(x, exponent as usize)
        }
        OpCode::BinaryLshift => {
            if y.is_negative() {
                return Err(value_error("negative shift count"));
            }
            if x.is_zero() {
                return Ok(Value::Int(0));
            }
            match y.to_u64() {
                Some(shift) if x.bits().saturating_add(shift) <= MAX_INT_BITS => {
                    x << shift as usize
                }
                _ => {
                    return Err(crate::runtime::Raised::new(
                        "OverflowError",
                        "shift count too large",
                    ));
                }
            }
        }
        OpCode::BinaryRshift => {
            if y.is_negative() {
                return Err(value_error("negative shift count"));
            }
            match y.to_usize() {
                Some(shift) => x >> shift,
                // every bit is shifted out
                None if x.is_negative() => BigInt::from(-1),
                None => BigInt::zero(),
            }
        }
        OpCode::BinaryAnd => x & y,
        OpCode::BinaryOr => x | y,
        OpCode::BinaryXor => x ^ y,
        _ => {
            return Err(unsupported(
                op,
                &Value::from_bigint(x),
                &Value::from_bigint(y),
            ));
        }
    };
    Ok(Value::from_bigint(result))
}

fn float_binary(op: OpCode, x: f64, y: f64) -> RunResult<Value> {
    let result = match op {
        OpCode::BinaryAdd => x + y,
        OpCode::BinarySubtract => x - y,
        OpCode::BinaryMultiply => x * y,
        OpCode::BinaryTrueDivide => {
            if y == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            x / y
        }
        OpCode::BinaryFloorDivide => {
            if y == 0.0 {
                return Err(zero_division("float divmod()"));
            }
            (x / y).floor()
        }
        OpCode::BinaryModulo => {
            if y == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }
        }
        OpCode::BinaryPower => x.powf(y),
        _ => return Err(unsupported(op, &Value::Float(x), &Value::Float(y))),
    };
    Ok(Value::Float(result))
}

fn complex_binary(op: OpCode, (a, b): (f64, f64), (c, d): (f64, f64)) -> Option<Value> {
    let (re, im) = match op {
        OpCode::BinaryAdd => (a + c, b + d),
        OpCode::BinarySubtract => (a - c, b - d),
        OpCode::BinaryMultiply => (a * c - b * d, a * d + b * c),
        OpCode::BinaryTrueDivide => {
            let denominator = c * c + d * d;
            if denominator == 0.0 {
                return None;
            }
            ((a * c + b * d) / denominator, (b * c - a * d) / denominator)
        }
        _ => return None,
    };
    Some(Value::Complex(re, im))
}

fn repeat<T: Clone>(items: &[T], times: &Value) -> Option<Vec<T>> {
    let n = times.as_int()?.max(0) as usize;
    let mut out = Vec::with_capacity(items.len() * n);
    for _ in 0..n {
        out.extend_from_slice(items);
    }
    Some(out)
}

fn sequence_binary(op: OpCode, a: &Value, b: &Value) -> RunResult<Value> {
    let result = match (op, a, b) {
        (OpCode::BinaryAdd, Value::Str(x), Value::Str(y)) => {
            Some(Value::str(format!("{}{}", x, y)))
        }
        (OpCode::BinaryAdd, Value::Bytes(x), Value::Bytes(y)) => {
            Some(Value::Bytes(Rc::from([&x[..], &y[..]].concat())))
        }
        (OpCode::BinaryAdd, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Some(Value::list(items))
        }
        (OpCode::BinaryAdd, Value::Tuple(x), Value::Tuple(y)) => {
            Some(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (OpCode::BinaryMultiply, Value::Str(s), n) | (OpCode::BinaryMultiply, n, Value::Str(s)) => {
            n.as_int().map(|n| Value::str(s.repeat(n.max(0) as usize)))
        }
        (OpCode::BinaryMultiply, Value::List(items), n)
        | (OpCode::BinaryMultiply, n, Value::List(items)) => {
            repeat(&items.borrow(), n).map(Value::list)
        }
        (OpCode::BinaryMultiply, Value::Tuple(items), n)
        | (OpCode::BinaryMultiply, n, Value::Tuple(items)) => repeat(items, n).map(Value::tuple),
        (OpCode::BinaryOr, Value::Set(x), Value::Set(y)) => {
            let mut union = x.borrow().clone();
            for key in y.borrow().keys() {
                union.insert(key.clone(), Value::None);
            }
            Some(Value::Set(Rc::new(union.into())))
        }
        (OpCode::BinaryAnd, Value::Set(x), Value::Set(y)) => {
            let y = y.borrow();
            let both: Dict = x
                .borrow()
                .keys()
                .filter(|k| y.contains(k))
                .map(|k| (k.clone(), Value::None))
                .collect();
            Some(Value::Set(Rc::new(both.into())))
        }
        (OpCode::BinarySubtract, Value::Set(x), Value::Set(y)) => {
            let y = y.borrow();
            let rest: Dict = x
                .borrow()
                .keys()
                .filter(|k| !y.contains(k))
                .map(|k| (k.clone(), Value::None))
                .collect();
            Some(Value::Set(Rc::new(rest.into())))
        }
        (OpCode::BinaryOr, Value::Map(x), Value::Map(y)) => {
            let mut merged = x.borrow().clone();
            for (k, v) in y.borrow().iter() {
                merged.insert(k.clone(), v.clone());
            }
            Some(Value::map(merged))
        }
        _ => None,
    };
    result.ok_or_else(|| unsupported(op, a, b))
}

/// Applies a unary opcode.
pub fn unary(op: OpCode, value: &Value) -> RunResult<Value> {
    let result = match (op, value) {
        (OpCode::UnaryNot, v) => Some(Value::Bool(!v.truthy())),
        (OpCode::UnaryPositive, v) if is_number(v) || matches!(v, Value::Complex(..)) => {
            Some(match v {
                Value::Bool(b) => Value::Int(i64::from(*b)),
                other => other.clone(),
            })
        }
        (OpCode::UnaryNegative, Value::Int(i)) => Some(match i.checked_neg() {
            Some(n) => Value::Int(n),
            None => Value::from_bigint(-BigInt::from(*i)),
        }),
        (OpCode::UnaryNegative, Value::Bool(b)) => Some(Value::Int(-i64::from(*b))),
        (OpCode::UnaryNegative, Value::BigInt(n)) => Some(Value::from_bigint(-(**n).clone())),
        (OpCode::UnaryNegative, Value::Float(x)) => Some(Value::Float(-x)),
        (OpCode::UnaryNegative, Value::Complex(re, im)) => Some(Value::Complex(-re, -im)),
        (OpCode::UnaryInvert, Value::Int(i)) => Some(Value::Int(!i)),
        (OpCode::UnaryInvert, Value::Bool(b)) => Some(Value::Int(!i64::from(*b))),
        (OpCode::UnaryInvert, Value::BigInt(n)) => Some(Value::from_bigint(-(**n).clone() - 1)),
        _ => None,
    };
    result.ok_or_else(|| {
        let symbol = match op {
            OpCode::UnaryNegative => "-",
            OpCode::UnaryPositive => "+",
            _ => "~",
        };
        type_error(format!(
            "bad operand type for unary {}: '{}'",
            symbol,
            value.type_name()
        ))
    })
}

// ============================================================================
// Comparison
// ============================================================================

/// Orders two values.
pub fn order(a: &Value, b: &Value) -> Option<Ordering> {
    if is_integer(a) && is_integer(b) {
        if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
            return Some(x.cmp(&y));
        }
        return Some(to_bigint(a)?.cmp(&to_bigint(b)?));
    }
    if is_number(a) && is_number(b) {
        return a.as_float()?.partial_cmp(&b.as_float()?);
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => order_items(&x.borrow(), &y.borrow()),
        (Value::Tuple(x), Value::Tuple(y)) => order_items(x, y),
        _ => None,
    }
}

fn order_items(x: &[Value], y: &[Value]) -> Option<Ordering> {
    for (a, b) in x.iter().zip(y) {
        if a != b {
            return order(a, b);
        }
    }
    Some(x.len().cmp(&y.len()))
}

/// Orders two values or raises `TypeError`.
pub fn order_or_raise(a: &Value, b: &Value, op: &str) -> RunResult<Ordering> {
    order(a, b).ok_or_else(|| {
        type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op,
            a.type_name(),
            b.type_name()
        ))
    })
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> RunResult<bool> {
    let found = match container {
        Value::List(items) => items.borrow().iter().any(|v| v == item),
        Value::Tuple(items) => items.iter().any(|v| v == item),
        Value::Map(dict) | Value::Set(dict) => dict.borrow().contains(item),
        Value::Str(s) => match item {
            Value::Str(needle) => s.contains(&**needle),
            other => {
                return Err(type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                )));
            }
        },
        Value::Bytes(bytes) => match item {
            Value::Int(byte) => bytes.iter().any(|b| i64::from(*b) == *byte),
            Value::Bytes(needle) => {
                needle.is_empty() || bytes.windows(needle.len()).any(|w| w == &needle[..])
            }
            _ => false,
        },
        Value::Range(start, stop, step) => match item.as_int() {
            Some(i) => {
                let len = range_len(*start, *stop, *step);
                let offset = i - start;
                offset % step == 0 && (0..len).contains(&(offset / step))
            }
            None => false,
        },
        other => {
            return Err(type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            )));
        }
    };
    Ok(found)
}

// ============================================================================
// Subscripts
// ============================================================================

/// Resolves a possibly negative index against a length.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let i = if index < 0 { index + len as i64 } else { index };
    (0..len as i64).contains(&i).then_some(i as usize)
}

/// Python slice semantics: the selected positions.
pub fn slice_positions(parts: &[Value; 3], len: usize) -> RunResult<Vec<usize>> {
    let bound = |value: &Value| -> RunResult<Option<i64>> {
        match value {
            Value::None => Ok(None),
            other => other
                .as_int()
                .map(Some)
                .ok_or_else(|| type_error("slice indices must be integers or None")),
        }
    };
    let step = bound(&parts[2])?.unwrap_or(1);
    if step == 0 {
        return Err(value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |value: Option<i64>, default: i64, low: i64, high: i64| match value {
        None => default,
        Some(v) if v < 0 => (v + len).max(low),
        Some(v) => v.min(high),
    };
    let mut positions = Vec::new();
    if step > 0 {
        let start = clamp(bound(&parts[0])?, 0, 0, len);
        let stop = clamp(bound(&parts[1])?, len, 0, len);
        let mut i = start;
        while i < stop {
            positions.push(i as usize);
            i += step;
        }
    } else {
        let start = clamp(bound(&parts[0])?, len - 1, -1, len - 1);
        let stop = clamp(bound(&parts[1])?, -1, -1, len - 1);
        let mut i = start;
        while i > stop {
            positions.push(i as usize);
            i += step;
        }
    }
    Ok(positions)
}

fn index_of(index: &Value, len: usize, kind: &str) -> RunResult<usize> {
    let Some(i) = index.as_int() else {
        return Err(type_error(format!(
            "{} indices must be integers or slices, not {}",
            kind,
            index.type_name()
        )));
    };
    normalize_index(i, len).ok_or_else(|| index_error(format!("{} index out of range", kind)))
}

/// `container[index]` for builtin containers.
pub fn subscript(container: &Value, index: &Value) -> RunResult<Value> {
    match (container, index) {
        (Value::List(items), Value::Slice(parts)) => {
            let items = items.borrow();
            let picked = slice_positions(parts, items.len())?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        (Value::List(items), _) => {
            let items = items.borrow();
            Ok(items[index_of(index, items.len(), "list")?].clone())
        }
        (Value::Tuple(items), Value::Slice(parts)) => {
            let picked = slice_positions(parts, items.len())?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        (Value::Tuple(items), _) => Ok(items[index_of(index, items.len(), "tuple")?].clone()),
        (Value::Str(s), Value::Slice(parts)) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_positions(parts, chars.len())?;
            Ok(Value::str(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        (Value::Str(s), _) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::str(chars[index_of(index, chars.len(), "string")?].to_string()))
        }
        (Value::Bytes(bytes), Value::Slice(parts)) => {
            let picked = slice_positions(parts, bytes.len())?;
            Ok(Value::Bytes(picked.into_iter().map(|i| bytes[i]).collect()))
        }
        (Value::Bytes(bytes), _) => {
            Ok(Value::Int(i64::from(bytes[index_of(index, bytes.len(), "bytes")?])))
        }
        (Value::Range(start, stop, step), _) => {
            let len = range_len(*start, *stop, *step).max(0) as usize;
            let i = index_of(index, len, "range")?;
            Ok(Value::Int(start + step * i as i64))
        }
        (Value::Map(dict), _) => dict.borrow().get(index).cloned().ok_or_else(|| {
            if index.hash_key().is_none() {
                type_error(format!("unhashable type: '{}'", index.type_name()))
            } else {
                key_error(index)
            }
        }),
        _ => Err(type_error(format!(
            "'{}' object is not subscriptable",
            container.type_name()
        ))),
    }
}

/// `container[index] = value` for builtin containers.
pub fn store_subscript(container: &Value, index: &Value, value: Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            if let Value::Slice(parts) = index {
                let positions = slice_positions(parts, items.len())?;
                let replacement = match value {
                    Value::List(other) => other.borrow().clone(),
                    Value::Tuple(other) => other.to_vec(),
                    other => {
                        return Err(type_error(format!(
                            "can only assign an iterable, not {}",
                            other.type_name()
                        )));
                    }
                };
                let contiguous = positions.windows(2).all(|w| w[1] == w[0] + 1);
                if contiguous {
                    let start = positions.first().copied().unwrap_or_else(|| {
                        match parts[0].as_int() {
                            Some(i) if i < 0 => (i + items.len() as i64).max(0) as usize,
                            Some(i) => (i as usize).min(items.len()),
                            None => 0,
                        }
                    });
                    items.splice(start..start + positions.len(), replacement);
                    return Ok(());
                }
                if positions.len() != replacement.len() {
                    return Err(value_error(format!(
                        "attempt to assign sequence of size {} to extended slice of size {}",
                        replacement.len(),
                        positions.len()
                    )));
                }
                for (i, v) in positions.into_iter().zip(replacement) {
                    items[i] = v;
                }
                return Ok(());
            }
            let len = items.len();
            let i = index_of(index, len, "list assignment")?;
            items[i] = value;
            Ok(())
        }
        Value::Map(dict) => {
            if dict.borrow_mut().insert(index.clone(), value) {
                Ok(())
            } else {
                Err(type_error(format!("unhashable type: '{}'", index.type_name())))
            }
        }
        other => Err(type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del container[index]` for builtin containers.
pub fn delete_subscript(container: &Value, index: &Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            if let Value::Slice(parts) = index {
                let mut positions = slice_positions(parts, items.len())?;
                positions.sort_unstable();
                for i in positions.into_iter().rev() {
                    items.remove(i);
                }
                return Ok(());
            }
            let len = items.len();
            let i = index_of(index, len, "list assignment")?;
            items.remove(i);
            Ok(())
        }
        Value::Map(dict) => dict
            .borrow_mut()
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| key_error(index)),
        other => Err(type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn test_floor_semantics() {
        assert_eq!(binary(OpCode::BinaryFloorDivide, &int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(binary(OpCode::BinaryModulo, &int(-7), &int(2)).unwrap(), int(1));
        assert_eq!(binary(OpCode::BinaryModulo, &int(7), &int(-2)).unwrap(), int(-1));
        assert_eq!(
            binary(OpCode::BinaryTrueDivide, &int(7), &int(2)).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn test_overflow_promotes() {
        let big = binary(OpCode::BinaryMultiply, &int(i64::MAX), &int(2)).unwrap();
        assert!(matches!(big, Value::BigInt(_)));
        assert_eq!(big.to_string(), "18446744073709551614");
        let back = binary(OpCode::BinarySubtract, &big, &int(i64::MAX)).unwrap();
        assert_eq!(back, int(i64::MAX));
        let power = binary(OpCode::BinaryPower, &int(2), &int(70)).unwrap();
        assert_eq!(power.to_string(), "1180591620717411303424");
    }

    #[test]
    fn test_huge_shift_raises() {
        let err = binary(OpCode::BinaryLshift, &int(1), &int(100_000_000_000)).unwrap_err();
        assert!(err.describe().starts_with("OverflowError"), "{}", err.describe());
        let err = binary(OpCode::BinaryPower, &int(2), &int(4_000_000_000)).unwrap_err();
        assert!(err.describe().starts_with("OverflowError"));

        let wide = binary(OpCode::BinaryLshift, &int(1), &int(100)).unwrap();
        assert_eq!(wide.to_string(), "1267650600228229401684765589504");
        assert_eq!(binary(OpCode::BinaryLshift, &int(0), &int(1 << 40)).unwrap(), int(0));
        let huge = Value::from_bigint(BigInt::from(1) << 70usize);
        let count = Value::from_bigint(BigInt::from(1) << 80usize);
        assert_eq!(binary(OpCode::BinaryRshift, &huge, &count).unwrap(), int(0));
        let negative = Value::from_bigint(-(BigInt::from(1) << 70usize));
        assert_eq!(binary(OpCode::BinaryRshift, &negative, &count).unwrap(), int(-1));
    }

    #[test]
    fn test_division_by_zero_raises() {
        let err = binary(OpCode::BinaryTrueDivide, &int(1), &int(0)).unwrap_err();
        assert!(err.describe().starts_with("ZeroDivisionError"));
    }

    #[test]
    fn test_sequences() {
        let joined = binary(OpCode::BinaryAdd, &Value::str("ab"), &Value::str("c")).unwrap();
        assert_eq!(joined, Value::str("abc"));
        let repeated = binary(OpCode::BinaryMultiply, &Value::list(vec![int(1)]), &int(3)).unwrap();
        assert_eq!(repeated.to_string(), "[1, 1, 1]");
        assert!(binary(OpCode::BinaryAdd, &Value::str("a"), &int(1)).is_err());
    }

    #[test]
    fn test_slices() {
        let list = Value::list((0..6).map(int).collect());
        let slice = |a: Value, b: Value, c: Value| Value::Slice(Rc::new([a, b, c]));
        let picked = subscript(&list, &slice(int(1), int(5), int(2))).unwrap();
        assert_eq!(picked.to_string(), "[1, 3]");
        let reversed = subscript(&list, &slice(Value::None, Value::None, int(-1))).unwrap();
        assert_eq!(reversed.to_string(), "[5, 4, 3, 2, 1, 0]");
        assert_eq!(subscript(&Value::str("hello"), &int(-1)).unwrap(), Value::str("o"));
        assert!(subscript(&list, &int(6)).is_err());
    }

    #[test]
    fn test_contains_and_order() {
        assert!(contains(&Value::Range(0, 10, 3), &int(9)).unwrap());
        assert!(!contains(&Value::Range(0, 10, 3), &int(8)).unwrap());
        assert!(contains(&Value::str("hello"), &Value::str("ell")).unwrap());
        assert_eq!(order(&int(1), &Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(
            order(
                &Value::tuple(vec![int(1), int(2)]),
                &Value::tuple(vec![int(1)])
            ),
            Some(Ordering::Greater)
        );
        assert!(order_or_raise(&int(1), &Value::str("a"), "<").is_err());
    }
}
