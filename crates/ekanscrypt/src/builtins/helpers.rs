//! Runtime support emitted by the compiler: nil-safe drill-down and the
//! format, glob and regex string literals.

use std::rc::Rc;

use super::{arg, str_arg};
use crate::runtime::exception::{RunResult, value_error};
use crate::runtime::object::Args;
use crate::runtime::value::Value;
use crate::vm::operators::normalize_index;
use crate::vm::{Frame, Interpreter};

/// `a->b`: the element, key or attribute `b` of `a`, or none when any of
/// them is missing.
pub fn drill(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let container = arg(&args, 0, "__es_drill__")?;
    let key = arg(&args, 1, "__es_drill__")?;
    let found = match (container, key) {
        (Value::None, _) => None,
        (Value::List(items), Value::Int(i)) => {
            let items = items.borrow();
            usize::try_from(*i).ok().and_then(|i| items.get(i).cloned())
        }
        (Value::Tuple(items), Value::Int(i)) => {
            normalize_index(*i, items.len()).map(|i| items[i].clone())
        }
        (Value::Map(dict), key) => dict.borrow().get(key).cloned(),
        (_, Value::Str(name)) => interp.get_attr(container, name).ok(),
        _ => None,
    };
    Ok(found.unwrap_or(Value::None))
}

/// `f"..."`: replaces every `${name}`.
pub fn format(interp: &mut Interpreter, caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let text = str_arg(&args, 0, "__es_format__")?;
    Ok(Value::str(substitute(interp, caller, text)?))
}

/// `g"..."`: formats, then expands the glob pattern into a list of paths.
pub fn glob(interp: &mut Interpreter, caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let text = str_arg(&args, 0, "__es_glob__")?;
    let pattern = substitute(interp, caller, text)?;
    let paths = glob::glob(&pattern)
        .map_err(|e| value_error(format!("invalid glob pattern '{}': {}", pattern, e)))?;
    let matches = paths
        .filter_map(|entry| entry.ok())
        .map(|path| Value::str(path.to_string_lossy()))
        .collect();
    Ok(Value::list(matches))
}

/// `r"..."`: compiles a regular expression.
pub fn regex(_interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let pattern = str_arg(&args, 0, "__es_regex__")?;
    let regex = regex::Regex::new(pattern)
        .map_err(|e| value_error(format!("invalid regular expression: {}", e)))?;
    Ok(Value::Regex(Rc::new(regex)))
}

/// Scans right to left for `$`, and replaces the label between the next
/// `{` and `}` with the caller's variable, a global, an environment
/// variable, or nothing.
fn substitute(interp: &mut Interpreter, caller: Option<&Frame>, text: &str) -> RunResult<String> {
    let mut text = text.to_string();
    let mut index = text.len();
    while index > 0 {
        index -= 1;
        if text.as_bytes()[index] != b'$' {
            continue;
        }
        let open = text[index..].find('{').map(|p| p + index);
        let close = text[index..].find('}').map(|p| p + index);
        let (Some(open), Some(close)) = (open, close) else {
            continue;
        };
        if open >= close {
            continue;
        }
        let label = &text[open + 1..close];
        let replacement = match caller.and_then(|frame| frame.lookup(label)) {
            Some(value) => interp.to_str(&value)?,
            None => std::env::var(label).unwrap_or_default(),
        };
        text.replace_range(index..=close, &replacement);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Dict;

    fn call(func: crate::runtime::object::NativeFn, args: Vec<Value>) -> RunResult<Value> {
        let mut interp = Interpreter::new();
        func(&mut interp, None, Args::new(args))
    }

    #[test]
    fn test_drill() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(call(drill, vec![list.clone(), Value::Int(1)]).unwrap(), Value::Int(2));
        assert_eq!(call(drill, vec![list.clone(), Value::Int(5)]).unwrap(), Value::None);
        assert_eq!(call(drill, vec![list, Value::Int(-1)]).unwrap(), Value::None);
        assert_eq!(call(drill, vec![Value::None, Value::str("a")]).unwrap(), Value::None);

        let mut dict = Dict::new();
        dict.insert(Value::str("k"), Value::Int(7));
        let map = Value::map(dict);
        assert_eq!(call(drill, vec![map.clone(), Value::str("k")]).unwrap(), Value::Int(7));
        assert_eq!(call(drill, vec![map, Value::str("z")]).unwrap(), Value::None);
    }

    #[test]
    fn test_format_without_frame_uses_environment() {
        let text = Value::str("home=${EKANS_TEST_UNSET_VARIABLE}!");
        assert_eq!(call(format, vec![text]).unwrap(), Value::str("home=!"));
        let loose = Value::str("cost: $5 {ekans_unset_label}");
        assert_eq!(call(format, vec![loose]).unwrap(), Value::str("cost: "));
    }

    #[test]
    fn test_regex() {
        assert!(matches!(call(regex, vec![Value::str("a+b")]).unwrap(), Value::Regex(_)));
        assert!(call(regex, vec![Value::str("(")]).is_err());
    }
}
