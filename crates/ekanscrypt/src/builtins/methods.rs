//! Methods of builtin types, dispatched by receiver type and name.

use super::functions::iterator_of;
use super::{arg, int_arg, str_arg};
use crate::runtime::exception::{
    RunResult, attribute_error, index_error, key_error, type_error, value_error,
};
use crate::runtime::object::Args;
use crate::runtime::value::Value;
use crate::vm::Interpreter;
use crate::vm::operators::normalize_index;

const LIST_METHODS: &[&str] = &["append", "pop", "extend", "insert", "index"];
const STR_METHODS: &[&str] = &[
    "join",
    "split",
    "upper",
    "lower",
    "strip",
    "startswith",
    "endswith",
    "replace",
];
const MAP_METHODS: &[&str] = &["get", "keys", "values", "items", "pop"];
const SET_METHODS: &[&str] = &["add"];
const REGEX_METHODS: &[&str] = &["match", "search", "findall", "sub"];

/// True when `receiver` has a builtin method called `name`.
pub fn has_method(receiver: &Value, name: &str) -> bool {
    let methods = match receiver {
        Value::List(_) => LIST_METHODS,
        Value::Str(_) => STR_METHODS,
        Value::Map(_) => MAP_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Regex(_) => REGEX_METHODS,
        _ => return false,
    };
    methods.iter().any(|method| *method == name)
}

/// Calls the builtin method `name` of `receiver`.
pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Args,
) -> RunResult<Value> {
    match receiver {
        Value::List(_) => list_method(interp, receiver, name, args),
        Value::Str(s) => str_method(interp, s, name, args),
        Value::Map(_) => map_method(receiver, name, args),
        Value::Set(dict) => match name {
            "add" => {
                let item = arg(&args, 0, "add")?.clone();
                let type_name = item.type_name();
                if !dict.borrow_mut().insert(item, Value::None) {
                    return Err(type_error(format!("unhashable type: '{}'", type_name)));
                }
                Ok(Value::None)
            }
            _ => Err(attribute_error(receiver, name)),
        },
        Value::Regex(regex) => {
            let text = str_arg(&args, 0, name)?;
            match name {
                "match" => Ok(regex
                    .find(text)
                    .filter(|m| m.start() == 0)
                    .map_or(Value::None, |m| Value::str(m.as_str()))),
                "search" => Ok(regex.find(text).map_or(Value::None, |m| Value::str(m.as_str()))),
                "findall" => Ok(Value::list(
                    regex.find_iter(text).map(|m| Value::str(m.as_str())).collect(),
                )),
                "sub" => {
                    let subject = str_arg(&args, 1, "sub")?;
                    Ok(Value::str(regex.replace_all(subject, text)))
                }
                _ => Err(attribute_error(receiver, name)),
            }
        }
        _ => Err(attribute_error(receiver, name)),
    }
}

fn list_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Args,
) -> RunResult<Value> {
    let Value::List(list) = receiver else {
        return Err(attribute_error(receiver, name));
    };
    match name {
        "append" => {
            let item = arg(&args, 0, "append")?.clone();
            list.borrow_mut().push(item);
            Ok(Value::None)
        }
        "extend" => {
            let items = interp.collect(arg(&args, 0, "extend")?)?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "insert" => {
            let index = int_arg(&args, 0, "insert")?;
            let item = arg(&args, 1, "insert")?.clone();
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, item);
            Ok(Value::None)
        }
        "pop" => {
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(index_error("pop from empty list"));
            }
            let index = match args.positional.first() {
                Some(_) => int_arg(&args, 0, "pop")?,
                None => -1,
            };
            let at = normalize_index(index, items.len())
                .ok_or_else(|| index_error("pop index out of range"))?;
            Ok(items.remove(at))
        }
        "index" => {
            let needle = arg(&args, 0, "index")?;
            let items = list.borrow().clone();
            for (i, item) in items.iter().enumerate() {
                if interp.equals(item, needle)? {
                    return Ok(Value::Int(i as i64));
                }
            }
            Err(value_error(format!("{} is not in list", needle.repr())))
        }
        _ => Err(attribute_error(receiver, name)),
    }
}

fn str_method(interp: &mut Interpreter, s: &str, name: &str, args: Args) -> RunResult<Value> {
    match name {
        "join" => {
            let mut parts = Vec::new();
            for item in interp.collect(arg(&args, 0, "join")?)? {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            parts.len(),
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::str(parts.join(s)))
        }
        "split" => {
            let parts: Vec<Value> = match args.positional.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::str).collect(),
                Some(_) => {
                    let sep = str_arg(&args, 0, "split")?;
                    if sep.is_empty() {
                        return Err(value_error("empty separator"));
                    }
                    s.split(sep).map(Value::str).collect()
                }
            };
            Ok(Value::list(parts))
        }
        "upper" => Ok(Value::str(s.to_uppercase())),
        "lower" => Ok(Value::str(s.to_lowercase())),
        "strip" => match args.positional.first() {
            None | Some(Value::None) => Ok(Value::str(s.trim())),
            Some(_) => {
                let chars = str_arg(&args, 0, "strip")?;
                Ok(Value::str(s.trim_matches(|c: char| chars.contains(c))))
            }
        },
        "startswith" => Ok(Value::Bool(s.starts_with(str_arg(&args, 0, "startswith")?))),
        "endswith" => Ok(Value::Bool(s.ends_with(str_arg(&args, 0, "endswith")?))),
        "replace" => {
            let old = str_arg(&args, 0, "replace")?;
            let new = str_arg(&args, 1, "replace")?;
            Ok(Value::str(s.replace(old, new)))
        }
        _ => Err(attribute_error(&Value::str(s), name)),
    }
}

fn map_method(receiver: &Value, name: &str, args: Args) -> RunResult<Value> {
    let Value::Map(dict) = receiver else {
        return Err(attribute_error(receiver, name));
    };
    match name {
        "get" => {
            let key = arg(&args, 0, "get")?;
            let default = args.positional.get(1).cloned().unwrap_or(Value::None);
            Ok(dict.borrow().get(key).cloned().unwrap_or(default))
        }
        "keys" => Ok(iterator_of(dict.borrow().keys().cloned().collect())),
        "values" => Ok(iterator_of(dict.borrow().values().cloned().collect())),
        "items" => Ok(iterator_of(
            dict.borrow()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        "pop" => {
            let key = arg(&args, 0, "pop")?;
            match (dict.borrow_mut().remove(key), args.positional.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(key_error(key)),
            }
        }
        _ => Err(attribute_error(receiver, name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Dict;

    fn call(receiver: &Value, name: &str, args: Vec<Value>) -> RunResult<Value> {
        let mut interp = Interpreter::new();
        assert!(has_method(receiver, name), "missing method {}", name);
        call_method(&mut interp, receiver, name, Args::new(args))
    }

    #[test]
    fn test_list_methods() {
        let list = Value::list(vec![Value::Int(1)]);
        call(&list, "append", vec![Value::Int(3)]).unwrap();
        call(&list, "insert", vec![Value::Int(1), Value::Int(2)]).unwrap();
        call(&list, "extend", vec![Value::tuple(vec![Value::Int(4)])]).unwrap();
        assert_eq!(
            list,
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)])
        );
        assert_eq!(call(&list, "index", vec![Value::Int(3)]).unwrap(), Value::Int(2));
        assert_eq!(call(&list, "pop", vec![]).unwrap(), Value::Int(4));
        assert_eq!(call(&list, "pop", vec![Value::Int(0)]).unwrap(), Value::Int(1));
        assert!(call(&list, "index", vec![Value::Int(9)]).is_err());
    }

    #[test]
    fn test_str_methods() {
        let s = Value::str("  a,b  ");
        assert_eq!(call(&s, "strip", vec![]).unwrap(), Value::str("a,b"));
        let parts = call(&Value::str("a,b"), "split", vec![Value::str(",")]).unwrap();
        assert_eq!(parts, Value::list(vec![Value::str("a"), Value::str("b")]));
        assert_eq!(call(&Value::str("-"), "join", vec![parts]).unwrap(), Value::str("a-b"));
        assert_eq!(call(&Value::str("Ab"), "upper", vec![]).unwrap(), Value::str("AB"));
        assert_eq!(
            call(&Value::str("abc"), "startswith", vec![Value::str("ab")]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call(&Value::str("aXa"), "replace", vec![Value::str("a"), Value::str("b")]).unwrap(),
            Value::str("bXb")
        );
    }

    #[test]
    fn test_map_methods() {
        let mut dict = Dict::new();
        dict.insert(Value::str("a"), Value::Int(1));
        let map = Value::map(dict);
        assert_eq!(call(&map, "get", vec![Value::str("a")]).unwrap(), Value::Int(1));
        assert_eq!(
            call(&map, "get", vec![Value::str("z"), Value::Int(0)]).unwrap(),
            Value::Int(0)
        );
        assert_eq!(call(&map, "pop", vec![Value::str("a")]).unwrap(), Value::Int(1));
        assert!(call(&map, "pop", vec![Value::str("a")]).is_err());
    }

    #[test]
    fn test_regex_methods() {
        let regex = Value::Regex(std::rc::Rc::new(regex::Regex::new("b+").unwrap()));
        assert_eq!(call(&regex, "match", vec![Value::str("abb")]).unwrap(), Value::None);
        assert_eq!(call(&regex, "search", vec![Value::str("abb")]).unwrap(), Value::str("bb"));
        assert_eq!(
            call(&regex, "sub", vec![Value::str("-"), Value::str("abba")]).unwrap(),
            Value::str("a-a")
        );
    }
}
