//! Builtin functions, classes and methods of builtin types.
//!
//! - `console` - `print` and `eprint` and the output sink
//! - `functions` - conversions, iteration helpers and `__build_class__`
//! - `helpers` - runtime support for drill-down and string literals
//! - `methods` - methods of lists, strings, maps, sets and regexes

pub mod console;
pub mod functions;
pub mod helpers;
pub mod methods;

pub use console::Output;

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::runtime::exception::{EXCEPTION_CLASSES, RunResult, type_error};
use crate::runtime::object::{Args, Builtin, Class, NativeFn};
use crate::runtime::value::Value;

/// Register all builtin functions and classes.
pub fn register_builtins() -> FxHashMap<String, Value> {
    let mut globals = FxHashMap::default();

    register_console(&mut globals);
    register_functions(&mut globals);
    register_helpers(&mut globals);
    register_classes(&mut globals);

    globals.insert("nan".to_string(), Value::Float(f64::NAN));
    globals.insert("infinity".to_string(), Value::Float(f64::INFINITY));

    globals
}

fn native(globals: &mut FxHashMap<String, Value>, name: &str, func: NativeFn) {
    globals.insert(name.to_string(), Builtin::value(name, func));
}

fn register_console(globals: &mut FxHashMap<String, Value>) {
    native(globals, "print", console::print);
    native(globals, "eprint", console::eprint);
}

fn register_functions(globals: &mut FxHashMap<String, Value>) {
    native(globals, "range", functions::range);
    native(globals, "len", functions::len);
    native(globals, "str", functions::str);
    native(globals, "int", functions::int);
    native(globals, "float", functions::float);
    native(globals, "bool", functions::bool);
    native(globals, "list", functions::list);
    native(globals, "tuple", functions::tuple);
    native(globals, "dict", functions::dict);
    native(globals, "set", functions::set);
    native(globals, "isinstance", functions::isinstance);
    native(globals, "repr", functions::repr);
    native(globals, "abs", functions::abs);
    native(globals, "min", functions::min);
    native(globals, "max", functions::max);
    native(globals, "sum", functions::sum);
    native(globals, "sorted", functions::sorted);
    native(globals, "iter", functions::iter);
    native(globals, "next", functions::next);
    native(globals, "__build_class__", functions::build_class);
}

fn register_helpers(globals: &mut FxHashMap<String, Value>) {
    native(globals, "__es_drill__", helpers::drill);
    native(globals, "__es_format__", helpers::format);
    native(globals, "__es_glob__", helpers::glob);
    native(globals, "__es_regex__", helpers::regex);
}

/// `object` and the exception hierarchy rooted at it.
fn register_classes(globals: &mut FxHashMap<String, Value>) {
    let object = Rc::new(Class::new("object", Vec::new()));
    globals.insert("object".to_string(), Value::Class(object.clone()));

    for (name, parent) in EXCEPTION_CLASSES {
        let base = match parent {
            Some(parent) => match globals.get(*parent) {
                Some(Value::Class(class)) => class.clone(),
                _ => object.clone(),
            },
            None => object.clone(),
        };
        let class = Class::new(*name, vec![base]);
        globals.insert(name.to_string(), Value::Class(Rc::new(class)));
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Positional argument `index`, or a `TypeError` naming the function.
pub(crate) fn arg<'a>(args: &'a Args, index: usize, function: &str) -> RunResult<&'a Value> {
    args.positional.get(index).ok_or_else(|| {
        type_error(format!(
            "{}() missing required argument {}",
            function,
            index + 1
        ))
    })
}

/// Rejects calls with more than `max` positional arguments.
pub(crate) fn at_most(args: &Args, max: usize, function: &str) -> RunResult<()> {
    if args.positional.len() > max {
        return Err(type_error(format!(
            "{}() takes at most {} arguments ({} given)",
            function,
            max,
            args.positional.len()
        )));
    }
    Ok(())
}

/// String argument `index`.
pub(crate) fn str_arg<'a>(args: &'a Args, index: usize, function: &str) -> RunResult<&'a str> {
    match arg(args, index, function)? {
        Value::Str(s) => Ok(s),
        other => Err(type_error(format!(
            "{}() argument {} must be str, not {}",
            function,
            index + 1,
            other.type_name()
        ))),
    }
}

/// Integer argument `index`.
pub(crate) fn int_arg(args: &Args, index: usize, function: &str) -> RunResult<i64> {
    let value = arg(args, index, function)?;
    value.as_int().ok_or_else(|| {
        type_error(format!(
            "{}() argument {} must be int, not {}",
            function,
            index + 1,
            value.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_hierarchy() {
        let globals = register_builtins();
        let Some(Value::Class(key)) = globals.get("KeyError") else {
            panic!("KeyError missing");
        };
        let Some(Value::Class(lookup)) = globals.get("LookupError") else {
            panic!("LookupError missing");
        };
        let Some(Value::Class(object)) = globals.get("object") else {
            panic!("object missing");
        };
        assert!(key.is_subclass(lookup));
        assert!(key.is_subclass(object));
        assert!(key.is_exception());
        assert!(!object.is_exception());
    }

    #[test]
    fn test_constants() {
        let globals = register_builtins();
        assert!(matches!(globals.get("nan"), Some(Value::Float(x)) if x.is_nan()));
        assert_eq!(globals.get("infinity"), Some(&Value::Float(f64::INFINITY)));
        assert!(globals.contains_key("__es_format__"));
    }
}
