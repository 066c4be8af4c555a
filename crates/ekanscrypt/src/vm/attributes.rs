//! Attribute access and the operator protocol of instances.

use std::cmp::Ordering;
use std::rc::Rc;

use super::interpreter::Interpreter;
use super::operators;
use crate::builtins::methods;
use crate::compiler::OpCode;
use crate::runtime::exception::{RunResult, attribute_error, type_error};
use crate::runtime::object::{Args, BoundMethod};
use crate::runtime::value::Value;

/// Comparison operators in `COMPARE_OP` order.
const COMPARISONS: [&str; 6] = ["<", "<=", "==", "!=", ">", ">="];

impl Interpreter {
    /// `object.name`.
    pub(crate) fn get_attr(&mut self, object: &Value, name: &str) -> RunResult<Value> {
        match object {
            Value::Instance(instance) => {
                if name == "__class__" {
                    return Ok(Value::Class(instance.class.clone()));
                }
                if let Some(value) = instance.attrs.borrow().get(name) {
                    return Ok(value.clone());
                }
                if let Some(value) = instance.class.lookup(name) {
                    return Ok(bind(object, value));
                }
                if name == "message" {
                    if let Some(message) = instance.message() {
                        return Ok(Value::str(message));
                    }
                }
            }
            Value::Class(class) => {
                if name == "__name__" {
                    return Ok(Value::str(&class.name));
                }
                if let Some(value) = class.lookup(name) {
                    return Ok(value);
                }
            }
            Value::Module(module) => {
                if let Some(value) = module.attrs.borrow().get(name) {
                    return Ok(value.clone());
                }
                if name == "__name__" {
                    return Ok(Value::str(&module.name));
                }
            }
            Value::Function(function) => match name {
                "__name__" => return Ok(Value::str(function.short_name())),
                "__qualname__" => return Ok(Value::str(&function.name)),
                _ => {}
            },
            other if methods::has_method(other, name) => {
                return Ok(Value::BoundMethod(Rc::new(BoundMethod::Native {
                    receiver: other.clone(),
                    name: name.to_string(),
                })));
            }
            _ => {}
        }
        Err(attribute_error(object, name))
    }

    /// `object.name = value`.
    pub(crate) fn set_attr(&mut self, object: &Value, name: &str, value: Value) -> RunResult<()> {
        let attrs = match object {
            Value::Instance(instance) => &instance.attrs,
            Value::Class(class) => &class.attrs,
            Value::Module(module) => &module.attrs,
            other => {
                return Err(type_error(format!(
                    "cannot set attribute '{}' of '{}' object",
                    name,
                    other.type_name()
                )));
            }
        };
        attrs.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    /// Binary operator, trying the operator method of instances first.
    pub(crate) fn binary(&mut self, op: OpCode, a: &Value, b: &Value) -> RunResult<Value> {
        if let (Value::Instance(_), Some(method)) = (a, operators::method_name(op)) {
            if let Some(result) = self.call_special(a, method, vec![b.clone()])? {
                return Ok(result);
            }
        }
        operators::binary(op, a, b)
    }

    /// `container[index]`.
    pub(crate) fn subscript(&mut self, container: &Value, index: &Value) -> RunResult<Value> {
        if let Value::Instance(_) = container {
            if let Some(result) = self.call_special(container, "__getitem__", vec![index.clone()])? {
                return Ok(result);
            }
        }
        operators::subscript(container, index)
    }

    /// `container[index] = value`.
    pub(crate) fn store_subscript(
        &mut self,
        container: &Value,
        index: &Value,
        value: Value,
    ) -> RunResult<()> {
        if let Value::Instance(_) = container {
            let args = vec![index.clone(), value.clone()];
            if self.call_special(container, "__setitem__", args)?.is_some() {
                return Ok(());
            }
        }
        operators::store_subscript(container, index, value)
    }

    /// `del container[index]`.
    pub(crate) fn delete_subscript(&mut self, container: &Value, index: &Value) -> RunResult<()> {
        if let Value::Instance(_) = container {
            if self
                .call_special(container, "__delitem__", vec![index.clone()])?
                .is_some()
            {
                return Ok(());
            }
        }
        operators::delete_subscript(container, index)
    }

    /// `COMPARE_OP`.
    pub(crate) fn compare(&mut self, index: usize, a: &Value, b: &Value) -> RunResult<Value> {
        let result = match index {
            0 | 1 | 4 | 5 => self.ordering(index, a, b)?,
            2 => self.equals(a, b)?,
            3 => !self.equals(a, b)?,
            6 => self.contains(b, a)?,
            7 => !self.contains(b, a)?,
            8 => a.is(b),
            9 => !a.is(b),
            10 => exception_matches(a, b)?,
            other => {
                return Err(type_error(format!("unknown comparison {}", other)));
            }
        };
        Ok(Value::Bool(result))
    }

    fn ordering(&mut self, index: usize, a: &Value, b: &Value) -> RunResult<bool> {
        let op = COMPARISONS[index];
        if let Value::Instance(_) = a {
            let method = match index {
                0 => "__lt__",
                1 => "__le__",
                4 => "__gt__",
                _ => "__ge__",
            };
            if let Some(result) = self.call_special(a, method, vec![b.clone()])? {
                return Ok(result.truthy());
            }
        }
        // Unordered floats compare false under every operator.
        if let (Some(x), Some(y)) = (a.as_float(), b.as_float()) {
            if x.is_nan() || y.is_nan() {
                return Ok(false);
            }
        }
        let ordering = operators::order_or_raise(a, b, op)?;
        Ok(match index {
            0 => ordering == Ordering::Less,
            1 => ordering != Ordering::Greater,
            4 => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        })
    }

    /// `a == b`, honouring `__eq__`.
    pub(crate) fn equals(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        if let Value::Instance(_) = a {
            if let Some(result) = self.call_special(a, "__eq__", vec![b.clone()])? {
                return Ok(result.truthy());
            }
        }
        Ok(a == b)
    }

    /// `item in container`.
    pub(crate) fn contains(&mut self, container: &Value, item: &Value) -> RunResult<bool> {
        match container {
            Value::Instance(_) => {
                if let Some(result) =
                    self.call_special(container, "__contains__", vec![item.clone()])?
                {
                    return Ok(result.truthy());
                }
                self.search(container, item)
            }
            Value::Iterator(_) | Value::Generator(_) => self.search(container, item),
            other => operators::contains(other, item),
        }
    }

    fn search(&mut self, iterable: &Value, item: &Value) -> RunResult<bool> {
        let iterator = self.iterate(iterable)?;
        while let Some(value) = self.next(&iterator)? {
            if self.equals(&value, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `str(value)`, honouring `__str__`.
    pub(crate) fn to_str(&mut self, value: &Value) -> RunResult<String> {
        if let Value::Instance(_) = value {
            if let Some(result) = self.call_special(value, "__str__", Vec::new())? {
                return Ok(result.to_string());
            }
            if let Some(result) = self.call_special(value, "__repr__", Vec::new())? {
                return Ok(result.to_string());
            }
        }
        Ok(value.to_string())
    }

    /// `repr(value)`, honouring `__repr__`.
    pub(crate) fn repr_of(&mut self, value: &Value) -> RunResult<String> {
        if let Value::Instance(_) = value {
            if let Some(result) = self.call_special(value, "__repr__", Vec::new())? {
                return Ok(result.to_string());
            }
        }
        Ok(value.repr())
    }

    /// Calls an operator method found on the class of an instance.
    fn call_special(
        &mut self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> RunResult<Option<Value>> {
        let Value::Instance(instance) = receiver else {
            return Ok(None);
        };
        let Some(function) = instance.class.lookup(method) else {
            return Ok(None);
        };
        let mut positional = Vec::with_capacity(args.len() + 1);
        positional.push(receiver.clone());
        positional.extend(args);
        self.call_value(&function, Args::new(positional), None)
            .map(Some)
    }
}

/// Binds functions found on a class to the instance they were read from.
fn bind(receiver: &Value, value: Value) -> Value {
    match value {
        Value::Function(_) => Value::BoundMethod(Rc::new(BoundMethod::Function {
            receiver: receiver.clone(),
            function: value,
        })),
        other => other,
    }
}

/// Whether a raised exception is caught by a filter: a class or a tuple
/// of classes.
fn exception_matches(exception: &Value, filter: &Value) -> RunResult<bool> {
    match filter {
        Value::Tuple(filters) => {
            for filter in filters.iter() {
                if exception_matches(exception, filter)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Class(class) => Ok(match exception {
            Value::Instance(instance) => instance.class.is_subclass(class),
            Value::Class(raised) => raised.is_subclass(class),
            _ => false,
        }),
        other => Err(type_error(format!(
            "catching '{}' is not allowed; catch an exception class",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::object::{Class, Instance};

    #[test]
    fn test_exception_matches_through_bases() {
        let base = Rc::new(Class::new("Exception", vec![]));
        let lookup = Rc::new(Class::new("LookupError", vec![base.clone()]));
        let key = Rc::new(Class::new("KeyError", vec![lookup.clone()]));
        let raised = Value::Instance(Rc::new(Instance::new(key)));

        assert!(exception_matches(&raised, &Value::Class(lookup.clone())).unwrap());
        assert!(exception_matches(&raised, &Value::Class(base)).unwrap());
        let other = Rc::new(Class::new("ValueError", vec![]));
        assert!(!exception_matches(&raised, &Value::Class(other.clone())).unwrap());
        let either = Value::tuple(vec![Value::Class(other), Value::Class(lookup)]);
        assert!(exception_matches(&raised, &either).unwrap());
        assert!(exception_matches(&raised, &Value::Int(1)).is_err());
    }

    #[test]
    fn test_nan_orders_false() {
        let mut interp = Interpreter::new();
        let nan = Value::Float(f64::NAN);
        for index in [0, 1, 4, 5] {
            assert_eq!(interp.compare(index, &nan, &Value::Int(1)).unwrap(), Value::Bool(false));
        }
        assert_eq!(interp.compare(0, &Value::Int(1), &Value::Float(1.5)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_native_method_binding() {
        let mut interp = Interpreter::new();
        let list = Value::list(vec![]);
        let append = interp.get_attr(&list, "append").unwrap();
        interp.call(&append, vec![Value::Int(7)]).unwrap();
        assert_eq!(list, Value::list(vec![Value::Int(7)]));
        assert!(interp.get_attr(&list, "nope").is_err());
    }
}
