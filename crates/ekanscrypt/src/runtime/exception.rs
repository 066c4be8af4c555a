//! Exceptions raised while executing bytecode.

use super::value::Value;

/// Builtin exception classes, parents first.
pub const EXCEPTION_CLASSES: &[(&str, Option<&str>)] = &[
    ("Exception", None),
    ("ValueError", Some("Exception")),
    ("TypeError", Some("Exception")),
    ("LookupError", Some("Exception")),
    ("KeyError", Some("LookupError")),
    ("IndexError", Some("LookupError")),
    ("NameError", Some("Exception")),
    ("AttributeError", Some("Exception")),
    ("ArithmeticError", Some("Exception")),
    ("ZeroDivisionError", Some("ArithmeticError")),
    ("OverflowError", Some("ArithmeticError")),
    ("StopIteration", Some("Exception")),
    ("RuntimeError", Some("Exception")),
    ("RecursionError", Some("RuntimeError")),
    ("ImportError", Some("Exception")),
    ("OSError", Some("Exception")),
];

/// An exception in flight.
///
/// Natives raise [`Raised::Pending`] without touching the class table;
/// the interpreter turns it into an instance when a handler needs the
/// value.
#[derive(Debug, Clone)]
pub enum Raised {
    /// Builtin exception not yet instantiated
    Pending {
        /// Name of a class in [`EXCEPTION_CLASSES`]
        class: &'static str,
        /// Message
        message: String,
    },
    /// Exception object raised by script code
    Value(Value),
}

impl Raised {
    /// Raises a builtin exception.
    pub fn new(class: &'static str, message: impl Into<String>) -> Self {
        Raised::Pending {
            class,
            message: message.into(),
        }
    }

    /// `ClassName: message`, as reported for an uncaught exception.
    pub fn describe(&self) -> String {
        match self {
            Raised::Pending { class, message } => format!("{}: {}", class, message),
            Raised::Value(value) => {
                let message = value.to_string();
                let class = value.type_name();
                if message.is_empty() || !matches!(value, Value::Instance(_)) {
                    class
                } else {
                    format!("{}: {}", class, message)
                }
            }
        }
    }
}

/// Result of runtime operations.
pub type RunResult<T> = std::result::Result<T, Raised>;

/// `TypeError`
pub fn type_error(message: impl Into<String>) -> Raised {
    Raised::new("TypeError", message)
}

/// `ValueError`
pub fn value_error(message: impl Into<String>) -> Raised {
    Raised::new("ValueError", message)
}

/// `IndexError`
pub fn index_error(message: impl Into<String>) -> Raised {
    Raised::new("IndexError", message)
}

/// `KeyError` for a missing key.
pub fn key_error(key: &Value) -> Raised {
    Raised::new("KeyError", key.repr())
}

/// `NameError` for an unbound name.
pub fn name_error(name: &str) -> Raised {
    Raised::new("NameError", format!("name '{}' is not defined", name))
}

/// `AttributeError` for a missing attribute.
pub fn attribute_error(value: &Value, name: &str) -> Raised {
    Raised::new(
        "AttributeError",
        format!("'{}' object has no attribute '{}'", value.type_name(), name),
    )
}

/// `ZeroDivisionError`
pub fn zero_division(message: &str) -> Raised {
    Raised::new("ZeroDivisionError", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_precede_children() {
        for (i, (_, parent)) in EXCEPTION_CLASSES.iter().enumerate() {
            if let Some(parent) = parent {
                assert!(EXCEPTION_CLASSES[..i].iter().any(|(name, _)| name == parent));
            }
        }
    }

    #[test]
    fn test_describe_pending() {
        assert_eq!(name_error("x").describe(), "NameError: name 'x' is not defined");
    }
}
