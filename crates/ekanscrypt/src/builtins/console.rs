//! `print`, `eprint` and the sink they write to.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::runtime::exception::{Raised, RunResult};
use crate::runtime::object::Args;
use crate::runtime::value::Value;
use crate::vm::{Frame, Interpreter};

/// Where `print` and `eprint` write.
#[derive(Clone, Default)]
pub enum Output {
    /// The process streams
    #[default]
    Stdout,
    /// An in-memory buffer receiving both streams
    Buffer(Rc<RefCell<String>>),
}

impl Output {
    /// A fresh buffer sink and a handle to read it.
    pub fn buffer() -> (Self, Rc<RefCell<String>>) {
        let buffer = Rc::new(RefCell::new(String::new()));
        (Output::Buffer(buffer.clone()), buffer)
    }

    /// Writes to standard output.
    pub fn write(&self, text: &str) -> io::Result<()> {
        match self {
            Output::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()
            }
            Output::Buffer(buffer) => {
                buffer.borrow_mut().push_str(text);
                Ok(())
            }
        }
    }

    /// Writes to standard error.
    pub fn write_err(&self, text: &str) -> io::Result<()> {
        match self {
            Output::Stdout => {
                let mut stderr = io::stderr().lock();
                stderr.write_all(text.as_bytes())?;
                stderr.flush()
            }
            Output::Buffer(buffer) => {
                buffer.borrow_mut().push_str(text);
                Ok(())
            }
        }
    }
}

/// `print(*values, sep=" ", end="\n")`
pub fn print(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let line = render(interp, &args)?;
    interp.output().write(&line).map_err(os_error)?;
    Ok(Value::None)
}

/// `eprint(*values)`: `print` to standard error.
pub fn eprint(interp: &mut Interpreter, _caller: Option<&Frame>, args: Args) -> RunResult<Value> {
    let line = render(interp, &args)?;
    interp.output().write_err(&line).map_err(os_error)?;
    Ok(Value::None)
}

fn render(interp: &mut Interpreter, args: &Args) -> RunResult<String> {
    let sep = match args.keyword("sep") {
        None | Some(Value::None) => " ".to_string(),
        Some(sep) => sep.to_string(),
    };
    let end = match args.keyword("end") {
        None | Some(Value::None) => "\n".to_string(),
        Some(end) => end.to_string(),
    };
    let mut parts = Vec::with_capacity(args.positional.len());
    for value in &args.positional {
        parts.push(interp.to_str(value)?);
    }
    Ok(parts.join(&sep) + &end)
}

fn os_error(error: io::Error) -> Raised {
    Raised::new("OSError", error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_to_buffer() {
        let (output, buffer) = Output::buffer();
        let mut interp = Interpreter::new().with_output(output);
        let args = Args {
            positional: vec![Value::Int(1), Value::str("a"), Value::None],
            keywords: vec![("sep".to_string(), Value::str(", "))],
        };
        print(&mut interp, None, args).unwrap();
        eprint(&mut interp, None, Args::new(vec![Value::Bool(true)])).unwrap();
        assert_eq!(buffer.borrow().as_str(), "1, a, None\nTrue\n");
    }
}
