//! End-to-end tests: source text through the compiler and the reference
//! interpreter.

use std::fs;

use ekanscrypt::{Engine, EngineConfig, Error, Output, Value};
use tempfile::TempDir;

/// Evaluates `source` in a fresh session and returns the value and
/// everything printed.
fn run(source: &str) -> (Value, String) {
    let (output, buffer) = Output::buffer();
    let mut engine = Engine::new().with_output(output);
    let value = engine
        .eval(source)
        .unwrap_or_else(|e| panic!("{:?} failed: {}", source, e));
    let printed = buffer.borrow().clone();
    (value, printed)
}

fn eval(source: &str) -> Value {
    run(source).0
}

fn ints(values: &[i64]) -> Value {
    Value::list(values.iter().map(|&v| Value::Int(v)).collect())
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_reassignment() {
    assert_eq!(eval("x=1; x=x+2"), Value::Int(3));
}

#[test]
fn test_shadowing_inside_lambda() {
    let (_, printed) = run("a=1; C=()=>{a+=1; var a=5; return a}; print(a, C(), a)");
    assert_eq!(printed, "1 5 2\n");
}

#[test]
fn test_closures_are_isolated() {
    let value = eval(
        "f = () => {x=0; return () => {x += 1}}
         g1 = f(); g2 = f()
         [g1(), g2(), g1()]",
    );
    assert_eq!(value, ints(&[1, 1, 2]));
}

#[test]
fn test_for_visits_all_and_yields_none() {
    assert_eq!(eval("for a in [1,2,3] {a}"), Value::None);

    let (output, _) = Output::buffer();
    let mut engine = Engine::new().with_output(output);
    engine.eval("seen = []").unwrap();
    engine.eval("for a in [1,2,3] { seen.append(a) }").unwrap();
    assert_eq!(engine.eval("seen").unwrap(), ints(&[1, 2, 3]));
}

#[test]
fn test_catch_binding_is_local_to_handler() {
    let mut engine = Engine::new();
    engine
        .eval("class E(Exception) { code = 7 }; try { raise E('boom') } catch E as e { got = e.code }")
        .unwrap();
    assert_eq!(engine.eval("got").unwrap(), Value::Int(7));
    assert!(matches!(engine.eval("e"), Err(Error::Runtime(_))));
}

#[test]
fn test_optional_attribute_on_null() {
    assert_eq!(eval("a = null; a?.b"), Value::None);
}

#[test]
fn test_nested_long_loops_converge() {
    let body = vec!["total = total + 0"; 150].join("; ");
    let source = format!(
        "total = 0
         for i in range(3) {{ for j in range(2) {{ total = total + 1; {} }} }}
         total",
        body
    );
    assert_eq!(eval(&source), Value::Int(6));
}

// ============================================================================
// Language features
// ============================================================================

#[test]
fn test_while_with_break_and_continue() {
    let value = eval(
        "n = 0; odd = []
         while true { n += 1; if n > 7 { break }; if n % 2 == 0 { continue }; odd.append(n) }
         odd",
    );
    assert_eq!(value, ints(&[1, 3, 5, 7]));
}

#[test]
fn test_default_and_keyword_arguments() {
    assert_eq!(eval("f = (a, b=10) => a - b; f(1)"), Value::Int(-9));
    assert_eq!(eval("f = (a, b=10) => a - b; f(b=1, a=5)"), Value::Int(4));
}

#[test]
fn test_comprehensions() {
    assert_eq!(eval("[x * x for x in range(5) if x % 2]"), ints(&[1, 9]));
    assert_eq!(eval("d = {k: k + 1 for k in [1, 2]}; d[2]"), Value::Int(3));
}

#[test]
fn test_class_methods_and_state() {
    let value = eval(
        "class Counter(object) { n = 0; bump(self) => { self.n = self.n + 1; return self.n } }
         c = Counter(); c.bump(); c.bump()",
    );
    assert_eq!(value, Value::Int(2));
}

#[test]
fn test_finally_runs_on_return() {
    let (value, printed) = run("f = () => { try { return 1 } finally { print('done') } }; f()");
    assert_eq!(value, Value::Int(1));
    assert_eq!(printed, "done\n");
}

#[test]
fn test_uncaught_exception_message() {
    let mut engine = Engine::new();
    let Err(Error::Runtime(message)) = engine.eval("[1, 2][5]") else {
        panic!("expected a runtime error");
    };
    assert!(message.starts_with("IndexError"), "{}", message);
}

#[test]
fn test_syntax_error_renders_excerpt() {
    let mut engine = Engine::new();
    let source = "x = 1\ny = (";
    let error = engine.eval(source).unwrap_err();
    assert!(error.diagnostic().is_some());
    let rendered = error.render("<stdin>", source);
    assert!(rendered.starts_with("Syntax Error in File <stdin> at line"));
    assert!(rendered.contains('^'));
}

// ============================================================================
// Modules
// ============================================================================

#[test]
fn test_import_and_from_import() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("util.es"), "double = (x) => x * 2; _hidden = 1").unwrap();
    fs::create_dir_all(dir.path().join("pkg")).unwrap();
    fs::write(dir.path().join("pkg").join("__init__.es"), "name = 'pkg'").unwrap();
    fs::write(dir.path().join("pkg").join("leaf.es"), "value = 42").unwrap();

    let config = EngineConfig {
        search_paths: vec![dir.path().to_path_buf()],
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_config(config);
    assert_eq!(engine.eval("import util; util.double(21)").unwrap(), Value::Int(42));
    assert_eq!(engine.eval("from util import double; double(4)").unwrap(), Value::Int(8));
    assert_eq!(engine.eval("import pkg.leaf; pkg.leaf.value").unwrap(), Value::Int(42));
    assert!(engine.eval("from util import _hidden").is_err());
    assert!(engine.eval("import missing").is_err());
}

#[test]
fn test_run_file_returns_exports() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("main.es");
    fs::write(&path, "answer = 6 * 7\nprint('ran')").unwrap();

    let (output, buffer) = Output::buffer();
    let mut engine = Engine::new().with_output(output);
    let Value::Map(exports) = engine.run_file(&path).unwrap() else {
        panic!("expected an export map");
    };
    assert_eq!(
        exports.borrow().get(&Value::str("answer")),
        Some(&Value::Int(42))
    );
    assert_eq!(buffer.borrow().as_str(), "ran\n");
}
