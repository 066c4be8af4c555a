//! Tests for the grouping engine.

use super::*;
use crate::error::Error;
use crate::lexer::tokenize;

fn parse_source(src: &str) -> Result<Vec<Node>> {
    parse(tokenize(src)?)
}

fn sexpr(src: &str) -> Vec<String> {
    parse_source(src)
        .expect("source should parse")
        .iter()
        .map(Node::to_sexpr)
        .collect()
}

fn one(src: &str) -> String {
    let forest = sexpr(src);
    assert_eq!(forest.len(), 1, "expected one statement in {:?}", forest);
    forest.into_iter().next().unwrap()
}

fn parse_error(src: &str) -> String {
    match parse_source(src) {
        Err(Error::Parse(diag)) => diag.message,
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_precedence() {
    assert_eq!(one("x = 1 + 2 * 3"), "(= x (+ 1 (* 2 3)))");
    assert_eq!(one("a || b && c"), "(|| a (&& b c))");
    assert_eq!(one("2 ** 3 ** 2"), "(** (** 2 3) 2)");
    assert_eq!(one("a = b = c"), "(= a (= b c))");
    assert_eq!(one("x += y | z"), "(+= x (| y z))");
}

#[test]
fn test_unary_operators() {
    assert_eq!(one("x = -y"), "(= x (pre- y))");
    assert_eq!(one("- - 1"), "(pre- (pre- 1))");
    assert_eq!(one("a - -1"), "(- a (pre- 1))");
    assert_eq!(one("!a && b"), "(&& (pre! a) b)");
    assert_eq!(one("not a"), "(pre! a)");
    assert_eq!(one("x++"), "(post++ x)");
    assert_eq!(one("++x"), "(pre++ x)");
}

#[test]
fn test_statements_split_on_newlines() {
    let forest = sexpr("x = 1\ny = 2; z = 3\n");
    assert_eq!(forest, vec!["(= x 1)", "(= y 2)", "(= z 3)"]);
}

#[test]
fn test_calls_and_access() {
    assert_eq!(one("f(a, b)"), "(call f a b)");
    assert_eq!(one("f()"), "(call f)");
    assert_eq!(one("f(a)(b)"), "(call (call f a) b)");
    assert_eq!(one("x.y.z"), "(attr (attr x .y) .z)");
    assert_eq!(one("a.b(c)"), "(call (attr a .b) c)");
    assert_eq!(one("x[1:2]"), "(subscr x (slice 1 2))");
    assert_eq!(one("x[:2]"), "(subscr x (slice _ 2))");
    assert_eq!(one("[1, 2][0]"), "(subscr (list 1 2) 0)");
    assert_eq!(one("f(a=1, *b, **c)"), "(call f (= a 1) (pre* b) (pre** c))");
}

#[test]
fn test_optional_attr_and_drill() {
    assert_eq!(one("x = a?.b"), "(= x (?. a .b))");
    assert_eq!(one("a?.(1)"), "(call (?. a) 1)");
    assert_eq!(one("a->b"), "(call __es_drill__ a \"b\")");
    assert_eq!(one("a->0"), "(call __es_drill__ a 0)");
}

#[test]
fn test_containers() {
    assert_eq!(one("[1, 2, 3]"), "(list 1 2 3)");
    assert_eq!(one("x = ()"), "(= x (tuple))");
    assert_eq!(one("x = (1, 2)"), "(= x (tuple 1 2))");
    assert_eq!(one("x = (1)"), "(= x 1)");
    assert_eq!(one("x = {}"), "(= x (set))");
    assert_eq!(one("x = {1, 2}"), "(= x (set 1 2))");
    assert_eq!(one("x = {\"a\": 1}"), "(= x (map \"a\" 1))");
    assert_eq!(one("x = {\"a\": 1, \"b\": 2}"), "(= x (map \"a\" 1 \"b\" 2))");
    assert_eq!(one("x = {\"a\": 1, **y}"), "(= x (map \"a\" 1 (pre** y)))");
    assert_eq!(one("a, b = b, a"), "(= (tuple a b) (tuple b a))");
}

#[test]
fn test_string_concatenation() {
    assert_eq!(one("x = \"a\" \"b\" 'c'"), "(= x \"abc\")");
}

#[test]
fn test_comparison_chain() {
    assert_eq!(one("a < b"), "(< a b)");
    assert_eq!(one("a < b < c"), "(cmp a < b < c)");
    assert_eq!(one("a <= b == c != d"), "(cmp a <= b == c != d)");
    assert_eq!(one("a is not b"), "(is not a b)");
    assert_eq!(one("a not in b"), "(not in a b)");
}

#[test]
fn test_ternary() {
    assert_eq!(one("x = a ? b : c"), "(= x (if a b c))");
    assert_eq!(parse_error("a ? b"), "expected ':' in conditional expression");
}

#[test]
fn test_lambdas() {
    assert_eq!(
        one("f = (x, y=2) => x + y"),
        "(= f (lambda (params x (= y 2)) (freevars) (+ x y)))"
    );
    assert_eq!(one("x => x"), "(lambda (params x) (freevars) x)");
    assert_eq!(one("f(n) => n"), "(lambda f (params n) (freevars) n)");
    assert_eq!(
        one("(x) => {x}(1)"),
        "(call (lambda (params x) (freevars) x) 1)"
    );
    assert_eq!(
        one("() => {return\nx}"),
        "(lambda (params) (freevars) (block (return) x))"
    );
    assert_eq!(
        parse_error("1 => 2"),
        "invalid function definition. expected label"
    );
}

#[test]
fn test_shadowing_program_shape() {
    let forest = sexpr("a = 1; C = () => {a += 1; var a = 5; return a}; print(a, C(), a)");
    assert_eq!(
        forest,
        vec![
            "(= a 1)",
            "(= C (lambda (params) (freevars) (block (+= a 1) (= (var a) 5) (return a))))",
            "(call print a (call C) a)",
        ]
    );
}

#[test]
fn test_branches() {
    assert_eq!(one("if x { y }"), "(if x y _)");
    assert_eq!(
        one("if x > 1 { y } else if x < 0 { z } else { w }"),
        "(if (> x 1) y (if (< x 0) z w))"
    );
    assert_eq!(one("if x {\n  y\n}\nelse {\n  z\n}"), "(if x y z)");
    assert_eq!(parse_error("else { x }"), "else without matching if");
}

#[test]
fn test_loops() {
    assert_eq!(
        one("for a in [1, 2, 3] { print(a) }"),
        "(for a (list 1 2 3) (call print a))"
    );
    assert_eq!(one("for k, v in d { k }"), "(for (tuple k v) d k)");
    assert_eq!(one("while x { x -= 1 }"), "(while x (-= x 1))");
    assert_eq!(one("do { x } while y"), "(do x y)");
    assert_eq!(
        one("while 1 { break 2; continue }"),
        "(while 1 (block (break 2) (continue)))"
    );
    assert_eq!(parse_error("do { x } y"), "expected keyword while");
    assert_eq!(parse_error("for x { y }"), "expected 'in'");
    assert_eq!(parse_error("while 1 { break x }"), "Unexpected symbol after break");
}

#[test]
fn test_comprehensions() {
    assert_eq!(
        one("[x * 2 for x in xs if x > 1]"),
        "(listcomp (for x xs (if (> x 1))) (* x 2))"
    );
    assert_eq!(
        one("f(x for x in xs)"),
        "(call f (listcomp (for x xs) x))"
    );
    assert_eq!(
        one("{x for x in xs}"),
        "(setcomp (for x xs) x)"
    );
    assert_eq!(
        one("{k: v for k, v in items}"),
        "(dictcomp (for (tuple k v) items) (slice k v))"
    );
}

#[test]
fn test_switch() {
    assert_eq!(
        one("switch x { case 1 { a } case 2 default { b } }"),
        "(switch x (case 1 a) (case 2) (default b))"
    );
    assert_eq!(parse_error("switch x y"), "expected block");
}

#[test]
fn test_try_catch() {
    assert_eq!(
        one("try { f() } catch E as e { h(e) } finally { g() }"),
        "(try (call f) (catch (as E e) (call h e)) (finally (call g)))"
    );
    assert_eq!(
        one("try { f() }\ncatch E { h() }"),
        "(try (call f) (catch E (call h)))"
    );
    assert_eq!(parse_error("try { f() }"), "missing catch or finally block");
    assert_eq!(
        parse_error("catch E { x }"),
        "unexpected catch without matching try"
    );
}

#[test]
fn test_with() {
    assert_eq!(one("with f = open(p) { f }"), "(with (= f (call open p)) f)");
    assert_eq!(one("with (lock) { x }"), "(with lock x)");
}

#[test]
fn test_declarations() {
    assert_eq!(one("var x = 1"), "(= (var x) 1)");
    assert_eq!(one("final x = 1"), "(= (final x) 1)");
    assert_eq!(one("static x"), "(static x)");
}

#[test]
fn test_yield() {
    assert_eq!(one("yield x"), "(yield x)");
    assert_eq!(one("yield from xs"), "(yieldfrom xs)");
}

#[test]
fn test_class() {
    assert_eq!(
        one("class A(B) { x = 1 }"),
        "(class A (bases B) (lambda cls.A (params) (freevars) \
         (block (cellvars &__class__) (classinit A) (= x 1) (classcell A))))"
    );
    assert_eq!(
        parse_error("class A { }"),
        "expected class name and parameter list"
    );
}

#[test]
fn test_decorator() {
    assert_eq!(
        one("@memo\nfib(n) => n"),
        "(= fib (call memo (lambda fib (params n) (freevars) n)))"
    );
    assert_eq!(one("@wrap\nx"), "(call wrap x)");
}

#[test]
fn test_imports() {
    assert_eq!(one("import a.b.c"), "(import a 0 \"a.b.c\" (tuple))");
    assert_eq!(
        one("from ..pkg import x, y as z"),
        "(import pkg 2 \"pkg\" (tuple x (as y z)))"
    );
    assert_eq!(parse_error("from m import as"), "unexpected keyword");
}

#[test]
fn test_exec_lines() {
    assert_eq!(one("exec ls -la"), "(exec exec Proc \"ls\" \"-la\")");
    assert_eq!(
        one("exec ls > out.txt"),
        "(exec exec Proc (call (attr Proc .Redirect) 1 \"ls\" \"out.txt\"))"
    );
    assert_eq!(
        one("exec echo ${name}"),
        "(exec exec Proc \"echo\" name)"
    );
    assert_eq!(
        one("exec ls |> exec wc"),
        "(exec |> (exec exec Proc \"wc\") (call (exec exec Proc \"ls\")))"
    );
    assert_eq!(one("exec if in"), "(exec exec Proc \"if\" \"in\")");
}

#[test]
fn test_unterminated_bracket() {
    assert_eq!(parse_error("f(1"), "Unterminated (");
    assert_eq!(parse_error("x = [1, 2"), "Unterminated [");
}

#[test]
fn test_missing_operand() {
    assert_eq!(parse_error("x ="), "missing token on rhs");
    assert_eq!(parse_error(", 1"), "missing token on lhs");
}

#[test]
fn test_error_position() {
    let err = parse_source("x = 1\nelse { y }").unwrap_err();
    let diag = err.diagnostic().unwrap();
    assert_eq!((diag.line, diag.column), (2, 0));
}
