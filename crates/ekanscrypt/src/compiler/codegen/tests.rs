//! Tests for the bytecode compiler.

use std::sync::Arc;

use super::*;
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::resolver::resolve;

fn compile_with(src: &str, options: &CompileOptions) -> Result<CodeObject> {
    let mut forest = parse(tokenize(src)?)?;
    resolve(&mut forest)?;
    Compiler::new(options).compile_module(&forest)
}

fn compile_source(src: &str) -> Result<CodeObject> {
    compile_with(src, &CompileOptions::default())
}

fn compile_ok(src: &str) -> CodeObject {
    compile_source(src).expect("Compilation should succeed")
}

fn compile_error(src: &str) -> String {
    match compile_source(src) {
        Ok(_) => panic!("expected {:?} to fail", src),
        Err(e) => e.diagnostic().map(|d| d.message.clone()).unwrap_or_else(|| e.to_string()),
    }
}

fn ops(code: &CodeObject) -> Vec<OpCode> {
    code.instructions().map(|d| d.opcode).collect()
}

/// Every instruction with its operand; jump operands are byte offsets.
fn listing(code: &CodeObject) -> Vec<(OpCode, u32)> {
    code.instructions().map(|d| (d.opcode, d.arg)).collect()
}

/// The `n`th code constant of `code`.
fn nested(code: &CodeObject, n: usize) -> Arc<CodeObject> {
    code.constants
        .iter()
        .filter_map(|c| match c {
            Constant::Code(inner) => Some(inner.clone()),
            _ => None,
        })
        .nth(n)
        .expect("missing nested code object")
}

fn contains_run(haystack: &[OpCode], needle: &[OpCode]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// ============================================================================
// Module tail and REPL
// ============================================================================

#[test]
fn test_module_exports_bindings() {
    let code = compile_ok("x = 1");
    assert_eq!(
        ops(&code),
        vec![
            OpCode::LoadConst,
            OpCode::StoreFast,
            OpCode::LoadConst,
            OpCode::LoadFast,
            OpCode::BuildMap,
            OpCode::ReturnValue,
        ]
    );
    assert_eq!(code.varnames, vec!["x"]);
}

#[test]
fn test_repl_stores_last_value() {
    let code = compile_with("1 + 2", &CompileOptions::repl()).unwrap();
    assert_eq!(
        ops(&code),
        vec![
            OpCode::LoadConst,
            OpCode::LoadConst,
            OpCode::BinaryAdd,
            OpCode::StoreFast,
            OpCode::LoadConst,
            OpCode::LoadFast,
            OpCode::BuildMap,
            OpCode::ReturnValue,
        ]
    );
    assert_eq!(code.varnames, vec!["_"]);
}

#[test]
fn test_statement_discards_value() {
    let code = compile_ok("1 + 2");
    assert!(contains_run(&ops(&code), &[OpCode::BinaryAdd, OpCode::PopTop]));
}

#[test]
fn test_constants_are_shared() {
    let code = compile_ok("a = 1; b = 1; c = 1.0");
    let ints = code
        .constants
        .iter()
        .filter(|c| matches!(c, Constant::Int(1)))
        .count();
    assert_eq!(ints, 1);
    assert!(code.constants.contains(&Constant::Float(1.0)));
    assert_eq!(code.constants[0], Constant::None);
}

#[test]
fn test_names_are_shared() {
    let code = compile_ok("a.x; b.x; x");
    let uses: Vec<u32> = code
        .instructions()
        .filter(|d| matches!(d.opcode, OpCode::LoadAttr | OpCode::LoadName))
        .map(|d| d.arg)
        .collect();
    // a, x, b, x, x
    assert_eq!(uses, vec![0, 1, 2, 1, 1]);
    assert_eq!(code.names, vec!["a", "x", "b"]);

    let options = CompileOptions::default().with_globals(["g"]);
    let code = compile_with("g.y; g.y", &options).unwrap();
    assert_eq!(
        listing(&code),
        vec![
            (OpCode::LoadGlobal, 0),
            (OpCode::LoadAttr, 1),
            (OpCode::PopTop, 0),
            (OpCode::LoadGlobal, 0),
            (OpCode::LoadAttr, 1),
            (OpCode::PopTop, 0),
            (OpCode::BuildMap, 0),
            (OpCode::ReturnValue, 0),
        ]
    );
    assert_eq!(code.names, vec!["g", "y"]);
}

#[test]
fn test_compile_globals_use_global_storage() {
    let options = CompileOptions::default().with_globals(["print"]);
    let code = compile_with("print(1)", &options).unwrap();
    assert_eq!(ops(&code)[0], OpCode::LoadGlobal);
    let code = compile_ok("print(1)");
    assert_eq!(ops(&code)[0], OpCode::LoadName);
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn test_assignment_in_expression_duplicates() {
    let code = compile_ok("a = b = 1");
    assert!(contains_run(
        &ops(&code),
        &[OpCode::LoadConst, OpCode::DupTop, OpCode::StoreFast, OpCode::StoreFast]
    ));
}

#[test]
fn test_logical_operators_short_circuit() {
    let code = compile_ok("x = a && b; y = a || b");
    let ops = ops(&code);
    assert!(ops.contains(&OpCode::JumpIfFalseOrPop));
    assert!(ops.contains(&OpCode::JumpIfTrueOrPop));
}

#[test]
fn test_identity_comparison() {
    let code = compile_ok("x = a === b");
    let compare = code
        .instructions()
        .find(|d| d.opcode == OpCode::CompareOp)
        .unwrap();
    assert_eq!(compare.arg, 8);
}

#[test]
fn test_chained_comparison() {
    let code = compile_ok("x = 1 < y < 3");
    let ops = ops(&code);
    assert!(contains_run(&ops, &[OpCode::DupTop, OpCode::RotThree, OpCode::CompareOp]));
    assert!(ops.contains(&OpCode::JumpIfFalseOrPop));
    assert!(contains_run(&ops, &[OpCode::RotTwo, OpCode::PopTop]));
}

#[test]
fn test_chained_comparison_listing() {
    use OpCode::*;
    let code = compile_ok("a < b <= c < d");
    assert_eq!(
        listing(&code),
        vec![
            (LoadName, 0),
            (LoadName, 1),
            (DupTop, 0),
            (RotThree, 0),
            (CompareOp, 0),
            (JumpIfFalseOrPop, 28),
            (LoadName, 2),
            (DupTop, 0),
            (RotThree, 0),
            (CompareOp, 1),
            (JumpIfFalseOrPop, 28),
            (LoadName, 3),
            (CompareOp, 0),
            (JumpForward, 4),
            // both failed links land here
            (RotTwo, 0),
            (PopTop, 0),
            (Nop, 0),
            (PopTop, 0),
            (BuildMap, 0),
            (ReturnValue, 0),
        ]
    );
}

#[test]
fn test_optional_attribute_guard() {
    let code = compile_ok("b = a?.c");
    assert!(contains_run(
        &ops(&code),
        &[
            OpCode::DupTop,
            OpCode::LoadConst,
            OpCode::CompareOp,
            OpCode::PopJumpIfTrue,
            OpCode::LoadAttr,
            OpCode::Nop,
        ]
    ));
}

#[test]
fn test_augmented_assignment_reloads() {
    let code = compile_ok("x = 1; x += 2");
    assert!(contains_run(
        &ops(&code),
        &[
            OpCode::LoadFast,
            OpCode::LoadConst,
            OpCode::BinaryAdd,
            OpCode::StoreFast,
            OpCode::LoadFast,
            OpCode::PopTop,
        ]
    ));
}

#[test]
fn test_keyword_call() {
    let code = compile_ok("f(1, x=2)");
    let call = code
        .instructions()
        .find(|d| d.opcode == OpCode::CallFunctionKw)
        .unwrap();
    assert_eq!(call.arg, 2);
}

#[test]
fn test_star_call() {
    let code = compile_ok("f(1, *a, **k)");
    let ops = ops(&code);
    assert!(ops.contains(&OpCode::BuildTupleUnpackWithCall));
    let call = code
        .instructions()
        .find(|d| d.opcode == OpCode::CallFunctionEx)
        .unwrap();
    assert_eq!(call.arg, 1);
}

#[test]
fn test_positional_after_keyword() {
    assert_eq!(compile_error("f(x=1, 2)"), "positional after keyword argument");
    assert_eq!(compile_error("f(*a, 2)"), "positional argument after *");
}

#[test]
fn test_map_unpack() {
    let code = compile_ok("x = {\"a\": 1, **y}");
    assert!(ops(&code).contains(&OpCode::BuildMapUnpack));
}

#[test]
fn test_list_comprehension() {
    let code = compile_ok("x = [i * 2 for i in xs if i]");
    let ops = ops(&code);
    assert_eq!(ops[0], OpCode::BuildList);
    assert!(ops.contains(&OpCode::ForIter));
    let append = code
        .instructions()
        .find(|d| d.opcode == OpCode::ListAppend)
        .unwrap();
    assert_eq!(append.arg, 2);
}

#[test]
fn test_exec_statement_runs_process() {
    let code = compile_ok("exec ls -la");
    assert!(contains_run(
        &ops(&code),
        &[OpCode::CallFunction, OpCode::LoadAttr, OpCode::CallFunction, OpCode::PopTop]
    ));
    assert!(code.names.iter().any(|n| n == "run2"));
}

#[test]
fn test_format_string_calls_helper() {
    let code = compile_ok("x = f\"{y}\"");
    assert!(code.names.iter().any(|n| n == "__es_format__"));
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_foreach_layout() {
    let code = compile_ok("for x in xs { print(x) }");
    let ops = ops(&code);
    assert!(contains_run(&ops, &[OpCode::GetIter, OpCode::ForIter, OpCode::StoreFast]));
    assert!(contains_run(&ops, &[OpCode::JumpAbsolute, OpCode::PopTop, OpCode::Nop]));
}

#[test]
fn test_foreach_listing() {
    use OpCode::*;
    let code = compile_ok("for x in xs { if x { break }; y }");
    assert_eq!(
        listing(&code),
        vec![
            (LoadName, 0),
            (GetIter, 0),
            (ForIter, 22),
            (StoreFast, 0),
            (LoadFast, 0),
            (PopJumpIfFalse, 16),
            (JumpAbsolute, 26),
            (JumpAbsolute, 18),
            (Nop, 0),
            (Nop, 0),
            (LoadName, 1),
            (PopTop, 0),
            (JumpAbsolute, 4),
            (PopTop, 0),
            (Nop, 0),
            (LoadConst, 1),
            (LoadFast, 0),
            (BuildMap, 1),
            (ReturnValue, 0),
        ]
    );
    assert_eq!(code.constants[1], Constant::Str("x".to_string()));
}

#[test]
fn test_if_else_listing() {
    use OpCode::*;
    let code = compile_ok("if a { b } else { c }");
    assert_eq!(
        listing(&code),
        vec![
            (LoadName, 0),
            (PopJumpIfFalse, 10),
            (LoadName, 1),
            (PopTop, 0),
            (JumpAbsolute, 16),
            (Nop, 0),
            (LoadName, 2),
            (PopTop, 0),
            (Nop, 0),
            (BuildMap, 0),
            (ReturnValue, 0),
        ]
    );
}

#[test]
fn test_while_listing() {
    use OpCode::*;
    let code = compile_ok("while a { if b { break }; if c { continue }; d }");
    assert_eq!(
        listing(&code),
        vec![
            (LoadName, 0),
            (PopJumpIfFalse, 34),
            (LoadName, 1),
            (PopJumpIfFalse, 12),
            (JumpAbsolute, 34),
            (JumpAbsolute, 14),
            (Nop, 0),
            (Nop, 0),
            (LoadName, 2),
            (PopJumpIfFalse, 24),
            (JumpAbsolute, 0),
            (JumpAbsolute, 26),
            (Nop, 0),
            (Nop, 0),
            (LoadName, 3),
            (PopTop, 0),
            (JumpAbsolute, 0),
            (Nop, 0),
            (BuildMap, 0),
            (ReturnValue, 0),
        ]
    );
}

#[test]
fn test_break_resolves_to_loop_exit() {
    let code = compile_ok("while 1 { break }");
    let jumps = code
        .instructions()
        .filter(|d| d.opcode == OpCode::JumpAbsolute)
        .count();
    assert_eq!(jumps, 2);
}

#[test]
fn test_break_out_of_two_loops_pops_iterator() {
    let code = compile_ok("for a in xs { for b in ys { break 2 } }");
    assert!(contains_run(&ops(&code), &[OpCode::PopTop, OpCode::JumpAbsolute]));
}

#[test]
fn test_break_outside_loop() {
    assert_eq!(compile_error("f = () => { break }"), "break outside loop");
    assert_eq!(compile_error("f = () => { continue }"), "continue outside loop");
}

#[test]
fn test_return_from_loop_drops_iterator() {
    let code = compile_ok("f = (xs) => { for x in xs { return x } }");
    let function = nested(&code, 0);
    assert!(contains_run(
        &ops(&function),
        &[OpCode::LoadFast, OpCode::RotTwo, OpCode::PopTop, OpCode::ReturnValue]
    ));
}

#[test]
fn test_switch() {
    let code = compile_ok("switch x { case 1 { a } case 2 default { b } }");
    let ops = ops(&code);
    assert!(contains_run(
        &ops,
        &[
            OpCode::DupTop,
            OpCode::LoadConst,
            OpCode::CompareOp,
            OpCode::PopJumpIfFalse,
            OpCode::PopTop,
            OpCode::JumpForward,
        ]
    ));
}

#[test]
fn test_switch_listing() {
    use OpCode::*;
    let code = compile_ok("switch x { case 1 case 2 { a; break } default { b } }");
    assert_eq!(
        listing(&code),
        vec![
            (LoadName, 0),
            (DupTop, 0),
            (LoadConst, 1),
            (CompareOp, 2),
            (PopJumpIfFalse, 14),
            (PopTop, 0),
            (JumpForward, 20),
            (Nop, 0),
            (DupTop, 0),
            (LoadConst, 2),
            (CompareOp, 2),
            (PopJumpIfFalse, 28),
            (PopTop, 0),
            (JumpForward, 8),
            (Nop, 0),
            (PopTop, 0),
            (JumpForward, 10),
            // case 1 falls through into case 2
            (Nop, 0),
            (Nop, 0),
            (LoadName, 1),
            (PopTop, 0),
            (JumpAbsolute, 50),
            (Nop, 0),
            (LoadName, 2),
            (PopTop, 0),
            (Nop, 0),
            (BuildMap, 0),
            (ReturnValue, 0),
        ]
    );
}

#[test]
fn test_switch_rejects_second_default() {
    assert_eq!(
        compile_error("switch x { default { a } default { b } }"),
        "multiple default targets"
    );
}

#[test]
fn test_try_catch_binds_name_locally() {
    let code = compile_ok("f = () => { try { g() } catch E as e { h(e) } }");
    let function = nested(&code, 0);
    let ops = ops(&function);
    assert!(ops.contains(&OpCode::SetupFinally));
    assert!(contains_run(
        &ops,
        &[OpCode::LoadConst, OpCode::StoreFast, OpCode::DeleteFast, OpCode::EndFinally]
    ));
    assert!(ops.contains(&OpCode::PopExcept));
    let matches = function
        .instructions()
        .find(|d| d.opcode == OpCode::CompareOp)
        .unwrap();
    assert_eq!(matches.arg, 10);
}

#[test]
fn test_try_catch_finally_listing() {
    use OpCode::*;
    let code = compile_ok("try { a } catch E as e { e } catch F { c } finally { d }");
    assert_eq!(
        listing(&code),
        vec![
            (SetupFinally, 66),
            (SetupFinally, 8),
            (LoadName, 1),
            (PopTop, 0),
            (PopBlock, 0),
            (JumpForward, 52),
            // catch E as e
            (DupTop, 0),
            (LoadName, 2),
            (CompareOp, 10),
            (PopJumpIfFalse, 44),
            (StoreFast, 0),
            (SetupFinally, 8),
            (LoadFast, 0),
            (PopTop, 0),
            (PopBlock, 0),
            (BeginFinally, 0),
            (LoadConst, 0),
            (StoreFast, 0),
            (DeleteFast, 0),
            (EndFinally, 0),
            (PopExcept, 0),
            (JumpForward, 20),
            // catch F
            (DupTop, 0),
            (LoadName, 3),
            (CompareOp, 10),
            (PopJumpIfFalse, 62),
            (PopTop, 0),
            (LoadName, 4),
            (PopTop, 0),
            (PopExcept, 0),
            (JumpForward, 2),
            (EndFinally, 0),
            // finally
            (PopBlock, 0),
            (BeginFinally, 0),
            (LoadName, 0),
            (PopTop, 0),
            (EndFinally, 0),
            (BuildMap, 0),
            (ReturnValue, 0),
        ]
    );
    // the finally body is compiled first
    assert_eq!(code.names, vec!["d", "a", "E", "F", "c"]);
}

#[test]
fn test_finally_copies_body_into_return_path() {
    let code = compile_ok("f = () => { try { return 1 } finally { g() } }");
    let function = nested(&code, 0);
    let calls = function
        .instructions()
        .filter(|d| d.opcode == OpCode::CallFunction)
        .count();
    // once on the normal path, once before the return
    assert_eq!(calls, 2);
    assert!(contains_run(
        &ops(&function),
        &[OpCode::PopBlock, OpCode::BeginFinally]
    ));
}

#[test]
fn test_break_in_finally_is_rejected() {
    assert_eq!(
        compile_error("while 1 { try { a } finally { break } }"),
        "break inside finally block"
    );
}

#[test]
fn test_with_cleanup() {
    let code = compile_ok("with f = open(p) { f }");
    assert!(contains_run(
        &ops(&code),
        &[
            OpCode::PopBlock,
            OpCode::BeginFinally,
            OpCode::WithCleanupStart,
            OpCode::WithCleanupFinish,
            OpCode::EndFinally,
        ]
    ));
}

#[test]
fn test_module_scope_errors() {
    assert_eq!(compile_error("return 1"), "return in global scope");
    assert_eq!(compile_error("raise E"), "return in global scope");
    assert_eq!(compile_error("yield x"), "yield in global scope");
}

// ============================================================================
// Functions, classes and imports
// ============================================================================

#[test]
fn test_lambda_defaults() {
    let code = compile_ok("f = (a, b=2) => a + b");
    assert!(contains_run(
        &ops(&code),
        &[OpCode::BuildTuple, OpCode::LoadConst, OpCode::LoadConst, OpCode::MakeFunction]
    ));
    let function = nested(&code, 0);
    assert_eq!(function.argcount, 2);
    assert_eq!(function.varnames, vec!["a", "b"]);
    assert!(function.name.starts_with("<module>.lambda.Anonymous_1_"));
    assert_eq!(
        ops(&function),
        vec![OpCode::LoadFast, OpCode::LoadFast, OpCode::BinaryAdd, OpCode::ReturnValue]
    );
}

#[test]
fn test_lambda_varargs_flags() {
    let code = compile_ok("f = (a, *rest, **kw) => a");
    let function = nested(&code, 0);
    assert!(function.flags.contains(CodeFlags::VARARGS));
    assert!(function.flags.contains(CodeFlags::VARKEYWORDS));
    assert_eq!(function.argcount, 1);
    assert_eq!(function.varnames, vec!["a", "rest", "kw"]);
}

#[test]
fn test_named_lambda_closes_over_itself() {
    let code = compile_ok("fib(n) => { n < 2 ? n : fib(n - 1) + fib(n - 2) }");
    assert_eq!(code.cellvars, vec!["fib"]);
    let function = nested(&code, 0);
    assert_eq!(function.freevars, vec!["fib"]);
    assert_eq!(function.name, "<module>.lambda.fib");
    assert!(contains_run(
        &ops(&code),
        &[OpCode::LoadClosure, OpCode::BuildTuple, OpCode::LoadConst]
    ));
    assert!(ops(&code).contains(&OpCode::StoreDeref));
}

#[test]
fn test_shadowing_compiles_to_separate_slots() {
    let code = compile_ok("a=1; C=()=>{a+=1; var a=5; return a}; print(a, C(), a)");
    let function = nested(&code, 0);
    assert_eq!(function.freevars, vec!["a"]);
    assert_eq!(function.varnames, vec!["a:1"]);
    assert!(ops(&function).contains(&OpCode::StoreDeref));
}

#[test]
fn test_generator_flag() {
    let code = compile_ok("g = () => { yield 1 }");
    assert!(nested(&code, 0).flags.contains(CodeFlags::GENERATOR));
}

#[test]
fn test_class_body() {
    let code = compile_ok("class A(B) { x = 1; m(self) => x }");
    let ops = ops(&code);
    assert_eq!(ops[0], OpCode::LoadBuildClass);
    let call = code
        .instructions()
        .find(|d| d.opcode == OpCode::CallFunction)
        .unwrap();
    assert_eq!(call.arg, 3);

    let body = nested(&code, 0);
    assert_eq!(body.name, "<module>.A");
    assert_eq!(body.cellvars, vec!["__class__"]);
    assert!(body.varnames.is_empty());
    assert!(body.names.iter().any(|n| n == "__qualname__"));

    let method = nested(&body, 0);
    assert_eq!(method.freevars[0], "__class__");
}

#[test]
fn test_import_from() {
    let code = compile_ok("from m import a, b as c");
    let ops = ops(&code);
    assert!(ops.contains(&OpCode::ImportName));
    assert_eq!(ops.iter().filter(|op| **op == OpCode::ImportFrom).count(), 2);
    assert!(code.names.iter().any(|n| n == "m"));
    assert!(code.names.iter().any(|n| n == "b"));
}

// ============================================================================
// Layout
// ============================================================================

#[test]
fn test_long_loop_uses_extended_jumps() {
    let body: Vec<String> = (0..200).map(|i| format!("x = x + {}", i)).collect();
    let src = format!("f = (x) => {{ while x {{ {} }} }}", body.join("; "));
    let code = compile_ok(&src);
    let function = nested(&code, 0);
    assert!(function.code.contains(&(OpCode::ExtendedArg as u8)));
    let back = function
        .instructions()
        .find(|d| d.opcode == OpCode::JumpAbsolute)
        .unwrap();
    assert_eq!(back.arg, 0);
    let exit = function
        .instructions()
        .find(|d| d.opcode == OpCode::PopJumpIfFalse)
        .unwrap();
    assert!(exit.arg > 255);
    assert_eq!(function.decode(exit.arg as usize).map(|d| d.opcode), Some(OpCode::Nop));
}

#[test]
fn test_stack_depth_of_call() {
    let code = compile_ok("f(1, 2, 3)");
    assert_eq!(code.stacksize, 4);
}

#[test]
fn test_disassembly_lists_nested_code() {
    let code = compile_ok("f = () => 1");
    let listing = code.disassemble();
    assert!(listing.contains("MAKE_FUNCTION"));
    assert!(listing.contains("<module>.lambda.Anonymous_"));
}
