//! Integration tests for the evaluator and builtins
//!
//! Tests laziness, scoping, imports and the builtins a session leans on.

use std::fs;
use std::rc::Rc;

use nixkernel_foundation::{ErrorCategory, Interrupt};
use nixkernel_language::{EvalConfig, Evaluator, ReplInput, Value};

fn evaluator() -> Evaluator {
    Evaluator::new(EvalConfig::default(), Interrupt::new())
}

fn eval(source: &str) -> nixkernel_foundation::Result<Value> {
    let ev = evaluator();
    let scope = Rc::clone(ev.globals());
    ev.eval_str(source, &scope)
}

fn eval_int(source: &str) -> i64 {
    eval(source).unwrap().as_int().unwrap()
}

// =============================================================================
// Core Language
// =============================================================================

#[test]
fn arithmetic() {
    assert_eq!(eval_int("100 * 5"), 500);
    assert_eq!(eval_int("(1 + 2) * (10 - 4) / 3"), 6);
}

#[test]
fn recursive_functions() {
    let source = "let fib = n: if n < 2 then n else fib (n - 1) + fib (n - 2); in fib 15";
    assert_eq!(eval_int(source), 610);
}

#[test]
fn attribute_sets_and_updates() {
    assert_eq!(eval_int("({ a = 1; b = 2; } // { b = 40; }).b + 2"), 42);
    assert_eq!(eval_int("let s = { x.y.z = 5; }; in s.x.y.z"), 5);
}

#[test]
fn unused_errors_stay_lazy() {
    assert_eq!(eval_int("let broken = throw \"boom\"; in { a = broken; b = 1; }.b"), 1);
}

// =============================================================================
// Builtins
// =============================================================================

#[test]
fn list_builtins() {
    assert_eq!(eval_int("builtins.length (builtins.filter (x: x > 5) (builtins.genList (x: x) 10))"), 4);
    assert_eq!(eval_int("builtins.foldl' (acc: x: acc + x) 0 [ 1 2 3 4 ]"), 10);
    assert_eq!(eval_int("builtins.head (builtins.map (x: x * 3) [ 7 8 ])"), 21);
}

#[test]
fn string_builtins() {
    let value = eval("builtins.toJSON { a = [ 1 true null ]; }").unwrap();
    assert_eq!(value.as_string().unwrap().as_str(), r#"{"a":[1,true,null]}"#);
    let value = eval("builtins.toString 42").unwrap();
    assert_eq!(value.as_string().unwrap().as_str(), "42");
}

#[test]
fn traces_are_collected() {
    let ev = evaluator();
    let scope = Rc::clone(ev.globals());
    let value = ev.eval_str(r#"builtins.trace "first" (builtins.trace "second" 3)"#, &scope).unwrap();
    assert!(matches!(value, Value::Int(3)));
    assert_eq!(ev.take_traces(), vec!["first".to_string(), "second".to_string()]);
    assert!(ev.take_traces().is_empty());
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn error_categories() {
    assert_eq!(eval("nope").unwrap_err().category(), ErrorCategory::UndefinedVar);
    assert_eq!(eval("1 - \"a\"").unwrap_err().category(), ErrorCategory::Type);
    assert_eq!(eval("1 +").unwrap_err().category(), ErrorCategory::Parse);
}

#[test]
fn interrupt_is_observed() {
    let interrupt = Interrupt::new();
    let ev = Evaluator::new(EvalConfig::default(), interrupt.clone());
    interrupt.trigger();
    let scope = Rc::clone(ev.globals());
    let err = ev.eval_str("(x: x) 1", &scope).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Interrupted);
}

// =============================================================================
// Console Input
// =============================================================================

#[test]
fn bindings_versus_expressions() {
    let ev = evaluator();
    match ev.parse_repl("x = 1; y = x + 1").unwrap() {
        ReplInput::Bindings(bindings) => {
            let names: Vec<&str> = bindings.iter().map(|(name, _)| name.as_str()).collect();
            assert_eq!(names, vec!["x", "y"]);
        }
        ReplInput::Expr(_) => panic!("expected bindings"),
    }
    assert!(matches!(ev.parse_repl("x == 1").unwrap(), ReplInput::Expr(_)));
}

// =============================================================================
// Imports
// =============================================================================

#[test]
fn import_chain_and_cache_reset() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.nix"), "import ./value.nix + 1").unwrap();
    fs::write(dir.path().join("value.nix"), "1").unwrap();

    let ev = evaluator();
    let main = dir.path().join("main.nix");
    assert!(matches!(ev.import(&main).unwrap(), Value::Int(2)));

    fs::write(dir.path().join("value.nix"), "10").unwrap();
    assert!(matches!(ev.import(&main).unwrap(), Value::Int(2)));

    ev.clear_import_cache();
    assert!(matches!(ev.import(&main).unwrap(), Value::Int(11)));
}
