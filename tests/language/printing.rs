//! Integration tests for the value printer

use std::rc::Rc;

use nixkernel_foundation::Interrupt;
use nixkernel_language::{EvalConfig, Evaluator, PrintOptions, print_value};

fn render(source: &str, options: &PrintOptions) -> String {
    let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
    let scope = Rc::clone(ev.globals());
    let value = ev.eval_str(source, &scope).unwrap();
    print_value(&ev, &value, options).unwrap()
}

fn pretty(source: &str) -> String {
    render(source, &PrintOptions::default())
}

// =============================================================================
// Layout
// =============================================================================

#[test]
fn attribute_names_are_sorted() {
    assert_eq!(pretty("{ zebra = 1; apple = 2; }"), "{\n  apple = 2;\n  zebra = 1;\n}");
}

#[test]
fn nested_collections_indent() {
    assert_eq!(
        pretty("{ xs = [ 1 2 ]; }"),
        "{\n  xs = [\n    1\n    2\n  ];\n}"
    );
}

#[test]
fn plain_options_stay_on_one_line() {
    assert_eq!(
        render("{ b = [ 1 2 ]; a = \"s\"; }", &PrintOptions::plain()),
        r#"{ a = "s"; b = [ 1 2 ]; }"#
    );
}

// =============================================================================
// Special Values
// =============================================================================

#[test]
fn strings_are_escaped() {
    assert_eq!(pretty(r#""line\nnext""#), r#""line\nnext""#);
}

#[test]
fn lambdas_show_their_position() {
    assert_eq!(pretty("let id = x: x; in id"), "«lambda id @ «string»:1:10»");
}

#[test]
fn errors_inside_collections_are_shown_inline() {
    assert_eq!(
        render(r#"[ 1 (throw "inner") ]"#, &PrintOptions::plain()),
        "[ 1 «error: inner» ]"
    );
}
