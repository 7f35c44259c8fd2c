//! Property tests for the lexer and printer

use std::rc::Rc;

use nixkernel_foundation::Interrupt;
use nixkernel_language::{EvalConfig, Evaluator, Lexer, PrintOptions, TokenKind, print_value};
use proptest::prelude::*;

proptest! {
    /// Any input tokenizes to a stream ending in exactly one `Eof`.
    #[test]
    fn lexer_is_total(source in "\\PC{0,64}") {
        let tokens = Lexer::tokenize_all(&source);
        prop_assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
        prop_assert_eq!(tokens.iter().filter(|t| t.kind == TokenKind::Eof).count(), 1);
    }

    /// Token spans never overlap and stay inside the source.
    #[test]
    fn spans_are_ordered(source in "[a-z0-9 +*(){};=\\[\\]\".]{0,48}") {
        let tokens = Lexer::tokenize_all(&source);
        let mut last_end = 0;
        for token in &tokens {
            prop_assert!(token.span.start >= last_end);
            prop_assert!(token.span.end <= source.len());
            last_end = token.span.end;
        }
    }

    /// Integers print as their decimal form.
    #[test]
    fn integers_print_verbatim(n in 0i64..1_000_000_000) {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let scope = Rc::clone(ev.globals());
        let value = ev.eval_str(&n.to_string(), &scope).unwrap();
        prop_assert_eq!(print_value(&ev, &value, &PrintOptions::plain()).unwrap(), n.to_string());
    }

    /// Integer lists print in single-line form, with `[ ]` for none.
    #[test]
    fn integer_lists_print_in_order(items in prop::collection::vec(-1000i64..1000, 0..8)) {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let scope = Rc::clone(ev.globals());
        let elements: Vec<String> = items.iter().map(|n| format!("({n})")).collect();
        let value = ev.eval_str(&format!("[ {} ]", elements.join(" ")), &scope).unwrap();

        let mut expected = String::from("[ ");
        for n in &items {
            expected.push_str(&format!("{n} "));
        }
        expected.push(']');
        prop_assert_eq!(print_value(&ev, &value, &PrintOptions::plain()).unwrap(), expected);
    }
}
