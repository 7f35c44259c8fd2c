//! Integration tests for Layer 1: Language
//!
//! Tests for the lexer, parser, evaluator, builtins and printer.

mod evaluation;
mod lexer;
mod printing;
mod properties;
