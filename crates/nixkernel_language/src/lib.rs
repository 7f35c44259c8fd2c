//! Lexer, parser and lazy evaluator for the Nix expression language.
//!
//! This crate provides:
//! - [`Lexer`] - Tokenization of Nix source, with end-of-input detection
//! - [`Parser`] - Expressions and REPL binding input
//! - [`Evaluator`] - Call-by-need evaluation over [`Thunk`]s
//! - [`builtins`] - The `builtins` set with per-function documentation
//! - [`Derivation`] - Records produced by `derivation`
//! - [`pretty`] - REPL-style value printing

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ast;
pub mod builtins;
pub mod derivation;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod pretty;
pub mod scope;
pub mod span;
pub mod thunk;
pub mod token;
pub mod value;

pub use ast::{Expr, ExprKind, ExprRef, ReplInput};
pub use builtins::PrimOp;
pub use derivation::Derivation;
pub use eval::{EvalConfig, Evaluator};
pub use lexer::Lexer;
pub use parser::{Parser, parse, parse_repl_input};
pub use pretty::{PrintOptions, print_value};
pub use scope::Scope;
pub use span::{SourceId, Span};
pub use thunk::Thunk;
pub use token::{Token, TokenKind};
pub use value::{AttrSet, NixString, Value, ValueKind};
