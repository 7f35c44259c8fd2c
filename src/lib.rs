//! nixkernel - Interactive execution kernel for the Nix expression language
//!
//! This crate re-exports all layers of the nixkernel system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: nixkernel_runtime    — Session engine, commands, kernel protocol, console
//! Layer 2: nixkernel_store      — Derivation realization, subprocesses, result links
//! Layer 1: nixkernel_language   — Lexer, parser, lazy evaluator, builtins, printer
//! Layer 0: nixkernel_foundation — Error taxonomy, interrupt handle
//! ```

pub use nixkernel_foundation as foundation;
pub use nixkernel_language as language;
pub use nixkernel_runtime as runtime;
pub use nixkernel_store as store;
