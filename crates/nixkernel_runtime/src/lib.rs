//! Interactive session engine for the Nix expression language.
//!
//! This crate provides:
//! - [`Session`] - Evaluation state carried across requests
//! - [`Environment`] - Session bindings with provenance
//! - [`commands`] - The `:command` table shared by dispatch and completion
//! - [`complete`], [`inspect`], [`completeness`] - Syntax-aware helpers
//! - [`display`] and [`errors`] - Translation into wire records
//! - [`Kernel`] - A JSON-lines request loop
//! - [`Repl`] - An interactive console

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod build;
pub mod commands;
pub mod complete;
pub mod completeness;
pub mod config;
pub mod display;
mod dispatch;
pub mod editor;
pub mod environment;
pub mod errors;
pub mod flake;
pub mod highlight;
pub mod inspect;
pub mod kernel;
pub mod output;
pub mod protocol;
pub mod repl;
pub mod session;
pub mod shell;

pub use completeness::Completeness;
pub use config::KernelConfig;
pub use display::DisplayBundle;
pub use environment::{Binding, Environment, Provenance};
pub use errors::ErrorRecord;
pub use kernel::Kernel;
pub use output::{Collector, Event, Output};
pub use repl::Repl;
pub use session::{ExecuteReply, SESSION_STACK_SIZE, Session, Status, on_session_thread};
