//! Foundation types for nixkernel.
//!
//! This crate provides:
//! - [`Error`] - Rich error type with source position and trace frames
//! - [`ErrorKind`] - Every failure the evaluator, store and session can raise
//! - [`ErrorCategory`] - The closed taxonomy errors are reported under
//! - [`Interrupt`] - Shared cancellation handle for evaluation and subprocesses

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod interrupt;

pub use error::{Error, ErrorCategory, ErrorContext, ErrorKind, Result};
pub use interrupt::Interrupt;
