//! Derivation realization for nixkernel.
//!
//! This crate provides:
//! - [`Store`] - The capability the session builds derivations through
//! - [`LocalStore`] - A store directory on the local filesystem
//! - [`ProcessRunner`] - Streaming, interruptible subprocess execution
//! - [`links`] - `result` symlinks in the working directory

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod links;
pub mod process;
pub mod store;

pub use links::{link_name, replace_symlink};
pub use process::{OutputStream, ProcessRunner};
pub use store::{LocalStore, Store};
