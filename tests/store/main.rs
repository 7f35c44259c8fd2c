//! Integration tests for Layer 2: Store
//!
//! Tests realizing evaluated derivations and maintaining result links.

mod build;
mod links;
