//! Test support utilities for the index verifier workspace.
//!
//! This crate provides the infrastructure verification tests are built on:
//! - In-memory page and table sources the verifier can be pointed at
//! - A builder that assembles well-formed multi-level trees from rows
//! - Byte-level page patching helpers for planting specific damage
//! - Property-based generators for rows and component encodings

pub mod fixtures;
pub mod proptest_generators;
pub mod sources;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::sources::*;
}
