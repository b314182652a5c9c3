//! Shared utilities for paramsync integration tests.
//!
//! - `TestHarness` wires an in-memory store to the engine and friends
//! - `SqliteHarness` does the same for a SQLite store on the wall clock
//! - builders create manifests and mappings without JSON boilerplate

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{SqliteHarness, TestHarness};
