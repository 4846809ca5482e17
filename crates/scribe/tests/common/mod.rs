//! Shared utilities for scribe integration tests.
//!
//! - `TestHarness` owns a temporary output root and database file
//! - `ScriptedEngine` stands in for all four pipeline collaborators

pub mod engine;
pub mod harness;

pub use engine::ScriptedEngine;
pub use harness::{link, TestHarness};
