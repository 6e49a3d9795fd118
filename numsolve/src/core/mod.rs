//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod catalog;
pub mod classifier;
pub mod extract;
pub mod metrics;
pub mod schema;
pub mod selector;
pub mod state;
pub mod types;
