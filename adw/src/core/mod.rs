//! Deterministic, pure logic shared by the workflow phases.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod branch;
pub mod classifier;
pub mod pipeline;
pub mod run_id;
pub mod spec_parser;
pub mod types;
