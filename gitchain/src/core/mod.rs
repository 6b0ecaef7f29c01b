//! Deterministic, pure logic shared by the chain and the query helpers.
//!
//! Core modules must be free of I/O side effects. They operate on git's
//! captured output and return deterministic values suitable for tests.

pub mod lines;
pub mod pattern;
pub mod status;
