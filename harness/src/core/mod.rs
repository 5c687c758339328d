//! Deterministic, pure logic shared by the harness.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod aggregate;
pub mod extract;
pub mod types;
