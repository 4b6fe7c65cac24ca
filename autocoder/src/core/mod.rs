//! Deterministic, pure logic shared by the autocoder orchestration.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and data structures and return deterministic outputs suitable for tests.

pub mod classify;
pub mod parse;
pub mod path;
pub mod types;
