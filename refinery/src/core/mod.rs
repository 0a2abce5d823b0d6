//! Deterministic, pure logic shared by the refinement pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! records and oracle text and return deterministic outputs suitable for tests.

pub mod budget;
pub mod interpret;
pub mod record;
pub mod scoring;
pub mod types;
