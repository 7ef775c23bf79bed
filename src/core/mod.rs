//! Data model shared by every stage of an evaluation.
//!
//! Programs, task definitions, grading contracts, and the per-case records
//! the harness reports back.

pub mod types;
