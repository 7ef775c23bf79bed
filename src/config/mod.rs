//! Configuration and shared types
//!
//! Evaluator tunables and the error/status vocabulary used across modules.

pub mod settings;
pub mod types;
