//! Harness generation and the wire codec it shares with the evaluator

pub mod codec;
pub mod synth;

pub use synth::{build_harness, decode_failure, decode_report, HarnessFailure, HARNESS_FILE};
