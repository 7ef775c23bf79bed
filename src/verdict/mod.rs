//! Verdict derivation
//!
//! Turns harness records and suite counts into a correctness ratio.

pub mod assess;

pub use assess::{assess_examples, assess_suite, outputs_match, Correctness};
