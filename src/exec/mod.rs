//! Child process execution
//!
//! Spawn, deadline enforcement, process-group kill, and bounded output
//! collection for harness and suite runs.

pub mod env;
pub mod limits;
pub mod output;
pub mod runner;

pub use runner::{KillReport, ProcessOutput, ProcessRunner, RunRequest};
