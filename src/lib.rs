//! evalbox: process-isolated fitness evaluation for evolved Python programs
//!
//! Takes an untrusted, machine-generated candidate plus a grading contract
//! (input/output examples or a pytest suite) and produces a bounded,
//! side-effect-contained fitness verdict on the [`core::types::Program`].
//!
//! # Architecture
//!
//! ## Static Validation ([`validate`])
//! - [`validate::validate`]: parse-only syntax check, no process spawned
//! - [`validate::symbols`]: two-tier lookup of the function under evolution
//!
//! ## Harness ([`harness`])
//! - [`harness::synth`]: generated Python driver for example grading
//! - [`harness::codec`]: JSON with sentinel strings for non-finite floats
//!
//! ## Execution Control ([`exec`])
//! - [`exec::runner`]: spawn, deadline, process-group kill, reap
//! - [`exec::limits`]: pre-exec resource limits and process-group setup
//! - [`exec::output`]: bounded stdout/stderr collection
//! - [`exec::env`]: cleared child environment
//!
//! ## Suite Runner ([`suite`])
//! - delegated pytest run and summary parsing
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::assess`]: output comparison and correctness ratios
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: run-scoped scratch directories
//!
//! ## Orchestration ([`evaluator`])
//! - [`evaluator::Evaluator`]: the evaluation state machine and batch pool
//!
//! ## Configuration ([`config`])
//! - [`config::settings`]: `evalbox.json` loading and validation
//! - [`config::types`]: error taxonomy and closed status enums
//!
//! # Isolation model
//!
//! Isolation is process level only: a separate child in its own process
//! group and scratch directory, an address-space ceiling applied before
//! exec, a wall-clock deadline enforced by the parent, and a cleared
//! environment. There are no namespaces, cgroups or syscall filters.

pub mod config;
pub mod core;
pub mod evaluator;
pub mod exec;
pub mod harness;
pub mod safety;
pub mod suite;
pub mod validate;
pub mod verdict;

pub mod cli;

pub use config::settings::EvaluatorConfig;
pub use config::types::{EvalError, Result};
pub use core::types::{IoExample, Program, ProgramStatus, TaskDefinition, TestSuite};
pub use evaluator::Evaluator;
pub use harness::codec::Value;
