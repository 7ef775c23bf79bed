/// Shared error and status types for the evaluation sandbox
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Outcome class of one child process run.
///
/// Derived from wait status and judge actions only; see
/// [`crate::exec::runner::ProcessOutput::status`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Process exited with code 0
    #[serde(rename = "OK")]
    #[default]
    Ok,
    /// Wall-clock deadline exceeded, process group killed by the runner
    #[serde(rename = "TLE")]
    TimeLimit,
    /// Child exhausted its enforced memory ceiling
    #[serde(rename = "MLE")]
    MemoryLimit,
    /// Non-zero exit code
    #[serde(rename = "RE")]
    RuntimeError,
    /// Terminated by a signal the runner did not send
    #[serde(rename = "SIG")]
    Signaled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "OK"),
            RunStatus::TimeLimit => write!(f, "TLE"),
            RunStatus::MemoryLimit => write!(f, "MLE"),
            RunStatus::RuntimeError => write!(f, "RE"),
            RunStatus::Signaled => write!(f, "SIG"),
        }
    }
}

/// Integrity of a collected output stream
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputIntegrity {
    /// Stream read to EOF within the limit
    #[default]
    Complete,
    /// Collector stopped at the configured byte limit
    TruncatedByJudgeLimit,
    /// Read failed before EOF
    ReadError,
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByJudgeLimit => write!(f, "truncated_by_judge_limit"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
        }
    }
}

/// Error taxonomy of one evaluation.
///
/// Only per-case failures are absorbed by the harness; every variant here is
/// fatal to the evaluation that produced it and ends up as a line in
/// `Program::errors`.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Execution timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Memory limit of {limit_mb} MB exceeded: {details}")]
    MemoryLimit { limit_mb: u64, details: String },

    #[error("Unrecognized test runner summary: {0}")]
    SuiteParse(String),

    #[error("Output codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;

pub(crate) fn to_process_error(prefix: &str, err: impl std::fmt::Display) -> EvalError {
    EvalError::Process(format!("{prefix}: {err}"))
}
