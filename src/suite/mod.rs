//! Delegated test-suite execution
//!
//! Materializes the candidate as `candidate.py` beside the suite files in a
//! fresh scratch directory, runs the configured test runner there, and reads
//! the pass/fail counts out of its free-text summary.

use crate::config::settings::EvaluatorConfig;
use crate::config::types::{EvalError, Result, RunStatus};
use crate::core::types::{validate_suite_filename, CANDIDATE_MODULE_FILE};
use crate::exec::env::child_environment;
use crate::exec::runner::{ProcessRunner, RunRequest};
use crate::harness::synth::abbreviate;
use crate::safety::workspace::ScratchDir;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Counts read from a runner summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryCounts {
    pub passed: u32,
    pub failed: u32,
    /// Collection or fixture errors; not part of the score.
    pub errors: u32,
}

/// Result of one suite run.
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub runtime_ms: f64,
    pub exit_code: Option<i32>,
    /// Runner stderr kept when the runner exited non-zero.
    pub diagnostics: Option<String>,
}

struct SummaryPatterns {
    passed: Regex,
    failed: Regex,
    errors: Regex,
}

fn patterns() -> &'static SummaryPatterns {
    static PATTERNS: OnceLock<SummaryPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SummaryPatterns {
        passed: Regex::new(r"(\d+)\s+passed").expect("valid regex"),
        failed: Regex::new(r"(\d+)\s+failed").expect("valid regex"),
        errors: Regex::new(r"(\d+)\s+errors?\b").expect("valid regex"),
    })
}

/// Last count matched by `re`; the summary line comes after any test output.
fn last_count(re: &Regex, text: &str) -> Option<u32> {
    re.captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse `N passed` / `N failed` / `N error(s)`. `None` when neither the
/// passed nor the failed count is present; a missing count is zero.
pub fn parse_summary(text: &str) -> Option<SummaryCounts> {
    let patterns = patterns();
    let passed = last_count(&patterns.passed, text);
    let failed = last_count(&patterns.failed, text);
    if passed.is_none() && failed.is_none() {
        return None;
    }
    Some(SummaryCounts {
        passed: passed.unwrap_or(0),
        failed: failed.unwrap_or(0),
        errors: last_count(&patterns.errors, text).unwrap_or(0),
    })
}

/// Runs suites through the shared [`ProcessRunner`].
pub struct SuiteRunner<'a> {
    config: &'a EvaluatorConfig,
    runner: &'a ProcessRunner,
}

impl<'a> SuiteRunner<'a> {
    pub fn new(config: &'a EvaluatorConfig, runner: &'a ProcessRunner) -> Self {
        Self { config, runner }
    }

    pub fn run_suite(
        &self,
        candidate_code: &str,
        suite_files: &BTreeMap<String, String>,
        timeout: Duration,
        max_memory_mb: Option<u64>,
    ) -> Result<SuiteReport> {
        for name in suite_files.keys() {
            validate_suite_filename(name).map_err(EvalError::Config)?;
        }

        let mut scratch = ScratchDir::create(&self.config.scratch_root)?;
        scratch.write_file(CANDIDATE_MODULE_FILE, candidate_code)?;
        for (name, contents) in suite_files {
            scratch.write_file(name, contents)?;
        }

        let request = RunRequest {
            command: self.config.suite_command.clone(),
            workdir: scratch.path().to_path_buf(),
            timeout,
            max_memory_mb,
            environment: child_environment(self.config, scratch.path()),
        };
        log::debug!(
            "running {} suite file(s) in scratch run {}",
            suite_files.len(),
            scratch.run_id()
        );
        let output = self.runner.run(&request);
        scratch.cleanup();
        let output = output?;

        log::debug!("suite runner finished with {} after {} ms", output.status(), output.wall_time_ms);
        match output.status() {
            RunStatus::TimeLimit => {
                if let Some(report) = &output.kill_report {
                    log::warn!("suite runner outlived its deadline: {}", report);
                }
                return Err(EvalError::Timeout(timeout));
            }
            RunStatus::MemoryLimit => {
                return Err(EvalError::MemoryLimit {
                    limit_mb: max_memory_mb.unwrap_or_default(),
                    details: abbreviate(output.stderr.trim(), 512),
                });
            }
            RunStatus::Ok | RunStatus::RuntimeError | RunStatus::Signaled => {}
        }

        let counts = parse_summary(&output.stdout)
            .or_else(|| parse_summary(&output.stderr))
            .ok_or_else(|| {
                let combined = format!("{}{}", output.stdout, output.stderr);
                EvalError::SuiteParse(abbreviate(combined.trim(), 512))
            })?;

        let diagnostics = match output.exit_code {
            Some(0) => None,
            _ if output.stderr.trim().is_empty() => None,
            _ => Some(output.stderr.trim().to_string()),
        };

        Ok(SuiteReport {
            passed: counts.passed,
            failed: counts.failed,
            errors: counts.errors,
            runtime_ms: output.wall_time_ms as f64,
            exit_code: output.exit_code,
            diagnostics,
        })
    }
}
