//! Evaluation orchestrator.
//!
//! Drives one program through `unevaluated -> evaluating -> {evaluated,
//! failed_evaluation}`: static validation, grading-mode selection, sandboxed
//! execution, assessment. Nothing the candidate does can make `evaluate`
//! return an error or panic; every failure ends up in `Program::errors`.

use crate::config::settings::EvaluatorConfig;
use crate::config::types::{EvalError, OutputIntegrity, Result, RunStatus};
use crate::core::types::{
    ExecutionResult, GradingMode, IoExample, Program, ProgramStatus, TaskDefinition, TestSuite, CORRECTNESS,
    PASSED_TESTS, RUNTIME_MS, TOTAL_TESTS,
};
use crate::exec::env::child_environment;
use crate::exec::runner::{ProcessOutput, ProcessRunner, RunRequest};
use crate::harness::synth::{
    self, abbreviate, build_harness, HARNESS_FILE, LOAD_FAILURE_EXIT, MEMORY_EXHAUSTED_EXIT, RESOLUTION_FAILURE_EXIT,
};
use crate::safety::workspace::ScratchDir;
use crate::suite::SuiteRunner;
use crate::validate::symbols::{self, Resolution};
use crate::validate::{self, ParsedCandidate};
use crate::verdict::assess::{assess_examples, assess_suite, Correctness};
use std::time::Duration;

/// Score given when a task carries neither a suite nor examples.
pub const NEUTRAL_CORRECTNESS: f64 = 0.5;

/// Evaluates programs against tasks. Holds no per-evaluation state, so one
/// instance can be shared across threads.
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvaluatorConfig,
    runner: ProcessRunner,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.scratch_root).map_err(|e| {
            EvalError::Config(format!(
                "scratch_root {} is not usable: {}",
                config.scratch_root.display(),
                e
            ))
        })?;
        let runner = ProcessRunner::new(&config);
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate under the configured timeout.
    pub fn evaluate(&self, program: Program, task: &TaskDefinition) -> Program {
        self.evaluate_with_timeout(program, task, self.config.evaluation_timeout())
    }

    pub fn evaluate_with_timeout(&self, mut program: Program, task: &TaskDefinition, timeout: Duration) -> Program {
        log::info!("Evaluating program {} for task {}", program.id, task.id);
        begin(&mut program);

        let parsed = match validate::parse_candidate(&program.code) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::info!("Program {} rejected before execution: {}", program.id, err);
                program.errors.push(err.to_string());
                program.status = ProgramStatus::FailedEvaluation;
                return program;
            }
        };

        let max_memory_mb = task.max_memory_mb.or(self.config.default_max_memory_mb);
        match task.grading_mode() {
            GradingMode::Suite(suite) => self.grade_suite(&mut program, suite, timeout, max_memory_mb),
            GradingMode::Examples(examples) => {
                self.grade_examples(&mut program, &parsed, task, examples, timeout, max_memory_mb)
            }
            GradingMode::Neutral => {
                log::warn!(
                    "Task {} has no test suite or examples; assigning neutral correctness",
                    task.id
                );
                program.set_score(CORRECTNESS, NEUTRAL_CORRECTNESS);
                program.status = ProgramStatus::Evaluated;
            }
        }

        log::info!(
            "Program {} finished as {} (correctness {:.3}, {} error(s))",
            program.id,
            program.status,
            program.correctness().unwrap_or(0.0),
            program.errors.len()
        );
        debug_assert!(program.status.is_terminal());
        program
    }

    /// Evaluate `programs` on at most `concurrency` worker threads. Output
    /// order matches input order.
    pub fn evaluate_all(&self, programs: Vec<Program>, task: &TaskDefinition, concurrency: usize) -> Vec<Program> {
        let total = programs.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = concurrency.clamp(1, total);
        log::debug!("Evaluating {} program(s) on {} worker(s)", total, workers);

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, Program)>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, Program)>();
        for job in programs.into_iter().enumerate() {
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (index, program) in job_rx.iter() {
                        if done_tx.send((index, self.evaluate(program, task))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(done_tx);

        let mut slots: Vec<Option<Program>> = (0..total).map(|_| None).collect();
        for (index, program) in done_rx.try_iter() {
            slots[index] = Some(program);
        }
        slots.into_iter().flatten().collect()
    }

    fn grade_examples(
        &self,
        program: &mut Program,
        parsed: &ParsedCandidate,
        task: &TaskDefinition,
        examples: &[IoExample],
        timeout: Duration,
        max_memory_mb: Option<u64>,
    ) {
        let Some(function_name) = task
            .function_name_to_evolve
            .as_deref()
            .filter(|name| !name.trim().is_empty())
        else {
            fail_with(program, "Task definition is missing 'function_name_to_evolve'.".to_string());
            return;
        };

        match symbols::resolve(&parsed.suite, function_name, parsed.dynamic_bindings) {
            Resolution::Unresolved => {
                fail(program, EvalError::Resolution(not_found_message(function_name)));
                return;
            }
            Resolution::TypeMember { type_name } => {
                log::debug!("'{}' resolves as a member of class {}", function_name, type_name);
            }
            Resolution::Direct | Resolution::Indeterminate => {}
        }

        let result = match self.run_harness(&program.code, function_name, examples, timeout, max_memory_mb) {
            Ok(result) => result,
            Err(err) => {
                fail(program, err);
                return;
            }
        };

        let verdict = assess_examples(examples, Some(&result));
        record_counts(program, &verdict);
        if result.test_outputs.iter().any(|record| record.is_success()) {
            program.set_score(RUNTIME_MS, result.average_runtime_ms);
        }

        if verdict.is_perfect() {
            program.status = ProgramStatus::Evaluated;
            return;
        }

        program
            .errors
            .push(format!("Failed {} out of {} test cases.", verdict.total - verdict.passed, verdict.total));
        for record in result.test_outputs.iter().filter(|record| !record.is_success()) {
            program.errors.push(format!(
                "Test case {} raised {}: {}",
                record.test_case_id,
                record.error_type.as_deref().unwrap_or("Error"),
                record.error.as_deref().unwrap_or("")
            ));
        }
        program.status = ProgramStatus::FailedEvaluation;
    }

    fn run_harness(
        &self,
        code: &str,
        function_name: &str,
        examples: &[IoExample],
        timeout: Duration,
        max_memory_mb: Option<u64>,
    ) -> Result<ExecutionResult> {
        let script = build_harness(code, function_name, examples, max_memory_mb.is_some())?;
        let mut scratch = ScratchDir::create(&self.config.scratch_root)?;
        let script_path = scratch.write_file(HARNESS_FILE, &script)?;
        log::debug!("Running harness for '{}' in scratch run {}", function_name, scratch.run_id());

        let request = RunRequest {
            command: self.config.interpreter_command(&script_path),
            workdir: scratch.path().to_path_buf(),
            timeout,
            max_memory_mb,
            environment: child_environment(&self.config, scratch.path()),
        };
        let output = self.runner.run(&request);
        scratch.cleanup();

        interpret_harness_output(output?, timeout, max_memory_mb)
    }

    fn grade_suite(&self, program: &mut Program, suite: &TestSuite, timeout: Duration, max_memory_mb: Option<u64>) {
        let files = suite.materialized_files();
        let report = match SuiteRunner::new(&self.config, &self.runner).run_suite(
            &program.code,
            &files,
            timeout,
            max_memory_mb,
        ) {
            Ok(report) => report,
            Err(err) => {
                fail(program, err);
                return;
            }
        };

        let verdict = assess_suite(report.passed, report.failed);
        record_counts(program, &verdict);
        program.set_score(RUNTIME_MS, report.runtime_ms);

        if report.errors > 0 {
            program
                .errors
                .push(format!("Test runner reported {} error(s).", report.errors));
        }
        if let Some(diagnostics) = &report.diagnostics {
            program
                .errors
                .push(format!("Test runner stderr: {}", abbreviate(diagnostics, 2048)));
        }

        program.status = if verdict.is_perfect() && report.errors == 0 {
            ProgramStatus::Evaluated
        } else {
            ProgramStatus::FailedEvaluation
        };
    }
}

fn begin(program: &mut Program) {
    program.status = ProgramStatus::Evaluating;
    program.errors.clear();
    program.fitness_scores.clear();
    program.set_score(CORRECTNESS, 0.0);
    program.set_score(RUNTIME_MS, f64::INFINITY);
}

fn fail(program: &mut Program, err: EvalError) {
    fail_with(program, err.to_string());
}

fn fail_with(program: &mut Program, message: String) {
    log::info!("Program {} failed evaluation: {}", program.id, message);
    program.set_score(CORRECTNESS, 0.0);
    program.errors.push(message);
    program.status = ProgramStatus::FailedEvaluation;
}

fn record_counts(program: &mut Program, verdict: &Correctness) {
    program.set_score(CORRECTNESS, verdict.correctness);
    program.set_score(PASSED_TESTS, verdict.passed as f64);
    program.set_score(TOTAL_TESTS, verdict.total as f64);
}

fn not_found_message(function_name: &str) -> String {
    format!(
        "Function '{}' not found in the global scope or as a callable method of a defined class.",
        function_name
    )
}

/// Map a finished harness run to its batch result or a fatal error.
fn interpret_harness_output(
    output: ProcessOutput,
    timeout: Duration,
    max_memory_mb: Option<u64>,
) -> Result<ExecutionResult> {
    let status = output.status();
    log::debug!("Harness finished with {} after {} ms", status, output.wall_time_ms);

    match status {
        RunStatus::TimeLimit => {
            if let Some(report) = &output.kill_report {
                log::warn!("Harness outlived its deadline: {}", report);
            }
            Err(EvalError::Timeout(timeout))
        }
        RunStatus::MemoryLimit => Err(memory_limit(&output, max_memory_mb)),
        RunStatus::Ok => decode_harness_report(&output),
        RunStatus::Signaled => Err(EvalError::Process(format!(
            "Script terminated by signal {}",
            output.term_signal.unwrap_or_default()
        ))),
        RunStatus::RuntimeError => {
            let Some(code) = output.exit_code else {
                return Err(EvalError::Process("Script ended without an exit status".to_string()));
            };
            if code == MEMORY_EXHAUSTED_EXIT && max_memory_mb.is_some() {
                return Err(memory_limit(&output, max_memory_mb));
            }
            if let Some(failure) = synth::decode_failure(&output.stdout) {
                return Err(match code {
                    RESOLUTION_FAILURE_EXIT => EvalError::Resolution(failure.error),
                    LOAD_FAILURE_EXIT => EvalError::Process(failure.error),
                    _ => EvalError::Process(format!("Script exited with code {}: {}", code, failure.error)),
                });
            }
            Err(EvalError::Process(format!(
                "Script exited with code {}: {}",
                code,
                abbreviate(output.stderr.trim(), 2048)
            )))
        }
    }
}

fn memory_limit(output: &ProcessOutput, max_memory_mb: Option<u64>) -> EvalError {
    EvalError::MemoryLimit {
        limit_mb: max_memory_mb.unwrap_or_default(),
        details: last_line(&output.stderr),
    }
}

/// Decode the report line, naming the collector limit when it cut the
/// output short.
fn decode_harness_report(output: &ProcessOutput) -> Result<ExecutionResult> {
    synth::decode_report(&output.stdout).map_err(|err| match &output.output_integrity {
        OutputIntegrity::Complete => err,
        integrity => EvalError::Codec(format!("Harness output was not collected completely ({}): {}", integrity, err)),
    })
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}
