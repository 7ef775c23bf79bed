use crate::harness::codec::{self, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::time::SystemTime;

pub const CORRECTNESS: &str = "correctness";
pub const RUNTIME_MS: &str = "runtime_ms";
pub const PASSED_TESTS: &str = "passed_tests";
pub const TOTAL_TESTS: &str = "total_tests";

/// File name the candidate is materialized under in suite mode.
pub const CANDIDATE_MODULE_FILE: &str = "candidate.py";
/// File name used when a suite only carries `tests_code`.
pub const DEFAULT_TESTS_FILE: &str = "test_candidate.py";

/// Evaluation lifecycle of a program.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    #[default]
    Unevaluated,
    Evaluating,
    Evaluated,
    FailedEvaluation,
}

impl ProgramStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgramStatus::Evaluated | ProgramStatus::FailedEvaluation)
    }
}

impl std::fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramStatus::Unevaluated => write!(f, "unevaluated"),
            ProgramStatus::Evaluating => write!(f, "evaluating"),
            ProgramStatus::Evaluated => write!(f, "evaluated"),
            ProgramStatus::FailedEvaluation => write!(f, "failed_evaluation"),
        }
    }
}

/// A candidate program and its fitness verdict.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub code: String,
    #[serde(default, with = "codec::float_map")]
    pub fitness_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub island_id: Option<u32>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub status: ProgramStatus,
    #[serde(default = "SystemTime::now")]
    pub created_at: SystemTime,
}

impl Program {
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            fitness_scores: BTreeMap::new(),
            generation: 0,
            parent_id: None,
            island_id: None,
            errors: Vec::new(),
            status: ProgramStatus::Unevaluated,
            created_at: SystemTime::now(),
        }
    }

    pub fn score(&self, objective: &str) -> Option<f64> {
        self.fitness_scores.get(objective).copied()
    }

    pub fn correctness(&self) -> Option<f64> {
        self.score(CORRECTNESS)
    }

    pub fn set_score(&mut self, objective: &str, value: f64) {
        self.fitness_scores.insert(objective.to_string(), value);
    }
}

/// One input/output example.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IoExample {
    /// Positional sequence, keyword map, null, or a single scalar argument
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
}

impl IoExample {
    pub fn new(input: Value, output: Value) -> Self {
        Self { input, output }
    }
}

/// Externally authored tests for the delegated suite runner.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSuite {
    /// Relative filename -> contents
    pub files: BTreeMap<String, String>,
    pub explanation: String,
    pub cases: Vec<IoExample>,
    pub tests_code: String,
}

impl TestSuite {
    /// Files to write into the scratch directory; `tests_code` stands in
    /// for an empty `files` map.
    pub fn materialized_files(&self) -> BTreeMap<String, String> {
        if self.files.is_empty() && !self.tests_code.trim().is_empty() {
            let mut files = BTreeMap::new();
            files.insert(DEFAULT_TESTS_FILE.to_string(), self.tests_code.clone());
            return files;
        }
        self.files.clone()
    }

    pub fn has_files(&self) -> bool {
        !self.materialized_files().is_empty()
    }
}

/// Checks a suite filename stays inside the scratch directory and does not
/// shadow the candidate module.
pub fn validate_suite_filename(name: &str) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("suite filename is empty".to_string());
    }
    let path = Path::new(name);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("suite filename escapes the scratch directory: {name}"))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("suite filename must be relative: {name}"))
            }
        }
    }
    if path == Path::new(CANDIDATE_MODULE_FILE) {
        return Err(format!("suite filename collides with the candidate module: {name}"));
    }
    Ok(())
}

/// What to evaluate a program against.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub function_name_to_evolve: Option<String>,
    #[serde(default)]
    pub input_output_examples: Option<Vec<IoExample>>,
    #[serde(default)]
    pub test_suite: Option<TestSuite>,
    /// Advisory; not enforced by the sandbox
    #[serde(default)]
    pub allowed_imports: Option<Vec<String>>,
    #[serde(default)]
    pub max_memory_mb: Option<u64>,
}

/// Grading contract selected for one evaluation.
#[derive(Debug, Clone, Copy)]
pub enum GradingMode<'a> {
    Suite(&'a TestSuite),
    Examples(&'a [IoExample]),
    Neutral,
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// A suite with files wins; a suite with only structured cases grades
    /// those cases; then the task's own examples; else neutral.
    pub fn grading_mode(&self) -> GradingMode<'_> {
        if let Some(suite) = &self.test_suite {
            if suite.has_files() {
                return GradingMode::Suite(suite);
            }
            if !suite.cases.is_empty() {
                return GradingMode::Examples(&suite.cases);
            }
        }
        match &self.input_output_examples {
            Some(examples) if !examples.is_empty() => GradingMode::Examples(examples),
            _ => GradingMode::Neutral,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Success,
    Error,
}

/// Per-case record emitted by the harness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseRecord {
    pub test_case_id: usize,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub runtime_ms: f64,
    pub status: CaseStatus,
}

impl CaseRecord {
    pub fn is_success(&self) -> bool {
        self.status == CaseStatus::Success
    }
}

/// Harness batch result. Produced fresh per call.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub test_outputs: Vec<CaseRecord>,
    #[serde(default)]
    pub average_runtime_ms: f64,
}

impl ExecutionResult {
    pub fn record(&self, test_case_id: usize) -> Option<&CaseRecord> {
        self.test_outputs
            .iter()
            .find(|record| record.test_case_id == test_case_id)
    }
}
