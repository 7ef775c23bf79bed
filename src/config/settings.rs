/// Evaluator configuration loading from evalbox.json
use crate::config::types::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wall-clock budget for one evaluation.
pub const DEFAULT_EVALUATION_TIMEOUT_SECONDS: u64 = 800;

/// How a memory ceiling is enforced on the child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryEnforcement {
    /// `RLIMIT_AS` applied in the child before exec.
    #[default]
    AddressSpace,
    /// Parent polls the child's resident set size and kills on breach.
    /// Linux only; only the direct child is measured.
    Watchdog,
}

/// Evaluator tunables, passed explicitly to [`crate::evaluator::Evaluator::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub evaluation_timeout_seconds: u64,
    pub python_interpreter: String,
    pub interpreter_args: Vec<String>,
    pub suite_command: Vec<String>,
    pub scratch_root: PathBuf,
    pub default_max_memory_mb: Option<u64>,
    pub memory_enforcement: MemoryEnforcement,
    /// Delay between SIGTERM and SIGKILL when a deadline expires
    pub kill_grace_ms: u64,
    pub stdout_limit_bytes: usize,
    pub stderr_limit_bytes: usize,
    /// Host environment variables passed through to the child
    pub preserve_env: Vec<String>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            evaluation_timeout_seconds: DEFAULT_EVALUATION_TIMEOUT_SECONDS,
            python_interpreter: "python3".to_string(),
            interpreter_args: vec!["-B".to_string()],
            suite_command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                "-q".to_string(),
                "-p".to_string(),
                "no:cacheprovider".to_string(),
            ],
            scratch_root: std::env::temp_dir(),
            default_max_memory_mb: None,
            memory_enforcement: MemoryEnforcement::AddressSpace,
            kill_grace_ms: 200,
            stdout_limit_bytes: 8 * 1024 * 1024, // 8 MB
            stderr_limit_bytes: 2 * 1024 * 1024, // 2 MB
            preserve_env: ["PATH", "PYTHONPATH", "VIRTUAL_ENV", "LANG", "LC_ALL", "SYSTEMROOT"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl EvaluatorConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: EvaluatorConfig = serde_json::from_str(&content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load ./evalbox.json when present, defaults otherwise.
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| EvalError::Config(format!("Failed to get current directory: {}", e)))?
            .join("evalbox.json");

        if config_path.exists() {
            log::debug!("Loading evaluator config from {}", config_path.display());
            Self::load_from_file(config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_seconds)
    }

    /// Argv prefix that runs a script with the configured interpreter.
    pub fn interpreter_command(&self, script: &Path) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.interpreter_args.len() + 2);
        argv.push(self.python_interpreter.clone());
        argv.extend(self.interpreter_args.iter().cloned());
        argv.push(script.to_string_lossy().to_string());
        argv
    }

    pub fn validate(&self) -> Result<()> {
        if self.evaluation_timeout_seconds == 0 {
            return Err(EvalError::Config(
                "evaluation_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.python_interpreter.trim().is_empty() {
            return Err(EvalError::Config("python_interpreter must not be empty".to_string()));
        }
        if self.suite_command.is_empty() || self.suite_command[0].trim().is_empty() {
            return Err(EvalError::Config("suite_command must not be empty".to_string()));
        }
        if self.default_max_memory_mb == Some(0) {
            return Err(EvalError::Config(
                "default_max_memory_mb must be greater than zero when set".to_string(),
            ));
        }
        if self.stdout_limit_bytes == 0 {
            return Err(EvalError::Config("stdout_limit_bytes must be greater than zero".to_string()));
        }
        Ok(())
    }
}
