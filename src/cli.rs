use crate::config::settings::EvaluatorConfig;
use crate::core::types::{Program, TaskDefinition};
use crate::evaluator::Evaluator;
use crate::exec::env::child_environment;
use crate::exec::runner::{ProcessRunner, RunRequest};
use crate::safety::workspace::ScratchDir;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Evaluator config file (defaults to ./evalbox.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate candidate programs against a task definition
    Evaluate {
        /// Task definition JSON
        #[arg(long)]
        task: PathBuf,
        /// Candidate source files; the file stem becomes the program id
        #[arg(long, required = true, num_args = 1..)]
        code: Vec<PathBuf>,
        /// Maximum evaluations running at once
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        /// Wall-clock limit per evaluation in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Parse a candidate without running it
    CheckSyntax {
        /// Candidate source file
        file: PathBuf,
    },
    /// Check that the interpreter and the suite runner are usable
    CheckDeps {
        /// Print version details
        #[arg(long)]
        verbose: bool,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Evaluate {
            task,
            code,
            concurrency,
            timeout,
        } => evaluate(config, &task, &code, concurrency, timeout),
        Commands::CheckSyntax { file } => check_syntax(&file),
        Commands::CheckDeps { verbose } => check_dependencies(&config, verbose),
    }
}

fn load_config(path: Option<&Path>) -> Result<EvaluatorConfig> {
    let config = match path {
        Some(path) => EvaluatorConfig::load_from_file(path)?,
        None => EvaluatorConfig::load_default()?,
    };
    Ok(config)
}

fn evaluate(
    mut config: EvaluatorConfig,
    task_path: &Path,
    code_paths: &[PathBuf],
    concurrency: usize,
    timeout: Option<u64>,
) -> Result<()> {
    if let Some(seconds) = timeout {
        config.evaluation_timeout_seconds = seconds;
    }

    let task_text = std::fs::read_to_string(task_path)
        .with_context(|| format!("failed to read task definition {}", task_path.display()))?;
    let task: TaskDefinition = serde_json::from_str(&task_text)
        .with_context(|| format!("failed to parse task definition {}", task_path.display()))?;

    let mut programs = Vec::with_capacity(code_paths.len());
    for path in code_paths {
        let code = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read candidate {}", path.display()))?;
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        programs.push(Program::new(id, code));
    }

    let evaluator = Evaluator::new(config)?;
    let evaluated = evaluator.evaluate_all(programs, &task, concurrency);
    println!("{}", serde_json::to_string_pretty(&evaluated)?);
    Ok(())
}

fn check_syntax(file: &Path) -> Result<()> {
    let code = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let diagnostics = crate::validate::validate(&code);
    if diagnostics.is_empty() {
        println!("{}: OK", file.display());
        return Ok(());
    }
    for diagnostic in &diagnostics {
        println!("{}: {}", file.display(), diagnostic);
    }
    std::process::exit(1);
}

fn check_dependencies(config: &EvaluatorConfig, verbose: bool) -> Result<()> {
    println!("Checking evaluation dependencies...");
    println!();

    let runner = ProcessRunner::new(config);
    let mut suite_probe = config.suite_command.clone();
    suite_probe.push("--version".to_string());
    let probes = [
        ("Python interpreter", vec![config.python_interpreter.clone(), "--version".to_string()]),
        ("Suite runner", suite_probe),
    ];

    let mut all_ok = true;
    for (name, argv) in &probes {
        match probe(config, &runner, argv) {
            Ok(version) => {
                println!("OK      {}", name);
                if verbose {
                    println!("        {} -> {}", argv.join(" "), version);
                }
            }
            Err(err) => {
                all_ok = false;
                println!("MISSING {}", name);
                if verbose {
                    println!("        {} -> {}", argv.join(" "), err);
                }
            }
        }
    }

    println!();
    if all_ok {
        println!("evalbox is ready to use");
        Ok(())
    } else {
        println!("Install the missing tools or adjust python_interpreter / suite_command in evalbox.json");
        std::process::exit(1);
    }
}

/// Run a version probe through the same runner evaluations use.
fn probe(config: &EvaluatorConfig, runner: &ProcessRunner, argv: &[String]) -> Result<String> {
    let mut scratch = ScratchDir::create(&config.scratch_root)?;
    let request = RunRequest {
        command: argv.to_vec(),
        workdir: scratch.path().to_path_buf(),
        timeout: PROBE_TIMEOUT,
        max_memory_mb: None,
        environment: child_environment(config, scratch.path()),
    };
    let output = runner.run(&request);
    scratch.cleanup();
    let output = output?;

    let text = if output.stdout.trim().is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    let first_line = text.lines().next().unwrap_or("").trim().to_string();
    if output.exit_code == Some(0) {
        Ok(first_line)
    } else {
        anyhow::bail!("exited with {:?}: {}", output.exit_code, first_line)
    }
}
