//! Process runner: spawn, watch, kill, reap.
//!
//! Every child runs in its own process group with a wall-clock deadline.
//! On expiry the group gets SIGTERM, a short grace period, then SIGKILL,
//! and the direct child is reaped before the runner returns. The group is
//! also swept after a normal exit so no descendant outlives the run.

use crate::config::settings::{EvaluatorConfig, MemoryEnforcement};
use crate::config::types::{to_process_error, EvalError, OutputIntegrity, Result, RunStatus};
use crate::exec::limits::{self, ChildLimits};
use crate::exec::output::{OutputCollector, OutputLimits};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stderr markers of an allocation failure under the address-space ceiling.
const MEMORY_MARKERS: [&str; 2] = ["MemoryError", "Cannot allocate memory"];

/// One command to run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub max_memory_mb: Option<u64>,
    /// Complete child environment; nothing is inherited.
    pub environment: Vec<(String, String)>,
}

/// What the runner did to stop a child that outlived its deadline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

impl std::fmt::Display for KillReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SIGTERM {}, SIGKILL {}, waited {} ms",
            if self.term_sent { "sent" } else { "not sent" },
            if self.kill_sent { "sent" } else { "not sent" },
            self.waited_ms
        )?;
        if !self.notes.is_empty() {
            write!(f, " ({})", self.notes.join("; "))?;
        }
        Ok(())
    }
}

/// Observed outcome of one run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub pid: i32,
    pub exit_code: Option<i32>,
    pub term_signal: Option<i32>,
    pub timed_out: bool,
    pub memory_exceeded: bool,
    pub wall_time_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub output_integrity: OutputIntegrity,
    pub kill_report: Option<KillReport>,
}

impl ProcessOutput {
    pub fn status(&self) -> RunStatus {
        if self.timed_out {
            RunStatus::TimeLimit
        } else if self.memory_exceeded {
            RunStatus::MemoryLimit
        } else if self.term_signal.is_some() {
            RunStatus::Signaled
        } else if self.exit_code == Some(0) {
            RunStatus::Ok
        } else {
            RunStatus::RuntimeError
        }
    }
}

/// Runs commands under a deadline and an optional memory ceiling.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    memory_enforcement: MemoryEnforcement,
    kill_grace: Duration,
    output_limits: OutputLimits,
}

impl ProcessRunner {
    pub fn new(config: &EvaluatorConfig) -> Self {
        ProcessRunner {
            memory_enforcement: config.memory_enforcement,
            kill_grace: Duration::from_millis(config.kill_grace_ms),
            output_limits: OutputLimits {
                stdout_limit: config.stdout_limit_bytes,
                stderr_limit: config.stderr_limit_bytes,
                ..OutputLimits::default()
            },
        }
    }

    pub fn run(&self, request: &RunRequest) -> Result<ProcessOutput> {
        let program = request
            .command
            .first()
            .ok_or_else(|| EvalError::Config("empty command".to_string()))?;

        let child_limits = match self.memory_enforcement {
            MemoryEnforcement::AddressSpace => ChildLimits::from_memory_mb(request.max_memory_mb),
            MemoryEnforcement::Watchdog => ChildLimits::default(),
        };
        let rss_ceiling = match self.memory_enforcement {
            MemoryEnforcement::Watchdog => request.max_memory_mb.map(|mb| mb.saturating_mul(1024 * 1024)),
            MemoryEnforcement::AddressSpace => None,
        };

        let mut cmd = Command::new(program);
        cmd.args(&request.command[1..])
            .current_dir(&request.workdir)
            .env_clear()
            .envs(request.environment.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // SAFETY: the closure only issues setpgid/prctl/setrlimit syscalls.
        unsafe {
            cmd.pre_exec(move || limits::apply_in_child(child_limits));
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                EvalError::Process(format!("Executable not found: {}", program))
            }
            _ => to_process_error(&format!("spawn({})", program), e),
        })?;
        let pid = child.id() as i32;
        log::debug!("spawned {} as pid {}", program, pid);

        let collector = OutputCollector::start(child.stdout.take(), child.stderr.take(), &self.output_limits);

        let mut timed_out = false;
        let mut watchdog_fired = false;
        let mut kill_report = None;

        let exit_status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if started.elapsed() >= request.timeout {
                        timed_out = true;
                        log::info!("pid {} exceeded {:?}; terminating group", pid, request.timeout);
                        kill_report = Some(terminate_group(pid, self.kill_grace));
                        break reap(&mut child)?;
                    }
                    if let Some(ceiling) = rss_ceiling {
                        if resident_bytes(pid).is_some_and(|rss| rss > ceiling) {
                            watchdog_fired = true;
                            log::info!("pid {} exceeded resident ceiling of {} bytes", pid, ceiling);
                            kill_report = Some(terminate_group(pid, Duration::ZERO));
                            break reap(&mut child)?;
                        }
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = terminate_group(pid, Duration::ZERO);
                    let _ = child.wait();
                    return Err(to_process_error("wait", e));
                }
            }
        };

        if kill_report.is_none() {
            sweep_group(pid);
        }

        let wall_time_ms = started.elapsed().as_millis() as u64;
        let collected = collector.finish();

        let exit_code = exit_status.code();
        let term_signal = exit_status.signal();
        let memory_exceeded = watchdog_fired
            || (request.max_memory_mb.is_some()
                && exit_code != Some(0)
                && !timed_out
                && MEMORY_MARKERS.iter().any(|marker| collected.stderr.contains(marker)));

        log::debug!(
            "pid {} finished: exit={:?} signal={:?} timed_out={} memory_exceeded={} wall={}ms",
            pid,
            exit_code,
            term_signal,
            timed_out,
            memory_exceeded,
            wall_time_ms
        );

        Ok(ProcessOutput {
            pid,
            exit_code,
            term_signal,
            timed_out,
            memory_exceeded,
            wall_time_ms,
            stdout: collected.stdout,
            stderr: collected.stderr,
            output_integrity: collected.integrity,
            kill_report,
        })
    }
}

/// SIGTERM the group, wait `grace`, then SIGKILL it.
pub fn terminate_group(pgid: i32, grace: Duration) -> KillReport {
    let mut report = KillReport::default();
    let start = Instant::now();
    let group = Pid::from_raw(pgid);

    if !grace.is_zero() {
        match killpg(group, Signal::SIGTERM) {
            Ok(()) => report.term_sent = true,
            Err(Errno::ESRCH) => report.notes.push("group already gone before SIGTERM".to_string()),
            Err(e) => report.notes.push(format!("group SIGTERM failed: {}", e)),
        }
        std::thread::sleep(grace);
    }

    match killpg(group, Signal::SIGKILL) {
        Ok(()) => report.kill_sent = true,
        Err(Errno::ESRCH) => report.notes.push("group exited during grace period".to_string()),
        Err(e) => {
            let _ = nix::sys::signal::kill(group, Signal::SIGKILL);
            report.kill_sent = true;
            report.notes.push(format!("group SIGKILL fallback used: {}", e));
        }
    }

    report.waited_ms = start.elapsed().as_millis() as u64;
    report
}

/// Kill whatever is left in the group after the leader exited.
fn sweep_group(pgid: i32) {
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => log::debug!("killed leftover descendants of group {}", pgid),
        Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("failed to sweep process group {}: {}", pgid, e),
    }
}

fn reap(child: &mut Child) -> Result<ExitStatus> {
    loop {
        match child.wait() {
            Ok(status) => return Ok(status),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(to_process_error("wait(killed child)", e)),
        }
    }
}

/// Resident set size of `pid` from `/proc/<pid>/statm`.
#[cfg(target_os = "linux")]
fn resident_bytes(pid: i32) -> Option<u64> {
    let statm = std::fs::read_to_string(format!("/proc/{}/statm", pid)).ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(pages.saturating_mul(page_size as u64))
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes(_pid: i32) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(&EvaluatorConfig {
            kill_grace_ms: 50,
            ..EvaluatorConfig::default()
        })
    }

    fn request(script: &str, timeout: Duration) -> RunRequest {
        RunRequest {
            command: vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
            workdir: std::env::temp_dir(),
            timeout,
            max_memory_mb: None,
            environment: vec![("PATH".to_string(), "/usr/bin:/bin".to_string())],
        }
    }

    fn process_gone(pid: i32) -> bool {
        matches!(nix::sys::signal::kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
    }

    #[test]
    fn status_classification() {
        let mut output = ProcessOutput {
            exit_code: Some(0),
            ..ProcessOutput::default()
        };
        assert_eq!(output.status(), RunStatus::Ok);
        output.exit_code = Some(2);
        assert_eq!(output.status(), RunStatus::RuntimeError);
        output.exit_code = None;
        output.term_signal = Some(9);
        assert_eq!(output.status(), RunStatus::Signaled);
        output.memory_exceeded = true;
        assert_eq!(output.status(), RunStatus::MemoryLimit);
        output.timed_out = true;
        assert_eq!(output.status(), RunStatus::TimeLimit);
    }

    #[test]
    fn captures_exit_code_and_streams() {
        let output = runner()
            .run(&request("echo out; echo err >&2; exit 3", Duration::from_secs(10)))
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.timed_out);
        assert_eq!(output.status(), RunStatus::RuntimeError);
    }

    #[test]
    fn environment_is_not_inherited() {
        std::env::set_var("EVALBOX_RUNNER_TEST_SECRET", "leak");
        let output = runner()
            .run(&request("echo \"[$EVALBOX_RUNNER_TEST_SECRET]\"", Duration::from_secs(10)))
            .unwrap();
        assert_eq!(output.stdout, "[]\n");
    }

    #[test]
    fn deadline_kills_and_reaps() {
        let started = Instant::now();
        let output = runner().run(&request("sleep 30", Duration::from_millis(200))).unwrap();
        assert!(output.timed_out);
        assert_eq!(output.status(), RunStatus::TimeLimit);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(output.kill_report.is_some());
        assert!(process_gone(output.pid));
    }

    #[test]
    fn kill_report_reads_as_one_line() {
        let report = KillReport {
            term_sent: true,
            kill_sent: false,
            waited_ms: 200,
            notes: vec!["group exited during grace period".to_string()],
        };
        assert_eq!(
            report.to_string(),
            "SIGTERM sent, SIGKILL not sent, waited 200 ms (group exited during grace period)"
        );
    }

    #[test]
    fn missing_executable_is_process_error() {
        let mut req = request("", Duration::from_secs(1));
        req.command = vec!["/nonexistent/evalbox-interpreter".to_string()];
        assert!(matches!(runner().run(&req), Err(EvalError::Process(_))));
    }

    #[test]
    fn empty_command_is_config_error() {
        let mut req = request("", Duration::from_secs(1));
        req.command.clear();
        assert!(matches!(runner().run(&req), Err(EvalError::Config(_))));
    }

    #[test]
    fn memory_marker_requires_a_limit() {
        let script = "echo 'MemoryError' >&2; exit 1";
        let output = runner().run(&request(script, Duration::from_secs(10))).unwrap();
        assert!(!output.memory_exceeded);

        let mut limited = request(script, Duration::from_secs(10));
        limited.max_memory_mb = Some(512);
        let output = runner().run(&limited).unwrap();
        assert!(output.memory_exceeded);
        assert_eq!(output.status(), RunStatus::MemoryLimit);
    }
}
