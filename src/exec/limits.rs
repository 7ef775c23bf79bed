/// Child-side setup applied between fork and exec.
///
/// Runs inside `pre_exec`, so it must stay async-signal-safe: no
/// allocation, no locks, no logging.
use nix::sys::resource::{setrlimit, Resource};
use nix::unistd::{setpgid, Pid};
use std::io;

/// Limits the child applies to itself before exec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildLimits {
    /// Address-space ceiling in bytes
    pub address_space_bytes: Option<u64>,
}

impl ChildLimits {
    pub fn from_memory_mb(max_memory_mb: Option<u64>) -> Self {
        Self {
            address_space_bytes: max_memory_mb.map(|mb| mb.saturating_mul(1024 * 1024)),
        }
    }
}

/// Setup order:
/// 1. own process group, so the whole tree can be signalled at once
/// 2. parent-death signal, so an aborted evaluator leaves no orphans
/// 3. no core dumps
/// 4. address-space ceiling, when requested
pub fn apply_in_child(limits: ChildLimits) -> io::Result<()> {
    setpgid(Pid::from_raw(0), Pid::from_raw(0))?;

    #[cfg(target_os = "linux")]
    {
        use nix::sys::prctl;
        use nix::sys::signal::Signal;
        prctl::set_pdeathsig(Signal::SIGKILL)?;
    }

    setrlimit(Resource::RLIMIT_CORE, 0, 0)?;

    if let Some(bytes) = limits.address_space_bytes {
        let bytes = bytes as libc::rlim_t;
        setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
    }

    Ok(())
}
