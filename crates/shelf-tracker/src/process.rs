//! OS process helpers: liveness, signals, and the process table seam.
//!
//! Liveness uses procfs so that pid reuse is detected through the process
//! start time. The process table used by directory monitoring is behind the
//! `ProcessTable` trait; `SysinfoProcessTable` is the production backend.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

/// Signals the tracker sends to game processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Polite termination request (SIGTERM)
    Terminate,
    /// Forced kill (SIGKILL)
    Kill,
}

/// Reads the kernel start time of a process, in clock ticks since boot.
///
/// Returns `None` if the process does not exist.
pub fn process_start_time(pid: u32) -> Option<u64> {
    let process = procfs::process::Process::new(i32::try_from(pid).ok()?).ok()?;
    let stat = process.stat().ok()?;
    Some(stat.starttime)
}

/// Checks whether `pid` is a live process.
///
/// Returns `false` if:
/// - The process no longer exists
/// - The process is a zombie or dead (exited, not yet reaped)
/// - `expected_start_time` is given and differs (the pid was reused)
pub fn is_process_alive(pid: u32, expected_start_time: Option<u64>) -> bool {
    let Ok(raw_pid) = i32::try_from(pid) else {
        return false;
    };

    let stat = match procfs::process::Process::new(raw_pid).and_then(|p| p.stat()) {
        Ok(stat) => stat,
        Err(_) => {
            debug!(pid, "is_process_alive: process NOT FOUND in /proc");
            return false;
        }
    };

    if matches!(stat.state, 'Z' | 'X' | 'x') {
        debug!(pid, state = %stat.state, "is_process_alive: process has exited");
        return false;
    }

    if let Some(expected) = expected_start_time {
        if stat.starttime != expected {
            debug!(
                pid,
                expected,
                current = stat.starttime,
                "is_process_alive: start time MISMATCH - PID reused?"
            );
            return false;
        }
    }

    true
}

/// Sends `signal` to `pid`.
///
/// # Errors
/// Returns the OS error; `ESRCH` means the process is already gone.
pub fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    let raw_pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };

    // SAFETY: kill(2) has no memory-safety preconditions.
    let result = unsafe { libc::kill(raw_pid, signo) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// True if `path` lies inside `root`, compared component-wise.
///
/// `/games/foo-bar` is not inside `/games/foo`.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

// ============================================================================
// Process Table
// ============================================================================

/// A view of the live process table, as needed by directory monitoring.
pub trait ProcessTable: Send {
    /// Pids of processes whose executable or working directory is inside
    /// `root`.
    fn processes_under(&mut self, root: &Path) -> HashSet<u32>;
}

/// `ProcessTable` backed by sysinfo.
pub struct SysinfoProcessTable {
    system: System,
    own_pid: u32,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            own_pid: std::process::id(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn processes_under(&mut self, root: &Path) -> HashSet<u32> {
        // Only exe and cwd matter; cwd can change, exe cannot
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cwd(UpdateKind::Always),
        );

        self.system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != self.own_pid)
            .filter(|(_, process)| {
                process.exe().is_some_and(|exe| is_within(exe, root))
                    || process.cwd().is_some_and(|cwd| is_within(cwd, root))
            })
            .map(|(pid, _)| Pid::as_u32(*pid))
            .collect()
    }
}
