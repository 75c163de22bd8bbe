//! Whole-tree termination of child processes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Thread-safe handle for killing a child and all of its descendants.
///
/// On unix the child is expected to lead its own process group (spawned
/// with `process_group(0)`), so signalling the negative pid reaches every
/// descendant that has not moved to another group. On Windows the tree is
/// walked by `taskkill /T`.
#[derive(Debug, Clone)]
pub struct ProcessTreeKiller {
    /// Process ID of the tree root.
    pid: u32,
    /// Whether the kill has been requested.
    killed: Arc<AtomicBool>,
}

impl ProcessTreeKiller {
    /// Create a killer for the tree rooted at `pid`.
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Root process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Kill the whole tree. Only the first call has an effect.
    pub fn kill_tree(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return; // Already killed
        }

        tracing::debug!("Killing process tree rooted at {}", self.pid);

        #[cfg(unix)]
        {
            let Ok(pid) = libc::pid_t::try_from(self.pid) else {
                return;
            };
            // SIGKILL the group, then the root in case it left the group
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
                libc::kill(pid, libc::SIGKILL);
            }
        }

        #[cfg(windows)]
        {
            let result = std::process::Command::new("taskkill")
                .args(["/T", "/F", "/PID", &self.pid.to_string()])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
            if let Err(e) = result {
                tracing::warn!("taskkill failed for {}: {}", self.pid, e);
            }
        }
    }

    /// Kill whatever is left in the root's process group after the root
    /// exited on its own.
    ///
    /// The group id stays reserved while any member is alive, so a recycled
    /// pid cannot be hit. No-op on Windows, where `taskkill /T` needs a
    /// live root.
    pub fn kill_orphans(&self) {
        #[cfg(unix)]
        {
            let Ok(pid) = libc::pid_t::try_from(self.pid) else {
                return;
            };
            // ESRCH just means the group is already empty
            if unsafe { libc::kill(-pid, libc::SIGKILL) } == 0 {
                tracing::debug!("Killed leftover processes of group {}", self.pid);
            }
        }
    }

    /// Check if kill has been requested.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}
