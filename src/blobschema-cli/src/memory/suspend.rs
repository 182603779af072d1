//! Scoped suspension of the target process
//!
//! The target is stopped with SIGSTOP when the guard is created and
//! continued with SIGCONT when it drops, on every exit path.

use anyhow::{bail, Result};

pub struct SuspendGuard {
    pid: u32,
}

impl SuspendGuard {
    pub fn new(pid: u32) -> Result<Self> {
        signal(pid, libc::SIGSTOP)?;
        tracing::debug!(pid, "suspended target");
        Ok(Self { pid })
    }
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        match signal(self.pid, libc::SIGCONT) {
            Ok(()) => tracing::debug!(pid = self.pid, "resumed target"),
            Err(e) => tracing::error!(pid = self.pid, "failed to resume target: {e}"),
        }
    }
}

fn signal(pid: u32, sig: libc::c_int) -> Result<()> {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        bail!("Invalid pid {}", pid);
    };
    if pid <= 0 {
        bail!("Invalid pid {}", pid);
    }
    // SAFETY: kill has no memory safety requirements; pid is a positive process id
    let rc = unsafe { libc::kill(pid, sig) };
    if rc != 0 {
        bail!(
            "Failed to signal process {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}
