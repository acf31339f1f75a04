use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::process::Child;
use tracing::{info, warn};

/// Handle to the supervised bot process.
pub struct BotHandle {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    child: Mutex<Option<Child>>,
}

impl BotHandle {
    pub fn new(pid: u32, child: Child) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
            child: Mutex::new(Some(child)),
        }
    }

    /// Forcefully terminates the process if it is still attached.
    pub fn kill(&self) {
        let mut guard = self.child.lock();
        if let Some(child) = guard.as_mut() {
            match child.start_kill() {
                Ok(()) => info!("killed bot process (PID: {})", self.pid),
                // Already exited is fine.
                Err(e) => warn!("failed to kill bot process {}: {e}", self.pid),
            }
        }
    }

    /// Polls the child for an exit status without blocking.
    pub fn try_wait(&self) -> std::io::Result<Option<std::process::ExitStatus>> {
        let mut guard = self.child.lock();
        match guard.as_mut() {
            Some(child) => {
                let status = child.try_wait()?;
                if status.is_some() {
                    // Drop the handle so Drop does not re-kill a dead process.
                    guard.take();
                }
                Ok(status)
            }
            None => Ok(None),
        }
    }
}

impl Drop for BotHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.lock().take() {
            if child.start_kill().is_ok() {
                info!("killed bot process {} on drop", self.pid);
            }
        }
    }
}

/// The launcher supervises at most one bot process at a time.
#[derive(Default)]
pub struct BotRegistry {
    current: Mutex<Option<Arc<BotHandle>>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32, child: Child) -> Arc<BotHandle> {
        let handle = Arc::new(BotHandle::new(pid, child));
        *self.current.lock() = Some(handle.clone());
        handle
    }

    pub fn current(&self) -> Option<Arc<BotHandle>> {
        self.current.lock().clone()
    }

    pub fn kill_current(&self) {
        if let Some(handle) = self.current() {
            handle.kill();
        }
    }

    pub fn clear(&self) {
        *self.current.lock() = None;
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().is_some()
    }
}
