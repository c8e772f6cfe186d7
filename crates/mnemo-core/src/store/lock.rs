//! Cross-process advisory lock
//!
//! A single `.lock` file inside the store, held through an OS advisory lock:
//! shared for reads, exclusive for writes. Acquisition polls in 100 ms steps
//! up to a bounded timeout and then surfaces a typed
//! [`MemoryError::LockTimeout`]. A process already holding the lock re-enters
//! without deadlock via a depth counter.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{MemoryError, Result};

/// Default acquisition timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Polling interval while waiting for the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Requested lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        }
    }
}

#[derive(Debug)]
struct LockState {
    handle: Option<File>,
    depth: u32,
}

/// Advisory file lock co-located with the store.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    timeout: Duration,
    state: Mutex<LockState>,
}

impl StoreLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_timeout(path, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            state: Mutex::new(LockState {
                handle: None,
                depth: 0,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, blocking up to the configured timeout.
    ///
    /// Re-entrant: if this instance already holds the lock the depth counter
    /// is bumped and the existing OS lock is reused (a shared hold is not
    /// upgraded).
    pub fn acquire(&self, mode: LockMode) -> Result<LockGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.depth > 0 {
            state.depth += 1;
            return Ok(LockGuard { lock: self });
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        let started = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => break,
                Err(_) if started.elapsed() < self.timeout => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(_) => {
                    return Err(MemoryError::LockTimeout {
                        mode: mode.as_str(),
                        path: self.path.clone(),
                        seconds: self.timeout.as_secs(),
                    });
                }
            }
        }

        state.handle = Some(file);
        state.depth = 1;
        Ok(LockGuard { lock: self })
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            if let Some(file) = state.handle.take() {
                let _ = FileExt::unlock(&file);
            }
        }
    }
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a StoreLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
