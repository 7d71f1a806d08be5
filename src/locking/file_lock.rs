//! Advisory locking over shared sidecar files.
//!
//! Unlike a lock held for the lifetime of one CLI invocation, a sidecar
//! lock guards a single read-modify-rename critical section: multiple
//! independent processes (the monitor, the audio worker, the transcript
//! accumulator, the zapping detector) update the same `.json` sidecar, so
//! the lock must be acquired, used, and released within one function call.

use crate::constants::LOCK_FILE_EXTENSION;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lock file content, useful for diagnosing a stuck lock.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that holds the lock.
    pub pid: u32,
    /// Hostname of the machine.
    pub hostname: String,
    /// When the lock was acquired.
    pub started: DateTime<Utc>,
    /// Path to the sidecar file being guarded.
    pub target: PathBuf,
}

/// Retry budget for acquiring a contended sidecar lock.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of acquisition attempts before giving up.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            retry_delay: Duration::from_millis(25),
        }
    }
}

/// RAII guard for one read-modify-rename critical section over `target`.
///
/// Dropping the guard removes the lock file; callers should prefer letting
/// the guard fall out of scope over calling [`SidecarLock::release`]
/// explicitly, since the `Drop` impl is what protects against early
/// returns.
pub struct SidecarLock {
    lock_path: PathBuf,
}

impl SidecarLock {
    /// Blocking acquire: retries according to `policy`, sleeping between
    /// attempts, until the lock is created or the attempt budget is spent.
    pub fn acquire_blocking(target: &Path, policy: RetryPolicy) -> Result<Self> {
        let lock_path = Self::lock_path_for(target);
        register_lock(&lock_path);

        for attempt in 0..policy.max_attempts {
            match create_lock_file(&lock_path, target) {
                Ok(()) => return Ok(Self { lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt + 1 == policy.max_attempts {
                        break;
                    }
                    std::thread::sleep(policy.retry_delay);
                }
                Err(e) => {
                    unregister_lock(&lock_path);
                    return Err(Error::Io(e));
                }
            }
        }

        unregister_lock(&lock_path);
        Err(Error::LockTimeout {
            path: lock_path,
            attempts: policy.max_attempts,
        })
    }

    /// Single-shot, non-blocking acquire: fails immediately if the lock is
    /// already held.
    pub fn try_acquire(target: &Path) -> Result<Self> {
        let lock_path = Self::lock_path_for(target);
        register_lock(&lock_path);

        match create_lock_file(&lock_path, target) {
            Ok(()) => Ok(Self { lock_path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                unregister_lock(&lock_path);
                Err(Error::AlreadyLocked { path: lock_path })
            }
            Err(e) => {
                unregister_lock(&lock_path);
                Err(Error::Io(e))
            }
        }
    }

    /// The lock file path for a given target path.
    #[must_use]
    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut file_name = target
            .file_name()
            .map_or_else(|| std::ffi::OsString::from("unknown"), std::ffi::OsStr::to_os_string);
        file_name.push(LOCK_FILE_EXTENSION);
        target.with_file_name(file_name)
    }

    /// Whether a lock file currently exists for `target`.
    #[must_use]
    pub fn is_locked(target: &Path) -> bool {
        Self::lock_path_for(target).exists()
    }

    /// Release the lock explicitly (equivalent to dropping the guard).
    pub fn release(self) {
        drop(self);
    }
}

fn create_lock_file(lock_path: &Path, target: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(lock_path)?;

    let info = LockInfo {
        pid: std::process::id(),
        hostname: hostname::get().map_or_else(
            |_| "unknown".to_string(),
            |h| h.to_string_lossy().into_owned(),
        ),
        started: Utc::now(),
        target: target.to_path_buf(),
    };
    let json = serde_json::to_string_pretty(&info).unwrap_or_else(|_| "{}".to_string());
    let _ = file.write_all(json.as_bytes());
    Ok(())
}

impl Drop for SidecarLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
        unregister_lock(&self.lock_path);
    }
}

/// Runs `f` while holding a blocking lock over `target`, releasing it
/// (removing the lock file) regardless of whether `f` succeeds.
pub fn with_sidecar_lock<T>(
    target: &Path,
    policy: RetryPolicy,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let lock = SidecarLock::acquire_blocking(target, policy)?;
    let result = f();
    lock.release();
    result
}

/// Global registry of active lock paths, drained on `SIGINT` so a killed
/// process does not leave sidecars permanently locked.
static ACTIVE_LOCKS: std::sync::LazyLock<std::sync::Mutex<Vec<PathBuf>>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(Vec::new()));

/// Register a lock path for cleanup on signal.
pub fn register_lock(path: &Path) {
    if let Ok(mut locks) = ACTIVE_LOCKS.lock() {
        locks.push(path.to_path_buf());
    }
}

/// Unregister a lock path after normal cleanup.
pub fn unregister_lock(path: &Path) {
    if let Ok(mut locks) = ACTIVE_LOCKS.lock() {
        locks.retain(|p| p != path);
    }
}

/// Clean up all registered locks. Called from the `Ctrl+C` handler.
///
/// Recovers from a poisoned mutex so cleanup still runs if another thread
/// panicked while holding it, and drains the registry so each path is only
/// cleaned up once.
pub fn cleanup_all_locks() {
    let paths = {
        let mut locks = ACTIVE_LOCKS
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::take(&mut *locks)
    };
    for lock_path in paths {
        let _ = fs::remove_file(&lock_path);
    }
}
