//! Device lock manager (spec.md §4.8): authoritative acquire/release with
//! owner ids and timestamps. Registry host entries mirror the outcome in
//! `isLocked`/`lockedBy`/`lockedAt` for fast UI reads, but this module is
//! the single source of truth for whether a lock is actually held.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;

/// Current holder of a lock key.
#[derive(Debug, Clone)]
pub struct LockHolder {
    /// Opaque owner id supplied by the caller.
    pub owner: String,
    /// When the lock was acquired.
    pub locked_at: DateTime<Utc>,
}

/// Interval polled while blocking on a contended lock.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Blocking acquire/release over named lock keys (host names in practice;
/// kept string-keyed so a future per-device scheme does not need a new
/// type). `DashMap`-backed per [`crate::transcript`]'s and
/// [`crate::incident`]'s precedent for per-key state in this pack.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: DashMap<String, LockHolder>,
}

impl LockManager {
    /// Builds an empty lock manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks (polling every [`POLL_INTERVAL`]) until `key` is free or
    /// already held by `owner`, or until `timeout` elapses, in which case
    /// [`Error::DeviceLocked`] names the current holder.
    pub async fn acquire(&self, key: &str, owner: &str, timeout: Duration) -> Result<DateTime<Utc>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.try_acquire(key, owner) {
                Ok(locked_at) => return Ok(locked_at),
                Err(e) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(e);
                    }
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Non-blocking acquire attempt: succeeds immediately if free or
    /// already held by `owner`, otherwise fails with [`Error::DeviceLocked`].
    pub fn try_acquire(&self, key: &str, owner: &str) -> Result<DateTime<Utc>> {
        match self.locks.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                let now = Utc::now();
                slot.insert(LockHolder {
                    owner: owner.to_string(),
                    locked_at: now,
                });
                Ok(now)
            }
            Entry::Occupied(slot) if slot.get().owner == owner => Ok(slot.get().locked_at),
            Entry::Occupied(slot) => Err(Error::DeviceLocked {
                device_id: key.to_string(),
                locked_by: slot.get().owner.clone(),
            }),
        }
    }

    /// Releases `key`, requiring the caller to be the current owner.
    /// Releasing an already-free key is a no-op (idempotent, matching the
    /// rest of the pipeline's tolerance for duplicate cleanup calls).
    pub fn release(&self, key: &str, owner: &str) -> Result<()> {
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(slot) if slot.get().owner == owner => {
                slot.remove();
                Ok(())
            }
            Entry::Occupied(slot) => Err(Error::DeviceLocked {
                device_id: key.to_string(),
                locked_by: slot.get().owner.clone(),
            }),
            Entry::Vacant(_) => Ok(()),
        }
    }

    /// Current holder of `key`, if any.
    #[must_use]
    pub fn status(&self, key: &str) -> Option<LockHolder> {
        self.locks.get(key).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_free_key_succeeds() {
        let manager = LockManager::new();
        assert!(manager.try_acquire("host1", "alice").is_ok());
        assert!(manager.status("host1").is_some());
    }

    #[test]
    fn test_try_acquire_same_owner_is_reentrant() {
        let manager = LockManager::new();
        manager.try_acquire("host1", "alice").unwrap();
        assert!(manager.try_acquire("host1", "alice").is_ok());
    }

    #[test]
    fn test_try_acquire_other_owner_fails() {
        let manager = LockManager::new();
        manager.try_acquire("host1", "alice").unwrap();
        let err = manager.try_acquire("host1", "bob").unwrap_err();
        assert!(matches!(err, Error::DeviceLocked { .. }));
    }

    #[test]
    fn test_release_wrong_owner_fails() {
        let manager = LockManager::new();
        manager.try_acquire("host1", "alice").unwrap();
        assert!(manager.release("host1", "bob").is_err());
    }

    #[test]
    fn test_release_then_reacquire_by_other_owner() {
        let manager = LockManager::new();
        manager.try_acquire("host1", "alice").unwrap();
        manager.release("host1", "alice").unwrap();
        assert!(manager.try_acquire("host1", "bob").is_ok());
    }

    #[test]
    fn test_release_free_key_is_noop() {
        let manager = LockManager::new();
        assert!(manager.release("host1", "alice").is_ok());
    }

    #[tokio::test]
    async fn test_acquire_times_out_on_contention() {
        let manager = LockManager::new();
        manager.try_acquire("host1", "alice").unwrap();
        let result = manager.acquire("host1", "bob", Duration::from_millis(120)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_acquire_unblocks_after_release() {
        let manager = std::sync::Arc::new(LockManager::new());
        manager.try_acquire("host1", "alice").unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire("host1", "bob", Duration::from_secs(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.release("host1", "alice").unwrap();

        let result = waiter.await.unwrap();
        assert!(result.is_ok());
    }
}
