//! In-memory host registry (spec.md §3, §4.8): a `DashMap` keyed by
//! `host_name`, with 120s staleness pruning and the lock-state mirror the
//! spec requires on each entry.

use super::lock::LockManager;
use super::types::{HostEntry, HostRegistration};
use crate::error::Result;
use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;

/// Thread-safe host registry. Cheap to clone (an `Arc` inside, mirroring
/// `broz-messaging`'s connection-state `DashMap` usage): every service
/// that needs to read or mutate it can hold an owned handle.
#[derive(Default)]
pub struct Registry {
    hosts: DashMap<String, HostEntry>,
    locks: LockManager,
}

impl Registry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or re-registers a host, resetting `last_seen` to now and
    /// preserving any lock currently held for it.
    pub fn register(&self, req: HostRegistration) -> HostEntry {
        let host_name = req.host_name.clone();
        let mut entry = HostEntry::from_registration(req, Utc::now());
        self.mirror_lock_state(&host_name, &mut entry);
        self.hosts.insert(host_name, entry.clone());
        entry
    }

    /// Refreshes `last_seen` and optional system stats for a registered
    /// host. Returns `None` if the host is not registered (caller maps
    /// this to the spec's `{status: "not_registered", action: "register"}`
    /// response).
    pub fn ping(&self, host_name: &str, system_stats: Option<serde_json::Value>) -> Option<HostEntry> {
        let mut entry = self.hosts.get_mut(host_name)?;
        entry.last_seen = Utc::now();
        if system_stats.is_some() {
            entry.system_stats = system_stats;
        }
        Some(entry.clone())
    }

    /// Removes a host. Returns whether it was present.
    pub fn unregister(&self, host_name: &str) -> bool {
        self.hosts.remove(host_name).is_some()
    }

    /// Single host lookup, without pruning.
    #[must_use]
    pub fn get(&self, host_name: &str) -> Option<HostEntry> {
        self.hosts.get(host_name).map(|entry| entry.clone())
    }

    /// Prunes hosts whose `last_seen` is older than `stale_after`, then
    /// returns the remaining hosts. Mirrors spec.md §4.8's
    /// `cleanup_stale_hosts(120s)` combined with `getAllHosts`.
    pub fn get_all_hosts(&self, stale_after: Duration) -> Vec<HostEntry> {
        self.cleanup_stale(stale_after);
        self.hosts.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Evicts hosts not pinged within `stale_after`. Returns the number
    /// removed.
    pub fn cleanup_stale(&self, stale_after: Duration) -> usize {
        let now = Utc::now();
        let stale: Vec<String> = self
            .hosts
            .iter()
            .filter(|entry| {
                now.signed_duration_since(entry.last_seen)
                    .to_std()
                    .is_ok_and(|age| age > stale_after)
            })
            .map(|entry| entry.key().clone())
            .collect();
        for host_name in &stale {
            self.hosts.remove(host_name);
        }
        stale.len()
    }

    /// Number of currently registered hosts (post-pruning callers should
    /// prefer [`Self::get_all_hosts`]; this is a raw count for metrics).
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the registry currently holds no hosts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Blocking device-lock acquire for `host_name`, mirroring the result
    /// into the host entry's `isLocked`/`lockedBy`/`lockedAt` fields.
    pub async fn acquire_lock(&self, host_name: &str, owner: &str, timeout: Duration) -> Result<()> {
        self.locks.acquire(host_name, owner, timeout).await?;
        if let Some(mut entry) = self.hosts.get_mut(host_name) {
            self.mirror_lock_state(host_name, &mut entry);
        }
        Ok(())
    }

    /// Releases a device lock, clearing the host entry's lock mirror.
    pub fn release_lock(&self, host_name: &str, owner: &str) -> Result<()> {
        self.locks.release(host_name, owner)?;
        if let Some(mut entry) = self.hosts.get_mut(host_name) {
            self.mirror_lock_state(host_name, &mut entry);
        }
        Ok(())
    }

    fn mirror_lock_state(&self, host_name: &str, entry: &mut HostEntry) {
        match self.locks.status(host_name) {
            Some(holder) => {
                entry.is_locked = true;
                entry.locked_by = Some(holder.owner);
                entry.locked_at = Some(holder.locked_at);
            }
            None => {
                entry.is_locked = false;
                entry.locked_by = None;
                entry.locked_at = None;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::types::DeviceRegistration;

    fn registration(host_name: &str) -> HostRegistration {
        HostRegistration {
            host_name: host_name.to_string(),
            host_url: "http://127.0.0.1:9000".to_string(),
            host_port: Some(9000),
            devices: vec![DeviceRegistration {
                device_id: "device1".to_string(),
                device_name: "Living Room".to_string(),
                device_model: "stb-x1".to_string(),
                device_capabilities: vec![],
                device_verification_types: vec![],
                device_action_types: vec![],
            }],
            system_stats: None,
        }
    }

    #[test]
    fn test_register_then_get() {
        let registry = Registry::new();
        registry.register(registration("host-a"));
        let entry = registry.get("host-a").unwrap();
        assert_eq!(entry.devices.len(), 1);
        assert!(!entry.is_locked);
    }

    #[test]
    fn test_ping_unknown_host_returns_none() {
        let registry = Registry::new();
        assert!(registry.ping("ghost", None).is_none());
    }

    #[test]
    fn test_ping_known_host_refreshes_last_seen() {
        let registry = Registry::new();
        registry.register(registration("host-a"));
        let before = registry.get("host-a").unwrap().last_seen;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let pinged = registry.ping("host-a", None).unwrap();
        assert!(pinged.last_seen >= before);
    }

    #[test]
    fn test_unregister_removes_host() {
        let registry = Registry::new();
        registry.register(registration("host-a"));
        assert!(registry.unregister("host-a"));
        assert!(registry.get("host-a").is_none());
        assert!(!registry.unregister("host-a"));
    }

    #[test]
    fn test_cleanup_stale_prunes_old_entries() {
        let registry = Registry::new();
        registry.register(registration("host-a"));
        if let Some(mut entry) = registry.hosts.get_mut("host-a") {
            entry.last_seen = Utc::now() - chrono::Duration::seconds(200);
        }
        let pruned = registry.cleanup_stale(Duration::from_secs(120));
        assert_eq!(pruned, 1);
        assert!(registry.get("host-a").is_none());
    }

    #[test]
    fn test_get_all_hosts_excludes_stale() {
        let registry = Registry::new();
        registry.register(registration("host-a"));
        registry.register(registration("host-b"));
        if let Some(mut entry) = registry.hosts.get_mut("host-a") {
            entry.last_seen = Utc::now() - chrono::Duration::seconds(200);
        }
        let hosts = registry.get_all_hosts(Duration::from_secs(120));
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].host_name, "host-b");
    }

    #[tokio::test]
    async fn test_acquire_lock_mirrors_into_host_entry() {
        let registry = Registry::new();
        registry.register(registration("host-a"));
        registry.acquire_lock("host-a", "operator-1", Duration::from_secs(1)).await.unwrap();
        let entry = registry.get("host-a").unwrap();
        assert!(entry.is_locked);
        assert_eq!(entry.locked_by.as_deref(), Some("operator-1"));
    }

    #[tokio::test]
    async fn test_release_lock_clears_host_entry() {
        let registry = Registry::new();
        registry.register(registration("host-a"));
        registry.acquire_lock("host-a", "operator-1", Duration::from_secs(1)).await.unwrap();
        registry.release_lock("host-a", "operator-1").unwrap();
        let entry = registry.get("host-a").unwrap();
        assert!(!entry.is_locked);
        assert!(entry.locked_by.is_none());
    }
}
