//! Wire types for the host registry (spec.md §3, §4.8, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One device declared by a host at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistration {
    /// Logical device id, e.g. `device1` or `host`.
    pub device_id: String,
    /// Human-readable device name.
    pub device_name: String,
    /// Device model string.
    pub device_model: String,
    /// Capabilities this device exposes (free-form, collaborator-defined).
    #[serde(default)]
    pub device_capabilities: Vec<String>,
    /// Verification types this device's executor supports.
    #[serde(default)]
    pub device_verification_types: Vec<String>,
    /// Remote-control action types this device supports.
    #[serde(default)]
    pub device_action_types: Vec<String>,
}

/// Body of `POST /server/system/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRegistration {
    /// Unique host name, the registry's primary key.
    pub host_name: String,
    /// Base URL at which this host can be reached.
    pub host_url: String,
    /// Port the host listens on, when distinct from `host_url`.
    #[serde(default)]
    pub host_port: Option<u16>,
    /// Devices this host manages.
    #[serde(default)]
    pub devices: Vec<DeviceRegistration>,
    /// Free-form system stats (CPU/memory/disk), opaque to the registry.
    #[serde(default)]
    pub system_stats: Option<serde_json::Value>,
}

/// Body of `POST /server/system/ping` and `POST /server/system/unregister`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest {
    /// Host name to refresh.
    pub host_name: String,
    /// Updated system stats, if the host sends them on every ping.
    #[serde(default)]
    pub system_stats: Option<serde_json::Value>,
}

/// Liveness status of a registered host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Pinged within the staleness window.
    Online,
}

/// A host's full registry record, including the fast-read lock mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// Host name (primary key).
    pub host_name: String,
    /// Base URL.
    pub host_url: String,
    /// Port, when distinct from `host_url`.
    pub host_port: Option<u16>,
    /// Devices this host manages.
    pub devices: Vec<DeviceRegistration>,
    /// Liveness status.
    pub status: HostStatus,
    /// Last time this host registered or pinged.
    pub last_seen: DateTime<Utc>,
    /// Whether a device lock is currently held for this host.
    #[serde(rename = "isLocked")]
    pub is_locked: bool,
    /// Owner id of the current lock, if any.
    #[serde(rename = "lockedBy")]
    pub locked_by: Option<String>,
    /// When the current lock was acquired, if any.
    #[serde(rename = "lockedAt")]
    pub locked_at: Option<DateTime<Utc>>,
    /// Most recently reported system stats.
    #[serde(default)]
    pub system_stats: Option<serde_json::Value>,
}

impl HostEntry {
    /// Builds a fresh entry from a registration, with no lock held.
    #[must_use]
    pub fn from_registration(req: HostRegistration, now: DateTime<Utc>) -> Self {
        Self {
            host_name: req.host_name,
            host_url: req.host_url,
            host_port: req.host_port,
            devices: req.devices,
            status: HostStatus::Online,
            last_seen: now,
            is_locked: false,
            locked_by: None,
            locked_at: None,
            system_stats: req.system_stats,
        }
    }
}
