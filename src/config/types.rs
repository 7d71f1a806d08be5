//! Configuration type definitions.

use crate::constants::{archiver, detector, incident, kpi, transcript};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Complete application configuration.
///
/// Device identity and storage paths are resolved from the environment at
/// call sites (see [`crate::storage::device`]); this struct only holds the
/// tunables and credentials an operator would reasonably want to override
/// via a config file rather than environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detector and incident-manager tunables.
    #[serde(default)]
    pub tunables: Tunables,

    /// Object-store (R2-compatible) credentials for evidence/report uploads.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Database connection details used by the incident manager, KPI
    /// executor, and zapping detector.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Defaults applied by the server-side host registry.
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Detector thresholds and service cadence, all overridable from the config
/// file; defaults mirror the constants named in the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Seconds of continuous detection before a pending incident becomes active.
    pub incident_report_delay_secs: u64,
    /// Dark-pixel percentage above which a frame is blackscreen on desktop models.
    pub blackscreen_percent_desktop: f64,
    /// Dark-pixel percentage above which a frame is blackscreen on mobile models.
    pub blackscreen_percent_mobile: f64,
    /// Mean-diff below this value is considered frozen.
    pub freeze_diff_threshold: f64,
    /// Mean volume (dB) at or below which audio is considered silent.
    pub audio_silence_db: f64,
    /// Hot-root overflow limit for segments.
    pub hot_limit_segments: usize,
    /// Hot-root overflow limit for captures/thumbnails/metadata.
    pub hot_limit_other: usize,
    /// Retention horizon (hours) for the `captures` class.
    pub retention_hours_captures: u32,
    /// Retention horizon (hours) for all other classes.
    pub retention_hours_other: u32,
    /// Bounded KPI request queue depth.
    pub kpi_queue_capacity: usize,
    /// LIFO real-time transcript queue capacity.
    pub transcript_inotify_queue_capacity: usize,
    /// FIFO transcript backlog queue capacity.
    pub transcript_scan_queue_capacity: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            incident_report_delay_secs: incident::REPORT_DELAY.as_secs(),
            blackscreen_percent_desktop: detector::BLACKSCREEN_PERCENT_DESKTOP,
            blackscreen_percent_mobile: detector::BLACKSCREEN_PERCENT_MOBILE,
            freeze_diff_threshold: detector::FREEZE_DIFF_THRESHOLD,
            audio_silence_db: detector::AUDIO_SILENCE_DB,
            hot_limit_segments: archiver::HOT_LIMIT_SEGMENTS,
            hot_limit_other: archiver::HOT_LIMIT_OTHER,
            retention_hours_captures: archiver::RETENTION_HOURS_CAPTURES,
            retention_hours_other: archiver::RETENTION_HOURS_OTHER,
            kpi_queue_capacity: kpi::QUEUE_CAPACITY,
            transcript_inotify_queue_capacity: transcript::INOTIFY_QUEUE_CAPACITY,
            transcript_scan_queue_capacity: transcript::SCAN_QUEUE_CAPACITY,
        }
    }
}

/// Object-store credentials and endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Base endpoint URL, e.g. an R2/S3-compatible host.
    pub endpoint: Option<String>,
    /// Bucket name evidence and reports are written under.
    pub bucket: Option<String>,
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
}

impl ObjectStoreConfig {
    /// Whether enough configuration is present to attempt uploads.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.bucket.is_some()
    }
}

/// Database connection details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (e.g. a Postgres/Supabase connection string).
    pub url: Option<String>,
    /// Anonymous/service API key, when the backend is an HTTP REST facade.
    pub anon_key: Option<String>,
}

impl DatabaseConfig {
    /// Whether enough configuration is present to attempt a connection.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

/// Server-side host registry defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Team id recorded for automatically detected zaps, where the
    /// reference implementation hardcoded a constant (see DESIGN.md).
    pub default_team_id: Uuid,
    /// Address the registry HTTP server binds to.
    pub bind_addr: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_team_id: Uuid::nil(),
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Output formats are not part of this config (there is no per-run output
/// selection in the pipeline); sidecar and report paths are always derived
/// from [`crate::storage`].
pub type OutputDir = PathBuf;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunables_default_matches_constants() {
        let tunables = Tunables::default();
        assert_eq!(tunables.incident_report_delay_secs, 300);
        assert_eq!(tunables.hot_limit_segments, 10);
        assert_eq!(tunables.hot_limit_other, 100);
    }

    #[test]
    fn test_object_store_not_configured_by_default() {
        assert!(!ObjectStoreConfig::default().is_configured());
    }
}
