//! DB collaborator for the `zap_results` table (spec.md §4.7 step 5).

use super::types::ChannelInfo;
use crate::error::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One row to append to `zap_results`.
#[derive(Debug, Clone)]
pub struct ZapIterationRecord {
    /// Owning team, defaulted when the zap is manual.
    pub team_id: Uuid,
    /// Reporting host.
    pub host_name: String,
    /// Device name.
    pub device_name: String,
    /// Device model, recorded as `userinterface_name`.
    pub userinterface_name: String,
    /// The action command that triggered this zap, when automatic.
    pub action_command: Option<String>,
    /// When the zap iteration started (action timestamp, or an
    /// approximation when manual).
    pub started_at: DateTime<Utc>,
    /// When the zap was confirmed.
    pub completed_at: DateTime<Utc>,
    /// `blackscreen_duration_ms / 1000`.
    pub duration_seconds: f64,
    /// Always `true`: presence of this row already implies detection.
    pub blackscreen_freeze_detected: bool,
    /// Free-text label for how the transition was detected.
    pub detection_method: String,
    /// Recognized channel/program facts.
    pub channel_info: ChannelInfo,
    /// Audio silence duration observed during the transition, if measured.
    pub audio_silence_duration_ms: Option<u64>,
    /// Action parameters, opaque to the pipeline.
    pub action_params: Option<serde_json::Value>,
    /// Milliseconds between action completion and the zap frame, when automatic.
    pub time_since_action_ms: Option<i64>,
    /// `time_since_action_ms + blackscreen_duration_ms`, null when manual.
    pub total_zap_duration_ms: Option<i64>,
}

/// Collaborator contract for the `zap_results` table.
pub trait ZapResultStore: Send + Sync {
    /// Appends one zap iteration record.
    fn record_zap_iteration(&self, record: &ZapIterationRecord) -> Result<()>;
}

/// No-op store used when no database is configured (REDESIGN FLAGS
/// null-object pattern, matching [`crate::incident::NullAlertStore`]).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullZapResultStore;

impl ZapResultStore for NullZapResultStore {
    fn record_zap_iteration(&self, _record: &ZapIterationRecord) -> Result<()> {
        Ok(())
    }
}
