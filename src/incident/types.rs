//! Incident data model: kinds, per-device state, and the metadata carried
//! into DB inserts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A quality condition the incident manager tracks per device.
///
/// Kept as a tagged enum (REDESIGN FLAGS: prefer tagged variants over
/// free-form maps) rather than a string, so every call site is checked at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// Sustained blackscreen.
    Blackscreen,
    /// Sustained frozen frame.
    Freeze,
    /// Sustained audio silence (not tracked for the `host` sentinel device).
    AudioLoss,
    /// Sustained macroblocking/artifacting.
    Macroblocks,
}

impl IncidentKind {
    /// All kinds, in the order the spec's data model lists them.
    pub const ALL: [Self; 4] = [Self::Blackscreen, Self::Freeze, Self::AudioLoss, Self::Macroblocks];
}

impl std::fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Blackscreen => "blackscreen",
            Self::Freeze => "freeze",
            Self::AudioLoss => "audio_loss",
            Self::Macroblocks => "macroblocks",
        };
        f.write_str(s)
    }
}

/// Opaque identifier for a DB-backed alert row.
pub type AlertId = String;

/// Edge-triggered outcome of processing one detection result, returned so
/// the monitor can fire side effects (zapping analysis, live event
/// publishing) exactly once per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A kind was detected for the first time (now pending).
    FirstDetected,
    /// A pending or active incident cleared (detection stopped).
    Cleared,
}

/// Per-device incident state: at most one active alert id and one pending
/// timestamp per kind.
#[derive(Debug, Clone, Default)]
pub struct DeviceIncidentState {
    /// Kinds with a DB-backed active alert.
    pub active: HashMap<IncidentKind, AlertId>,
    /// Kinds first detected but not yet debounced into an active alert.
    pub pending: HashMap<IncidentKind, chrono::DateTime<chrono::Utc>>,
}

impl DeviceIncidentState {
    /// Number of currently active incidents; used by the invariant that
    /// `active.len() <= IncidentKind::ALL.len()` always holds.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// The subset of a detection result the incident manager reasons about,
/// decoupled from `hostpipe::monitor`'s richer `DetectionResult` so this
/// module has no dependency on the monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionFlags {
    /// Whether the frame is blackscreen.
    pub blackscreen: bool,
    /// Whether the frame is frozen relative to its predecessors.
    pub freeze: bool,
    /// Whether audio was present (`audio_loss` is the negation of this).
    pub audio_present: bool,
}

/// Metadata carried into a DB insert when a pending incident debounces
/// into an active alert.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IncidentMetadata {
    /// Human-readable device name.
    pub device_name: String,
    /// The device's capture path (for operator context in the alert row).
    pub capture_path: String,
    /// The device's live-stream path.
    pub stream_path: String,
    /// Blackscreen dark-pixel percentage, when `kind == Blackscreen`.
    pub blackscreen_percentage: Option<f64>,
    /// Pairwise freeze diffs, when `kind == Freeze`.
    pub freeze_diffs: Vec<f64>,
    /// Measured mean volume in dB, when `kind == AudioLoss`.
    pub mean_volume_db: Option<f64>,
    /// Optional quality score carried through from the detector.
    pub quality_score: Option<f64>,
    /// Object-store URLs for evidence uploaded by the monitor, keyed by a
    /// caller-defined label (e.g. `frame_0`, `thumb_0`).
    pub r2_urls: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_kind_display() {
        assert_eq!(IncidentKind::AudioLoss.to_string(), "audio_loss");
    }

    #[test]
    fn test_device_state_starts_empty() {
        let state = DeviceIncidentState::default();
        assert_eq!(state.active_count(), 0);
        assert!(state.pending.is_empty());
    }
}
