//! Data shapes the zapping detector reads and writes (spec.md §4.7, §3's
//! "Zap event").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Channel/program facts read off a channel banner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Recognized channel name.
    pub channel_name: Option<String>,
    /// Recognized channel number.
    pub channel_number: Option<String>,
    /// Recognized program name.
    pub program_name: Option<String>,
    /// Program start time, if known.
    pub program_start_time: Option<DateTime<Utc>>,
    /// Program end time, if known.
    pub program_end_time: Option<DateTime<Utc>>,
    /// Banner recognition confidence, 0.0..=1.0.
    pub confidence: f64,
}

/// Result of running banner recognition on one frame.
#[derive(Debug, Clone, Default)]
pub struct BannerDetection {
    /// Whether a channel banner was recognized at all.
    pub banner_detected: bool,
    /// Recognized channel/program facts, present only if `banner_detected`.
    pub channel_info: Option<ChannelInfo>,
}

/// Recorded action that immediately preceded this zap, when automatic.
#[derive(Debug, Clone)]
pub struct ZapActionInfo {
    /// The action command, e.g. `live_chup`.
    pub command: String,
    /// Action parameters, opaque to the pipeline.
    pub params: serde_json::Value,
    /// When the action completed.
    pub timestamp: DateTime<Utc>,
}

/// Paths to the four evidence frames a zap may carry, local-filesystem
/// side (cold storage). `after` is always filled in by the detector from
/// the triggering frame; the rest arrive from the caller when available.
#[derive(Debug, Clone, Default)]
pub struct TransitionImages {
    /// Last frame observed before blackscreen began.
    pub before: Option<PathBuf>,
    /// First frame recognized as blackscreen.
    pub first_blackscreen: Option<PathBuf>,
    /// Last frame still recognized as blackscreen.
    pub last_blackscreen: Option<PathBuf>,
    /// The frame that completed the transition back to content.
    pub after: Option<PathBuf>,
}

/// Web-visible URLs for whichever of the four transition images were
/// uploaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionImageUrls {
    /// Before-blackscreen URL, if uploaded.
    pub before_url: Option<String>,
    /// First-blackscreen URL, if uploaded.
    pub first_blackscreen_url: Option<String>,
    /// Last-blackscreen URL, if uploaded.
    pub last_blackscreen_url: Option<String>,
    /// After-blackscreen (content resumed) URL, if uploaded.
    pub after_url: Option<String>,
}

/// `automatic` when a recent `last_action.json` explains the zap,
/// `manual` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionType {
    /// A recorded remote-control action explains the transition.
    Automatic,
    /// No recent action was on file; a human presumably changed channel.
    Manual,
}

impl std::fmt::Display for DetectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// The `metadata/last_zapping.json` snapshot: the single source of truth
/// a server-side zap executor reads instead of scanning every sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastZappingSnapshot {
    /// Always `"completed"` once this snapshot is written.
    pub status: String,
    /// Unique zap id, `zap_<SEQ>_<epoch>`.
    pub zap_id: String,
    /// Recognized channel/program facts.
    pub channel_info: ChannelInfo,
    /// `automatic` or `manual`.
    pub detection_type: DetectionType,
    /// Action command, when automatic.
    pub action_command: Option<String>,
    /// Action parameters, when automatic.
    pub action_params: Option<serde_json::Value>,
    /// Milliseconds between the action completing and this frame, when automatic.
    pub time_since_action_ms: Option<i64>,
    /// `time_since_action_ms + blackscreen_duration_ms`, null when manual.
    pub total_zap_duration_ms: Option<i64>,
    /// Measured blackscreen duration bounding the zap.
    pub blackscreen_duration_ms: u64,
    /// Audio silence duration observed during the transition, if measured.
    pub audio_silence_duration_ms: Option<u64>,
    /// Local paths of whichever transition images were available.
    pub transition_images: TransitionImagePaths,
    /// Object-store URLs for the same images.
    pub r2_images: TransitionImageUrls,
    /// When this snapshot was written.
    pub detected_at: DateTime<Utc>,
}

/// Local-filesystem paths mirrored into the snapshot for debugging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionImagePaths {
    /// Before-blackscreen frame path.
    pub before: Option<PathBuf>,
    /// First-blackscreen frame path.
    pub first_blackscreen: Option<PathBuf>,
    /// Last-blackscreen frame path.
    pub last_blackscreen: Option<PathBuf>,
    /// After-blackscreen (content resumed) frame path.
    pub after: Option<PathBuf>,
}

/// Outcome returned to the caller of [`super::detect_and_record_zapping`].
#[derive(Debug, Clone)]
pub struct ZapOutcome {
    /// Whether the pipeline ran to completion without error.
    pub success: bool,
    /// Whether a channel banner was recognized (a real zap, not a plain
    /// blackscreen).
    pub zapping_detected: bool,
    /// The generated zap id, present only when `zapping_detected`.
    pub zap_id: Option<String>,
}
