//! The per-frame JSON sidecar: the canonical event record shared between
//! the monitor (first writer; owns `analyzed`, detector fields), the audio
//! worker, the action-ping writer, and the zapping detector.
//!
//! Every read-modify-write goes through [`with_locked_sidecar`], which
//! holds a `<path>.lock` advisory lock for the duration of the closure and
//! always performs an atomic write (`path.tmp` then rename) before
//! releasing it, per spec.md §3's ownership model.

use crate::error::{Error, Result};
use crate::locking::{RetryPolicy, with_sidecar_lock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Zap facts merged into a sidecar by the zapping detector (§4.7 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZapFields {
    /// Always `true`: presence of this struct already implies detection.
    pub detected: bool,
    /// Unique id, `zap_<SEQ>_<epoch>`.
    pub id: String,
    /// When the zap was confirmed.
    pub detected_at: DateTime<Utc>,
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
    /// Measured blackscreen duration bounding the zap.
    pub blackscreen_duration_ms: u64,
    /// `automatic` (driven by a recorded action) or `manual`.
    pub detection_type: String,
    /// Audio silence duration observed during the transition, if measured.
    pub audio_silence_duration_ms: Option<u64>,
}

/// The per-frame sidecar. Written once, fully, by the monitor; updated
/// in-place by the audio worker, action-ping writer, and zapping detector
/// under the sidecar lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSidecar {
    /// Always `true` once written; a sidecar's mere existence signals the
    /// frame has been processed.
    pub analyzed: bool,
    /// Detector error message, set instead of detector fields when
    /// `detect_issues` failed so the frame is not retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the frame is blackscreen.
    #[serde(default)]
    pub blackscreen: bool,
    /// Measured dark-pixel percentage.
    #[serde(default)]
    pub blackscreen_percentage: f64,
    /// Whether the frame is frozen.
    #[serde(default)]
    pub freeze: bool,
    /// Pairwise freeze diffs.
    #[serde(default)]
    pub freeze_diffs: Vec<f64>,
    /// Audio presence, stamped from the most recent audio sample cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<bool>,
    /// Measured mean volume in dB, stamped alongside `audio`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_volume_db: Option<f64>,
    /// When the audio sample this frame carries was measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_check_timestamp: Option<DateTime<Utc>>,
    /// Which audio segment file the stamped sample came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_segment_file: Option<String>,
    /// Conservative macroblock verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macroblocks: Option<bool>,
    /// Aggregate quality score, when the detector produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Frame capture timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Command of the last action executed before this frame, if within
    /// the action-match window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_executed: Option<String>,
    /// When that action completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_timestamp: Option<DateTime<Utc>>,
    /// Action parameters, opaque to the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_params: Option<serde_json::Value>,
    /// Milliseconds between action completion and this frame's timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_to_frame_delay_ms: Option<i64>,
    /// Zap truth, merged in by the zapping detector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zap: Option<ZapFields>,
}

impl FrameSidecar {
    /// A minimal sidecar recording only that analysis was attempted and
    /// failed, per spec.md §7's detector-failure policy.
    #[must_use]
    pub fn analyzed_with_error(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            analyzed: true,
            error: Some(message.into()),
            blackscreen: false,
            blackscreen_percentage: 0.0,
            freeze: false,
            freeze_diffs: Vec::new(),
            audio: None,
            mean_volume_db: None,
            audio_check_timestamp: None,
            audio_segment_file: None,
            macroblocks: None,
            quality_score: None,
            timestamp,
            last_action_executed: None,
            last_action_timestamp: None,
            action_params: None,
            action_to_frame_delay_ms: None,
            zap: None,
        }
    }
}

/// Reads a sidecar file without acquiring the lock (safe for the common
/// case: single reader, no concurrent writer expected). Returns `None` if
/// the file does not exist.
pub fn read_sidecar(path: &Path) -> Result<Option<FrameSidecar>> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|source| Error::SidecarIo {
        path: path.to_path_buf(),
        source,
    })?;
    let sidecar = serde_json::from_str(&contents).map_err(|source| Error::SidecarParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(sidecar))
}

/// Atomically writes `sidecar` to `path` via `path.tmp` then rename,
/// without locking (used by the monitor for the first, sole write of a
/// brand-new sidecar, where no other writer can yet be racing).
pub fn write_sidecar_atomic(path: &Path, sidecar: &FrameSidecar) -> Result<()> {
    let json = serde_json::to_string_pretty(sidecar).map_err(|source| Error::SidecarParse {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json).map_err(|source| Error::SidecarIo {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| Error::SidecarIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Runs `mutate` against the current sidecar contents (or `None` if the
/// file does not yet exist) while holding the sidecar lock, then atomically
/// writes whatever `mutate` returns. This is the sole entry point audio,
/// action, and zap writers should use to update an existing sidecar.
pub fn with_locked_sidecar(
    path: &Path,
    mutate: impl FnOnce(Option<FrameSidecar>) -> Result<FrameSidecar>,
) -> Result<()> {
    with_sidecar_lock(path, RetryPolicy::default(), || {
        let current = read_sidecar(path)?;
        let updated = mutate(current)?;
        write_sidecar_atomic(path, &updated)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture_000000001.json");
        let sidecar = FrameSidecar::analyzed_with_error("boom", Utc::now());
        write_sidecar_atomic(&path, &sidecar).unwrap();

        let loaded = read_sidecar(&path).unwrap().unwrap();
        assert!(loaded.analyzed);
        assert_eq!(loaded.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_missing_sidecar_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read_sidecar(&path).unwrap().is_none());
    }

    #[test]
    fn test_with_locked_sidecar_merges_audio_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture_000000002.json");
        let sidecar = FrameSidecar::analyzed_with_error("n/a", Utc::now());
        write_sidecar_atomic(&path, &sidecar).unwrap();

        with_locked_sidecar(&path, |current| {
            let mut sidecar = current.unwrap();
            sidecar.audio = Some(true);
            sidecar.mean_volume_db = Some(-20.0);
            Ok(sidecar)
        })
        .unwrap();

        let loaded = read_sidecar(&path).unwrap().unwrap();
        assert_eq!(loaded.audio, Some(true));
        assert_eq!(loaded.mean_volume_db, Some(-20.0));
        assert!(!crate::locking::SidecarLock::is_locked(&path));
    }
}
