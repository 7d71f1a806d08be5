//! The action ping: `metadata/last_action.json` plus the sidecar-matching
//! side effect described in spec.md §4.5b. This is the sole mechanism by
//! which the zapping detector can label a zap automatic rather than
//! manual, so it lives at the crate root rather than nested under `kpi`
//! (its home in the spec's prose) since `monitor` and `zapping` both read
//! it without otherwise depending on the KPI executor.

use crate::constants::sidecar::{ACTION_MATCH_WINDOW_MS, RECENT_SIDECAR_SCAN_COUNT};
use crate::error::{Error, Result};
use crate::sidecar::{read_sidecar, with_locked_sidecar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The most recent remote-control action, as recorded for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastAction {
    /// The action command, e.g. `live_chup`.
    pub command: String,
    /// When the action completed.
    pub timestamp: DateTime<Utc>,
    /// Action parameters, opaque to the pipeline.
    #[serde(default)]
    pub params: serde_json::Value,
    /// When this file was written (may lag `timestamp` slightly).
    pub written_at: DateTime<Utc>,
}

/// Writes `metadata/last_action.json` atomically and merges the action
/// into the sidecar whose frame timestamp is closest to `completion_ts`
/// (and within [`ACTION_MATCH_WINDOW_MS`]), if any of the most recent
/// [`RECENT_SIDECAR_SCAN_COUNT`] sidecars qualifies.
pub fn write_action_to_frame_json(
    metadata_dir: &Path,
    captures_dir: &Path,
    command: &str,
    params: serde_json::Value,
    completion_ts: DateTime<Utc>,
) -> Result<()> {
    std::fs::create_dir_all(metadata_dir)?;
    let last_action = LastAction {
        command: command.to_string(),
        timestamp: completion_ts,
        params: params.clone(),
        written_at: Utc::now(),
    };
    let json = serde_json::to_string_pretty(&last_action).map_err(|source| Error::SidecarParse {
        path: metadata_dir.join("last_action.json"),
        source,
    })?;
    let target = metadata_dir.join("last_action.json");
    let tmp = metadata_dir.join("last_action.json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &target)?;

    if let Some(sidecar_path) = find_closest_sidecar(captures_dir, completion_ts)? {
        with_locked_sidecar(&sidecar_path, |current| {
            let mut sidecar = current.ok_or_else(|| Error::Internal {
                message: format!("sidecar disappeared: {}", sidecar_path.display()),
            })?;
            sidecar.last_action_executed = Some(command.to_string());
            sidecar.last_action_timestamp = Some(completion_ts);
            sidecar.action_params = Some(params.clone());
            sidecar.action_to_frame_delay_ms =
                Some((sidecar.timestamp - completion_ts).num_milliseconds());
            Ok(sidecar)
        })?;
    }

    Ok(())
}

/// Reads `metadata/last_action.json`, tolerating absence (readers must
/// tolerate brief absence around the atomic rename).
pub fn read_last_action(metadata_dir: &Path) -> Result<Option<LastAction>> {
    let path = metadata_dir.join("last_action.json");
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)?;
    match serde_json::from_str(&contents) {
        Ok(action) => Ok(Some(action)),
        Err(_) => Ok(None),
    }
}

/// Finds the sidecar, among the most recent [`RECENT_SIDECAR_SCAN_COUNT`]
/// by mtime, whose recorded frame timestamp is closest to `completion_ts`
/// and within [`ACTION_MATCH_WINDOW_MS`].
fn find_closest_sidecar(captures_dir: &Path, completion_ts: DateTime<Utc>) -> Result<Option<std::path::PathBuf>> {
    if !captures_dir.is_dir() {
        return Ok(None);
    }

    let mut candidates: Vec<(std::time::SystemTime, std::path::PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(captures_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(std::ffi::OsStr::to_str) != Some("json") {
            continue;
        }
        let mtime = entry.metadata()?.modified()?;
        candidates.push((mtime, path));
    }
    candidates.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    candidates.truncate(RECENT_SIDECAR_SCAN_COUNT);

    let mut best: Option<(i64, std::path::PathBuf)> = None;
    for (_, path) in candidates {
        let Some(sidecar) = read_sidecar(&path)? else {
            continue;
        };
        let delta = (sidecar.timestamp - completion_ts).num_milliseconds().abs();
        if delta > ACTION_MATCH_WINDOW_MS {
            continue;
        }
        if best.as_ref().is_none_or(|(best_delta, _)| delta < *best_delta) {
            best = Some((delta, path));
        }
    }

    Ok(best.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::{FrameSidecar, write_sidecar_atomic};

    #[test]
    fn test_writes_last_action_json() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_dir = dir.path().join("metadata");
        let captures_dir = dir.path().join("captures");
        std::fs::create_dir_all(&captures_dir).unwrap();

        let now = Utc::now();
        write_action_to_frame_json(&metadata_dir, &captures_dir, "live_chup", serde_json::json!({}), now).unwrap();

        let action = read_last_action(&metadata_dir).unwrap().unwrap();
        assert_eq!(action.command, "live_chup");
    }

    #[test]
    fn test_merges_into_closest_sidecar_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_dir = dir.path().join("metadata");
        let captures_dir = dir.path().join("captures");
        std::fs::create_dir_all(&captures_dir).unwrap();

        let completion_ts = Utc::now();
        let frame_ts = completion_ts + chrono::Duration::milliseconds(450);
        let sidecar_path = captures_dir.join("capture_000000200.json");
        let sidecar = FrameSidecar::analyzed_with_error("placeholder", frame_ts);
        write_sidecar_atomic(&sidecar_path, &sidecar).unwrap();

        write_action_to_frame_json(
            &metadata_dir,
            &captures_dir,
            "live_chup",
            serde_json::json!({"channel": "1"}),
            completion_ts,
        )
        .unwrap();

        let loaded = read_sidecar(&sidecar_path).unwrap().unwrap();
        assert_eq!(loaded.last_action_executed.as_deref(), Some("live_chup"));
        assert_eq!(loaded.action_to_frame_delay_ms, Some(450));
    }

    #[test]
    fn test_outside_window_does_not_merge() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_dir = dir.path().join("metadata");
        let captures_dir = dir.path().join("captures");
        std::fs::create_dir_all(&captures_dir).unwrap();

        let completion_ts = Utc::now();
        let frame_ts = completion_ts + chrono::Duration::milliseconds(5000);
        let sidecar_path = captures_dir.join("capture_000000300.json");
        let sidecar = FrameSidecar::analyzed_with_error("placeholder", frame_ts);
        write_sidecar_atomic(&sidecar_path, &sidecar).unwrap();

        write_action_to_frame_json(&metadata_dir, &captures_dir, "live_chdown", serde_json::json!({}), completion_ts)
            .unwrap();

        let loaded = read_sidecar(&sidecar_path).unwrap().unwrap();
        assert!(loaded.last_action_executed.is_none());
    }
}
