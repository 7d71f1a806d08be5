//! Scan-window computation and RAM snapshotting (spec.md §4.5 steps 2-3).

use super::types::KpiRequest;
use crate::constants::kpi::{LAST_ACTION_WAIT_THRESHOLD, LONG_WAIT_TAIL_WINDOW};
use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::{Path, PathBuf};

/// The `[start, end]` range of frame capture times to search.
#[derive(Debug, Clone, Copy)]
pub struct ScanWindow {
    /// Inclusive window start.
    pub start: DateTime<Utc>,
    /// Inclusive window end.
    pub end: DateTime<Utc>,
}

/// Computes the scan window per spec.md §4.5 step 2's three cases.
#[must_use]
pub fn compute_scan_window(request: &KpiRequest) -> ScanWindow {
    if let Some(verification_ts) = request.verification_timestamp {
        let candidate_start = verification_ts - ChronoDuration::milliseconds(i64::try_from(request.timeout_ms).unwrap_or(i64::MAX));
        let start = candidate_start.max(request.action_timestamp);
        return ScanWindow { start, end: verification_ts };
    }

    if let Some(wait_ms) = request.last_action_wait_ms {
        if wait_ms > LAST_ACTION_WAIT_THRESHOLD.as_millis() as u64 {
            let end = request.action_timestamp + ChronoDuration::milliseconds(i64::try_from(wait_ms).unwrap_or(i64::MAX));
            let start = end - ChronoDuration::from_std(LONG_WAIT_TAIL_WINDOW).unwrap_or_default();
            return ScanWindow { start, end };
        }
    }

    let end = request.action_timestamp + ChronoDuration::milliseconds(i64::try_from(request.timeout_ms).unwrap_or(i64::MAX));
    ScanWindow { start: request.action_timestamp, end }
}

/// A capture frame found within (or just before) a scan window.
#[derive(Debug, Clone)]
pub struct ScannedFrame {
    /// Path to the full-resolution frame.
    pub path: PathBuf,
    /// Path to its sibling thumbnail.
    pub thumbnail: PathBuf,
    /// Capture time (mtime).
    pub mtime: DateTime<Utc>,
}

/// Lists candidate frames: every frame in `capture_dir` whose mtime falls
/// within `window`, sorted ascending by mtime, plus (separately) the frame
/// immediately preceding the window for "before" evidence.
pub fn list_window_frames(capture_dir: &Path, window: ScanWindow) -> Result<(Vec<ScannedFrame>, Option<ScannedFrame>)> {
    if !capture_dir.is_dir() {
        return Ok((Vec::new(), None));
    }

    let mut all: Vec<ScannedFrame> = Vec::new();
    for entry in std::fs::read_dir(capture_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !is_full_res_frame(name) {
            continue;
        }
        let mtime = DateTime::<Utc>::from(entry.metadata()?.modified()?);
        let thumbnail = crate::storage::get_thumbnail_path_from_capture(&path);
        all.push(ScannedFrame { path, thumbnail, mtime });
    }
    all.sort_unstable_by_key(|f| f.mtime);

    let in_window: Vec<ScannedFrame> = all.iter().filter(|f| f.mtime >= window.start && f.mtime <= window.end).cloned().collect();

    let before = all
        .iter()
        .filter(|f| f.mtime < window.start)
        .max_by_key(|f| f.mtime)
        .cloned();

    Ok((in_window, before))
}

fn is_full_res_frame(name: &str) -> bool {
    name.starts_with("capture_") && name.ends_with(".jpg") && !name.ends_with("_thumbnail.jpg")
}

/// Copies every frame and thumbnail (plus the "before" frame, if any) into
/// a per-request RAM working directory under `working_root`. Returns the
/// directory; callers must remove it when done.
pub fn snapshot_to_ram(
    working_root: &Path,
    execution_result_id: uuid::Uuid,
    frames: &[ScannedFrame],
    before: Option<&ScannedFrame>,
) -> Result<PathBuf> {
    let working_dir = working_root.join(format!("{execution_result_id}_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&working_dir)?;

    for frame in frames.iter().chain(before) {
        copy_if_exists(&frame.path, &working_dir)?;
        copy_if_exists(&frame.thumbnail, &working_dir)?;
    }

    Ok(working_dir)
}

fn copy_if_exists(src: &Path, working_dir: &Path) -> Result<()> {
    if !src.is_file() {
        return Ok(());
    }
    let Some(name) = src.file_name() else { return Ok(()) };
    std::fs::copy(src, working_dir.join(name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(verification: Option<DateTime<Utc>>, wait_ms: Option<u64>) -> KpiRequest {
        KpiRequest {
            execution_result_id: uuid::Uuid::nil(),
            team_id: uuid::Uuid::nil(),
            capture_dir: PathBuf::new(),
            action_timestamp: Utc::now(),
            verification_timestamp: verification,
            last_action_wait_ms: wait_ms,
            kpi_references: Vec::new(),
            timeout_ms: 10_000,
            userinterface_name: "ui".to_string(),
            kpi_timestamp: None,
        }
    }

    #[test]
    fn test_window_with_verification_timestamp() {
        let mut req = request(None, None);
        req.verification_timestamp = Some(req.action_timestamp + ChronoDuration::milliseconds(420));
        let window = compute_scan_window(&req);
        assert_eq!(window.end, req.verification_timestamp.unwrap());
        assert_eq!(window.start, req.action_timestamp); // candidate_start before action, clamped
    }

    #[test]
    fn test_window_long_wait_uses_tail() {
        let mut req = request(None, Some(90_000));
        req.action_timestamp = Utc::now();
        let window = compute_scan_window(&req);
        let expected_end = req.action_timestamp + ChronoDuration::milliseconds(90_000);
        assert_eq!(window.end, expected_end);
        assert_eq!(window.start, expected_end - ChronoDuration::seconds(20));
    }

    #[test]
    fn test_window_forward_scan_default() {
        let req = request(None, None);
        let window = compute_scan_window(&req);
        assert_eq!(window.start, req.action_timestamp);
        assert_eq!(window.end, req.action_timestamp + ChronoDuration::milliseconds(10_000));
    }

    #[test]
    fn test_list_window_frames_filters_and_finds_before() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("capture_000000001.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("capture_000000002.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("capture_000000002_thumbnail.jpg"), b"t").unwrap();

        let now = Utc::now();
        let window = ScanWindow {
            start: now - ChronoDuration::seconds(1),
            end: now + ChronoDuration::seconds(1000),
        };
        let (in_window, _before) = list_window_frames(dir.path(), window).unwrap();
        assert_eq!(in_window.len(), 2);
    }
}
