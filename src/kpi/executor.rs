//! Ties the scan window, RAM snapshot, two-phase search, and HTML report
//! into the per-request pipeline described by spec.md §4.5.

use super::report::{ReportThumbnails, render_report, upload_report};
use super::scan::{compute_scan_window, list_window_frames, snapshot_to_ram};
use super::search::{SearchResult, search};
use super::store::KpiResultStore;
use super::types::{Algorithm, KpiOutcome, KpiRequest};
use super::verification::VerificationExecutor;
use crate::error::Result;
use crate::objectstore::ObjectStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const REPORT_PREFIX: &str = "kpi_reports";

/// Collaborators a [`KpiExecutor`] needs, grouped so `process_request` does
/// not take an unwieldy parameter list.
pub struct KpiExecutorDeps {
    /// Per-device verification collaborator.
    pub verification: Arc<dyn VerificationExecutor>,
    /// Object store for report + thumbnail uploads.
    pub object_store: Arc<dyn ObjectStore>,
    /// DB collaborator for the result row.
    pub result_store: Arc<dyn KpiResultStore>,
    /// Root directory for per-request RAM working dirs (`/tmp/kpi_working`).
    pub working_root: PathBuf,
}

/// Processes one KPI request end-to-end: short-circuit check, scan-window
/// computation, RAM snapshot, two-phase search, report generation, and the
/// DB update. The working directory is always removed before returning.
pub fn process_request(request: &KpiRequest, deps: &KpiExecutorDeps) -> Result<KpiOutcome> {
    if let Some(kpi_timestamp) = request.kpi_timestamp {
        let kpi_ms = (kpi_timestamp - request.action_timestamp).num_milliseconds();
        deps.result_store
            .update_kpi_result(request.execution_result_id, true, Some(kpi_ms), None, None)?;
        return Ok(KpiOutcome::Success {
            kpi_ms,
            algorithm: Algorithm::ShortCircuit,
            report_url: None,
        });
    }

    let window = compute_scan_window(request);
    let (frames, before) = list_window_frames(&request.capture_dir, window)?;

    if frames.is_empty() {
        warn!(execution_result_id = %request.execution_result_id, "no frames in scan window");
        deps.result_store.update_kpi_result(
            request.execution_result_id,
            false,
            None,
            Some("no frames in window".to_string()),
            None,
        )?;
        return Ok(KpiOutcome::NoFramesInWindow);
    }

    let working_dir = snapshot_to_ram(&deps.working_root, request.execution_result_id, &frames, before.as_ref())?;
    let outcome = run_search_and_report(request, &frames, before.as_ref(), &working_dir, window.start, deps);
    let _ = std::fs::remove_dir_all(&working_dir);
    outcome
}

fn run_search_and_report(
    request: &KpiRequest,
    frames: &[super::scan::ScannedFrame],
    before: Option<&super::scan::ScannedFrame>,
    working_dir: &Path,
    window_start: chrono::DateTime<chrono::Utc>,
    deps: &KpiExecutorDeps,
) -> Result<KpiOutcome> {
    let result = search(
        frames,
        window_start,
        &request.kpi_references,
        &request.userinterface_name,
        request.team_id,
        deps.verification.as_ref(),
    )?;

    match result {
        SearchResult::Exhausted { frames_checked } => {
            deps.result_store.update_kpi_result(
                request.execution_result_id,
                false,
                None,
                Some("exhaustive_search_failed".to_string()),
                None,
            )?;
            Ok(KpiOutcome::ExhaustiveSearchFailed { frames_checked })
        }
        SearchResult::Matched { index, algorithm } => {
            let matched = &frames[index];
            let kpi_ms = (matched.mtime - request.action_timestamp).num_milliseconds();
            info!(execution_result_id = %request.execution_result_id, kpi_ms, ?algorithm, "KPI match found");

            let match_frame_name = matched.path.file_name().map_or_else(|| "match.jpg".to_string(), |n| n.to_string_lossy().into_owned());
            let html = render_report(request.execution_result_id, request.action_timestamp, matched.mtime, kpi_ms, algorithm, &match_frame_name);

            let before_match_frame = if index == 0 { before } else { frames.get(index - 1) };
            let thumbnails = ReportThumbnails {
                before_action: None,
                after_action: None,
                before_match: before_match_frame.map(|f| working_dir.join(f.thumbnail.file_name().unwrap_or_default())),
                match_thumbnail: Some(working_dir.join(matched.thumbnail.file_name().unwrap_or_default())),
            };

            let report_url = upload_report(deps.object_store.as_ref(), REPORT_PREFIX, request.execution_result_id, &html, &thumbnails);

            deps.result_store.update_kpi_result(request.execution_result_id, true, Some(kpi_ms), None, report_url.clone())?;

            Ok(KpiOutcome::Success { kpi_ms, algorithm, report_url })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::scan::ScannedFrame;
    use crate::kpi::store::NullKpiResultStore;
    use crate::kpi::verification::FakeVerificationExecutor;
    use crate::objectstore::NullObjectStore;
    use chrono::Utc;

    #[derive(Default)]
    struct RecordingObjectStore {
        uploads: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl ObjectStore for RecordingObjectStore {
        fn upload(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String> {
            self.uploads.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push((key.to_string(), bytes.to_vec()));
            Ok(format!("https://example.test/{key}"))
        }
    }

    fn deps(working_root: PathBuf) -> KpiExecutorDeps {
        KpiExecutorDeps {
            verification: Arc::new(FakeVerificationExecutor { matches_from_seq: 2 }),
            object_store: Arc::new(NullObjectStore),
            result_store: Arc::new(NullKpiResultStore),
            working_root,
        }
    }

    #[test]
    fn test_short_circuit_skips_scan() {
        let dir = tempfile::tempdir().unwrap();
        let action_ts = Utc::now();
        let request = KpiRequest {
            execution_result_id: uuid::Uuid::nil(),
            team_id: uuid::Uuid::nil(),
            capture_dir: dir.path().to_path_buf(),
            action_timestamp: action_ts,
            verification_timestamp: None,
            last_action_wait_ms: None,
            kpi_references: Vec::new(),
            timeout_ms: 5000,
            userinterface_name: "ui".to_string(),
            kpi_timestamp: Some(action_ts + chrono::Duration::milliseconds(200)),
        };

        let outcome = process_request(&request, &deps(dir.path().to_path_buf())).unwrap();
        match outcome {
            KpiOutcome::Success { kpi_ms, algorithm, .. } => {
                assert_eq!(kpi_ms, 200);
                assert_eq!(algorithm, Algorithm::ShortCircuit);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_no_frames_in_window() {
        let dir = tempfile::tempdir().unwrap();
        let captures = dir.path().join("captures");
        std::fs::create_dir_all(&captures).unwrap();
        let request = KpiRequest {
            execution_result_id: uuid::Uuid::nil(),
            team_id: uuid::Uuid::nil(),
            capture_dir: captures,
            action_timestamp: Utc::now(),
            verification_timestamp: None,
            last_action_wait_ms: None,
            kpi_references: Vec::new(),
            timeout_ms: 1000,
            userinterface_name: "ui".to_string(),
            kpi_timestamp: None,
        };
        let outcome = process_request(&request, &deps(dir.path().to_path_buf())).unwrap();
        assert!(matches!(outcome, KpiOutcome::NoFramesInWindow));
    }

    #[test]
    fn test_match_produces_success_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let captures = dir.path().join("captures");
        std::fs::create_dir_all(&captures).unwrap();
        let action_ts = Utc::now();
        std::fs::write(captures.join("capture_000000001.jpg"), b"a").unwrap();
        std::fs::write(captures.join("capture_000000002.jpg"), b"b").unwrap();

        let request = KpiRequest {
            execution_result_id: uuid::Uuid::nil(),
            team_id: uuid::Uuid::nil(),
            capture_dir: captures,
            action_timestamp: action_ts,
            verification_timestamp: None,
            last_action_wait_ms: None,
            kpi_references: Vec::new(),
            timeout_ms: 30_000,
            userinterface_name: "ui".to_string(),
            kpi_timestamp: None,
        };

        let outcome = process_request(&request, &deps(dir.path().to_path_buf())).unwrap();
        assert!(matches!(outcome, KpiOutcome::Success { .. }));
    }

    #[test]
    fn test_before_match_uses_snapshotted_before_frame_at_window_edge() {
        let dir = tempfile::tempdir().unwrap();
        let working_dir = dir.path().join("working");
        std::fs::create_dir_all(&working_dir).unwrap();
        std::fs::write(working_dir.join("capture_000000001_thumbnail.jpg"), b"before-thumb").unwrap();
        std::fs::write(working_dir.join("capture_000000002_thumbnail.jpg"), b"match-thumb").unwrap();

        let t0 = Utc::now();
        let before = ScannedFrame {
            path: PathBuf::from("capture_000000001.jpg"),
            thumbnail: PathBuf::from("capture_000000001_thumbnail.jpg"),
            mtime: t0 - chrono::Duration::milliseconds(200),
        };
        // The only frame inside the scan window: matches immediately, so the
        // backward/early-probe search returns index 0, with no in-window
        // predecessor for "before" evidence.
        let matched = ScannedFrame {
            path: PathBuf::from("capture_000000002.jpg"),
            thumbnail: PathBuf::from("capture_000000002_thumbnail.jpg"),
            mtime: t0,
        };

        let recorder = std::sync::Arc::new(RecordingObjectStore::default());
        let deps = KpiExecutorDeps {
            verification: Arc::new(FakeVerificationExecutor { matches_from_seq: 2 }),
            object_store: recorder.clone(),
            result_store: Arc::new(NullKpiResultStore),
            working_root: dir.path().to_path_buf(),
        };

        let request = KpiRequest {
            execution_result_id: uuid::Uuid::nil(),
            team_id: uuid::Uuid::nil(),
            capture_dir: working_dir.clone(),
            action_timestamp: t0,
            verification_timestamp: None,
            last_action_wait_ms: None,
            kpi_references: Vec::new(),
            timeout_ms: 30_000,
            userinterface_name: "ui".to_string(),
            kpi_timestamp: None,
        };

        let outcome = run_search_and_report(&request, &[matched], Some(&before), &working_dir, t0, &deps).unwrap();
        match outcome {
            KpiOutcome::Success { algorithm, .. } => assert_eq!(algorithm, Algorithm::QuickCheckEarly),
            other => panic!("expected success, got {other:?}"),
        }

        let uploads = recorder.uploads.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let before_upload = uploads.iter().find(|(key, _)| key.contains("before_match"));
        assert_eq!(before_upload.map(|(_, bytes)| bytes.as_slice()), Some(b"before-thumb".as_slice()));
    }
}
