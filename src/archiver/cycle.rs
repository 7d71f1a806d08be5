//! One archival pass over every configured capture directory.

use super::hls::write_manifest_for_hour;
use super::retention::apply_retention;
use crate::config::Tunables;
use crate::error::Result;
use crate::storage::get_capture_base_directories;
use chrono::{Local, Timelike};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of one archival cycle across every configured capture directory.
#[derive(Debug, Default, Serialize)]
pub struct CycleReport {
    /// Per-directory results, in the order capture directories were listed.
    pub directories: Vec<DirectoryReport>,
}

/// Outcome of one archival cycle for a single capture directory.
#[derive(Debug, Default, Serialize)]
pub struct DirectoryReport {
    /// The capture directory this report covers.
    pub capture_dir: PathBuf,
    /// Number of files moved from hot overflow into cold hour buckets.
    pub archived: usize,
    /// Number of HLS manifests (re)written.
    pub manifests_updated: usize,
    /// Number of hour folders wiped by retention.
    pub folders_cleaned: usize,
    /// Per-step failures; a failure here does not abort the cycle.
    pub errors: Vec<String>,
}

struct ClassSpec {
    hot_dir: &'static str,
    cold_dir: &'static str,
    hot_limit_key: HotLimit,
    matches: fn(&str) -> bool,
}

#[derive(Clone, Copy)]
enum HotLimit {
    Segments,
    Other,
}

const CLASSES: &[ClassSpec] = &[
    ClassSpec {
        hot_dir: "segments",
        cold_dir: "segments",
        hot_limit_key: HotLimit::Segments,
        matches: is_segment_file,
    },
    ClassSpec {
        hot_dir: "captures",
        cold_dir: "captures",
        hot_limit_key: HotLimit::Other,
        matches: is_capture_frame_file,
    },
    ClassSpec {
        hot_dir: "captures",
        cold_dir: "captures",
        hot_limit_key: HotLimit::Other,
        matches: is_thumbnail_file,
    },
    ClassSpec {
        hot_dir: "captures",
        cold_dir: "captures",
        hot_limit_key: HotLimit::Other,
        matches: is_sidecar_file,
    },
];

fn is_segment_file(name: &str) -> bool {
    name.starts_with("segment_") && name.ends_with(".ts")
}

fn is_capture_frame_file(name: &str) -> bool {
    name.starts_with("capture_") && name.ends_with(".jpg") && !name.ends_with("_thumbnail.jpg")
}

fn is_thumbnail_file(name: &str) -> bool {
    name.starts_with("capture_") && name.ends_with("_thumbnail.jpg")
}

fn is_sidecar_file(name: &str) -> bool {
    name.starts_with("capture_") && name.ends_with(".json")
}

/// Runs a single archival cycle over every directory named in
/// `/tmp/active_captures.conf` (or its filesystem fallback).
pub fn run_cycle(conf_path: &Path, fallback_root: Option<&Path>, tunables: &Tunables) -> CycleReport {
    let capture_dirs = match get_capture_base_directories(conf_path, fallback_root) {
        Ok(dirs) => dirs,
        Err(e) => {
            warn!(error = %e, "failed to read active captures conf");
            return CycleReport::default();
        }
    };

    let directories = capture_dirs
        .iter()
        .map(|dir| run_cycle_for_directory(dir, tunables))
        .collect();

    CycleReport { directories }
}

fn run_cycle_for_directory(capture_dir: &Path, tunables: &Tunables) -> DirectoryReport {
    let mut report = DirectoryReport {
        capture_dir: capture_dir.to_path_buf(),
        ..Default::default()
    };

    for class in CLASSES {
        let hot_limit = match class.hot_limit_key {
            HotLimit::Segments => tunables.hot_limit_segments,
            HotLimit::Other => tunables.hot_limit_other,
        };
        let hot_root = hot_root_for(capture_dir, class.hot_dir);
        let cold_root = capture_dir.join(class.cold_dir);

        match archive_overflow(&hot_root, &cold_root, class.matches, hot_limit) {
            Ok(archived) => report.archived += archived,
            Err(e) => report
                .errors
                .push(format!("archive overflow ({}): {e}", class.hot_dir)),
        }
    }

    let segments_root = capture_dir.join("segments");
    match update_manifests(&segments_root) {
        Ok(count) => report.manifests_updated += count,
        Err(e) => report.errors.push(format!("manifest update: {e}")),
    }

    let current_hour = Local::now().hour();
    for (class_root, retention_hours) in [
        (capture_dir.join("captures"), tunables.retention_hours_captures),
        (capture_dir.join("segments"), tunables.retention_hours_other),
        (capture_dir.join("metadata"), tunables.retention_hours_other),
    ] {
        match apply_retention(&class_root, current_hour, retention_hours) {
            Ok(cleaned) => report.folders_cleaned += cleaned,
            Err(e) => report
                .errors
                .push(format!("retention ({}): {e}", class_root.display())),
        }
    }

    info!(
        capture_dir = %capture_dir.display(),
        archived = report.archived,
        manifests_updated = report.manifests_updated,
        folders_cleaned = report.folders_cleaned,
        "archiver cycle complete"
    );

    report
}

fn hot_root_for(capture_dir: &Path, class_dir: &str) -> PathBuf {
    let hot = capture_dir.join("hot").join(class_dir);
    if capture_dir.join("hot").is_dir() {
        hot
    } else {
        capture_dir.join(class_dir)
    }
}

fn archive_overflow(
    hot_root: &Path,
    cold_root: &Path,
    matches: fn(&str) -> bool,
    hot_limit: usize,
) -> Result<usize> {
    if !hot_root.is_dir() {
        return Ok(0);
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(hot_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !matches(&name) {
            continue;
        }
        let mtime = entry.metadata()?.modified()?;
        candidates.push((mtime, name));
    }

    if candidates.len() <= hot_limit {
        return Ok(0);
    }

    candidates.sort_unstable_by_key(|(mtime, _)| *mtime);
    let overflow_count = candidates.len() - hot_limit;

    let mut archived = 0;
    for (mtime, name) in candidates.into_iter().take(overflow_count) {
        let hour = mtime_to_local_hour(mtime);
        let hour_dir = cold_root.join(hour.to_string());
        create_hour_dir(&hour_dir)?;

        let src = hot_root.join(&name);
        let dst = hour_dir.join(&name);
        if src == dst {
            continue;
        }
        std::fs::rename(&src, &dst)?;
        archived += 1;
    }
    Ok(archived)
}

fn mtime_to_local_hour(mtime: std::time::SystemTime) -> u32 {
    let dt: chrono::DateTime<Local> = mtime.into();
    dt.hour()
}

#[cfg(unix)]
fn create_hour_dir(hour_dir: &Path) -> Result<()> {
    use crate::constants::archiver::HOUR_DIR_MODE;
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(hour_dir)?;
    std::fs::set_permissions(hour_dir, std::fs::Permissions::from_mode(HOUR_DIR_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn create_hour_dir(hour_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(hour_dir)?;
    Ok(())
}

fn update_manifests(segments_root: &Path) -> Result<usize> {
    if !segments_root.is_dir() {
        return Ok(0);
    }

    let mut updated = 0;
    for entry in std::fs::read_dir(segments_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let hour_dir = entry.path();
        let has_segments = std::fs::read_dir(&hour_dir)?
            .filter_map(std::result::Result::ok)
            .any(|e| e.file_name().to_str().is_some_and(is_segment_file));
        if has_segments {
            write_manifest_for_hour(&hour_dir)?;
            updated += 1;
        }
    }
    Ok(updated)
}

/// Runs [`run_cycle`] on a fixed interval until the task is aborted.
pub async fn run_forever(conf_path: PathBuf, fallback_root: Option<PathBuf>, tunables: Tunables) {
    let mut interval = tokio::time::interval(crate::constants::archiver::CYCLE_INTERVAL);
    loop {
        interval.tick().await;
        let report = run_cycle(&conf_path, fallback_root.as_deref(), &tunables);
        for dir in &report.directories {
            for error in &dir.errors {
                warn!(capture_dir = %dir.capture_dir.display(), %error, "archiver step failed");
            }
        }
    }
}
