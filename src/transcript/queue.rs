//! The two-queue Whisper worker (spec.md §4.6): a LIFO `inotify_queue` for
//! real-time 1-minute MP3s and a FIFO `scan_queue` for the 10-minute backlog,
//! serviced by a single worker that always drains the LIFO queue first.

use super::service::{TranscriptDeps, init_thread_caps, process_one_minute_file, process_ten_minute_file, parse_ten_minute_chunk};
use crate::constants::transcript::HEARTBEAT_INTERVAL;
use crate::error::{Error, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, event::RenameMode};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Paths rooted at a single device's capture folder that the transcript
/// worker needs.
#[derive(Debug, Clone)]
pub struct TranscriptPaths {
    /// `audio/temp/` — real-time 1-minute MP3s land here.
    pub audio_temp_dir: PathBuf,
    /// `audio/` — hourly subdirectories hold the 10-minute backlog MP3s.
    pub audio_dir: PathBuf,
    /// `metadata/` — owns the per-hour transcript chunk JSON.
    pub metadata_dir: PathBuf,
    /// The device's logical capture folder name (`capture1`, ...).
    pub capture_folder: String,
    /// The device's logical id (`device1`, ...).
    pub device_id: String,
}

/// Runs the dual-queue transcript worker forever for one device: watches
/// `audio_temp_dir` for newly-arrived 1-minute MP3s (LIFO, cap
/// [`crate::constants::transcript::INOTIFY_QUEUE_CAPACITY`]), seeds a FIFO
/// backlog queue (cap [`crate::constants::transcript::SCAN_QUEUE_CAPACITY`])
/// from 10-minute MP3s under `audio_dir` missing a transcript chunk, and
/// drains the LIFO queue before ever touching the FIFO one. Emits a
/// heartbeat log line every [`HEARTBEAT_INTERVAL`] while idle.
pub async fn run_forever(paths: TranscriptPaths, deps: TranscriptDeps) -> Result<()> {
    init_thread_caps();
    std::fs::create_dir_all(&paths.audio_temp_dir)?;

    let mut inotify_queue: Vec<PathBuf> = Vec::new();
    let mut scan_queue: VecDeque<PathBuf> = backfill_candidates(&paths.audio_dir, &paths.metadata_dir)?.into();
    info!(backlog = scan_queue.len(), "seeded transcript scan queue");

    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let watch_dir = paths.audio_temp_dir.clone();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = watch_tx.send(res);
    })
    .map_err(|source| Error::WatchFailed { path: watch_dir.clone(), source })?;
    watcher
        .watch(&paths.audio_temp_dir, RecursiveMode::NonRecursive)
        .map_err(|source| Error::WatchFailed { path: paths.audio_temp_dir.clone(), source })?;
    info!(path = %paths.audio_temp_dir.display(), "watching transcript inotify queue");

    loop {
        if let Some(path) = inotify_queue.pop() {
            handle_one_minute_file(&path, &paths, &deps);
            continue;
        }
        if let Some(path) = scan_queue.pop_front() {
            handle_ten_minute_file(&path, &paths, &deps);
            continue;
        }

        tokio::select! {
            maybe_event = watch_rx.recv() => {
                let Some(event) = maybe_event else { break };
                let Ok(event) = event else { continue };
                if !is_move_in(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if !is_one_minute_file(&path) {
                        continue;
                    }
                    if inotify_queue.len() >= crate::constants::transcript::INOTIFY_QUEUE_CAPACITY {
                        warn!(path = %path.display(), "transcript inotify queue full, dropping oldest");
                        inotify_queue.remove(0);
                    }
                    inotify_queue.push(path);
                }
            }
            () = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                info!("transcript worker idle");
            }
        }
    }

    drop(watcher);
    Ok(())
}

fn handle_one_minute_file(path: &Path, paths: &TranscriptPaths, deps: &TranscriptDeps) {
    match process_one_minute_file(path, &paths.metadata_dir, &paths.audio_temp_dir, &paths.capture_folder, &paths.device_id, deps) {
        Ok(chunk) => info!(path = %path.display(), minutes = chunk.minute_statuses.len(), "merged 1-minute transcript"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to process 1-minute file"),
    }
}

fn handle_ten_minute_file(path: &Path, paths: &TranscriptPaths, deps: &TranscriptDeps) {
    let Some((hour, _)) = parse_ten_minute_chunk(path) else {
        warn!(path = %path.display(), "unrecognized 10-minute chunk filename");
        return;
    };
    let audio_hour_dir = paths.audio_dir.join(hour.to_string());
    match process_ten_minute_file(path, &paths.metadata_dir, &audio_hour_dir, &paths.capture_folder, &paths.device_id, deps) {
        Ok(Some(_)) => info!(path = %path.display(), "merged 10-minute backfill transcript"),
        Ok(None) => info!(path = %path.display(), "10-minute chunk was silent, skipped"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to process 10-minute file"),
    }
}

/// Finds 10-minute MP3s under `audio_dir/<hour>/chunk_10min_<C>.mp3` whose
/// owning transcript chunk JSON does not yet exist, up to
/// [`crate::constants::transcript::SCAN_QUEUE_CAPACITY`] entries.
fn backfill_candidates(audio_dir: &Path, metadata_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    if !audio_dir.is_dir() {
        return Ok(candidates);
    }

    let mut hour_dirs: Vec<PathBuf> = std::fs::read_dir(audio_dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    hour_dirs.sort_unstable();

    'outer: for hour_dir in hour_dirs {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&hour_dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_ten_minute_file(path))
            .collect();
        files.sort_unstable();

        for path in files {
            let Some((hour, chunk)) = parse_ten_minute_chunk(&path) else {
                continue;
            };
            let chunk_json = super::chunkio::chunk_path(metadata_dir, hour, chunk);
            if chunk_json.is_file() {
                continue;
            }
            candidates.push(path);
            if candidates.len() >= crate::constants::transcript::SCAN_QUEUE_CAPACITY {
                break 'outer;
            }
        }
    }

    Ok(candidates)
}

fn is_one_minute_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with("1min_") && name.ends_with(".mp3"))
}

fn is_ten_minute_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with("chunk_10min_") && name.ends_with(".mp3"))
}

fn is_move_in(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Name(RenameMode::To))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_one_minute_file_matches_prefix_and_suffix() {
        assert!(is_one_minute_file(Path::new("/a/1min_3.mp3")));
        assert!(!is_one_minute_file(Path::new("/a/1min_3.mp3.tmp")));
        assert!(!is_one_minute_file(Path::new("/a/chunk_10min_3.mp3")));
    }

    #[test]
    fn test_is_ten_minute_file_matches_prefix_and_suffix() {
        assert!(is_ten_minute_file(Path::new("/a/chunk_10min_3.mp3")));
        assert!(!is_ten_minute_file(Path::new("/a/1min_3.mp3")));
    }

    #[test]
    fn test_backfill_candidates_skips_chunks_with_existing_json() {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("audio");
        let metadata_dir = dir.path().join("metadata");
        let hour_dir = audio_dir.join("14");
        std::fs::create_dir_all(&hour_dir).unwrap();
        std::fs::write(hour_dir.join("chunk_10min_0.mp3"), b"a").unwrap();
        std::fs::write(hour_dir.join("chunk_10min_1.mp3"), b"b").unwrap();

        let existing_json = super::super::chunkio::chunk_path(&metadata_dir, 14, 0);
        std::fs::create_dir_all(existing_json.parent().unwrap()).unwrap();
        std::fs::write(&existing_json, b"{}").unwrap();

        let candidates = backfill_candidates(&audio_dir, &metadata_dir).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].ends_with("chunk_10min_1.mp3"));
    }

    #[test]
    fn test_backfill_candidates_respects_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("audio");
        let metadata_dir = dir.path().join("metadata");
        let hour_dir = audio_dir.join("14");
        std::fs::create_dir_all(&hour_dir).unwrap();
        for i in 0..6 {
            std::fs::write(hour_dir.join(format!("chunk_10min_{i}.mp3")), b"a").unwrap();
        }

        let candidates = backfill_candidates(&audio_dir, &metadata_dir).unwrap();
        assert!(candidates.len() <= crate::constants::transcript::SCAN_QUEUE_CAPACITY);
    }
}
