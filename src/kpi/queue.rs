//! Bounded request queue fed by `/tmp/kpi_queue/kpi_request_*.json` (spec.md
//! §4.5 step 1). Unlike the frame monitor, files already present at startup
//! are deliberately enqueued (in filename order) rather than skipped, since a
//! KPI request left on disk across a restart still needs measuring.

use super::types::KpiRequest;
use crate::constants::kpi::{HEARTBEAT_INTERVAL, QUEUE_CAPACITY};
use crate::error::{Error, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, event::RenameMode};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

const QUEUE_FILE_PREFIX: &str = "kpi_request_";

/// Runs the KPI request queue forever: watches `queue_dir` for new request
/// files, enqueues pre-existing ones at startup in filename order, and hands
/// each parsed [`KpiRequest`] to `process` on a single worker. Emits a
/// heartbeat log line every [`HEARTBEAT_INTERVAL`] while idle.
pub async fn run_forever(queue_dir: PathBuf, process: impl Fn(KpiRequest) + Send + Sync + 'static) -> Result<()> {
    std::fs::create_dir_all(&queue_dir)?;

    let (tx, mut rx) = mpsc::channel::<PathBuf>(QUEUE_CAPACITY);

    for path in existing_request_files(&queue_dir)? {
        if tx.try_send(path.clone()).is_err() {
            warn!(path = %path.display(), "KPI queue full at startup, dropping request file");
        }
    }

    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = watch_tx.send(res);
    })
    .map_err(|source| Error::WatchFailed { path: queue_dir.clone(), source })?;
    watcher
        .watch(&queue_dir, RecursiveMode::NonRecursive)
        .map_err(|source| Error::WatchFailed { path: queue_dir.clone(), source })?;
    info!(path = %queue_dir.display(), "watching KPI request queue");

    let forward = tokio::spawn(async move {
        while let Some(event) = watch_rx.recv().await {
            let Ok(event) = event else { continue };
            if !is_move_in(&event.kind) {
                continue;
            }
            for path in event.paths {
                if is_request_file(&path) && tx.send(path.clone()).await.is_err() {
                    warn!(path = %path.display(), "KPI queue closed, dropping request file");
                }
            }
        }
    });

    loop {
        tokio::select! {
            maybe_path = rx.recv() => {
                let Some(path) = maybe_path else { break };
                handle_request_file(&path, &process);
            }
            () = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                info!("KPI queue idle");
            }
        }
    }

    forward.abort();
    drop(watcher);
    Ok(())
}

fn existing_request_files(queue_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(queue_dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_request_file(path))
        .collect();
    files.sort_unstable();
    Ok(files)
}

fn is_request_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with(QUEUE_FILE_PREFIX) && name.ends_with(".json"))
}

fn is_move_in(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Name(RenameMode::To))
    )
}

fn handle_request_file(path: &Path, process: &impl Fn(KpiRequest)) {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read KPI request file");
            return;
        }
    };
    match serde_json::from_str::<KpiRequest>(&contents) {
        Ok(request) => {
            process(request);
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove processed KPI request file");
            }
        }
        Err(e) => warn!(path = %path.display(), error = %e, "failed to parse KPI request file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_request_file_matches_prefix_and_suffix() {
        assert!(is_request_file(Path::new("/tmp/kpi_queue/kpi_request_1.json")));
        assert!(!is_request_file(Path::new("/tmp/kpi_queue/kpi_request_1.json.tmp")));
        assert!(!is_request_file(Path::new("/tmp/kpi_queue/other.json")));
    }

    #[test]
    fn test_existing_request_files_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kpi_request_002.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("kpi_request_001.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("not_a_request.txt"), b"x").unwrap();

        let files = existing_request_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].to_string_lossy().contains("kpi_request_001"));
        assert!(files[1].to_string_lossy().contains("kpi_request_002"));
    }
}
