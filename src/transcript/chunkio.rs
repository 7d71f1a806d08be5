//! Atomic, lock-guarded I/O for transcript chunk JSON files, mirroring
//! [`crate::sidecar`]'s pattern but for `metadata/<hour>/chunk_10min_<C>.json`
//! instead of per-frame sidecars.

use super::types::TranscriptChunk;
use crate::error::{Error, Result};
use crate::locking::{RetryPolicy, with_sidecar_lock};
use std::path::{Path, PathBuf};

/// The chunk JSON path for `(hour, chunk_index)` under a device's metadata
/// directory.
#[must_use]
pub fn chunk_path(metadata_dir: &Path, hour: u32, chunk_index: u32) -> PathBuf {
    metadata_dir.join(hour.to_string()).join(format!("chunk_10min_{chunk_index}.json"))
}

/// Reads a chunk file, tolerating absence.
pub fn read_chunk(path: &Path) -> Result<Option<TranscriptChunk>> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let chunk = serde_json::from_str(&contents).map_err(|source| Error::SidecarParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(chunk))
}

/// Writes `chunk` to `path` atomically via `path.tmp` then rename.
pub fn write_chunk_atomic(path: &Path, chunk: &TranscriptChunk) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(chunk).map_err(|source| Error::SidecarParse {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Runs `mutate` against the current chunk contents (or `None` if absent)
/// while holding the chunk's advisory lock, then atomically writes
/// whatever `mutate` returns.
pub fn with_locked_chunk(path: &Path, mutate: impl FnOnce(Option<TranscriptChunk>) -> TranscriptChunk) -> Result<TranscriptChunk> {
    with_sidecar_lock(path, RetryPolicy::default(), || {
        let current = read_chunk(path)?;
        let updated = mutate(current);
        write_chunk_atomic(path, &updated)?;
        Ok(updated)
    })
}
