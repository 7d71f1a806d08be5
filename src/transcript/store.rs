//! Cross-service manifest collaborator: notifies whatever downstream index
//! (DB row, search index) tracks "this chunk was just updated" after each
//! successful merge (spec.md §4.6.3 step 7).

use super::types::TranscriptChunk;
use crate::error::Result;

/// Collaborator contract for the cross-service transcript manifest.
pub trait TranscriptManifest: Send + Sync {
    /// Notifies the manifest that `chunk` was just (re)written.
    fn update_manifest(&self, capture_folder: &str, chunk: &TranscriptChunk) -> Result<()>;
}

/// No-op manifest used when no downstream index is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTranscriptManifest;

impl TranscriptManifest for NullTranscriptManifest {
    fn update_manifest(&self, _capture_folder: &str, _chunk: &TranscriptChunk) -> Result<()> {
        Ok(())
    }
}
