//! Freeze evidence upload: on first freeze detection, uploads the last 3
//! full-res frames and thumbnails to the object store and rewrites the
//! detection result with the resulting URLs, caching per-device so the
//! same freeze episode is not re-uploaded on every subsequent frame.

use crate::incident::IncidentMetadata;
use crate::monitor::detect::DetectionResult;
use crate::objectstore::{ObjectStore, try_upload_file};
use chrono::Local;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;

/// Per-device freeze/audio-loss evidence state: whether the current
/// episode of each kind has already been uploaded.
#[derive(Debug, Default)]
pub struct EvidenceCache {
    uploaded_for_episode: DashMap<String, bool>,
    uploaded_for_audio_episode: DashMap<String, bool>,
}

impl EvidenceCache {
    /// Builds an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-device flag when a freeze episode ends, so the next
    /// freeze re-uploads fresh evidence.
    pub fn clear(&self, device_id: &str) {
        self.uploaded_for_episode.remove(device_id);
    }

    /// Clears the per-device flag when an audio-loss episode ends.
    pub fn clear_audio(&self, device_id: &str) {
        self.uploaded_for_audio_episode.remove(device_id);
    }

    /// Uploads the segment that triggered an audio-loss incident exactly
    /// once per episode, populating `metadata.r2_urls`, mirroring
    /// [`Self::upload_freeze_evidence`]'s protocol (spec.md §4.6.4).
    pub fn upload_audio_loss_evidence(
        &self,
        store: &dyn ObjectStore,
        device_id: &str,
        segment_path: &Path,
        metadata: &mut IncidentMetadata,
    ) {
        if self.uploaded_for_audio_episode.get(device_id).is_some() {
            return;
        }

        let hhmm = Local::now().format("%H%M").to_string();
        if let Some(name) = segment_path.file_name() {
            let key = format!("alerts/audio_loss/{device_id}/{hhmm}_{}", name.to_string_lossy());
            if let Some(url) = try_upload_file(store, segment_path, &key, "video/mp2t") {
                metadata.r2_urls.insert("segment".to_string(), url);
            }
        }

        self.uploaded_for_audio_episode.insert(device_id.to_string(), true);
    }

    /// Uploads evidence for `detection.last_3_filenames`/`last_3_thumbnails`
    /// exactly once per freeze episode, populating `metadata.r2_urls`.
    /// No-op (returns immediately) on every subsequent frame of the same
    /// episode.
    pub fn upload_freeze_evidence(
        &self,
        store: &dyn ObjectStore,
        device_id: &str,
        captures_dir: &Path,
        detection: &DetectionResult,
        metadata: &mut IncidentMetadata,
    ) {
        if self.uploaded_for_episode.get(device_id).is_some() {
            return;
        }

        let hhmm = Local::now().format("%H%M").to_string();
        let mut urls: HashMap<String, String> = HashMap::new();

        for (i, name) in detection.last_3_filenames.iter().enumerate() {
            let path = captures_dir.join(name);
            let key = format!("alerts/freeze/{device_id}/{hhmm}_frame_{i}.jpg");
            if let Some(url) = try_upload_file(store, &path, &key, "image/jpeg") {
                urls.insert(format!("frame_{i}"), url);
            }
        }
        for (i, name) in detection.last_3_thumbnails.iter().enumerate() {
            let path = captures_dir.join(name);
            let key = format!("alerts/freeze/{device_id}/{hhmm}_thumb_{i}.jpg");
            if let Some(url) = try_upload_file(store, &path, &key, "image/jpeg") {
                urls.insert(format!("thumb_{i}"), url);
            }
        }

        metadata.r2_urls.extend(urls);
        self.uploaded_for_episode.insert(device_id.to_string(), true);
    }
}
