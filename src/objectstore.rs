//! Object-store collaborator seam (the R2-compatible evidence/report
//! store). Every uploader in the pipeline — freeze evidence, zapping
//! transition images, KPI reports, reference images — goes through this
//! trait so upload failures degrade gracefully per spec.md §7: the
//! local/filesystem path always survives even when the upload does not.

use crate::error::Result;

/// Collaborator contract for the object store.
pub trait ObjectStore: Send + Sync {
    /// Uploads `bytes` under `key`, returning the web-visible URL.
    fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String>;
}

/// No-op store used when no object-store endpoint/bucket is configured.
/// Uploads are treated as failed but non-fatal: callers proceed with
/// local paths and an empty URL map, exactly as spec.md §7 describes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObjectStore;

impl ObjectStore for NullObjectStore {
    fn upload(&self, key: &str, _bytes: &[u8], _content_type: &str) -> Result<String> {
        Err(crate::error::Error::ObjectStoreUpload {
            key: key.to_string(),
            source: "object store not configured".into(),
        })
    }
}

/// Uploads `path` under `key`, swallowing failures and returning `None`
/// instead of propagating them, since an upload failure must never abort
/// the caller's pipeline (spec.md §7: "Object-store upload failure").
pub fn try_upload_file(
    store: &dyn ObjectStore,
    path: &std::path::Path,
    key: &str,
    content_type: &str,
) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    match store.upload(key, &bytes, content_type) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(key, error = %e, "object store upload failed");
            None
        }
    }
}
