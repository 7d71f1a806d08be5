//! Hot/cold path resolution for a single device's capture folder.

use crate::error::Result;
use chrono::{DateTime, Datelike, Local, TimeZone};
use std::path::{Path, PathBuf};

/// A class of file produced or consumed by the pipeline.
///
/// Kept as a tagged enum rather than a free-form string so every call site
/// is checked at compile time; see `archiver` for the per-class retention
/// and overflow rules that key off this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileClass {
    /// Full-resolution capture frames (`capture_<SEQ>.jpg`).
    Captures,
    /// Sibling thumbnails (`capture_<SEQ>_thumbnail.jpg`); archived under
    /// their own overflow count but share the captures directory.
    Thumbnails,
    /// Per-frame and cross-process metadata (sidecars live alongside
    /// captures; this class covers `metadata/` proper: transcript chunk
    /// JSON, `last_action.json`, `last_zapping.json`).
    Metadata,
    /// HLS segments (`segment_<N>.ts`).
    Segments,
    /// Rotating 1-minute and hourly 10-minute MP3s.
    Audio,
    /// Per-language transcript translations.
    Transcripts,
}

impl FileClass {
    /// Directory name this class resolves to under a device root.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Captures | Self::Thumbnails => "captures",
            Self::Metadata => "metadata",
            Self::Segments => "segments",
            Self::Audio => "audio",
            Self::Transcripts => "transcripts",
        }
    }
}

/// Resolves hot (tmpfs) vs cold (disk) paths for one device's capture
/// folder.
///
/// A device is in "RAM mode" when its hot root (`<device_root>/hot`)
/// exists; otherwise every class resolves directly under `device_root`
/// ("SD mode").
#[derive(Debug, Clone)]
pub struct StorageLayout {
    device_root: PathBuf,
    ram_mode: bool,
}

impl StorageLayout {
    /// Build a layout for a device root, probing for RAM mode by checking
    /// whether a `hot/` subdirectory exists.
    #[must_use]
    pub fn new(device_root: impl Into<PathBuf>) -> Self {
        let device_root = device_root.into();
        let ram_mode = device_root.join("hot").is_dir();
        Self {
            device_root,
            ram_mode,
        }
    }

    /// Build a layout with an explicit RAM-mode flag, bypassing the
    /// filesystem probe (used by tests and by callers that already know
    /// the mode from configuration).
    #[must_use]
    pub fn with_mode(device_root: impl Into<PathBuf>, ram_mode: bool) -> Self {
        Self {
            device_root: device_root.into(),
            ram_mode,
        }
    }

    /// Whether this device is in RAM (tmpfs hot root) mode.
    #[must_use]
    pub const fn is_ram_mode(&self) -> bool {
        self.ram_mode
    }

    /// The device's base directory (not class-specific).
    #[must_use]
    pub fn device_base_path(&self) -> &Path {
        &self.device_root
    }

    /// Resolve the active path for a file class: the hot path in RAM mode,
    /// the cold path otherwise.
    #[must_use]
    pub fn resolve(&self, class: FileClass) -> PathBuf {
        if self.ram_mode {
            self.device_root.join("hot").join(class.dir_name())
        } else {
            self.device_root.join(class.dir_name())
        }
    }

    /// The cold (persistent, disk-backed) path for a class, regardless of
    /// RAM mode.
    #[must_use]
    pub fn cold_path(&self, class: FileClass) -> PathBuf {
        self.device_root.join(class.dir_name())
    }
}

/// The cold storage path for a class under an arbitrary device root,
/// without constructing a full [`StorageLayout`].
#[must_use]
pub fn get_cold_storage_path(device_root: &Path, class: FileClass) -> PathBuf {
    device_root.join(class.dir_name())
}

/// Copy `src` into cold storage at `dst`, skipping the copy if `dst`
/// already exists with the same size and modification time (idempotent:
/// safe to call repeatedly while evicting the same hot file).
pub fn copy_to_cold_storage(src: &Path, dst: &Path) -> Result<()> {
    if let Ok(dst_meta) = std::fs::metadata(dst) {
        let src_meta = std::fs::metadata(src)?;
        if dst_meta.len() == src_meta.len() && same_mtime(&src_meta, &dst_meta) {
            return Ok(());
        }
    }

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst)?;
    Ok(())
}

fn same_mtime(a: &std::fs::Metadata, b: &std::fs::Metadata) -> bool {
    match (a.modified(), b.modified()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Maps a local timestamp to its hour bucket (0..23) and 10-minute chunk
/// index within that hour (0..5).
#[must_use]
pub fn calculate_chunk_location(dt: DateTime<Local>) -> (u32, u32) {
    use chrono::Timelike;
    (dt.hour(), dt.minute() / 10)
}

/// Derives the sibling thumbnail path for a capture frame, e.g.
/// `capture_000000001.jpg` -> `capture_000000001_thumbnail.jpg`.
#[must_use]
pub fn get_thumbnail_path_from_capture(capture_path: &Path) -> PathBuf {
    let stem = capture_path
        .file_stem()
        .map_or_else(|| "capture".into(), |s| s.to_string_lossy().into_owned());
    let extension = capture_path
        .extension()
        .map_or_else(|| "jpg".into(), |e| e.to_string_lossy().into_owned());
    capture_path.with_file_name(format!("{stem}_thumbnail.{extension}"))
}

/// Constructs a local `DateTime` for a given hour-of-day today, used by
/// archiver retention math when reasoning about `hours_ago`.
#[must_use]
pub fn local_hour_today(hour: u32) -> Option<DateTime<Local>> {
    let now = Local::now();
    Local.with_ymd_and_hms(now.year(), now.month(), now.day(), hour, 0, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_class_dir_names() {
        assert_eq!(FileClass::Captures.dir_name(), "captures");
        assert_eq!(FileClass::Thumbnails.dir_name(), "captures");
        assert_eq!(FileClass::Segments.dir_name(), "segments");
        assert_eq!(FileClass::Metadata.dir_name(), "metadata");
    }

    #[test]
    fn test_resolve_sd_mode_is_direct_child() {
        let layout = StorageLayout::with_mode("/data/capture1", false);
        assert_eq!(
            layout.resolve(FileClass::Captures),
            PathBuf::from("/data/capture1/captures")
        );
    }

    #[test]
    fn test_resolve_ram_mode_goes_through_hot() {
        let layout = StorageLayout::with_mode("/data/capture1", true);
        assert_eq!(
            layout.resolve(FileClass::Segments),
            PathBuf::from("/data/capture1/hot/segments")
        );
        assert_eq!(
            layout.cold_path(FileClass::Segments),
            PathBuf::from("/data/capture1/segments")
        );
    }

    #[test]
    fn test_calculate_chunk_location() {
        let dt = Local.with_ymd_and_hms(2024, 3, 14, 23, 59, 0).single().unwrap();
        assert_eq!(calculate_chunk_location(dt), (23, 5));

        let dt = Local.with_ymd_and_hms(2024, 3, 15, 0, 9, 0).single().unwrap();
        assert_eq!(calculate_chunk_location(dt), (0, 0));
    }

    #[test]
    fn test_thumbnail_path_from_capture() {
        let path = Path::new("/data/capture1/captures/capture_000000001.jpg");
        let thumb = get_thumbnail_path_from_capture(path);
        assert_eq!(
            thumb,
            PathBuf::from("/data/capture1/captures/capture_000000001_thumbnail.jpg")
        );
    }

    #[test]
    fn test_copy_to_cold_storage_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.jpg");
        let dst = dir.path().join("cold").join("dst.jpg");
        std::fs::write(&src, b"frame-bytes").unwrap();

        copy_to_cold_storage(&src, &dst).unwrap();
        assert!(dst.exists());

        // second call must not error even though dst now exists
        copy_to_cold_storage(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"frame-bytes");
    }
}
