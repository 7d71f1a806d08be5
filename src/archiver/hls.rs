//! HLS manifest generation for archived segment hour-buckets.

use crate::constants::archiver::{HLS_SEGMENT_DURATION, HLS_TARGET_DURATION};
use crate::error::Result;
use std::fmt::Write as _;
use std::path::Path;

/// Writes `archive.m3u8` for one hour folder of a `segments` class,
/// covering every `segment_<N>.ts` file directly inside it.
///
/// `#EXT-X-MEDIA-SEQUENCE` is the smallest segment index present; the
/// number of `#EXTINF` lines equals the number of segment files.
pub fn write_manifest_for_hour(hour_dir: &Path) -> Result<()> {
    let mut segments = list_segments(hour_dir)?;
    if segments.is_empty() {
        return Ok(());
    }
    segments.sort_unstable_by_key(|(index, _)| *index);

    let first_index = segments[0].0;
    let mut manifest = String::new();
    let _ = writeln!(manifest, "#EXTM3U");
    let _ = writeln!(manifest, "#EXT-X-VERSION:3");
    let _ = writeln!(manifest, "#EXT-X-TARGETDURATION:{HLS_TARGET_DURATION}");
    let _ = writeln!(manifest, "#EXT-X-MEDIA-SEQUENCE:{first_index}");
    for (_, name) in &segments {
        let _ = writeln!(manifest, "#EXTINF:{HLS_SEGMENT_DURATION:.6},");
        let _ = writeln!(manifest, "{name}");
    }
    let _ = writeln!(manifest, "#EXT-X-ENDLIST");

    std::fs::write(hour_dir.join("archive.m3u8"), manifest)?;
    Ok(())
}

fn list_segments(hour_dir: &Path) -> Result<Vec<(u64, String)>> {
    if !hour_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    for entry in std::fs::read_dir(hour_dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if let Some(index) = segment_index(&name) {
            segments.push((index, name));
        }
    }
    Ok(segments)
}

fn segment_index(name: &str) -> Option<u64> {
    let stem = name.strip_prefix("segment_")?.strip_suffix(".ts")?;
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_contains_correct_media_sequence_and_extinf_count() {
        let dir = tempfile::tempdir().unwrap();
        for n in [13000, 13001, 13002] {
            std::fs::write(dir.path().join(format!("segment_{n}.ts")), b"").unwrap();
        }

        write_manifest_for_hour(dir.path()).unwrap();
        let manifest = std::fs::read_to_string(dir.path().join("archive.m3u8")).unwrap();

        assert!(manifest.contains("#EXT-X-MEDIA-SEQUENCE:13000"));
        assert_eq!(manifest.matches("#EXTINF:1.000000,").count(), 3);
        assert!(manifest.starts_with("#EXTM3U\n"));
        assert!(manifest.trim_end().ends_with("#EXT-X-ENDLIST"));
    }

    #[test]
    fn test_empty_hour_folder_writes_no_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest_for_hour(dir.path()).unwrap();
        assert!(!dir.path().join("archive.m3u8").exists());
    }

    #[test]
    fn test_segments_ordered_by_integer_not_string() {
        let dir = tempfile::tempdir().unwrap();
        for n in [9, 10, 2] {
            std::fs::write(dir.path().join(format!("segment_{n}.ts")), b"").unwrap();
        }

        write_manifest_for_hour(dir.path()).unwrap();
        let manifest = std::fs::read_to_string(dir.path().join("archive.m3u8")).unwrap();
        assert!(manifest.contains("#EXT-X-MEDIA-SEQUENCE:2"));

        let names: Vec<&str> = manifest
            .lines()
            .filter(|l| l.starts_with("segment_"))
            .collect();
        assert_eq!(names, vec!["segment_2.ts", "segment_9.ts", "segment_10.ts"]);
    }
}
