//! Parses the shared `active_captures.conf` listing every capture
//! directory the host's services should watch.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reads `conf_path` (one absolute capture directory per line; blank lines
/// and `#`-comments ignored). If the file does not exist, falls back to
/// scanning `fallback_root` for child directories named `capture<N>`.
pub fn get_capture_base_directories(
    conf_path: &Path,
    fallback_root: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    if conf_path.exists() {
        return read_conf_file(conf_path);
    }

    warn!(
        path = %conf_path.display(),
        "active captures conf not found, falling back to filesystem scan"
    );

    let Some(root) = fallback_root else {
        return Ok(Vec::new());
    };
    scan_fallback_root(root)
}

fn read_conf_file(conf_path: &Path) -> Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(conf_path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

fn scan_fallback_root(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("capture"))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_conf_skipping_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("active_captures.conf");
        std::fs::write(
            &conf,
            "# active capture dirs\n\n/data/capture1\n   \n/data/capture2\n",
        )
        .unwrap();

        let dirs = get_capture_base_directories(&conf, None).unwrap();
        assert_eq!(
            dirs,
            vec![PathBuf::from("/data/capture1"), PathBuf::from("/data/capture2")]
        );
    }

    #[test]
    fn test_falls_back_to_scanning_root_when_conf_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("capture1")).unwrap();
        std::fs::create_dir(dir.path().join("capture2")).unwrap();
        std::fs::create_dir(dir.path().join("not-a-capture")).unwrap();

        let missing_conf = dir.path().join("active_captures.conf");
        let dirs = get_capture_base_directories(&missing_conf, Some(dir.path())).unwrap();
        assert_eq!(dirs.len(), 2);
    }

    #[test]
    fn test_no_fallback_root_returns_empty() {
        let missing_conf = Path::new("/nonexistent/active_captures.conf");
        let dirs = get_capture_base_directories(missing_conf, None).unwrap();
        assert!(dirs.is_empty());
    }
}
