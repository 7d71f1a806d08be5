//! Maps a capture folder name to its device identity via environment
//! variables, ported from the reference `storage_path_utils` helper.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Device identity and paths resolved from the environment for one capture
/// folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Logical device id: `device1..N`, or the sentinel `host`.
    pub device_id: String,
    /// Human-readable device name.
    pub device_name: String,
    /// Device model string, when declared (`DEVICE<N>_MODEL`).
    pub device_model: Option<String>,
    /// Root directory the encoder writes captures into.
    pub capture_path: PathBuf,
    /// Root directory the encoder writes the live HLS stream into.
    pub stream_path: PathBuf,
}

/// Resolves `{device_id, device_name, capture_path, stream_path}` for a
/// `capture_folder` such as `capture1`, or the sentinel `host`, by reading
/// `DEVICE<N>_*` (or `HOST_*`) environment variables.
pub fn get_device_info_from_capture_folder(capture_folder: &str) -> Result<DeviceInfo> {
    if capture_folder == "host" {
        return host_device_info();
    }

    let index = capture_folder
        .strip_prefix("capture")
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .ok_or_else(|| Error::DeviceEnvMissing {
            capture_folder: capture_folder.to_string(),
        })?;

    let prefix = format!("DEVICE{index}");
    let device_name = env_var(&format!("{prefix}_NAME")).ok_or_else(|| Error::DeviceEnvMissing {
        capture_folder: capture_folder.to_string(),
    })?;
    let capture_path = env_var(&format!("{prefix}_VIDEO_CAPTURE_PATH")).ok_or_else(|| {
        Error::DeviceEnvMissing {
            capture_folder: capture_folder.to_string(),
        }
    })?;
    let stream_path = env_var(&format!("{prefix}_VIDEO_STREAM_PATH")).ok_or_else(|| {
        Error::DeviceEnvMissing {
            capture_folder: capture_folder.to_string(),
        }
    })?;
    let device_model = env_var(&format!("{prefix}_MODEL"));

    Ok(DeviceInfo {
        device_id: format!("device{index}"),
        device_name,
        device_model,
        capture_path: PathBuf::from(capture_path),
        stream_path: PathBuf::from(stream_path),
    })
}

fn host_device_info() -> Result<DeviceInfo> {
    let device_name = env_var("HOST_NAME").ok_or_else(|| Error::DeviceEnvMissing {
        capture_folder: "host".to_string(),
    })?;
    let capture_path =
        env_var("HOST_VIDEO_CAPTURE_PATH").ok_or_else(|| Error::DeviceEnvMissing {
            capture_folder: "host".to_string(),
        })?;
    let stream_path = env_var("HOST_VIDEO_STREAM_PATH").ok_or_else(|| Error::DeviceEnvMissing {
        capture_folder: "host".to_string(),
    })?;

    Ok(DeviceInfo {
        device_id: "host".to_string(),
        device_name,
        device_model: None,
        capture_path: PathBuf::from(capture_path),
        stream_path: PathBuf::from(stream_path),
    })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(unsafe_code, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_device_env(index: u32) {
        for suffix in ["NAME", "MODEL", "VIDEO_CAPTURE_PATH", "VIDEO_STREAM_PATH"] {
            unsafe {
                std::env::remove_var(format!("DEVICE{index}_{suffix}"));
            }
        }
    }

    #[test]
    #[serial]
    fn test_resolves_device_from_env() {
        clear_device_env(7);
        unsafe {
            std::env::set_var("DEVICE7_NAME", "Living Room STB");
            std::env::set_var("DEVICE7_MODEL", "stb-x1");
            std::env::set_var("DEVICE7_VIDEO_CAPTURE_PATH", "/data/capture7");
            std::env::set_var("DEVICE7_VIDEO_STREAM_PATH", "/stream/capture7");
        }

        let info = get_device_info_from_capture_folder("capture7").unwrap();
        assert_eq!(info.device_id, "device7");
        assert_eq!(info.device_name, "Living Room STB");
        assert_eq!(info.device_model.as_deref(), Some("stb-x1"));
        assert_eq!(info.capture_path, PathBuf::from("/data/capture7"));

        clear_device_env(7);
    }

    #[test]
    #[serial]
    fn test_missing_env_is_an_error() {
        clear_device_env(99);
        let result = get_device_info_from_capture_folder("capture99");
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_capture_folder_is_an_error() {
        let result = get_device_info_from_capture_folder("not-a-capture-folder");
        assert!(result.is_err());
    }
}
