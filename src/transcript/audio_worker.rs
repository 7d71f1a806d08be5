//! Audio detector worker (spec.md §4.6.4): every 5 s per device (never for
//! `host`, which has no capture audio of its own), measures the newest HLS
//! segment's volume and feeds the result into the frame monitor's audio
//! cache and incident pipeline.

use super::audio_probe::VolumeProbe;
use crate::constants::detector::AUDIO_SILENCE_DB;
use crate::constants::transcript::AUDIO_DETECT_INTERVAL;
use crate::error::Result;
use crate::incident::IncidentMetadata;
use crate::monitor::{AudioSample, FrameMonitor};
use crate::storage::{DeviceInfo, FileClass, StorageLayout};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Seconds of the newest segment sampled for volume measurement.
const PROBE_SECONDS: f64 = 0.5;

/// Runs one audio-detector loop per non-host device in `devices` (the
/// `host` sentinel has no capture audio of its own and is skipped), each on
/// its own [`AUDIO_DETECT_INTERVAL`] cadence, until cancelled.
pub async fn run_forever(devices: Vec<DeviceInfo>, monitor: Arc<FrameMonitor>, probe: Arc<dyn VolumeProbe>) -> Result<()> {
    let mut tasks = Vec::new();
    for info in devices {
        if info.device_id == "host" {
            continue;
        }
        let monitor = Arc::clone(&monitor);
        let probe = Arc::clone(&probe);
        tasks.push(tokio::spawn(run_device_loop(info, monitor, probe)));
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn run_device_loop(info: DeviceInfo, monitor: Arc<FrameMonitor>, probe: Arc<dyn VolumeProbe>) {
    let mut interval = tokio::time::interval(AUDIO_DETECT_INTERVAL);
    let layout = StorageLayout::new(&info.capture_path);
    let segments_dir = layout.resolve(FileClass::Segments);
    let captures_dir = layout.resolve(FileClass::Captures);

    let metadata_base = IncidentMetadata {
        device_name: info.device_name.clone(),
        capture_path: info.capture_path.display().to_string(),
        stream_path: info.stream_path.display().to_string(),
        ..Default::default()
    };

    loop {
        interval.tick().await;
        if let Err(e) = probe_once(&info.device_id, &segments_dir, &captures_dir, &monitor, probe.as_ref(), &metadata_base) {
            warn!(device_id = %info.device_id, error = %e, "audio detector probe failed");
        }
    }
}

fn probe_once(
    device_id: &str,
    segments_dir: &Path,
    captures_dir: &Path,
    monitor: &FrameMonitor,
    probe: &dyn VolumeProbe,
    metadata_base: &IncidentMetadata,
) -> Result<()> {
    let Some(segment) = newest_segment_file(segments_dir)? else {
        return Ok(());
    };

    let mean_volume_db = probe.mean_volume_db(&segment, PROBE_SECONDS)?;
    let has_audio = mean_volume_db > AUDIO_SILENCE_DB;

    let Some(segment_file) = segment.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(());
    };

    let sample = AudioSample {
        audio: has_audio,
        mean_volume_db,
        measured_at: Utc::now(),
        segment_file,
    };

    let transitions = monitor.record_audio_sample(device_id, captures_dir, sample, metadata_base)?;
    if !transitions.is_empty() {
        info!(device_id, ?transitions, "audio detector reported incident transitions");
    }
    Ok(())
}

/// Finds the most recently modified `segment_*.ts`/`.mp4` file directly
/// under `segments_dir` (not hour subfolders).
fn newest_segment_file(segments_dir: &Path) -> Result<Option<PathBuf>> {
    if !segments_dir.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(segments_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_segment_file(name) {
            continue;
        }
        let mtime = entry.metadata()?.modified()?;
        if newest.as_ref().is_none_or(|(best, _)| mtime > *best) {
            newest = Some((mtime, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

fn is_segment_file(name: &str) -> bool {
    name.starts_with("segment_") && (name.ends_with(".ts") || name.ends_with(".mp4"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{IncidentManager, NullAlertStore};
    use crate::objectstore::NullObjectStore;
    use crate::config::Tunables;

    fn test_monitor() -> FrameMonitor {
        let incident_manager = Arc::new(IncidentManager::new(Arc::new(NullAlertStore), "host1"));
        FrameMonitor::new(incident_manager, Arc::new(NullObjectStore), Tunables::default())
    }

    #[test]
    fn test_is_segment_file_matches_ts_and_mp4() {
        assert!(is_segment_file("segment_1.ts"));
        assert!(is_segment_file("segment_42.mp4"));
        assert!(!is_segment_file("capture_1.jpg"));
    }

    #[test]
    fn test_newest_segment_file_picks_most_recent_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("segment_1.ts");
        std::fs::write(&older, b"a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let newer = dir.path().join("segment_2.ts");
        std::fs::write(&newer, b"b").unwrap();

        let found = newest_segment_file(dir.path()).unwrap().unwrap();
        assert_eq!(found, newer);
    }

    #[test]
    fn test_probe_once_noop_when_no_segments() {
        let dir = tempfile::tempdir().unwrap();
        let segments_dir = dir.path().join("segments");
        std::fs::create_dir_all(&segments_dir).unwrap();
        let captures_dir = dir.path().join("captures");
        std::fs::create_dir_all(&captures_dir).unwrap();

        let monitor = test_monitor();
        let probe = crate::transcript::audio_probe::FakeVolumeProbe { fixed_db: -10.0 };
        let metadata = IncidentMetadata::default();

        let result = probe_once("device1", &segments_dir, &captures_dir, &monitor, &probe, &metadata);
        assert!(result.is_ok());
        assert!(monitor.audio_cache().latest("device1").is_none());
    }

    #[test]
    fn test_probe_once_stamps_audio_cache() {
        let dir = tempfile::tempdir().unwrap();
        let segments_dir = dir.path().join("segments");
        std::fs::create_dir_all(&segments_dir).unwrap();
        std::fs::write(segments_dir.join("segment_1.ts"), b"data").unwrap();
        let captures_dir = dir.path().join("captures");
        std::fs::create_dir_all(&captures_dir).unwrap();

        let monitor = test_monitor();
        let probe = crate::transcript::audio_probe::FakeVolumeProbe { fixed_db: -10.0 };
        let metadata = IncidentMetadata::default();

        probe_once("device1", &segments_dir, &captures_dir, &monitor, &probe, &metadata).unwrap();
        let sample = monitor.audio_cache().latest("device1").unwrap();
        assert!(sample.audio);
        assert_eq!(sample.segment_file, "segment_1.ts");
    }
}
