//! Zap detection and recording (spec.md §4.7): turns a blackscreen ->
//! content transition into banner recognition, evidence upload, a sidecar
//! truth write, a `last_zapping.json` snapshot, and a DB record.

use super::banner::BannerAi;
use super::store::{ZapIterationRecord, ZapResultStore};
use super::types::{
    ChannelInfo, DetectionType, LastZappingSnapshot, TransitionImagePaths, TransitionImageUrls, TransitionImages, ZapActionInfo,
    ZapOutcome,
};
use crate::error::Result;
use crate::monitor::ZapTrigger;
use crate::objectstore::{ObjectStore, try_upload_file};
use crate::sidecar::{ZapFields, with_locked_sidecar};
use crate::storage::{FileClass, get_cold_storage_path, get_thumbnail_path_from_capture};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Static identity of the device/host a zap is being recorded for.
#[derive(Debug, Clone)]
pub struct ZapContext {
    /// Logical device id, e.g. `device1` or `host`.
    pub device_id: String,
    /// Human-readable device name.
    pub device_name: String,
    /// Device model, recorded downstream as `userinterface_name`.
    pub device_model: String,
    /// Reporting host name.
    pub host_name: String,
    /// The device's storage root (hot or SD tree root).
    pub device_root: PathBuf,
    /// The device's `metadata/` directory.
    pub metadata_dir: PathBuf,
}

/// Everything specific to one candidate zap event.
#[derive(Debug, Clone)]
pub struct ZapInput {
    /// The frame that completed the blackscreen -> content transition.
    pub after_frame: PathBuf,
    /// Measured blackscreen duration bounding the transition.
    pub blackscreen_duration_ms: u64,
    /// The action that explains this zap, if one was on file and fresh.
    pub action_info: Option<ZapActionInfo>,
    /// Audio silence duration observed during the transition, if measured.
    pub audio_silence_duration_ms: Option<u64>,
    /// Whichever transition-image paths the caller already has on hand.
    pub transition_images: TransitionImages,
}

impl ZapInput {
    /// Builds a [`ZapInput`] from the monitor's [`ZapTrigger`] hand-off.
    #[must_use]
    pub fn from_monitor_trigger(trigger: &ZapTrigger) -> Self {
        let action_info = match (&trigger.action_command, trigger.action_timestamp) {
            (Some(command), Some(timestamp)) => Some(ZapActionInfo {
                command: command.clone(),
                params: trigger.action_params.clone().unwrap_or(serde_json::Value::Null),
                timestamp,
            }),
            _ => None,
        };
        Self {
            after_frame: trigger.after_frame.clone(),
            blackscreen_duration_ms: trigger.blackscreen_duration_ms,
            action_info,
            audio_silence_duration_ms: None,
            transition_images: TransitionImages {
                before: trigger.before_frame.clone(),
                ..Default::default()
            },
        }
    }
}

/// Collaborators the zapping detector needs.
pub struct ZappingDeps {
    /// Channel-banner recognition backend.
    pub banner: Arc<dyn BannerAi>,
    /// Object store for evidence upload (shared with the monitor's
    /// freeze-evidence uploader).
    pub object_store: Arc<dyn ObjectStore>,
    /// `zap_results` DB collaborator.
    pub store: Arc<dyn ZapResultStore>,
    /// Team id recorded for manual zaps, where no request supplied one.
    pub default_team_id: Uuid,
}

/// Runs the full zapping pipeline for one candidate transition.
///
/// Returns `zapping_detected: false` without touching the sidecar, the
/// snapshot, or the DB when no channel banner is recognized on the frame:
/// per spec.md §4.7, an unexplained blackscreen->content transition with
/// no banner is just a blackscreen, not a channel change.
pub fn detect_and_record_zapping(ctx: &ZapContext, input: &ZapInput, deps: &ZappingDeps) -> Result<ZapOutcome> {
    let banner = deps.banner.detect_banner(&input.after_frame)?;
    if !banner.banner_detected {
        return Ok(ZapOutcome {
            success: true,
            zapping_detected: false,
            zap_id: None,
        });
    }
    let channel_info = banner.channel_info.unwrap_or_default();

    let (image_paths, r2_images) = capture_and_upload_evidence(ctx, input, deps)?;

    let frame_timestamp = frame_mtime_as_utc(&input.after_frame)?;
    let zap_id = make_zap_id(&input.after_frame, frame_timestamp);

    let detection_type = if input.action_info.is_some() {
        DetectionType::Automatic
    } else {
        DetectionType::Manual
    };

    let time_since_action_ms = input
        .action_info
        .as_ref()
        .map(|action| (frame_timestamp - action.timestamp).num_milliseconds());
    let total_zap_duration_ms =
        time_since_action_ms.map(|ms| ms + i64::try_from(input.blackscreen_duration_ms).unwrap_or(i64::MAX));

    write_zap_sidecar(
        &input.after_frame,
        &zap_id,
        frame_timestamp,
        &channel_info,
        input.blackscreen_duration_ms,
        detection_type,
        input.audio_silence_duration_ms,
    )?;

    write_last_zapping_snapshot(
        &ctx.metadata_dir,
        &zap_id,
        &channel_info,
        detection_type,
        input,
        time_since_action_ms,
        total_zap_duration_ms,
        &image_paths,
        &r2_images,
    )?;

    record_db_row(ctx, input, deps, &channel_info, detection_type, frame_timestamp, time_since_action_ms, total_zap_duration_ms)?;

    Ok(ZapOutcome {
        success: true,
        zapping_detected: true,
        zap_id: Some(zap_id),
    })
}

fn capture_and_upload_evidence(
    ctx: &ZapContext,
    input: &ZapInput,
    deps: &ZappingDeps,
) -> Result<(TransitionImagePaths, TransitionImageUrls)> {
    let mut images = input.transition_images.clone();
    images.after = Some(input.after_frame.clone());

    let mut paths = TransitionImagePaths::default();
    let mut urls = TransitionImageUrls::default();

    if let Some(after) = &images.after {
        let cold = preserve_frame_to_cold_storage(&ctx.device_root, after)?;
        urls.after_url = upload_frame(deps.object_store.as_ref(), &ctx.device_id, "after", &cold);
        paths.after = Some(cold);
    }
    if let Some(before) = &images.before {
        let cold = preserve_frame_to_cold_storage(&ctx.device_root, before)?;
        urls.before_url = upload_frame(deps.object_store.as_ref(), &ctx.device_id, "before", &cold);
        paths.before = Some(cold);
    }
    if let Some(first) = &images.first_blackscreen {
        let cold = preserve_frame_to_cold_storage(&ctx.device_root, first)?;
        urls.first_blackscreen_url = upload_frame(deps.object_store.as_ref(), &ctx.device_id, "first_blackscreen", &cold);
        paths.first_blackscreen = Some(cold);
    }
    if let Some(last) = &images.last_blackscreen {
        let cold = preserve_frame_to_cold_storage(&ctx.device_root, last)?;
        urls.last_blackscreen_url = upload_frame(deps.object_store.as_ref(), &ctx.device_id, "last_blackscreen", &cold);
        paths.last_blackscreen = Some(cold);
    }

    Ok((paths, urls))
}

/// Copies a frame (and its thumbnail, best-effort) into cold storage so
/// evidence survives hot-root eviction, returning the cold path.
fn preserve_frame_to_cold_storage(device_root: &Path, frame: &Path) -> Result<PathBuf> {
    let Some(name) = frame.file_name() else {
        return Ok(frame.to_path_buf());
    };
    let cold_dir = get_cold_storage_path(device_root, FileClass::Captures);
    let cold_path = cold_dir.join(name);
    if frame.is_file() {
        crate::storage::copy_to_cold_storage(frame, &cold_path)?;

        let thumb_src = get_thumbnail_path_from_capture(frame);
        if thumb_src.is_file() {
            let thumb_cold_dir = get_cold_storage_path(device_root, FileClass::Thumbnails);
            if let Some(thumb_name) = thumb_src.file_name() {
                let _ = crate::storage::copy_to_cold_storage(&thumb_src, &thumb_cold_dir.join(thumb_name));
            }
        }
    }
    Ok(cold_path)
}

fn upload_frame(store: &dyn ObjectStore, device_id: &str, role: &str, path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let key = format!("zapping/{device_id}/{role}_{name}");
    try_upload_file(store, path, &key, "image/jpeg")
}

fn frame_mtime_as_utc(path: &Path) -> Result<DateTime<Utc>> {
    if let Ok(metadata) = std::fs::metadata(path) {
        if let Ok(modified) = metadata.modified() {
            return Ok(DateTime::<Utc>::from(modified));
        }
    }
    Ok(Utc::now())
}

fn make_zap_id(frame: &Path, timestamp: DateTime<Utc>) -> String {
    let seq = frame
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("capture_"))
        .unwrap_or("0");
    format!("zap_{seq}_{}", timestamp.timestamp())
}

#[allow(clippy::too_many_arguments)]
fn write_zap_sidecar(
    after_frame: &Path,
    zap_id: &str,
    detected_at: DateTime<Utc>,
    channel_info: &ChannelInfo,
    blackscreen_duration_ms: u64,
    detection_type: DetectionType,
    audio_silence_duration_ms: Option<u64>,
) -> Result<()> {
    let sidecar_path = after_frame.with_extension("json");
    with_locked_sidecar(&sidecar_path, |current| {
        let mut sidecar = current.ok_or_else(|| crate::error::Error::Internal {
            message: format!("sidecar disappeared: {}", sidecar_path.display()),
        })?;
        sidecar.zap = Some(ZapFields {
            detected: true,
            id: zap_id.to_string(),
            detected_at,
            channel_name: channel_info.channel_name.clone(),
            channel_number: channel_info.channel_number.clone(),
            program_name: channel_info.program_name.clone(),
            program_start_time: channel_info.program_start_time,
            program_end_time: channel_info.program_end_time,
            confidence: channel_info.confidence,
            blackscreen_duration_ms,
            detection_type: detection_type.to_string(),
            audio_silence_duration_ms,
        });
        Ok(sidecar)
    })
}

#[allow(clippy::too_many_arguments)]
fn write_last_zapping_snapshot(
    metadata_dir: &Path,
    zap_id: &str,
    channel_info: &ChannelInfo,
    detection_type: DetectionType,
    input: &ZapInput,
    time_since_action_ms: Option<i64>,
    total_zap_duration_ms: Option<i64>,
    image_paths: &TransitionImagePaths,
    r2_images: &TransitionImageUrls,
) -> Result<()> {
    std::fs::create_dir_all(metadata_dir)?;
    let snapshot = LastZappingSnapshot {
        status: "completed".to_string(),
        zap_id: zap_id.to_string(),
        channel_info: channel_info.clone(),
        detection_type,
        action_command: input.action_info.as_ref().map(|a| a.command.clone()),
        action_params: input.action_info.as_ref().map(|a| a.params.clone()),
        time_since_action_ms,
        total_zap_duration_ms,
        blackscreen_duration_ms: input.blackscreen_duration_ms,
        audio_silence_duration_ms: input.audio_silence_duration_ms,
        transition_images: image_paths.clone(),
        r2_images: r2_images.clone(),
        detected_at: Utc::now(),
    };

    let json = serde_json::to_string_pretty(&snapshot).map_err(|source| crate::error::Error::SidecarParse {
        path: metadata_dir.join("last_zapping.json"),
        source,
    })?;
    let target = metadata_dir.join("last_zapping.json");
    let tmp = metadata_dir.join("last_zapping.json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &target)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn record_db_row(
    ctx: &ZapContext,
    input: &ZapInput,
    deps: &ZappingDeps,
    channel_info: &ChannelInfo,
    detection_type: DetectionType,
    frame_timestamp: DateTime<Utc>,
    time_since_action_ms: Option<i64>,
    total_zap_duration_ms: Option<i64>,
) -> Result<()> {
    let started_at = input
        .action_info
        .as_ref()
        .map_or_else(|| frame_timestamp - chrono::Duration::milliseconds(1), |a| a.timestamp);

    let record = ZapIterationRecord {
        team_id: deps.default_team_id,
        host_name: ctx.host_name.clone(),
        device_name: ctx.device_name.clone(),
        userinterface_name: ctx.device_model.clone(),
        action_command: input.action_info.as_ref().map(|a| a.command.clone()),
        started_at,
        completed_at: frame_timestamp,
        duration_seconds: input.blackscreen_duration_ms as f64 / 1000.0,
        blackscreen_freeze_detected: true,
        detection_method: "frame_monitor_transition".to_string(),
        channel_info: channel_info.clone(),
        audio_silence_duration_ms: input.audio_silence_duration_ms,
        action_params: input.action_info.as_ref().map(|a| a.params.clone()),
        time_since_action_ms,
        total_zap_duration_ms,
    };
    deps.store.record_zap_iteration(&record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objectstore::NullObjectStore;
    use crate::zapping::banner::FakeBannerAi;
    use crate::zapping::store::NullZapResultStore;
    use crate::zapping::types::BannerDetection;

    fn write_jpeg(path: &Path) {
        let img = image::GrayImage::from_pixel(16, 16, image::Luma([200]));
        image::DynamicImage::ImageLuma8(img).save(path).unwrap();
    }

    fn test_ctx(root: &Path) -> ZapContext {
        ZapContext {
            device_id: "device1".to_string(),
            device_name: "Living Room".to_string(),
            device_model: "desktop".to_string(),
            host_name: "host1".to_string(),
            device_root: root.to_path_buf(),
            metadata_dir: root.join("metadata"),
        }
    }

    fn test_deps(banner_detected: bool) -> ZappingDeps {
        ZappingDeps {
            banner: Arc::new(FakeBannerAi {
                detection: BannerDetection {
                    banner_detected,
                    channel_info: banner_detected.then(|| ChannelInfo {
                        channel_name: Some("Channel 4".to_string()),
                        confidence: 0.9,
                        ..Default::default()
                    }),
                },
            }),
            object_store: Arc::new(NullObjectStore),
            store: Arc::new(NullZapResultStore),
            default_team_id: Uuid::nil(),
        }
    }

    #[test]
    fn test_no_banner_is_not_zapping() {
        let dir = tempfile::tempdir().unwrap();
        let captures_dir = dir.path().join("captures");
        std::fs::create_dir_all(&captures_dir).unwrap();
        let frame = captures_dir.join("capture_000000010.jpg");
        write_jpeg(&frame);

        let ctx = test_ctx(dir.path());
        let deps = test_deps(false);
        let input = ZapInput {
            after_frame: frame,
            blackscreen_duration_ms: 900,
            action_info: None,
            audio_silence_duration_ms: None,
            transition_images: TransitionImages::default(),
        };

        let outcome = detect_and_record_zapping(&ctx, &input, &deps).unwrap();
        assert!(!outcome.zapping_detected);
        assert!(outcome.zap_id.is_none());
        assert!(!ctx.metadata_dir.join("last_zapping.json").exists());
    }

    #[test]
    fn test_banner_detected_writes_sidecar_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let captures_dir = dir.path().join("captures");
        std::fs::create_dir_all(&captures_dir).unwrap();
        let frame = captures_dir.join("capture_000000011.jpg");
        write_jpeg(&frame);

        let sidecar_path = frame.with_extension("json");
        let sidecar = crate::sidecar::FrameSidecar::analyzed_with_error("placeholder", Utc::now());
        crate::sidecar::write_sidecar_atomic(&sidecar_path, &sidecar).unwrap();

        let ctx = test_ctx(dir.path());
        let deps = test_deps(true);
        let input = ZapInput {
            after_frame: frame,
            blackscreen_duration_ms: 900,
            action_info: None,
            audio_silence_duration_ms: None,
            transition_images: TransitionImages::default(),
        };

        let outcome = detect_and_record_zapping(&ctx, &input, &deps).unwrap();
        assert!(outcome.zapping_detected);
        assert!(outcome.zap_id.as_deref().unwrap().starts_with("zap_000000011_"));

        let loaded = crate::sidecar::read_sidecar(&sidecar_path).unwrap().unwrap();
        let zap = loaded.zap.unwrap();
        assert!(zap.detected);
        assert_eq!(zap.detection_type, "manual");

        assert!(ctx.metadata_dir.join("last_zapping.json").exists());
        assert!(ctx.device_root.join("captures").join("capture_000000011.jpg").exists());
    }

    #[test]
    fn test_automatic_zap_computes_total_duration() {
        let dir = tempfile::tempdir().unwrap();
        let captures_dir = dir.path().join("captures");
        std::fs::create_dir_all(&captures_dir).unwrap();
        let frame = captures_dir.join("capture_000000012.jpg");
        write_jpeg(&frame);

        let sidecar_path = frame.with_extension("json");
        let frame_timestamp = frame_mtime_as_utc(&frame).unwrap();
        let sidecar = crate::sidecar::FrameSidecar::analyzed_with_error("placeholder", frame_timestamp);
        crate::sidecar::write_sidecar_atomic(&sidecar_path, &sidecar).unwrap();

        let ctx = test_ctx(dir.path());
        let deps = test_deps(true);
        let input = ZapInput {
            after_frame: frame,
            blackscreen_duration_ms: 500,
            action_info: Some(ZapActionInfo {
                command: "live_chup".to_string(),
                params: serde_json::json!({}),
                timestamp: frame_timestamp - chrono::Duration::milliseconds(300),
            }),
            audio_silence_duration_ms: Some(200),
            transition_images: TransitionImages::default(),
        };

        let outcome = detect_and_record_zapping(&ctx, &input, &deps).unwrap();
        assert!(outcome.zapping_detected);

        let contents = std::fs::read_to_string(ctx.metadata_dir.join("last_zapping.json")).unwrap();
        let snapshot: LastZappingSnapshot = serde_json::from_str(&contents).unwrap();
        assert_eq!(snapshot.detection_type, DetectionType::Automatic);
        assert_eq!(snapshot.total_zap_duration_ms, Some(300 + 500));
    }
}
