//! The frame monitor event loop: attaches a watch per capture directory,
//! reacts to `IN_MOVED_TO`-equivalent events on new capture frames, and
//! drives detection, the incident pipeline, sidecar writes, and the
//! zapping hook.

use super::audio_cache::{AudioCache, AudioSample};
use super::detect::{DetectionResult, DeviceModel, detect_issues};
use super::evidence::EvidenceCache;
use crate::action::read_last_action;
use crate::config::Tunables;
use crate::constants::sidecar::AUDIO_CACHE_FRESHNESS;
use crate::constants::zapping::ACTION_FRESHNESS_WINDOW;
use crate::error::Result;
use crate::incident::{DetectionFlags, IncidentKind, IncidentManager, IncidentMetadata, Transition};
use crate::objectstore::ObjectStore;
use crate::sidecar::{FrameSidecar, read_sidecar, with_locked_sidecar, write_sidecar_atomic};
use crate::storage::{
    DeviceInfo, FileClass, StorageLayout, get_capture_base_directories, get_device_info_from_capture_folder,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::RenameMode};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the zapping detector needs to analyze a
/// blackscreen -> non-blackscreen transition, handed off by the monitor.
#[derive(Debug, Clone)]
pub struct ZapTrigger {
    /// The frame that completed the transition (the "after" candidate).
    pub after_frame: PathBuf,
    /// The last frame observed before blackscreen began, if any.
    pub before_frame: Option<PathBuf>,
    /// Whether `last_action.json` was fresh enough to call this automatic.
    pub automatic: bool,
    /// The action command, when automatic.
    pub action_command: Option<String>,
    /// The action parameters, when automatic.
    pub action_params: Option<serde_json::Value>,
    /// The action completion timestamp, when automatic.
    pub action_timestamp: Option<DateTime<Utc>>,
    /// Measured blackscreen duration bounding the transition.
    pub blackscreen_duration_ms: u64,
}

/// Outcome of processing one newly-arrived frame.
#[derive(Debug, Default)]
pub struct FrameProcessingOutcome {
    /// Incident transitions fired by this frame's detection result.
    pub transitions: HashMap<IncidentKind, Transition>,
    /// Present when this frame completed a blackscreen -> non-blackscreen
    /// transition, for the caller to hand to the zapping detector.
    pub zap_trigger: Option<ZapTrigger>,
}

#[derive(Debug, Default)]
struct DeviceTransitionState {
    blackscreen: bool,
    blackscreen_since: Option<DateTime<Utc>>,
    last_non_blackscreen_frame: Option<PathBuf>,
}

/// Tracks each device's last-known blackscreen state so the monitor can
/// detect the transition that triggers zapping analysis.
#[derive(Debug, Default)]
struct TransitionTracker {
    devices: DashMap<String, DeviceTransitionState>,
}

impl TransitionTracker {
    /// Records the current frame's blackscreen flag, returning
    /// `(was_blackscreen, before_frame, blackscreen_duration_ms)`.
    fn observe(
        &self,
        device_id: &str,
        is_blackscreen: bool,
        frame_path: &Path,
        now: DateTime<Utc>,
    ) -> (bool, Option<PathBuf>, u64) {
        let mut entry = self.devices.entry(device_id.to_string()).or_default();
        let was_blackscreen = entry.blackscreen;
        let before_frame = entry.last_non_blackscreen_frame.clone();
        let duration_ms = entry
            .blackscreen_since
            .map(|since| (now - since).num_milliseconds().max(0) as u64)
            .unwrap_or_default();

        if is_blackscreen {
            if entry.blackscreen_since.is_none() {
                entry.blackscreen_since = Some(now);
            }
        } else {
            entry.blackscreen_since = None;
            entry.last_non_blackscreen_frame = Some(frame_path.to_path_buf());
        }
        entry.blackscreen = is_blackscreen;

        (was_blackscreen, before_frame, duration_ms)
    }
}

/// Shared state for one host's frame monitor, covering every device it
/// watches.
pub struct FrameMonitor {
    incident_manager: Arc<IncidentManager>,
    audio_cache: AudioCache,
    evidence_cache: EvidenceCache,
    transitions: TransitionTracker,
    object_store: Arc<dyn ObjectStore>,
    tunables: Tunables,
}

impl FrameMonitor {
    /// Builds a monitor backed by the given incident manager and object
    /// store.
    #[must_use]
    pub fn new(incident_manager: Arc<IncidentManager>, object_store: Arc<dyn ObjectStore>, tunables: Tunables) -> Self {
        Self {
            incident_manager,
            audio_cache: AudioCache::new(),
            evidence_cache: EvidenceCache::new(),
            transitions: TransitionTracker::default(),
            object_store,
            tunables,
        }
    }

    /// Exposes the audio cache so the audio detector worker (§4.6.4) can
    /// stamp new samples that this monitor then propagates into sidecars.
    #[must_use]
    pub fn audio_cache(&self) -> &AudioCache {
        &self.audio_cache
    }

    /// Processes one newly-arrived capture frame. Returns `Ok(None)` when
    /// the frame already has a sidecar (idempotent skip) or when the
    /// detector failed (a minimal error sidecar is still written so the
    /// frame is not retried).
    #[allow(clippy::too_many_arguments)]
    pub fn process_frame(
        &self,
        device_id: &str,
        is_host_device: bool,
        device_model: DeviceModel,
        captures_dir: &Path,
        metadata_dir: &Path,
        frame_path: &Path,
        metadata_base: &IncidentMetadata,
    ) -> Result<Option<FrameProcessingOutcome>> {
        let sidecar_path = frame_path.with_extension("json");
        if sidecar_path.exists() {
            return Ok(None);
        }

        let timestamp = frame_mtime_as_utc(frame_path)?;
        let previous_frames = list_previous_frames(captures_dir, frame_path, 3)?;

        let mut detection = match detect_issues(frame_path, &previous_frames, device_model, &self.tunables) {
            Ok(detection) => detection,
            Err(e) => {
                warn!(frame = %frame_path.display(), error = %e, "detector failed");
                let sidecar = FrameSidecar::analyzed_with_error(e.to_string(), timestamp);
                write_sidecar_atomic(&sidecar_path, &sidecar)?;
                return Ok(None);
            }
        };

        if detection.freeze {
            let (filenames, thumbnails) = evidence_candidates(&previous_frames);
            detection.last_3_filenames = filenames;
            detection.last_3_thumbnails = thumbnails;
        }

        let audio_sample = self.audio_cache.latest(device_id);
        let sidecar = FrameSidecar {
            analyzed: true,
            error: None,
            blackscreen: detection.blackscreen,
            blackscreen_percentage: detection.blackscreen_percentage,
            freeze: detection.freeze,
            freeze_diffs: detection.freeze_diffs.clone(),
            audio: audio_sample.as_ref().map(|s| s.audio),
            mean_volume_db: audio_sample.as_ref().map(|s| s.mean_volume_db),
            audio_check_timestamp: audio_sample.as_ref().map(|s| s.measured_at),
            audio_segment_file: audio_sample.as_ref().map(|s| s.segment_file.clone()),
            macroblocks: detection.macroblocks,
            quality_score: detection.quality_score,
            timestamp,
            last_action_executed: None,
            last_action_timestamp: None,
            action_params: None,
            action_to_frame_delay_ms: None,
            zap: None,
        };

        let mut metadata = metadata_base.clone();
        metadata.blackscreen_percentage = Some(detection.blackscreen_percentage);
        metadata.freeze_diffs.clone_from(&detection.freeze_diffs);
        metadata.mean_volume_db = sidecar.mean_volume_db;
        metadata.quality_score = detection.quality_score;

        if detection.freeze {
            self.evidence_cache
                .upload_freeze_evidence(self.object_store.as_ref(), device_id, captures_dir, &detection, &mut metadata);
        } else {
            self.evidence_cache.clear(device_id);
        }

        let flags = DetectionFlags {
            blackscreen: detection.blackscreen,
            freeze: detection.freeze,
            audio_present: audio_sample.as_ref().is_none_or(|s| s.audio),
        };
        let transitions =
            self.incident_manager
                .process_detection(device_id, is_host_device, &flags, &metadata, Utc::now())?;

        write_sidecar_atomic(&sidecar_path, &sidecar)?;

        let (was_blackscreen, before_frame, blackscreen_duration_ms) =
            self.transitions.observe(device_id, detection.blackscreen, frame_path, timestamp);

        let zap_trigger = if was_blackscreen && !detection.blackscreen {
            Some(self.build_zap_trigger(metadata_dir, frame_path, before_frame, timestamp, blackscreen_duration_ms)?)
        } else {
            None
        };

        Ok(Some(FrameProcessingOutcome { transitions, zap_trigger }))
    }

    /// Records one audio sample for `device_id` (spec.md §4.6.4): updates
    /// the shared audio cache, merges the sample into the most recent
    /// fresh sidecar (retrying briefly since a frame may be mid-write),
    /// and runs the incident pipeline for `audio_loss`, reusing whatever
    /// blackscreen/freeze state that sidecar already carries so this call
    /// never clobbers the monitor's own transitions. Runs the same
    /// evidence-upload-and-cache protocol as freeze on first detection.
    pub fn record_audio_sample(
        &self,
        device_id: &str,
        captures_dir: &Path,
        sample: AudioSample,
        metadata_base: &IncidentMetadata,
    ) -> Result<HashMap<IncidentKind, Transition>> {
        self.audio_cache.update(device_id, sample.clone());

        let now = Utc::now();
        let fresh_sidecar = find_fresh_sidecar_with_retry(captures_dir, now)?;

        let mut prior_blackscreen = false;
        let mut prior_freeze = false;
        if let Some(path) = &fresh_sidecar {
            if let Some(existing) = read_sidecar(path)? {
                prior_blackscreen = existing.blackscreen;
                prior_freeze = existing.freeze;
            }
            with_locked_sidecar(path, |current| {
                let mut sidecar = current.ok_or_else(|| crate::error::Error::Internal {
                    message: format!("sidecar disappeared: {}", path.display()),
                })?;
                sidecar.audio = Some(sample.audio);
                sidecar.mean_volume_db = Some(sample.mean_volume_db);
                sidecar.audio_check_timestamp = Some(sample.measured_at);
                sidecar.audio_segment_file = Some(sample.segment_file.clone());
                Ok(sidecar)
            })?;
        }

        let mut metadata = metadata_base.clone();
        metadata.mean_volume_db = Some(sample.mean_volume_db);

        let flags = DetectionFlags {
            blackscreen: prior_blackscreen,
            freeze: prior_freeze,
            audio_present: sample.audio,
        };
        let transitions = self
            .incident_manager
            .process_detection(device_id, false, &flags, &metadata, now)?;

        match transitions.get(&IncidentKind::AudioLoss) {
            Some(Transition::FirstDetected) => {
                let segment_path = captures_dir
                    .parent()
                    .map_or_else(|| PathBuf::from(&sample.segment_file), |root| root.join("segments").join(&sample.segment_file));
                self.evidence_cache
                    .upload_audio_loss_evidence(self.object_store.as_ref(), device_id, &segment_path, &mut metadata);
            }
            Some(Transition::Cleared) => self.evidence_cache.clear_audio(device_id),
            None => {}
        }

        Ok(transitions)
    }

    fn build_zap_trigger(
        &self,
        metadata_dir: &Path,
        frame_path: &Path,
        before_frame: Option<PathBuf>,
        frame_timestamp: DateTime<Utc>,
        blackscreen_duration_ms: u64,
    ) -> Result<ZapTrigger> {
        let last_action = read_last_action(metadata_dir)?;
        let (automatic, action_command, action_params, action_timestamp) = match last_action {
            Some(action)
                if (frame_timestamp - action.timestamp).num_seconds().unsigned_abs()
                    <= ACTION_FRESHNESS_WINDOW.as_secs() =>
            {
                (true, Some(action.command), Some(action.params), Some(action.timestamp))
            }
            _ => (false, None, None, None),
        };

        Ok(ZapTrigger {
            after_frame: frame_path.to_path_buf(),
            before_frame,
            automatic,
            action_command,
            action_params,
            action_timestamp,
            blackscreen_duration_ms,
        })
    }
}

fn frame_mtime_as_utc(path: &Path) -> Result<DateTime<Utc>> {
    let mtime = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(mtime))
}

fn capture_seq(name: &str) -> Option<u64> {
    if !name.ends_with(".jpg") || name.ends_with("_thumbnail.jpg") {
        return None;
    }
    name.strip_prefix("capture_")?.strip_suffix(".jpg")?.parse().ok()
}

/// Lists up to `n` capture frames with a strictly smaller sequence number
/// than `current`, newest first.
fn list_previous_frames(captures_dir: &Path, current: &Path, n: usize) -> Result<Vec<PathBuf>> {
    let Some(current_seq) = current.file_name().and_then(|n| n.to_str()).and_then(capture_seq) else {
        return Ok(Vec::new());
    };

    let mut candidates: Vec<(u64, PathBuf)> = std::fs::read_dir(captures_dir)?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            let seq = capture_seq(name)?;
            (seq < current_seq).then_some((seq, path))
        })
        .collect();

    candidates.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    candidates.truncate(n);
    Ok(candidates.into_iter().map(|(_, path)| path).collect())
}

/// Finds the most recently written sidecar in `captures_dir` whose mtime is
/// younger than [`AUDIO_CACHE_FRESHNESS`], retrying a few times with a short
/// sleep since a frame may be about to land.
fn find_fresh_sidecar_with_retry(captures_dir: &Path, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
    const ATTEMPTS: u32 = 3;
    const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

    for attempt in 0..ATTEMPTS {
        if let Some(path) = newest_fresh_sidecar(captures_dir, now)? {
            return Ok(Some(path));
        }
        if attempt + 1 < ATTEMPTS {
            std::thread::sleep(RETRY_DELAY);
        }
    }
    Ok(None)
}

fn newest_fresh_sidecar(captures_dir: &Path, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
    if !captures_dir.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(captures_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(std::ffi::OsStr::to_str) != Some("json") {
            continue;
        }
        let mtime = entry.metadata()?.modified()?;
        if newest.as_ref().is_none_or(|(best, _)| mtime > *best) {
            newest = Some((mtime, path));
        }
    }

    match newest {
        Some((mtime, path)) => {
            let age = now - DateTime::<Utc>::from(mtime);
            if age.num_milliseconds().unsigned_abs() <= AUDIO_CACHE_FRESHNESS.as_millis() as u64 {
                Ok(Some(path))
            } else {
                Ok(None)
            }
        }
        None => Ok(None),
    }
}

fn evidence_candidates(previous_frames: &[PathBuf]) -> (Vec<String>, Vec<String>) {
    let filenames: Vec<String> = previous_frames
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    let thumbnails: Vec<String> = previous_frames
        .iter()
        .map(|p| {
            crate::storage::get_thumbnail_path_from_capture(p)
                .file_name()
                .map_or_else(String::new, |n| n.to_string_lossy().into_owned())
        })
        .collect();
    (filenames, thumbnails)
}

/// Watches every configured capture directory's `captures/` subdirectory
/// and drives [`FrameMonitor::process_frame`] for each newly-arrived full-res
/// frame, invoking `on_zap_trigger` whenever a frame completes a
/// blackscreen -> non-blackscreen transition. Deliberately skips a startup
/// scan (spec.md §4.3): only events observed after the watch attaches are
/// processed, plus an orphan-incident cleanup pass.
pub async fn run_forever(
    conf_path: PathBuf,
    fallback_root: Option<PathBuf>,
    monitor: Arc<FrameMonitor>,
    on_zap_trigger: impl Fn(String, ZapTrigger) + Send + Sync + 'static,
) -> Result<()> {
    let capture_dirs = get_capture_base_directories(&conf_path, fallback_root.as_deref())?;

    let mut monitored_devices = HashSet::new();
    let mut device_infos = HashMap::new();
    for dir in &capture_dirs {
        let Some(folder_name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match get_device_info_from_capture_folder(folder_name) {
            Ok(info) => {
                monitored_devices.insert(info.device_id.clone());
                device_infos.insert(dir.clone(), info);
            }
            Err(e) => warn!(capture_dir = %dir.display(), error = %e, "skipping unresolvable device"),
        }
    }

    let orphaned = monitor.incident_manager.cleanup_orphaned_incidents(&monitored_devices)?;
    if orphaned > 0 {
        info!(orphaned, "resolved orphaned incidents for unmonitored devices");
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watchers: Vec<RecommendedWatcher> = Vec::new();

    for dir in &capture_dirs {
        let captures_dir = resolve_captures_dir(dir);
        let tx = tx.clone();
        let mut watcher = match notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        }) {
            Ok(w) => w,
            Err(source) => {
                warn!(path = %captures_dir.display(), error = %source, "failed to create watcher");
                continue;
            }
        };

        match watcher.watch(&captures_dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                info!(path = %captures_dir.display(), "watching capture directory");
                watchers.push(watcher);
            }
            Err(source) => warn!(path = %captures_dir.display(), error = %source, "failed to watch directory"),
        }
    }

    while let Some(event) = rx.recv().await {
        let Ok(event) = event else { continue };
        if !is_move_in(&event.kind) {
            continue;
        }
        for path in event.paths {
            handle_frame_event(&monitor, &device_infos, &path, &on_zap_trigger);
        }
    }

    Ok(())
}

fn is_move_in(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Name(RenameMode::To))
    )
}

fn resolve_captures_dir(device_root: &Path) -> PathBuf {
    StorageLayout::new(device_root).resolve(FileClass::Captures)
}

fn handle_frame_event(
    monitor: &Arc<FrameMonitor>,
    device_infos: &HashMap<PathBuf, DeviceInfo>,
    path: &Path,
    on_zap_trigger: &impl Fn(String, ZapTrigger),
) {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    if capture_seq(name).is_none() {
        return;
    }

    let Some(captures_dir) = path.parent() else { return };
    let Some(device_root) = captures_dir.parent().and_then(|p| {
        if p.file_name().and_then(|n| n.to_str()) == Some("hot") {
            p.parent()
        } else {
            Some(p)
        }
    }) else {
        return;
    };
    let Some(info) = device_infos.get(device_root) else {
        return;
    };

    let metadata_dir = StorageLayout::new(device_root).resolve(FileClass::Metadata);
    let metadata_base = IncidentMetadata {
        device_name: info.device_name.clone(),
        capture_path: info.capture_path.display().to_string(),
        stream_path: info.stream_path.display().to_string(),
        ..Default::default()
    };

    let is_host_device = info.device_id == "host";
    let device_model = if info.device_model.as_deref().is_some_and(|m| m.to_lowercase().contains("mobile")) {
        DeviceModel::Mobile
    } else {
        DeviceModel::Desktop
    };

    match monitor.process_frame(&info.device_id, is_host_device, device_model, captures_dir, &metadata_dir, path, &metadata_base) {
        Ok(Some(outcome)) => {
            if let Some(trigger) = outcome.zap_trigger {
                on_zap_trigger(info.device_id.clone(), trigger);
            }
        }
        Ok(None) => {}
        Err(e) => warn!(frame = %path.display(), error = %e, "frame processing failed"),
    }
}
