//! Application-wide constants.
//!
//! All magic numbers and strings called out in the spec are defined here so
//! they stay consistent across services and easy to retune.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "hostpipe";

/// Shared config file listing active capture directories, one per line.
pub const ACTIVE_CAPTURES_CONF: &str = "/tmp/active_captures.conf";

/// Nominal capture frame rate (frames per second).
pub const NOMINAL_FPS: f64 = 5.0;

/// Lock file suffix for sidecar read-modify-write sections.
pub const LOCK_FILE_EXTENSION: &str = ".lock";

/// Detector thresholds and incident debounce.
pub mod detector {
    /// Pixel value at or below which a sampled pixel counts as "dark".
    pub const BLACKSCREEN_PIXEL_THRESHOLD: u8 = 10;
    /// Dark-pixel percentage above which a frame is blackscreen (desktop models).
    pub const BLACKSCREEN_PERCENT_DESKTOP: f64 = 85.0;
    /// Dark-pixel percentage above which a frame is blackscreen (mobile models, tolerates overlays).
    pub const BLACKSCREEN_PERCENT_MOBILE: f64 = 70.0;
    /// Lower bound of the coarse-vs-full-scan ambiguity band.
    pub const BLACKSCREEN_AMBIGUOUS_LOW: f64 = 70.0;
    /// Upper bound of the coarse-vs-full-scan ambiguity band.
    pub const BLACKSCREEN_AMBIGUOUS_HIGH: f64 = 90.0;
    /// Vertical region start (fraction of frame height) sampled for blackscreen.
    pub const BLACKSCREEN_REGION_TOP: f64 = 0.05;
    /// Vertical region end (fraction of frame height) sampled for blackscreen.
    pub const BLACKSCREEN_REGION_BOTTOM: f64 = 0.70;
    /// Stride used for the coarse blackscreen sample pass.
    pub const BLACKSCREEN_COARSE_STRIDE: u32 = 3;

    /// Number of previous frames compared against for freeze detection.
    pub const FREEZE_COMPARISON_FRAMES: usize = 3;
    /// Downsample stride for the freeze pairwise absolute-difference.
    pub const FREEZE_SAMPLE_STRIDE: u32 = 10;
    /// Mean-diff below this value is considered frozen.
    pub const FREEZE_DIFF_THRESHOLD: f64 = 0.2;
    /// Maximum pairwise comparisons per freeze batch (early-stop safety cap).
    pub const FREEZE_MAX_COMPARISONS: usize = 50;

    /// Macroblock artifact-pixel sample stride.
    pub const MACROBLOCK_SAMPLE_STRIDE: u32 = 10;
    /// Artifact-pixel percentage above which macroblocking is suspected.
    pub const MACROBLOCK_ARTIFACT_PERCENT: f64 = 8.0;
    /// Laplacian-variance (blur) threshold below which the frame looks blocky.
    pub const MACROBLOCK_BLUR_VARIANCE: f64 = 30.0;

    /// Mean volume (dB) at or below which audio is considered silent.
    pub const AUDIO_SILENCE_DB: f64 = -50.0;
}

/// Incident manager debounce and retention.
pub mod incident {
    use std::time::Duration;

    /// Continuous-detection duration required before a pending incident becomes active.
    pub const REPORT_DELAY: Duration = Duration::from_secs(300);
    /// Staleness window used to evict registry hosts (also reused for stale lock heuristics).
    pub const HOST_STALE_AFTER: Duration = Duration::from_secs(120);
}

/// Hot/cold archiver limits and retention.
pub mod archiver {
    use std::time::Duration;

    /// Cycle interval between archival passes.
    pub const CYCLE_INTERVAL: Duration = Duration::from_secs(300);
    /// Hot-root overflow limit for segments before archiving to cold storage.
    pub const HOT_LIMIT_SEGMENTS: usize = 10;
    /// Hot-root overflow limit for captures/thumbnails/metadata.
    pub const HOT_LIMIT_OTHER: usize = 100;
    /// Retention horizon (hours) for the `captures` class.
    pub const RETENTION_HOURS_CAPTURES: u32 = 1;
    /// Retention horizon (hours) for all other classes.
    pub const RETENTION_HOURS_OTHER: u32 = 24;
    /// HLS `#EXT-X-TARGETDURATION` value.
    pub const HLS_TARGET_DURATION: u32 = 4;
    /// HLS per-segment `#EXTINF` duration, formatted to six decimal places.
    pub const HLS_SEGMENT_DURATION: f64 = 1.0;
    /// Directory mode applied to newly created hour buckets.
    #[cfg(unix)]
    pub const HOUR_DIR_MODE: u32 = 0o777;
}

/// KPI executor constants.
pub mod kpi {
    use std::time::Duration;

    /// Directory watched for incoming `kpi_request_*.json` files.
    pub const QUEUE_DIR: &str = "/tmp/kpi_queue";
    /// Root directory for per-request RAM working dirs.
    pub const WORKING_ROOT: &str = "/tmp/kpi_working";
    /// Bounded request queue depth.
    pub const QUEUE_CAPACITY: usize = 100;
    /// Idle heartbeat interval for the worker thread.
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);
    /// Offset of the early probe frame from the scan window start.
    pub const EARLY_PROBE_OFFSET: Duration = Duration::from_millis(200);
    /// Step size (in frame indices) for the backward scan.
    pub const BACKWARD_SCAN_STEP: usize = 2;
    /// Fallback window length when waiting without a verification timestamp (long wait case).
    pub const LAST_ACTION_WAIT_THRESHOLD: Duration = Duration::from_millis(60_000);
    /// Window length sampled from the tail of a long wait.
    pub const LONG_WAIT_TAIL_WINDOW: Duration = Duration::from_secs(20);
    /// Hard cap enforced by the wait loops for a single image verification.
    pub const MAX_VERIFICATION_WAIT: Duration = Duration::from_secs(30);
}

/// Transcript accumulator constants.
pub mod transcript {
    use std::time::Duration;

    /// Number of 1-minute slots per 10-minute chunk.
    pub const SLOTS_PER_CHUNK: u32 = 10;
    /// Number of 10-minute chunks per hour.
    pub const CHUNKS_PER_HOUR: u32 = 6;
    /// LIFO real-time queue capacity.
    pub const INOTIFY_QUEUE_CAPACITY: usize = 500;
    /// FIFO backlog queue capacity.
    pub const SCAN_QUEUE_CAPACITY: usize = 10;
    /// Idle heartbeat interval for the Whisper worker.
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
    /// Audio detector loop period, per device.
    pub const AUDIO_DETECT_INTERVAL: Duration = Duration::from_secs(5);
    /// Minimum transcript length (chars) that triggers translation + dubbing.
    pub const TRANSLATE_MIN_CHARS: usize = 20;
    /// Number of BLAS/OpenMP threads allotted to the inference backend.
    pub const INFERENCE_THREAD_CAP: usize = 2;
    /// Whisper model used for the low-latency 1-minute path.
    pub const WHISPER_MODEL: &str = "tiny";
    /// Target languages for pre-translation and dubbing (source language is skipped).
    pub const TARGET_LANGUAGES: [&str; 5] = ["fr", "en", "es", "de", "it"];
}

/// Zapping detector constants.
pub mod zapping {
    use std::time::Duration;

    /// Window within which `last_action.json` is considered fresh enough to label a zap automatic.
    pub const ACTION_FRESHNESS_WINDOW: Duration = Duration::from_secs(10);
}

/// Freshness windows used when stamping cross-cutting facts into sidecars.
pub mod sidecar {
    use std::time::Duration;

    /// A sidecar is "fresh" for audio-cache stamping if younger than this.
    pub const AUDIO_CACHE_FRESHNESS: Duration = Duration::from_secs(2);
    /// Window within which `write_action_to_frame_json` will match a sidecar to an action.
    pub const ACTION_MATCH_WINDOW_MS: i64 = 1500;
    /// Number of most-recent sidecars scanned when looking for an action/audio match.
    pub const RECENT_SIDECAR_SCAN_COUNT: usize = 5;
}
