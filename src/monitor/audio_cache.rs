//! In-memory audio-sample cache, keyed by device, that lets every frame be
//! audio-annotated without per-frame audio analysis (spec.md §4.3: "Audio
//! propagation").

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// One audio sample as measured by the audio detector worker (§4.6.4).
#[derive(Debug, Clone)]
pub struct AudioSample {
    /// Whether audio was present in the sampled segment.
    pub audio: bool,
    /// Measured mean volume in dB.
    pub mean_volume_db: f64,
    /// When the sample was measured.
    pub measured_at: DateTime<Utc>,
    /// Which segment file produced the sample.
    pub segment_file: String,
}

/// Per-device cache of the most recent audio sample. The monitor stamps
/// the cached value into every subsequent sidecar until a new sample
/// replaces it.
#[derive(Debug, Default)]
pub struct AudioCache {
    samples: DashMap<String, AudioSample>,
}

impl AudioCache {
    /// Builds an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new sample for `device_id`, replacing any prior one.
    pub fn update(&self, device_id: &str, sample: AudioSample) {
        self.samples.insert(device_id.to_string(), sample);
    }

    /// Returns the most recent sample for `device_id`, if any has been
    /// recorded since process start.
    #[must_use]
    pub fn latest(&self, device_id: &str) -> Option<AudioSample> {
        self.samples.get(device_id).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_starts_empty() {
        let cache = AudioCache::new();
        assert!(cache.latest("device1").is_none());
    }

    #[test]
    fn test_update_then_latest_stamps_every_subsequent_read() {
        let cache = AudioCache::new();
        cache.update(
            "device1",
            AudioSample {
                audio: true,
                mean_volume_db: -18.0,
                measured_at: Utc::now(),
                segment_file: "segment_1.ts".to_string(),
            },
        );

        let first = cache.latest("device1").unwrap();
        let second = cache.latest("device1").unwrap();
        assert_eq!(first.mean_volume_db, second.mean_volume_db);
        assert!((first.mean_volume_db + 18.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_newer_sample_replaces_older() {
        let cache = AudioCache::new();
        cache.update(
            "device1",
            AudioSample {
                audio: false,
                mean_volume_db: -60.0,
                measured_at: Utc::now(),
                segment_file: "segment_1.ts".to_string(),
            },
        );
        cache.update(
            "device1",
            AudioSample {
                audio: true,
                mean_volume_db: -10.0,
                measured_at: Utc::now(),
                segment_file: "segment_2.ts".to_string(),
            },
        );

        let latest = cache.latest("device1").unwrap();
        assert!(latest.audio);
        assert_eq!(latest.segment_file, "segment_2.ts");
    }
}
