//! Volume-measurement collaborator shared by the 10-minute silence
//! pre-check (§4.6.2) and the audio detector worker (§4.6.4). Production
//! implementations shell out to `ffmpeg -af volumedetect`; this trait only
//! specifies the contract.

use crate::error::Result;
use std::path::Path;

/// Collaborator contract for measuring mean volume over the first
/// `probe_seconds` of an audio/video file.
pub trait VolumeProbe: Send + Sync {
    /// Returns the mean volume in dB over the first `probe_seconds` of `path`.
    fn mean_volume_db(&self, path: &Path, probe_seconds: f64) -> Result<f64>;
}

/// No-op probe used when no audio backend is configured: always reports a
/// level below [`crate::constants::detector::AUDIO_SILENCE_DB`], so callers
/// treat unmeasurable audio as silence rather than failing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVolumeProbe;

impl VolumeProbe for NullVolumeProbe {
    fn mean_volume_db(&self, _path: &Path, _probe_seconds: f64) -> Result<f64> {
        Ok(crate::constants::detector::AUDIO_SILENCE_DB - 1.0)
    }
}

/// Deterministic fake for tests: reports a fixed dB value regardless of
/// the file it is given.
#[derive(Debug, Clone, Copy)]
pub struct FakeVolumeProbe {
    /// The mean volume this fake always reports.
    pub fixed_db: f64,
}

impl VolumeProbe for FakeVolumeProbe {
    fn mean_volume_db(&self, _path: &Path, _probe_seconds: f64) -> Result<f64> {
        Ok(self.fixed_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_probe_reports_fixed_value() {
        let probe = FakeVolumeProbe { fixed_db: -12.0 };
        let db = probe.mean_volume_db(Path::new("segment_1.ts"), 0.5).unwrap();
        assert!((db + 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_null_probe_reports_below_silence_threshold() {
        let db = NullVolumeProbe.mean_volume_db(Path::new("segment_1.ts"), 5.0).unwrap();
        assert!(db < crate::constants::detector::AUDIO_SILENCE_DB);
    }
}
