//! Channel-banner recognition collaborator (spec.md §4.7 step 1). A real
//! implementation shells out to an OCR/vision backend; this trait only
//! specifies the contract so the detection pipeline around it is testable.

use super::types::BannerDetection;
use crate::error::Result;
use std::path::Path;

/// Collaborator contract for channel-banner recognition.
pub trait BannerAi: Send + Sync {
    /// Runs banner recognition on `frame_path`.
    fn detect_banner(&self, frame_path: &Path) -> Result<BannerDetection>;
}

/// No-op recognizer used when no banner/OCR backend is configured: always
/// reports no banner detected, so an unexplained blackscreen->content
/// transition degrades to "just a blackscreen" (spec.md §4.7) instead of
/// failing the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBannerAi;

impl BannerAi for NullBannerAi {
    fn detect_banner(&self, _frame_path: &Path) -> Result<BannerDetection> {
        Ok(BannerDetection::default())
    }
}

/// Deterministic fake for tests: reports a fixed detection regardless of
/// the frame it is given.
#[derive(Debug, Clone, Default)]
pub struct FakeBannerAi {
    /// The detection this fake always reports.
    pub detection: BannerDetection,
}

impl BannerAi for FakeBannerAi {
    fn detect_banner(&self, _frame_path: &Path) -> Result<BannerDetection> {
        Ok(self.detection.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zapping::types::ChannelInfo;

    #[test]
    fn test_fake_banner_ai_reports_configured_detection() {
        let fake = FakeBannerAi {
            detection: BannerDetection {
                banner_detected: true,
                channel_info: Some(ChannelInfo {
                    channel_name: Some("Channel 4".to_string()),
                    confidence: 0.92,
                    ..Default::default()
                }),
            },
        };
        let result = fake.detect_banner(Path::new("capture_000000001.jpg")).unwrap();
        assert!(result.banner_detected);
        assert_eq!(result.channel_info.unwrap().channel_name.as_deref(), Some("Channel 4"));
    }

    #[test]
    fn test_fake_banner_ai_default_reports_no_banner() {
        let fake = FakeBannerAi::default();
        let result = fake.detect_banner(Path::new("capture_000000002.jpg")).unwrap();
        assert!(!result.banner_detected);
    }

    #[test]
    fn test_null_banner_ai_never_detects() {
        let result = NullBannerAi.detect_banner(Path::new("capture_000000003.jpg")).unwrap();
        assert!(!result.banner_detected);
    }
}
