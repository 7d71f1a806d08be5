//! Per-frame detector: blackscreen, freeze, and macroblock algorithms over
//! decoded JPEG frames. Audio is injected separately (§4.6.4); it is never
//! measured here.

use crate::config::Tunables;
use crate::constants::detector::{
    BLACKSCREEN_AMBIGUOUS_HIGH, BLACKSCREEN_AMBIGUOUS_LOW, BLACKSCREEN_COARSE_STRIDE,
    BLACKSCREEN_PIXEL_THRESHOLD, BLACKSCREEN_REGION_BOTTOM, BLACKSCREEN_REGION_TOP,
    FREEZE_COMPARISON_FRAMES, FREEZE_MAX_COMPARISONS, FREEZE_SAMPLE_STRIDE,
    MACROBLOCK_ARTIFACT_PERCENT, MACROBLOCK_BLUR_VARIANCE, MACROBLOCK_SAMPLE_STRIDE,
};
use crate::error::{Error, Result};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which threshold profile to apply for blackscreen detection. Mobile
/// models tolerate UI overlays (lower dark-pixel bar); desktop models
/// require a near-total-black frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    /// Set-top-box / desktop capture.
    Desktop,
    /// Mobile capture, tolerant of translucent UI overlays.
    Mobile,
}

/// Result of running every detector over one frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Whether the frame is blackscreen.
    pub blackscreen: bool,
    /// Measured dark-pixel percentage within the sampled region.
    pub blackscreen_percentage: f64,
    /// Whether the frame is frozen relative to its predecessors.
    pub freeze: bool,
    /// Pairwise mean-diff values against each compared previous frame,
    /// newest comparison first.
    pub freeze_diffs: Vec<f64>,
    /// Audio presence, injected by the audio worker; absent until stamped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<bool>,
    /// Filenames of up to the last 3 frames, populated on first freeze
    /// detection so the monitor can upload evidence.
    #[serde(default)]
    pub last_3_filenames: Vec<String>,
    /// Thumbnail paths mirroring `last_3_filenames`.
    #[serde(default)]
    pub last_3_thumbnails: Vec<String>,
    /// Conservative macroblock/artifacting verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macroblocks: Option<bool>,
    /// Optional aggregate quality score carried through from the detector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

/// Runs every detector over `frame_path`, comparing against up to
/// [`FREEZE_COMPARISON_FRAMES`] entries in `previous_frame_paths` (ordered
/// newest-first).
pub fn detect_issues(
    frame_path: &Path,
    previous_frame_paths: &[PathBuf],
    model: DeviceModel,
    tunables: &Tunables,
) -> Result<DetectionResult> {
    let image = image::open(frame_path).map_err(|source| Error::FrameDecode {
        path: frame_path.to_path_buf(),
        source,
    })?;
    let gray = image.to_luma8();

    let (blackscreen, blackscreen_percentage) = detect_blackscreen(&gray, model, tunables);

    let mut previous_gray = Vec::with_capacity(FREEZE_COMPARISON_FRAMES);
    for path in previous_frame_paths.iter().take(FREEZE_COMPARISON_FRAMES) {
        match image::open(path) {
            Ok(img) => previous_gray.push(img.to_luma8()),
            Err(_) => continue,
        }
    }
    let (freeze, freeze_diffs) = detect_freeze(&gray, &previous_gray, tunables);

    let rgb = image.to_rgb8();
    let macroblocks = Some(detect_macroblocks(&rgb));

    Ok(DetectionResult {
        blackscreen,
        blackscreen_percentage,
        freeze,
        freeze_diffs,
        audio: None,
        last_3_filenames: Vec::new(),
        last_3_thumbnails: Vec::new(),
        macroblocks,
        quality_score: None,
    })
}

/// Percentage of sampled pixels in the 5%-70% vertical band that are at or
/// below the dark threshold. Samples every third pixel first; only falls
/// back to a full scan when the coarse result lands in the 70-90%
/// ambiguous band.
fn detect_blackscreen(gray: &GrayImage, model: DeviceModel, tunables: &Tunables) -> (bool, f64) {
    let percentage = dark_percentage(gray, BLACKSCREEN_COARSE_STRIDE);
    let percentage = if (BLACKSCREEN_AMBIGUOUS_LOW..BLACKSCREEN_AMBIGUOUS_HIGH).contains(&percentage) {
        dark_percentage(gray, 1)
    } else {
        percentage
    };

    let threshold = match model {
        DeviceModel::Desktop => tunables.blackscreen_percent_desktop,
        DeviceModel::Mobile => tunables.blackscreen_percent_mobile,
    };
    (percentage > threshold, percentage)
}

fn dark_percentage(gray: &GrayImage, stride: u32) -> f64 {
    let (width, height) = gray.dimensions();
    let top = (f64::from(height) * BLACKSCREEN_REGION_TOP) as u32;
    let bottom = (f64::from(height) * BLACKSCREEN_REGION_BOTTOM) as u32;

    let mut sampled = 0u64;
    let mut dark = 0u64;
    let mut y = top;
    while y < bottom.min(height) {
        let mut x = 0;
        while x < width {
            let pixel = gray.get_pixel(x, y).0[0];
            sampled += 1;
            if pixel <= BLACKSCREEN_PIXEL_THRESHOLD {
                dark += 1;
            }
            x += stride;
        }
        y += stride;
    }

    if sampled == 0 {
        return 0.0;
    }
    (dark as f64 / sampled as f64) * 100.0
}

/// Compares `current` against each of `previous`, newest first, producing
/// one mean-diff per comparison. A batch early-stops once a
/// freeze-to-non-freeze transition is observed (the zapping optimization:
/// once we see motion, older frames cannot make the current frame frozen
/// again) and never exceeds [`FREEZE_MAX_COMPARISONS`].
fn detect_freeze(current: &GrayImage, previous: &[GrayImage], tunables: &Tunables) -> (bool, Vec<f64>) {
    let mut diffs = Vec::new();
    let mut any_motion = false;

    for prev in previous.iter().take(FREEZE_MAX_COMPARISONS) {
        let diff = mean_abs_diff(current, prev, FREEZE_SAMPLE_STRIDE);
        diffs.push(diff);
        if diff >= tunables.freeze_diff_threshold {
            any_motion = true;
            break;
        }
    }

    let frozen = !diffs.is_empty() && !any_motion;
    (frozen, diffs)
}

fn mean_abs_diff(a: &GrayImage, b: &GrayImage, stride: u32) -> f64 {
    let (aw, ah) = a.dimensions();
    let (bw, bh) = b.dimensions();
    let width = aw.min(bw);
    let height = ah.min(bh);
    if width == 0 || height == 0 {
        return 0.0;
    }

    let mut total = 0u64;
    let mut samples = 0u64;
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let pa = i32::from(a.get_pixel(x, y).0[0]);
            let pb = i32::from(b.get_pixel(x, y).0[0]);
            total += u64::from((pa - pb).unsigned_abs());
            samples += 1;
            x += stride;
        }
        y += stride;
    }

    if samples == 0 {
        return 0.0;
    }
    (total as f64 / samples as f64) / 255.0
}

/// Conservative macroblock heuristic: samples every 10th pixel in HSV
/// space, counts abnormally-saturated green and pink artifact pixels, and
/// cross-checks against a Laplacian-variance blur signal so a genuinely
/// sharp, colorful frame is not mistaken for artifacting.
fn detect_macroblocks(rgb: &RgbImage) -> bool {
    let artifact_percent = artifact_pixel_percentage(rgb, MACROBLOCK_SAMPLE_STRIDE);
    let blur_variance = laplacian_variance(rgb);

    let extreme_artifact = artifact_percent > MACROBLOCK_ARTIFACT_PERCENT * 2.5;
    let extreme_blur = blur_variance < MACROBLOCK_BLUR_VARIANCE / 6.0;

    (artifact_percent > MACROBLOCK_ARTIFACT_PERCENT && blur_variance < MACROBLOCK_BLUR_VARIANCE)
        || extreme_artifact
        || extreme_blur
}

fn artifact_pixel_percentage(rgb: &RgbImage, stride: u32) -> f64 {
    let (width, height) = rgb.dimensions();
    let mut sampled = 0u64;
    let mut artifact = 0u64;

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            let (h, s, v) = rgb_to_hsv(r, g, b);
            sampled += 1;
            if is_artifact_green(h, s, v) || is_artifact_pink(h, s, v) {
                artifact += 1;
            }
            x += stride;
        }
        y += stride;
    }

    if sampled == 0 {
        return 0.0;
    }
    (artifact as f64 / sampled as f64) * 100.0
}

fn is_artifact_green(h: u8, s: u8, v: u8) -> bool {
    (40..=80).contains(&h) && (100..=255).contains(&s) && (50..=255).contains(&v)
}

fn is_artifact_pink(h: u8, s: u8, v: u8) -> bool {
    (140..=170).contains(&h) && (100..=255).contains(&s) && (50..=255).contains(&v)
}

/// RGB -> HSV on the OpenCV-style 0..=179 hue scale (the spec's artifact
/// ranges are given in that convention), with S/V on 0..=255.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (f64::from(r), f64::from(g), f64::from(b));
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue = if delta < f64::EPSILON {
        0.0
    } else if (max - rf).abs() < f64::EPSILON {
        60.0 * (((gf - bf) / delta) % 6.0)
    } else if (max - gf).abs() < f64::EPSILON {
        60.0 * (((bf - rf) / delta) + 2.0)
    } else {
        60.0 * (((rf - gf) / delta) + 4.0)
    };
    let hue = if hue < 0.0 { hue + 360.0 } else { hue };

    let saturation = if max < f64::EPSILON { 0.0 } else { delta / max };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let h = (hue / 2.0) as u8; // 0..=179
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let s = (saturation * 255.0) as u8;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let v = max as u8;
    (h, s, v)
}

/// Variance of a 3x3 Laplacian convolution over a downsampled grayscale
/// copy of `rgb`, used as a blur signal (low variance implies a blocky,
/// low-detail frame).
fn laplacian_variance(rgb: &RgbImage) -> f64 {
    let gray = image::DynamicImage::ImageRgb8(rgb.clone()).to_luma8();
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return f64::from(MACROBLOCK_BLUR_VARIANCE);
    }

    let mut responses = Vec::new();
    let mut y = 1;
    while y < height - 1 {
        let mut x = 1;
        while x < width - 1 {
            let center = i32::from(gray.get_pixel(x, y).0[0]);
            let up = i32::from(gray.get_pixel(x, y - 1).0[0]);
            let down = i32::from(gray.get_pixel(x, y + 1).0[0]);
            let left = i32::from(gray.get_pixel(x - 1, y).0[0]);
            let right = i32::from(gray.get_pixel(x + 1, y).0[0]);
            let laplacian = left + right + up + down - 4 * center;
            responses.push(f64::from(laplacian));
            x += MACROBLOCK_SAMPLE_STRIDE;
        }
        y += MACROBLOCK_SAMPLE_STRIDE;
    }

    if responses.is_empty() {
        return f64::from(MACROBLOCK_BLUR_VARIANCE);
    }
    let mean = responses.iter().sum::<f64>() / responses.len() as f64;
    responses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / responses.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid_gray(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([value]))
    }

    fn solid_rgb(width: u32, height: u32, pixel: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(pixel))
    }

    #[test]
    fn test_dark_percentage_all_black_is_100() {
        let gray = solid_gray(100, 100, 0);
        let pct = dark_percentage(&gray, 1);
        assert!((pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dark_percentage_all_white_is_zero() {
        let gray = solid_gray(100, 100, 255);
        let pct = dark_percentage(&gray, 1);
        assert!(pct.abs() < f64::EPSILON);
    }

    #[test]
    fn test_detect_blackscreen_black_frame_over_desktop_threshold() {
        let gray = solid_gray(64, 64, 0);
        let tunables = Tunables::default();
        let (detected, pct) = detect_blackscreen(&gray, DeviceModel::Desktop, &tunables);
        assert!(detected);
        assert!((pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_identical_frames_are_frozen() {
        let current = solid_gray(64, 64, 128);
        let previous = vec![solid_gray(64, 64, 128), solid_gray(64, 64, 128)];
        let tunables = Tunables::default();
        let (frozen, diffs) = detect_freeze(&current, &previous, &tunables);
        assert!(frozen);
        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(|d| *d < tunables.freeze_diff_threshold));
    }

    #[test]
    fn test_very_different_frames_are_not_frozen() {
        let current = solid_gray(64, 64, 255);
        let previous = vec![solid_gray(64, 64, 0)];
        let tunables = Tunables::default();
        let (frozen, diffs) = detect_freeze(&current, &previous, &tunables);
        assert!(!frozen);
        assert!((diffs[0] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_previous_frames_is_not_frozen() {
        let current = solid_gray(64, 64, 128);
        let tunables = Tunables::default();
        let (frozen, diffs) = detect_freeze(&current, &[], &tunables);
        assert!(!frozen);
        assert!(diffs.is_empty());
    }

    #[test]
    fn test_solid_color_frame_has_no_artifacts() {
        let rgb = solid_rgb(64, 64, [128, 128, 128]);
        assert!(!detect_macroblocks(&rgb));
    }

    #[test]
    fn test_rgb_to_hsv_pure_green() {
        let (h, s, v) = rgb_to_hsv(0, 255, 0);
        assert_eq!(h, 60); // 120 degrees / 2
        assert_eq!(s, 255);
        assert_eq!(v, 255);
    }
}
