//! The two-phase temporal search over a RAM-snapshotted frame window
//! (spec.md §4.5 step 4): an early probe, then a backward step-2 scan with
//! intermediate pin-down.

use super::scan::ScannedFrame;
use super::types::{Algorithm, KpiReference};
use super::verification::VerificationExecutor;
use crate::constants::kpi::{BACKWARD_SCAN_STEP, EARLY_PROBE_OFFSET};
use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

/// Result of [`search`].
#[derive(Debug, Clone)]
pub enum SearchResult {
    /// A match was found at this index into the snapshotted frame list.
    Matched {
        /// Index of the matching frame.
        index: usize,
        /// Which phase produced the match.
        algorithm: Algorithm,
    },
    /// Every frame was checked and none matched.
    Exhausted {
        /// Number of frames checked.
        frames_checked: usize,
    },
}

/// Runs the two-phase search described in spec.md §4.5 step 4 against
/// `frames` (sorted ascending by mtime, as returned by
/// [`super::scan::list_window_frames`]).
pub fn search(
    frames: &[ScannedFrame],
    window_start: DateTime<Utc>,
    references: &[KpiReference],
    userinterface_name: &str,
    team_id: Uuid,
    executor: &dyn VerificationExecutor,
) -> Result<SearchResult> {
    if frames.is_empty() {
        return Ok(SearchResult::Exhausted { frames_checked: 0 });
    }

    let check = |frame: &ScannedFrame| -> Result<bool> {
        Ok(executor
            .execute_verifications(references, userinterface_name, &frame.path, team_id)?
            .success)
    };

    let mut frames_checked = 0usize;

    if let Some(probe_idx) = early_probe_index(frames, window_start) {
        frames_checked += 1;
        if check(&frames[probe_idx])? {
            return Ok(SearchResult::Matched {
                index: probe_idx,
                algorithm: Algorithm::QuickCheckEarly,
            });
        }
    }

    let (matched, backward_checked) = backward_scan(frames, check)?;
    frames_checked += backward_checked;

    match matched {
        Some(index) => Ok(SearchResult::Matched {
            index,
            algorithm: Algorithm::BackwardScanStep2,
        }),
        None => Ok(SearchResult::Exhausted { frames_checked }),
    }
}

fn early_probe_index(frames: &[ScannedFrame], window_start: DateTime<Utc>) -> Option<usize> {
    let target = window_start + ChronoDuration::from_std(EARLY_PROBE_OFFSET).ok()?;
    frames.iter().position(|f| f.mtime >= target).or(Some(frames.len() - 1))
}

fn backward_scan(frames: &[ScannedFrame], check: impl Fn(&ScannedFrame) -> Result<bool>) -> Result<(Option<usize>, usize)> {
    let n = frames.len();
    let mut checked = 0usize;
    let mut i = n - 1;
    let mut last_true: Option<usize> = None;

    loop {
        let is_match = check(&frames[i])?;
        checked += 1;

        if is_match {
            last_true = Some(i);
            if i == 0 {
                break;
            }
            i = i.saturating_sub(BACKWARD_SCAN_STEP);
        } else if let Some(prev) = last_true {
            let intermediate = i + 1;
            if intermediate != prev && intermediate < n {
                if check(&frames[intermediate])? {
                    checked += 1;
                    return Ok((Some(intermediate), checked));
                }
                checked += 1;
            }
            return Ok((Some(prev), checked));
        } else {
            if i == 0 {
                break;
            }
            i = i.saturating_sub(BACKWARD_SCAN_STEP);
        }
    }

    Ok((last_true, checked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::verification::FakeVerificationExecutor;
    use std::path::PathBuf;

    fn frame(seq: u64, mtime: DateTime<Utc>) -> ScannedFrame {
        ScannedFrame {
            path: PathBuf::from(format!("capture_{seq:09}.jpg")),
            thumbnail: PathBuf::from(format!("capture_{seq:09}_thumbnail.jpg")),
            mtime,
        }
    }

    #[test]
    fn test_early_probe_matches_immediately() {
        let t0 = Utc::now();
        let frames = vec![
            frame(1, t0),
            frame(2, t0 + ChronoDuration::milliseconds(200)),
            frame(3, t0 + ChronoDuration::milliseconds(400)),
        ];
        let executor = FakeVerificationExecutor { matches_from_seq: 2 };
        let result = search(&frames, t0, &[], "ui", Uuid::nil(), &executor).unwrap();
        match result {
            SearchResult::Matched { index, algorithm } => {
                assert_eq!(index, 1);
                assert_eq!(algorithm, Algorithm::QuickCheckEarly);
            }
            SearchResult::Exhausted { .. } => panic!("expected a match"),
        }
    }

    #[test]
    fn test_backward_scan_pins_down_intermediate() {
        let t0 = Utc::now();
        let frames: Vec<ScannedFrame> = (0..5).map(|i| frame(i, t0 + ChronoDuration::milliseconds(i64::from(i) * 100))).collect();
        // Matches from seq 3 onward: the early probe (seq 2) fails, forcing
        // the backward scan to run and pin down the transition at seq 3.
        let executor = FakeVerificationExecutor { matches_from_seq: 3 };
        let result = search(&frames, t0, &[], "ui", Uuid::nil(), &executor).unwrap();
        match result {
            SearchResult::Matched { index, algorithm } => {
                assert_eq!(index, 3);
                assert_eq!(algorithm, Algorithm::BackwardScanStep2);
            }
            SearchResult::Exhausted { .. } => panic!("expected a match"),
        }
    }

    #[test]
    fn test_no_match_is_exhausted() {
        let t0 = Utc::now();
        let frames: Vec<ScannedFrame> = (0..3).map(|i| frame(i, t0 + ChronoDuration::milliseconds(i64::from(i) * 100))).collect();
        let executor = FakeVerificationExecutor { matches_from_seq: 999 };
        let result = search(&frames, t0, &[], "ui", Uuid::nil(), &executor).unwrap();
        assert!(matches!(result, SearchResult::Exhausted { .. }));
    }
}
