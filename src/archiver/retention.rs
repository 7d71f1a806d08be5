//! Hour-bucketed retention: wipes folders older than a class's retention
//! horizon, treating future-in-clock hours as 24 hours in the past.

use crate::error::Result;
use std::path::Path;

/// How many hours in the past `folder_hour` is relative to `current_hour`,
/// treating hours later than the current clock hour as belonging to
/// yesterday (e.g. at local hour 5, hour 6 is 23 hours ago, not -1).
#[must_use]
pub const fn hours_ago(current_hour: u32, folder_hour: u32) -> u32 {
    if folder_hour <= current_hour {
        current_hour - folder_hour
    } else {
        24 - (folder_hour - current_hour)
    }
}

/// Wipes every hour-bucket folder under `class_root` whose `hours_ago`
/// exceeds `retention_hours`, recreating it empty. Folders within the
/// retention horizon, and folders that are already empty, are untouched.
/// Returns the number of folders wiped.
pub fn apply_retention(class_root: &Path, current_hour: u32, retention_hours: u32) -> Result<usize> {
    if !class_root.is_dir() {
        return Ok(0);
    }

    let mut cleaned = 0;
    for hour in 0..24 {
        let hour_dir = class_root.join(hour.to_string());
        if !hour_dir.is_dir() {
            continue;
        }
        if hours_ago(current_hour, hour) < retention_hours {
            continue;
        }
        if folder_is_empty(&hour_dir)? {
            continue;
        }

        std::fs::remove_dir_all(&hour_dir)?;
        std::fs::create_dir_all(&hour_dir)?;
        cleaned += 1;
    }
    Ok(cleaned)
}

fn folder_is_empty(dir: &Path) -> Result<bool> {
    Ok(std::fs::read_dir(dir)?.next().is_none())
}
