//! Hot/cold archiver: moves overflow hot files into hour-bucketed cold
//! folders, generates HLS manifests, and enforces per-class retention.

mod cycle;
mod hls;
mod retention;

pub use cycle::{CycleReport, DirectoryReport, run_cycle, run_forever};
pub use hls::write_manifest_for_hour;
pub use retention::hours_ago;
