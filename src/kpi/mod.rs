//! KPI Executor (spec.md §4.5, §4.5b): measures action-to-visual latency by
//! scanning capture frames for a requested on-screen condition.

pub mod executor;
pub mod queue;
pub mod report;
pub mod scan;
pub mod search;
pub mod store;
pub mod types;
pub mod verification;

pub use executor::{KpiExecutorDeps, process_request};
pub use queue::run_forever;
pub use report::{ReportThumbnails, render_report, upload_report};
pub use scan::{ScanWindow, ScannedFrame, compute_scan_window, list_window_frames, snapshot_to_ram};
pub use search::{SearchResult, search};
pub use store::{KpiResultStore, NullKpiResultStore};
pub use types::{Algorithm, Area, KpiOutcome, KpiReference, KpiRequest};
pub use verification::{FakeVerificationExecutor, NullVerificationExecutor, VerificationExecutor, VerificationOutcome};
