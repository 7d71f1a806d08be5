//! Incident manager: per-device state machine and DB collaborator seam.
//!
//! Carries spec.md §4.4 verbatim: `NORMAL -> PENDING -> ACTIVE -> NORMAL`
//! per `(device, kind)` with a 300s debounce, at-most-one-ACTIVE-per-kind,
//! cold-boot resolution, and orphan cleanup.

mod manager;
mod store;
mod types;

pub use manager::IncidentManager;
pub use store::{ActiveAlertRow, AlertStore, NullAlertStore};
pub use types::{AlertId, DetectionFlags, DeviceIncidentState, IncidentKind, IncidentMetadata, Transition};
