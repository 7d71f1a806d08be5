//! Host registry and device lock manager (spec.md §3, §4.8, §6).
//!
//! An in-memory map of registered hosts keyed by `host_name`, with a
//! 120-second staleness sweep and a blocking per-host lock manager whose
//! outcome is mirrored into each host's `isLocked`/`lockedBy`/`lockedAt`
//! fields for fast reads. The five HTTP routes spec.md §6 names are
//! exposed by [`server::router`]/[`server::serve`]; everything else
//! (auth, the rest of the server blueprint) is out of scope per spec.md §1.

mod lock;
pub mod server;
mod store;
mod types;

pub use lock::LockManager;
pub use store::Registry;
pub use types::{DeviceRegistration, HostEntry, HostRegistration, HostStatus, PingRequest};
