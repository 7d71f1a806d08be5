//! Advisory locking over files shared between processes.

mod file_lock;

pub use file_lock::{
    LockInfo, RetryPolicy, SidecarLock, cleanup_all_locks, register_lock, unregister_lock,
    with_sidecar_lock,
};
