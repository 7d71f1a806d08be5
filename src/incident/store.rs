//! DB collaborator seam for the incident manager.
//!
//! The reference implementation lazily imports its DB client module and
//! substitutes a sentinel when credentials are missing, so a cold start
//! never fails. Here that is an injected `dyn AlertStore`: [`NullAlertStore`]
//! is the default when no database URL is configured, and every method
//! simply reports "not available" instead of erroring, matching REDESIGN
//! FLAGS' "inject a DB capability object... substitute a null-object
//! implementation".

use super::types::{AlertId, IncidentKind, IncidentMetadata};
use crate::error::Result;

/// A DB-backed alert row identified for cleanup/resolve purposes.
#[derive(Debug, Clone)]
pub struct ActiveAlertRow {
    /// Device the alert belongs to.
    pub device_id: String,
    /// Incident kind.
    pub kind: IncidentKind,
    /// Opaque DB row id.
    pub alert_id: AlertId,
}

/// Collaborator contract for incident persistence.
///
/// Implementations must deduplicate by `(host, device, kind, active=true)`
/// in `create_alert_safe`, mirroring the reference's `create_alert_safe`
/// upsert semantics (no DB transaction spans multiple rows; idempotence is
/// relied on instead).
pub trait AlertStore: Send + Sync {
    /// Creates an active alert row, returning `None` if the store is
    /// unavailable or a duplicate already exists.
    fn create_alert_safe(
        &self,
        host_name: &str,
        device_id: &str,
        kind: IncidentKind,
        metadata: &IncidentMetadata,
    ) -> Result<Option<AlertId>>;

    /// Marks an alert row resolved.
    fn resolve_alert(&self, alert_id: &AlertId) -> Result<()>;

    /// Lists every currently-active alert row for this host, used for the
    /// cold-boot resolution pass.
    fn list_active_for_host(&self, host_name: &str) -> Result<Vec<ActiveAlertRow>>;
}

/// No-op store used when no database URL is configured. Incidents are
/// never created; the service continues, producing only filesystem
/// artifacts, exactly as spec.md §7 describes for "DB unavailable".
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAlertStore;

impl AlertStore for NullAlertStore {
    fn create_alert_safe(
        &self,
        _host_name: &str,
        _device_id: &str,
        _kind: IncidentKind,
        _metadata: &IncidentMetadata,
    ) -> Result<Option<AlertId>> {
        Ok(None)
    }

    fn resolve_alert(&self, _alert_id: &AlertId) -> Result<()> {
        Ok(())
    }

    fn list_active_for_host(&self, _host_name: &str) -> Result<Vec<ActiveAlertRow>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_store_never_creates_alerts() {
        let store = NullAlertStore;
        let metadata = IncidentMetadata::default();
        let result = store
            .create_alert_safe("host1", "device1", IncidentKind::Freeze, &metadata)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_null_store_resolve_is_ok() {
        let store = NullAlertStore;
        assert!(store.resolve_alert(&"alert_1".to_string()).is_ok());
    }

    #[test]
    fn test_null_store_lists_nothing() {
        let store = NullAlertStore;
        assert!(store.list_active_for_host("host1").unwrap().is_empty());
    }
}
