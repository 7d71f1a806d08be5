//! DB collaborator seam for KPI measurement results.

use crate::error::Result;
use uuid::Uuid;

/// Collaborator contract for updating a KPI measurement's DB row.
pub trait KpiResultStore: Send + Sync {
    /// Records the outcome for `execution_result_id`: `kpi_measurement_success`,
    /// `kpi_measurement_ms`, `kpi_measurement_error`, and the report URL.
    fn update_kpi_result(
        &self,
        execution_result_id: Uuid,
        success: bool,
        kpi_ms: Option<i64>,
        error: Option<String>,
        report_url: Option<String>,
    ) -> Result<()>;
}

/// No-op store used when no database is configured; the filesystem/report
/// artifacts still get produced, only the DB row update is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullKpiResultStore;

impl KpiResultStore for NullKpiResultStore {
    fn update_kpi_result(
        &self,
        _execution_result_id: Uuid,
        _success: bool,
        _kpi_ms: Option<i64>,
        _error: Option<String>,
        _report_url: Option<String>,
    ) -> Result<()> {
        Ok(())
    }
}
