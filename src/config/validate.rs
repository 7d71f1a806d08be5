//! Configuration validation.

use crate::config::Config;
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_tunables(config)?;
    Ok(())
}

/// Validate detector and service tunables.
fn validate_tunables(config: &Config) -> Result<()> {
    let tunables = &config.tunables;

    if tunables.incident_report_delay_secs == 0 {
        return Err(Error::ConfigValidation {
            message: "incident_report_delay_secs must be at least 1".to_string(),
        });
    }

    if !(0.0..=100.0).contains(&tunables.blackscreen_percent_desktop) {
        return Err(Error::ConfigValidation {
            message: format!(
                "blackscreen_percent_desktop must be between 0 and 100, got {}",
                tunables.blackscreen_percent_desktop
            ),
        });
    }

    if !(0.0..=100.0).contains(&tunables.blackscreen_percent_mobile) {
        return Err(Error::ConfigValidation {
            message: format!(
                "blackscreen_percent_mobile must be between 0 and 100, got {}",
                tunables.blackscreen_percent_mobile
            ),
        });
    }

    if tunables.freeze_diff_threshold < 0.0 {
        return Err(Error::ConfigValidation {
            message: format!(
                "freeze_diff_threshold must be non-negative, got {}",
                tunables.freeze_diff_threshold
            ),
        });
    }

    if tunables.hot_limit_segments == 0 {
        return Err(Error::ConfigValidation {
            message: "hot_limit_segments must be at least 1".to_string(),
        });
    }

    if tunables.hot_limit_other == 0 {
        return Err(Error::ConfigValidation {
            message: "hot_limit_other must be at least 1".to_string(),
        });
    }

    if tunables.retention_hours_captures == 0 {
        return Err(Error::ConfigValidation {
            message: "retention_hours_captures must be at least 1".to_string(),
        });
    }

    if tunables.retention_hours_other == 0 {
        return Err(Error::ConfigValidation {
            message: "retention_hours_other must be at least 1".to_string(),
        });
    }

    if tunables.kpi_queue_capacity == 0 {
        return Err(Error::ConfigValidation {
            message: "kpi_queue_capacity must be at least 1".to_string(),
        });
    }

    Ok(())
}
