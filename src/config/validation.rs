use crate::config::types::Config;
use crate::ConfigError;

/// Validates a configuration
///
/// Checks that paths and table names are non-empty and that writer tuning
/// values are usable, so misconfiguration surfaces at startup rather than
/// mid-crawl.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database.path must not be empty".to_string(),
        ));
    }

    for (name, value) in [
        ("tables.items", &config.tables.items),
        ("tables.requests", &config.tables.requests),
        ("tables.logs", &config.tables.logs),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} must not be empty",
                name
            )));
        }
        // Table names are interpolated into SQL; restrict them to identifiers.
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "{} must contain only alphanumeric characters and underscores, got {:?}",
                name, value
            )));
        }
    }

    if let Some(id) = &config.job.id {
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "job.id must not be empty when set".to_string(),
            ));
        }
    }

    for (name, value) in [
        ("writer.items-batch-size", config.writer.items_batch_size),
        (
            "writer.requests-batch-size",
            config.writer.requests_batch_size,
        ),
        ("writer.logs-batch-size", config.writer.logs_batch_size),
        ("writer.queue-capacity", config.writer.queue_capacity),
        ("writer.lineage-capacity", config.writer.lineage_capacity),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "{} must be greater than zero",
                name
            )));
        }
    }

    if config.writer.flush_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "writer.flush-interval-ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
