//! Configuration loading and validation
//!
//! Configuration comes from a TOML file (all sections optional) or from
//! `Config::default()` when the embedding application supplies settings
//! programmatically.

mod parser;
mod types;
mod validation;

pub use parser::load_config;
pub use types::{Config, DatabaseConfig, JobConfig, LoggingConfig, TableConfig, WriterConfig};
pub use validation::validate;

/// Derives the default job identifier from the running executable's name
///
/// Used when no explicit `job.id` is configured, mirroring the convention
/// of naming a crawl run after the process that produced it.
pub fn default_job_id() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "crawlsink".to_string())
}
