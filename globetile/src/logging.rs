//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`]
//! once at startup. The filter comes from `GLOBETILE_LOG` when set, otherwise
//! from [`LoggingConfig::filter`].

use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigError, LoggingConfig};

/// Environment variable overriding the configured filter.
pub const LOG_ENV_VAR: &str = "GLOBETILE_LOG";

/// Builds the filter from the environment or the configuration.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| {
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Installs the global subscriber.
///
/// When a log file is configured, output goes through a non-blocking
/// appender and the returned guard must be kept alive until exit so that
/// buffered lines are flushed.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = build_filter(config);

    match &config.file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(directory) = directory {
                fs::create_dir_all(directory)?;
            }
            let file_name = path
                .file_name()
                .ok_or_else(|| ConfigError::Invalid(format!("log file '{}' has no name", path.display())))?;
            let appender = tracing_appender::rolling::never(
                directory.unwrap_or_else(|| std::path::Path::new(".")),
                file_name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .try_init();
            Ok(Some(guard))
        }
        None => {
            let _ = fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .with_target(false)
                .try_init();
            Ok(None)
        }
    }
}
