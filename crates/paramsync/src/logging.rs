//! Process-wide log setup for the command line front end.

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::settings::{LogFormat, LoggingSettings};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] tracing_log::log_tracer::SetLoggerError),
}

/// Builds the filter: `RUST_LOG` wins over the configured level.
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidFilter {
            directive: level.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Installs the global subscriber and routes `log` records from the store
/// layer into it. Output goes to stderr so stdout stays machine readable.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = env_filter(&settings.level)?;

    match settings.format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false);
            tracing::subscriber::set_global_default(
                tracing_subscriber::registry().with(filter).with(layer),
            )?;
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(false);
            tracing::subscriber::set_global_default(
                tracing_subscriber::registry().with(filter).with(layer),
            )?;
        }
    }

    tracing_log::LogTracer::init()?;
    tracing::debug!(level = %settings.level, format = ?settings.format, "Logging initialized");
    Ok(())
}
