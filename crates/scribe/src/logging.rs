//! Process-wide logging setup.
//!
//! The crate logs through the `log` macros and opens `tracing` spans around
//! job drives and stages. `init_logging` installs a `tracing_subscriber`
//! registry for both and bridges `log` records into it.

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter directive for a configured level, e.g. `info` -> `scribe=info,warn`.
pub fn filter_directive(level: &str) -> String {
    format!("scribe={},warn", level)
}

/// Builds the active filter. `RUST_LOG` takes precedence over `directive`.
pub fn build_filter(directive: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber and the `log` bridge.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let filter = build_filter(&filter_directive(level))?;

    let result = match format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(true)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_current_span(true)),
        ),
    };
    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    LogTracer::init().map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    log::debug!("Logging initialized at level {}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("debug"), "scribe=debug,warn");
    }

    #[test]
    #[serial]
    fn test_build_filter_uses_directive_without_env() {
        std::env::remove_var("RUST_LOG");
        let filter = build_filter("scribe=trace").unwrap();
        assert_eq!(filter.to_string(), "scribe=trace");
    }

    #[test]
    #[serial]
    fn test_rust_log_wins() {
        std::env::set_var("RUST_LOG", "scribe=error");
        let filter = build_filter("scribe=trace").unwrap();
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter.to_string(), "scribe=error");
    }

    #[test]
    #[serial]
    fn test_invalid_directive_is_rejected() {
        std::env::remove_var("RUST_LOG");
        assert!(matches!(
            build_filter("scribe=notalevel"),
            Err(LoggingError::InvalidFilter { .. })
        ));
    }
}
