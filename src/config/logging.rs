//! Logging configuration.

use super::parse::env_or;
use super::ConfigError;

const DEFAULT_FILTER: &str = "tokio_wsgi=info";

/// Logging configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log filter directives (from LOG_LEVEL or RUST_LOG).
    pub filter: String,
    /// Service name for structured logging.
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            service_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

impl LoggingConfig {
    /// Load configuration from environment variables.
    ///
    /// LOG_LEVEL accepts simple values: trace, debug, info, warn, error.
    /// RUST_LOG accepts full filter syntax: tokio_wsgi=debug,hyper=warn
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            filter: Self::resolve_log_filter(),
            service_name: env_or("SERVICE_NAME", env!("CARGO_PKG_NAME")),
        })
    }

    /// Priority: LOG_LEVEL > RUST_LOG > default (info)
    fn resolve_log_filter() -> String {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            let level = level.to_lowercase();
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => {
                    return format!("tokio_wsgi={}", level);
                }
                // logging is not set up yet
                _ => eprintln!(
                    "Warning: Invalid LOG_LEVEL '{}', expected: trace, debug, info, warn, error",
                    level
                ),
            }
        }

        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.is_empty() {
                return filter;
            }
        }

        DEFAULT_FILTER.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_log_level_priority() {
        env::remove_var("LOG_LEVEL");
        env::remove_var("RUST_LOG");
        assert_eq!(LoggingConfig::resolve_log_filter(), "tokio_wsgi=info");

        env::set_var("RUST_LOG", "tokio_wsgi=warn,hyper=debug");
        assert_eq!(LoggingConfig::resolve_log_filter(), "tokio_wsgi=warn,hyper=debug");

        // LOG_LEVEL takes priority over RUST_LOG
        env::set_var("LOG_LEVEL", "DEBUG");
        assert_eq!(LoggingConfig::resolve_log_filter(), "tokio_wsgi=debug");

        // unknown levels fall back to RUST_LOG
        env::set_var("LOG_LEVEL", "loud");
        assert_eq!(LoggingConfig::resolve_log_filter(), "tokio_wsgi=warn,hyper=debug");

        env::remove_var("LOG_LEVEL");
        env::remove_var("RUST_LOG");
    }
}
