//! Configuration loaded from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_wsgi::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen: {}:{}", config.server.host, config.server.port);
//! ```

mod error;
mod logging;
mod parse;
mod server;

pub use error::ConfigError;
pub use logging::LoggingConfig;
pub use server::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};

/// Complete application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        let server = &self.server;
        info!("Configuration loaded:");
        info!("  Listen: {}:{}", server.host, server.port);
        info!("  Workers: {}", server.worker_count());
        info!("  Debug: {}", if server.debug { "on" } else { "off" });
        info!("  Header timeout: {}s", server.header_timeout.as_secs());
        info!("  Drain timeout: {}s", server.drain_timeout.as_secs());
        info!("  Stream buffer: {} chunks", server.stream_buffer);

        if let Some(ref dir) = server.error_pages_dir {
            info!("  Error pages: {}", dir.display());
        }

        if server.access_log {
            info!("  Access log: enabled");
        }

        info!("  Log filter: {}", self.logging.filter);
    }
}
