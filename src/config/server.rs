//! Server configuration.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use super::parse::{env_bool, env_opt, env_or, env_parse, env_seconds};
use super::ConfigError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Server configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host name or address to bind (default: 127.0.0.1).
    pub host: String,
    /// Port to bind; 0 picks a free port.
    pub port: u16,
    /// Debug mode: diagnostic error pages and the reloader.
    pub debug: bool,
    /// Accept loops sharing the port through SO_REUSEPORT (0 = one per CPU).
    pub workers: usize,
    /// Time allowed for a client to send the request headers.
    pub header_timeout: Duration,
    /// Graceful shutdown drain timeout.
    pub drain_timeout: Duration,
    /// Body chunks buffered per streaming response.
    pub stream_buffer: usize,
    /// Log one `access` event per request.
    pub access_log: bool,
    /// Directory with `{status}.html` error pages.
    pub error_pages_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug: false,
            workers: 1,
            header_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
            stream_buffer: 100,
            access_log: false,
            error_pages_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_port = env_opt("SERVER_NAME")
            .and_then(|name| server_name_port(&name))
            .unwrap_or(DEFAULT_PORT);

        let stream_buffer = env_parse("STREAM_BUFFER", 100usize)?;
        if stream_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "STREAM_BUFFER".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            host: env_or("LISTEN_HOST", DEFAULT_HOST),
            port: env_parse("LISTEN_PORT", default_port)?,
            debug: env_bool("DEBUG", false),
            workers: env_parse("WORKERS", 1usize)?,
            header_timeout: env_seconds("HEADER_TIMEOUT_SECS", 5)?,
            drain_timeout: env_seconds("DRAIN_TIMEOUT_SECS", 30)?,
            stream_buffer,
            access_log: env_bool("ACCESS_LOG", false),
            error_pages_dir: env_opt("ERROR_PAGES_DIR").map(PathBuf::from),
        })
    }

    /// Same configuration bound to `host:port`.
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Resolve `host:port` to a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            key: "LISTEN_HOST".into(),
            message,
        };

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| invalid(format!("cannot resolve {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| invalid(format!("{} resolves to no address", self.host)))
    }

    /// Effective number of accept loops.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Port carried by a `host:port` server name.
fn server_name_port(server_name: &str) -> Option<u16> {
    let (_, port) = server_name.rsplit_once(':')?;
    port.parse().ok()
}
