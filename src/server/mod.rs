//! HTTP and WebSocket server hosting an [`Application`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_wsgi::{App, Config};
//! use tokio_wsgi::app::plain;
//!
//! let mut app = App::new();
//! app.route("/", plain(|_| Ok("Hello, World!")));
//! tokio_wsgi::run_with_config(app, Config::from_env()?)?;
//! ```
//!
//! # Graceful Shutdown
//!
//! ```rust,ignore
//! server.trigger_shutdown();
//! server.wait_for_drain(Duration::from_secs(30)).await;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       Server                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐ │
//! │  │   Worker 0   │  │   Worker 1   │  │  Worker N   │ │
//! │  │(SO_REUSEPORT)│  │(SO_REUSEPORT)│  │(SO_REUSEPORT)│
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬──────┘ │
//! │         ▼                 ▼                 ▼        │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │  ConnectionContext (hyper, upgrade detection)  │  │
//! │  └───────────────────────┬────────────────────────┘  │
//! │                          ▼                           │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │  gateway::handle -> Application -> emit        │  │
//! │  └────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod connection;
pub mod reloader;
pub mod streaming;
pub mod transport;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::{App, ErrorPages};
use crate::application::Application;
use crate::config::{Config, ServerConfig};
use crate::hooks::AccessLog;
use crate::logging;
use crate::middleware::{wrap, DebugMiddleware};
use connection::ConnectionContext;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// HTTP server running an [`Application`] on SO_REUSEPORT accept loops.
pub struct Server<A: Application> {
    config: ServerConfig,
    app: Arc<A>,
    local_addr: SocketAddr,
    /// Listener bound in [`Server::bind`], used by the first worker.
    primary: Mutex<Option<std::net::TcpListener>>,
    /// Active connections counter
    active_connections: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl<A: Application> Server<A> {
    /// Bind the listen address. Port 0 is resolved here, so
    /// [`Server::local_addr`] is usable before [`Server::run`].
    pub fn bind(config: ServerConfig, app: A) -> Result<Self, BoxError> {
        let addr = config.listen_addr()?;
        let listener = Self::create_reuse_port_listener(addr)?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            app: Arc::new(app),
            local_addr,
            primary: Mutex::new(Some(listener)),
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            shutdown_rx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get current active connections count.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the configured drain timeout.
    pub fn drain_timeout(&self) -> Duration {
        self.config.drain_timeout
    }

    /// Creates a socket with SO_REUSEPORT so several accept loops can share the port.
    fn create_reuse_port_listener(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
        let domain = if addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;

        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        Ok(socket.into())
    }

    /// Run the server.
    /// Spawns worker accept loops and returns once all of them stopped.
    pub async fn run(&self) -> Result<(), BoxError> {
        let num_workers = self.config.worker_count();
        debug!(workers = num_workers, addr = %self.local_addr, "starting accept loops");

        let mut primary = self
            .primary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let mut handles = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let std_listener = match primary.take() {
                Some(listener) => listener,
                None => match Self::create_reuse_port_listener(self.local_addr) {
                    Ok(l) => l,
                    Err(e) => {
                        error!("Worker {}: Failed to create listener: {}", worker_id, e);
                        continue;
                    }
                },
            };

            let mut shutdown_rx = self.shutdown_rx.clone();
            let ctx = Arc::new(ConnectionContext {
                app: Arc::clone(&self.app),
                active_connections: Arc::clone(&self.active_connections),
                header_timeout: self.config.header_timeout,
                stream_buffer: self.config.stream_buffer,
            });

            let handle = tokio::spawn(async move {
                let listener = match TcpListener::from_std(std_listener) {
                    Ok(l) => l,
                    Err(e) => {
                        error!("Worker {}: Failed to convert listener: {}", worker_id, e);
                        return;
                    }
                };

                debug!("Worker {} started", worker_id);

                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            let (stream, remote_addr) = match result {
                                Ok(conn) => conn,
                                Err(e) => {
                                    error!("Worker {}: Accept error: {}", worker_id, e);
                                    continue;
                                }
                            };

                            let _ = stream.set_nodelay(true);

                            let keepalive = TcpKeepalive::new()
                                .with_time(Duration::from_secs(5))
                                .with_interval(Duration::from_secs(1))
                                .with_retries(3);
                            let sock_ref = SockRef::from(&stream);
                            let _ = sock_ref.set_tcp_keepalive(&keepalive);

                            let ctx = Arc::clone(&ctx);
                            tokio::spawn(async move {
                                ctx.handle_connection(stream, remote_addr).await;
                            });
                        }
                        _ = shutdown_rx.changed() => {
                            debug!("Worker {} received shutdown signal, stopping accept loop", worker_id);
                            break;
                        }
                    }
                }
            });

            handles.push(handle);
        }

        if handles.is_empty() {
            return Err("no worker could bind its listener".into());
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Trigger graceful shutdown.
    /// Signals all workers to stop accepting new connections.
    pub fn trigger_shutdown(&self) {
        if self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all active connections to drain.
    /// Returns true if drained successfully, false if timeout was reached.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        let check_interval = Duration::from_millis(100);

        loop {
            let active = self.active_connections.load(Ordering::Relaxed);
            if active == 0 {
                return true;
            }

            if start.elapsed() >= timeout {
                warn!("Drain timeout reached with {} active connections", active);
                return false;
            }

            debug!("Waiting for {} connections to drain...", active);
            tokio::time::sleep(check_interval).await;
        }
    }
}

/// Serve `app` on `host:port`. Other settings come from the environment.
///
/// With `debug` set the process runs under the development reloader and
/// errors escaping the application are answered with a diagnostic page.
pub fn run(app: App, host: &str, port: Option<u16>, debug: bool) -> Result<(), BoxError> {
    let mut config = Config::from_env()?;
    let port = port.unwrap_or(config.server.port);
    config.server = config.server.with_address(host, port);
    config.server.debug = debug;
    run_with_config(app, config)
}

/// Serve `app` with an explicit configuration.
pub fn run_with_config(app: App, config: Config) -> Result<(), BoxError> {
    logging::init(&config.logging, config.server.debug);

    if config.server.debug {
        return reloader::run_with_reloader(move || start(app, config), reloader::DEFAULT_INTERVAL);
    }
    start(app, config)
}

fn start(mut app: App, config: Config) -> Result<(), BoxError> {
    let debug = config.server.debug;
    app.set_debug(debug);

    if let Some(ref dir) = config.server.error_pages_dir {
        app.set_error_pages(ErrorPages::from_directory(dir));
    }
    if config.server.access_log {
        app.hook(AccessLog::new());
    }

    config.log_summary();

    // Single-threaded runtime; workers are accept loops sharing it
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let app = Arc::new(app);
    if debug {
        let server = Server::bind(config.server, wrap(DebugMiddleware, app))?;
        runtime.block_on(serve(server))
    } else {
        let server = Server::bind(config.server, app)?;
        runtime.block_on(serve(server))
    }
}

async fn serve<A: Application>(server: Server<A>) -> Result<(), BoxError> {
    info!(" * Running on http://{}/", server.local_addr());

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, draining connections");
        }
    }

    server.trigger_shutdown();
    if server.wait_for_drain(server.drain_timeout()).await {
        info!("All connections drained");
    }
    Ok(())
}
