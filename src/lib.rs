//! tokio_wsgi - synchronous request handlers on an async HTTP and WebSocket server.
//!
//! Handlers are written against a plain request/response contract and may
//! suspend: a handler returns an [`Outcome`](bridge::Outcome) that is either
//! done, a plain chunk generator, or a future to be awaited. The bridge
//! drives it on the tokio runtime and the emitter streams the result
//! through hyper. Requests carrying a WebSocket upgrade switch the
//! connection mode first and hand the handler a [`WebSocket`](websocket::WebSocket).
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_wsgi::app::{plain, websocket};
//! use tokio_wsgi::{App, Config};
//!
//! let mut app = App::new();
//! app.route("/", plain(|_| Ok("Hello, World!")));
//! tokio_wsgi::run_with_config(app, Config::from_env()?)?;
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (8 chars) with optional "-dirty" suffix
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc12345)" or "0.1.0 (abc12345-dirty)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod app;
pub mod application;
pub mod bridge;
pub mod config;
pub mod core;
pub mod emit;
pub mod gateway;
pub mod hooks;
pub mod logging;
pub mod middleware;
pub mod protocol;
pub mod server;
pub mod websocket;

// Re-exports for convenience
pub use app::App;
pub use application::{Application, Environ};
pub use config::Config;
pub use server::{run, run_with_config, Server};
