//! Integration tests for tokio_wsgi
//!
//! Each test starts the server in-process on an ephemeral port and talks
//! to it over real sockets: reqwest for HTTP, tokio-tungstenite for
//! WebSocket connections.
//!
//! Run with: cargo test --test integration

mod helpers;

mod debug_mode;
mod error_pages;
mod http_basic;
mod websocket;
