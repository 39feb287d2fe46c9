//! Per-connection HTTP handling.
//!
//! Each request is turned into an [`Environ`] and run through
//! [`gateway::handle`] in its own task, so the service future only waits
//! for the response head and hyper streams the body as it is produced.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming as IncomingBody;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

use super::streaming::{plain_response, StreamingResponse};
use super::transport::HyperTransport;
use crate::application::{Application, Environ};
use crate::core::{Error, Request};
use crate::gateway::{self, PendingUpgrade};
use crate::protocol;
use crate::websocket::Io;

/// Check if an error is a common connection reset or timeout.
#[inline]
fn is_connection_error(err_str: &str) -> bool {
    err_str.contains("connection reset")
        || err_str.contains("broken pipe")
        || err_str.contains("Connection reset")
        || err_str.contains("os error 104")
        || err_str.contains("os error 32")
        || err_str.contains("timed out")
        || err_str.contains("deadline has elapsed")
        || err_str.contains("HeaderTimeout")
}

/// Connection handler context, shared by all connections of one worker.
pub struct ConnectionContext<A: Application> {
    pub app: Arc<A>,
    pub active_connections: Arc<AtomicUsize>,
    /// Header read timeout (HEADER_TIMEOUT_SECS); zero disables it.
    pub header_timeout: Duration,
    /// Body chunks buffered per response (STREAM_BUFFER).
    pub stream_buffer: usize,
}

impl<A: Application> ConnectionContext<A> {
    /// Serve one accepted TCP connection until the client goes away.
    pub async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote_addr: SocketAddr) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);

        let ctx = Arc::clone(&self);
        let service = service_fn(move |req| {
            let ctx = Arc::clone(&ctx);
            async move { ctx.handle_request(req, remote_addr).await }
        });

        let header_timeout = (!self.header_timeout.is_zero()).then_some(self.header_timeout);

        let io = TokioIo::new(stream);
        if let Err(err) = auto::Builder::new(TokioExecutor::new())
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(header_timeout)
            .keep_alive(true)
            .serve_connection_with_upgrades(io, service)
            .await
        {
            let err_str = format!("{:?}", err);
            if !is_connection_error(&err_str) {
                debug!("Connection error: {:?}", err);
            }
        }

        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    async fn handle_request(
        &self,
        mut req: hyper::Request<IncomingBody>,
        remote_addr: SocketAddr,
    ) -> Result<StreamingResponse, Infallible> {
        let key = protocol::is_upgrade_request(req.headers())
            .then(|| protocol::handshake_key(req.headers()).map(str::to_owned))
            .flatten();
        let on_upgrade = key.as_ref().map(|_| hyper::upgrade::on(&mut req));

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(error = %e, "failed to read request body");
                return Ok(plain_response(StatusCode::BAD_REQUEST, "Bad Request"));
            }
        };

        let request =
            Request::from(hyper::Request::from_parts(parts, body)).with_remote_addr(remote_addr);

        let upgrade = key.zip(on_upgrade).map(|(key, on_upgrade)| {
            PendingUpgrade::new(key, async move {
                let upgraded = on_upgrade
                    .await
                    .map_err(|e| Error::Transport(format!("upgrade failed: {}", e)))?;
                let io: Box<dyn Io> = Box::new(TokioIo::new(upgraded));
                Ok(io)
            })
        });

        let (mut transport, head_rx) = HyperTransport::new(self.stream_buffer);
        let app = Arc::clone(&self.app);
        let environ = Environ::new(request);

        tokio::spawn(async move {
            match gateway::handle(app.as_ref(), environ, upgrade, &mut transport).await {
                Ok(()) => {}
                Err(e) if transport.head_sent() => {
                    warn!(error = %e, "response aborted after the head was sent");
                    transport.abort(e).await;
                }
                Err(e) => {
                    error!(error = %e, "request failed before a response was started");
                }
            }
        });

        match head_rx.await {
            Ok(response) => Ok(response),
            Err(_) => Ok(plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            )),
        }
    }
}
