//! One request cycle between a transport and an application.
//!
//! The transport side hands over the request and, for upgrade requests,
//! a pending raw connection. [`handle`] answers the handshake, switches
//! the connection mode, drives the application through the bridge and
//! emits its payload.

use std::fmt;
use std::future::Future;

use tracing::debug;

use crate::application::{Application, Environ};
use crate::bridge::{drive, Driven};
use crate::core::{Body, Result};
use crate::emit::{emit, Payload, StartResponse, Transport};
use crate::protocol;
use crate::websocket::{Io, UpgradeFuture, WebSocket};

/// Upgrade requested by the client, not yet answered.
pub struct PendingUpgrade {
    key: String,
    io: UpgradeFuture,
}

impl PendingUpgrade {
    /// `key` is the client's `Sec-WebSocket-Key`; `io` resolves to the raw
    /// connection after the 101 response has been written.
    pub fn new<F>(key: impl Into<String>, io: F) -> Self
    where
        F: Future<Output = Result<Box<dyn Io>>> + Send + 'static,
    {
        Self {
            key: key.into(),
            io: Box::pin(io),
        }
    }
}

impl fmt::Debug for PendingUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUpgrade")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Run `app` for one request and deliver its output through `transport`.
///
/// Errors escaping the application are returned untouched; whether a
/// response head went out before the failure can be checked on the
/// transport side.
pub async fn handle<A, T>(
    app: &A,
    mut environ: Environ,
    upgrade: Option<PendingUpgrade>,
    transport: &mut T,
) -> Result<()>
where
    A: Application + ?Sized,
    T: Transport + ?Sized,
{
    let start = StartResponse::new();

    if let Some(PendingUpgrade { key, io }) = upgrade {
        transport.handshake(protocol::switching_protocols(&key)).await?;
        start.upgrade()?;
        environ = environ.with_websocket(WebSocket::pending(io));
        debug!(path = environ.request().path(), "connection switched to websocket");
    }

    let payload = call_application(app, environ, start.clone()).await?;
    emit(payload, &start, transport).await
}

/// Call `app` and drive its outcome to a payload. Plain generator output
/// becomes an iterator body.
pub(crate) async fn call_application<A>(app: &A, environ: Environ, start: StartResponse) -> Result<Payload>
where
    A: Application + ?Sized,
{
    let outcome = app.call(environ, start)?;
    Ok(match drive(outcome).await? {
        Driven::Value(payload) => payload,
        Driven::Chunks(chunks) => Payload::new(Body::Iter(chunks)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::application_fn;
    use crate::bridge::Outcome;
    use crate::core::{Error, Request, ResponseHead};
    use crate::emit::testing::{Event, RecordingTransport};
    use http::StatusCode;

    #[tokio::test]
    async fn test_plain_generator_application() {
        let app = application_fn(|_, start| {
            start.start(ResponseHead::new(StatusCode::OK))?;
            Ok(Outcome::chunks(vec!["Hello, ", "World!"]))
        });
        let mut transport = RecordingTransport::new();

        handle(&app, Environ::new(Request::get("/stream")), None, &mut transport)
            .await
            .unwrap();

        assert_eq!(transport.status(), Some(StatusCode::OK));
        assert_eq!(transport.writes().len(), 2);
        assert_eq!(transport.body(), "Hello, World!");
    }

    #[tokio::test]
    async fn test_suspended_application_payload() {
        let app = application_fn(|_, start| {
            Ok(Outcome::suspend(async move {
                tokio::task::yield_now().await;
                start.start(ResponseHead::new(StatusCode::CREATED))?;
                Ok(Outcome::Done(Payload::new("later")))
            }))
        });
        let mut transport = RecordingTransport::new();

        handle(&app, Environ::new(Request::get("/")), None, &mut transport)
            .await
            .unwrap();
        assert_eq!(transport.status(), Some(StatusCode::CREATED));
        assert_eq!(transport.body(), "later");
    }

    #[tokio::test]
    async fn test_application_error_before_start() {
        let app = application_fn(|_, _| Err(Error::from("exploded")));
        let mut transport = RecordingTransport::new();

        let err = handle(&app, Environ::new(Request::get("/")), None, &mut transport)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "exploded");
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_sends_handshake_and_injects_channel() {
        let app = application_fn(|environ, start| {
            assert!(environ.is_websocket());
            assert!(start.is_upgraded());
            start.start(ResponseHead::new(StatusCode::OK))?;
            Ok(Outcome::Done(Payload::new("Done")))
        });
        let mut transport = RecordingTransport::new();
        let (server_io, _client_io) = tokio::io::duplex(64);
        let upgrade = PendingUpgrade::new("dGhlIHNhbXBsZSBub25jZQ==", async move {
            let io: Box<dyn Io> = Box::new(server_io);
            Ok(io)
        });

        handle(&app, Environ::new(Request::get("/echo")), Some(upgrade), &mut transport)
            .await
            .unwrap();

        // only the handshake reaches the transport
        assert_eq!(
            transport.events(),
            vec![Event::Handshake(StatusCode::SWITCHING_PROTOCOLS)]
        );
        assert_eq!(
            transport.head().unwrap().header("sec-websocket-accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }
}
