//! Streaming response delivery.
//!
//! [`emit`] forwards a [`Payload`] to a [`Transport`] chunk by chunk:
//! the head goes out lazily right before the first chunk (or at end of
//! stream for empty bodies), chunks keep their production order, and
//! `write_eof` is called exactly once. The payload's release closure
//! always runs afterwards, on success, on failure and when the emitting
//! future is dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{error, warn};

use crate::core::{Body, Error, ResponseHead, Result};
use crate::websocket::Mode;

/// Write side of one response, owned by a single request cycle.
#[async_trait]
pub trait Transport: Send {
    /// Send the status line and headers.
    async fn start(&mut self, head: ResponseHead) -> Result<()>;

    /// Send one body chunk.
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Finish the body.
    async fn write_eof(&mut self) -> Result<()>;

    /// Answer an upgrade request. The default sends `head` with an empty body.
    async fn handshake(&mut self, head: ResponseHead) -> Result<()> {
        self.start(head).await?;
        self.write_eof().await
    }
}

/// Transport used once a connection has switched to WebSocket mode.
/// The application talks through the channel, so HTTP output is dropped.
struct Detached;

#[async_trait]
impl Transport for Detached {
    async fn start(&mut self, _head: ResponseHead) -> Result<()> {
        Ok(())
    }

    async fn write(&mut self, _chunk: Bytes) -> Result<()> {
        Ok(())
    }

    async fn write_eof(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct StartState {
    mode: Mode,
    head: Option<ResponseHead>,
    sent: bool,
}

/// Response-start callback handed to an [`Application`](crate::Application).
///
/// Records the head until emission begins. Cloning shares the same state.
/// In [`Mode::Upgraded`] every call is a no-op.
#[derive(Clone, Default)]
pub struct StartResponse {
    state: Arc<Mutex<StartState>>,
}

impl StartResponse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the response head. May be called again to replace it until
    /// the head has been sent.
    pub fn start(&self, head: ResponseHead) -> Result<()> {
        let mut state = self.lock();
        match state.mode {
            Mode::Upgraded => Ok(()),
            Mode::Http if state.sent => Err(Error::InvalidResponse(
                "response head already sent".into(),
            )),
            Mode::Http => {
                state.head = Some(head);
                Ok(())
            }
        }
    }

    /// Switch to WebSocket mode. Allowed once, before any head is recorded.
    pub fn upgrade(&self) -> Result<()> {
        let mut state = self.lock();
        if state.mode == Mode::Upgraded {
            return Err(Error::InvalidResponse("connection already upgraded".into()));
        }
        if state.head.is_some() || state.sent {
            return Err(Error::InvalidResponse(
                "cannot upgrade after the response was started".into(),
            ));
        }
        state.mode = Mode::Upgraded;
        Ok(())
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    #[inline]
    pub fn is_upgraded(&self) -> bool {
        self.mode() == Mode::Upgraded
    }

    #[inline]
    pub fn head_sent(&self) -> bool {
        self.lock().sent
    }

    /// Status of the recorded head, if any.
    pub fn status(&self) -> Option<http::StatusCode> {
        self.lock().head.as_ref().map(|h| h.status)
    }

    /// A fresh handle in the same mode, used to capture a nested
    /// application's head before replaying it.
    pub(crate) fn fork(&self) -> StartResponse {
        let mode = self.mode();
        StartResponse {
            state: Arc::new(Mutex::new(StartState {
                mode,
                ..StartState::default()
            })),
        }
    }

    /// Take the recorded head without sending it.
    pub(crate) fn take_recorded(&self) -> Option<ResponseHead> {
        self.lock().head.take()
    }

    /// Mark the head as sent and hand it out.
    fn begin(&self) -> Result<ResponseHead> {
        let mut state = self.lock();
        if state.sent {
            return Err(Error::InvalidResponse("response head already sent".into()));
        }
        let head = state.head.take().ok_or_else(|| {
            Error::InvalidResponse("output produced before the response was started".into())
        })?;
        state.sent = true;
        Ok(head)
    }
}

impl fmt::Debug for StartResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("StartResponse")
            .field("mode", &state.mode)
            .field("head", &state.head)
            .field("sent", &state.sent)
            .finish()
    }
}

/// Runs after emission with the emission error, if any.
pub type Release = Box<dyn FnOnce(Option<&Error>) -> Result<()> + Send>;

/// Body produced by an application, plus its release operation.
pub struct Payload {
    body: Body,
    release: Option<Release>,
}

impl Payload {
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            release: None,
        }
    }

    /// Attach a release operation, chained after any existing one.
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce(Option<&Error>) -> Result<()> + Send + 'static,
    {
        let chained: Release = match self.release.take() {
            None => Box::new(release),
            Some(previous) => Box::new(move |err: Option<&Error>| {
                let first = release(err);
                let second = previous(err);
                first.and(second)
            }),
        };
        self.release = Some(chained);
        self
    }

    #[inline]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Split into body and release. The caller takes over the release duty.
    pub fn into_parts(mut self) -> (Body, Option<Release>) {
        (std::mem::take(&mut self.body), self.release.take())
    }
}

impl From<Body> for Payload {
    fn from(body: Body) -> Self {
        Payload::new(body)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("body", &self.body)
            .field("release", &self.release.is_some())
            .finish()
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            let dropped = Error::Transport("response dropped before emission".into());
            if let Err(e) = release(Some(&dropped)) {
                error!(error = %e, "release failed for an unsent response");
            }
        }
    }
}

/// Runs a release exactly once, even if the owning future is cancelled.
struct ReleaseGuard(Option<Release>);

impl ReleaseGuard {
    fn release(mut self, err: Option<&Error>) -> Result<()> {
        match self.0.take() {
            Some(release) => release(err),
            None => Ok(()),
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            let cancelled = Error::Transport("emission cancelled".into());
            if let Err(e) = release(Some(&cancelled)) {
                error!(error = %e, "release failed after cancelled emission");
            }
        }
    }
}

/// Deliver `payload` through `transport`.
///
/// A release failure is returned when emission itself succeeded; when
/// both fail the emission error wins and the release error is logged.
pub async fn emit<T>(payload: Payload, start: &StartResponse, transport: &mut T) -> Result<()>
where
    T: Transport + ?Sized,
{
    let (body, release) = payload.into_parts();
    let guard = ReleaseGuard(release);

    let result = if start.is_upgraded() {
        write_body(body, start, &mut Detached).await
    } else {
        write_body(body, start, transport).await
    };

    let released = guard.release(result.as_ref().err());
    match (result, released) {
        (Err(e), Err(release_err)) => {
            warn!(error = %release_err, "release failed after emission error");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), released) => released,
    }
}

async fn write_body<T>(body: Body, start: &StartResponse, transport: &mut T) -> Result<()>
where
    T: Transport + ?Sized,
{
    let mut out = Emitter {
        start,
        transport,
        head_sent: false,
    };

    match body {
        Body::Full(bytes) => {
            if !bytes.is_empty() {
                out.write(bytes).await?;
            }
        }
        Body::Iter(chunks) => {
            for chunk in chunks {
                out.write(chunk).await?;
            }
        }
        Body::Stream(mut chunks) => {
            while let Some(chunk) = chunks.next().await {
                out.write(chunk?).await?;
            }
        }
    }

    out.finish().await
}

struct Emitter<'a, T: ?Sized> {
    start: &'a StartResponse,
    transport: &'a mut T,
    head_sent: bool,
}

impl<T: Transport + ?Sized> Emitter<'_, T> {
    async fn ensure_head(&mut self) -> Result<()> {
        if !self.head_sent {
            if !self.start.is_upgraded() {
                let head = self.start.begin()?;
                self.transport.start(head).await?;
            }
            self.head_sent = true;
        }
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.ensure_head().await?;
        self.transport.write(chunk).await
    }

    async fn finish(mut self) -> Result<()> {
        self.ensure_head().await?;
        self.transport.write_eof().await
    }
}
