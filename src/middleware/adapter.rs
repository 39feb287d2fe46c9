//! Runs a synchronous middleware over an asynchronous application.
//!
//! The wrapped application is driven to completion first. Its output is
//! pushed onto a channel as [`Frame::Chunk`]s followed by exactly one
//! [`Frame::End`], its recorded head is kept aside, and only then does
//! the middleware run. The middleware reads the frames through a plain
//! iterator, so from its point of view the inner call never blocks.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use super::{ChunkResults, SyncMiddleware};
use crate::application::{Application, Environ};
use crate::bridge::Outcome;
use crate::core::{Body, Error, ResponseHead, Result};
use crate::emit::{Payload, Release, StartResponse};
use crate::gateway::call_application;

/// One unit of the wrapped application's output.
#[derive(Debug)]
pub enum Frame {
    Chunk(Bytes),
    /// Sent exactly once, after the last chunk.
    End(Result<()>),
}

/// The wrapped application as seen by a middleware.
pub struct Inner {
    start: StartResponse,
    head: Option<ResponseHead>,
    frames: UnboundedReceiver<Frame>,
}

impl Inner {
    /// Head recorded by the wrapped application, if it started one.
    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    /// Replay the wrapped application's head into the caller's
    /// response-start and return its body.
    pub fn call(self) -> Result<Frames> {
        let start = self.start.clone();
        self.call_with(move |head| start.start(head))
    }

    /// Like [`Inner::call`], but hand the head to `start` instead.
    ///
    /// Fails with the wrapped application's error when it failed before
    /// starting a response.
    pub fn call_with<F>(mut self, start: F) -> Result<Frames>
    where
        F: FnOnce(ResponseHead) -> Result<()>,
    {
        match self.head.take() {
            Some(head) => start(head)?,
            None if self.start.is_upgraded() => {}
            None => {
                return match self.frames.try_recv() {
                    Ok(Frame::End(Err(e))) => Err(e),
                    _ => Err(Error::InvalidResponse(
                        "wrapped application did not start a response".into(),
                    )),
                };
            }
        }

        Ok(Frames {
            rx: self.frames,
            done: false,
        })
    }
}

/// Body of the wrapped application, in production order.
pub struct Frames {
    rx: UnboundedReceiver<Frame>,
    done: bool,
}

impl Iterator for Frames {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.rx.try_recv() {
            Ok(Frame::Chunk(chunk)) => Some(Ok(chunk)),
            Ok(Frame::End(Err(e))) => {
                self.done = true;
                Some(Err(e))
            }
            Ok(Frame::End(Ok(()))) | Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

/// Application produced by [`wrap`].
pub struct Wrapped<M, A> {
    middleware: Arc<M>,
    app: Arc<A>,
}

/// Put `middleware` in front of `app`.
pub fn wrap<M, A>(middleware: M, app: A) -> Wrapped<M, A>
where
    M: SyncMiddleware,
    A: Application,
{
    Wrapped {
        middleware: Arc::new(middleware),
        app: Arc::new(app),
    }
}

impl<M, A> Wrapped<M, A> {
    pub fn middleware(&self) -> &M {
        &self.middleware
    }

    pub fn inner(&self) -> &A {
        &self.app
    }
}

impl<M, A> Application for Wrapped<M, A>
where
    M: SyncMiddleware,
    A: Application,
{
    fn call(&self, environ: Environ, start: StartResponse) -> Result<Outcome<Payload>> {
        let middleware = Arc::clone(&self.middleware);
        let app = Arc::clone(&self.app);

        Ok(Outcome::suspend(async move {
            let request = environ.request().head();
            let inner_start = start.fork();
            let (tx, rx) = mpsc::unbounded_channel();

            let release = run_inner(app.as_ref(), environ, inner_start.clone(), &tx).await;
            drop(tx);

            let inner = Inner {
                start: start.clone(),
                head: inner_start.take_recorded(),
                frames: rx,
            };

            debug!(middleware = middleware.name(), "running middleware");
            match middleware.call(&request, &start, inner) {
                Ok(output) => {
                    let mut payload = Payload::new(Body::stream(stream::iter(output)));
                    if let Some(release) = release {
                        payload = payload.with_release(release);
                    }
                    Ok(Outcome::Done(payload))
                }
                Err(err) => {
                    if let Some(release) = release {
                        if let Err(e) = release(Some(&err)) {
                            warn!(error = %e, "release failed after middleware error");
                        }
                    }
                    Err(err)
                }
            }
        }))
    }
}

/// Drive the wrapped application and push its output as frames.
///
/// Returns the payload's release when it is still pending. When the
/// body fails midway the release runs right away with that error.
async fn run_inner<A>(app: &A, environ: Environ, start: StartResponse, tx: &UnboundedSender<Frame>) -> Option<Release>
where
    A: Application + ?Sized,
{
    let payload = match call_application(app, environ, start).await {
        Ok(payload) => payload,
        Err(e) => {
            let _ = tx.send(Frame::End(Err(e)));
            return None;
        }
    };

    let (body, release) = payload.into_parts();
    match pump(body, tx).await {
        Ok(()) => {
            let _ = tx.send(Frame::End(Ok(())));
            release
        }
        Err(e) => {
            if let Some(release) = release {
                if let Err(release_err) = release(Some(&e)) {
                    warn!(error = %release_err, "release failed after body error");
                }
            }
            let _ = tx.send(Frame::End(Err(e)));
            None
        }
    }
}

async fn pump(body: Body, tx: &UnboundedSender<Frame>) -> Result<()> {
    let send = |chunk: Bytes| {
        tx.send(Frame::Chunk(chunk))
            .map_err(|_| Error::Transport("middleware output channel closed".into()))
    };

    match body {
        Body::Full(bytes) => {
            if !bytes.is_empty() {
                send(bytes)?;
            }
        }
        Body::Iter(chunks) => {
            for chunk in chunks {
                send(chunk)?;
            }
        }
        Body::Stream(mut chunks) => {
            while let Some(chunk) = chunks.next().await {
                send(chunk?)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::application_fn;
    use crate::core::{Request, RequestHead};
    use crate::emit::testing::{Event, RecordingTransport};
    use crate::gateway;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper;

    impl SyncMiddleware for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn call(&self, _request: &RequestHead, _start: &StartResponse, inner: Inner) -> Result<ChunkResults> {
            let frames = inner.call()?;
            Ok(Box::new(frames.map(|chunk| chunk.map(|b| Bytes::from(b.to_ascii_uppercase())))))
        }
    }

    struct Restatus;

    impl SyncMiddleware for Restatus {
        fn name(&self) -> &'static str {
            "restatus"
        }

        fn call(&self, _request: &RequestHead, start: &StartResponse, inner: Inner) -> Result<ChunkResults> {
            let frames = inner.call_with(|head| start.start(ResponseHead { status: StatusCode::ACCEPTED, ..head }))?;
            Ok(Box::new(frames))
        }
    }

    fn streaming_app() -> impl Application {
        application_fn(|_, start| {
            Ok(Outcome::suspend(async move {
                tokio::task::yield_now().await;
                start.start(ResponseHead::new(StatusCode::OK))?;
                Ok(Outcome::chunks(vec!["Hello, ", "World!"]))
            }))
        })
    }

    #[tokio::test]
    async fn test_middleware_sees_completed_inner_output() {
        let app = wrap(Upper, streaming_app());
        let mut transport = RecordingTransport::new();

        gateway::handle(&app, Environ::new(Request::get("/")), None, &mut transport)
            .await
            .unwrap();
        assert_eq!(transport.status(), Some(StatusCode::OK));
        assert_eq!(transport.body(), "HELLO, WORLD!");
        assert_eq!(transport.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_middleware_can_replace_head() {
        let app = wrap(Restatus, streaming_app());
        let mut transport = RecordingTransport::new();

        gateway::handle(&app, Environ::new(Request::get("/")), None, &mut transport)
            .await
            .unwrap();
        assert_eq!(transport.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(transport.body(), "Hello, World!");
    }

    #[tokio::test]
    async fn test_inner_failure_surfaces_through_inner_call() {
        let app = wrap(Upper, application_fn(|_, _| Err(Error::from("inner broke"))));
        let mut transport = RecordingTransport::new();

        let err = gateway::handle(&app, Environ::new(Request::get("/")), None, &mut transport)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "inner broke");
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn test_inner_release_runs_after_outer_emission() {
        let released = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&released);
        let inner = application_fn(move |_, start| {
            start.start(ResponseHead::new(StatusCode::OK))?;
            let r = Arc::clone(&r);
            Ok(Outcome::Done(Payload::new("body").with_release(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })))
        });
        let app = wrap(Upper, inner);

        let start = StartResponse::new();
        let outcome = app.call(Environ::new(Request::get("/")), start.clone()).unwrap();
        let payload = match crate::bridge::drive(outcome).await.unwrap() {
            crate::bridge::Driven::Value(payload) => payload,
            crate::bridge::Driven::Chunks(_) => panic!("expected a payload"),
        };
        assert_eq!(released.load(Ordering::SeqCst), 0);

        let mut transport = RecordingTransport::new();
        crate::emit::emit(payload, &start, &mut transport).await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(transport.events().last(), Some(&Event::Eof));
        assert_eq!(transport.body(), "BODY");
    }

    #[test]
    fn test_frames_stop_after_end() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Frame::Chunk(Bytes::from("a"))).unwrap();
        tx.send(Frame::End(Err(Error::from("cut")))).unwrap();
        tx.send(Frame::Chunk(Bytes::from("ignored"))).unwrap();

        let mut frames = Frames { rx, done: false };
        assert_eq!(frames.next().unwrap().unwrap(), Bytes::from("a"));
        assert_eq!(frames.next().unwrap().unwrap_err().to_string(), "cut");
        assert!(frames.next().is_none());
    }
}
