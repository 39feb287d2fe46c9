//! Route handlers.
//!
//! A [`Handler`] turns the request context into a [`HandlerOutcome`].
//! Three adapters cover the usual shapes:
//!
//! - [`plain`] for synchronous functions returning anything convertible
//!   into an outcome (a body, `(body, status)`, a [`Response`] or an
//!   explicit [`Outcome`])
//! - [`asynchronous`] for functions returning a boxed future that may
//!   borrow the context
//! - [`websocket`] for handlers that only make sense on an upgraded
//!   connection

use std::marker::PhantomData;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use http::StatusCode;

use crate::bridge::{drive, HandlerOutcome, Outcome};
use crate::core::{Error, Reply, RequestContext, Result};

#[cfg(doc)]
use crate::core::Response;

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: &mut RequestContext) -> Result<HandlerOutcome>;
}

/// Synchronous handler.
pub struct Plain<F, R> {
    f: F,
    _marker: PhantomData<fn() -> R>,
}

pub fn plain<F, R>(f: F) -> Plain<F, R>
where
    F: Fn(&mut RequestContext) -> Result<R> + Send + Sync + 'static,
    R: Into<HandlerOutcome> + 'static,
{
    Plain {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, R> Handler for Plain<F, R>
where
    F: Fn(&mut RequestContext) -> Result<R> + Send + Sync + 'static,
    R: Into<HandlerOutcome> + 'static,
{
    async fn call(&self, ctx: &mut RequestContext) -> Result<HandlerOutcome> {
        (self.f)(ctx).map(Into::into)
    }
}

/// Handler backed by an async function.
pub struct Async<F>(F);

/// Wrap a function returning a boxed future:
///
/// ```rust,ignore
/// app.route("/late", asynchronous(|ctx| Box::pin(async move {
///     tokio::time::sleep(Duration::from_millis(10)).await;
///     Ok(format!("late {}", ctx.request().path()).into())
/// })));
/// ```
pub fn asynchronous<F>(f: F) -> Async<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<HandlerOutcome>>
        + Send
        + Sync
        + 'static,
{
    Async(f)
}

#[async_trait]
impl<F> Handler for Async<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<HandlerOutcome>>
        + Send
        + Sync
        + 'static,
{
    async fn call(&self, ctx: &mut RequestContext) -> Result<HandlerOutcome> {
        (self.0)(ctx).await
    }
}

/// Handler accepting only upgraded connections.
///
/// Plain requests abort with the failure status (400 unless configured).
/// On a WebSocket the inner handler runs to completion and the route
/// answers `("Done", 200)`, which the upgraded connection discards.
pub struct WebSocketRoute<H> {
    inner: H,
    failure_status: StatusCode,
}

pub fn websocket<H: Handler>(inner: H) -> WebSocketRoute<H> {
    websocket_with_status(inner, StatusCode::BAD_REQUEST)
}

pub fn websocket_with_status<H: Handler>(inner: H, failure_status: StatusCode) -> WebSocketRoute<H> {
    WebSocketRoute {
        inner,
        failure_status,
    }
}

impl<H> WebSocketRoute<H> {
    pub fn failure_status(&self) -> StatusCode {
        self.failure_status
    }
}

#[async_trait]
impl<H: Handler> Handler for WebSocketRoute<H> {
    async fn call(&self, ctx: &mut RequestContext) -> Result<HandlerOutcome> {
        if !ctx.is_websocket() {
            return Err(Error::abort(self.failure_status));
        }

        let outcome = self.inner.call(ctx).await?;
        drive(outcome).await?;
        Ok(Outcome::Done(Reply::from(("Done", StatusCode::OK))))
    }
}
