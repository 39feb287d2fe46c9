//! Drives suspend-capable handler results to completion.
//!
//! Every producer tags its result explicitly:
//!
//! - [`Outcome::Done`] carries the final value
//! - [`Outcome::Chunks`] is a plain synchronous generator, consumed later
//!   without any further suspension
//! - [`Outcome::Suspend`] is a future whose output is another `Outcome`
//!
//! The exception case is the `Err` arm of the surrounding `Result` and is
//! never handled here: [`drive`] hands it back unchanged.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tracing::trace;

use crate::core::{ChunkIter, Reply, Response, Result};

/// Result of invoking a handler or an application.
pub enum Outcome<T> {
    Done(T),
    Chunks(ChunkIter),
    Suspend(BoxFuture<'static, Result<Outcome<T>>>),
}

/// What a handler returns.
pub type HandlerOutcome = Outcome<Reply>;

/// A fully resolved [`Outcome`].
pub enum Driven<T> {
    Value(T),
    Chunks(ChunkIter),
}

impl<T> Outcome<T> {
    /// Suspend on `fut`, continuing with whatever it resolves to.
    pub fn suspend<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Outcome<T>>> + Send + 'static,
    {
        Outcome::Suspend(Box::pin(fut))
    }

    /// Plain generator output.
    pub fn chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        I::IntoIter: Send + 'static,
        B: Into<Bytes> + 'static,
    {
        Outcome::Chunks(Box::new(chunks.into_iter().map(Into::into)))
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        matches!(self, Outcome::Suspend(_))
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done(v) => f.debug_tuple("Done").field(v).finish(),
            Outcome::Chunks(_) => f.write_str("Chunks(..)"),
            Outcome::Suspend(_) => f.write_str("Suspend(..)"),
        }
    }
}

/// Run `outcome` until it is either a final value or a plain generator.
///
/// Each `Suspend` is awaited on the caller's task, so control returns to
/// the scheduler at every suspension point. Errors propagate unchanged.
pub async fn drive<T>(mut outcome: Outcome<T>) -> Result<Driven<T>> {
    let mut suspensions = 0usize;
    loop {
        match outcome {
            Outcome::Done(value) => return Ok(Driven::Value(value)),
            Outcome::Chunks(iter) => return Ok(Driven::Chunks(iter)),
            Outcome::Suspend(fut) => {
                suspensions += 1;
                trace!(suspensions, "awaiting suspended computation");
                outcome = fut.await?;
            }
        }
    }
}

impl Driven<Reply> {
    /// Plain generator output becomes a streamed 200 response.
    pub fn into_reply(self) -> Reply {
        match self {
            Driven::Value(reply) => reply,
            Driven::Chunks(iter) => Reply::Response(Response::streaming(iter)),
        }
    }
}

impl From<Reply> for HandlerOutcome {
    fn from(reply: Reply) -> Self {
        Outcome::Done(reply)
    }
}

impl From<&'static str> for HandlerOutcome {
    fn from(s: &'static str) -> Self {
        Outcome::Done(s.into())
    }
}

impl From<String> for HandlerOutcome {
    fn from(s: String) -> Self {
        Outcome::Done(s.into())
    }
}

impl From<Bytes> for HandlerOutcome {
    fn from(b: Bytes) -> Self {
        Outcome::Done(b.into())
    }
}

impl From<Response> for HandlerOutcome {
    fn from(r: Response) -> Self {
        Outcome::Done(r.into())
    }
}

impl From<(&'static str, http::StatusCode)> for HandlerOutcome {
    fn from(pair: (&'static str, http::StatusCode)) -> Self {
        Outcome::Done(pair.into())
    }
}

impl From<(String, http::StatusCode)> for HandlerOutcome {
    fn from(pair: (String, http::StatusCode)) -> Self {
        Outcome::Done(pair.into())
    }
}

impl From<()> for HandlerOutcome {
    fn from(_: ()) -> Self {
        Outcome::Done(Reply::Empty)
    }
}
