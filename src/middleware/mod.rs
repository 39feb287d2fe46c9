//! Synchronous middleware around an application.
//!
//! A [`SyncMiddleware`] sees the wrapped application as a blocking call
//! that hands back a finished response: it may inspect or replace the
//! response head and transform the body chunks. [`wrap`] runs the real
//! application asynchronously first, so nothing blocks the event loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_wsgi::middleware::{wrap, ChunkResults, Inner, SyncMiddleware};
//!
//! struct Shout;
//!
//! impl SyncMiddleware for Shout {
//!     fn name(&self) -> &'static str { "shout" }
//!
//!     fn call(&self, _req: &RequestHead, _start: &StartResponse, inner: Inner) -> Result<ChunkResults> {
//!         let frames = inner.call()?;
//!         Ok(Box::new(frames.map(|chunk| chunk.map(|b| b.to_ascii_uppercase().into()))))
//!     }
//! }
//!
//! let app = wrap(Shout, Arc::new(app));
//! ```

pub mod adapter;
pub mod debug;

pub use adapter::{wrap, Frame, Frames, Inner, Wrapped};
pub use debug::DebugMiddleware;

use bytes::Bytes;

use crate::core::{RequestHead, Result};
use crate::emit::StartResponse;

/// Body chunks produced by a middleware. An `Err` item aborts the response.
pub type ChunkResults = Box<dyn Iterator<Item = Result<Bytes>> + Send>;

pub trait SyncMiddleware: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Produce the response for one request.
    ///
    /// `start` is the caller's response-start handle. Calling
    /// [`Inner::call`] replays the wrapped application's head into it;
    /// [`Inner::call_with`] hands the head to the middleware instead.
    fn call(&self, request: &RequestHead, start: &StartResponse, inner: Inner) -> Result<ChunkResults>;
}
