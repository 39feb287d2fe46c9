//! Core types shared by the bridge, the lifecycle and handlers:
//!
//! - [`Request`] - inbound request with collected body
//! - [`Response`] / [`Body`] - response with fixed or streamed body
//! - [`ResponseHead`] - frozen status line and headers
//! - [`Reply`] - what handlers return before `make_response`
//! - [`RequestContext`] - per-request state passed explicitly to handlers
//! - [`Error`] - core error type
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_wsgi::core::{RequestContext, Result};
//!
//! fn hello(ctx: &mut RequestContext) -> Result<&'static str> {
//!     ctx.set_response_header("X-Custom", "value");
//!     Ok("Hello, World!")
//! }
//! ```

mod context;
mod error;
mod reply;
mod request;
mod response;

pub use context::{generate_span_id, generate_trace_id, HttpVersion, RequestContext};
pub use error::{Error, Result};
pub use reply::Reply;
pub use request::{Request, RequestHead};
pub use response::{Body, ChunkIter, ChunkStream, Response, ResponseBuilder, ResponseHead};
