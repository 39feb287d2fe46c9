//! HTTP response abstraction produced by handlers and hooks.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};

use super::{Error, Result};

/// Pre-allocated static header values for common content types.
mod content_types {
    use super::*;
    pub static TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");
    pub static TEXT_HTML: HeaderValue = HeaderValue::from_static("text/html; charset=utf-8");
    pub static APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");
}

/// Pre-allocated static bodies for common responses.
mod static_bodies {
    use super::*;
    pub static NOT_FOUND: Bytes = Bytes::from_static(b"Not Found");
    pub static INTERNAL_ERROR: Bytes = Bytes::from_static(b"Internal Server Error");
}

/// Lazy synchronous chunk source (a plain generator).
pub type ChunkIter = Box<dyn Iterator<Item = Bytes> + Send>;

/// Asynchronously produced chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Body source of a response.
pub enum Body {
    /// Fixed byte sequence.
    Full(Bytes),
    /// Chunks pulled synchronously, one write each.
    Iter(ChunkIter),
    /// Chunks that may need suspension before each one is available.
    Stream(ChunkStream),
}

impl Body {
    #[inline]
    pub fn empty() -> Self {
        Body::Full(Bytes::new())
    }

    /// Body from any iterator of byte-like chunks.
    pub fn chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        I::IntoIter: Send + 'static,
        B: Into<Bytes> + 'static,
    {
        Body::Iter(Box::new(chunks.into_iter().map(Into::into)))
    }

    /// Body from an async stream of chunks.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Body::Stream(Box::pin(stream))
    }

    /// The bytes of a fixed body.
    #[inline]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Full(bytes) => Some(bytes),
            _ => None,
        }
    }

    #[inline]
    pub fn is_streaming(&self) -> bool {
        !matches!(self, Body::Full(_))
    }

    /// Length when known up front.
    #[inline]
    pub fn exact_len(&self) -> Option<usize> {
        self.as_bytes().map(Bytes::len)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(bytes).finish(),
            Body::Iter(_) => f.write_str("Iter(..)"),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Full(Bytes::from(v))
    }
}

/// Status and headers, frozen at the moment emission begins.
///
/// Headers keep insertion order; `with_header` replaces an existing
/// entry of the same name so keys stay unique.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    pub status: StatusCode,
    /// Custom reason phrase, `None` for the canonical one.
    pub reason: Option<String>,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            headers: Vec::new(),
        }
    }

    /// Build a head from a status line such as `"404 Not Found"`.
    pub fn parse(status_line: &str, headers: Vec<(HeaderName, HeaderValue)>) -> Result<Self> {
        let line = status_line.trim();
        let (code, reason) = line.split_once(' ').unwrap_or((line, ""));
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(|| {
                Error::InvalidResponse(format!("invalid status line: {:?}", status_line))
            })?;

        let reason = reason.trim();
        let reason = if reason.is_empty() || Some(reason) == status.canonical_reason() {
            None
        } else {
            Some(reason.to_string())
        };

        Ok(Self {
            status,
            reason,
            headers,
        })
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.retain(|(n, _)| *n != name);
        self.headers.push((name, value));
        self
    }

    /// Header lookup by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }

    /// `"200 OK"` style status line.
    pub fn status_line(&self) -> String {
        let reason = self
            .reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("");
        format!("{} {}", self.status.as_u16(), reason)
    }

    /// Headers as a map, preserving emission order for repeated names.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

/// HTTP response.
///
/// Note: Clone is intentionally not derived; streaming bodies
/// cannot be duplicated.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// Create a new response builder.
    #[inline]
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    /// Create a 200 OK response with body.
    #[inline]
    pub fn ok(body: impl Into<Body>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Create a 404 Not Found response (uses static body).
    #[inline]
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: Body::Full(static_bodies::NOT_FOUND.clone()),
        }
    }

    /// Create a 500 Internal Server Error response.
    #[inline]
    pub fn internal_error() -> Self {
        Self::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .text()
            .body(static_bodies::INTERNAL_ERROR.clone())
            .build()
    }

    /// Create an empty response with given status.
    #[inline]
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    /// 200 response whose body is written chunk by chunk.
    pub fn streaming<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        I::IntoIter: Send + 'static,
        B: Into<Bytes> + 'static,
    {
        Self::builder().html().body(Body::chunks(chunks)).build()
    }

    /// 200 response fed by an async stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self::builder().html().body(Body::stream(stream)).build()
    }

    // Getters

    /// Get the status code.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get the response body.
    #[inline]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Get a header value by string name (case-insensitive).
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    // Modifiers

    /// Set the status code.
    #[inline]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a header (fast path with HeaderName + HeaderValue).
    #[inline]
    pub fn with_header_value(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a header by string name and value. Invalid names or values are ignored.
    #[inline]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the body.
    #[inline]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Check if this is an error response (4xx or 5xx).
    #[inline]
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    /// Get Content-Type header.
    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Freeze into a head and a body for emission.
    pub fn into_parts(self) -> (ResponseHead, Body) {
        let mut head = ResponseHead::new(self.status);
        head.headers.reserve(self.headers.len());
        for (name, value) in self.headers.iter() {
            head.headers.push((name.clone(), value.clone()));
        }
        if let Some(len) = self.body.exact_len() {
            if !self.headers.contains_key(header::CONTENT_LENGTH) {
                head.headers
                    .push((header::CONTENT_LENGTH, HeaderValue::from(len)));
            }
        }
        (head, self.body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::empty(StatusCode::OK)
    }
}

impl<B> From<http::Response<B>> for Response
where
    B: Into<Bytes>,
{
    fn from(res: http::Response<B>) -> Self {
        let (parts, body) = res.into_parts();
        Self {
            status: parts.status,
            headers: parts.headers,
            body: Body::Full(body.into()),
        }
    }
}

/// Builder for creating HTTP responses.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Option<HeaderMap>, // Lazy allocation
    body: Body,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    /// Create a new response builder.
    #[inline]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: None,
            body: Body::empty(),
        }
    }

    /// Set the status code.
    #[inline]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add header with typed HeaderName and HeaderValue.
    #[inline]
    pub fn header_value(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .insert(name, value);
        self
    }

    /// Add header by strings.
    #[inline]
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers
                .get_or_insert_with(HeaderMap::new)
                .insert(name, value);
        }
        self
    }

    /// Set the body.
    #[inline]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set Content-Type header (generic).
    #[inline]
    pub fn content_type(self, content_type: &str) -> Self {
        self.header("content-type", content_type)
    }

    /// Set Content-Type to text/html.
    #[inline]
    pub fn html(self) -> Self {
        self.header_value(header::CONTENT_TYPE, content_types::TEXT_HTML.clone())
    }

    /// Set Content-Type to application/json.
    #[inline]
    pub fn json(self) -> Self {
        self.header_value(header::CONTENT_TYPE, content_types::APPLICATION_JSON.clone())
    }

    /// Set Content-Type to text/plain.
    #[inline]
    pub fn text(self) -> Self {
        self.header_value(header::CONTENT_TYPE, content_types::TEXT_PLAIN.clone())
    }

    /// Build the response.
    #[inline]
    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.unwrap_or_default(),
            body: self.body,
        }
    }
}
