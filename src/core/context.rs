//! Per-request context handed to handlers and hooks.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::app::App;
use crate::application::Environ;
use crate::websocket::WebSocket;

use super::{Error, Request, Result};

/// HTTP version as static string (no allocation).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpVersion(&'static str);

impl HttpVersion {
    pub const HTTP_10: Self = Self("HTTP/1.0");
    pub const HTTP_11: Self = Self("HTTP/1.1");
    pub const HTTP_20: Self = Self("HTTP/2.0");

    /// Get the version string.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    /// Create from http::Version.
    #[inline]
    pub fn from_http(version: http::Version) -> Self {
        match version {
            http::Version::HTTP_10 => Self::HTTP_10,
            http::Version::HTTP_11 => Self::HTTP_11,
            http::Version::HTTP_2 => Self::HTTP_20,
            _ => Self::HTTP_11, // fallback
        }
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// State of one request, owned by the lifecycle for the whole cycle.
///
/// Carries:
/// - the request itself and matched route parameters
/// - the WebSocket channel when the connection was upgraded
/// - trace/request identifiers and timing
/// - response headers queued by handlers and hooks
/// - a typed key-value bag for hooks to talk to handlers
pub struct RequestContext {
    /// W3C Trace ID (32 hex chars).
    pub trace_id: String,

    /// Span ID (16 hex chars).
    pub span_id: String,

    /// Short request ID for logging, or the client's X-Request-ID.
    pub request_id: String,

    /// Request start time.
    pub started_at: Instant,

    pub http_version: HttpVersion,

    request: Request,
    params: Vec<(String, String)>,
    websocket: Option<WebSocket>,
    propagate_exceptions: bool,
    app: Arc<App>,

    /// Response headers to add, in the order they were first set.
    response_headers: Vec<(String, String)>,

    /// Custom key-value storage.
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    pub fn new(app: Arc<App>, environ: Environ) -> Self {
        let (request, websocket, propagate_exceptions) = environ.into_parts();
        let trace_id = generate_trace_id();
        let span_id = generate_span_id();
        let request_id = match request.request_id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => make_request_id(&trace_id, &span_id),
        };

        Self {
            trace_id,
            span_id,
            request_id,
            started_at: Instant::now(),
            http_version: HttpVersion::from_http(request.version()),
            request,
            params: Vec::new(),
            websocket,
            propagate_exceptions,
            app,
            response_headers: Vec::with_capacity(4),
            values: HashMap::new(),
        }
    }

    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[inline]
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Route parameter captured by a `<name>` segment.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: Vec<(String, String)>) {
        self.params = params;
    }

    /// The WebSocket channel of an upgraded request.
    pub fn websocket(&mut self) -> Result<&mut WebSocket> {
        self.websocket.as_mut().ok_or(Error::NotWebSocket)
    }

    #[inline]
    pub fn is_websocket(&self) -> bool {
        self.websocket.is_some()
    }

    /// Whether unhandled errors should escape to the caller instead of
    /// becoming a generic 500.
    #[inline]
    pub fn propagate_exceptions(&self) -> bool {
        self.propagate_exceptions || self.app.is_debug()
    }

    /// Set a custom value.
    #[inline]
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.values.insert(key.to_string(), Box::new(value));
    }

    /// Get a custom value.
    #[inline]
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    /// Get a mutable reference to a custom value.
    #[inline]
    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut())
    }

    /// Remove a custom value.
    #[inline]
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.values
            .remove(key)
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Queue a header for the final response.
    ///
    /// Setting a name again replaces the value but keeps its position.
    pub fn set_response_header(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self
            .response_headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.response_headers.push((name, value)),
        }
    }

    #[inline]
    pub fn response_headers(&self) -> &[(String, String)] {
        &self.response_headers
    }

    /// Get elapsed time since request started.
    #[inline]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Get elapsed time in milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

/// Build request ID from trace_id and span_id.
#[inline]
fn make_request_id(trace_id: &str, span_id: &str) -> String {
    let trace_part = &trace_id[..12.min(trace_id.len())];
    let span_part = &span_id[..4.min(span_id.len())];

    let mut id = String::with_capacity(trace_part.len() + 1 + span_part.len());
    id.push_str(trace_part);
    id.push('-');
    id.push_str(span_part);
    id
}

// ============================================================================
// Fast random ID generation with thread-local state
// ============================================================================

thread_local! {
    static RNG_STATE: Cell<u64> = Cell::new(init_rng_seed());
}

/// Initialize RNG seed from system entropy.
fn init_rng_seed() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    hasher.finish() | 1
}

/// Fast random u64 using thread-local xorshift64.
#[inline]
fn rand_u64() -> u64 {
    RNG_STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}

/// Generate a random trace ID (32 hex chars).
pub fn generate_trace_id() -> String {
    use std::fmt::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let mut id = String::with_capacity(32);
    let _ = write!(id, "{:016x}{:016x}", timestamp, rand_u64());
    id
}

/// Generate a random span ID (16 hex chars).
#[inline]
pub fn generate_span_id() -> String {
    use std::fmt::Write;

    let mut id = String::with_capacity(16);
    let _ = write!(id, "{:016x}", rand_u64());
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn context_for(request: Request) -> RequestContext {
        RequestContext::new(Arc::new(App::new()), Environ::new(request))
    }

    #[test]
    fn test_context_new() {
        let ctx = context_for(Request::get("/plain"));

        assert_eq!(ctx.trace_id.len(), 32);
        assert_eq!(ctx.span_id.len(), 16);
        assert_eq!(ctx.request_id.len(), 17);
        assert_eq!(ctx.request().path(), "/plain");
        assert_eq!(ctx.http_version, HttpVersion::HTTP_11);
        assert!(!ctx.is_websocket());
        assert!(!ctx.propagate_exceptions());
    }

    #[test]
    fn test_context_uses_client_request_id() {
        let req = http::Request::builder()
            .uri("/")
            .header("x-request-id", "abc123")
            .body(Bytes::new())
            .unwrap();
        let ctx = context_for(Request::from(req));
        assert_eq!(ctx.request_id, "abc123");
    }

    #[test]
    fn test_websocket_on_plain_request() {
        let mut ctx = context_for(Request::get("/echo"));
        let err = ctx.websocket().err().expect("plain request has no websocket");
        assert_eq!(
            err.to_string(),
            "Request context is not a WebSocket context."
        );
    }

    #[test]
    fn test_context_custom_values() {
        let mut ctx = context_for(Request::get("/"));

        ctx.set("counter", 42u32);
        ctx.set("name", "test".to_string());

        assert_eq!(ctx.get::<u32>("counter"), Some(&42));
        assert_eq!(ctx.get::<String>("name"), Some(&"test".to_string()));
        assert_eq!(ctx.get::<u32>("missing"), None);

        if let Some(counter) = ctx.get_mut::<u32>("counter") {
            *counter += 1;
        }
        assert_eq!(ctx.get::<u32>("counter"), Some(&43));

        let removed = ctx.remove::<u32>("counter");
        assert_eq!(removed, Some(43));
        assert_eq!(ctx.get::<u32>("counter"), None);
    }

    #[test]
    fn test_context_params() {
        let mut ctx = context_for(Request::get("/param/x"));
        ctx.set_params(vec![("arg".to_string(), "x".to_string())]);

        assert_eq!(ctx.param("arg"), Some("x"));
        assert_eq!(ctx.param("other"), None);
        assert_eq!(ctx.params().len(), 1);
    }

    #[test]
    fn test_context_response_headers() {
        let mut ctx = context_for(Request::get("/"));

        ctx.set_response_header("X-Custom", "value1");
        ctx.set_response_header("X-Another", 2);
        ctx.set_response_header("x-custom", "value2");

        let headers = ctx.response_headers();
        assert_eq!(
            headers,
            &[
                ("X-Custom".to_string(), "value2".to_string()),
                ("X-Another".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_generate_ids() {
        let id1 = generate_trace_id();
        let id2 = generate_trace_id();

        assert_eq!(id1.len(), 32);
        assert_ne!(id1, id2);
        assert_eq!(generate_span_id().len(), 16);
    }

    #[test]
    fn test_make_request_id() {
        let id = make_request_id("0af7651916cd43dd8448eb211c80319c", "b7ad6b7169203331");
        assert_eq!(id, "0af7651916cd-b7ad");

        let id = make_request_id("short", "ab");
        assert_eq!(id, "short-ab");
    }

    #[test]
    fn test_http_version() {
        assert_eq!(HttpVersion::from_http(http::Version::HTTP_10), HttpVersion::HTTP_10);
        assert_eq!(HttpVersion::from_http(http::Version::HTTP_2), HttpVersion::HTTP_20);
        assert_eq!(format!("{}", HttpVersion::HTTP_20), "HTTP/2.0");
    }
}
