//! Diagnostic page for errors escaping the application in debug mode.

use std::error::Error as StdError;
use std::fmt::Write as _;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use tracing::error;

use super::{ChunkResults, Inner, SyncMiddleware};
use crate::app::escape_html;
use crate::core::{Error, RequestHead, ResponseHead, Result};
use crate::emit::StartResponse;

/// Passes the wrapped application's output through; when it fails before
/// producing any output, answers with a 500 page showing the error chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugMiddleware;

impl DebugMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl SyncMiddleware for DebugMiddleware {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn call(&self, request: &RequestHead, start: &StartResponse, inner: Inner) -> Result<ChunkResults> {
        let err = match inner.call() {
            Ok(mut frames) => match frames.next() {
                Some(Err(err)) => err,
                first => {
                    let method = request.method.clone();
                    let path = request.uri.path().to_string();
                    let rest = frames.inspect(move |chunk| {
                        if let Err(err) = chunk {
                            error!(
                                error = %err,
                                method = %method,
                                path = %path,
                                "application error after output started"
                            );
                        }
                    });
                    return Ok(Box::new(first.into_iter().chain(rest)));
                }
            },
            Err(err) => err,
        };

        error!(
            error = %err,
            method = %request.method,
            path = request.uri.path(),
            "application error"
        );

        if start.is_upgraded() {
            return Ok(Box::new(std::iter::empty()));
        }

        let head = ResponseHead::new(StatusCode::INTERNAL_SERVER_ERROR).with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        start.start(head)?;

        let page = render_page(&err, request);
        Ok(Box::new(std::iter::once(Ok(Bytes::from(page)))))
    }
}

fn render_page(err: &Error, request: &RequestHead) -> String {
    let mut page = String::with_capacity(1024);
    let _ = write!(
        page,
        "<!doctype html>\n<html lang=en>\n<title>{} // debug</title>\n\
         <h1>Internal Server Error</h1>\n<p><code>{} {}</code></p>\n<h2>Error chain</h2>\n<ol>\n",
        escape_html(&err.to_string()),
        escape_html(request.method.as_str()),
        escape_html(&request.uri.to_string()),
    );

    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        let _ = writeln!(page, "<li><pre>{}</pre></li>", escape_html(&e.to_string()));
        current = e.source();
    }

    page.push_str("</ol>\n<p>This page is only shown while debug mode is enabled.</p>\n");
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{application_fn, Environ};
    use crate::bridge::Outcome;
    use crate::core::Request;
    use crate::emit::testing::RecordingTransport;
    use crate::emit::Payload;
    use crate::gateway;
    use crate::middleware::wrap;

    #[tokio::test]
    async fn test_successful_output_passes_through() {
        let app = wrap(
            DebugMiddleware,
            application_fn(|_, start| {
                start.start(ResponseHead::new(StatusCode::OK))?;
                Ok(Outcome::Done(Payload::new("fine")))
            }),
        );
        let mut transport = RecordingTransport::new();

        gateway::handle(&app, Environ::new(Request::get("/")), None, &mut transport)
            .await
            .unwrap();
        assert_eq!(transport.status(), Some(StatusCode::OK));
        assert_eq!(transport.body(), "fine");
    }

    #[tokio::test]
    async fn test_error_renders_diagnostic_page() {
        let app = wrap(
            DebugMiddleware,
            application_fn(|_, _| Err(Error::from("<kaboom>"))),
        );
        let mut transport = RecordingTransport::new();

        gateway::handle(&app, Environ::new(Request::get("/broken?x=1")), None, &mut transport)
            .await
            .unwrap();
        assert_eq!(transport.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let body = transport.body();
        assert!(body.contains("&lt;kaboom&gt;"));
        assert!(body.contains("GET /broken?x=1"));
        assert_eq!(
            transport.head().unwrap().header("content-type"),
            Some("text/html; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn test_error_before_output_replaces_started_response() {
        let app = wrap(
            DebugMiddleware,
            application_fn(|_, start| {
                start.start(ResponseHead::new(StatusCode::OK))?;
                let chunks: Vec<Result<Bytes>> = vec![Err(Error::from("stream broke")), Ok(Bytes::from("never"))];
                let body = crate::core::Body::stream(futures_util::stream::iter(chunks));
                Ok(Outcome::Done(Payload::new(body)))
            }),
        );
        let mut transport = RecordingTransport::new();

        gateway::handle(&app, Environ::new(Request::get("/")), None, &mut transport)
            .await
            .unwrap();
        assert_eq!(transport.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!transport.body().contains("never"));
        assert!(transport.body().contains("stream broke"));
    }

    #[tokio::test]
    async fn test_error_after_output_is_not_masked() {
        let app = wrap(
            DebugMiddleware,
            application_fn(|_, start| {
                start.start(ResponseHead::new(StatusCode::OK))?;
                let chunks: Vec<Result<Bytes>> = vec![
                    Ok(Bytes::from("partial")),
                    Err(Error::from("stream broke")),
                ];
                let body = crate::core::Body::stream(futures_util::stream::iter(chunks));
                Ok(Outcome::Done(Payload::new(body)))
            }),
        );
        let mut transport = RecordingTransport::new();

        let result = gateway::handle(&app, Environ::new(Request::get("/")), None, &mut transport).await;
        assert_eq!(result.unwrap_err().to_string(), "stream broke");
        assert_eq!(transport.status(), Some(StatusCode::OK));
        assert_eq!(transport.body(), "partial");
    }

    #[tokio::test]
    async fn test_frames_pass_through_in_order() {
        let app = wrap(
            DebugMiddleware,
            application_fn(|_, start| {
                start.start(ResponseHead::new(StatusCode::OK))?;
                Ok(Outcome::Done(Payload::new(crate::core::Body::chunks(vec!["a", "b", "c"]))))
            }),
        );
        let mut transport = RecordingTransport::new();

        gateway::handle(&app, Environ::new(Request::get("/")), None, &mut transport)
            .await
            .unwrap();
        assert_eq!(transport.writes(), vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
    }
}
