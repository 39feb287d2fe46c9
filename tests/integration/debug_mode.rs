//! Debug mode: errors escape the lifecycle and the diagnostic middleware
//! renders them.

use std::sync::Arc;

use crate::helpers::*;
use reqwest::StatusCode;
use tokio_wsgi::middleware::{wrap, DebugMiddleware};

fn debug_server() -> TestServer {
    let mut app = demo_app();
    app.set_debug(true);
    TestServer::start(wrap(DebugMiddleware, Arc::new(app)))
}

#[tokio::test]
async fn test_error_renders_diagnostic_page() {
    let server = debug_server();
    let resp = server.get("/fail?x=1").await;

    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_header_starts_with(&resp, "content-type", "text/html");
    let body = resp.text().await.unwrap();
    assert!(body.contains("boom"));
    assert!(body.contains("GET /fail?x=1"));
}

#[tokio::test]
async fn test_successful_requests_pass_through() {
    let server = debug_server();
    let resp = server.get("/stream").await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "x-served-by", "tokio_wsgi");
    assert_eq!(resp.text().await.unwrap(), "Hello, World!");
}

#[tokio::test]
async fn test_http_errors_still_use_error_pages() {
    let server = debug_server();
    let resp = server.get("/nowhere").await;

    assert_status(&resp, StatusCode::NOT_FOUND);
    assert_body_contains(resp, "Not Found").await;
}
