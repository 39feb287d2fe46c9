//! Custom error pages loaded from a directory.

use std::sync::Arc;

use crate::helpers::*;
use reqwest::StatusCode;
use tokio_wsgi::app::ErrorPages;

fn server_with_pages() -> (TestServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("404.html"), "<html><body>custom missing page</body></html>").unwrap();

    let mut app = demo_app();
    app.set_error_pages(ErrorPages::from_directory(dir.path()));
    (TestServer::start(Arc::new(app)), dir)
}

#[tokio::test]
async fn test_404_custom_html_page() {
    let (server, _dir) = server_with_pages();
    let resp = server
        .get_with_headers("/nonexistent", &[("Accept", "text/html")])
        .await;

    assert_status(&resp, StatusCode::NOT_FOUND);
    assert_header_starts_with(&resp, "content-type", "text/html");
    assert_body_contains(resp, "custom missing page").await;
}

#[tokio::test]
async fn test_404_default_page_for_json_clients() {
    let (server, _dir) = server_with_pages();
    let resp = server
        .get_with_headers("/nonexistent", &[("Accept", "application/json")])
        .await;

    assert_status(&resp, StatusCode::NOT_FOUND);
    let body = resp.text().await.unwrap();
    assert!(!body.contains("custom missing page"));
    assert!(body.contains("Not Found"));
}

#[tokio::test]
async fn test_status_without_custom_page_uses_default() {
    let (server, _dir) = server_with_pages();
    let resp = server
        .get_with_headers("/fail", &[("Accept", "text/html")])
        .await;

    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_body_contains(resp, "<h1>Internal Server Error</h1>").await;
}
