//! Basic HTTP tests: plain, streaming and suspended handlers, 404, hooks.

use crate::helpers::*;
use reqwest::StatusCode;

#[tokio::test]
async fn test_plain_handler() {
    let server = TestServer::demo();
    let resp = server.get("/plain").await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "x-served-by", "tokio_wsgi");
    assert_eq!(resp.text().await.unwrap(), "Hello, World!");
}

#[tokio::test]
async fn test_generator_output_is_streamed_in_order() {
    let server = TestServer::demo();
    let resp = server.get("/stream").await;

    assert_status(&resp, StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "Hello, World!");
}

#[tokio::test]
async fn test_suspended_handler() {
    let server = TestServer::demo();
    let resp = server.get("/late").await;

    assert_status(&resp, StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "done");
}

#[tokio::test]
async fn test_async_stream_body() {
    use futures_util::StreamExt;

    let server = TestServer::demo();
    let resp = server.get("/async-stream").await;
    assert_status(&resp, StatusCode::OK);

    let mut body = Vec::new();
    let mut chunks = resp.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"Hello, World!");
}

#[tokio::test]
async fn test_status_from_tuple_reply() {
    let server = TestServer::demo();
    let resp = server.get("/teapot").await;

    assert_status(&resp, StatusCode::IM_A_TEAPOT);
    assert_body_contains(resp, "short and stout").await;
}

#[tokio::test]
async fn test_404_path_not_found() {
    let server = TestServer::demo();
    let resp = server.get("/path/to/nowhere").await;

    assert_status(&resp, StatusCode::NOT_FOUND);
    assert_header_starts_with(&resp, "content-type", "text/html");
    assert_body_contains(resp, "<h1>Not Found</h1>").await;
}

#[tokio::test]
async fn test_handler_error_becomes_500() {
    let server = TestServer::demo();
    let resp = server.get("/fail").await;

    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_body_contains(resp, "Internal Server Error").await;
}

#[tokio::test]
async fn test_websocket_route_without_upgrade_is_400() {
    let server = TestServer::demo();
    let resp = server.get("/echo").await;

    assert_status(&resp, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_keep_alive_serves_several_requests() {
    let server = TestServer::demo();
    for _ in 0..3 {
        let resp = server.get("/plain").await;
        assert_status(&resp, StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "Hello, World!");
    }
}
