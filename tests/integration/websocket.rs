//! WebSocket tests: handshake, echo loop, route parameters.

use crate::helpers::*;
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_handshake_switches_protocols() {
    let server = TestServer::demo();
    let (_ws, response) = connect_async(server.ws_url("/echo")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    assert!(response.headers().contains_key("sec-websocket-accept"));
}

#[tokio::test]
async fn test_echo_round_trip_and_close() {
    let server = TestServer::demo();
    let (mut ws, _) = connect_async(server.ws_url("/echo")).await.unwrap();

    ws.send(Message::Text("hello".into())).await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap(), Message::Text("hello".into()));

    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap(), Message::Binary(vec![1, 2, 3]));

    ws.close(None).await.unwrap();
    while let Some(Ok(message)) = ws.next().await {
        if message.is_close() {
            break;
        }
    }
}

#[tokio::test]
async fn test_route_parameter_is_sent() {
    let server = TestServer::demo();
    let (mut ws, _) = connect_async(server.ws_url("/param/hello")).await.unwrap();

    assert_eq!(ws.next().await.unwrap().unwrap(), Message::Text("hello".into()));
    let closing = ws.next().await.unwrap().unwrap();
    assert!(closing.is_close());
}

#[tokio::test]
async fn test_upgrade_on_unknown_route_closes_after_handshake() {
    let server = TestServer::demo();
    let (mut ws, response) = connect_async(server.ws_url("/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

    // The 404 reply is discarded on an upgraded connection
    match ws.next().await {
        None | Some(Err(_)) => {}
        Some(Ok(message)) => assert!(message.is_close()),
    }
}
