//! Upgrade detection and the WebSocket opening handshake.
//!
//! Detection is a pure function of the request headers. Malformed or
//! missing headers simply classify the request as plain HTTP.

use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::core::ResponseHead;

/// True when `Upgrade` is `websocket` (trimmed, any case) and
/// `Connection` contains `upgrade` (any case).
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let upgrade = header_str(headers, &header::UPGRADE)
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgrade {
        return false;
    }

    header_str(headers, &header::CONNECTION)
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false)
}

/// The client's `Sec-WebSocket-Key`, if present and non-empty.
pub fn handshake_key(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, &header::SEC_WEBSOCKET_KEY)
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// `101 Switching Protocols` head answering `key`.
pub fn switching_protocols(key: &str) -> ResponseHead {
    let accept = derive_accept_key(key.as_bytes());

    let mut head = ResponseHead::new(StatusCode::SWITCHING_PROTOCOLS)
        .with_header(header::UPGRADE, HeaderValue::from_static("websocket"))
        .with_header(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    // derive_accept_key yields base64, always a valid header value
    if let Ok(value) = HeaderValue::from_str(&accept) {
        head = head.with_header(header::SEC_WEBSOCKET_ACCEPT, value);
    }
    head
}

#[inline]
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
