//! Access logging hook.
//!
//! Logs each request once the response has been emitted, so the
//! duration covers streaming bodies and WebSocket sessions.

use http::StatusCode;

use super::Hook;
use crate::core::{Error, RequestContext, Response, Result};

const STATUS_KEY: &str = "access_status";
const BYTES_KEY: &str = "access_bytes";

/// Access log hook.
///
/// Entries are emitted at INFO level with target "access".
#[derive(Debug, Clone, Copy)]
pub struct AccessLog {
    enabled: bool,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Hook for AccessLog {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn priority(&self) -> i32 {
        -90 // first before the handler, last after it
    }

    fn after_request(&self, res: Response, ctx: &mut RequestContext) -> Result<Response> {
        ctx.set(STATUS_KEY, res.status().as_u16());
        ctx.set(BYTES_KEY, res.body().exact_len());
        Ok(res)
    }

    fn teardown(&self, ctx: &mut RequestContext, error: Option<&Error>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let status = match (ctx.get::<u16>(STATUS_KEY), error) {
            (Some(status), _) => *status,
            (None, Some(e)) => e
                .http_status()
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .as_u16(),
            (None, None) if ctx.is_websocket() => StatusCode::SWITCHING_PROTOCOLS.as_u16(),
            (None, None) => StatusCode::OK.as_u16(),
        };
        let bytes = ctx.get::<Option<usize>>(BYTES_KEY).copied().flatten();
        let req = ctx.request();

        tracing::info!(
            target: "access",
            request_id = %ctx.request_id,
            method = %req.method(),
            path = req.path(),
            query = req.query(),
            status = status,
            bytes = bytes,
            duration_ms = ctx.elapsed_ms(),
            ip = req.remote_addr().map(|a| a.ip().to_string()),
            ua = req.header("user-agent"),
            referer = req.header("referer"),
            websocket = ctx.is_websocket(),
            error = error.map(|e| e.to_string()),
        );

        Ok(())
    }
}
