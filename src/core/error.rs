//! Core error types.

use std::fmt;

use http::StatusCode;
use tokio_tungstenite::tungstenite;

/// Errors raised anywhere in a request cycle.
#[derive(Debug)]
pub enum Error {
    /// Invalid HTTP request.
    InvalidRequest(String),

    /// A handler or application produced something that cannot become a response.
    InvalidResponse(String),

    /// HTTP-level abort (404, 400, ...) raised by routing or handler code.
    Http {
        status: StatusCode,
        description: Option<String>,
    },

    /// WebSocket access on a plain HTTP request.
    NotWebSocket,

    /// Send or receive on a WebSocket that has already been closed.
    WebSocketClosed,

    /// WebSocket protocol or transport failure.
    WebSocket(Box<tungstenite::Error>),

    /// Client went away or the transport rejected a write.
    Transport(String),

    /// I/O error.
    Io(std::io::Error),

    /// Failure while building an http type.
    HttpBuild(http::Error),

    /// Application-defined error.
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Abort the request with an HTTP status.
    pub fn abort(status: StatusCode) -> Self {
        Error::Http {
            status,
            description: None,
        }
    }

    /// Abort with a status and a human readable description.
    pub fn abort_with(status: StatusCode, description: impl Into<String>) -> Self {
        Error::Http {
            status,
            description: Some(description.into()),
        }
    }

    pub fn not_found() -> Self {
        Self::abort(StatusCode::NOT_FOUND)
    }

    /// Wrap any error as an application error.
    pub fn custom<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Custom(err.into())
    }

    /// Status code for HTTP aborts, `None` for everything else.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            Error::InvalidResponse(msg) => write!(f, "invalid response: {}", msg),
            Error::Http {
                status,
                description: Some(desc),
            } => write!(f, "{}: {}", status, desc),
            Error::Http { status, .. } => write!(f, "{}", status),
            Error::NotWebSocket => f.write_str("Request context is not a WebSocket context."),
            Error::WebSocketClosed => f.write_str("WebSocket connection is closed"),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::HttpBuild(e) => write!(f, "HTTP error: {}", e),
            Error::Custom(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::WebSocket(e) => Some(e.as_ref()),
            Error::Io(e) => Some(e),
            Error::HttpBuild(e) => Some(e),
            Error::Custom(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Error::HttpBuild(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Error::WebSocketClosed
            }
            other => Error::WebSocket(Box::new(other)),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Custom(msg.into())
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Custom(msg.into())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidRequest("missing body".to_string());
        assert_eq!(err.to_string(), "invalid request: missing body");

        let err = Error::abort(StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "404 Not Found");

        let err = Error::abort_with(StatusCode::BAD_REQUEST, "no websocket");
        assert_eq!(err.to_string(), "400 Bad Request: no websocket");

        let err = Error::NotWebSocket;
        assert_eq!(
            err.to_string(),
            "Request context is not a WebSocket context."
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(Error::not_found().http_status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(Error::from("boom").http_status(), None);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "custom error".into();
        assert!(matches!(err, Error::Custom(_)));
        assert_eq!(err.to_string(), "custom error");

        let err: Error = String::from("another error").into();
        assert_eq!(err.to_string(), "another error");
    }

    #[test]
    fn test_closed_websocket_errors_collapse() {
        let err: Error = tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, Error::WebSocketClosed));

        let err: Error = tungstenite::Error::AlreadyClosed.into();
        assert!(matches!(err, Error::WebSocketClosed));
    }
}
