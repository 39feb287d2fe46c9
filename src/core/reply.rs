//! Values a handler may return, and their conversion into a [`Response`].

use bytes::Bytes;
use http::StatusCode;

use super::{Error, Response, Result};

/// What a handler, hook or error handler hands back.
///
/// Converted by [`Reply::into_response`]; strings and bytes become
/// `text/html` bodies with status 200.
#[derive(Debug)]
pub enum Reply {
    Body(Bytes),
    WithStatus(Bytes, StatusCode),
    Response(Response),
    /// Nothing usable was returned.
    Empty,
}

impl Reply {
    pub fn into_response(self) -> Result<Response> {
        match self {
            Reply::Body(body) => Ok(Response::builder().html().body(body).build()),
            Reply::WithStatus(body, status) => Ok(Response::builder()
                .status(status)
                .html()
                .body(body)
                .build()),
            Reply::Response(response) => Ok(response),
            Reply::Empty => Err(Error::InvalidResponse(
                "the handler did not return a valid response".into(),
            )),
        }
    }
}

impl From<&'static str> for Reply {
    fn from(s: &'static str) -> Self {
        Reply::Body(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Body(Bytes::from(s))
    }
}

impl From<Bytes> for Reply {
    fn from(b: Bytes) -> Self {
        Reply::Body(b)
    }
}

impl From<Vec<u8>> for Reply {
    fn from(v: Vec<u8>) -> Self {
        Reply::Body(Bytes::from(v))
    }
}

impl From<Response> for Reply {
    fn from(r: Response) -> Self {
        Reply::Response(r)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

impl From<(&'static str, StatusCode)> for Reply {
    fn from((s, status): (&'static str, StatusCode)) -> Self {
        Reply::WithStatus(Bytes::from_static(s.as_bytes()), status)
    }
}

impl From<(String, StatusCode)> for Reply {
    fn from((s, status): (String, StatusCode)) -> Self {
        Reply::WithStatus(Bytes::from(s), status)
    }
}
