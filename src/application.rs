//! The application contract the server drives.
//!
//! An [`Application`] receives the request [`Environ`] and a
//! [`StartResponse`] handle and returns an [`Outcome`] whose final value
//! is a [`Payload`]. [`App`](crate::app::App) implements it through
//! `Arc<App>`; [`application_fn`] adapts a plain function.

use crate::bridge::Outcome;
use crate::core::{Request, Result};
use crate::emit::{Payload, StartResponse};
use crate::websocket::WebSocket;

/// A request/response callable.
pub trait Application: Send + Sync + 'static {
    fn call(&self, environ: Environ, start: StartResponse) -> Result<Outcome<Payload>>;
}

/// Everything an application gets about one request.
#[derive(Debug)]
pub struct Environ {
    request: Request,
    websocket: Option<WebSocket>,
    propagate_exceptions: bool,
}

impl Environ {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            websocket: None,
            propagate_exceptions: false,
        }
    }

    /// Attach the channel of an upgraded connection.
    pub fn with_websocket(mut self, websocket: WebSocket) -> Self {
        self.websocket = Some(websocket);
        self
    }

    /// Let unhandled errors escape the application (debug mode).
    pub fn with_propagate_exceptions(mut self, propagate: bool) -> Self {
        self.propagate_exceptions = propagate;
        self
    }

    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[inline]
    pub fn is_websocket(&self) -> bool {
        self.websocket.is_some()
    }

    #[inline]
    pub fn propagate_exceptions(&self) -> bool {
        self.propagate_exceptions
    }

    pub fn into_parts(self) -> (Request, Option<WebSocket>, bool) {
        (self.request, self.websocket, self.propagate_exceptions)
    }
}

/// Application backed by a function.
pub struct FnApplication<F>(F);

/// Wrap a function as an [`Application`].
pub fn application_fn<F>(f: F) -> FnApplication<F>
where
    F: Fn(Environ, StartResponse) -> Result<Outcome<Payload>> + Send + Sync + 'static,
{
    FnApplication(f)
}

impl<F> Application for FnApplication<F>
where
    F: Fn(Environ, StartResponse) -> Result<Outcome<Payload>> + Send + Sync + 'static,
{
    fn call(&self, environ: Environ, start: StartResponse) -> Result<Outcome<Payload>> {
        (self.0)(environ, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{drive, Driven};
    use crate::core::ResponseHead;
    use http::StatusCode;

    #[tokio::test]
    async fn test_function_application() {
        let app = application_fn(|environ, start| {
            let path = environ.request().path().to_string();
            start.start(ResponseHead::new(StatusCode::OK))?;
            Ok(Outcome::chunks(vec![path]))
        });

        let start = StartResponse::new();
        let outcome = app.call(Environ::new(Request::get("/hi")), start.clone()).unwrap();
        assert_eq!(start.status(), Some(StatusCode::OK));
        match drive(outcome).await.unwrap() {
            Driven::Chunks(iter) => assert_eq!(iter.collect::<Vec<_>>(), vec!["/hi"]),
            Driven::Value(_) => panic!("expected chunks"),
        }
    }

    #[test]
    fn test_environ_parts() {
        let environ = Environ::new(Request::get("/")).with_propagate_exceptions(true);
        assert!(!environ.is_websocket());
        assert!(environ.propagate_exceptions());
        let (request, websocket, propagate) = environ.into_parts();
        assert_eq!(request.path(), "/");
        assert!(websocket.is_none());
        assert!(propagate);
    }
}
