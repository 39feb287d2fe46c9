//! The application object: routes, hooks and error handlers.
//!
//! An [`App`] is built once, frozen in an `Arc` and served through its
//! [`Application`] implementation. Each request runs the lifecycle in
//! [`lifecycle`]:
//!
//! 1. `before_request` hooks; a reply from any of them skips dispatch
//! 2. route dispatch, driving suspended handlers to completion
//! 3. HTTP aborts go to the status handler or the default error page,
//!    other errors to the exception handler
//! 4. the reply becomes a response and `after_request` hooks run
//! 5. anything still failing becomes a 500 (or escapes in debug mode)
//! 6. teardown hooks run once the response has been emitted

mod error_pages;
mod handler;
mod lifecycle;
mod routing;

pub use error_pages::{status_reason_phrase, ErrorPages};
pub use handler::{asynchronous, plain, websocket, websocket_with_status, Async, Handler, Plain, WebSocketRoute};
pub use routing::Router;

pub(crate) use error_pages::escape_html;

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error};

use crate::application::{Application, Environ};
use crate::bridge::{HandlerOutcome, Outcome};
use crate::core::{Error, Reply, RequestContext, Response, Result};
use crate::emit::{Payload, StartResponse};
use crate::hooks::{AfterRequest, BeforeRequest, Hook, HookChain, HookResult, Teardown};

/// Error handler registered for a status code or for all non-HTTP errors.
pub type ErrorHandler = Box<dyn Fn(&Error, &mut RequestContext) -> Result<HandlerOutcome> + Send + Sync>;

pub struct App {
    name: String,
    debug: bool,
    router: Router,
    hooks: HookChain,
    status_handlers: HashMap<StatusCode, ErrorHandler>,
    exception_handler: Option<ErrorHandler>,
    error_pages: ErrorPages,
}

impl App {
    pub fn new() -> Self {
        Self::named(env!("CARGO_PKG_NAME"))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            debug: false,
            router: Router::new(),
            hooks: HookChain::new(),
            status_handlers: HashMap::new(),
            exception_handler: None,
            error_pages: ErrorPages::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// In debug mode unhandled errors escape the application instead of
    /// becoming a generic 500 page.
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    #[inline]
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn route<H: Handler>(&mut self, rule: &str, handler: H) -> &mut Self {
        self.router.add(rule, Arc::new(handler));
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn hook<H: Hook + 'static>(&mut self, hook: H) -> &mut Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    /// Run `f` before dispatch. Returning `Some` answers the request
    /// without calling the handler.
    pub fn before_request<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> Result<Option<Reply>> + Send + Sync + 'static,
    {
        self.hook(BeforeRequest(f))
    }

    pub fn after_request<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Response, &mut RequestContext) -> Result<Response> + Send + Sync + 'static,
    {
        self.hook(AfterRequest(f))
    }

    pub fn teardown_request<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut RequestContext, Option<&Error>) -> Result<()> + Send + Sync + 'static,
    {
        self.hook(Teardown(f))
    }

    /// Handle HTTP aborts with `status`. A handler for 500 also replaces
    /// the generic page for unhandled errors.
    pub fn error_handler<F>(&mut self, status: StatusCode, f: F) -> &mut Self
    where
        F: Fn(&Error, &mut RequestContext) -> Result<HandlerOutcome> + Send + Sync + 'static,
    {
        self.status_handlers.insert(status, Box::new(f));
        self
    }

    /// Handle errors that are not HTTP aborts.
    pub fn exception_handler<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Error, &mut RequestContext) -> Result<HandlerOutcome> + Send + Sync + 'static,
    {
        self.exception_handler = Some(Box::new(f));
        self
    }

    pub fn set_error_pages(&mut self, pages: ErrorPages) -> &mut Self {
        self.error_pages = pages;
        self
    }

    /// Default error response for `status`.
    pub fn error_response(&self, status: StatusCode, description: Option<&str>, html: bool) -> Response {
        self.error_pages.render(status, description, html)
    }

    // Lifecycle steps

    /// Run `before_request` hooks. `Some` short-circuits dispatch.
    pub(crate) fn preprocess_request(&self, ctx: &mut RequestContext) -> Result<Option<Reply>> {
        match self.hooks.process_request(ctx)? {
            HookResult::Stop(reply) => Ok(Some(reply)),
            HookResult::Next => Ok(None),
        }
    }

    /// Find the handler for the request path and record its parameters.
    pub(crate) fn match_request(&self, ctx: &mut RequestContext) -> Result<Arc<dyn Handler>> {
        let matched = self
            .router
            .resolve(ctx.request().path())
            .ok_or_else(Error::not_found)?;
        ctx.set_params(matched.params);
        Ok(matched.handler)
    }

    /// Recover from an error raised by a hook or handler.
    ///
    /// HTTP aborts go to the status handler or the error page; other
    /// errors go to the exception handler, or are returned unchanged when
    /// none is registered.
    pub(crate) fn handle_user_exception(&self, err: Error, ctx: &mut RequestContext) -> Result<HandlerOutcome> {
        if let Error::Http {
            status,
            ref description,
        } = err
        {
            if let Some(handler) = self.status_handlers.get(&status) {
                return handler(&err, ctx);
            }
            let html = ctx.request().accepts_html();
            let response = self.error_response(status, description.as_deref(), html);
            return Ok(Outcome::Done(Reply::Response(response)));
        }

        match &self.exception_handler {
            Some(handler) => {
                debug!(error = %err, "passing error to exception handler");
                handler(&err, ctx)
            }
            None => Err(err),
        }
    }

    /// Turn a reply into a response and apply headers queued on the context.
    pub(crate) fn make_response(&self, reply: Reply, ctx: &RequestContext) -> Result<Response> {
        let mut response = reply.into_response()?;
        for (name, value) in ctx.response_headers() {
            response = response.with_header(name, value);
        }
        Ok(response)
    }

    pub(crate) fn process_response(&self, response: Response, ctx: &mut RequestContext) -> Result<Response> {
        self.hooks.process_response(response, ctx)
    }

    /// Last-resort handling of an error the earlier steps did not recover.
    ///
    /// `None` means the error must escape to the caller.
    pub(crate) fn handle_exception(&self, err: &Error, ctx: &mut RequestContext) -> Result<Option<HandlerOutcome>> {
        error!(
            error = %err,
            method = %ctx.request().method(),
            path = ctx.request().path(),
            "unhandled error while serving request"
        );

        if ctx.propagate_exceptions() {
            return Ok(None);
        }

        if let Some(handler) = self.status_handlers.get(&StatusCode::INTERNAL_SERVER_ERROR) {
            return handler(err, ctx).map(Some);
        }

        let html = ctx.request().accepts_html();
        let response = self.error_response(StatusCode::INTERNAL_SERVER_ERROR, None, html);
        Ok(Some(Outcome::Done(Reply::Response(response))))
    }

    pub(crate) fn do_teardown_request(&self, ctx: &mut RequestContext, err: Option<&Error>) -> Result<()> {
        self.hooks.teardown(ctx, err)
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.name)
            .field("debug", &self.debug)
            .field("routes", &self.router.rules())
            .field("hooks", &self.hooks)
            .field("error_pages", &self.error_pages)
            .finish_non_exhaustive()
    }
}

impl Application for Arc<App> {
    fn call(&self, environ: Environ, start: StartResponse) -> Result<Outcome<Payload>> {
        Ok(Outcome::suspend(lifecycle::run(Arc::clone(self), environ, start)))
    }
}
