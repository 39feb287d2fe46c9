//! Request lifecycle hooks.
//!
//! Hooks run at fixed points of every request:
//! - `before_request` in registration order; the first `Stop` skips the handler
//! - `after_request` in reverse order; may replace the response
//! - `teardown` in reverse order, exactly once, after the response was
//!   emitted or the cycle failed
//!
//! # Lifecycle
//!
//! ```text
//! Request → H1.before → H2.before → Handler
//!                                     ↓
//! Response ← H1.after ← H2.after ←────┘
//!     ↓ (emitted)
//! H2.teardown → H1.teardown
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_wsgi::hooks::{Hook, HookResult};
//! use tokio_wsgi::core::{RequestContext, Result};
//!
//! struct RequireToken;
//!
//! impl Hook for RequireToken {
//!     fn name(&self) -> &'static str { "require_token" }
//!
//!     fn before_request(&self, ctx: &mut RequestContext) -> Result<HookResult> {
//!         if ctx.request().header("x-token").is_none() {
//!             return Ok(HookResult::Stop(("missing token", StatusCode::UNAUTHORIZED).into()));
//!         }
//!         Ok(HookResult::Next)
//!     }
//! }
//! ```

mod chain;

pub mod access_log;

pub use access_log::AccessLog;
pub use chain::HookChain;

use crate::core::{Error, Reply, RequestContext, Response, Result};

/// Result of a `before_request` hook.
#[derive(Debug)]
pub enum HookResult {
    /// Continue with the next hook, then the handler.
    Next,
    /// Skip the handler and answer with this value.
    Stop(Reply),
}

impl HookResult {
    pub fn is_next(&self) -> bool {
        matches!(self, HookResult::Next)
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, HookResult::Stop(_))
    }
}

/// A set of lifecycle callbacks.
///
/// Lower `priority` values run first for `before_request` and last for
/// `after_request` and `teardown`. Hooks with equal priority keep their
/// registration order.
pub trait Hook: Send + Sync {
    /// Unique name for this hook (used for logging/debugging).
    fn name(&self) -> &'static str;

    fn priority(&self) -> i32 {
        0
    }

    fn before_request(&self, _ctx: &mut RequestContext) -> Result<HookResult> {
        Ok(HookResult::Next)
    }

    fn after_request(&self, res: Response, _ctx: &mut RequestContext) -> Result<Response> {
        Ok(res)
    }

    /// Receives the error that ended the request, if any.
    fn teardown(&self, _ctx: &mut RequestContext, _error: Option<&Error>) -> Result<()> {
        Ok(())
    }
}

/// `before_request` callback registered as a closure.
pub struct BeforeRequest<F>(pub F);

impl<F> Hook for BeforeRequest<F>
where
    F: Fn(&mut RequestContext) -> Result<Option<Reply>> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "before_request"
    }

    fn before_request(&self, ctx: &mut RequestContext) -> Result<HookResult> {
        Ok(match (self.0)(ctx)? {
            Some(reply) => HookResult::Stop(reply),
            None => HookResult::Next,
        })
    }
}

/// `after_request` callback registered as a closure.
pub struct AfterRequest<F>(pub F);

impl<F> Hook for AfterRequest<F>
where
    F: Fn(Response, &mut RequestContext) -> Result<Response> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "after_request"
    }

    fn after_request(&self, res: Response, ctx: &mut RequestContext) -> Result<Response> {
        (self.0)(res, ctx)
    }
}

/// Teardown callback registered as a closure.
pub struct Teardown<F>(pub F);

impl<F> Hook for Teardown<F>
where
    F: Fn(&mut RequestContext, Option<&Error>) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "teardown_request"
    }

    fn teardown(&self, ctx: &mut RequestContext, error: Option<&Error>) -> Result<()> {
        (self.0)(ctx, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::application::Environ;
    use crate::core::Request;
    use std::sync::Arc;

    struct Passive;

    impl Hook for Passive {
        fn name(&self) -> &'static str {
            "passive"
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Arc::new(App::new()), Environ::new(Request::get("/test")))
    }

    #[test]
    fn test_hook_result() {
        assert!(HookResult::Next.is_next());
        assert!(HookResult::Stop(Reply::Empty).is_stop());
    }

    #[test]
    fn test_hook_default_implementations() {
        let hook = Passive;
        let mut ctx = ctx();

        assert_eq!(hook.priority(), 0);
        assert!(hook.before_request(&mut ctx).unwrap().is_next());

        let res = hook.after_request(Response::ok("test"), &mut ctx).unwrap();
        assert_eq!(res.status(), http::StatusCode::OK);
        assert!(hook.teardown(&mut ctx, None).is_ok());
    }

    #[test]
    fn test_closure_hooks() {
        let mut ctx = ctx();

        let stop = BeforeRequest(|_: &mut RequestContext| Ok(Some(Reply::from("early"))));
        assert!(stop.before_request(&mut ctx).unwrap().is_stop());

        let tag = AfterRequest(|res: Response, _: &mut RequestContext| Ok(res.with_header("x-tag", "1")));
        let res = tag.after_request(Response::ok("x"), &mut ctx).unwrap();
        assert_eq!(res.header("x-tag"), Some("1"));

        let seen = Teardown(|ctx: &mut RequestContext, err: Option<&Error>| {
            ctx.set("teardown_error", err.map(|e| e.to_string()));
            Ok(())
        });
        seen.teardown(&mut ctx, Some(&Error::from("boom"))).unwrap();
        assert_eq!(
            ctx.get::<Option<String>>("teardown_error"),
            Some(&Some("boom".to_string()))
        );
    }
}
