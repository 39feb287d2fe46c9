//! Ordered hook execution.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Hook, HookResult};
use crate::core::{Error, RequestContext, Response, Result};

/// Hooks sorted by priority.
///
/// `before_request` runs in priority order; `after_request` and
/// `teardown` run in reverse. Hooks with equal priority keep their
/// registration order.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook (builder form).
    pub fn add<H: Hook + 'static>(mut self, hook: H) -> Self {
        self.push(Arc::new(hook));
        self
    }

    /// Add a shared hook.
    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
        // stable sort keeps registration order within a priority
        self.hooks.sort_by_key(|h| h.priority());
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Hook names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Run `before_request` hooks until one stops the request.
    pub fn process_request(&self, ctx: &mut RequestContext) -> Result<HookResult> {
        for hook in &self.hooks {
            if let HookResult::Stop(reply) = hook.before_request(ctx)? {
                debug!(hook = hook.name(), "request answered by hook");
                return Ok(HookResult::Stop(reply));
            }
        }
        Ok(HookResult::Next)
    }

    /// Pass the response through every `after_request` hook, last registered first.
    pub fn process_response(&self, mut res: Response, ctx: &mut RequestContext) -> Result<Response> {
        for hook in self.hooks.iter().rev() {
            res = hook.after_request(res, ctx)?;
        }
        Ok(res)
    }

    /// Run every teardown hook in reverse order.
    ///
    /// A failing hook does not stop the remaining ones; the first failure
    /// is returned.
    pub fn teardown(&self, ctx: &mut RequestContext, error: Option<&Error>) -> Result<()> {
        let mut first: Option<Error> = None;

        for hook in self.hooks.iter().rev() {
            if let Err(e) = hook.teardown(ctx, error) {
                if first.is_none() {
                    first = Some(e);
                } else {
                    warn!(hook = hook.name(), error = %e, "teardown hook failed");
                }
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain").field("hooks", &self.names()).finish()
    }
}
