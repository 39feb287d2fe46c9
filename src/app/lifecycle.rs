//! One request through an [`App`].
//!
//! The cycle owns the [`RequestContext`] from start to finish. Once a
//! response is ready its head goes to `start_response`; the context moves
//! into the payload's release so teardown hooks run after the body has
//! been emitted, or right away when the cycle fails.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use super::App;
use crate::application::Environ;
use crate::bridge::{drive, HandlerOutcome, Outcome};
use crate::core::{Error, Reply, RequestContext, Response, Result};
use crate::emit::{Payload, StartResponse};

pub(crate) async fn run(app: Arc<App>, environ: Environ, start: StartResponse) -> Result<Outcome<Payload>> {
    let ctx = RequestContext::new(Arc::clone(&app), environ);
    let span = info_span!(
        "request",
        request_id = %ctx.request_id,
        method = %ctx.request().method(),
        path = ctx.request().path(),
    );
    cycle(app, ctx, start).instrument(span).await
}

async fn cycle(app: Arc<App>, mut ctx: RequestContext, start: StartResponse) -> Result<Outcome<Payload>> {
    let (response, unhandled) = match full_dispatch(&app, &mut ctx).await {
        Ok(response) => (response, None),
        Err(err) => match recover(&app, &mut ctx, &err).await {
            Ok(Some(response)) => (response, Some(err)),
            Ok(None) => return fail(&app, &mut ctx, err),
            Err(fatal) => return fail(&app, &mut ctx, fatal),
        },
    };

    let (head, body) = response.into_parts();
    if let Err(err) = start.start(head) {
        return fail(&app, &mut ctx, err);
    }

    debug!(status = ?start.status(), "response ready");
    let payload = Payload::new(body).with_release(move |emit_err: Option<&Error>| {
        let err = emit_err.or(unhandled.as_ref());
        app.do_teardown_request(&mut ctx, err)
    });
    Ok(Outcome::Done(payload))
}

/// Hooks, dispatch, user error handlers and response processing.
async fn full_dispatch(app: &App, ctx: &mut RequestContext) -> Result<Response> {
    let reply = match app.preprocess_request(ctx) {
        Ok(Some(reply)) => reply,
        Ok(None) => match dispatch(app, ctx).await {
            Ok(reply) => reply,
            Err(err) => user_exception(app, err, ctx).await?,
        },
        Err(err) => user_exception(app, err, ctx).await?,
    };

    let response = app.make_response(reply, ctx)?;
    app.process_response(response, ctx)
}

async fn dispatch(app: &App, ctx: &mut RequestContext) -> Result<Reply> {
    let handler = app.match_request(ctx)?;
    let outcome = handler.call(ctx).await?;
    resolve(outcome).await
}

async fn user_exception(app: &App, err: Error, ctx: &mut RequestContext) -> Result<Reply> {
    let outcome = app.handle_user_exception(err, ctx)?;
    resolve(outcome).await
}

async fn resolve(outcome: HandlerOutcome) -> Result<Reply> {
    Ok(drive(outcome).await?.into_reply())
}

/// Final fallback. `None` lets the original error escape; after-request
/// hooks do not run on this path.
async fn recover(app: &App, ctx: &mut RequestContext, err: &Error) -> Result<Option<Response>> {
    match app.handle_exception(err, ctx)? {
        Some(outcome) => {
            let reply = resolve(outcome).await?;
            app.make_response(reply, ctx).map(Some)
        }
        None => Ok(None),
    }
}

/// Run teardown for a cycle that produced no payload, then report `err`.
fn fail(app: &App, ctx: &mut RequestContext, err: Error) -> Result<Outcome<Payload>> {
    app.do_teardown_request(ctx, Some(&err))?;
    Err(err)
}
