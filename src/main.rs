use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};

use tokio_wsgi::app::{asynchronous, plain, websocket};
use tokio_wsgi::bridge::{HandlerOutcome, Outcome};
use tokio_wsgi::core::{Error, RequestContext, Response};
use tokio_wsgi::websocket::Message;
use tokio_wsgi::{App, Config};

fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut app = App::new();

    app.route("/plain", plain(|_: &mut RequestContext| Ok("Hello, World!")));

    app.route(
        "/stream",
        plain(|_: &mut RequestContext| Ok(HandlerOutcome::chunks(["Hello, ", "World!"]))),
    );

    app.route(
        "/late",
        plain(|_: &mut RequestContext| {
            Ok(Outcome::suspend(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(HandlerOutcome::from("done"))
            }))
        }),
    );

    app.route(
        "/async-stream",
        plain(|_: &mut RequestContext| {
            let body = stream::iter(["Hello, ", "World!"]).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, Error>(Bytes::from_static(chunk.as_bytes()))
            });
            Ok(Response::from_stream(body))
        }),
    );

    app.route(
        "/echo",
        websocket(asynchronous(|ctx| {
            Box::pin(async move {
                let ws = ctx.websocket()?;
                loop {
                    match ws.receive().await? {
                        Message::Close(_) => break,
                        Message::Text(text) => ws.send_text(text).await?,
                        Message::Binary(data) => ws.send_binary(data).await?,
                        _ => {}
                    }
                }
                Ok(HandlerOutcome::from(()))
            })
        })),
    );

    app.route(
        "/param/<arg>",
        websocket(asynchronous(|ctx| {
            Box::pin(async move {
                let arg = ctx.param("arg").unwrap_or_default().to_string();
                let ws = ctx.websocket()?;
                ws.send_text(arg).await?;
                ws.close().await?;
                Ok(HandlerOutcome::from(()))
            })
        })),
    );

    tokio_wsgi::run_with_config(app, Config::from_env()?)
}
