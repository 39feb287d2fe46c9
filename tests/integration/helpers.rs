//! Test helpers and utilities

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use reqwest::{Client, Response, StatusCode};

use tokio_wsgi::app::{asynchronous, plain, websocket};
use tokio_wsgi::bridge::{HandlerOutcome, Outcome};
use tokio_wsgi::config::ServerConfig;
use tokio_wsgi::core::{Error, RequestContext, Response as AppResponse};
use tokio_wsgi::websocket::Message;
use tokio_wsgi::{App, Application, Server};

/// Server running on its own thread for the duration of a test.
pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub client: Client,
    shutdown: Box<dyn Fn() + Send + Sync>,
}

#[allow(dead_code)]
impl TestServer {
    /// Serve `app` on 127.0.0.1 with an ephemeral port.
    pub fn start<A: Application>(app: A) -> Self {
        let config = ServerConfig::default().with_address("127.0.0.1", 0);
        let server = Arc::new(Server::bind(config, app).expect("Failed to bind test server"));
        let addr = server.local_addr();

        let runner = Arc::clone(&server);
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to build runtime");
            runtime.block_on(async move {
                let _ = runner.run().await;
            });
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: format!("http://{}", addr),
            addr,
            client,
            shutdown: Box::new(move || server.trigger_shutdown()),
        }
    }

    /// Serve the demo application.
    pub fn demo() -> Self {
        Self::start(Arc::new(demo_app()))
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Make a GET request to the server
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// Make a GET request with custom headers
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> Response {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        req.send().await.expect("GET request failed")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        (self.shutdown)();
    }
}

/// Routes shared by the HTTP and WebSocket tests.
pub fn demo_app() -> App {
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
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(HandlerOutcome::from("done"))
            }))
        }),
    );
    app.route(
        "/async-stream",
        plain(|_: &mut RequestContext| {
            let body = stream::iter(["Hello, ", "World!"]).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, Error>(Bytes::from_static(chunk.as_bytes()))
            });
            Ok(AppResponse::from_stream(body))
        }),
    );
    app.route(
        "/teapot",
        plain(|_: &mut RequestContext| Ok(("short and stout", StatusCode::IM_A_TEAPOT))),
    );
    app.route(
        "/fail",
        plain(|_: &mut RequestContext| -> tokio_wsgi::core::Result<&'static str> {
            Err(Error::from("boom"))
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

    app.after_request(|res, _ctx| Ok(res.with_header("x-served-by", "tokio_wsgi")));
    app
}

/// Assert that response has expected status
pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Assert that response contains header
pub fn assert_header(response: &Response, name: &str, expected: &str) {
    let value = response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap();
    assert_eq!(value, expected, "Header '{}' mismatch", name);
}

/// Assert that response contains header with prefix
pub fn assert_header_starts_with(response: &Response, name: &str, prefix: &str) {
    let value = response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap();
    assert!(
        value.starts_with(prefix),
        "Header '{}' expected to start with '{}', got '{}'",
        name,
        prefix,
        value
    );
}

/// Assert that response body contains substring
pub async fn assert_body_contains(response: Response, substring: &str) {
    let body = response.text().await.expect("Failed to read body");
    assert!(
        body.contains(substring),
        "Body does not contain '{}'. Body: {}",
        substring,
        &body[..body.len().min(500)]
    );
}
