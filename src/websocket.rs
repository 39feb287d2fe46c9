//! WebSocket mode and the bidirectional message channel.
//!
//! A connection starts in [`Mode::Http`]. When the request is an upgrade
//! the adapter answers the handshake, flips the connection's
//! [`StartResponse`](crate::emit::StartResponse) to [`Mode::Upgraded`] and
//! injects a [`WebSocket`] into the request context. From then on the
//! handler talks through `send`/`receive`; ordinary HTTP output is dropped.

use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::core::{Error, Result};

pub use tokio_tungstenite::tungstenite::Message;

/// Byte stream a WebSocket runs over.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Resolves to the raw connection once the 101 response is on the wire.
pub type UpgradeFuture = BoxFuture<'static, Result<Box<dyn Io>>>;

/// Execution model of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Http,
    Upgraded,
}

enum State {
    Pending(UpgradeFuture),
    Open(Box<WebSocketStream<Box<dyn Io>>>),
    Closed,
}

/// Server side of an upgraded connection.
pub struct WebSocket {
    state: State,
}

impl WebSocket {
    /// Channel over a connection whose upgrade has not completed yet.
    pub fn pending<F>(upgrade: F) -> Self
    where
        F: Future<Output = Result<Box<dyn Io>>> + Send + 'static,
    {
        Self {
            state: State::Pending(Box::pin(upgrade)),
        }
    }

    /// Channel over an already upgraded byte stream.
    pub async fn from_io<S: Io + 'static>(io: S) -> Self {
        let io: Box<dyn Io> = Box::new(io);
        let stream = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
        Self {
            state: State::Open(Box::new(stream)),
        }
    }

    async fn open(&mut self) -> Result<&mut WebSocketStream<Box<dyn Io>>> {
        if matches!(self.state, State::Pending(_)) {
            if let State::Pending(upgrade) = std::mem::replace(&mut self.state, State::Closed) {
                let io = upgrade.await?;
                let stream = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                debug!("websocket upgrade completed");
                self.state = State::Open(Box::new(stream));
            }
        }

        match &mut self.state {
            State::Open(stream) => Ok(stream.as_mut()),
            _ => Err(Error::WebSocketClosed),
        }
    }

    /// Next message from the peer.
    ///
    /// A close frame is answered and returned; the channel is closed
    /// afterwards. A peer vanishing without a close frame also yields
    /// `Message::Close(None)`.
    pub async fn receive(&mut self) -> Result<Message> {
        let stream = self.open().await?;
        let next = stream.next().await;

        match next {
            Some(Ok(WsMessage::Close(frame))) => {
                if let Err(e) = stream.flush().await {
                    debug!(error = %e, "failed to flush close reply");
                }
                self.state = State::Closed;
                Ok(WsMessage::Close(frame))
            }
            Some(Ok(message)) => Ok(message),
            Some(Err(e)) => {
                self.state = State::Closed;
                Err(e.into())
            }
            None => {
                self.state = State::Closed;
                Ok(WsMessage::Close(None))
            }
        }
    }

    pub async fn send(&mut self, message: Message) -> Result<()> {
        let stream = self.open().await?;
        let result = stream.send(message).await;
        if let Err(e) = result {
            self.state = State::Closed;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send(WsMessage::Text(text.into())).await
    }

    pub async fn send_binary(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(WsMessage::Binary(data.into())).await
    }

    /// Start the closing handshake. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if matches!(self.state, State::Closed) {
            return Ok(());
        }
        let stream = self.open().await?;
        let result = stream.close(None).await;
        self.state = State::Closed;

        match result {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Pending(_) => "pending",
            State::Open(_) => "open",
            State::Closed => "closed",
        };
        f.debug_struct("WebSocket").field("state", &state).finish()
    }
}
