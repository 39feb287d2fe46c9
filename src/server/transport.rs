//! [`Transport`] over a hyper service response.
//!
//! The service future waits on a oneshot for the response head. Once the
//! request cycle starts its response, the head is completed with a
//! channel-fed body and every later write goes into that channel.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::streaming::{stream_channel, streaming_response, BodyChunk, StreamingResponse};
use crate::core::{Error, ResponseHead, Result};
use crate::emit::Transport;

/// Write side handed to a request cycle running in its own task.
pub struct HyperTransport {
    head_tx: Option<oneshot::Sender<StreamingResponse>>,
    body_tx: Option<mpsc::Sender<BodyChunk>>,
    buffer: usize,
}

impl HyperTransport {
    /// Transport plus the receiver the service awaits for the response.
    pub fn new(buffer: usize) -> (Self, oneshot::Receiver<StreamingResponse>) {
        let (head_tx, head_rx) = oneshot::channel();
        let transport = Self {
            head_tx: Some(head_tx),
            body_tx: None,
            buffer,
        };
        (transport, head_rx)
    }

    /// True once a response head went out to hyper.
    pub fn head_sent(&self) -> bool {
        self.head_tx.is_none()
    }

    /// Fail the body in progress so the client sees a cut connection
    /// rather than a clean end of stream.
    pub async fn abort(&mut self, err: Error) {
        if let Some(tx) = self.body_tx.take() {
            let _ = tx.send(Err(err)).await;
        }
    }

    fn disconnected() -> Error {
        Error::Transport("client disconnected".into())
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn start(&mut self, head: ResponseHead) -> Result<()> {
        let head_tx = self
            .head_tx
            .take()
            .ok_or_else(|| Error::InvalidResponse("response head already sent".into()))?;

        let (body_tx, body_rx) = stream_channel(self.buffer);
        let response = streaming_response(head, body_rx)?;
        head_tx.send(response).map_err(|_| Self::disconnected())?;
        self.body_tx = Some(body_tx);
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let tx = self
            .body_tx
            .as_ref()
            .ok_or_else(|| Error::Transport("body already finished".into()))?;
        tx.send(Ok(chunk)).await.map_err(|_| Self::disconnected())
    }

    async fn write_eof(&mut self) -> Result<()> {
        self.body_tx = None;
        Ok(())
    }
}
