//! Channel-fed response bodies for hyper.
//!
//! A request cycle runs in its own task and pushes body chunks into a
//! bounded channel; hyper pulls them out through [`ChunkFrameStream`]
//! as the client reads. An `Err` item aborts the connection instead of
//! ending the body cleanly.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::StreamBody;
use hyper::body::Frame;
use hyper::Response;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

use crate::core::{Error, ResponseHead, Result};

/// Item carried by a body channel.
pub type BodyChunk = Result<Bytes>;

/// Converts channel items to body frames.
pub struct ChunkFrameStream {
    inner: ReceiverStream<BodyChunk>,
}

impl ChunkFrameStream {
    pub fn new(rx: mpsc::Receiver<BodyChunk>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

impl Stream for ChunkFrameStream {
    type Item = std::result::Result<Frame<Bytes>, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Streaming body used for every response the server sends.
pub type StreamingBody = StreamBody<ChunkFrameStream>;

/// Streaming HTTP response.
pub type StreamingResponse = Response<StreamingBody>;

/// Default buffer size for body channels.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 100;

/// Create a body channel holding up to `buffer_size` chunks.
#[inline]
pub fn stream_channel(buffer_size: usize) -> (mpsc::Sender<BodyChunk>, mpsc::Receiver<BodyChunk>) {
    mpsc::channel(buffer_size.max(1))
}

/// Build a hyper response from a frozen head and a body channel.
///
/// A custom reason phrase travels as a [`hyper::ext::ReasonPhrase`]
/// extension so the HTTP/1 encoder writes it on the status line.
pub fn streaming_response(head: ResponseHead, body_rx: mpsc::Receiver<BodyChunk>) -> Result<StreamingResponse> {
    let mut builder = Response::builder().status(head.status);

    if let Some(reason) = head.reason.as_deref() {
        if let Ok(phrase) = hyper::ext::ReasonPhrase::try_from(reason.as_bytes().to_vec()) {
            builder = builder.extension(phrase);
        }
    }

    for (name, value) in head.headers {
        builder = builder.header(name, value);
    }

    Ok(builder.body(StreamBody::new(ChunkFrameStream::new(body_rx)))?)
}

/// Plain-text response with a fixed body, for failures that happen before
/// any application output exists.
pub fn plain_response(status: StatusCode, body: &'static str) -> StreamingResponse {
    let (tx, rx) = stream_channel(1);
    if !body.is_empty() {
        let _ = tx.try_send(Ok(Bytes::from_static(body.as_bytes())));
    }
    drop(tx);

    let mut response = Response::new(StreamBody::new(ChunkFrameStream::new(rx)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
