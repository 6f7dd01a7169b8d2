//! Response bodies in the shapes downstream handlers produce them.
//!
//! Handlers may answer with text, raw bytes, a structured JSON value, or a
//! streaming reader. The cache needs to tell these apart because each one is
//! turned into storable bytes differently, and a stream can only be read once.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// A boxed async byte source used for streaming bodies.
pub type BodyStream = Pin<Box<dyn AsyncRead + Send>>;

/// The body of a [`Response`](super::Response).
#[derive(Default)]
pub enum Body {
    /// No body at all.
    #[default]
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
    /// A structured value, serialized when written to the wire.
    Json(serde_json::Value),
    /// A single-use byte stream.
    Stream(BodyStream),
}

impl Body {
    /// Returns `true` when the body carries something worth sending.
    ///
    /// Empty text counts as absent; an empty byte buffer does not. This mirrors
    /// how the handlers this cache fronts distinguish "no body" from "zero
    /// bytes on purpose".
    pub fn is_present(&self) -> bool {
        match self {
            Body::Empty => false,
            Body::Text(text) => !text.is_empty(),
            Body::Binary(_) | Body::Json(_) | Body::Stream(_) => true,
        }
    }

    /// Borrows the bytes of an in-memory body. `None` for JSON, streams and `Empty`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Text(text) => Some(text.as_bytes()),
            Body::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Binary(bytes) => f.debug_tuple("Binary").field(bytes).finish(),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Binary(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// Reads `stream` to completion.
///
/// On a read error the bytes received so far are returned alongside the
/// error, since the stream itself is gone by then and those bytes are all the
/// caller has left to send.
pub async fn drain(mut stream: BodyStream) -> Result<Bytes, (io::Error, Bytes)> {
    let mut buf = Vec::new();
    match stream.read_to_end(&mut buf).await {
        Ok(_) => Ok(Bytes::from(buf)),
        Err(e) => Err((e, Bytes::from(buf))),
    }
}

/// A stream that yields `partial` and then fails with `error`.
///
/// Used to hand a drained stream back to the response when draining failed,
/// so whoever sends the response sees the same failure.
pub fn truncated(partial: Bytes, error: io::Error) -> BodyStream {
    Box::pin(io::Cursor::new(partial).chain(FailOnce(Some(error))))
}

struct FailOnce(Option<io::Error>);

impl AsyncRead for FailOnce {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.0.take() {
            Some(error) => Poll::Ready(Err(error)),
            None => Poll::Ready(Ok(())),
        }
    }
}
