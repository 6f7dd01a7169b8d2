//! HTTP/1.1 response builder.
//!
//! Responses are built fluently by handlers, decorated in place by middleware
//! (the cache rewrites status, body and content type on a hit), and finally
//! serialized to a byte buffer for transmission over TCP.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncRead;

use super::body::{self, Body};
use super::{Headers, StatusCode};

const CONTENT_TYPE: &str = "Content-Type";

/// An HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "text/plain")
///     .body("hello");
///
/// assert_eq!(response.mime_type(), Some("text/plain"));
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.ends_with("\r\n\r\nhello"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Empty,
            keep_alive: true,
        }
    }

    /// Appends a response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a text body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Text(body.into());
        self
    }

    /// Sets a binary body.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Binary(body.into());
        self
    }

    /// Sets a structured JSON body and declares `application/json`.
    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Body::Json(value);
        self.headers.set(CONTENT_TYPE, "application/json");
        self
    }

    /// Sets a streaming body, read once when the response is sent.
    #[must_use]
    pub fn stream(mut self, reader: impl AsyncRead + Send + 'static) -> Self {
        self.body = Body::Stream(Box::pin(reader));
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Appends a header in place, for middleware decorating a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Replaces any existing values of a header in place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Moves the body out, leaving [`Body::Empty`] behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// The full `Content-Type` header value, parameters included.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.headers.set(CONTENT_TYPE, content_type);
    }

    /// The media type without parameters, e.g. `application/json` for
    /// `application/json; charset=utf-8`.
    pub fn mime_type(&self) -> Option<&str> {
        self.content_type()
            .map(|value| value.split(';').next().unwrap_or(value).trim())
            .filter(|mime| !mime.is_empty())
    }

    /// Drains a streaming body into memory so the response can be serialized.
    ///
    /// Non-streaming bodies are left untouched.
    pub async fn buffer(mut self) -> io::Result<Self> {
        if !self.body.is_stream() {
            return Ok(self);
        }
        if let Body::Stream(stream) = self.take_body() {
            let bytes = body::drain(stream).await.map_err(|(e, _)| e)?;
            self.body = Body::Binary(bytes);
        }
        Ok(self)
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// Automatically adds `Content-Type` for non-empty text bodies that did
    /// not declare one, `Content-Length`, and `Connection`. A streaming body
    /// must be [`buffer`](Self::buffer)ed first; an unbuffered stream is
    /// written as an empty body.
    pub fn into_bytes(mut self) -> BytesMut {
        let payload: Bytes = match std::mem::take(&mut self.body) {
            Body::Empty => Bytes::new(),
            Body::Text(text) => {
                if !text.is_empty() && !self.headers.contains(CONTENT_TYPE) {
                    self.headers
                        .insert(CONTENT_TYPE, "text/plain; charset=utf-8");
                }
                Bytes::from(text)
            }
            Body::Binary(bytes) => bytes,
            Body::Json(value) => serde_json::to_vec(&value).map(Bytes::from).unwrap_or_default(),
            Body::Stream(_) => {
                tracing::warn!("streaming body serialized without buffering; sending it empty");
                Bytes::new()
            }
        };

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + payload.len());

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.put(format!("Content-Length: {}\r\n", payload.len()).as_bytes());
        buf.put(&b"\r\n"[..]);
        buf.put(payload);

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
