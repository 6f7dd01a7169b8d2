//! Capturing downstream responses and storing them.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::http::body::{self, Body};
use crate::http::{Method, Response, StatusCode};
use crate::store::CacheStore;

use super::error::CacheError;
use super::keys::TierKeys;

const JSON_MIME: &str = "application/json";

/// A response body in storable form, plus the type to store beside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Turns the downstream response into a [`Capture`], if it may be cached.
///
/// Only successful (`200`) `GET` responses with a body qualify. Text and
/// binary bodies are taken as they are, JSON values are serialized when the
/// response declares `application/json`, and streams are drained first, with
/// the drained bytes put back into `response` so the client still receives
/// them. Anything else, or anything over `max_length` bytes, yields `None`.
///
/// # Errors
///
/// [`CacheError::Serialize`] if a JSON body fails to serialize and
/// [`CacheError::Drain`] if a stream fails mid-read. In the latter case the
/// response body becomes a stream that replays the bytes read so far and then
/// fails the same way, so the response is sent exactly as it would have been.
pub async fn capture(
    method: &Method,
    response: &mut Response,
    max_length: Option<usize>,
) -> Result<Option<Capture>, CacheError> {
    if !method.is_cacheable()
        || response.status() != StatusCode::Ok
        || !response.body_ref().is_present()
    {
        return Ok(None);
    }

    if response.body_ref().is_stream() {
        if let Body::Stream(stream) = response.take_body() {
            match body::drain(stream).await {
                Ok(bytes) => response.set_body(bytes),
                Err((e, partial)) => {
                    let replay = io::Error::new(e.kind(), e.to_string());
                    response.set_body(Body::Stream(body::truncated(partial, replay)));
                    return Err(CacheError::Drain(e));
                }
            }
        }
    }

    let bytes = match response.body_ref() {
        Body::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
        Body::Binary(bytes) => bytes.clone(),
        Body::Json(value) if response.mime_type() == Some(JSON_MIME) => {
            Bytes::from(serde_json::to_vec(value)?)
        }
        _ => return Ok(None),
    };

    if let Some(max) = max_length.filter(|max| bytes.len() > *max) {
        debug!(len = bytes.len(), max, "response too large to cache");
        return Ok(None);
    }

    Ok(Some(Capture {
        body: bytes,
        content_type: response.content_type().map(str::to_owned),
    }))
}

/// Stores `capture` under `keys`, value first, then its type with the same TTL.
pub async fn write(
    store: &dyn CacheStore,
    keys: &TierKeys,
    capture: &Capture,
    ttl: Duration,
) -> Result<(), CacheError> {
    store
        .set_ex(&keys.value, ttl, capture.body.clone())
        .await
        .map_err(CacheError::Write)?;

    if let Some(content_type) = &capture.content_type {
        store
            .set_ex(&keys.content_type, ttl, Bytes::from(content_type.clone()))
            .await
            .map_err(CacheError::Write)?;
    }

    debug!(key = %keys.value, ttl_secs = ttl.as_secs(), "response cached");
    Ok(())
}
