//! Backing key-value stores for cached responses.
//!
//! The cache talks to its store through [`CacheStore`]: a byte-oriented `get`
//! and an expiring `set_ex`, nothing more. Connection health travels on a
//! separate channel of [`StoreEvent`]s so that the availability tracker can
//! follow it without ever issuing a command itself.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] — in-process, backed by a concurrent map.
//! - [`RedisStore`] — Redis through an auto-reconnecting connection manager
//!   (cargo feature `redis`).

use std::{future::Future, pin::Pin, time::Duration};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::{RedisSettings, RedisStore};

/// Boxed future returned by [`CacheStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Sending half of a store's lifecycle channel.
pub type EventSender = mpsc::UnboundedSender<StoreEvent>;

/// Receiving half of a store's lifecycle channel.
pub type EventReceiver = mpsc::UnboundedReceiver<StoreEvent>;

/// Creates a lifecycle channel pairing a store with an availability listener.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Errors raised by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection lost: {0}")]
    Disconnected(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Connection lifecycle notifications emitted by a store client.
#[derive(Debug)]
pub enum StoreEvent {
    /// The client (re)established its connection.
    Connected,
    /// The connection closed.
    Disconnected,
    /// The connection failed; the store should be treated as unreachable.
    Error(StoreError),
}

/// A byte-oriented key-value store with per-key expiry.
///
/// Implementations must serialize or multiplex concurrent operations
/// themselves; the cache shares one handle across every request without
/// locking.
pub trait CacheStore: Send + Sync {
    /// Fetches the value stored under `key`, or `None` when absent or expired.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Bytes>>;

    /// Stores `value` under `key`, expiring after `ttl` (whole seconds).
    fn set_ex<'a>(&'a self, key: &'a str, ttl: Duration, value: Bytes) -> StoreFuture<'a, ()>;
}
