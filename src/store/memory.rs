//! In-process store on a concurrent map.

use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheStore, StoreFuture};

#[derive(Debug, Clone)]
struct Entry {
    data: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// A [`CacheStore`] living entirely in process memory.
///
/// Expiry is measured on Tokio's clock, so paused-time tests can advance past
/// a TTL without sleeping. Expired entries are dropped lazily on read.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use rttp_cache::store::{CacheStore, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.set_ex("k", Duration::from_secs(60), Bytes::from_static(b"v")).await.unwrap();
/// assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<Bytes> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.data.clone())
    }
}

impl CacheStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Bytes>> {
        Box::pin(async move { Ok(self.lookup(key)) })
    }

    fn set_ex<'a>(&'a self, key: &'a str, ttl: Duration, value: Bytes) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let entry = Entry {
                data: value,
                expires_at: Instant::now() + Duration::from_secs(ttl.as_secs()),
            };
            self.entries.insert(key.to_owned(), entry);
            tracing::trace!(key = %key, ttl_secs = ttl.as_secs(), "memory store set");
            Ok(())
        })
    }
}
