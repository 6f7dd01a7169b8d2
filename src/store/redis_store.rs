//! Redis-backed store.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use bytes::Bytes;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::{AsyncCommands, RedisError, RedisResult};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{CacheStore, EventSender, StoreError, StoreEvent, StoreFuture};

/// Where to find Redis and how eagerly to look for it again after losing it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    /// Full connection URL; overrides `host` and `port` when set.
    pub url: Option<String>,
    /// Delay between reconnection attempts after the connection drops.
    pub reconnect_interval_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 6379,
            url: None,
            reconnect_interval_ms: 1000,
        }
    }
}

impl RedisSettings {
    pub fn url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("redis://{}:{}/", self.host, self.port))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

struct Shared {
    client: redis::Client,
    // Set once the first connection succeeds; the manager reconnects by itself after that.
    manager: OnceCell<ConnectionManager>,
    events: EventSender,
    healthy: AtomicBool,
    closed: AtomicBool,
    reconnect_interval: Duration,
}

/// A [`CacheStore`] on Redis `GET` / `SETEX`.
///
/// The underlying [`ConnectionManager`] multiplexes commands over one
/// connection and reconnects on demand. This type adds the lifecycle events
/// the availability tracker listens to: `Connected` after a successful
/// connect, `Error` the first time a command fails for connection reasons,
/// and `Connected` again once a background task gets an answer.
///
/// A server that is down at startup is handled the same way: the store is
/// returned in the down state and the retry task keeps trying until Redis comes up.
#[derive(Clone)]
pub struct RedisStore {
    inner: Arc<Shared>,
}

impl RedisStore {
    /// Connects to Redis, reporting the outcome on `events`.
    ///
    /// An unreachable server is not an error: an `Error` event is emitted and
    /// a background task retries every `reconnect_interval`, emitting
    /// `Connected` once it gets through.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] when the URL is invalid.
    pub async fn connect(settings: &RedisSettings, events: EventSender) -> Result<Self, StoreError> {
        let url = settings.url();
        let client = match redis::Client::open(url.as_str()) {
            Ok(client) => client,
            Err(e) => {
                warn!(url = %url, error = %e, "invalid redis url");
                let _ = events.send(StoreEvent::Error(StoreError::Disconnected(e.to_string())));
                return Err(e.into());
            }
        };

        let store = Self {
            inner: Arc::new(Shared {
                client,
                manager: OnceCell::new(),
                events,
                healthy: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                reconnect_interval: settings.reconnect_interval(),
            }),
        };

        match store.inner.client.get_connection_manager().await {
            Ok(manager) => {
                let _ = store.inner.manager.set(manager);
                info!(url = %url, "connected to redis");
                let _ = store.inner.events.send(StoreEvent::Connected);
            }
            Err(e) => store.mark_down(&e),
        }
        Ok(store)
    }

    /// Announces a deliberate shutdown. No reconnection is attempted.
    pub fn disconnect(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.healthy.store(false, Ordering::SeqCst);
        let _ = self.inner.events.send(StoreEvent::Disconnected);
    }

    fn manager(&self) -> Result<ConnectionManager, StoreError> {
        self.inner
            .manager
            .get()
            .cloned()
            .ok_or_else(|| StoreError::Disconnected("redis not connected yet".to_owned()))
    }

    fn observe<T>(&self, result: RedisResult<T>) -> Result<T, StoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if is_connection_error(&e) {
                    self.mark_down(&e);
                }
                Err(e.into())
            }
        }
    }

    fn mark_down(&self, e: &RedisError) {
        if !self.inner.healthy.swap(false, Ordering::SeqCst) {
            return;
        }
        warn!(error = %e, "redis connection lost");
        let _ = self
            .inner
            .events
            .send(StoreEvent::Error(StoreError::Disconnected(e.to_string())));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while !inner.events.is_closed() && !inner.closed.load(Ordering::SeqCst) {
                tokio::time::sleep(inner.reconnect_interval).await;
                match check_connection(&inner).await {
                    Ok(()) => {
                        inner.healthy.store(true, Ordering::SeqCst);
                        info!("redis connection restored");
                        let _ = inner.events.send(StoreEvent::Connected);
                        break;
                    }
                    Err(e) => debug!(error = %e, "redis still unreachable"),
                }
            }
        });
    }
}

/// PINGs through the existing manager, or builds the first one.
async fn check_connection(inner: &Shared) -> RedisResult<()> {
    match inner.manager.get() {
        Some(manager) => {
            let mut conn = manager.clone();
            conn.req_packed_command(&redis::cmd("PING")).await.map(|_| ())
        }
        None => {
            let manager = inner.client.get_connection_manager().await?;
            let _ = inner.manager.set(manager);
            Ok(())
        }
    }
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

impl CacheStore for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Bytes>> {
        Box::pin(async move {
            let mut conn = self.manager()?;
            let result = conn.get::<_, Option<Vec<u8>>>(key).await;
            self.observe(result).map(|value| value.map(Bytes::from))
        })
    }

    fn set_ex<'a>(&'a self, key: &'a str, ttl: Duration, value: Bytes) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.manager()?;
            let result = conn
                .set_ex::<_, _, ()>(key, value.to_vec(), ttl.as_secs())
                .await;
            self.observe(result)
        })
    }
}
