//! Tracks whether the backing store is reachable.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::{EventReceiver, StoreEvent};

use super::config::ErrorHook;
use super::error::CacheError;

/// A shared reachability flag for the backing store.
///
/// Starts out unavailable and changes only in response to [`StoreEvent`]s.
/// Reading it never blocks, so the cache checks it on every request.
#[derive(Debug, Clone, Default)]
pub struct Availability {
    up: Arc<AtomicBool>,
}

impl Availability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Applies one lifecycle event. Connection errors are passed to `on_error`.
    pub fn apply(&self, event: StoreEvent, on_error: Option<&ErrorHook>) {
        match event {
            StoreEvent::Connected => {
                info!("cache store connected; caching enabled");
                self.up.store(true, Ordering::Release);
            }
            StoreEvent::Disconnected => {
                info!("cache store disconnected; caching disabled");
                self.up.store(false, Ordering::Release);
            }
            StoreEvent::Error(error) => {
                self.up.store(false, Ordering::Release);
                let error = CacheError::Connection(error);
                warn!(error = %error, "caching disabled");
                if let Some(on_error) = on_error {
                    on_error(&error);
                }
            }
        }
    }

    /// Spawns the listener task that owns all updates from now on.
    ///
    /// The task ends when every sender of `events` has been dropped.
    pub fn listen(&self, mut events: EventReceiver, on_error: Option<ErrorHook>) -> JoinHandle<()> {
        let availability = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                availability.apply(event, on_error.as_ref());
            }
        })
    }
}
