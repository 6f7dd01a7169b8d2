//! Response caching middleware.
//!
//! [`ResponseCache`] sits in a [`Pipeline`](crate::middleware::Pipeline) and,
//! for each eligible request:
//!
//! 1. looks the request target up in the store and answers directly on a hit;
//! 2. otherwise runs the rest of the pipeline;
//! 3. stores the downstream response if it is a `200` answer to a `GET` with
//!    a body no larger than the configured limit.
//!
//! With the backup tier enabled every stored response is written twice: to
//! the primary keys with the normal TTL and to a separate `_dump_` namespace
//! with a longer one. Requests picked by `check_dump` read from the backup
//! tier, which lets an application keep serving stale pages while its
//! upstream is down.
//!
//! The cache never changes what the client would have received otherwise.
//! Store failures turn into misses and skipped writes; they are logged and
//! handed to the configured error hook.

mod availability;
mod config;
mod eligibility;
mod error;
mod keys;
mod pattern;
mod reader;
mod settings;
mod writer;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::Context;
use crate::http::Response;
use crate::middleware::{Middleware, Next, ResponseFuture};
use crate::store::{CacheStore, EventReceiver};

pub use availability::Availability;
pub use config::{
    CacheConfig, CacheConfigBuilder, DEFAULT_EXPIRE, DEFAULT_EXPIRE_DUMP, DEFAULT_PREFIX, DEFAULT_ROUTE,
    ErrorHook, KeyPrefix, PrefixFn, RequestPredicate, RouteRule,
};
pub use eligibility::{Eligibility, evaluate};
pub use error::{CacheError, ConfigError};
pub use keys::{CacheKeys, TierKeys};
pub use pattern::{PatternError, RoutePattern};
pub use reader::{CACHE_HIT_HEADER, DEFAULT_CONTENT_TYPE};
pub use settings::{CacheSettings, RouteSetting};
pub use writer::Capture;

/// The response caching middleware.
///
/// Cheap to clone; clones share the store, the policy and the availability flag.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_cache::cache::{Availability, CacheConfig, ResponseCache};
/// use rttp_cache::middleware::Pipeline;
/// use rttp_cache::store::{MemoryStore, StoreEvent};
/// use rttp_cache::{Response, StatusCode, context::Context};
///
/// # fn demo() -> Result<(), rttp_cache::cache::ConfigError> {
/// let availability = Availability::new();
/// availability.apply(StoreEvent::Connected, None);
///
/// let config = CacheConfig::builder().prefix("rc:").route("/articles/:slug").build()?;
/// let cache = ResponseCache::new(config, Arc::new(MemoryStore::new()), availability);
///
/// let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("article") })
///     .layer(cache);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    availability: Availability,
}

impl ResponseCache {
    /// Creates the middleware over `store`, gated by `availability`.
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>, availability: Availability) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                availability,
            }),
        }
    }

    /// Creates the middleware and spawns a listener that drives its
    /// availability from `events`.
    ///
    /// Connection errors arriving on `events` reach the configured error hook.
    /// Must be called from within a Tokio runtime.
    pub fn with_events(
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        events: EventReceiver,
    ) -> (Self, JoinHandle<()>) {
        let availability = Availability::new();
        let listener = availability.listen(events, config.error_hook());
        (Self::new(config, store, availability), listener)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn availability(&self) -> &Availability {
        &self.inner.availability
    }

    async fn process(&self, ctx: Context, next: Next) -> Response {
        let Inner {
            config,
            store,
            availability,
        } = &*self.inner;

        let eligibility = evaluate(config, availability, &ctx);
        if !eligibility.apply {
            return next.run(ctx).await;
        }

        let prefix = config.prefix.resolve(&ctx);
        let keys = CacheKeys::derive(&prefix, ctx.request().uri(), config.is_backup());
        let tier = keys.read_tier(config.is_dump_read(&ctx));

        match reader::read(store.as_ref(), tier).await {
            Ok(Some(hit)) => {
                debug!(key = %tier.value, "cache hit");
                return hit;
            }
            Ok(None) => debug!(key = %tier.value, "cache miss"),
            Err(e) => config.report(&CacheError::Read(e)),
        }

        let method = ctx.request().method().clone();
        let mut response = next.run(ctx).await;

        let ttl = eligibility.ttl_override.unwrap_or(config.expire);
        match writer::capture(&method, &mut response, config.max_length).await {
            Ok(Some(capture)) => self.store_response(&keys, &capture, ttl).await,
            Ok(None) => {}
            Err(e) => config.report(&e),
        }

        response
    }

    /// Writes `capture` to every enabled tier, concurrently when there are two.
    async fn store_response(&self, keys: &CacheKeys, capture: &Capture, ttl: Duration) {
        let Inner { config, store, .. } = &*self.inner;
        let store = store.as_ref();

        let results = match (&keys.dump, &config.backup) {
            (Some(dump), Some(backup)) => {
                let (primary, dump) = tokio::join!(
                    writer::write(store, &keys.primary, capture, ttl),
                    writer::write(store, dump, capture, backup.expire),
                );
                vec![primary, dump]
            }
            _ => vec![writer::write(store, &keys.primary, capture, ttl).await],
        };

        for error in results.into_iter().filter_map(Result::err) {
            config.report(&error);
        }
    }
}

impl Middleware for ResponseCache {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let cache = self.clone();
        Box::pin(async move { cache.process(ctx, next).await })
    }
}
