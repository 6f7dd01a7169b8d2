//! A slow endpoint behind the response cache.
//!
//! ```text
//! cargo run --example cached_server
//! curl -i http://127.0.0.1:8080/articles/hello      # ~300ms, stored
//! curl -i http://127.0.0.1:8080/articles/hello      # instant, X-Rttp-Response-Cache: true
//! curl -i http://127.0.0.1:8080/articles/hello?nocache=1
//! ```
//!
//! Options can be loaded from a JSON file named by `RTTP_CACHE_SETTINGS`.
//! With `RTTP_CACHE_REDIS` set, responses are kept in Redis instead of memory.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use rttp_cache::cache::{CacheSettings, ResponseCache};
use rttp_cache::context::Context;
use rttp_cache::store::{CacheStore, EventSender, MemoryStore, StoreEvent, event_channel};
use rttp_cache::{Pipeline, Response, Server, StatusCode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rttp_cache=debug")),
        )
        .init();

    let settings = match std::env::var("RTTP_CACHE_SETTINGS") {
        Ok(path) => CacheSettings::from_json(&std::fs::read_to_string(path)?)?,
        Err(_) => CacheSettings::default(),
    };

    let (events, receiver) = event_channel();
    let store = open_store(&settings, events).await;

    let config = settings
        .into_builder()
        .route("/articles/:slug")
        .route_with_expire("/api/(.*)", Duration::from_secs(30))
        .exclude("/articles/drafts")
        .pass_param("nocache")
        .on_error(|e| error!(error = %e, "response cache"))
        .build()?;
    let (cache, _listener) = ResponseCache::with_events(config, store, receiver);

    let pipeline = Pipeline::new(render).layer(cache);

    let server = Server::bind("127.0.0.1:8080").await?;
    server.run(pipeline).await?;
    Ok(())
}

async fn render(ctx: Context) -> Response {
    tokio::time::sleep(Duration::from_millis(300)).await;

    let path = ctx.request().path();
    if let Some(slug) = path.strip_prefix("/articles/") {
        Response::new(StatusCode::Ok)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(format!("<h1>{slug}</h1>"))
    } else if path.starts_with("/api/") {
        Response::new(StatusCode::Ok).json(json!({ "path": path }))
    } else {
        Response::new(StatusCode::NotFound).body("Not Found")
    }
}

#[cfg(feature = "redis")]
async fn open_store(settings: &CacheSettings, events: EventSender) -> Arc<dyn CacheStore> {
    use rttp_cache::store::RedisStore;

    if std::env::var_os("RTTP_CACHE_REDIS").is_some() {
        match RedisStore::connect(&settings.redis, events.clone()).await {
            Ok(store) => return Arc::new(store),
            Err(e) => warn!(error = %e, "redis unavailable, using the in-memory store"),
        }
    }
    memory(events)
}

#[cfg(not(feature = "redis"))]
async fn open_store(_settings: &CacheSettings, events: EventSender) -> Arc<dyn CacheStore> {
    if std::env::var_os("RTTP_CACHE_REDIS").is_some() {
        warn!("built without redis support, using the in-memory store");
    }
    memory(events)
}

fn memory(events: EventSender) -> Arc<dyn CacheStore> {
    let _ = events.send(StoreEvent::Connected);
    Arc::new(MemoryStore::new())
}
