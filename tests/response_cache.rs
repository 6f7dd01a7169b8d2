//! End-to-end behaviour of the response cache inside a pipeline.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;

use rttp_cache::cache::{Availability, CACHE_HIT_HEADER, CacheConfig, CacheConfigBuilder, CacheError, ResponseCache};
use rttp_cache::context::Context;
use rttp_cache::middleware::{Middleware, Next, ResponseFuture};
use rttp_cache::store::{CacheStore, MemoryStore, StoreError, StoreEvent, StoreFuture, event_channel};
use rttp_cache::{Pipeline, Request, Response, Server, StatusCode};

// ── helpers ───────────────────────────────────────────────────────────────────

fn request(method: &str, target: &str) -> Request {
    let raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    Request::parse(raw.as_bytes()).unwrap().0
}

fn get(target: &str) -> Request {
    request("GET", target)
}

fn up() -> Availability {
    let availability = Availability::new();
    availability.apply(StoreEvent::Connected, None);
    availability
}

fn is_hit(response: &Response) -> bool {
    response.headers().get(CACHE_HIT_HEADER) == Some("true")
}

/// Collects everything handed to the error hook.
#[derive(Clone, Default)]
struct ErrorLog(Arc<Mutex<Vec<String>>>);

impl ErrorLog {
    fn hook(&self) -> impl Fn(&CacheError) + Send + Sync + 'static {
        let log = Arc::clone(&self.0);
        move |e: &CacheError| log.lock().unwrap().push(e.to_string())
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// An endpoint that counts its invocations.
struct Harness {
    store: Arc<MemoryStore>,
    calls: Arc<AtomicUsize>,
    pipeline: Pipeline,
}

impl Harness {
    fn new(builder: CacheConfigBuilder, respond: fn(&Context) -> Response) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(builder.build().unwrap(), store.clone(), up());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pipeline = Pipeline::new(move |ctx: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            let response = respond(&ctx);
            async move { response }
        })
        .layer(cache);
        Self { store, calls, pipeline }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn hello(_: &Context) -> Response {
    Response::new(StatusCode::Ok)
        .header("Content-Type", "text/plain")
        .body("hello")
}

/// Delegates to a [`MemoryStore`], optionally failing reads or some writes.
struct FlakyStore {
    inner: MemoryStore,
    fail_reads: bool,
    fail_write: fn(&str) -> bool,
}

impl FlakyStore {
    fn new(fail_reads: bool, fail_write: fn(&str) -> bool) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_reads,
            fail_write,
        }
    }
}

impl CacheStore for FlakyStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Bytes>> {
        if self.fail_reads {
            return Box::pin(async { Err(StoreError::Disconnected("connection reset".into())) });
        }
        self.inner.get(key)
    }

    fn set_ex<'a>(&'a self, key: &'a str, ttl: Duration, value: Bytes) -> StoreFuture<'a, ()> {
        if (self.fail_write)(key) {
            return Box::pin(async { Err(StoreError::Command("READONLY replica".into())) });
        }
        self.inner.set_ex(key, ttl, value)
    }
}

// ── eligibility ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn miss_then_hit() {
    let harness = Harness::new(CacheConfig::builder().prefix("rc:").route("/"), hello);

    let first = harness.pipeline.handle(get("/")).await;
    assert!(!is_hit(&first));
    assert_eq!(first.body_ref().as_bytes(), Some(&b"hello"[..]));
    assert_eq!(harness.store.get("rc:/").await.unwrap(), Some(Bytes::from_static(b"hello")));
    assert_eq!(
        harness.store.get("rc:/:type").await.unwrap(),
        Some(Bytes::from_static(b"text/plain"))
    );

    let second = harness.pipeline.handle(get("/")).await;
    assert!(is_hit(&second));
    assert_eq!(second.status(), StatusCode::Ok);
    assert_eq!(second.content_type(), Some("text/plain"));
    assert_eq!(second.body_ref().as_bytes(), Some(&b"hello"[..]));
    assert_eq!(harness.calls(), 1);
}

#[tokio::test]
async fn non_get_requests_are_never_stored() {
    let harness = Harness::new(CacheConfig::builder().prefix("rc:"), hello);

    let response = harness.pipeline.handle(request("POST", "/")).await;
    assert_eq!(response.body_ref().as_bytes(), Some(&b"hello"[..]));
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn non_200_responses_are_never_stored() {
    let harness = Harness::new(CacheConfig::builder(), |_| {
        Response::new(StatusCode::NotFound).body("gone")
    });

    harness.pipeline.handle(get("/missing")).await;
    harness.pipeline.handle(get("/missing")).await;
    assert!(harness.store.is_empty());
    assert_eq!(harness.calls(), 2);
}

#[tokio::test]
async fn oversized_bodies_are_passed_through_unstored() {
    let harness = Harness::new(CacheConfig::builder().max_length(3), hello);

    let response = harness.pipeline.handle(get("/")).await;
    assert_eq!(response.body_ref().as_bytes(), Some(&b"hello"[..]));
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn bypass_parameter_skips_read_and_write() {
    let harness = Harness::new(CacheConfig::builder().prefix("rc:").pass_param("nocache"), hello);

    harness.pipeline.handle(get("/page")).await;
    let bypassed = harness.pipeline.handle(get("/page?nocache=1")).await;
    assert!(!is_hit(&bypassed));
    assert_eq!(harness.calls(), 2);
    assert!(harness.store.get("rc:/page?nocache=1").await.unwrap().is_none());
}

#[tokio::test]
async fn exclusion_beats_the_catch_all_route() {
    let harness = Harness::new(CacheConfig::builder().route("(.*)").exclude("/admin/(.*)"), hello);

    harness.pipeline.handle(get("/admin/users")).await;
    let second = harness.pipeline.handle(get("/admin/users")).await;
    assert!(!is_hit(&second));
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn named_parameters_select_routes() {
    let harness = Harness::new(CacheConfig::builder().route("/news/:id").route("/static/(.*)"), hello);

    harness.pipeline.handle(get("/news/42")).await;
    harness.pipeline.handle(get("/static/css/site.css")).await;
    harness.pipeline.handle(get("/news/42/comments")).await;
    // two entries (value and type) for each cached target
    assert_eq!(harness.store.len(), 4);
}

#[tokio::test]
async fn distinct_query_strings_are_distinct_entries() {
    let harness = Harness::new(CacheConfig::builder(), hello);

    harness.pipeline.handle(get("/s?a=1&b=2")).await;
    let reordered = harness.pipeline.handle(get("/s?b=2&a=1")).await;
    assert!(!is_hit(&reordered));
    assert_eq!(harness.calls(), 2);
}

#[tokio::test]
async fn unavailable_store_passes_everything_through() {
    let store = Arc::new(MemoryStore::new());
    let config = CacheConfig::builder().build().unwrap();
    let cache = ResponseCache::new(config, store.clone(), Availability::new());
    let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("live") });
    let pipeline = pipeline.layer(cache);

    let response = pipeline.handle(get("/")).await;
    assert_eq!(response.body_ref().as_bytes(), Some(&b"live"[..]));
    assert!(store.is_empty());
}

#[tokio::test]
async fn store_events_toggle_caching() {
    let store = Arc::new(MemoryStore::new());
    let (tx, rx) = event_channel();
    let config = CacheConfig::builder().build().unwrap();
    let (cache, listener) = ResponseCache::with_events(config, store.clone(), rx);
    let availability = cache.availability().clone();
    let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("x") }).layer(cache);

    pipeline.handle(get("/down")).await;
    assert!(store.is_empty());

    tx.send(StoreEvent::Connected).unwrap();
    while !availability.is_available() {
        tokio::task::yield_now().await;
    }
    pipeline.handle(get("/up")).await;
    assert_eq!(store.len(), 2);

    drop(tx);
    listener.await.unwrap();
}

// ── hits ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hit_replaces_status_and_headers_of_the_live_response() {
    let harness = Harness::new(CacheConfig::builder(), |_| {
        Response::new(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .header("Set-Cookie", "session=abc")
            .body("hello")
    });

    harness.pipeline.handle(get("/")).await;
    let hit = harness.pipeline.handle(get("/")).await;
    assert!(is_hit(&hit));
    assert_eq!(hit.headers().get("Set-Cookie"), None);
}

#[tokio::test]
async fn untyped_bodies_are_served_as_html() {
    let harness = Harness::new(CacheConfig::builder(), |_| {
        Response::new(StatusCode::Ok).body_bytes(Bytes::from_static(b"<p>raw</p>"))
    });

    harness.pipeline.handle(get("/raw")).await;
    let hit = harness.pipeline.handle(get("/raw")).await;
    assert_eq!(hit.content_type(), Some("text/html"));
    assert_eq!(hit.body_ref().as_bytes(), Some(&b"<p>raw</p>"[..]));
}

// ── body kinds ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn json_bodies_are_stored_serialized() {
    let harness = Harness::new(CacheConfig::builder().prefix("rc:"), |_| {
        Response::new(StatusCode::Ok).json(json!({"ok": true}))
    });

    let live = harness.pipeline.handle(get("/api")).await;
    assert!(matches!(live.body_ref(), rttp_cache::Body::Json(_)));

    let hit = harness.pipeline.handle(get("/api")).await;
    assert_eq!(hit.content_type(), Some("application/json"));
    assert_eq!(hit.body_ref().as_bytes(), Some(&br#"{"ok":true}"#[..]));
}

#[tokio::test]
async fn streamed_bodies_are_drained_once_and_still_delivered() {
    let harness = Harness::new(CacheConfig::builder().prefix("rc:"), |_| {
        Response::new(StatusCode::Ok)
            .header("Content-Type", "text/csv")
            .stream(std::io::Cursor::new(b"id,name\n1,ada\n".to_vec()))
    });

    let live = harness.pipeline.handle(get("/export")).await;
    assert_eq!(live.body_ref().as_bytes(), Some(&b"id,name\n1,ada\n"[..]));
    assert_eq!(
        harness.store.get("rc:/export").await.unwrap(),
        Some(Bytes::from_static(b"id,name\n1,ada\n"))
    );
}

/// Yields `chunk` once, then fails.
struct FailAfter {
    chunk: Option<&'static [u8]>,
}

impl AsyncRead for FailAfter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.chunk.take() {
            Some(chunk) => {
                buf.put_slice(chunk);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(std::io::Error::other("upstream closed"))),
        }
    }
}

#[tokio::test]
async fn broken_streams_fail_the_same_with_or_without_the_cache() {
    let errors = ErrorLog::default();
    let store = Arc::new(MemoryStore::new());
    let config = CacheConfig::builder().on_error(errors.hook()).build().unwrap();
    let cache = ResponseCache::new(config, store.clone(), up());
    let pipeline = Pipeline::new(|_ctx: Context| async {
        Response::new(StatusCode::Ok).stream(FailAfter { chunk: Some(b"par") })
    })
    .layer(cache);

    // POST is never captured, so it shows the uncached outcome.
    let uncached = pipeline.handle(request("POST", "/export")).await.buffer().await;
    let cached = pipeline.handle(get("/export")).await.buffer().await;

    assert!(uncached.is_err());
    assert_eq!(cached.unwrap_err().to_string(), "upstream closed");
    assert!(store.is_empty());
    assert_eq!(errors.entries().len(), 1);
    assert!(errors.entries()[0].starts_with("failed to read streaming body"));
}

// ── backup tier ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn backup_tier_is_written_and_read_in_dump_mode() {
    let harness = Harness::new(
        CacheConfig::builder()
            .prefix("rc:")
            .backup(true)
            .check_dump(|ctx| ctx.request().query_param("stale").is_some()),
        hello,
    );

    harness.pipeline.handle(get("/page")).await;
    assert!(harness.store.get("rc:_dump_/page").await.unwrap().is_some());
    assert!(harness.store.get("rc:_dump_/page:type").await.unwrap().is_some());

    // dump mode reads the dump namespace, keyed by its own target
    harness
        .store
        .set_ex("rc:_dump_/page?stale=1", Duration::from_secs(60), Bytes::from_static(b"old"))
        .await
        .unwrap();
    let stale = harness.pipeline.handle(get("/page?stale=1")).await;
    assert!(is_hit(&stale));
    assert_eq!(stale.body_ref().as_bytes(), Some(&b"old"[..]));
    assert_eq!(harness.calls(), 1);
}

#[tokio::test]
async fn failed_writes_never_reach_the_client() {
    let errors = ErrorLog::default();
    let store = Arc::new(FlakyStore::new(false, |_| true));
    let config = CacheConfig::builder()
        .backup(true)
        .on_error(errors.hook())
        .build()
        .unwrap();
    let cache = ResponseCache::new(config, store, up());
    let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("fresh") }).layer(cache);

    let response = pipeline.handle(get("/")).await;
    assert_eq!(response.status(), StatusCode::Ok);
    assert_eq!(response.body_ref().as_bytes(), Some(&b"fresh"[..]));

    let entries = errors.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.starts_with("cache write failed")));
}

#[tokio::test]
async fn one_failing_tier_does_not_stop_the_other() {
    let errors = ErrorLog::default();
    let store = Arc::new(FlakyStore::new(false, |key| key.contains("_dump_")));
    let config = CacheConfig::builder()
        .prefix("rc:")
        .backup(true)
        .on_error(errors.hook())
        .build()
        .unwrap();
    let cache = ResponseCache::new(config, store.clone(), up());
    let pipeline = Pipeline::new(|_ctx: Context| async {
        Response::new(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .body("fresh")
    })
    .layer(cache);

    let response = pipeline.handle(get("/p")).await;
    assert_eq!(response.body_ref().as_bytes(), Some(&b"fresh"[..]));

    assert_eq!(store.inner.get("rc:/p").await.unwrap(), Some(Bytes::from_static(b"fresh")));
    assert_eq!(
        store.inner.get("rc:/p:type").await.unwrap(),
        Some(Bytes::from_static(b"text/plain"))
    );
    assert!(store.inner.get("rc:_dump_/p").await.unwrap().is_none());

    let entries = errors.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("cache write failed"));
}

#[tokio::test]
async fn failed_reads_degrade_to_misses() {
    let errors = ErrorLog::default();
    let store = Arc::new(FlakyStore::new(true, |_| false));
    let config = CacheConfig::builder().on_error(errors.hook()).build().unwrap();
    let cache = ResponseCache::new(config, store, up());
    let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("fresh") }).layer(cache);

    let first = pipeline.handle(get("/")).await;
    let second = pipeline.handle(get("/")).await;
    assert!(!is_hit(&first));
    assert!(!is_hit(&second));
    assert_eq!(errors.entries().len(), 2);
    assert!(errors.entries()[0].starts_with("cache read failed"));
}

// ── dynamic prefix ────────────────────────────────────────────────────────────

struct Tenant(String);

/// Copies the `X-Tenant` header into the context extensions.
struct TenantScope;

impl Middleware for TenantScope {
    fn handle(&self, mut ctx: Context, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let tenant = ctx.request().headers().get("X-Tenant").unwrap_or("public").to_owned();
            ctx.extensions_mut().insert(Tenant(tenant));
            next.run(ctx).await
        })
    }
}

#[tokio::test]
async fn dynamic_prefix_partitions_entries() {
    let store = Arc::new(MemoryStore::new());
    let config = CacheConfig::builder()
        .prefix_fn(|ctx| {
            let tenant = ctx.extensions().get::<Tenant>().map_or("none", |t| t.0.as_str());
            format!("rc:{tenant}:")
        })
        .build()
        .unwrap();
    let cache = ResponseCache::new(config, store.clone(), up());
    let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok).body("x") })
        .layer(TenantScope)
        .layer(cache);

    let raw = b"GET /home HTTP/1.1\r\nHost: localhost\r\nX-Tenant: acme\r\n\r\n";
    pipeline.handle(Request::parse(raw).unwrap().0).await;
    pipeline.handle(get("/home")).await;

    assert!(store.get("rc:acme:/home").await.unwrap().is_some());
    assert!(store.get("rc:public:/home").await.unwrap().is_some());
}

// ── over the wire ─────────────────────────────────────────────────────────────

async fn fetch(addr: std::net::SocketAddr, target: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn server_serves_cached_responses() {
    let config = CacheConfig::builder().route("/greeting").build().unwrap();
    let cache = ResponseCache::new(config, Arc::new(MemoryStore::new()), up());
    let pipeline = Pipeline::new(|_ctx: Context| async {
        Response::new(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .stream(std::io::Cursor::new(b"hi there".to_vec()))
    })
    .layer(cache);

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(pipeline));

    let first = fetch(addr, "/greeting").await;
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.contains("Content-Length: 8\r\n"));
    assert!(first.ends_with("\r\n\r\nhi there"));
    assert!(!first.contains(CACHE_HIT_HEADER));

    let second = fetch(addr, "/greeting").await;
    assert!(second.contains("X-Rttp-Response-Cache: true\r\n"));
    assert!(second.contains("Content-Type: text/plain\r\n"));
    assert!(second.ends_with("\r\n\r\nhi there"));
}
