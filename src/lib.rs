//! # rttp-cache
//!
//! Transparent response caching for the rttp async HTTP/1.1 stack.
//!
//! [`ResponseCache`] is a middleware: put it in a [`Pipeline`] in front of
//! your endpoint and eligible `GET` responses are stored in a key-value store
//! and replayed on later requests for the same target, with no change to
//! the endpoint itself.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rttp_cache::cache::{Availability, CacheConfig, ResponseCache};
//! use rttp_cache::store::{MemoryStore, StoreEvent};
//! use rttp_cache::{Pipeline, Response, Server, StatusCode, context::Context};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let availability = Availability::new();
//!     availability.apply(StoreEvent::Connected, None);
//!
//!     let config = CacheConfig::builder().route("/articles/:slug").build()?;
//!     let cache = ResponseCache::new(config, Arc::new(MemoryStore::new()), availability);
//!
//!     let pipeline = Pipeline::new(|_ctx: Context| async {
//!         Response::new(StatusCode::Ok).body("Hello, World!")
//!     })
//!     .layer(cache);
//!
//!     Server::bind("127.0.0.1:8080").await?.run(pipeline).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod server;
pub mod store;

pub use cache::{CacheConfig, ResponseCache};
pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use middleware::Pipeline;
pub use server::{Server, ServerError};
