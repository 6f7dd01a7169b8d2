use std::io;

use thiserror::Error;

use crate::store::StoreError;

use super::pattern::PatternError;

/// Failures the cache recovers from on its own.
///
/// None of these ever reach the client. They are logged and handed to the
/// configured error hook, if any.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store reported a connection failure; caching is off until it reconnects.
    #[error("cache store unreachable: {0}")]
    Connection(StoreError),

    /// A lookup failed and was treated as a miss.
    #[error("cache read failed: {0}")]
    Read(StoreError),

    /// Storing a response failed; the response was sent regardless.
    #[error("cache write failed: {0}")]
    Write(StoreError),

    #[error("failed to serialize JSON body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to read streaming body: {0}")]
    Drain(#[from] io::Error),
}

/// Invalid cache configuration, reported once at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid route pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: PatternError,
    },

    #[error("{option} must be at least one second")]
    TtlTooShort { option: &'static str },

    #[error("invalid cache settings: {0}")]
    Settings(#[from] serde_json::Error),
}
