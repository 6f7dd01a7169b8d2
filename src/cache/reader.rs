//! Serving responses out of one cache tier.

use crate::http::{Response, StatusCode};
use crate::store::{CacheStore, StoreError};

use super::keys::TierKeys;

/// Header set on every response served from the cache.
pub const CACHE_HIT_HEADER: &str = "X-Rttp-Response-Cache";
/// Content type assumed when a cached value has no stored type.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Looks `keys` up in `store` and builds the response to send on a hit.
///
/// `Ok(None)` is a miss. An empty stored value is a miss as well. A missing
/// or unreadable type falls back to [`DEFAULT_CONTENT_TYPE`].
pub async fn read(store: &dyn CacheStore, keys: &TierKeys) -> Result<Option<Response>, StoreError> {
    let Some(value) = store.get(&keys.value).await?.filter(|value| !value.is_empty()) else {
        return Ok(None);
    };

    let content_type = store
        .get(&keys.content_type)
        .await?
        .and_then(|raw| String::from_utf8(raw.to_vec()).ok())
        .filter(|content_type| !content_type.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned());

    let mut response = Response::new(StatusCode::Ok);
    response.set_header(CACHE_HIT_HEADER, "true");
    response.set_content_type(content_type);
    response.set_body(value);
    Ok(Some(response))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::cache::CacheKeys;
    use crate::store::MemoryStore;

    const TTL: Duration = Duration::from_secs(60);

    fn keys() -> TierKeys {
        CacheKeys::derive("rc:", "/a?x=1", false).primary
    }

    #[tokio::test]
    async fn absent_value_is_a_miss() {
        let store = MemoryStore::new();
        assert!(read(&store, &keys()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_value_is_a_miss() {
        let store = MemoryStore::new();
        store.set_ex(&keys().value, TTL, Bytes::new()).await.unwrap();
        assert!(read(&store, &keys()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hit_carries_body_type_and_marker() {
        let store = MemoryStore::new();
        let keys = keys();
        store.set_ex(&keys.value, TTL, Bytes::from_static(b"hello")).await.unwrap();
        store
            .set_ex(&keys.content_type, TTL, Bytes::from_static(b"text/plain"))
            .await
            .unwrap();

        let response = read(&store, &keys).await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.headers().get(CACHE_HIT_HEADER), Some("true"));
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.body_ref().as_bytes(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn orphaned_value_gets_the_default_type() {
        let store = MemoryStore::new();
        let keys = keys();
        store.set_ex(&keys.value, TTL, Bytes::from_static(b"<p>hi</p>")).await.unwrap();

        let response = read(&store, &keys).await.unwrap().unwrap();
        assert_eq!(response.content_type(), Some(DEFAULT_CONTENT_TYPE));
    }
}
