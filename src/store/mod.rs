//! Coordination store.
//!
//! Holds the pipeline's only cross-process shared state: TTL-bound nonce
//! reservation keys. Batch and lease state are otherwise transient in-memory.

mod api;
pub use api::ReservationApi;
mod memory;
pub use memory::InMemoryStore;
mod redis;
pub use redis::RedisStore;

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use url::Url;

/// Coordination store interface.
#[derive(Debug, Clone)]
pub struct CoordinationStore {
    inner: Arc<dyn ReservationApi>,
}

impl CoordinationStore {
    /// Creates a [`CoordinationStore`] with an in-memory backend. Suitable for
    /// testing and single-process runs only.
    pub fn in_memory() -> Self {
        Self { inner: Arc::new(InMemoryStore::default()) }
    }

    /// Creates a [`CoordinationStore`] backed by Redis.
    pub async fn redis(url: &Url) -> api::Result<Self> {
        Ok(Self { inner: Arc::new(RedisStore::connect(url).await?) })
    }
}

#[async_trait]
impl ReservationApi for CoordinationStore {
    async fn reserve_first_free(
        &self,
        keys: &[String],
        ttl: Duration,
    ) -> api::Result<Option<usize>> {
        self.inner.reserve_first_free(keys, ttl).await
    }

    async fn release(&self, key: &str) -> api::Result<()> {
        self.inner.release(key).await
    }
}
