//! Coordination store implementation in-memory.
//!
//! Atomicity holds within one process only; deployments with multiple worker
//! processes need the Redis backend.

use super::{ReservationApi, api::Result};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Mutex, time::Duration};
use tokio::time::Instant;

/// [`ReservationApi`] implementation in-memory. Used for testing and
/// single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Live reservations, keyed by reservation key, valued by expiry.
    reservations: Mutex<HashMap<String, Instant>>,
}

#[async_trait]
impl ReservationApi for InMemoryStore {
    async fn reserve_first_free(&self, keys: &[String], ttl: Duration) -> Result<Option<usize>> {
        let now = Instant::now();
        let mut reservations = self.reservations.lock().expect("reservation lock poisoned");

        // Expired entries are dropped lazily, under the same lock as the
        // reserve so the whole call stays atomic.
        reservations.retain(|_, expiry| *expiry > now);

        for (index, key) in keys.iter().enumerate() {
            if !reservations.contains_key(key) {
                reservations.insert(key.clone(), now + ttl);
                return Ok(Some(index));
            }
        }

        Ok(None)
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.reservations.lock().expect("reservation lock poisoned").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("nonce:test:{i}")).collect()
    }

    #[tokio::test]
    async fn reserves_in_order() {
        let store = InMemoryStore::default();
        let keys = keys(3);
        let ttl = Duration::from_secs(60);

        assert_eq!(store.reserve_first_free(&keys, ttl).await.unwrap(), Some(0));
        assert_eq!(store.reserve_first_free(&keys, ttl).await.unwrap(), Some(1));
        assert_eq!(store.reserve_first_free(&keys, ttl).await.unwrap(), Some(2));
        assert_eq!(store.reserve_first_free(&keys, ttl).await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_reopens_slot() {
        let store = InMemoryStore::default();
        let keys = keys(2);
        let ttl = Duration::from_secs(60);

        assert_eq!(store.reserve_first_free(&keys, ttl).await.unwrap(), Some(0));
        assert_eq!(store.reserve_first_free(&keys, ttl).await.unwrap(), Some(1));

        store.release(&keys[0]).await.unwrap();
        assert_eq!(store.reserve_first_free(&keys, ttl).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn expired_reservation_is_reusable() {
        let store = InMemoryStore::default();
        let keys = keys(1);

        assert_eq!(
            store.reserve_first_free(&keys, Duration::from_millis(10)).await.unwrap(),
            Some(0)
        );
        assert_eq!(
            store.reserve_first_free(&keys, Duration::from_secs(60)).await.unwrap(),
            None
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            store.reserve_first_free(&keys, Duration::from_secs(60)).await.unwrap(),
            Some(0)
        );
    }
}
