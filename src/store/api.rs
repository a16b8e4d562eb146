//! Coordination store api.

use crate::error::StoreError;
use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

/// Type alias for `Result<T, StoreError>`.
pub type Result<T> = core::result::Result<T, StoreError>;

/// Cross-process reservation primitive.
///
/// Reservation keys are the only cross-process mutual-exclusion mechanism in
/// the pipeline; nonce uniqueness reduces to [`reserve_first_free`] being a
/// single atomic operation with no observable intermediate state.
///
/// [`reserve_first_free`]: ReservationApi::reserve_first_free
#[async_trait]
pub trait ReservationApi: Debug + Send + Sync {
    /// Atomically reserves the first key in `keys` that is not already held by
    /// a live reservation, with the given time-to-live.
    ///
    /// Returns the index of the reserved key, or `None` if every key is taken.
    /// The check-and-reserve across all keys happens in one round trip.
    async fn reserve_first_free(&self, keys: &[String], ttl: Duration) -> Result<Option<usize>>;

    /// Releases a reservation before its TTL elapses.
    async fn release(&self, key: &str) -> Result<()>;
}
