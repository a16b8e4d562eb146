//! Nonce allocation.
//!
//! The on-chain nonce counter is the single source of truth, but it only
//! advances after inclusion. During the inclusion-latency window many
//! submitters would all see the same "next" nonce, so a short-lived
//! reservation layer in the coordination store hands out collision-free
//! values: each lease call scans a bounded lookahead window above the chain
//! nonce and atomically reserves the first free slot, TTL-bound so crashed
//! holders cannot block a slot forever.

use crate::{
    chain::ChainClient,
    constants::NONCE_KEY_PREFIX,
    error::LeaseError,
    store::{CoordinationStore, ReservationApi},
    types::AccountId,
};
use chrono::{DateTime, Utc};
use metrics::Counter;
use metrics_derive::Metrics;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

/// The reservation key for one candidate nonce slot of one account.
fn nonce_key(account: &AccountId, value: u64) -> String {
    format!("{NONCE_KEY_PREFIX}:{account}:{value}")
}

#[derive(Metrics)]
#[metrics(scope = "nonce")]
struct NonceMetrics {
    /// Number of leases handed out.
    acquired: Counter,
    /// Number of leases explicitly released.
    released: Counter,
    /// Number of lease calls that found the whole window reserved.
    window_exhausted: Counter,
}

/// An exclusive, time-bounded claim on one sequence number of one account.
///
/// Owned by the submitting transaction until inclusion or expiry. Release it
/// explicitly after confirmed inclusion (or definitive rejection) to free the
/// slot early; otherwise the TTL reopens it.
#[derive(Debug)]
pub struct NonceLease {
    account: AccountId,
    value: u64,
    key: String,
    reserved_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    store: CoordinationStore,
}

impl NonceLease {
    /// The account this lease belongs to.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// The leased nonce value.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// When the lease was reserved.
    pub fn reserved_at(&self) -> DateTime<Utc> {
        self.reserved_at
    }

    /// When the lease expires on its own.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the TTL has elapsed. An expired lease no longer guards its
    /// slot; the holder must not submit with it.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Releases the reserved slot before its TTL elapses.
    ///
    /// Consumes the lease; a lease that is never released simply expires.
    pub async fn release(self) -> Result<(), LeaseError> {
        self.store.release(&self.key).await?;
        debug!(account = %self.account, nonce = self.value, "nonce lease released");
        Ok(())
    }
}

/// Hands out collision-free sequence numbers for one submitting account.
#[derive(Debug)]
pub struct NonceAllocator<C: ?Sized> {
    chain: Arc<C>,
    store: CoordinationStore,
    account: AccountId,
    window: u64,
    ttl: Duration,
    metrics: NonceMetrics,
}

impl<C: ChainClient + ?Sized> NonceAllocator<C> {
    /// Creates a new [`NonceAllocator`] for the given account.
    pub fn new(
        chain: Arc<C>,
        store: CoordinationStore,
        account: AccountId,
        window: u64,
        ttl: Duration,
    ) -> Self {
        Self { chain, store, account, window, ttl, metrics: NonceMetrics::default() }
    }

    /// The account this allocator leases for.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Leases the first free nonce in `[chain_nonce, chain_nonce + W - 1]`.
    ///
    /// The chain's next expected nonce is queried fresh for every call. When
    /// all slots in the window are held by live leases the call fails with
    /// [`LeaseError::Exhausted`]; callers back off and retry rather than
    /// fabricating a value past the window, which could submit out of order
    /// relative to other in-flight leases.
    pub async fn lease(&self) -> Result<NonceLease, LeaseError> {
        let chain_nonce = self.chain.next_nonce(&self.account).await?;
        let keys: Vec<String> =
            (0..self.window).map(|i| nonce_key(&self.account, chain_nonce + i)).collect();

        let Some(index) = self.store.reserve_first_free(&keys, self.ttl).await? else {
            warn!(
                account = %self.account,
                chain_nonce,
                window = self.window,
                "nonce window exhausted"
            );
            self.metrics.window_exhausted.increment(1);
            return Err(LeaseError::Exhausted { window: self.window });
        };

        let value = chain_nonce + index as u64;
        let reserved_at = Utc::now();
        let expires_at = reserved_at
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        debug!(account = %self.account, nonce = value, "nonce leased");
        self.metrics.acquired.increment(1);

        Ok(NonceLease {
            account: self.account.clone(),
            value,
            key: keys.into_iter().nth(index).expect("index within window"),
            reserved_at,
            expires_at,
            store: self.store.clone(),
        })
    }

    /// Counter bump for explicit releases, kept here so the metric scope stays
    /// with the allocator.
    pub(crate) fn note_released(&self) {
        self.metrics.released.increment(1);
    }
}
