//! Relay constants.

use std::time::Duration;

/// Default maximum number of announcements in a live batch before a
/// size-triggered flush.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default maximum age of a live batch before a time-triggered flush.
pub const DEFAULT_MAX_BATCH_AGE: Duration = Duration::from_secs(12);

/// Default number of candidate nonce slots checked per lease call.
pub const DEFAULT_NONCE_WINDOW: u64 = 50;

/// Default lease time-to-live.
///
/// Matches the expected worst-case inclusion latency of three blocks. Leases
/// that are never explicitly released reopen after this interval.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(18);

/// Key prefix for nonce reservations in the coordination store.
pub const NONCE_KEY_PREFIX: &str = "nonce";

/// Default capacity cost charged per batched announcement.
pub const DEFAULT_COST_PER_ITEM: u128 = 1;

/// Default number of times a flush retries capacity admission before the batch
/// fails terminally.
pub const DEFAULT_CAPACITY_RETRY_LIMIT: u32 = 4;

/// Default base delay between capacity admission retries. Grows exponentially
/// per attempt, with jitter.
pub const DEFAULT_CAPACITY_RETRY_BACKOFF: Duration = Duration::from_secs(6);

/// Default number of times a flush retries a lease call that reported an
/// exhausted window.
pub const DEFAULT_LEASE_RETRY_LIMIT: u32 = 8;

/// Default delay before retrying a lease call after the window was exhausted.
pub const DEFAULT_LEASE_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Default port to serve Prometheus metrics on.
pub const DEFAULT_METRICS_PORT: u16 = 9001;
