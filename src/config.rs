//! Relay configuration.

use crate::{
    constants::{
        DEFAULT_CAPACITY_RETRY_BACKOFF, DEFAULT_CAPACITY_RETRY_LIMIT, DEFAULT_COST_PER_ITEM,
        DEFAULT_LEASE_RETRY_BACKOFF, DEFAULT_LEASE_RETRY_LIMIT, DEFAULT_LEASE_TTL,
        DEFAULT_MAX_BATCH_AGE, DEFAULT_MAX_BATCH_SIZE, DEFAULT_METRICS_PORT, DEFAULT_NONCE_WINDOW,
    },
    types::{AccountId, ProviderId},
};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use url::Url;

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Chain connection settings.
    pub chain: ChainSettings,
    /// Coordination store URL. When absent, an in-memory store is used, which
    /// is only safe for a single relay process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<Url>,
    /// Batching settings.
    #[serde(default)]
    pub batch: BatchSettings,
    /// Nonce allocation settings.
    #[serde(default)]
    pub nonce: NonceSettings,
    /// Capacity admission settings.
    #[serde(default)]
    pub capacity: CapacitySettings,
    /// The port to serve metrics on.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Chain connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    /// The chain RPC endpoint.
    pub endpoint: Url,
    /// The submitting account, in SS58 form.
    pub account: AccountId,
    /// The provider identity the account is expected to control. Verified at
    /// startup; a mismatch is fatal.
    pub provider_id: ProviderId,
}

/// Batching settings, applied per category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Maximum number of announcements per batch before a size-triggered
    /// flush.
    pub max_size: usize,
    /// Maximum age of a live batch before a time-triggered flush.
    pub max_age: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_size: DEFAULT_MAX_BATCH_SIZE, max_age: DEFAULT_MAX_BATCH_AGE }
    }
}

/// Nonce allocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceSettings {
    /// Number of candidate slots per lease call.
    pub window: u64,
    /// Lease time-to-live; the expected worst-case inclusion latency.
    pub lease_ttl: Duration,
    /// How many times a flush retries an exhausted window before giving up.
    pub retry_limit: u32,
    /// Delay between exhausted-window retries.
    pub retry_backoff: Duration,
}

impl Default for NonceSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_NONCE_WINDOW,
            lease_ttl: DEFAULT_LEASE_TTL,
            retry_limit: DEFAULT_LEASE_RETRY_LIMIT,
            retry_backoff: DEFAULT_LEASE_RETRY_BACKOFF,
        }
    }
}

/// Capacity admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacitySettings {
    /// Capacity cost estimated per batched announcement.
    pub cost_per_item: u128,
    /// How many times a flush retries a capacity rejection before the batch
    /// fails terminally.
    pub retry_limit: u32,
    /// Base delay between capacity retries; grows exponentially with jitter.
    pub retry_backoff: Duration,
}

impl Default for CapacitySettings {
    fn default() -> Self {
        Self {
            cost_per_item: DEFAULT_COST_PER_ITEM,
            retry_limit: DEFAULT_CAPACITY_RETRY_LIMIT,
            retry_backoff: DEFAULT_CAPACITY_RETRY_BACKOFF,
        }
    }
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl RelayConfig {
    /// Creates a configuration with default tuning for the given chain
    /// settings.
    pub fn new(chain: ChainSettings) -> Self {
        Self {
            chain,
            redis_url: None,
            batch: BatchSettings::default(),
            nonce: NonceSettings::default(),
            capacity: CapacitySettings::default(),
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config at {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse config at {}", path.display()))
    }

    /// Sets the chain endpoint.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.chain.endpoint = endpoint;
        self
    }

    /// Sets the submitting account.
    pub fn with_account(mut self, account: AccountId) -> Self {
        self.chain.account = account;
        self
    }

    /// Sets the provider identity.
    pub fn with_provider_id(mut self, provider_id: ProviderId) -> Self {
        self.chain.provider_id = provider_id;
        self
    }

    /// Sets the coordination store URL.
    pub fn with_redis_url(mut self, redis_url: Option<Url>) -> Self {
        self.redis_url = redis_url.or(self.redis_url);
        self
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch_size(mut self, max_size: usize) -> Self {
        self.batch.max_size = max_size;
        self
    }

    /// Sets the maximum batch age.
    pub fn with_max_batch_age(mut self, max_age: Duration) -> Self {
        self.batch.max_age = max_age;
        self
    }

    /// Sets the nonce lookahead window.
    pub fn with_nonce_window(mut self, window: u64) -> Self {
        self.nonce.window = window;
        self
    }

    /// Sets the nonce lease TTL.
    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.nonce.lease_ttl = lease_ttl;
        self
    }

    /// Sets the port to serve metrics on.
    pub fn with_metrics_port(mut self, metrics_port: u16) -> Self {
        self.metrics_port = metrics_port;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: RelayConfig = serde_yaml::from_str(
            r#"
chain:
  endpoint: "http://localhost:9944"
  account: "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
  provider_id: 1
"#,
        )
        .unwrap();

        assert_eq!(config.batch.max_size, DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(config.nonce.window, DEFAULT_NONCE_WINDOW);
        assert_eq!(config.capacity.cost_per_item, DEFAULT_COST_PER_ITEM);
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert!(config.redis_url.is_none());
    }
}
