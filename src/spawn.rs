//! Relay wiring and startup.

use crate::{
    batcher::{BatchCompletion, Batcher},
    chain::{ChainClient, RpcChainClient},
    config::RelayConfig,
    store::CoordinationStore,
    types::Category,
};
use eyre::{WrapErr, bail};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// A running relay: the batching service plus the completion stream.
#[derive(Debug)]
pub struct Relay {
    /// The batching service. Clone it to submit announcements from anywhere.
    pub batcher: Batcher<dyn ChainClient>,
    /// One completion per flushed batch.
    pub completions: mpsc::UnboundedReceiver<BatchCompletion>,
}

/// Builds the relay from its configuration and starts the per-category age
/// timers.
///
/// Fails fast when the submitting account does not control the configured
/// provider identity; discovering that at the first flush would waste a whole
/// batch.
pub async fn try_spawn(config: RelayConfig) -> eyre::Result<Relay> {
    let store = match &config.redis_url {
        Some(url) => CoordinationStore::redis(url)
            .await
            .wrap_err("failed to connect to the coordination store")?,
        None => {
            info!("no coordination store configured, using in-memory reservations");
            CoordinationStore::in_memory()
        }
    };

    let chain: Arc<dyn ChainClient> = Arc::new(
        RpcChainClient::new(&config.chain.endpoint).wrap_err("failed to build the chain client")?,
    );

    verify_provider_identity(&*chain, &config).await?;

    let (batcher, completions) = Batcher::new(chain, store, config);
    for category in Category::ALL {
        batcher.arm_batch_timer(category);
    }

    Ok(Relay { batcher, completions })
}

/// Checks that the submitting account's key resolves on chain to the provider
/// identity the relay is configured to act for.
async fn verify_provider_identity(
    chain: &dyn ChainClient,
    config: &RelayConfig,
) -> eyre::Result<()> {
    let resolved = chain
        .identity_for_key(&config.chain.account)
        .await
        .wrap_err("failed to resolve the submitting account's identity")?;

    match resolved {
        Some(identity) if identity == config.chain.provider_id => {
            info!(
                account = %config.chain.account,
                provider = config.chain.provider_id,
                "provider identity verified"
            );
            Ok(())
        }
        Some(identity) => bail!(
            "account {} controls identity {identity}, not the configured provider {}",
            config.chain.account,
            config.chain.provider_id
        ),
        None => {
            bail!("account {} does not control any on-chain identity", config.chain.account)
        }
    }
}
