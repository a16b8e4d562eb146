//! # Relay CLI

use crate::{
    batcher::FlushTrigger,
    config::{ChainSettings, RelayConfig},
    spawn::{Relay, try_spawn},
    types::{AccountId, Announcement, Category, ProviderId},
};
use clap::Parser;
use eyre::{OptionExt, WrapErr};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::Ipv4Addr, path::PathBuf, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use url::Url;

/// The batch relay accumulates announcements into per-category batches and
/// submits them to the chain as combined extrinsics.
#[derive(Debug, Parser)]
#[command(author, about = "Batch relay", long_about = None)]
pub struct Args {
    /// The configuration file.
    ///
    /// Optional; values given on the command line override it.
    #[arg(long, value_name = "CONFIG", env = "BATCH_RELAY_CONFIG", default_value = "relay.yaml")]
    pub config: PathBuf,
    /// The chain RPC endpoint.
    #[arg(long, value_name = "RPC_ENDPOINT", env = "BATCH_RELAY_ENDPOINT")]
    pub endpoint: Option<Url>,
    /// The submitting account, in SS58 form.
    #[arg(long, value_name = "ACCOUNT", env = "BATCH_RELAY_ACCOUNT")]
    pub account: Option<String>,
    /// The provider identity the account is expected to control.
    #[arg(long = "provider-id", value_name = "ID", env = "BATCH_RELAY_PROVIDER_ID")]
    pub provider_id: Option<ProviderId>,
    /// The coordination store URL. When absent, reservations are in-memory and
    /// only safe for a single relay process.
    #[arg(long = "redis-url", value_name = "URL", env = "BATCH_RELAY_REDIS_URL")]
    pub redis_url: Option<Url>,
    /// Maximum number of announcements per batch.
    #[arg(long = "max-batch-size", value_name = "NUM")]
    pub max_batch_size: Option<usize>,
    /// Maximum age of a live batch before it is flushed.
    #[arg(long = "max-batch-age", value_name = "SECONDS", value_parser = parse_duration_secs)]
    pub max_batch_age: Option<Duration>,
    /// Number of candidate nonce slots per lease call.
    #[arg(long = "nonce-window", value_name = "NUM")]
    pub nonce_window: Option<u64>,
    /// Nonce lease time-to-live.
    #[arg(long = "lease-ttl", value_name = "SECONDS", value_parser = parse_duration_secs)]
    pub lease_ttl: Option<Duration>,
    /// The port to serve metrics on.
    #[arg(long = "metrics-port", value_name = "PORT")]
    pub metrics_port: Option<u16>,
}

impl Args {
    /// Run the relay service.
    pub async fn run(self) -> eyre::Result<()> {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();

        let config = self.load_config()?;

        PrometheusBuilder::new()
            .with_http_listener((Ipv4Addr::UNSPECIFIED, config.metrics_port))
            .install()
            .wrap_err("failed to start the metrics exporter")?;
        info!(port = config.metrics_port, "metrics exporter started");

        let Relay { batcher, mut completions } = try_spawn(config).await?;
        info!("started batch relay");

        // Completions go out as JSON lines; the announcement feed comes in the
        // same way on stdin.
        let printer = tokio::spawn(async move {
            while let Some(completion) = completions.recv().await {
                match serde_json::to_string(&completion) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!(%err, "failed to serialize a batch completion"),
                }
            }
        });

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match serde_json::from_str::<Announcement>(&line) {
                        Ok(announcement) => batcher.process(announcement).await,
                        Err(err) => warn!(%err, "skipping malformed announcement"),
                    },
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        // Drain: push out whatever is still pending, then let the completion
        // stream close.
        info!("shutting down, flushing pending batches");
        for category in Category::ALL {
            batcher.flush(category, FlushTrigger::Shutdown).await;
        }
        drop(batcher);
        printer.await.wrap_err("completion printer task failed")?;

        Ok(())
    }

    /// Merges the config file (when present) with command line overrides.
    fn load_config(&self) -> eyre::Result<RelayConfig> {
        let mut config = if self.config.exists() {
            RelayConfig::load(&self.config)?
        } else {
            let endpoint = self
                .endpoint
                .clone()
                .ok_or_eyre("either a config file or --endpoint is required")?;
            let account = self
                .account
                .clone()
                .ok_or_eyre("either a config file or --account is required")?;
            let provider_id = self
                .provider_id
                .ok_or_eyre("either a config file or --provider-id is required")?;
            RelayConfig::new(ChainSettings {
                endpoint,
                account: AccountId(account),
                provider_id,
            })
        };

        if let Some(endpoint) = self.endpoint.clone() {
            config = config.with_endpoint(endpoint);
        }
        if let Some(account) = self.account.clone() {
            config = config.with_account(AccountId(account));
        }
        if let Some(provider_id) = self.provider_id {
            config = config.with_provider_id(provider_id);
        }
        config = config.with_redis_url(self.redis_url.clone());
        if let Some(max_size) = self.max_batch_size {
            config = config.with_max_batch_size(max_size);
        }
        if let Some(max_age) = self.max_batch_age {
            config = config.with_max_batch_age(max_age);
        }
        if let Some(window) = self.nonce_window {
            config = config.with_nonce_window(window);
        }
        if let Some(ttl) = self.lease_ttl {
            config = config.with_lease_ttl(ttl);
        }
        if let Some(port) = self.metrics_port {
            config = config.with_metrics_port(port);
        }

        Ok(config)
    }
}

/// Parses a string representing seconds to a [`Duration`].
fn parse_duration_secs(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}
