//! JSON-RPC backed [`ChainClient`] implementation.
//!
//! Speaks to a gateway endpoint that exposes simplified submission RPCs on top
//! of the node: typed calls go out as `(pallet, call, params)` JSON and the
//! gateway owns signing and wire encoding.

use super::{ChainClient, HandleInfo, Result};
use crate::{
    capacity::CapacityEpochState,
    error::ChainError,
    events::EventRecord,
    types::{AccountId, BlockHash, BlockRef, ExtrinsicCall, ProviderId, TxHash},
};
use async_trait::async_trait;
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::Deserialize;
use url::Url;

/// Capacity ledger entry as returned by the node. Absent for providers that
/// have never staked.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapacityLedger {
    remaining_capacity: u128,
    total_capacity_issued: u128,
}

/// Current epoch info as returned by the node.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpochInfo {
    epoch_number: u64,
    epoch_start: u64,
    epoch_length: u64,
}

/// Block header fields the relay cares about.
#[derive(Debug, Deserialize)]
struct Header {
    number: String,
}

/// [`ChainClient`] over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: HttpClient,
}

impl RpcChainClient {
    /// Connects to the given endpoint.
    pub fn new(endpoint: &Url) -> Result<Self> {
        let client = HttpClientBuilder::default().build(endpoint.as_str())?;
        Ok(Self { client })
    }

    async fn header(&self, block: Option<&BlockHash>) -> Result<Header> {
        let header: Header = match block {
            Some(hash) => self.client.request("chain_getHeader", rpc_params![&hash.0]).await?,
            None => self.client.request("chain_getHeader", rpc_params![]).await?,
        };
        Ok(header)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn next_nonce(&self, account: &AccountId) -> Result<u64> {
        Ok(self.client.request("system_accountNextIndex", rpc_params![&account.0]).await?)
    }

    async fn query_capacity(&self, provider: ProviderId) -> Result<CapacityEpochState> {
        let epoch: EpochInfo =
            self.client.request("capacity_currentEpochInfo", rpc_params![]).await?;
        let ledger: Option<CapacityLedger> =
            self.client.request("capacity_capacityLedger", rpc_params![provider]).await?;
        let current_block = self.block_number(None).await?;

        let (remaining, issued) = ledger
            .map(|l| (l.remaining_capacity, l.total_capacity_issued))
            .unwrap_or_default();

        Ok(CapacityEpochState {
            epoch_number: epoch.epoch_number,
            epoch_start_block: epoch.epoch_start,
            epoch_length_blocks: epoch.epoch_length,
            remaining_capacity: remaining,
            total_capacity_issued: issued,
            current_block_number: current_block,
        })
    }

    async fn submit_extrinsic(&self, call: &ExtrinsicCall, nonce: u64) -> Result<TxHash> {
        Ok(self.client.request("author_submitExtrinsic", rpc_params![call, nonce]).await?)
    }

    async fn wait_for_inclusion(&self, tx: &TxHash) -> Result<BlockRef> {
        Ok(self.client.request("author_waitForInclusion", rpc_params![&tx.0]).await?)
    }

    async fn events_for_block(&self, block: &BlockHash) -> Result<Vec<EventRecord>> {
        Ok(self.client.request("state_getEvents", rpc_params![&block.0]).await?)
    }

    async fn block_number(&self, block: Option<&BlockHash>) -> Result<u64> {
        let header = self.header(block).await?;
        parse_hex_u64(&header.number)
    }

    async fn handle_for_identity(&self, identity: u64) -> Result<Option<HandleInfo>> {
        Ok(self.client.request("handles_getHandleForMsa", rpc_params![identity]).await?)
    }

    async fn keys_for_identity(&self, identity: u64) -> Result<Vec<String>> {
        Ok(self.client.request("msa_getKeysByMsaId", rpc_params![identity]).await?)
    }

    async fn identity_for_key(&self, key: &AccountId) -> Result<Option<u64>> {
        Ok(self.client.request("msa_publicKeyToMsaId", rpc_params![&key.0]).await?)
    }
}

/// Parses a `0x`-prefixed hexadecimal block number.
fn parse_hex_u64(value: &str) -> Result<u64> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|err| ChainError::Unavailable(format!("bad block number {value:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::parse_hex_u64;

    #[test]
    fn parses_prefixed_and_bare_block_numbers() {
        assert_eq!(parse_hex_u64("0x2a").unwrap(), 42);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(parse_hex_u64("0xzz").is_err());
    }
}
