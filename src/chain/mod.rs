//! Chain client facade.
//!
//! A thin read/write gateway to the ledger: block queries, storage queries,
//! extrinsic submission and event retrieval. Everything above it in the
//! pipeline talks to the ledger exclusively through [`ChainClient`]; wire
//! encoding and connection management stay behind the trait.

use crate::{
    capacity::CapacityEpochState,
    error::ChainError,
    events::EventRecord,
    types::{AccountId, BlockHash, BlockRef, ExtrinsicCall, ProviderId, TxHash},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

mod rpc;
pub use rpc::RpcChainClient;

/// Type alias for `Result<T, ChainError>`.
pub type Result<T> = core::result::Result<T, ChainError>;

/// A claimed handle, as stored on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleInfo {
    /// The base handle chosen by the user.
    pub base_handle: String,
    /// The numeric suffix assigned by the chain.
    pub suffix: u32,
}

impl HandleInfo {
    /// The full handle in its canonical `base.suffix` form.
    pub fn full(&self) -> String {
        format!("{}.{}", self.base_handle, self.suffix)
    }
}

/// Read/write gateway to the ledger.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Returns the next expected nonce for `account`, as tracked by the chain.
    ///
    /// The chain counter is the source of truth; it only advances after
    /// inclusion, which is why leases exist on top of it.
    async fn next_nonce(&self, account: &AccountId) -> Result<u64>;

    /// Returns the current epoch and remaining capacity for `provider`.
    async fn query_capacity(&self, provider: ProviderId) -> Result<CapacityEpochState>;

    /// Signs and submits `call` with the given nonce, returning the extrinsic
    /// hash without waiting for inclusion.
    async fn submit_extrinsic(&self, call: &ExtrinsicCall, nonce: u64) -> Result<TxHash>;

    /// Waits until the extrinsic is included and returns the inclusion block.
    async fn wait_for_inclusion(&self, tx: &TxHash) -> Result<BlockRef>;

    /// Returns the raw event records emitted in the given block.
    async fn events_for_block(&self, block: &BlockHash) -> Result<Vec<EventRecord>>;

    /// Returns the number of the given block, or of the best block if `None`.
    async fn block_number(&self, block: Option<&BlockHash>) -> Result<u64>;

    /// Returns the current handle for an identity, if one is claimed.
    ///
    /// Fallback for interpreting submissions whose handle-claimed event is
    /// absent because the handle pre-existed.
    async fn handle_for_identity(&self, identity: u64) -> Result<Option<HandleInfo>>;

    /// Returns the control keys of an identity.
    async fn keys_for_identity(&self, identity: u64) -> Result<Vec<String>>;

    /// Resolves the identity a public key belongs to, if any.
    async fn identity_for_key(&self, key: &AccountId) -> Result<Option<u64>>;
}
