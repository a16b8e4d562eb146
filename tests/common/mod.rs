//! Shared test fixtures.
#![allow(dead_code)]

use async_trait::async_trait;
use batch_relay::{
    capacity::CapacityEpochState,
    chain::{ChainClient, HandleInfo, Result},
    config::{ChainSettings, RelayConfig},
    error::ChainError,
    events::EventRecord,
    types::{AccountId, Announcement, BlockHash, BlockRef, Category, ExtrinsicCall, ProviderId, TxHash},
};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

pub const PROVIDER: ProviderId = 729;

/// A scripted in-memory chain. Inclusion advances the nonce counter like the
/// real ledger does; everything else is fixed state the test sets up front.
#[derive(Debug)]
pub struct MockChainClient {
    /// The chain-tracked next nonce.
    pub chain_nonce: AtomicU64,
    /// Capacity state returned by every query.
    pub capacity: Mutex<CapacityEpochState>,
    /// Every submission attempt, in order, with the nonce it used.
    pub submissions: Mutex<Vec<(ExtrinsicCall, u64)>>,
    /// Event records attached to every inclusion block.
    pub events: Mutex<Vec<EventRecord>>,
    /// When set, submissions fail with a definitive ledger rejection.
    pub reject_submissions: AtomicBool,
    /// Key to identity mapping.
    pub identities: Mutex<HashMap<String, u64>>,
    /// Identity to handle mapping.
    pub handles: Mutex<HashMap<u64, HandleInfo>>,
}

impl MockChainClient {
    pub fn new(chain_nonce: u64, remaining_capacity: u128) -> Self {
        Self {
            chain_nonce: AtomicU64::new(chain_nonce),
            capacity: Mutex::new(CapacityEpochState {
                epoch_number: 3,
                epoch_start_block: 300,
                epoch_length_blocks: 100,
                remaining_capacity,
                total_capacity_issued: 1_000,
                current_block_number: 350,
            }),
            submissions: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            reject_submissions: AtomicBool::new(false),
            identities: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_remaining_capacity(&self, remaining: u128) {
        self.capacity.lock().unwrap().remaining_capacity = remaining;
    }

    pub fn submitted_nonces(&self) -> Vec<u64> {
        self.submissions.lock().unwrap().iter().map(|(_, nonce)| *nonce).collect()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn next_nonce(&self, _account: &AccountId) -> Result<u64> {
        Ok(self.chain_nonce.load(Ordering::SeqCst))
    }

    async fn query_capacity(&self, _provider: ProviderId) -> Result<CapacityEpochState> {
        Ok(self.capacity.lock().unwrap().clone())
    }

    async fn submit_extrinsic(&self, call: &ExtrinsicCall, nonce: u64) -> Result<TxHash> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((call.clone(), nonce));

        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(ChainError::Rejected { reason: "scripted rejection".into() });
        }

        Ok(TxHash(format!("0x{:04x}", submissions.len())))
    }

    async fn wait_for_inclusion(&self, tx: &TxHash) -> Result<BlockRef> {
        // Inclusion is what advances the chain counter.
        self.chain_nonce.fetch_add(1, Ordering::SeqCst);
        Ok(BlockRef { hash: BlockHash(format!("{tx}-block")), number: 351 })
    }

    async fn events_for_block(&self, _block: &BlockHash) -> Result<Vec<EventRecord>> {
        Ok(self.events.lock().unwrap().clone())
    }

    async fn block_number(&self, _block: Option<&BlockHash>) -> Result<u64> {
        Ok(self.capacity.lock().unwrap().current_block_number)
    }

    async fn handle_for_identity(&self, identity: u64) -> Result<Option<HandleInfo>> {
        Ok(self.handles.lock().unwrap().get(&identity).cloned())
    }

    async fn keys_for_identity(&self, identity: u64) -> Result<Vec<String>> {
        let identities = self.identities.lock().unwrap();
        Ok(identities
            .iter()
            .filter(|(_, id)| **id == identity)
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn identity_for_key(&self, key: &AccountId) -> Result<Option<u64>> {
        Ok(self.identities.lock().unwrap().get(&key.0).copied())
    }
}

pub fn account() -> AccountId {
    AccountId::from("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY")
}

pub fn config() -> RelayConfig {
    RelayConfig::new(ChainSettings {
        endpoint: "http://localhost:9944".parse().unwrap(),
        account: account(),
        provider_id: PROVIDER,
    })
}

pub fn announcement(category: Category, n: u64) -> Announcement {
    Announcement {
        category,
        user_id: n,
        schema_id: 5,
        content_hash: format!("0x{n:02x}"),
        payload: json!({ "seq": n }),
    }
}
