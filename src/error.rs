//! Relay error types.

use crate::types::Category;
use thiserror::Error;

/// Errors returned by the chain client facade.
#[derive(Debug, Error)]
pub enum ChainError {
    /// An error occurred talking to the chain RPC endpoint.
    #[error(transparent)]
    Rpc(#[from] jsonrpsee::core::ClientError),
    /// The endpoint could not be reached or timed out.
    #[error("chain endpoint unavailable: {0}")]
    Unavailable(String),
    /// The ledger rejected the extrinsic.
    ///
    /// Indicates a caller bug or a state mismatch (malformed extrinsic,
    /// signature mismatch, insufficient balance). Never retried automatically.
    #[error("extrinsic rejected by ledger: {reason}")]
    Rejected {
        /// Rejection reason as reported by the ledger.
        reason: String,
    },
    /// A response could not be decoded.
    #[error("malformed chain response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ChainError {
    /// Whether the error is transient and worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Rpc(_) | ChainError::Unavailable(_))
    }
}

/// Errors returned by the coordination store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error occurred talking to Redis.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    /// The store could not be reached.
    ///
    /// Transient; retried by the caller, never swallowed.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the nonce allocator.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Every candidate slot in the lookahead window is currently leased.
    ///
    /// A transient backpressure signal, not a software fault. Callers back off
    /// and retry; by then some leases will have expired or been released.
    #[error("all {window} candidate nonce slots are leased")]
    Exhausted {
        /// The configured window size.
        window: u64,
    },
    /// The coordination store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The chain nonce query failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl LeaseError {
    /// Whether the error is transient and worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            LeaseError::Exhausted { .. } | LeaseError::Store(_) => true,
            LeaseError::Chain(err) => err.is_transient(),
        }
    }
}

/// Terminal errors reported through a batch's failure outcome.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Capacity admission kept rejecting until the retry budget was exhausted.
    #[error("capacity admission retries exhausted for {category}: {reason}")]
    CapacityExhausted {
        /// The category of the failed batch.
        category: Category,
        /// The last rejection reason.
        reason: String,
    },
    /// A nonce lease could not be obtained within the retry budget.
    #[error(transparent)]
    Lease(#[from] LeaseError),
    /// The chain client failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// The overarching error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Errors from the chain client.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Errors from the coordination store.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Errors from the nonce allocator.
    #[error(transparent)]
    Lease(#[from] LeaseError),
    /// Errors from the batching engine.
    #[error(transparent)]
    Batch(#[from] BatchError),
    /// An internal error occurred.
    #[error(transparent)]
    Internal(#[from] eyre::Error),
}
