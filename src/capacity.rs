//! Capacity admission control.
//!
//! Gates submissions against the provider's epoch-scoped capacity quota. The
//! check is pure: on-chain state is authoritative and the ledger itself
//! decrements capacity at inclusion, so nothing is cached across calls and
//! nothing remote is mutated here.

use crate::{chain::ChainClient, error::ChainError, types::ProviderId};
use metrics::Counter;
use metrics_derive::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Read-only mirror of the provider's on-chain capacity state, re-fetched per
/// admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEpochState {
    /// The current epoch number.
    pub epoch_number: u64,
    /// The block the current epoch started at.
    pub epoch_start_block: u64,
    /// The length of an epoch in blocks.
    pub epoch_length_blocks: u64,
    /// Capacity left in the current epoch.
    pub remaining_capacity: u128,
    /// Total capacity issued to the provider.
    pub total_capacity_issued: u128,
    /// The block number at the time of the query.
    pub current_block_number: u64,
}

impl CapacityEpochState {
    /// The block at which the current epoch ends and capacity replenishes.
    pub fn next_epoch_start(&self) -> u64 {
        self.epoch_start_block + self.epoch_length_blocks
    }

    /// Blocks left until capacity replenishes, from the query's point of view.
    pub fn blocks_until_reset(&self) -> u64 {
        self.next_epoch_start().saturating_sub(self.current_block_number)
    }
}

/// The admission decision for a pending submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Enough capacity remains; the submission may proceed.
    Admitted {
        /// Capacity remaining before this submission.
        remaining: u128,
    },
    /// Not enough capacity remains this epoch.
    Rejected {
        /// The estimated cost that was requested.
        required: u128,
        /// Capacity actually remaining.
        remaining: u128,
        /// The block at which capacity replenishes.
        next_epoch_start: u64,
    },
}

#[derive(Metrics)]
#[metrics(scope = "capacity")]
struct CapacityMetrics {
    /// Number of admitted submission checks.
    admitted: Counter,
    /// Number of rejected submission checks.
    rejected: Counter,
}

/// Decides admit/reject for pending submissions against the replenishing,
/// epoch-scoped quota of one provider.
#[derive(Debug)]
pub struct CapacityGate<C: ?Sized> {
    chain: Arc<C>,
    provider: ProviderId,
    metrics: CapacityMetrics,
}

impl<C: ChainClient + ?Sized> CapacityGate<C> {
    /// Creates a new [`CapacityGate`] for the given provider.
    pub fn new(chain: Arc<C>, provider: ProviderId) -> Self {
        Self { chain, provider, metrics: CapacityMetrics::default() }
    }

    /// Checks whether a submission with the given estimated cost fits into the
    /// remaining quota. Epoch rollover is implicit: the remaining value comes
    /// straight from the chain query, which reflects any reset.
    pub async fn check(&self, estimated_cost: u128) -> Result<Admission, ChainError> {
        let state = self.chain.query_capacity(self.provider).await?;

        debug!(
            provider = self.provider,
            epoch = state.epoch_number,
            remaining = state.remaining_capacity,
            required = estimated_cost,
            "capacity check"
        );

        if state.remaining_capacity < estimated_cost {
            self.metrics.rejected.increment(1);
            return Ok(Admission::Rejected {
                required: estimated_cost,
                remaining: state.remaining_capacity,
                next_epoch_start: state.next_epoch_start(),
            });
        }

        self.metrics.admitted.increment(1);
        Ok(Admission::Admitted { remaining: state.remaining_capacity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_boundary_math() {
        let state = CapacityEpochState {
            epoch_number: 4,
            epoch_start_block: 400,
            epoch_length_blocks: 100,
            remaining_capacity: 10,
            total_capacity_issued: 50,
            current_block_number: 460,
        };

        assert_eq!(state.next_epoch_start(), 500);
        assert_eq!(state.blocks_until_reset(), 40);

        let past_boundary = CapacityEpochState { current_block_number: 512, ..state };
        assert_eq!(past_boundary.blocks_until_reset(), 0);
    }
}
