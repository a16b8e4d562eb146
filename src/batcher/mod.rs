//! Batching engine.
//!
//! Accumulates per-category announcements into size/time-bounded batches and
//! drives the submission pipeline on flush: capacity admission, nonce lease,
//! combined extrinsic, inclusion, event interpretation, completion signal.

mod metrics;
pub(crate) use metrics::BatcherMetrics;
mod service;
pub use service::Batcher;

use crate::{
    events::TypedOutcome,
    types::{Announcement, Category},
};
use serde::Serialize;
use std::time::Instant;

/// The live batch of one category.
///
/// Single-writer: appends and the flush swap are serialized under the
/// category's lock. One live batch exists per category at a time.
#[derive(Debug)]
pub struct Batch {
    category: Category,
    items: Vec<Announcement>,
    /// Set when the first item lands after a flush (or startup).
    created_at: Option<Instant>,
    size_bytes_estimate: usize,
}

impl Batch {
    /// Creates a fresh empty batch for `category`.
    pub fn new(category: Category) -> Self {
        Self { category, items: Vec::new(), created_at: None, size_bytes_estimate: 0 }
    }

    /// The category of this batch.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Appends an announcement, preserving arrival order.
    pub fn push(&mut self, announcement: Announcement) {
        self.created_at.get_or_insert_with(Instant::now);
        self.size_bytes_estimate += announcement.size_estimate();
        self.items.push(announcement);
    }

    /// Number of accumulated announcements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The accumulated announcements, in arrival order.
    pub fn items(&self) -> &[Announcement] {
        &self.items
    }

    /// Rough serialized size of the accumulated announcements.
    pub fn size_bytes_estimate(&self) -> usize {
        self.size_bytes_estimate
    }

    /// Time since the first item landed, `None` while empty.
    pub fn age(&self) -> Option<std::time::Duration> {
        self.created_at.map(|at| at.elapsed())
    }
}

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The live batch reached the configured max size.
    Size,
    /// The age timer fired.
    Timer,
    /// The relay is draining pending batches on shutdown.
    Shutdown,
}

/// The outcome of one flushed batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchOutcome {
    /// The batch was included; typed outcomes extracted from the inclusion
    /// block's events.
    Success {
        /// The extracted outcomes.
        outcomes: Vec<TypedOutcome>,
    },
    /// The batch failed terminally. The items ride along so the caller can
    /// dead-letter them; they are never silently dropped.
    Failure {
        /// The last error cause.
        reason: String,
        /// The items of the failed batch, in arrival order.
        items: Vec<Announcement>,
    },
}

/// Emitted once per flushed batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchCompletion {
    /// The flushed category.
    pub category: Category,
    /// Number of items in the flushed batch.
    pub item_count: usize,
    /// Success or terminal failure.
    pub outcome: BatchOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn announcement(n: u64) -> Announcement {
        Announcement {
            category: Category::Broadcast,
            user_id: n,
            schema_id: 2,
            content_hash: format!("0x{n:02x}"),
            payload: json!({"n": n}),
        }
    }

    #[test]
    fn batch_preserves_arrival_order() {
        let mut batch = Batch::new(Category::Broadcast);
        assert!(batch.is_empty());
        assert!(batch.age().is_none());

        for n in 0..5 {
            batch.push(announcement(n));
        }

        assert_eq!(batch.len(), 5);
        assert!(batch.age().is_some());
        assert!(batch.size_bytes_estimate() > 0);
        let order: Vec<u64> = batch.items().iter().map(|a| a.user_id).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }
}
