//! Core types shared across the relay pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Announcement categories, each backed by its own queue and live batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// New top-level content.
    Broadcast,
    /// A reply to existing content.
    Reply,
    /// A reaction to existing content.
    Reaction,
    /// An edit of previously announced content.
    Update,
    /// A retraction of previously announced content.
    Tombstone,
    /// A profile change.
    Profile,
}

impl Category {
    /// All categories, in the order their timers are armed at startup.
    pub const ALL: [Category; 6] = [
        Category::Broadcast,
        Category::Reply,
        Category::Reaction,
        Category::Update,
        Category::Tombstone,
        Category::Profile,
    ];

    /// The category name as used in queue names and metric labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Category::Broadcast => "broadcast",
            Category::Reply => "reply",
            Category::Reaction => "reaction",
            Category::Update => "update",
            Category::Tombstone => "tombstone",
            Category::Profile => "profile",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One content-change unit destined for the ledger.
///
/// Immutable once created; owned by the batching engine until it is folded into
/// a [`Batch`](crate::batcher::Batch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// The category this announcement belongs to.
    pub category: Category,
    /// The user the content change belongs to.
    pub user_id: u64,
    /// The schema describing the payload.
    pub schema_id: u16,
    /// Hash of the announced content.
    pub content_hash: String,
    /// The downstream business payload. Opaque to the pipeline beyond routing,
    /// counting and batching.
    pub payload: serde_json::Value,
}

impl Announcement {
    /// Rough serialized size of the announcement, used to track batch weight.
    pub fn size_estimate(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// A submitting account, in SS58 form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The on-chain identity of the provider sponsoring submissions.
pub type ProviderId = u64;

/// Hash of a submitted extrinsic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(pub String);

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A block reference: hash plus number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// The block hash.
    pub hash: BlockHash,
    /// The block number.
    pub number: u64,
}

/// A typed call to be wrapped into a signed extrinsic by the chain client.
///
/// Mirrors the `(pallet, call, args)` shape the ledger exposes. Construction of
/// the wire encoding is the chain client's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtrinsicCall {
    /// The pallet the call belongs to.
    pub pallet: String,
    /// The call name.
    pub call: String,
    /// Call parameters as structured JSON.
    pub params: serde_json::Value,
}

impl ExtrinsicCall {
    /// A combined batch-publish call carrying all announcements of one flush,
    /// in arrival order.
    pub fn publish_batch(category: Category, items: &[Announcement]) -> Self {
        Self {
            pallet: "messages".into(),
            call: "publish_batch".into(),
            params: serde_json::json!({
                "category": category,
                "messages": items,
            }),
        }
    }
}
