//! Chain event interpretation.
//!
//! Turns raw ledger event records back into typed domain outcomes used to
//! confirm what a submission actually did. Decoding is keyed on the stable
//! `(pallet, event)` discriminator; anything else maps to an explicit
//! [`ChainEvent::Unrecognized`] rather than silently passing through.

use crate::{
    chain::ChainClient,
    error::ChainError,
    types::{AccountId, ProviderId},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// A raw event record as emitted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// The pallet that emitted the event.
    pub pallet: String,
    /// The event name within the pallet.
    pub event: String,
    /// Event fields as structured JSON.
    pub data: serde_json::Value,
}

impl EventRecord {
    /// Convenience constructor, mostly for tests.
    pub fn new(pallet: &str, event: &str, data: serde_json::Value) -> Self {
        Self { pallet: pallet.into(), event: event.into(), data }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityCreatedData {
    msa_id: u64,
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandleClaimedData {
    msa_id: u64,
    handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DelegationGrantedData {
    provider_id: u64,
    delegator_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageUpdatedData {
    msa_id: u64,
    schema_id: u16,
    prev_content_hash: String,
    curr_content_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesStoredData {
    schema_id: u16,
    count: u64,
}

/// A decoded ledger event the pipeline recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A new identity was registered.
    IdentityCreated {
        /// The new identity id.
        identity_id: u64,
        /// The control key the identity was created for.
        key: String,
    },
    /// A handle was claimed for an identity.
    HandleClaimed {
        /// The identity claiming the handle.
        identity_id: u64,
        /// The claimed handle, hex-encoded with a `0x` prefix.
        handle_hex: String,
    },
    /// A provider delegation was granted.
    DelegationGranted {
        /// The provider the delegation was granted to.
        provider_id: u64,
        /// The delegating identity.
        delegator_id: u64,
    },
    /// A public key was added to an identity.
    PublicKeyAdded {
        /// The identity the key was added to.
        identity_id: u64,
        /// The added key.
        key: String,
    },
    /// An itemized storage page changed.
    ItemizedPageUpdated {
        /// The identity owning the page.
        identity_id: u64,
        /// The schema of the page.
        schema_id: u16,
        /// Content hash before the update.
        prev_content_hash: String,
        /// Content hash after the update.
        curr_content_hash: String,
    },
    /// A batch of messages was stored.
    MessagesStored {
        /// The schema the messages belong to.
        schema_id: u16,
        /// Number of stored messages.
        count: u64,
    },
    /// Any event kind the pipeline does not care about.
    Unrecognized,
}

impl ChainEvent {
    /// Decodes a raw record. Field mismatches degrade to
    /// [`ChainEvent::Unrecognized`]; decoding the same record twice yields the
    /// same result.
    pub fn decode(record: &EventRecord) -> Self {
        fn fields<T: serde::de::DeserializeOwned>(record: &EventRecord) -> Option<T> {
            match serde_json::from_value(record.data.clone()) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(
                        pallet = %record.pallet,
                        event = %record.event,
                        %err,
                        "unexpected event shape, ignoring"
                    );
                    None
                }
            }
        }

        let decoded = match (record.pallet.as_str(), record.event.as_str()) {
            ("msa", "MsaCreated") => fields(record)
                .map(|d: IdentityCreatedData| ChainEvent::IdentityCreated {
                    identity_id: d.msa_id,
                    key: d.key,
                }),
            ("handles", "HandleClaimed") => fields(record)
                .map(|d: HandleClaimedData| ChainEvent::HandleClaimed {
                    identity_id: d.msa_id,
                    handle_hex: d.handle,
                }),
            ("msa", "DelegationGranted") => fields(record)
                .map(|d: DelegationGrantedData| ChainEvent::DelegationGranted {
                    provider_id: d.provider_id,
                    delegator_id: d.delegator_id,
                }),
            ("msa", "PublicKeyAdded") => fields(record)
                .map(|d: IdentityCreatedData| ChainEvent::PublicKeyAdded {
                    identity_id: d.msa_id,
                    key: d.key,
                }),
            ("statefulStorage", "ItemizedPageUpdated") => fields(record)
                .map(|d: PageUpdatedData| ChainEvent::ItemizedPageUpdated {
                    identity_id: d.msa_id,
                    schema_id: d.schema_id,
                    prev_content_hash: d.prev_content_hash,
                    curr_content_hash: d.curr_content_hash,
                }),
            ("messages", "MessagesStored") => fields(record)
                .map(|d: MessagesStoredData| ChainEvent::MessagesStored {
                    schema_id: d.schema_id,
                    count: d.count,
                }),
            _ => None,
        };

        decoded.unwrap_or(ChainEvent::Unrecognized)
    }
}

/// A typed outcome extracted from a submission's event records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypedOutcome {
    /// An identity was created.
    IdentityCreated {
        /// The new identity id.
        identity_id: u64,
        /// The control key.
        key: String,
    },
    /// A handle was claimed.
    HandleClaimed {
        /// The identity claiming the handle.
        identity_id: u64,
        /// The human-readable handle. Falls back to the raw hex form when the
        /// on-chain bytes are not valid UTF-8.
        handle: String,
    },
    /// A delegation was granted.
    DelegationGranted {
        /// The provider.
        provider_id: u64,
        /// The delegator.
        delegator_id: u64,
    },
    /// A public key was added.
    PublicKeyAdded {
        /// The identity.
        identity_id: u64,
        /// The added key.
        key: String,
    },
    /// An itemized page changed.
    ItemizedPageUpdated {
        /// The identity owning the page.
        identity_id: u64,
        /// The schema of the page.
        schema_id: u16,
        /// Content hash before the update.
        prev_content_hash: String,
        /// Content hash after the update.
        curr_content_hash: String,
    },
    /// A batch of messages was stored.
    MessagesStored {
        /// The schema.
        schema_id: u16,
        /// Number of stored messages.
        count: u64,
    },
}

/// An identity confirmation assembled from events, with state-query fallback
/// for values the event stream omitted (for example, no identity-created event
/// because the identity pre-existed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityConfirmation {
    /// The identity the submission acted on.
    pub identity_id: Option<u64>,
    /// The identity's handle in `base.suffix` form.
    pub handle: Option<String>,
    /// The identity's control key.
    pub control_key: Option<String>,
    /// The provider the identity is delegated to.
    pub provider_id: ProviderId,
}

/// Decodes event records into typed confirmations of a submission's effect.
#[derive(Debug, Clone)]
pub struct EventInterpreter<C: ?Sized> {
    chain: Arc<C>,
    provider: ProviderId,
}

impl<C: ChainClient + ?Sized> EventInterpreter<C> {
    /// Creates a new [`EventInterpreter`] for the given provider.
    pub fn new(chain: Arc<C>, provider: ProviderId) -> Self {
        Self { chain, provider }
    }

    /// Scans a flat record sequence and extracts every recognized outcome.
    ///
    /// A single transaction may emit more than one relevant event; all of them
    /// are returned, in record order. Pure and idempotent.
    pub fn interpret(&self, records: &[EventRecord]) -> Vec<TypedOutcome> {
        records
            .iter()
            .filter_map(|record| match ChainEvent::decode(record) {
                ChainEvent::IdentityCreated { identity_id, key } => {
                    Some(TypedOutcome::IdentityCreated { identity_id, key })
                }
                ChainEvent::HandleClaimed { identity_id, handle_hex } => {
                    let handle = decode_handle(&handle_hex).unwrap_or_else(|| {
                        warn!(%identity_id, raw = %handle_hex, "handle bytes are not valid UTF-8");
                        handle_hex.clone()
                    });
                    Some(TypedOutcome::HandleClaimed { identity_id, handle })
                }
                ChainEvent::DelegationGranted { provider_id, delegator_id } => {
                    Some(TypedOutcome::DelegationGranted { provider_id, delegator_id })
                }
                ChainEvent::PublicKeyAdded { identity_id, key } => {
                    Some(TypedOutcome::PublicKeyAdded { identity_id, key })
                }
                ChainEvent::ItemizedPageUpdated {
                    identity_id,
                    schema_id,
                    prev_content_hash,
                    curr_content_hash,
                } => Some(TypedOutcome::ItemizedPageUpdated {
                    identity_id,
                    schema_id,
                    prev_content_hash,
                    curr_content_hash,
                }),
                ChainEvent::MessagesStored { schema_id, count } => {
                    Some(TypedOutcome::MessagesStored { schema_id, count })
                }
                ChainEvent::Unrecognized => None,
            })
            .collect()
    }

    /// Assembles an identity confirmation for a signup-style submission.
    ///
    /// Values absent from the event stream are filled from current chain
    /// state: the identity id from the submitting key, the handle from the
    /// handles query, the control key from the identity's key set. The
    /// delegated provider defaults to the one this relay is configured for.
    /// Fields that cannot be resolved stay `None` rather than failing the
    /// whole confirmation.
    pub async fn confirm_identity(
        &self,
        records: &[EventRecord],
        submitting_key: &AccountId,
    ) -> Result<IdentityConfirmation, ChainError> {
        let mut confirmation = IdentityConfirmation {
            identity_id: None,
            handle: None,
            control_key: None,
            provider_id: self.provider,
        };

        for outcome in self.interpret(records) {
            match outcome {
                TypedOutcome::IdentityCreated { identity_id, key } => {
                    confirmation.identity_id = Some(identity_id);
                    confirmation.control_key = Some(key);
                }
                TypedOutcome::HandleClaimed { identity_id, handle } => {
                    confirmation.identity_id.get_or_insert(identity_id);
                    confirmation.handle = Some(handle);
                }
                TypedOutcome::DelegationGranted { provider_id, delegator_id } => {
                    confirmation.identity_id.get_or_insert(delegator_id);
                    confirmation.provider_id = provider_id;
                }
                _ => {}
            }
        }

        if confirmation.identity_id.is_none() {
            confirmation.identity_id = self.chain.identity_for_key(submitting_key).await?;
        }

        if let Some(identity_id) = confirmation.identity_id {
            if confirmation.handle.is_none() {
                confirmation.handle =
                    self.chain.handle_for_identity(identity_id).await?.map(|h| h.full());
            }
            if confirmation.control_key.is_none() {
                confirmation.control_key =
                    self.chain.keys_for_identity(identity_id).await?.into_iter().next();
            }
        }

        Ok(confirmation)
    }
}

/// Decodes an on-chain handle from its hex-encoded form.
///
/// The chain emits handles as `0x`-prefixed hex bytes; the fixed 2-character
/// prefix is stripped before byte-to-text decoding. This is a format contract,
/// not an implementation detail.
pub fn decode_handle(handle_hex: &str) -> Option<String> {
    let digits = handle_hex.get(2..)?;
    let bytes = hex::decode(digits).ok()?;
    String::from_utf8(bytes).ok()
}
