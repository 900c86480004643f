#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-store-core** – Core storage abstraction for the causal event
//! ledger.
//!
//! This crate defines the [`EventStore`] trait: a durable key→body map keyed
//! by event id, used to look up an event's full record without scanning the
//! append-only log. Concrete drivers (`ledger-store-memory`,
//! `ledger-store-sled`) implement this trait in separate crates so the
//! coordinator (`ledger-core`) can be generic over the backend.

use async_trait::async_trait;
use ledger_types::{EventId, EventRecord};

//─────────────────────────────
//  Errors
//─────────────────────────────

/// Errors surfaced by an [`EventStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The event's canonical form could not be serialized.
    #[error("failed to serialize event: {0}")]
    SerializationFailed(String),
    /// A stored blob could not be deserialized back into an [`EventRecord`].
    #[error("failed to deserialize event: {0}")]
    DeserializationFailed(String),
    /// The backend's underlying I/O failed.
    #[error("storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

/// Serialize an [`EventRecord`] to its canonical on-disk form.
///
/// Event store values use MessagePack (`rmp-serde`) — compact binary
/// encoding for the full record, distinct from the human-readable
/// newline-delimited JSON used by the event log.
pub fn encode_event(event: &EventRecord) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec_named(event).map_err(|e| StoreError::SerializationFailed(e.to_string()))
}

/// Deserialize an [`EventRecord`] from its canonical on-disk form.
pub fn decode_event(bytes: &[u8]) -> Result<EventRecord, StoreError> {
    rmp_serde::from_slice(bytes).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
}

//─────────────────────────────
//  EventStore trait
//─────────────────────────────

/// A durable key→value map from event id to the event's canonical body.
///
/// Implementations must be safe for concurrent `get`/`put`; the coordinator
/// still serializes writes under its own writer lock to preserve
/// log-then-store ordering (log append happens first; see `ledger-core`).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist `event`, keyed by its id. Overwrites any existing value for
    /// the same id (this should never happen in practice since ids are
    /// generated once at commit time).
    async fn put(&self, event: &EventRecord) -> Result<(), StoreError>;

    /// Fetch the full [`EventRecord`] for `id`, or `None` if absent.
    async fn get(&self, id: &EventId) -> Result<Option<EventRecord>, StoreError>;

    /// True iff an event with `id` has been stored.
    async fn contains(&self, id: &EventId) -> Result<bool, StoreError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Number of events currently stored. Used for startup probing and
    /// stats reporting.
    async fn len(&self) -> Result<usize, StoreError>;

    /// True iff the store is empty.
    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::PayloadMap;
    use smallvec::SmallVec;

    fn sample_event() -> EventRecord {
        EventRecord {
            event_id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            node_id: "n".into(),
            trace_id: "t".into(),
            service_name: "svc".into(),
            service_version: "1".into(),
            hostname: "h".into(),
            event_type: "X".into(),
            payload: PayloadMap::new(),
            causal_parent_event_ids: SmallVec::new(),
            vector_clock: Default::default(),
        }
    }

    #[test]
    fn encode_decode_round_trips() {
        let event = sample_event();
        let bytes = encode_event(&event).unwrap();
        let decoded = decode_event(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
