#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-types** – Shared primitive data structures for the causal event
//! ledger.
//!
//! The crate is dependency-light and sits at the bottom of the crate graph
//! so every other crate can depend on it without causing cycles. It makes no
//! assumptions about I/O, locking, or storage — see `ledger-dag`,
//! `ledger-store-core` and `ledger-core` for those concerns.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

//─────────────────────────────
//  Core identifiers
//─────────────────────────────

/// Unique identifier for a committed event (UUID v4), assigned at ingestion
/// time and never reused.
pub type EventId = Uuid;

/// Integer vertex identifier inside the DAG. Dense, `[0, numVertices)`.
pub type GraphVertexId = usize;

/// A mapping from string keys to dynamically typed values, used both for
/// event payloads and for projected entity state.
pub type PayloadMap = serde_json::Map<String, serde_json::Value>;

/// Per-node monotonic counter mapping used by [`VectorClock`](https://docs.rs/ledger-vclock).
pub type ClockMap = HashMap<String, u64>;

//─────────────────────────────
//  Event record
//─────────────────────────────

/// Validation failures raised while constructing an [`EventRecord`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EventRecordError {
    /// A required string field was empty.
    #[error("required field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// An immutable commit in the ledger.
///
/// Carries identity, wall-clock metadata, the emitting service, a dynamic
/// payload, the ids of its causal parents, and the vector clock stamped by
/// the [`VectorClockManager`](https://docs.rs/ledger-vclock) at creation
/// time. Records are never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// Unique event identifier, generated at commit time.
    pub event_id: EventId,
    /// Wall-clock instant the event was committed. Informational only.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// The node that emitted this event.
    pub node_id: String,
    /// Logical flow identifier used for per-trace auto-parenting.
    pub trace_id: String,
    /// Emitting service name. Doubles as the entity key for state projection.
    pub service_name: String,
    /// Emitting service version.
    pub service_version: String,
    /// Emitting host name.
    pub hostname: String,
    /// Application-defined event type, e.g. `USER_CREATED`.
    pub event_type: String,
    /// Dynamically typed payload fields.
    pub payload: PayloadMap,
    /// Ordered, deduplicated ids of this event's causal parents. Every id
    /// here referred to an existing event at the moment of ingestion.
    pub causal_parent_event_ids: SmallVec<[EventId; 4]>,
    /// Vector clock stamped onto this event by the clock manager.
    pub vector_clock: ClockMap,
}

/// Fields required to construct a new [`EventRecord`] before an id, vector
/// clock, and timestamp have been assigned. Used internally by the ledger
/// coordinator and by tests that want to bypass `VectorClockManager`.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// See [`EventRecord::node_id`].
    pub node_id: String,
    /// See [`EventRecord::trace_id`].
    pub trace_id: String,
    /// See [`EventRecord::service_name`].
    pub service_name: String,
    /// See [`EventRecord::service_version`].
    pub service_version: String,
    /// See [`EventRecord::hostname`].
    pub hostname: String,
    /// See [`EventRecord::event_type`].
    pub event_type: String,
    /// See [`EventRecord::payload`].
    pub payload: PayloadMap,
    /// Resolved (explicit or auto-parented) causal parents, deduplicated and
    /// order-preserved.
    pub causal_parent_event_ids: SmallVec<[EventId; 4]>,
}

impl EventDraft {
    /// Validate that every required string field is non-empty.
    ///
    /// `causal_parent_event_ids` and `payload` are not validated here —
    /// parent existence is a DAG-level concern and payload shape is caller
    /// defined.
    pub fn validate(&self) -> Result<(), EventRecordError> {
        if self.trace_id.is_empty() {
            return Err(EventRecordError::EmptyField("trace_id"));
        }
        if self.service_name.is_empty() {
            return Err(EventRecordError::EmptyField("service_name"));
        }
        if self.service_version.is_empty() {
            return Err(EventRecordError::EmptyField("service_version"));
        }
        if self.hostname.is_empty() {
            return Err(EventRecordError::EmptyField("hostname"));
        }
        if self.event_type.is_empty() {
            return Err(EventRecordError::EmptyField("event_type"));
        }
        Ok(())
    }
}

/// Deduplicate a sequence of parent ids while preserving first-seen order.
pub fn dedup_parents(ids: impl IntoIterator<Item = EventId>) -> SmallVec<[EventId; 4]> {
    let mut seen = std::collections::HashSet::new();
    let mut out = SmallVec::new();
    for id in ids {
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}

//─────────────────────────────
//  Causality comparison
//─────────────────────────────

/// Result of comparing the vector clocks of two committed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CausalityRelation {
    /// The first event happens-before the second.
    Causes,
    /// The second event happens-before the first.
    CausedBy,
    /// Neither happens-before the other.
    Concurrent,
    /// The two ids refer to the same event.
    Identical,
    /// One or both events' clocks are unknown.
    Undefined,
}

//─────────────────────────────
//  Default event type catalogue
//─────────────────────────────

/// The fixed catalogue of domain event types with default reducers
/// registered by [`ledger-projector`](https://docs.rs/ledger-projector).
pub mod catalogue {
    /// User lifecycle events.
    pub const USER_CREATED: &str = "USER_CREATED";
    /// See [`USER_CREATED`].
    pub const USER_RENAMED: &str = "USER_RENAMED";
    /// See [`USER_CREATED`].
    pub const USER_DEACTIVATED: &str = "USER_DEACTIVATED";
    /// See [`USER_CREATED`].
    pub const USER_REACTIVATED: &str = "USER_REACTIVATED";
    /// Product lifecycle events.
    pub const PRODUCT_ADDED: &str = "PRODUCT_ADDED";
    /// See [`PRODUCT_ADDED`].
    pub const PRODUCT_UPDATED: &str = "PRODUCT_UPDATED";
    /// See [`PRODUCT_ADDED`].
    pub const STOCK_INCREMENTED: &str = "STOCK_INCREMENTED";
    /// See [`PRODUCT_ADDED`].
    pub const STOCK_DECREMENTED: &str = "STOCK_DECREMENTED";
    /// Order lifecycle events.
    pub const ORDER_CREATED: &str = "ORDER_CREATED";
    /// See [`ORDER_CREATED`].
    pub const ORDER_CONFIRMED: &str = "ORDER_CONFIRMED";
    /// See [`ORDER_CREATED`].
    pub const ORDER_SHIPPED: &str = "ORDER_SHIPPED";
    /// See [`ORDER_CREATED`].
    pub const ORDER_CANCELLED: &str = "ORDER_CANCELLED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_rejects_empty_required_fields() {
        let draft = EventDraft {
            node_id: "n1".into(),
            trace_id: String::new(),
            service_name: "svc".into(),
            service_version: "1.0".into(),
            hostname: "host".into(),
            event_type: "X".into(),
            payload: PayloadMap::new(),
            causal_parent_event_ids: SmallVec::new(),
        };
        assert_eq!(draft.validate(), Err(EventRecordError::EmptyField("trace_id")));
    }

    #[test]
    fn dedup_parents_preserves_first_seen_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let deduped = dedup_parents(vec![a, b, a]);
        assert_eq!(&deduped[..], &[a, b]);
    }

    #[test]
    fn event_record_round_trips_through_json() {
        let mut payload = PayloadMap::new();
        payload.insert("x".to_string(), serde_json::json!(1));
        let record = EventRecord {
            event_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            node_id: "node-a".into(),
            trace_id: "trace-1".into(),
            service_name: "USER_ACCOUNT".into(),
            service_version: "1.0.0".into(),
            hostname: "host-a".into(),
            event_type: catalogue::USER_CREATED.into(),
            payload,
            causal_parent_event_ids: SmallVec::new(),
            vector_clock: ClockMap::from([("node-a".to_string(), 1u64)]),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
