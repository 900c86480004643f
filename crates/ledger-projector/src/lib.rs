#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-projector** – Registry of per-event-type reducers and the
//! deterministic fold that turns an entity's events into its current (or
//! historical) state.
//!
//! Unlike the process-wide handler registry this crate's reducer table is
//! modeled on, a [`StateProjector`] is owned by a single ledger instance:
//! tests and multiple ledgers in the same process must not share mutable
//! reducer state.

use std::collections::HashMap;
use std::sync::Arc;

use ledger_types::{catalogue, EventId, EventRecord, PayloadMap};

/// A pure fold step: given the entity's current state and the payload of
/// the next event in causal order, produce the next state.
pub type Reducer = Arc<dyn Fn(&PayloadMap, &PayloadMap) -> PayloadMap + Send + Sync>;

/// Registry of `eventType -> reducer`, plus the fold operations that use it.
#[derive(Clone, Default)]
pub struct StateProjector {
    reducers: HashMap<String, Reducer>,
}

impl StateProjector {
    /// An empty projector with no registered reducers.
    pub fn new() -> Self {
        Self::default()
    }

    /// A projector pre-populated with the default reducer catalogue.
    pub fn with_default_catalogue() -> Self {
        let mut projector = Self::new();
        projector.register_default_catalogue();
        projector
    }

    /// Register a reducer for `event_type`, replacing any existing one.
    pub fn register(&mut self, event_type: impl Into<String>, reducer: Reducer) {
        self.reducers.insert(event_type.into(), reducer);
    }

    /// Whether a reducer is registered for `event_type`.
    pub fn has_reducer(&self, event_type: &str) -> bool {
        self.reducers.contains_key(event_type)
    }

    /// Fold every event in `ordered_events` whose `service_name == entity`
    /// into state, starting from the empty mapping. Events for a type with
    /// no registered reducer are skipped with a warning.
    ///
    /// `ordered_events` must already be in cause-before-effect (topological)
    /// order; this function does no ordering of its own.
    pub fn project_state(&self, entity: &str, ordered_events: &[EventRecord]) -> PayloadMap {
        let mut state = PayloadMap::new();
        for event in ordered_events {
            if event.service_name != entity {
                continue;
            }
            self.apply(&mut state, event);
        }
        state
    }

    /// Like [`Self::project_state`], but stops after the first occurrence of
    /// `up_to_event_id`. If that id never appears in `ordered_events`, the
    /// result is the empty mapping.
    pub fn project_state_up_to(
        &self,
        entity: &str,
        ordered_events: &[EventRecord],
        up_to_event_id: EventId,
    ) -> PayloadMap {
        if !ordered_events.iter().any(|e| e.event_id == up_to_event_id) {
            return PayloadMap::new();
        }
        let mut state = PayloadMap::new();
        for event in ordered_events {
            if event.service_name == entity {
                self.apply(&mut state, event);
            }
            if event.event_id == up_to_event_id {
                break;
            }
        }
        state
    }

    fn apply(&self, state: &mut PayloadMap, event: &EventRecord) {
        match self.reducers.get(&event.event_type) {
            Some(reducer) => {
                *state = reducer(state, &event.payload);
            }
            None => {
                tracing::warn!(
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    "no reducer registered for event type, skipping during projection"
                );
            }
        }
    }

    /// Register the fixed catalogue of user/product/order lifecycle
    /// reducers. Each bumps a `version` counter, defaulting to 0 if absent
    /// or of the wrong type.
    pub fn register_default_catalogue(&mut self) {
        self.register(catalogue::USER_CREATED, Arc::new(user_created));
        self.register(catalogue::USER_RENAMED, Arc::new(user_renamed));
        self.register(catalogue::USER_DEACTIVATED, Arc::new(user_deactivated));
        self.register(catalogue::USER_REACTIVATED, Arc::new(user_reactivated));
        self.register(catalogue::PRODUCT_ADDED, Arc::new(product_added));
        self.register(catalogue::PRODUCT_UPDATED, Arc::new(product_updated));
        self.register(catalogue::STOCK_INCREMENTED, Arc::new(stock_incremented));
        self.register(catalogue::STOCK_DECREMENTED, Arc::new(stock_decremented));
        self.register(catalogue::ORDER_CREATED, Arc::new(order_created));
        self.register(catalogue::ORDER_CONFIRMED, Arc::new(order_confirmed));
        self.register(catalogue::ORDER_SHIPPED, Arc::new(order_shipped));
        self.register(catalogue::ORDER_CANCELLED, Arc::new(order_cancelled));
    }
}

//─────────────────────────────
//  Default reducer catalogue
//─────────────────────────────

fn version_of(state: &PayloadMap) -> i64 {
    state.get("version").and_then(|v| v.as_i64()).unwrap_or(0)
}

fn bump_version(state: &mut PayloadMap) {
    let next = version_of(state) + 1;
    state.insert("version".into(), next.into());
}

fn number_of(payload: &PayloadMap, key: &str) -> f64 {
    payload.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn user_created(_state: &PayloadMap, payload: &PayloadMap) -> PayloadMap {
    let mut state = PayloadMap::new();
    if let Some(user_id) = payload.get("userId") {
        state.insert("userId".into(), user_id.clone());
    }
    if let Some(username) = payload.get("username") {
        state.insert("username".into(), username.clone());
    }
    state.insert("isActive".into(), true.into());
    state.insert("version".into(), 1.into());
    state
}

fn user_renamed(state: &PayloadMap, payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    if let Some(new_username) = payload.get("newUsername") {
        state.insert("username".into(), new_username.clone());
    }
    bump_version(&mut state);
    state
}

fn user_deactivated(state: &PayloadMap, _payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    state.insert("isActive".into(), false.into());
    bump_version(&mut state);
    state
}

fn user_reactivated(state: &PayloadMap, _payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    state.insert("isActive".into(), true.into());
    bump_version(&mut state);
    state
}

fn product_added(_state: &PayloadMap, payload: &PayloadMap) -> PayloadMap {
    let mut state = payload.clone();
    state.insert("version".into(), 1.into());
    state
}

fn product_updated(state: &PayloadMap, payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    for (key, value) in payload {
        state.insert(key.clone(), value.clone());
    }
    bump_version(&mut state);
    state
}

fn stock_incremented(state: &PayloadMap, payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    let current = number_of(&state, "currentStock");
    let amount = number_of(payload, "amount");
    state.insert("currentStock".into(), (current + amount).into());
    bump_version(&mut state);
    state
}

fn stock_decremented(state: &PayloadMap, payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    let current = number_of(&state, "currentStock");
    let amount = number_of(payload, "amount");
    state.insert("currentStock".into(), (current - amount).into());
    bump_version(&mut state);
    state
}

fn order_created(_state: &PayloadMap, payload: &PayloadMap) -> PayloadMap {
    let mut state = payload.clone();
    state.insert("status".into(), "CREATED".into());
    state.insert("version".into(), 1.into());
    state
}

fn order_confirmed(state: &PayloadMap, _payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    state.insert("status".into(), "CONFIRMED".into());
    bump_version(&mut state);
    state
}

fn order_shipped(state: &PayloadMap, _payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    state.insert("status".into(), "SHIPPED".into());
    bump_version(&mut state);
    state
}

fn order_cancelled(state: &PayloadMap, _payload: &PayloadMap) -> PayloadMap {
    let mut state = state.clone();
    state.insert("status".into(), "CANCELLED".into());
    bump_version(&mut state);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::catalogue;
    use smallvec::SmallVec;
    use uuid::Uuid;

    fn event(service: &str, event_type: &str, payload: PayloadMap) -> EventRecord {
        EventRecord {
            event_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            node_id: "n".into(),
            trace_id: "t".into(),
            service_name: service.into(),
            service_version: "1".into(),
            hostname: "h".into(),
            event_type: event_type.into(),
            payload,
            causal_parent_event_ids: SmallVec::new(),
            vector_clock: Default::default(),
        }
    }

    fn payload(pairs: &[(&str, serde_json::Value)]) -> PayloadMap {
        let mut map = PayloadMap::new();
        for (k, v) in pairs {
            map.insert((*k).to_string(), v.clone());
        }
        map
    }

    #[test]
    fn user_lifecycle_projects_to_expected_final_state() {
        let projector = StateProjector::with_default_catalogue();
        let created = event(
            "USER_ACCOUNT",
            catalogue::USER_CREATED,
            payload(&[("userId", "u1".into()), ("username", "a".into())]),
        );
        let creation_id = created.event_id;
        let renamed = event(
            "USER_ACCOUNT",
            catalogue::USER_RENAMED,
            payload(&[("newUsername", "b".into())]),
        );

        let events = vec![created, renamed];
        let current = projector.project_state("USER_ACCOUNT", &events);
        assert_eq!(current.get("username").unwrap(), "b");
        assert_eq!(current.get("version").unwrap(), 2);
        assert_eq!(current.get("isActive").unwrap(), true);

        let historical = projector.project_state_up_to("USER_ACCOUNT", &events, creation_id);
        assert_eq!(historical.get("username").unwrap(), "a");
        assert_eq!(historical.get("version").unwrap(), 1);
    }

    #[test]
    fn project_state_up_to_unknown_id_returns_empty() {
        let projector = StateProjector::with_default_catalogue();
        let created = event(
            "USER_ACCOUNT",
            catalogue::USER_CREATED,
            payload(&[("userId", "u1".into())]),
        );
        let events = vec![created];
        let result = projector.project_state_up_to("USER_ACCOUNT", &events, Uuid::new_v4());
        assert!(result.is_empty());
    }

    #[test]
    fn unregistered_event_type_is_skipped_not_fatal() {
        let projector = StateProjector::new();
        let events = vec![event("SVC", "NO_REDUCER", payload(&[]))];
        let result = projector.project_state("SVC", &events);
        assert!(result.is_empty());
    }

    #[test]
    fn stock_reducers_default_missing_fields_to_zero() {
        let projector = StateProjector::with_default_catalogue();
        let events = vec![event(
            "INVENTORY",
            catalogue::STOCK_INCREMENTED,
            payload(&[("amount", 5.into())]),
        )];
        let state = projector.project_state("INVENTORY", &events);
        assert_eq!(state.get("currentStock").unwrap(), &serde_json::json!(5.0));
    }

    #[test]
    fn events_from_other_services_are_ignored() {
        let projector = StateProjector::with_default_catalogue();
        let events = vec![event(
            "OTHER_SERVICE",
            catalogue::USER_CREATED,
            payload(&[("userId", "u1".into())]),
        )];
        let state = projector.project_state("USER_ACCOUNT", &events);
        assert!(state.is_empty());
    }
}
