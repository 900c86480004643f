#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-store-memory** – In-memory [`EventStore`] driver.
//!
//! Suitable for tests and development. All data is lost when the process
//! terminates; combined with the cold-start path in `ledger-core`, this is
//! still fully recoverable as long as the event log survives.

use std::collections::HashMap;

use async_trait::async_trait;
use ledger_store_core::{decode_event, encode_event, EventStore, StoreError};
use ledger_types::{EventId, EventRecord};
use tokio::sync::RwLock;

/// An in-memory, non-persistent [`EventStore`].
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    bodies: RwLock<HashMap<EventId, Vec<u8>>>,
}

impl MemoryEventStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all stored events. Used in tests that want a clean slate.
    pub async fn clear(&self) {
        self.bodies.write().await.clear();
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn put(&self, event: &EventRecord) -> Result<(), StoreError> {
        let bytes = encode_event(event)?;
        self.bodies.write().await.insert(event.event_id, bytes);
        Ok(())
    }

    async fn get(&self, id: &EventId) -> Result<Option<EventRecord>, StoreError> {
        match self.bodies.read().await.get(id) {
            Some(bytes) => Ok(Some(decode_event(bytes)?)),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.bodies.read().await.len())
    }
}
