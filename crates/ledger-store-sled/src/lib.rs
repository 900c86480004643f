#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-store-sled** – Durable [`EventStore`] driver on the `sled`
//! embedded database.
//!
//! Opens a single tree, `bodies`, keyed by event id (16 raw UUID bytes) and
//! valued with the event's MessagePack-encoded canonical form. `sled` gives
//! ACID single-key operations and crash recovery for free; the ledger's own
//! append-only log remains the system of record, so the store never needs
//! its own WAL.

use std::path::Path;

use async_trait::async_trait;
use ledger_store_core::{decode_event, encode_event, EventStore, StoreError};
use ledger_types::{EventId, EventRecord};
use sled::{Db, Tree};

/// A durable, `sled`-backed [`EventStore`].
#[derive(Debug)]
pub struct SledEventStore {
    _db: Db,
    bodies: Tree,
}

impl SledEventStore {
    /// Open or create a sled database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::BackendError(e.into()))?;
        Self::from_db(db)
    }

    /// Wrap an already-open sled database.
    pub fn from_db(db: Db) -> Result<Self, StoreError> {
        let bodies = db
            .open_tree("bodies")
            .map_err(|e| StoreError::BackendError(e.into()))?;
        Ok(Self { _db: db, bodies })
    }

    /// Open a temporary, non-persistent database. Used in tests.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::BackendError(e.into()))?;
        Self::from_db(db)
    }

    /// Flush pending writes to disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.bodies
            .flush_async()
            .await
            .map_err(|e| StoreError::BackendError(e.into()))?;
        Ok(())
    }

    /// Probe the store for basic readability at startup — opens an
    /// iterator and consumes nothing. Used by the warm-start path.
    pub fn probe_readable(&self) -> Result<(), StoreError> {
        if let Some(first) = self.bodies.iter().next() {
            first.map_err(|e| StoreError::BackendError(e.into()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for SledEventStore {
    async fn put(&self, event: &EventRecord) -> Result<(), StoreError> {
        let bytes = encode_event(event)?;
        self.bodies
            .insert(event.event_id.as_bytes(), bytes)
            .map_err(|e| StoreError::BackendError(e.into()))?;
        Ok(())
    }

    async fn get(&self, id: &EventId) -> Result<Option<EventRecord>, StoreError> {
        match self
            .bodies
            .get(id.as_bytes())
            .map_err(|e| StoreError::BackendError(e.into()))?
        {
            Some(bytes) => Ok(Some(decode_event(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.bodies.len())
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

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = SledEventStore::temporary().unwrap();
        let event = sample_event();
        store.put(&event).await.unwrap();
        let fetched = store.get(&event.event_id).await.unwrap().unwrap();
        assert_eq!(fetched, event);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.sled");
        let event = sample_event();
        {
            let store = SledEventStore::open(&path).unwrap();
            store.put(&event).await.unwrap();
            store.flush().await.unwrap();
        }
        {
            let store = SledEventStore::open(&path).unwrap();
            let fetched = store.get(&event.event_id).await.unwrap().unwrap();
            assert_eq!(fetched, event);
        }
    }

    #[tokio::test]
    async fn missing_event_returns_none() {
        let store = SledEventStore::temporary().unwrap();
        assert!(store.get(&uuid::Uuid::new_v4()).await.unwrap().is_none());
    }
}
