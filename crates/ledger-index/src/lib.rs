#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-index** – Secondary indexes maintained alongside the DAG, and
//! their atomic on-disk snapshot/restore.
//!
//! [`IndexSet`] is pure in-memory bookkeeping; it knows nothing about the
//! DAG or the log. [`IndexPersistence`] is the only thing that touches
//! disk, and only ever under the coordinator's writer lock.

use std::collections::HashMap;
use std::path::PathBuf;

use ledger_types::{EventId, GraphVertexId};
use serde::{Deserialize, Serialize};

//─────────────────────────────
//  IndexSet
//─────────────────────────────

/// All secondary mappings the ledger maintains coherently with the DAG and
/// the event store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSet {
    event_to_vertex: HashMap<EventId, GraphVertexId>,
    vertex_to_event: HashMap<GraphVertexId, EventId>,
    /// Mirror of the cause→effect direction: vertex -> its direct children
    /// (effects). Maintained in lockstep with the DAG's effect→cause edges.
    children: HashMap<GraphVertexId, Vec<GraphVertexId>>,
    service_to_events: HashMap<String, Vec<EventId>>,
    type_to_events: HashMap<String, Vec<EventId>>,
    trace_to_events: HashMap<String, Vec<EventId>>,
    /// Not persisted independently — recomputed from `trace_to_events` on
    /// load, since it is always the last element of that sequence.
    #[serde(skip)]
    trace_latest: HashMap<String, EventId>,
}

impl IndexSet {
    /// An empty index set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a brand-new event: bind its id to a freshly allocated
    /// vertex, link it as a child of every parent vertex, and append it to
    /// the per-service/per-type/per-trace sequences.
    pub fn record_event(
        &mut self,
        event_id: EventId,
        vertex_id: GraphVertexId,
        parent_vertex_ids: &[GraphVertexId],
        service_name: &str,
        event_type: &str,
        trace_id: &str,
    ) {
        self.event_to_vertex.insert(event_id, vertex_id);
        self.vertex_to_event.insert(vertex_id, event_id);
        for &parent in parent_vertex_ids {
            let children = self.children.entry(parent).or_default();
            if !children.contains(&vertex_id) {
                children.push(vertex_id);
            }
        }
        self.service_to_events
            .entry(service_name.to_string())
            .or_default()
            .push(event_id);
        self.type_to_events
            .entry(event_type.to_string())
            .or_default()
            .push(event_id);
        self.trace_to_events
            .entry(trace_id.to_string())
            .or_default()
            .push(event_id);
        self.trace_latest.insert(trace_id.to_string(), event_id);
    }

    /// Recompute `trace_latest` from `trace_to_events`. Call this after
    /// loading a snapshot or rebuilding from the log.
    pub fn rebuild_trace_latest(&mut self) {
        self.trace_latest.clear();
        for (trace, events) in &self.trace_to_events {
            if let Some(&last) = events.last() {
                self.trace_latest.insert(trace.clone(), last);
            }
        }
    }

    /// Graph vertex id bound to `event_id`.
    pub fn vertex_for_event(&self, event_id: &EventId) -> Option<GraphVertexId> {
        self.event_to_vertex.get(event_id).copied()
    }

    /// Event id bound to `vertex_id`.
    pub fn event_for_vertex(&self, vertex_id: GraphVertexId) -> Option<EventId> {
        self.vertex_to_event.get(&vertex_id).copied()
    }

    /// Direct children (effects) of `vertex_id` in cause→effect order.
    pub fn children_of(&self, vertex_id: GraphVertexId) -> &[GraphVertexId] {
        self.children.get(&vertex_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Events emitted by `service_name`, in ingestion order.
    pub fn events_by_service(&self, service_name: &str) -> &[EventId] {
        self.service_to_events.get(service_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Events of type `event_type`, in ingestion order.
    pub fn events_by_type(&self, event_type: &str) -> &[EventId] {
        self.type_to_events.get(event_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Events on `trace_id`, in ingestion order.
    pub fn events_by_trace(&self, trace_id: &str) -> &[EventId] {
        self.trace_to_events.get(trace_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The current head event of `trace_id`, used for auto-parenting.
    pub fn latest_on_trace(&self, trace_id: &str) -> Option<EventId> {
        self.trace_latest.get(trace_id).copied()
    }

    /// Highest vertex id referenced by any index entry, or `None` if empty.
    /// Used to resize the DAG on warm start.
    pub fn max_vertex_id(&self) -> Option<GraphVertexId> {
        self.vertex_to_event.keys().copied().max()
    }

    /// Record a causal edge discovered separately from vertex creation:
    /// `parent_vertex` gains `child_vertex` as a direct effect. Used by the
    /// cold-start rebuild's second pass, where vertices are already known
    /// from the first pass and only the mirror adjacency remains to be
    /// filled in.
    pub fn link_child(&mut self, parent_vertex: GraphVertexId, child_vertex: GraphVertexId) {
        let children = self.children.entry(parent_vertex).or_default();
        if !children.contains(&child_vertex) {
            children.push(child_vertex);
        }
    }
}

//─────────────────────────────
//  Persistence
//─────────────────────────────

/// Errors raised while snapshotting or restoring indexes.
#[derive(Debug, thiserror::Error)]
pub enum IndexPersistenceError {
    /// An index file could not be read or written.
    #[error("index file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// An index file's contents didn't parse as the expected mapping.
    #[error("index file corrupt: {0}")]
    Corrupt(String),
}

const ENTITY_FILE: &str = "entity_to_event_ids.idx";
const CHILDREN_FILE: &str = "children_adjacency.idx";
const EVENT_TO_GRAPH_FILE: &str = "event_to_graph_id.idx";
const GRAPH_TO_EVENT_FILE: &str = "graph_to_event_id.idx";
const EVENT_TYPE_FILE: &str = "event_type_to_event_ids.idx";
const TRACE_FILE: &str = "trace_id_to_event_ids.idx";

/// Snapshot/restore of [`IndexSet`] to independent files inside a data
/// directory, written atomically (write-to-temp, rename).
pub struct IndexPersistence {
    dir: PathBuf,
}

impl IndexPersistence {
    /// Point persistence at `dir`, which is created if absent.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn write_atomic<T: Serialize>(&self, file: &str, value: &T) -> Result<(), IndexPersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let final_path = self.path(file);
        let tmp_path = self.path(&format!("{file}.tmp"));
        let bytes = serde_json::to_vec(value)
            .map_err(|e| IndexPersistenceError::Corrupt(e.to_string()))?;
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    async fn read<T: for<'de> Deserialize<'de>>(&self, file: &str) -> Result<T, IndexPersistenceError> {
        let bytes = tokio::fs::read(self.path(file)).await?;
        serde_json::from_slice(&bytes).map_err(|e| IndexPersistenceError::Corrupt(e.to_string()))
    }

    /// Every index file this persistence manages, in a stable order.
    pub fn all_files(&self) -> [PathBuf; 6] {
        [
            self.path(ENTITY_FILE),
            self.path(CHILDREN_FILE),
            self.path(EVENT_TO_GRAPH_FILE),
            self.path(GRAPH_TO_EVENT_FILE),
            self.path(EVENT_TYPE_FILE),
            self.path(TRACE_FILE),
        ]
    }

    /// True iff every index file exists and parses successfully. Drives the
    /// warm-vs-cold startup decision in `ledger-core`.
    pub async fn all_present_and_valid(&self) -> bool {
        self.load().await.is_ok()
    }

    /// Write all six index files atomically.
    pub async fn save(&self, indexes: &IndexSet) -> Result<(), IndexPersistenceError> {
        self.write_atomic(ENTITY_FILE, &indexes.service_to_events).await?;
        self.write_atomic(CHILDREN_FILE, &indexes.children).await?;
        self.write_atomic(EVENT_TO_GRAPH_FILE, &indexes.event_to_vertex).await?;
        self.write_atomic(GRAPH_TO_EVENT_FILE, &indexes.vertex_to_event).await?;
        self.write_atomic(EVENT_TYPE_FILE, &indexes.type_to_events).await?;
        self.write_atomic(TRACE_FILE, &indexes.trace_to_events).await?;
        Ok(())
    }

    /// Load all six index files into a fresh [`IndexSet`], recomputing
    /// `trace_latest`. Fails (and leaves nothing partially applied to the
    /// caller) if any file is missing or corrupt.
    pub async fn load(&self) -> Result<IndexSet, IndexPersistenceError> {
        let service_to_events = self.read(ENTITY_FILE).await?;
        let children = self.read(CHILDREN_FILE).await?;
        let event_to_vertex = self.read(EVENT_TO_GRAPH_FILE).await?;
        let vertex_to_event = self.read(GRAPH_TO_EVENT_FILE).await?;
        let type_to_events = self.read(EVENT_TYPE_FILE).await?;
        let trace_to_events = self.read(TRACE_FILE).await?;

        let mut indexes = IndexSet {
            event_to_vertex,
            vertex_to_event,
            children,
            service_to_events,
            type_to_events,
            trace_to_events,
            trace_latest: HashMap::new(),
        };
        indexes.rebuild_trace_latest();
        Ok(indexes)
    }
}
