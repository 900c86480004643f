//! [`CausalLedger`] — the coordinating facade.
//!
//! A single `tokio::sync::RwLock` guards every piece of mutable state (the
//! DAG, the indexes, the clock manager, and the counters). Writers take an
//! exclusive lease for the whole of `ingest_event`; readers take a shared
//! lease for the whole of a query, including any event-store lookups that
//! query needs, so that multi-step answers (e.g. topological order plus a
//! state projection fold) are a consistent snapshot.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ledger_dag::Dag;
use ledger_index::{IndexPersistence, IndexSet};
use ledger_log::EventLog;
use ledger_projector::StateProjector;
use ledger_store_core::EventStore;
use ledger_store_memory::MemoryEventStore;
use ledger_store_sled::SledEventStore;
use ledger_types::{
    dedup_parents, CausalityRelation, EventDraft, EventId, EventRecord, GraphVertexId, PayloadMap,
};
use ledger_vclock::{VectorClock, VectorClockManager};
use smallvec::SmallVec;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{LedgerConfig, StorageBackend};
use crate::error::LedgerError;
use crate::stats::LedgerStats;

struct LedgerInner {
    dag: Dag,
    indexes: IndexSet,
    vcm: VectorClockManager,
    projector: StateProjector,
    events_ingested: u64,
    ingestions_attempted: u64,
    cycle_checks_performed: u64,
    cycles_prevented: u64,
}

/// Coordinating facade over the DAG, the secondary indexes, the vector-clock
/// manager, the event log, and the event store.
///
/// Owns every piece of mutable ledger state exclusively; the only way to
/// observe or change it is through this type's methods.
pub struct CausalLedger {
    inner: RwLock<LedgerInner>,
    log: EventLog,
    store: Arc<dyn EventStore>,
    index_persistence: IndexPersistence,
    config: LedgerConfig,
}

impl CausalLedger {
    /// Start a ledger from `config`, taking the warm or cold startup path
    /// depending on whether the persisted indexes are intact.
    #[tracing::instrument(skip(config), fields(data_dir = ?config.data_dir()))]
    pub async fn open(config: LedgerConfig) -> Result<Self, LedgerError> {
        let log = EventLog::open(&config.log_file_path, config.fsync_policy)
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        let store: Arc<dyn EventStore> = match config.storage_backend {
            StorageBackend::Memory => Arc::new(MemoryEventStore::new()),
            StorageBackend::Sled => {
                let store = SledEventStore::open(config.event_store_dir())
                    .map_err(|e| LedgerError::Persistence(e.to_string()))?;
                store
                    .probe_readable()
                    .map_err(|e| LedgerError::Persistence(e.to_string()))?;
                Arc::new(store)
            }
        };

        let index_persistence = IndexPersistence::new(config.index_dir());
        let log_events = log
            .replay()
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        // The store may be non-persistent (the Memory backend) or may simply
        // be missing an event whose write failed after a successful log
        // append; since the log is the source of truth, re-upserting every
        // replayed event keeps event bodies consistent with the log across
        // a restart regardless of backend.
        for event in &log_events {
            store
                .put(event)
                .await
                .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        }

        let (dag, indexes) = if index_persistence.all_present_and_valid().await {
            tracing::info!("index snapshot intact, taking warm startup path");
            Self::rebuild_warm(&index_persistence, &log_events).await?
        } else {
            tracing::info!("index snapshot missing or corrupt, taking cold startup path");
            Self::rebuild_cold(&log_events)
        };

        let mut restored_clock = VectorClock::new();
        for event in &log_events {
            restored_clock.merge(&VectorClock::from_map(event.vector_clock.clone()));
        }
        let vcm = VectorClockManager::restore(config.local_node_id.clone(), restored_clock.into_map());

        let inner = LedgerInner {
            dag,
            indexes,
            vcm,
            projector: StateProjector::with_default_catalogue(),
            events_ingested: log_events.len() as u64,
            ingestions_attempted: log_events.len() as u64,
            cycle_checks_performed: 0,
            cycles_prevented: 0,
        };

        Ok(Self {
            inner: RwLock::new(inner),
            log,
            store,
            index_persistence,
            config,
        })
    }

    async fn rebuild_warm(
        index_persistence: &IndexPersistence,
        log_events: &[EventRecord],
    ) -> Result<(Dag, IndexSet), LedgerError> {
        let indexes = index_persistence
            .load()
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        let num_vertices = indexes.max_vertex_id().map(|v| v + 1).unwrap_or(0);
        let mut dag = Dag::with_capacity(num_vertices.max(1));
        for _ in 0..num_vertices {
            dag.add_vertex();
        }

        for event in log_events {
            let Some(effect_vertex) = indexes.vertex_for_event(&event.event_id) else {
                continue;
            };
            for parent_id in &event.causal_parent_event_ids {
                if let Some(cause_vertex) = indexes.vertex_for_event(parent_id) {
                    dag.add_edge(effect_vertex, cause_vertex)
                        .map_err(|e| LedgerError::Persistence(e.to_string()))?;
                }
            }
        }

        Ok((dag, indexes))
    }

    fn rebuild_cold(log_events: &[EventRecord]) -> (Dag, IndexSet) {
        let mut dag = Dag::with_capacity(log_events.len().max(1));
        let mut indexes = IndexSet::new();

        for event in log_events {
            let vertex_id = dag.add_vertex();
            indexes.record_event(
                event.event_id,
                vertex_id,
                &[],
                &event.service_name,
                &event.event_type,
                &event.trace_id,
            );
        }

        for event in log_events {
            let Some(effect_vertex) = indexes.vertex_for_event(&event.event_id) else {
                continue;
            };
            for parent_id in &event.causal_parent_event_ids {
                if let Some(cause_vertex) = indexes.vertex_for_event(parent_id) {
                    // add_edge cannot fail here: both vertices were created above.
                    let _ = dag.add_edge(effect_vertex, cause_vertex);
                    indexes.link_child(cause_vertex, effect_vertex);
                }
            }
        }

        (dag, indexes)
    }

    /// Commit a new event. Resolves the parent set (explicit, or the
    /// per-trace auto-parenting rule when empty), validates it, runs the
    /// overlay cycle check, stamps a vector clock, and persists the record
    /// to the log and event store before updating in-memory state.
    #[tracing::instrument(skip(self, payload), fields(trace_id, event_type))]
    pub async fn ingest_event(
        &self,
        trace_id: impl Into<String>,
        service_name: impl Into<String>,
        service_version: impl Into<String>,
        hostname: impl Into<String>,
        event_type: impl Into<String>,
        payload: PayloadMap,
        explicit_parent_ids: Vec<EventId>,
    ) -> Result<EventId, LedgerError> {
        let draft = EventDraft {
            node_id: self.config.local_node_id.clone(),
            trace_id: trace_id.into(),
            service_name: service_name.into(),
            service_version: service_version.into(),
            hostname: hostname.into(),
            event_type: event_type.into(),
            payload,
            causal_parent_event_ids: SmallVec::new(),
        };
        let mut inner = self.inner.write().await;
        inner.ingestions_attempted += 1;

        draft
            .validate()
            .map_err(|e| LedgerError::InvalidArgument(e.to_string()))?;

        let resolved_parents: SmallVec<[EventId; 4]> = if !explicit_parent_ids.is_empty() {
            dedup_parents(explicit_parent_ids)
        } else {
            match inner.indexes.latest_on_trace(&draft.trace_id) {
                Some(latest) => SmallVec::from_slice(&[latest]),
                None => SmallVec::new(),
            }
        };

        let mut parent_vertex_ids = Vec::with_capacity(resolved_parents.len());
        for parent_id in &resolved_parents {
            match inner.indexes.vertex_for_event(parent_id) {
                Some(v) => parent_vertex_ids.push(v),
                None => return Err(LedgerError::UnknownParent(*parent_id)),
            }
        }

        let proposed_vertex_id = inner.dag.num_vertices();
        let mut overlay = HashMap::new();
        overlay.insert(proposed_vertex_id, parent_vertex_ids.clone());
        inner.cycle_checks_performed += 1;
        if inner
            .dag
            .has_cycle_with_proposed_additions(proposed_vertex_id, &overlay)
        {
            inner.cycles_prevented += 1;
            return Err(LedgerError::CausalLoop);
        }

        let mut parent_records = Vec::with_capacity(resolved_parents.len());
        for parent_id in &resolved_parents {
            match self
                .store
                .get(parent_id)
                .await
                .map_err(|e| LedgerError::Persistence(e.to_string()))?
            {
                Some(record) => parent_records.push(record),
                None => {
                    return Err(LedgerError::Persistence(format!(
                        "parent {parent_id} is known to the indexes but missing from the event store"
                    )))
                }
            }
        }

        let vertex_id = inner.dag.add_vertex();
        debug_assert_eq!(vertex_id, proposed_vertex_id);
        for &parent_vertex in &parent_vertex_ids {
            inner
                .dag
                .add_edge(vertex_id, parent_vertex)
                .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        }

        let clock = inner.vcm.stamp_new_event(parent_records.iter());

        let record = EventRecord {
            event_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            node_id: draft.node_id,
            trace_id: draft.trace_id,
            service_name: draft.service_name,
            service_version: draft.service_version,
            hostname: draft.hostname,
            event_type: draft.event_type,
            payload: draft.payload,
            causal_parent_event_ids: resolved_parents,
            vector_clock: clock,
        };

        self.log
            .append(&record)
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        self.store
            .put(&record)
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;

        inner.indexes.record_event(
            record.event_id,
            vertex_id,
            &parent_vertex_ids,
            &record.service_name,
            &record.event_type,
            &record.trace_id,
        );
        inner.events_ingested += 1;

        tracing::debug!(event_id = %record.event_id, vertex_id, "event committed");
        Ok(record.event_id)
    }

    /// Fetch the full record for `id`, or `None` if unknown.
    pub async fn get_event(&self, id: EventId) -> Result<Option<EventRecord>, LedgerError> {
        let inner = self.inner.read().await;
        if inner.indexes.vertex_for_event(&id).is_none() {
            return Ok(None);
        }
        drop(inner);
        self.store
            .get(&id)
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))
    }

    /// True iff `id` refers to a committed event.
    pub async fn contains_event(&self, id: EventId) -> bool {
        let inner = self.inner.read().await;
        inner.indexes.vertex_for_event(&id).is_some()
    }

    /// Every committed event on `trace_id`, in ingestion order.
    pub async fn get_events_by_trace_id(&self, trace_id: &str) -> Result<Vec<EventRecord>, LedgerError> {
        let ids = {
            let inner = self.inner.read().await;
            inner.indexes.events_by_trace(trace_id).to_vec()
        };
        self.fetch_all(&ids).await
    }

    /// Every committed event of `event_type`, in ingestion order.
    pub async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventRecord>, LedgerError> {
        let ids = {
            let inner = self.inner.read().await;
            inner.indexes.events_by_type(event_type).to_vec()
        };
        self.fetch_all(&ids).await
    }

    /// Every committed event from `service_name`, in ingestion order.
    pub async fn get_events_by_service(&self, service_name: &str) -> Result<Vec<EventRecord>, LedgerError> {
        let ids = {
            let inner = self.inner.read().await;
            inner.indexes.events_by_service(service_name).to_vec()
        };
        self.fetch_all(&ids).await
    }

    async fn fetch_all(&self, ids: &[EventId]) -> Result<Vec<EventRecord>, LedgerError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self
                .store
                .get(id)
                .await
                .map_err(|e| LedgerError::Persistence(e.to_string()))?
            {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// `id` plus every event reachable from it in the effect→cause
    /// direction. Empty if `id` is unknown.
    pub async fn get_event_and_ancestry(&self, id: EventId) -> Vec<EventId> {
        let inner = self.inner.read().await;
        self.ancestry_locked(&inner, id)
    }

    fn ancestry_locked(&self, inner: &LedgerInner, id: EventId) -> Vec<EventId> {
        let Some(vertex) = inner.indexes.vertex_for_event(&id) else {
            return Vec::new();
        };
        inner
            .dag
            .reachable_from(vertex)
            .into_iter()
            .filter_map(|v| inner.indexes.event_for_vertex(v))
            .collect()
    }

    /// `id` plus every event reachable from it in the cause→effect
    /// direction (the mirror adjacency). Empty if `id` is unknown.
    pub async fn get_event_and_descendants(&self, id: EventId) -> Vec<EventId> {
        let inner = self.inner.read().await;
        let Some(vertex) = inner.indexes.vertex_for_event(&id) else {
            return Vec::new();
        };
        self.descendants_locked(&inner, vertex)
    }

    fn descendants_locked(&self, inner: &LedgerInner, start: GraphVertexId) -> Vec<EventId> {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![start];
        seen.insert(start);
        while let Some(v) = stack.pop() {
            for &next in inner.indexes.children_of(v) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen.into_iter()
            .filter_map(|v| inner.indexes.event_for_vertex(v))
            .collect()
    }

    /// Every committed event id in cause-before-effect order.
    pub async fn get_topological_order(&self) -> Result<Vec<EventId>, LedgerError> {
        let inner = self.inner.read().await;
        let order = inner
            .dag
            .topological_sort()
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        Ok(order
            .into_iter()
            .filter_map(|v| inner.indexes.event_for_vertex(v))
            .collect())
    }

    /// Shortest path from `start` to `end` in the cause→effect direction,
    /// inclusive of both endpoints. Empty if either id is unknown or `end`
    /// is unreachable from `start`. `[start]` when `start == end`.
    pub async fn get_shortest_causal_path(&self, start: EventId, end: EventId) -> Vec<EventId> {
        let inner = self.inner.read().await;
        let (Some(start_v), Some(end_v)) = (
            inner.indexes.vertex_for_event(&start),
            inner.indexes.vertex_for_event(&end),
        ) else {
            return Vec::new();
        };
        if start_v == end_v {
            return vec![start];
        }

        let mut predecessor: HashMap<GraphVertexId, GraphVertexId> = HashMap::new();
        let mut visited = std::collections::HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        visited.insert(start_v);
        queue.push_back(start_v);

        let mut found = false;
        while let Some(v) = queue.pop_front() {
            if v == end_v {
                found = true;
                break;
            }
            for &next in inner.indexes.children_of(v) {
                if visited.insert(next) {
                    predecessor.insert(next, v);
                    queue.push_back(next);
                }
            }
        }
        if !found {
            return Vec::new();
        }

        let mut path_vertices = vec![end_v];
        let mut cur = end_v;
        while cur != start_v {
            match predecessor.get(&cur) {
                Some(&prev) => {
                    path_vertices.push(prev);
                    cur = prev;
                }
                None => return Vec::new(),
            }
        }
        path_vertices.reverse();
        path_vertices
            .into_iter()
            .filter_map(|v| inner.indexes.event_for_vertex(v))
            .collect()
    }

    /// Intersection of `ancestry(id1)` and `ancestry(id2)` (each including
    /// itself). Empty if either event is missing.
    pub async fn get_all_common_causal_ancestors(&self, id1: EventId, id2: EventId) -> BTreeSet<EventId> {
        let inner = self.inner.read().await;
        let a1: BTreeSet<EventId> = self.ancestry_locked(&inner, id1).into_iter().collect();
        if a1.is_empty() {
            return BTreeSet::new();
        }
        let a2: BTreeSet<EventId> = self.ancestry_locked(&inner, id2).into_iter().collect();
        a1.intersection(&a2).copied().collect()
    }

    /// The subset of [`Self::get_all_common_causal_ancestors`] containing
    /// exactly those ancestors that are not themselves an ancestor of any
    /// *other* common ancestor.
    pub async fn get_nearest_common_causal_ancestors(&self, id1: EventId, id2: EventId) -> BTreeSet<EventId> {
        let inner = self.inner.read().await;
        let a1: BTreeSet<EventId> = self.ancestry_locked(&inner, id1).into_iter().collect();
        let a2: BTreeSet<EventId> = self.ancestry_locked(&inner, id2).into_iter().collect();
        let common: BTreeSet<EventId> = a1.intersection(&a2).copied().collect();

        let ancestries: HashMap<EventId, BTreeSet<EventId>> = common
            .iter()
            .map(|&id| (id, self.ancestry_locked(&inner, id).into_iter().collect()))
            .collect();

        common
            .iter()
            .copied()
            .filter(|&candidate| {
                !common.iter().any(|&other| {
                    other != candidate
                        && ancestries
                            .get(&other)
                            .map(|anc| anc.contains(&candidate))
                            .unwrap_or(false)
                })
            })
            .collect()
    }

    /// Folded state of entity `service_name` over every committed event, in
    /// causal order.
    ///
    /// Holds one read lease across the topological sort, the event-body
    /// fetch, and the fold, so the result reflects a single consistent
    /// snapshot of the ledger.
    pub async fn get_current_state_for_entity(&self, service_name: &str) -> Result<PayloadMap, LedgerError> {
        let inner = self.inner.read().await;
        let order = inner
            .dag
            .topological_sort()
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        let ids: Vec<EventId> = order
            .into_iter()
            .filter_map(|v| inner.indexes.event_for_vertex(v))
            .collect();
        let events = self.fetch_all(&ids).await?;
        Ok(inner.projector.project_state(service_name, &events))
    }

    /// Like [`Self::get_current_state_for_entity`], but truncated after the
    /// first occurrence of `up_to_event_id` in topological order. Empty if
    /// that id never occurs.
    ///
    /// Holds one read lease across the whole computation, as above.
    pub async fn get_entity_state_up_to_event(
        &self,
        service_name: &str,
        up_to_event_id: EventId,
    ) -> Result<PayloadMap, LedgerError> {
        let inner = self.inner.read().await;
        let order = inner
            .dag
            .topological_sort()
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        let ids: Vec<EventId> = order
            .into_iter()
            .filter_map(|v| inner.indexes.event_for_vertex(v))
            .collect();
        let events = self.fetch_all(&ids).await?;
        Ok(inner
            .projector
            .project_state_up_to(service_name, &events, up_to_event_id))
    }

    /// Compare two committed events' vector clocks. `Undefined` when either
    /// id is unknown.
    pub async fn compare_causality(&self, id1: EventId, id2: EventId) -> Result<CausalityRelation, LedgerError> {
        if id1 == id2 {
            return Ok(CausalityRelation::Identical);
        }
        let (e1, e2) = (self.get_event(id1).await?, self.get_event(id2).await?);
        match (e1, e2) {
            (Some(e1), Some(e2)) => Ok(VectorClockManager::compare(&e1.vector_clock, &e2.vector_clock)),
            _ => Ok(CausalityRelation::Undefined),
        }
    }

    /// The graph vertex bound to `id`, if committed.
    pub async fn get_graph_id_for_event_id(&self, id: EventId) -> Option<GraphVertexId> {
        self.inner.read().await.indexes.vertex_for_event(&id)
    }

    /// The event bound to graph vertex `vertex_id`, if any.
    pub async fn get_event_id_for_graph_id(&self, vertex_id: GraphVertexId) -> Option<EventId> {
        self.inner.read().await.indexes.event_for_vertex(vertex_id)
    }

    /// Direct children (effects) of `vertex_id` in the mirror adjacency.
    pub async fn get_children_graph_ids(&self, vertex_id: GraphVertexId) -> Vec<GraphVertexId> {
        self.inner.read().await.indexes.children_of(vertex_id).to_vec()
    }

    /// A snapshot of the ledger's operational counters.
    pub async fn get_stats(&self) -> LedgerStats {
        let inner = self.inner.read().await;
        let num_vertices = inner.dag.num_vertices();
        let total_edges = inner.dag.total_edges();
        let dag_density = if num_vertices == 0 {
            0.0
        } else {
            total_edges as f64 / num_vertices as f64
        };
        LedgerStats {
            events_ingested: inner.events_ingested,
            ingestions_attempted: inner.ingestions_attempted,
            cycle_checks_performed: inner.cycle_checks_performed,
            cycles_prevented: inner.cycles_prevented,
            num_vertices,
            total_edges,
            dag_density,
            local_node_id: inner.vcm.local_node_id().to_string(),
            local_clock: inner.vcm.local_clock().into_map(),
        }
    }

    /// Flush indexes to disk atomically and fsync the event store. Should
    /// be called on graceful shutdown; if skipped, the next startup falls
    /// back to the cold path.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), LedgerError> {
        let inner = self.inner.read().await;
        self.index_persistence
            .save(&inner.indexes)
            .await
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        tracing::info!("index snapshot flushed");
        Ok(())
    }
}
