//! Human-readable counters exposed by [`crate::CausalLedger::get_stats`].

use std::fmt;

use ledger_types::ClockMap;

/// Snapshot of the ledger's operational counters, taken under a read lease.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStats {
    /// Total events successfully committed.
    pub events_ingested: u64,
    /// Total ingestion attempts, including ones that failed validation or
    /// were rejected as a cycle.
    pub ingestions_attempted: u64,
    /// Total cycle checks performed during ingestion.
    pub cycle_checks_performed: u64,
    /// Ingestions rejected because they would have closed a cycle.
    pub cycles_prevented: u64,
    /// Current vertex count in the DAG.
    pub num_vertices: usize,
    /// Current edge count in the DAG.
    pub total_edges: usize,
    /// `total_edges / num_vertices`, or `0.0` when the graph is empty.
    pub dag_density: f64,
    /// This node's id.
    pub local_node_id: String,
    /// This node's current vector clock.
    pub local_clock: ClockMap,
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LedgerStats {{ events_ingested: {}, ingestions_attempted: {}, \
             cycle_checks_performed: {}, cycles_prevented: {}, num_vertices: {}, \
             total_edges: {}, dag_density: {:.4}, local_node_id: {:?} }}",
            self.events_ingested,
            self.ingestions_attempted,
            self.cycle_checks_performed,
            self.cycles_prevented,
            self.num_vertices,
            self.total_edges,
            self.dag_density,
            self.local_node_id,
        )
    }
}
