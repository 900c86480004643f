#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-vclock** – Vector clocks and the per-node clock manager.
//!
//! A [`VectorClock`] is a mapping from node id to a monotonically
//! increasing counter. Missing nodes are implicitly zero. [`VectorClockManager`]
//! owns the local clock plus a table of last-seen clocks per known peer and
//! is the only component allowed to stamp new [`EventRecord`]s with a clock.

use std::collections::HashMap;

use ledger_types::{CausalityRelation, ClockMap, EventRecord};
use serde::{Deserialize, Serialize};

//─────────────────────────────
//  VectorClock
//─────────────────────────────

/// A per-node monotonic counter map with implicit-zero semantics for absent
/// nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorClock {
    counters: ClockMap,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a clock from an existing counter map (e.g. loaded from a
    /// committed event).
    pub fn from_map(counters: ClockMap) -> Self {
        Self { counters }
    }

    /// Borrow the underlying counter map.
    pub fn as_map(&self) -> &ClockMap {
        &self.counters
    }

    /// Consume and return the underlying counter map.
    pub fn into_map(self) -> ClockMap {
        self.counters
    }

    /// Current counter value for `node`, or zero if never observed.
    pub fn get(&self, node: &str) -> u64 {
        self.counters.get(node).copied().unwrap_or(0)
    }

    /// Atomically increment `node`'s counter (creating it at 1 if absent)
    /// and return the new value.
    pub fn tick(&mut self, node: &str) -> u64 {
        let entry = self.counters.entry(node.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// For every node present in either clock, set `self[node] = max(self[node], other[node])`.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, &value) in &other.counters {
            let entry = self.counters.entry(node.clone()).or_insert(0);
            if value > *entry {
                *entry = value;
            }
        }
    }

    /// `merge` followed by `tick(local_node)`.
    pub fn merge_and_tick(&mut self, other: &VectorClock, local_node: &str) -> u64 {
        self.merge(other);
        self.tick(local_node)
    }

    /// True iff `self[n] <= other[n]` for every node appearing in either
    /// clock, and strictly less for at least one node.
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        let mut strictly_less = false;
        for node in self.node_union(other) {
            let a = self.get(&node);
            let b = other.get(&node);
            if a > b {
                return false;
            }
            if a < b {
                strictly_less = true;
            }
        }
        strictly_less
    }

    /// True iff neither `self.happens_before(other)` nor
    /// `other.happens_before(self)` holds.
    pub fn concurrent_with(&self, other: &VectorClock) -> bool {
        !self.happens_before(other) && !other.happens_before(self)
    }

    fn node_union(&self, other: &VectorClock) -> std::collections::HashSet<String> {
        self.counters
            .keys()
            .chain(other.counters.keys())
            .cloned()
            .collect()
    }
}

impl Eq for VectorClock {}

//─────────────────────────────
//  VectorClockManager
//─────────────────────────────

/// Owns the local node's clock and the last-known clock of every peer this
/// node has observed (including itself). The only way to produce a stamped
/// [`ClockMap`] for a new event.
#[derive(Debug)]
pub struct VectorClockManager {
    local_node_id: String,
    local_clock: VectorClock,
    last_known_clocks: HashMap<String, VectorClock>,
}

impl VectorClockManager {
    /// Create a manager for `local_node_id` with an empty local clock.
    pub fn new(local_node_id: impl Into<String>) -> Self {
        let local_node_id = local_node_id.into();
        let mut last_known_clocks = HashMap::new();
        last_known_clocks.insert(local_node_id.clone(), VectorClock::new());
        Self {
            local_node_id,
            local_clock: VectorClock::new(),
            last_known_clocks,
        }
    }

    /// This node's id.
    pub fn local_node_id(&self) -> &str {
        &self.local_node_id
    }

    /// A snapshot of the local clock.
    pub fn local_clock(&self) -> VectorClock {
        self.local_clock.clone()
    }

    /// Stamp a new clock for an event with the given causal parents.
    ///
    /// 1. Copy the local clock.
    /// 2. Merge in every parent's clock.
    /// 3. Tick the local node on the copy.
    /// 4. Merge the copy back into the local clock, updating the self-entry
    ///    in the peer table.
    ///
    /// Returns the clock to stamp onto the new event.
    pub fn stamp_new_event<'a>(
        &mut self,
        parents: impl IntoIterator<Item = &'a EventRecord>,
    ) -> ClockMap {
        let mut proposed = self.local_clock.clone();
        for parent in parents {
            proposed.merge(&VectorClock::from_map(parent.vector_clock.clone()));
        }
        proposed.tick(&self.local_node_id);

        self.local_clock.merge(&proposed);
        self.last_known_clocks
            .insert(self.local_node_id.clone(), self.local_clock.clone());

        proposed.into_map()
    }

    /// Accept an event received from a remote peer: merge-and-tick the
    /// local clock against the remote clock and remember the remote node's
    /// last-seen clock.
    pub fn receive_event(&mut self, remote_node_id: &str, remote_clock: &ClockMap) {
        let remote = VectorClock::from_map(remote_clock.clone());
        self.local_clock.merge_and_tick(&remote, &self.local_node_id);
        self.last_known_clocks
            .insert(remote_node_id.to_string(), remote);
        self.last_known_clocks
            .insert(self.local_node_id.clone(), self.local_clock.clone());
    }

    /// Rebuild a manager directly from a restored clock map, skipping the
    /// stamping protocol. Used on startup to fold the local clock back to
    /// its pre-shutdown value after replaying the event log.
    pub fn restore(local_node_id: impl Into<String>, clock: ClockMap) -> Self {
        let local_node_id = local_node_id.into();
        let local_clock = VectorClock::from_map(clock);
        let mut last_known_clocks = HashMap::new();
        last_known_clocks.insert(local_node_id.clone(), local_clock.clone());
        Self {
            local_node_id,
            local_clock,
            last_known_clocks,
        }
    }

    /// Last-known clock for a given node, if any has been observed.
    pub fn last_known_clock(&self, node_id: &str) -> Option<&VectorClock> {
        self.last_known_clocks.get(node_id)
    }

    /// Compare two committed events' vector clocks, from the first event's
    /// perspective.
    pub fn compare(a: &ClockMap, b: &ClockMap) -> CausalityRelation {
        if a == b {
            return CausalityRelation::Identical;
        }
        let ca = VectorClock::from_map(a.clone());
        let cb = VectorClock::from_map(b.clone());
        if ca.happens_before(&cb) {
            CausalityRelation::Causes
        } else if cb.happens_before(&ca) {
            CausalityRelation::CausedBy
        } else {
            CausalityRelation::Concurrent
        }
    }
}
