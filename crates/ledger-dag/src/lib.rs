#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ledger-dag** – Integer-vertex adjacency store for the causal event
//! ledger.
//!
//! Edges encode the *effect → cause* direction: vertex `v`'s out-neighbors
//! are the vertices `v` causally depends on. A vertex is a plain `usize` in
//! `[0, num_vertices)`; capacity doubles on demand as vertices are added.
//!
//! The cycle check used during ingestion ([`Dag::has_cycle_with_proposed_additions`])
//! never allocates a second graph — it overlays a map of not-yet-committed
//! edges on top of the real adjacency for a single DFS pass.

use std::collections::{HashMap, HashSet};

use ledger_types::GraphVertexId;

const INITIAL_CAPACITY: usize = 16;

/// Errors raised by DAG operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DagError {
    /// An operation referenced a vertex id that doesn't exist.
    #[error("vertex {0} does not exist")]
    UnknownVertex(GraphVertexId),
    /// [`Dag::topological_sort`] was called on a graph containing a cycle.
    #[error("graph contains a cycle; no topological order exists")]
    CyclePresent,
}

/// An integer-vertex DAG with grow-on-demand adjacency storage.
#[derive(Debug, Clone)]
pub struct Dag {
    adjacency: Vec<Vec<GraphVertexId>>,
    capacity: usize,
    num_vertices: usize,
    total_edges: usize,
}

impl Dag {
    /// Create an empty DAG with the given initial capacity (rounded up to
    /// at least 1).
    pub fn with_capacity(initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(1);
        Self {
            adjacency: Vec::with_capacity(capacity),
            capacity,
            num_vertices: 0,
            total_edges: 0,
        }
    }

    /// Number of vertices currently allocated.
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Total number of edges added (duplicate edges are not double-counted).
    pub fn total_edges(&self) -> usize {
        self.total_edges
    }

    fn grow_if_needed(&mut self) {
        if self.num_vertices > self.capacity {
            self.capacity = (self.capacity * 2).max(self.num_vertices);
        }
        while self.adjacency.len() < self.num_vertices {
            self.adjacency.push(Vec::new());
        }
    }

    /// Allocate and return the next vertex id, growing capacity if needed.
    pub fn add_vertex(&mut self) -> GraphVertexId {
        let id = self.num_vertices;
        self.num_vertices += 1;
        self.grow_if_needed();
        id
    }

    /// Add an effect→cause edge. Idempotent: re-adding an existing edge is a
    /// no-op and does not increment [`Dag::total_edges`].
    pub fn add_edge(&mut self, effect: GraphVertexId, cause: GraphVertexId) -> Result<(), DagError> {
        self.check_vertex(effect)?;
        self.check_vertex(cause)?;
        let neighbors = &mut self.adjacency[effect];
        if !neighbors.contains(&cause) {
            neighbors.push(cause);
            self.total_edges += 1;
        }
        Ok(())
    }

    fn check_vertex(&self, v: GraphVertexId) -> Result<(), DagError> {
        if v >= self.num_vertices {
            Err(DagError::UnknownVertex(v))
        } else {
            Ok(())
        }
    }

    /// Out-neighbors of `v` in the effect→cause direction, insertion order.
    pub fn neighbors(&self, v: GraphVertexId) -> &[GraphVertexId] {
        self.adjacency.get(v).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Standard DFS with a visited/on-stack pair of marks; returns `true` on
    /// any back-edge. Used as a steady-state guard — the graph is expected
    /// to be acyclic.
    pub fn has_cycle(&self) -> bool {
        let mut visited = vec![false; self.num_vertices];
        let mut on_stack = vec![false; self.num_vertices];
        for start in 0..self.num_vertices {
            if !visited[start] && self.dfs_has_cycle(start, &mut visited, &mut on_stack) {
                return true;
            }
        }
        false
    }

    fn dfs_has_cycle(&self, v: GraphVertexId, visited: &mut [bool], on_stack: &mut [bool]) -> bool {
        visited[v] = true;
        on_stack[v] = true;
        for &next in &self.adjacency[v] {
            if on_stack[next] {
                return true;
            }
            if !visited[next] && self.dfs_has_cycle(next, visited, on_stack) {
                return true;
            }
        }
        on_stack[v] = false;
        false
    }

    /// Would adding `proposed_edges` (a map from origin vertex — typically
    /// one that does not exist yet — to its proposed out-neighbors) create a
    /// cycle, considering both the real adjacency and this overlay?
    ///
    /// `proposed_vertex_id` is the id the new vertex will get once it is
    /// actually committed; it is only used to size the scratch arrays when
    /// it exceeds the current vertex count. This never allocates a second
    /// DAG — the overlay is consulted inline during the same DFS that walks
    /// real edges.
    pub fn has_cycle_with_proposed_additions(
        &self,
        proposed_vertex_id: GraphVertexId,
        proposed_edges: &HashMap<GraphVertexId, Vec<GraphVertexId>>,
    ) -> bool {
        let max_origin = proposed_edges.keys().copied().max().unwrap_or(0);
        let max_dest = proposed_edges
            .values()
            .flatten()
            .copied()
            .max()
            .unwrap_or(0);
        let size = [self.num_vertices, proposed_vertex_id + 1, max_origin + 1, max_dest + 1]
            .into_iter()
            .max()
            .unwrap_or(0);

        let mut visited = vec![false; size];
        let mut on_stack = vec![false; size];
        for start in 0..size {
            if !visited[start]
                && self.dfs_has_cycle_overlay(start, proposed_edges, &mut visited, &mut on_stack)
            {
                return true;
            }
        }
        false
    }

    fn dfs_has_cycle_overlay(
        &self,
        v: GraphVertexId,
        overlay: &HashMap<GraphVertexId, Vec<GraphVertexId>>,
        visited: &mut [bool],
        on_stack: &mut [bool],
    ) -> bool {
        visited[v] = true;
        on_stack[v] = true;

        let real_neighbors = self.adjacency.get(v).map(Vec::as_slice).unwrap_or(&[]);
        let overlay_neighbors = overlay.get(&v).map(Vec::as_slice).unwrap_or(&[]);

        for &next in real_neighbors.iter().chain(overlay_neighbors.iter()) {
            if next >= visited.len() {
                continue;
            }
            if on_stack[next] {
                return true;
            }
            if !visited[next] && self.dfs_has_cycle_overlay(next, overlay, visited, on_stack) {
                return true;
            }
        }

        on_stack[v] = false;
        false
    }

    /// DFS postorder. Edges run effect→cause, so a postorder walk already
    /// visits a vertex's causes before the vertex itself — cause-before-effect,
    /// as required of [`Self::topological_sort`]'s result. Fails with
    /// [`DagError::CyclePresent`] if the graph has a cycle.
    pub fn topological_sort(&self) -> Result<Vec<GraphVertexId>, DagError> {
        if self.has_cycle() {
            return Err(DagError::CyclePresent);
        }
        let mut visited = vec![false; self.num_vertices];
        let mut postorder = Vec::with_capacity(self.num_vertices);
        for start in 0..self.num_vertices {
            if !visited[start] {
                self.dfs_postorder(start, &mut visited, &mut postorder);
            }
        }
        Ok(postorder)
    }

    fn dfs_postorder(&self, v: GraphVertexId, visited: &mut [bool], postorder: &mut Vec<GraphVertexId>) {
        visited[v] = true;
        for &next in &self.adjacency[v] {
            if !visited[next] {
                self.dfs_postorder(next, visited, postorder);
            }
        }
        postorder.push(v);
    }

    /// Every vertex reachable via an effect→cause walk from `start`,
    /// including `start` itself. Returns an empty set if `start` doesn't
    /// exist.
    pub fn reachable_from(&self, start: GraphVertexId) -> HashSet<GraphVertexId> {
        let mut seen = HashSet::new();
        if start >= self.num_vertices {
            return seen;
        }
        let mut stack = vec![start];
        seen.insert(start);
        while let Some(v) = stack.pop() {
            for &next in &self.adjacency[v] {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_vertex_grows_capacity_past_initial() {
        let mut dag = Dag::with_capacity(2);
        for _ in 0..10 {
            dag.add_vertex();
        }
        assert_eq!(dag.num_vertices(), 10);
    }

    #[test]
    fn add_edge_is_idempotent() {
        let mut dag = Dag::with_capacity(4);
        let a = dag.add_vertex();
        let b = dag.add_vertex();
        dag.add_edge(a, b).unwrap();
        dag.add_edge(a, b).unwrap();
        assert_eq!(dag.total_edges(), 1);
        assert_eq!(dag.neighbors(a), &[b]);
    }

    #[test]
    fn linear_chain_has_no_cycle_and_correct_topo_order() {
        let mut dag = Dag::with_capacity(4);
        let a = dag.add_vertex();
        let b = dag.add_vertex();
        let c = dag.add_vertex();
        // effect -> cause: c's effect is b, b's effect is a (b depends on a, c depends on b)
        dag.add_edge(b, a).unwrap();
        dag.add_edge(c, b).unwrap();
        assert!(!dag.has_cycle());
        let order = dag.topological_sort().unwrap();
        let pos = |v: GraphVertexId| order.iter().position(|&x| x == v).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn overlay_detects_cycle_through_not_yet_committed_vertex() {
        let mut dag = Dag::with_capacity(4);
        let a = dag.add_vertex();
        let b = dag.add_vertex();
        dag.add_edge(b, a).unwrap(); // b depends on a

        // Propose a new vertex t=2 whose parent is b, but also (hypothetically)
        // add an edge a -> t, which would close a cycle a -> t -> b -> a.
        let t = dag.num_vertices();
        let mut overlay = HashMap::new();
        overlay.insert(t, vec![b]);
        overlay.insert(a, vec![t]);
        assert!(dag.has_cycle_with_proposed_additions(t, &overlay));
    }

    #[test]
    fn overlay_without_cycle_returns_false() {
        let mut dag = Dag::with_capacity(4);
        let a = dag.add_vertex();
        let b = dag.add_vertex();
        dag.add_edge(b, a).unwrap();

        let t = dag.num_vertices();
        let mut overlay = HashMap::new();
        overlay.insert(t, vec![a, b]);
        assert!(!dag.has_cycle_with_proposed_additions(t, &overlay));
    }

    #[test]
    fn reachable_from_includes_start_and_ancestry() {
        let mut dag = Dag::with_capacity(4);
        let a = dag.add_vertex();
        let b = dag.add_vertex();
        let c = dag.add_vertex();
        dag.add_edge(b, a).unwrap();
        dag.add_edge(c, b).unwrap();
        let reach = dag.reachable_from(c);
        assert_eq!(reach, HashSet::from([a, b, c]));
    }

    #[test]
    fn topological_sort_fails_on_real_cycle() {
        let mut dag = Dag::with_capacity(4);
        let a = dag.add_vertex();
        let b = dag.add_vertex();
        dag.add_edge(a, b).unwrap();
        dag.add_edge(b, a).unwrap();
        assert!(dag.has_cycle());
        assert_eq!(dag.topological_sort(), Err(DagError::CyclePresent));
    }
}
