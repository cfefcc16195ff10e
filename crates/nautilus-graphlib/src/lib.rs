//! Undirected graph container with dense `usize` vertex/edge ids, plus the
//! graph algorithms `nautilus` builds on: induced subgraphs, biconnected
//! decomposition, Morgan vertex ranking and a minimum cycle basis.

use rustc_hash::FxBuildHasher;

pub mod biconnected;
pub mod cycle;
pub mod morgan;
pub mod subgraph;

pub use biconnected::BiconnectedDecomposition;
pub use cycle::{Cycle, minimum_cycle_basis};
pub use morgan::morgan_codes;
pub use subgraph::InducedSubgraph;

type HashMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

/// An undirected graph. Vertices and edges get dense, append-only ids.
///
/// Adjacency is stored per vertex as `(neighbor, edge)` pairs in insertion
/// order, which keeps every traversal in the crate deterministic.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    adjacency: Vec<Vec<(usize, usize)>>,
    endpoints: Vec<(usize, usize)>,
    edge_index: HashMap<(usize, usize), usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertices: usize, edges: usize) -> Self {
        Self {
            adjacency: Vec::with_capacity(vertices),
            endpoints: Vec::with_capacity(edges),
            edge_index: HashMap::with_capacity_and_hasher(edges, FxBuildHasher),
        }
    }

    pub fn add_vertex(&mut self) -> usize {
        self.adjacency.push(Vec::new());
        self.adjacency.len() - 1
    }

    pub fn add_vertices(&mut self, count: usize) {
        self.adjacency.resize_with(self.adjacency.len() + count, Vec::new);
    }

    /// Appends an edge between two existing vertices and returns its id.
    /// Parallel edges and self-loops are rejected by returning the existing
    /// id / `usize::MAX`; molecular graphs never contain either.
    pub fn add_edge(&mut self, a: usize, b: usize) -> usize {
        if a == b {
            return usize::MAX;
        }
        let key = Self::edge_key(a, b);
        if let Some(&existing) = self.edge_index.get(&key) {
            return existing;
        }
        let id = self.endpoints.len();
        self.endpoints.push((a, b));
        self.adjacency[a].push((b, id));
        self.adjacency[b].push((a, id));
        self.edge_index.insert(key, id);
        id
    }

    fn edge_key(a: usize, b: usize) -> (usize, usize) {
        if a < b { (a, b) } else { (b, a) }
    }

    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn edge_endpoints(&self, edge: usize) -> (usize, usize) {
        self.endpoints[edge]
    }

    /// The endpoint of `edge` that is not `vertex`.
    pub fn other_end(&self, edge: usize, vertex: usize) -> usize {
        let (a, b) = self.endpoints[edge];
        if a == vertex { b } else { a }
    }

    pub fn edge_between(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_index.get(&Self::edge_key(a, b)).copied()
    }

    /// `(neighbor, edge)` pairs in insertion order.
    pub fn neighbors(&self, vertex: usize) -> &[(usize, usize)] {
        &self.adjacency[vertex]
    }

    pub fn degree(&self, vertex: usize) -> usize {
        self.adjacency[vertex].len()
    }

    pub fn vertices(&self) -> std::ops::Range<usize> {
        0..self.adjacency.len()
    }

    pub fn edges(&self) -> std::ops::Range<usize> {
        0..self.endpoints.len()
    }

    /// Connected components as vertex lists, in first-seen order.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.vertex_count()];
        let mut out = Vec::new();
        for start in self.vertices() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut comp = vec![start];
            let mut head = 0;
            while head < comp.len() {
                let v = comp[head];
                head += 1;
                for &(w, _) in self.neighbors(v) {
                    if !seen[w] {
                        seen[w] = true;
                        comp.push(w);
                    }
                }
            }
            out.push(comp);
        }
        out
    }

    pub fn is_connected(&self) -> bool {
        self.vertex_count() == 0 || self.components().len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> Graph {
        let mut g = Graph::new();
        g.add_vertices(n);
        for i in 1..n {
            g.add_edge(i - 1, i);
        }
        g
    }

    #[test]
    fn dense_ids_are_appended_in_order() {
        let mut g = Graph::new();
        assert_eq!(g.add_vertex(), 0);
        assert_eq!(g.add_vertex(), 1);
        assert_eq!(g.add_edge(0, 1), 0);
        assert_eq!(g.edge_between(1, 0), Some(0));
    }

    #[test]
    fn duplicate_edge_returns_existing_id() {
        let mut g = path(3);
        assert_eq!(g.add_edge(1, 0), 0);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn components_split_on_missing_edge() {
        let mut g = path(3);
        g.add_vertices(2);
        g.add_edge(3, 4);
        let comps = g.components();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0], vec![0, 1, 2]);
        assert_eq!(comps[1], vec![3, 4]);
        assert!(!g.is_connected());
    }
}
