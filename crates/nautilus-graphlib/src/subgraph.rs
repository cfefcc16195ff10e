//! Induced subgraphs: a renumbered copy of a vertex subset that remembers how
//! its local ids map back to the parent graph.

use crate::Graph;

/// A renumbered copy of the subgraph induced by a vertex filter.
///
/// `vertex_to_parent[local]` round-trips to the parent id used to build the
/// filter; edges are mapped injectively the same way.
#[derive(Debug, Clone)]
pub struct InducedSubgraph {
    pub graph: Graph,
    pub vertex_to_parent: Vec<usize>,
    pub edge_to_parent: Vec<usize>,
    parent_to_local: Vec<Option<usize>>,
}

impl InducedSubgraph {
    /// Builds the subgraph induced by the vertices with `filter[v] == true`.
    /// An edge survives iff both endpoints survive.
    pub fn new(parent: &Graph, filter: &[bool]) -> Self {
        let mut parent_to_local = vec![None; parent.vertex_count()];
        let mut graph = Graph::new();
        let mut vertex_to_parent = Vec::new();
        for v in parent.vertices() {
            if filter[v] {
                parent_to_local[v] = Some(graph.add_vertex());
                vertex_to_parent.push(v);
            }
        }
        let mut edge_to_parent = Vec::new();
        for e in parent.edges() {
            let (a, b) = parent.edge_endpoints(e);
            if let (Some(la), Some(lb)) = (parent_to_local[a], parent_to_local[b]) {
                graph.add_edge(la, lb);
                edge_to_parent.push(e);
            }
        }
        Self {
            graph,
            vertex_to_parent,
            edge_to_parent,
            parent_to_local,
        }
    }

    pub fn parent_vertex(&self, local: usize) -> usize {
        self.vertex_to_parent[local]
    }

    pub fn parent_edge(&self, local: usize) -> usize {
        self.edge_to_parent[local]
    }

    pub fn local_vertex(&self, parent: usize) -> Option<usize> {
        self.parent_to_local[parent]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn induced_subgraph_round_trips_vertex_ids() {
        let mut g = Graph::new();
        g.add_vertices(5);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        g.add_edge(3, 4);
        let sub = InducedSubgraph::new(&g, &[false, true, true, true, false]);
        assert_eq!(sub.graph.vertex_count(), 3);
        assert_eq!(sub.graph.edge_count(), 2);
        for local in sub.graph.vertices() {
            let parent = sub.parent_vertex(local);
            assert_eq!(sub.local_vertex(parent), Some(local));
        }
        assert_eq!(sub.parent_edge(0), 1);
        assert_eq!(sub.parent_edge(1), 2);
    }
}
