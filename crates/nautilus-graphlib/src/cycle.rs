//! Cycles in canonical form and a minimum cycle basis (SSSR) provider.

use crate::Graph;

/// An ordered sequence of vertices and edges forming one graph cycle.
/// `edges[k]` joins `vertices[k]` and `vertices[(k + 1) % len]`. Owns no
/// graph state; only indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub vertices: Vec<usize>,
    pub edges: Vec<usize>,
}

impl Cycle {
    /// Builds a cycle from an ordered vertex walk, resolving the joining
    /// edges, and canonizes it. Returns `None` if some consecutive pair is
    /// not adjacent.
    pub fn from_vertices(graph: &Graph, vertices: Vec<usize>) -> Option<Self> {
        let n = vertices.len();
        let mut edges = Vec::with_capacity(n);
        for k in 0..n {
            edges.push(graph.edge_between(vertices[k], vertices[(k + 1) % n])?);
        }
        let mut cycle = Self { vertices, edges };
        cycle.canonize();
        Some(cycle)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Canonical form: start at the minimum vertex id, direction chosen so
    /// the id after the start is smaller than the id before it.
    pub fn canonize(&mut self) {
        let n = self.vertices.len();
        if n == 0 {
            return;
        }
        let start = (0..n)
            .min_by_key(|&i| self.vertices[i])
            .unwrap_or(0);
        self.vertices.rotate_left(start);
        self.edges.rotate_left(start);
        if self.vertices[n - 1] < self.vertices[1 % n] {
            self.vertices[1..].reverse();
            self.edges.reverse();
        }
    }

    /// Sum of per-vertex codes, the ranking key for ring ordering.
    pub fn code_sum(&self, codes: &[i64]) -> i64 {
        self.vertices.iter().map(|&v| codes[v]).sum()
    }

    pub fn contains_vertex(&self, vertex: usize) -> bool {
        self.vertices.contains(&vertex)
    }
}

/// Minimum cycle basis (SSSR): candidate cycles from per-root BFS shortest
/// paths, greedily reduced to an independent set over GF(2) edge vectors.
/// Returns `edge_count - vertex_count + components` cycles.
pub fn minimum_cycle_basis(graph: &Graph) -> Vec<Cycle> {
    let needed = graph.edge_count() + graph.components().len() - graph.vertex_count();
    if needed == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<Vec<usize>> = Vec::new();
    for root in graph.vertices() {
        let (parent, dist) = bfs_tree(graph, root);
        for e in graph.edges() {
            let (u, v) = graph.edge_endpoints(e);
            if dist[u] == usize::MAX || dist[v] == usize::MAX {
                continue;
            }
            if parent[u] == Some(e) || parent[v] == Some(e) {
                continue;
            }
            if let Some(walk) = join_paths(graph, root, u, v, &parent) {
                candidates.push(walk);
            }
        }
    }

    candidates.sort_by_key(|c| c.len());
    candidates.dedup();

    let mut basis: Vec<Vec<u64>> = Vec::new();
    let words = graph.edge_count().div_ceil(64);
    let mut out = Vec::new();
    for walk in candidates {
        let Some(cycle) = Cycle::from_vertices(graph, walk) else {
            continue;
        };
        let mut vector = vec![0u64; words];
        for &e in &cycle.edges {
            vector[e / 64] ^= 1 << (e % 64);
        }
        // Gaussian reduction against the accepted basis.
        for row in &basis {
            let pivot = match leading_bit(row) {
                Some(p) => p,
                None => continue,
            };
            if vector[pivot / 64] & (1 << (pivot % 64)) != 0 {
                for (a, b) in vector.iter_mut().zip(row.iter()) {
                    *a ^= b;
                }
            }
        }
        if vector.iter().any(|&w| w != 0) {
            basis.push(vector);
            out.push(cycle);
            if out.len() == needed {
                break;
            }
        }
    }
    out
}

fn leading_bit(row: &[u64]) -> Option<usize> {
    for (i, &w) in row.iter().enumerate() {
        if w != 0 {
            return Some(i * 64 + w.trailing_zeros() as usize);
        }
    }
    None
}

fn bfs_tree(graph: &Graph, root: usize) -> (Vec<Option<usize>>, Vec<usize>) {
    let n = graph.vertex_count();
    let mut parent = vec![None; n];
    let mut dist = vec![usize::MAX; n];
    dist[root] = 0;
    let mut queue = std::collections::VecDeque::from([root]);
    while let Some(v) = queue.pop_front() {
        for &(w, e) in graph.neighbors(v) {
            if dist[w] == usize::MAX {
                dist[w] = dist[v] + 1;
                parent[w] = Some(e);
                queue.push_back(w);
            }
        }
    }
    (parent, dist)
}

/// Joins root→u and root→v tree paths with edge (u, v) into a simple cycle
/// walk, or `None` when the two paths share a vertex other than the root.
fn join_paths(
    graph: &Graph,
    root: usize,
    u: usize,
    v: usize,
    parent: &[Option<usize>],
) -> Option<Vec<usize>> {
    let up = tree_path(graph, root, u, parent);
    let down = tree_path(graph, root, v, parent);
    for x in up.iter().skip(1) {
        if down[1..].contains(x) {
            return None;
        }
    }
    let mut walk = up;
    walk.extend(down[1..].iter().rev());
    Some(walk)
}

fn tree_path(graph: &Graph, root: usize, target: usize, parent: &[Option<usize>]) -> Vec<usize> {
    let mut path = vec![target];
    let mut v = target;
    while v != root {
        let e = parent[v].expect("vertex reached by BFS has a parent edge");
        v = graph.other_end(e, v);
        path.push(v);
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize) -> Graph {
        let mut g = Graph::new();
        g.add_vertices(n);
        for i in 0..n {
            g.add_edge(i, (i + 1) % n);
        }
        g
    }

    #[test]
    fn canonical_form_fixes_start_and_direction() {
        let g = ring(5);
        let a = Cycle::from_vertices(&g, vec![2, 3, 4, 0, 1]).expect("cycle");
        let b = Cycle::from_vertices(&g, vec![3, 2, 1, 0, 4]).expect("cycle");
        assert_eq!(a, b);
        assert_eq!(a.vertices[0], 0);
        assert!(a.vertices[1] < *a.vertices.last().expect("nonempty"));
    }

    #[test]
    fn single_ring_has_a_one_cycle_basis() {
        let g = ring(6);
        let basis = minimum_cycle_basis(&g);
        assert_eq!(basis.len(), 1);
        assert_eq!(basis[0].len(), 6);
    }

    #[test]
    fn naphthalene_skeleton_yields_two_hexagons() {
        // Two fused 6-rings sharing edge (0, 5): 10 vertices, 11 edges.
        let mut g = Graph::new();
        g.add_vertices(10);
        for i in 0..5 {
            g.add_edge(i, i + 1);
        }
        g.add_edge(5, 0);
        g.add_edge(5, 6);
        g.add_edge(6, 7);
        g.add_edge(7, 8);
        g.add_edge(8, 9);
        g.add_edge(9, 0);
        let basis = minimum_cycle_basis(&g);
        assert_eq!(basis.len(), 2);
        assert!(basis.iter().all(|c| c.len() == 6));
    }

    #[test]
    fn tree_has_no_cycles() {
        let mut g = Graph::new();
        g.add_vertices(4);
        g.add_edge(0, 1);
        g.add_edge(0, 2);
        g.add_edge(0, 3);
        assert!(minimum_cycle_basis(&g).is_empty());
    }
}
