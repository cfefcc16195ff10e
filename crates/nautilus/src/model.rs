//! The decorated layout graph: a renumbered undirected graph whose vertices
//! and edges carry positions, cyclicity flags, Morgan codes and the
//! per-element drawn-state machine.

use nautilus_graphlib::{Graph, minimum_cycle_basis, morgan_codes};
use serde::{Deserialize, Serialize};

use crate::geom::{Vec2, Vec2Ext};
use crate::molecule::Molecule;

/// Per-element state. `NotDrawn` and `Ignore` are transient: neither may
/// remain when the engine returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawnState {
    NotDrawn,
    /// Drawn, strictly inside the component boundary.
    Internal,
    /// Drawn, on the component boundary.
    Boundary,
    /// Drawn, known to cross another edge.
    NonPlanar,
    /// Positioned but temporarily excluded from boundary tests.
    Ignore,
    Drawn,
}

impl DrawnState {
    /// Whether the element has a meaningful position.
    pub fn is_drawn(self) -> bool {
        !matches!(self, DrawnState::NotDrawn)
    }
}

#[derive(Debug, Clone)]
pub struct LayoutVertex {
    /// Local id in the graph this one was derived from.
    pub ext_idx: usize,
    /// Id in the original molecule.
    pub orig_idx: usize,
    pub pos: Vec2,
    pub state: DrawnState,
    pub is_cyclic: bool,
    pub morgan_code: i64,
}

#[derive(Debug, Clone)]
pub struct LayoutEdge {
    pub ext_idx: usize,
    pub orig_idx: usize,
    pub state: DrawnState,
    pub is_cyclic: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutGraph {
    graph: Graph,
    vertices: Vec<LayoutVertex>,
    edges: Vec<LayoutEdge>,
    fixed: Vec<bool>,
    outline: Option<Vec<Vec2>>,
}

impl LayoutGraph {
    /// Builds the root layout graph over the filtered atoms of a molecule.
    /// Local ids are dense; `ext_idx == orig_idx ==` the molecule atom id.
    pub fn from_molecule(molecule: &Molecule, filter: Option<&[bool]>) -> Self {
        let src = molecule.graph();
        let keep: Vec<bool> = match filter {
            Some(f) => f.to_vec(),
            None => vec![true; src.vertex_count()],
        };
        let sub = nautilus_graphlib::InducedSubgraph::new(src, &keep);
        let mut lg = Self {
            vertices: sub
                .graph
                .vertices()
                .map(|v| {
                    let m = sub.parent_vertex(v);
                    LayoutVertex {
                        ext_idx: m,
                        orig_idx: m,
                        pos: molecule.positions[m],
                        state: DrawnState::NotDrawn,
                        is_cyclic: false,
                        morgan_code: 0,
                    }
                })
                .collect(),
            edges: sub
                .graph
                .edges()
                .map(|e| LayoutEdge {
                    ext_idx: sub.parent_edge(e),
                    orig_idx: sub.parent_edge(e),
                    state: DrawnState::NotDrawn,
                    is_cyclic: false,
                })
                .collect(),
            fixed: sub
                .graph
                .vertices()
                .map(|v| molecule.is_fixed(sub.parent_vertex(v)))
                .collect(),
            graph: sub.graph,
            outline: None,
        };
        lg.refresh_codes_and_cycles();
        lg
    }

    /// Builds the subgraph induced by `filter`, carrying decorations along.
    /// The child's `ext_idx` is the local id in `self`; `orig_idx` still
    /// points at the molecule.
    pub fn induced(&self, filter: &[bool]) -> Self {
        let sub = nautilus_graphlib::InducedSubgraph::new(&self.graph, filter);
        let mut lg = Self {
            vertices: sub
                .graph
                .vertices()
                .map(|v| {
                    let p = sub.parent_vertex(v);
                    LayoutVertex {
                        ext_idx: p,
                        orig_idx: self.vertices[p].orig_idx,
                        pos: self.vertices[p].pos,
                        state: DrawnState::NotDrawn,
                        is_cyclic: false,
                        morgan_code: 0,
                    }
                })
                .collect(),
            edges: sub
                .graph
                .edges()
                .map(|e| {
                    let p = sub.parent_edge(e);
                    LayoutEdge {
                        ext_idx: p,
                        orig_idx: self.edges[p].orig_idx,
                        state: DrawnState::NotDrawn,
                        is_cyclic: false,
                    }
                })
                .collect(),
            fixed: sub
                .graph
                .vertices()
                .map(|v| self.fixed[sub.parent_vertex(v)])
                .collect(),
            graph: sub.graph,
            outline: None,
        };
        lg.refresh_codes_and_cycles();
        lg
    }

    /// Recomputes Morgan codes and marks vertices/edges lying on some ring
    /// of the minimum cycle basis.
    pub fn refresh_codes_and_cycles(&mut self) {
        let codes = morgan_codes(&self.graph);
        for (v, code) in codes.into_iter().enumerate() {
            self.vertices[v].morgan_code = code;
        }
        for v in &mut self.vertices {
            v.is_cyclic = false;
        }
        for e in &mut self.edges {
            e.is_cyclic = false;
        }
        for cycle in minimum_cycle_basis(&self.graph) {
            for &v in &cycle.vertices {
                self.vertices[v].is_cyclic = true;
            }
            for &e in &cycle.edges {
                self.edges[e].is_cyclic = true;
            }
        }
    }

    /// Copies positions and states back onto the parent this subgraph was
    /// induced from, through `ext_idx`.
    pub fn apply_to_parent(&self, parent: &mut LayoutGraph) {
        for v in &self.vertices {
            parent.vertices[v.ext_idx].pos = v.pos;
            parent.vertices[v.ext_idx].state = v.state;
        }
        for e in &self.edges {
            parent.edges[e.ext_idx].state = e.state;
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex(&self, v: usize) -> &LayoutVertex {
        &self.vertices[v]
    }

    pub fn edge(&self, e: usize) -> &LayoutEdge {
        &self.edges[e]
    }

    pub fn pos(&self, v: usize) -> Vec2 {
        self.vertices[v].pos
    }

    pub fn set_pos(&mut self, v: usize, pos: Vec2) {
        self.vertices[v].pos = pos;
    }

    pub fn vertex_state(&self, v: usize) -> DrawnState {
        self.vertices[v].state
    }

    pub fn edge_state(&self, e: usize) -> DrawnState {
        self.edges[e].state
    }

    pub fn set_vertex_state(&mut self, v: usize, state: DrawnState) {
        self.vertices[v].state = state;
    }

    pub fn set_edge_state(&mut self, e: usize, state: DrawnState) {
        self.edges[e].state = state;
    }

    pub fn is_fixed(&self, v: usize) -> bool {
        self.fixed[v]
    }

    pub fn set_fixed(&mut self, v: usize, fixed: bool) {
        self.fixed[v] = fixed;
    }

    pub fn morgan_code(&self, v: usize) -> i64 {
        self.vertices[v].morgan_code
    }

    pub fn code_sum(&self) -> i64 {
        self.vertices.iter().map(|v| v.morgan_code).sum()
    }

    pub fn outline(&self) -> Option<&[Vec2]> {
        self.outline.as_deref()
    }

    pub fn set_outline(&mut self, outline: Option<Vec<Vec2>>) {
        self.outline = outline;
    }

    /// Drawn vertices that still have an undrawn neighbor.
    pub fn frontier(&self) -> Vec<usize> {
        self.graph
            .vertices()
            .filter(|&v| {
                self.vertices[v].state.is_drawn()
                    && self.vertices[v].state != DrawnState::Ignore
                    && self
                        .graph
                        .neighbors(v)
                        .iter()
                        .any(|&(w, _)| !self.vertices[w].state.is_drawn())
            })
            .collect()
    }

    pub fn has_undrawn_vertices(&self) -> bool {
        self.vertices.iter().any(|v| !v.state.is_drawn())
    }

    /// Restores `Ignore` elements to `Boundary` at the end of a pass.
    pub fn restore_ignored(&mut self) {
        for v in &mut self.vertices {
            if v.state == DrawnState::Ignore {
                v.state = DrawnState::Boundary;
            }
        }
        for e in &mut self.edges {
            if e.state == DrawnState::Ignore {
                e.state = DrawnState::Boundary;
            }
        }
    }

    pub fn translate(&mut self, delta: Vec2) {
        for v in &mut self.vertices {
            v.pos += delta;
        }
        if let Some(outline) = &mut self.outline {
            for p in outline.iter_mut() {
                *p += delta;
            }
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.vertices {
            v.pos *= factor;
        }
        if let Some(outline) = &mut self.outline {
            for p in outline.iter_mut() {
                *p *= factor;
            }
        }
    }

    /// Rotates every position around `center`.
    pub fn rotate_around(&mut self, center: Vec2, angle: f64) {
        for v in &mut self.vertices {
            v.pos = center + (v.pos - center).rotated(angle);
        }
        self.outline = None;
    }

    /// Mirrors every position across the x axis.
    pub fn flip_y(&mut self) {
        for v in &mut self.vertices {
            v.pos.y = -v.pos.y;
        }
        self.outline = None;
    }

    /// Axis-aligned bounding box over drawn vertices.
    pub fn bounding_box(&self) -> Option<(Vec2, Vec2)> {
        let mut bounds: Option<(Vec2, Vec2)> = None;
        for v in &self.vertices {
            if !v.state.is_drawn() {
                continue;
            }
            let (min, max) = bounds.get_or_insert((v.pos, v.pos));
            min.x = min.x.min(v.pos.x);
            min.y = min.y.min(v.pos.y);
            max.x = max.x.max(v.pos.x);
            max.y = max.y.max(v.pos.y);
        }
        bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::BondOrder;

    fn chain_molecule(n: usize) -> Molecule {
        let mut m = Molecule::new();
        for _ in 0..n {
            m.add_atom();
        }
        for i in 1..n {
            m.add_bond(i - 1, i, BondOrder::Single);
        }
        m
    }

    #[test]
    fn subgraph_round_trips_external_indices() {
        let m = chain_molecule(5);
        let root = LayoutGraph::from_molecule(&m, None);
        let sub = root.induced(&[false, true, true, true, false]);
        for v in 0..sub.vertex_count() {
            assert_eq!(sub.vertex(v).orig_idx, sub.vertex(v).ext_idx);
        }
        assert_eq!(sub.vertex_count(), 3);
        assert_eq!(sub.edge_count(), 2);
    }

    #[test]
    fn ring_elements_are_marked_cyclic() {
        let mut m = Molecule::new();
        for _ in 0..4 {
            m.add_atom();
        }
        for i in 0..3 {
            m.add_bond(i, i + 1, BondOrder::Single);
        }
        m.add_bond(2, 0, BondOrder::Single);
        let lg = LayoutGraph::from_molecule(&m, None);
        assert!(lg.vertex(0).is_cyclic);
        assert!(lg.vertex(1).is_cyclic);
        assert!(lg.vertex(2).is_cyclic);
        assert!(!lg.vertex(3).is_cyclic);
    }

    #[test]
    fn apply_to_parent_copies_positions_and_states() {
        let m = chain_molecule(3);
        let mut root = LayoutGraph::from_molecule(&m, None);
        let mut sub = root.induced(&[true, true, false]);
        sub.set_pos(0, Vec2::new(1.0, 2.0));
        sub.set_vertex_state(0, DrawnState::Boundary);
        sub.apply_to_parent(&mut root);
        assert_eq!(root.pos(0), Vec2::new(1.0, 2.0));
        assert_eq!(root.vertex_state(0), DrawnState::Boundary);
    }
}
