//! The per-component coordinate engine: nucleus selection, outward growth
//! over the block tree, and the branch refinement pass.

pub mod attach;
pub mod border;
pub mod rings;

use nautilus_graphlib::BiconnectedDecomposition;
use tracing::debug;

use crate::LayoutOptions;
use crate::error::{Error, Result};
use crate::geom::Vec2;
use crate::model::{DrawnState, LayoutGraph};
use crate::molecule::{Cancellation, Molecule};
use crate::rand::SeededRng;

/// Drives coordinate assignment for one connected component.
pub struct ComponentEngine<'a> {
    pub lg: LayoutGraph,
    molecule: &'a Molecule,
    options: &'a LayoutOptions,
    cancellation: Option<&'a dyn Cancellation>,
    rng: SeededRng,
}

impl<'a> ComponentEngine<'a> {
    pub fn new(
        lg: LayoutGraph,
        molecule: &'a Molecule,
        options: &'a LayoutOptions,
        cancellation: Option<&'a dyn Cancellation>,
        rng: SeededRng,
    ) -> Self {
        Self {
            lg,
            molecule,
            options,
            cancellation,
            rng,
        }
    }

    /// Assigns relative coordinates to every vertex of the component.
    pub fn run(&mut self) -> Result<()> {
        // Components drawn entirely by their nucleus block never reach the
        // growth loop, so the handle must be polled before seeding too.
        self.check_cancelled()?;
        if self.lg.vertex_count() == 0 {
            return Ok(());
        }
        if self.lg.vertex_count() == 1 {
            self.lg.set_pos(0, Vec2::zeros());
            self.lg.set_vertex_state(0, DrawnState::Boundary);
            return Ok(());
        }

        let decomposition = BiconnectedDecomposition::compute(self.lg.graph());
        if !self.bootstrap_fixed() {
            self.seed_nucleus(&decomposition)?;
        }
        self.grow(&decomposition)?;
        self.finish()
    }

    fn check_cancelled(&self) -> Result<()> {
        if let Some(c) = self.cancellation {
            if c.is_cancelled() {
                return Err(Error::Cancelled(c.message()));
            }
        }
        Ok(())
    }

    /// When more than half of the component is pinned, the largest connected
    /// pinned piece becomes the drawn seed; the stragglers lose their flag
    /// and get laid out normally.
    fn bootstrap_fixed(&mut self) -> bool {
        let n = self.lg.vertex_count();
        let fixed_count = (0..n).filter(|&v| self.lg.is_fixed(v)).count();
        if fixed_count * 2 <= n {
            for v in 0..n {
                self.lg.set_fixed(v, false);
            }
            return false;
        }

        let mut piece_of = vec![usize::MAX; n];
        let mut sizes = Vec::new();
        for v in 0..n {
            if !self.lg.is_fixed(v) || piece_of[v] != usize::MAX {
                continue;
            }
            let id = sizes.len();
            let mut size = 0;
            let mut stack = vec![v];
            piece_of[v] = id;
            while let Some(u) = stack.pop() {
                size += 1;
                for &(w, _) in self.lg.graph().neighbors(u) {
                    if self.lg.is_fixed(w) && piece_of[w] == usize::MAX {
                        piece_of[w] = id;
                        stack.push(w);
                    }
                }
            }
            sizes.push(size);
        }
        let Some((largest, _)) = sizes.iter().enumerate().max_by_key(|&(_, s)| s) else {
            return false;
        };

        for v in 0..n {
            if piece_of[v] == largest {
                self.lg.set_vertex_state(v, DrawnState::Boundary);
            } else {
                self.lg.set_fixed(v, false);
            }
        }
        for e in self.lg.graph().edges() {
            let (a, b) = self.lg.graph().edge_endpoints(e);
            if piece_of[a] == largest && piece_of[b] == largest {
                self.lg.set_edge_state(e, DrawnState::Boundary);
            }
        }
        debug!(kept = sizes[largest], "seeded from fixed coordinates");
        true
    }

    /// The nucleus: the non-trivial block with the largest summed Morgan
    /// code, or, in an acyclic component, the heaviest single edge.
    fn seed_nucleus(&mut self, decomposition: &BiconnectedDecomposition) -> Result<()> {
        let nucleus = decomposition
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_trivial())
            .max_by_key(|(_, b)| {
                b.vertices
                    .iter()
                    .map(|&v| self.lg.morgan_code(v))
                    .sum::<i64>()
            })
            .map(|(id, _)| id);

        match nucleus {
            Some(id) => {
                let mut block = self.block_graph(decomposition, id);
                rings::layout_block(&mut block, self.molecule, self.options, &mut self.rng)?;
                block.apply_to_parent(&mut self.lg);
                Ok(())
            }
            None => {
                // Acyclic: seed from the edge with the heaviest endpoints.
                let e = self
                    .lg
                    .graph()
                    .edges()
                    .max_by_key(|&e| {
                        let (a, b) = self.lg.graph().edge_endpoints(e);
                        self.lg.morgan_code(a) + self.lg.morgan_code(b)
                    })
                    .ok_or(Error::NoNontrivialBlock)?;
                let (a, b) = self.lg.graph().edge_endpoints(e);
                self.lg.set_pos(a, Vec2::zeros());
                self.lg.set_pos(b, Vec2::new(1.0, 0.0));
                self.lg.set_vertex_state(a, DrawnState::Boundary);
                self.lg.set_vertex_state(b, DrawnState::Boundary);
                self.lg.set_edge_state(e, DrawnState::Boundary);
                Ok(())
            }
        }
    }

    fn block_graph(&self, decomposition: &BiconnectedDecomposition, id: usize) -> LayoutGraph {
        let mut mask = vec![false; self.lg.vertex_count()];
        for &v in &decomposition.blocks[id].vertices {
            mask[v] = true;
        }
        self.lg.induced(&mask)
    }

    /// Grows outward from the seed, one frontier vertex at a time: ring
    /// blocks through the attachment-order search, lone neighbors through
    /// dangling placement.
    fn grow(&mut self, decomposition: &BiconnectedDecomposition) -> Result<()> {
        let budget = self.lg.vertex_count() * 4 + 16;
        let mut steps = 0;
        while self.lg.has_undrawn_vertices() {
            self.check_cancelled()?;
            steps += 1;
            if steps > budget {
                return Err(Error::InconsistentState("growth loop did not converge"));
            }

            let mut frontier = self.lg.frontier();
            if frontier.is_empty() {
                self.lg.restore_ignored();
                frontier = self.lg.frontier();
            }
            let Some(&v) = frontier
                .iter()
                .min_by_key(|&&v| (!self.lg.vertex(v).is_cyclic, -self.lg.morgan_code(v)))
            else {
                return Err(Error::InconsistentState("undrawn vertices without frontier"));
            };
            self.grow_at(v, decomposition)?;
        }
        self.lg.restore_ignored();
        Ok(())
    }

    fn grow_at(&mut self, v: usize, decomposition: &BiconnectedDecomposition) -> Result<()> {
        let pending: Vec<usize> = decomposition
            .blocks_containing(v)
            .iter()
            .copied()
            .filter(|&id| {
                let b = &decomposition.blocks[id];
                !b.is_trivial()
                    && b.vertices
                        .iter()
                        .any(|&w| !self.lg.vertex_state(w).is_drawn())
            })
            .collect();

        if pending.is_empty() {
            return attach::attach_dangling(&mut self.lg, self.molecule, v, &mut self.rng);
        }

        let mut candidates = Vec::with_capacity(pending.len());
        for id in pending {
            let mut block = self.block_graph(decomposition, id);
            rings::layout_block(&mut block, self.molecule, self.options, &mut self.rng)?;
            let local_hub = block
                .graph()
                .vertices()
                .find(|&u| block.vertex(u).ext_idx == v)
                .ok_or(Error::InconsistentState("hub missing from its block"))?;
            candidates.push(attach::AttachmentCandidate::new(
                block,
                local_hub,
                &mut self.rng,
            ));
        }
        attach::attach_components(
            &mut self.lg,
            self.molecule,
            v,
            candidates,
            self.options,
            &mut self.rng,
        )
    }

    /// Post-growth pass: draw leftover chord edges (flagging crossings) and
    /// flip badly placed acyclic branches.
    fn finish(&mut self) -> Result<()> {
        border::resolve_crossing_edges(&mut self.lg);
        self.refine_branches();
        Ok(())
    }

    /// For every bridge, tries mirroring the smaller side across the bridge
    /// axis and keeps whichever arrangement has less repulsion.
    fn refine_branches(&mut self) {
        let n = self.lg.vertex_count();
        let norm = (0..n)
            .map(|v| self.lg.morgan_code(v) as f64)
            .fold(1.0f64, f64::max);
        for e in self.lg.graph().edges() {
            let (a, b) = self.lg.graph().edge_endpoints(e);
            if self.lg.edge(e).is_cyclic {
                continue;
            }
            let Some(side) = branch_beyond(&self.lg, a, b) else {
                continue;
            };
            if side.iter().filter(|&&s| s).count() * 2 > n {
                continue;
            }
            let axis_a = self.lg.pos(a);
            let axis_b = self.lg.pos(b);
            let dir = axis_b - axis_a;
            if dir.norm() < crate::geom::RAY_EPS {
                continue;
            }
            let dir = dir.normalize();

            let current = cut_energy(&self.lg, &side, norm, None);
            let mirror = |p: Vec2| {
                let rel = p - axis_a;
                let along = dir * rel.dot(&dir);
                axis_a + along * 2.0 - rel
            };
            let flipped = cut_energy(&self.lg, &side, norm, Some(&mirror));
            if flipped < current - self.options.energy_margin {
                for v in 0..n {
                    if side[v] && v != b {
                        self.lg.set_pos(v, mirror(self.lg.pos(v)));
                    }
                }
            }
        }
    }
}

/// Vertices reachable from `b` without crossing `a`, or `None` when the
/// "branch" wraps around and reaches `a`'s other neighbors (a ring).
fn branch_beyond(lg: &LayoutGraph, a: usize, b: usize) -> Option<Vec<bool>> {
    let mut side = vec![false; lg.vertex_count()];
    side[b] = true;
    let mut stack = vec![b];
    while let Some(u) = stack.pop() {
        for &(w, _) in lg.graph().neighbors(u) {
            if w == a {
                if u != b {
                    return None;
                }
                continue;
            }
            if !side[w] {
                side[w] = true;
                stack.push(w);
            }
        }
    }
    Some(side)
}

/// Inverse-square repulsion across a cut, optionally with one side mapped
/// through `transform`.
fn cut_energy(
    lg: &LayoutGraph,
    side: &[bool],
    norm: f64,
    transform: Option<&dyn Fn(Vec2) -> Vec2>,
) -> f64 {
    let mut energy = 0.0;
    for u in lg.graph().vertices() {
        if !side[u] {
            continue;
        }
        let mut pu = lg.pos(u);
        if let Some(t) = transform {
            pu = t(pu);
        }
        let qu = lg.morgan_code(u) as f64 / norm + 0.5;
        for w in lg.graph().vertices() {
            if side[w] {
                continue;
            }
            let r2 = (lg.pos(w) - pu).norm_squared();
            if r2 < 1e-8 {
                return 1e20;
            }
            energy += qu * (lg.morgan_code(w) as f64 / norm + 0.5) / r2;
        }
    }
    energy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{BondOrder, Molecule};

    fn engine_for<'a>(
        molecule: &'a Molecule,
        options: &'a LayoutOptions,
    ) -> ComponentEngine<'a> {
        let lg = LayoutGraph::from_molecule(molecule, None);
        ComponentEngine::new(lg, molecule, options, None, SeededRng::new(7))
    }

    #[test]
    fn chain_of_four_is_fully_drawn_with_unit_bonds() {
        let mut m = Molecule::new();
        for _ in 0..4 {
            m.add_atom();
        }
        for i in 1..4 {
            m.add_bond(i - 1, i, BondOrder::Single);
        }
        let options = LayoutOptions::default();
        let mut engine = engine_for(&m, &options);
        engine.run().expect("layout");
        for v in 0..4 {
            assert!(engine.lg.vertex_state(v).is_drawn());
        }
        for e in engine.lg.graph().edges() {
            let (a, b) = engine.lg.graph().edge_endpoints(e);
            let d = (engine.lg.pos(b) - engine.lg.pos(a)).norm();
            assert!((d - 1.0).abs() < 1e-6, "edge {e} has length {d}");
        }
    }

    #[test]
    fn toluene_ring_keeps_unit_bonds_and_substituent_attaches() {
        let mut m = Molecule::new();
        for _ in 0..7 {
            m.add_atom();
        }
        for i in 0..6 {
            m.add_bond(i, (i + 1) % 6, BondOrder::Aromatic);
        }
        m.add_bond(0, 6, BondOrder::Single);
        let options = LayoutOptions::default();
        let mut engine = engine_for(&m, &options);
        engine.run().expect("layout");
        for e in engine.lg.graph().edges() {
            let (a, b) = engine.lg.graph().edge_endpoints(e);
            let d = (engine.lg.pos(b) - engine.lg.pos(a)).norm();
            assert!((d - 1.0).abs() < 0.05, "edge {e} has length {d}");
        }
        // The substituent points away from the ring centroid.
        let centroid = (0..6).fold(Vec2::zeros(), |acc, v| acc + engine.lg.pos(v)) / 6.0;
        let ring_r = (engine.lg.pos(0) - centroid).norm();
        assert!((engine.lg.pos(6) - centroid).norm() > ring_r + 0.5);
    }

    #[test]
    fn bowtie_draws_both_triangles() {
        let mut m = Molecule::new();
        for _ in 0..5 {
            m.add_atom();
        }
        m.add_bond(0, 1, BondOrder::Single);
        m.add_bond(1, 2, BondOrder::Single);
        m.add_bond(2, 0, BondOrder::Single);
        m.add_bond(2, 3, BondOrder::Single);
        m.add_bond(3, 4, BondOrder::Single);
        m.add_bond(4, 2, BondOrder::Single);
        let options = LayoutOptions::default();
        let mut engine = engine_for(&m, &options);
        engine.run().expect("layout");
        for v in 0..5 {
            assert!(engine.lg.vertex_state(v).is_drawn());
        }
        // The two triangles sit on opposite sides of the shared vertex.
        let c1 = (engine.lg.pos(0) + engine.lg.pos(1)) * 0.5;
        let c2 = (engine.lg.pos(3) + engine.lg.pos(4)) * 0.5;
        assert!((c1 - c2).norm() > 1.0);
    }

    #[test]
    fn cancellation_trips_before_growth() {
        struct Always;
        impl Cancellation for Always {
            fn is_cancelled(&self) -> bool {
                true
            }
            fn message(&self) -> String {
                "stop".into()
            }
        }
        let mut m = Molecule::new();
        for _ in 0..3 {
            m.add_atom();
        }
        m.add_bond(0, 1, BondOrder::Single);
        m.add_bond(1, 2, BondOrder::Single);
        let options = LayoutOptions::default();
        let lg = LayoutGraph::from_molecule(&m, None);
        let mut engine = ComponentEngine::new(lg, &m, &options, Some(&Always), SeededRng::new(7));
        assert!(matches!(engine.run(), Err(Error::Cancelled(_))));
    }

    #[test]
    fn cancellation_trips_on_a_nucleus_only_component() {
        // A lone ring is drawn entirely by its nucleus block, so the poll
        // must happen before seeding.
        struct Always;
        impl Cancellation for Always {
            fn is_cancelled(&self) -> bool {
                true
            }
            fn message(&self) -> String {
                "stop".into()
            }
        }
        let mut m = Molecule::new();
        for _ in 0..6 {
            m.add_atom();
        }
        for i in 0..6 {
            m.add_bond(i, (i + 1) % 6, BondOrder::Single);
        }
        let options = LayoutOptions::default();
        let lg = LayoutGraph::from_molecule(&m, None);
        let mut engine = ComponentEngine::new(lg, &m, &options, Some(&Always), SeededRng::new(7));
        assert!(matches!(engine.run(), Err(Error::Cancelled(_))));
    }

    #[test]
    fn majority_fixed_component_keeps_fixed_positions() {
        let mut m = Molecule::new();
        for _ in 0..4 {
            m.add_atom();
        }
        for i in 1..4 {
            m.add_bond(i - 1, i, BondOrder::Single);
        }
        for v in 0..3 {
            m.set_fixed(v, true);
            m.positions[v] = Vec2::new(v as f64 * 2.0, 1.0);
        }
        let options = LayoutOptions::default();
        let mut engine = engine_for(&m, &options);
        engine.run().expect("layout");
        for v in 0..3 {
            assert_eq!(engine.lg.pos(v), Vec2::new(v as f64 * 2.0, 1.0));
        }
        assert!(engine.lg.vertex_state(3).is_drawn());
    }
}
