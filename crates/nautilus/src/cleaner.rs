//! Post-layout 2D cleaning.
//!
//! Every non-base vertex is a fixed complex-linear combination of the base
//! points (one per biconnected block step), so a block moves rigidly when
//! its defining points move. Gradient descent over the base points then
//! minimizes edge-length deviation, short-range vertex clashes and bad
//! angles at articulation points, without distorting ring interiors.

use nautilus_graphlib::BiconnectedDecomposition;
use tracing::debug;

use crate::LayoutOptions;
use crate::geom::Vec2;
use crate::model::LayoutGraph;
use crate::molecule::{Cancellation, Molecule};

const TARGET_ANGLE: f64 = 2.0 * std::f64::consts::PI / 3.0;
/// Finite-difference step, relative to the target edge length.
const APPROX_STEP: f64 = 1e-2;
/// Line-search multipliers: zero, then 1 halved down.
const SEARCH_STEPS: usize = 21;

/// Complex product of two points read as complex numbers.
fn cmul(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x)
}

/// The complex unit.
fn one() -> Vec2 {
    Vec2::new(1.0, 0.0)
}

struct Cleaner<'a> {
    lg: &'a LayoutGraph,
    molecule: &'a Molecule,
    blocks: Vec<Vec<bool>>,
    base_points: Vec<usize>,
    base_index: Vec<Option<usize>>,
    /// Per vertex, complex coefficient of each base point.
    coef: Vec<Vec<Vec2>>,
    is_art: Vec<bool>,
    target_len: f64,
    pos: Vec<Vec2>,
}

/// Cleans one laid-out component in place. Components with fewer than two
/// blocks are already rigid and are left untouched, as are components
/// pinned by fixed vertices.
pub fn clean_component(
    lg: &mut LayoutGraph,
    molecule: &Molecule,
    options: &LayoutOptions,
    cancellation: Option<&dyn Cancellation>,
) {
    let n = lg.vertex_count();
    if n < 3 || (0..n).any(|v| lg.is_fixed(v)) {
        return;
    }
    let decomposition = BiconnectedDecomposition::compute(lg.graph());
    if decomposition.block_count() <= 1 {
        return;
    }
    let Some(mut cleaner) = Cleaner::new(lg, molecule, &decomposition) else {
        return;
    };
    cleaner.run(options, cancellation);
    let pos = cleaner.pos;
    for (v, p) in pos.into_iter().enumerate() {
        lg.set_pos(v, p);
    }
}

impl<'a> Cleaner<'a> {
    fn new(
        lg: &'a LayoutGraph,
        molecule: &'a Molecule,
        decomposition: &BiconnectedDecomposition,
    ) -> Option<Self> {
        let n = lg.vertex_count();
        let blocks: Vec<Vec<bool>> = decomposition
            .blocks
            .iter()
            .map(|b| {
                let mut mask = vec![false; n];
                for &v in &b.vertices {
                    mask[v] = true;
                }
                mask
            })
            .collect();
        let is_art: Vec<bool> = (0..n)
            .map(|v| blocks.iter().filter(|m| m[v]).count() > 1)
            .collect();

        let mut cleaner = Self {
            lg,
            molecule,
            blocks,
            base_points: Vec::new(),
            base_index: vec![None; n],
            coef: vec![Vec::new(); n],
            is_art,
            target_len: median_edge_length(lg)?,
            pos: (0..n).map(|v| lg.pos(v)).collect(),
        };
        cleaner.pick_base_points();
        Some(cleaner)
    }

    fn add_coef(&mut self, vertex: usize, index: usize, value: Vec2) {
        while self.coef[vertex].len() <= index {
            self.coef[vertex].push(Vec2::zeros());
        }
        self.coef[vertex][index] += value;
    }

    fn push_base_point(&mut self, vertex: usize) {
        let index = self.base_points.len();
        self.base_points.push(vertex);
        self.base_index[vertex] = Some(index);
        self.coef[vertex].clear();
        self.add_coef(vertex, index, one());
    }

    /// BFS over the block tree. Each block contributes one new base point
    /// (articulation points preferred); every other vertex of the block is
    /// expressed through two defining points of that block.
    fn pick_base_points(&mut self) {
        let n = self.pos.len();
        let block_count = self.blocks.len();
        let mut has_block = vec![false; block_count];
        let mut blocked = vec![false; n];
        let mut queue: Vec<usize> = Vec::new();

        for c in 0..block_count {
            if has_block[c] {
                continue;
            }
            let seed = (0..n)
                .find(|&v| self.blocks[c][v] && self.is_art[v])
                .or_else(|| (0..n).find(|&v| self.blocks[c][v]));
            let Some(seed) = seed else { continue };
            self.push_base_point(seed);
            blocked[seed] = true;
            has_block[c] = true;
            queue.push(c);

            let mut index = 0;
            while index < queue.len() {
                let comp = queue[index];
                index += 1;

                let fresh = (0..n)
                    .find(|&v| self.blocks[comp][v] && !blocked[v] && self.is_art[v])
                    .or_else(|| (0..n).find(|&v| self.blocks[comp][v] && !blocked[v]));
                if let Some(v) = fresh {
                    self.push_base_point(v);
                }

                let mut defining: Vec<usize> = self
                    .base_points
                    .iter()
                    .copied()
                    .filter(|&b| self.blocks[comp][b])
                    .collect();
                if defining.len() < 2 {
                    if let Some(extra) = (0..n).find(|&v| blocked[v] && self.blocks[comp][v]) {
                        defining.push(extra);
                    }
                }
                if defining.len() >= 2 {
                    for v in 0..n {
                        if self.blocks[comp][v]
                            && v != defining[0]
                            && v != defining[1]
                            && !blocked[v]
                        {
                            self.project_vertex(v, defining[0], defining[1]);
                        }
                    }
                }

                for v in 0..n {
                    if self.blocks[comp][v] && self.is_art[v] {
                        for c2 in 0..block_count {
                            if self.blocks[c2][v] && !has_block[c2] {
                                has_block[c2] = true;
                                queue.push(c2);
                            }
                        }
                    }
                }
                for v in 0..n {
                    if self.blocks[comp][v] {
                        blocked[v] = true;
                    }
                }
            }
        }
    }

    /// Expresses `to` through the two anchors: with z the complex position
    /// of `to` in the anchor chord frame, `coef(to) = z·coef(from1) +
    /// (1 − z)·coef(from0)`.
    fn project_vertex(&mut self, to: usize, from0: usize, from1: usize) {
        let a0 = self.pos[from0];
        let a1 = self.pos[from1];
        let a2 = self.pos[to];
        let chord = a1 - a0;
        let dist2 = chord.norm_squared();
        if dist2 < 1e-12 {
            return;
        }
        let rel = a2 - a0;
        let z = Vec2::new(chord.dot(&rel), chord.perp(&rel)) / dist2;

        let len = self.coef[from0].len().max(self.coef[from1].len());
        self.add_coef(from0, len.saturating_sub(1), Vec2::zeros());
        self.add_coef(from1, len.saturating_sub(1), Vec2::zeros());
        for i in 0..len {
            let c1 = self.coef[from1][i];
            let c0 = self.coef[from0][i];
            self.add_coef(to, i, cmul(z, c1));
            self.add_coef(to, i, cmul(one() - z, c0));
        }
    }

    fn update_positions(&mut self) {
        for v in 0..self.pos.len() {
            if self.base_index[v].is_some() {
                continue;
            }
            let mut p = Vec2::zeros();
            for (j, &c) in self.coef[v].iter().enumerate() {
                p += cmul(c, self.pos[self.base_points[j]]);
            }
            self.pos[v] = p;
        }
    }

    fn shares_block(&self, i: usize, j: usize) -> bool {
        self.blocks.iter().any(|m| m[i] && m[j])
    }

    /// Angle at `i` between `v1` and `v2`, signed by the cross product, and
    /// the squared deviation from the target angle. Linear atoms want π.
    fn angle_energy(&self, i: usize, v1: usize, v2: usize) -> f64 {
        let vec1 = self.pos[v1] - self.pos[i];
        let vec2 = self.pos[v2] - self.pos[i];
        let l1 = vec1.norm();
        let l2 = vec2.norm();
        if l1 < 1e-9 || l2 < 1e-9 {
            return 0.0;
        }
        let cos = (vec1.dot(&vec2) / (l1 * l2)).clamp(-1.0, 1.0);
        let sin = (vec1.perp(&vec2) / (l1 * l2)).clamp(-1.0, 1.0);
        let signcross = if sin > 0.0 {
            1.0
        } else if sin < 0.0 {
            -1.0
        } else {
            0.0
        };
        let alpha = if cos.abs() < 0.5 {
            cos.acos() * signcross
        } else {
            let a = sin.asin();
            if cos < 0.0 {
                if a > 0.0 {
                    std::f64::consts::PI - a
                } else {
                    -std::f64::consts::PI - a
                }
            } else {
                a
            }
        };
        let target = if self.molecule.is_linear_atom(self.lg.vertex(i).orig_idx) {
            std::f64::consts::PI * signcross
        } else {
            TARGET_ANGLE * signcross
        };
        (alpha - target) * (alpha - target)
    }

    /// Angle terms contributed at `i`: only articulation points count, and
    /// only for neighbor pairs not sharing a block (ring interiors keep
    /// their shape through the base-point projection instead).
    fn angle_energy_at(&self, i: usize) -> f64 {
        if !self.is_art[i] {
            return 0.0;
        }
        let nei = self.lg.graph().neighbors(i);
        let mut result = 0.0;
        for a in 0..nei.len() {
            for b in 0..a {
                let (v1, v2) = (nei[a].0, nei[b].0);
                if self.shares_block(v1, v2) {
                    continue;
                }
                result += self.angle_energy(i, v1, v2);
            }
        }
        result
    }

    fn total_energy(&self) -> f64 {
        let mut result = 0.0;
        for e in self.lg.graph().edges() {
            let (a, b) = self.lg.graph().edge_endpoints(e);
            let diff = ((self.pos[a] - self.pos[b]).norm() - self.target_len) / self.target_len;
            result += diff * diff;
        }
        for i in 0..self.pos.len() {
            for j in 0..i {
                if !self.shares_block(i, j)
                    && (self.pos[i] - self.pos[j]).norm_squared()
                        < self.target_len * self.target_len
                {
                    let diff =
                        ((self.pos[i] - self.pos[j]).norm() - self.target_len) / self.target_len;
                    result += diff * diff;
                }
            }
        }
        for i in 0..self.pos.len() {
            result += self.angle_energy_at(i);
        }
        result
    }

    /// Energy terms touched by moving `v`, under the same block gating as
    /// the total: edge terms at `v`, clashes against other blocks, and the
    /// angle terms at `v` and at its direct neighbors.
    fn local_energy(&self, v: usize) -> f64 {
        let mut result = 0.0;
        for &(w, _) in self.lg.graph().neighbors(v) {
            let diff = ((self.pos[v] - self.pos[w]).norm() - self.target_len) / self.target_len;
            result += diff * diff;
        }
        for i in 0..self.pos.len() {
            if i == v || self.shares_block(v, i) {
                continue;
            }
            let dist2 = (self.pos[v] - self.pos[i]).norm_squared();
            if dist2 < self.target_len * self.target_len {
                let diff = (dist2.sqrt() - self.target_len) / self.target_len;
                result += diff * diff;
            }
        }
        result += self.angle_energy_at(v);
        for &(w, _) in self.lg.graph().neighbors(v) {
            result += self.angle_energy_at(w);
        }
        result
    }

    /// Finite-difference gradient of the local energy at a base point.
    fn energy_diff(&mut self, v: usize) -> Vec2 {
        let h = APPROX_STEP * self.target_len;
        self.update_positions();
        let e = self.local_energy(v);
        self.pos[v].x += h;
        self.update_positions();
        let ex = self.local_energy(v);
        self.pos[v].x -= h;
        self.pos[v].y += h;
        self.update_positions();
        let ey = self.local_energy(v);
        self.pos[v].y -= h;
        Vec2::new(ex - e, ey - e) / h
    }

    fn run(&mut self, options: &LayoutOptions, cancellation: Option<&dyn Cancellation>) {
        self.update_positions();
        let mut mults = [0.0; SEARCH_STEPS];
        mults[1] = 1.0;
        for i in 2..SEARCH_STEPS {
            mults[i] = mults[i - 1] * 0.5;
        }

        for iter in 0..options.cleaner_iterations {
            if let Some(c) = cancellation {
                if c.is_cancelled() {
                    debug!(iter, "cleaner stopped by cancellation");
                    break;
                }
            }
            let mut gradient: Vec<Vec2> = Vec::with_capacity(self.base_points.len());
            for i in 0..self.base_points.len() {
                let v = self.base_points[i];
                gradient.push(self.energy_diff(v));
            }
            let len: f64 = gradient.iter().map(|g| g.norm_squared()).sum::<f64>().sqrt();
            if len < 1e-12 {
                break;
            }
            let factor = self.target_len / len;
            for g in &mut gradient {
                *g *= factor;
            }

            let mut best = (0usize, f64::INFINITY);
            for (i, &m) in mults.iter().enumerate() {
                for (j, &bp) in self.base_points.iter().enumerate() {
                    self.pos[bp] -= gradient[j] * m;
                }
                self.update_positions();
                let energy = self.total_energy();
                if energy < best.1 {
                    best = (i, energy);
                }
                for (j, &bp) in self.base_points.iter().enumerate() {
                    self.pos[bp] += gradient[j] * m;
                }
            }

            for (j, &bp) in self.base_points.iter().enumerate() {
                self.pos[bp] -= gradient[j] * mults[best.0];
            }
            self.update_positions();
            if best.0 == 0 {
                break;
            }
        }
    }
}

fn median_edge_length(lg: &LayoutGraph) -> Option<f64> {
    let mut lens: Vec<f64> = lg
        .graph()
        .edges()
        .map(|e| {
            let (a, b) = lg.graph().edge_endpoints(e);
            (lg.pos(a) - lg.pos(b)).norm()
        })
        .collect();
    if lens.is_empty() {
        return None;
    }
    lens.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = lens.len() / 2;
    let median = if lens.len() % 2 == 1 {
        lens[mid]
    } else {
        (lens[mid] + lens[mid - 1]) / 2.0
    };
    (median > 1e-9).then_some(median)
}
