//! Macrocycle layout on the triangular lattice.
//!
//! Every ring edge becomes a unit lattice step in one of six directions; a
//! dynamic program over (edge index, accumulated rotation, last-turn parity,
//! position) finds the cheapest closed walk, preferring shapes that come
//! back to the start with one full counter-clockwise turn. A short random
//! smoothing pass then relaxes the polyline off the lattice.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::LayoutOptions;
use crate::error::{Error, Result};
use crate::geom::Vec2;
use crate::molecule::CisTrans;
use crate::rand::SeededRng;

/// Unit steps of the six lattice directions.
const DX: [i32; 6] = [1, 0, -1, -1, 0, 1];
const DY: [i32; 6] = [0, 1, 1, 0, -1, -1];

/// Candidate shapes are penalized for non-adjacent vertices closer than
/// this; a clean lattice walk keeps everything at one lattice step or more.
const SEPARATION: f64 = std::f64::consts::SQRT_2;
/// The smoothing push kicks in below this distance. It must not exceed the
/// unit spring length, or the two forces fight and inflate the edges.
const PUSH_RADIUS: f64 = 1.0;
const SMOOTHING_SCALE: f64 = 0.01;
/// How many of the best-ranked closings get embedded and re-scored.
const CANDIDATE_FINISHES: usize = 16;

fn step(rot: i32) -> (i32, i32) {
    let d = rot.rem_euclid(6) as usize;
    (DX[d], DY[d])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LatticeState {
    rot: i16,
    parity: u8,
    x: i16,
    y: i16,
}

type Layer = FxHashMap<LatticeState, (u32, LatticeState)>;

/// Solver for one ring of size `len`. Stereo constraints and weights are
/// set per edge/vertex before `solve`, positions read back afterwards.
#[derive(Debug, Clone)]
pub struct MacrocycleLayout {
    len: usize,
    vertex_weight: Vec<i32>,
    /// Whether the chain may turn at this vertex.
    vertex_turns: Vec<bool>,
    edge_stereo: Vec<CisTrans>,
    positions: Vec<Vec2>,
}

impl MacrocycleLayout {
    pub fn new(len: usize, options: &LayoutOptions) -> Result<Self> {
        if len < 3 {
            return Err(Error::InconsistentState("macrocycle shorter than 3"));
        }
        if len > options.max_macrocycle {
            return Err(Error::RingTooLarge {
                size: len,
                max: options.max_macrocycle,
            });
        }
        Ok(Self {
            len,
            vertex_weight: vec![0; len],
            vertex_turns: vec![true; len],
            edge_stereo: vec![CisTrans::Unspecified; len],
            positions: vec![Vec2::zeros(); len],
        })
    }

    /// Cis/trans constraint of edge `e` (between vertices `e` and `e + 1`).
    pub fn set_edge_stereo(&mut self, e: usize, stereo: CisTrans) {
        self.edge_stereo[e] = stereo;
    }

    /// Marks whether vertex `v` may turn; a vertex on a cumulated double
    /// bond must continue straight.
    pub fn set_vertex_turns(&mut self, v: usize, turns: bool) {
        self.vertex_turns[v] = turns;
    }

    /// Extra outward weight pulling the turn at `v` to the convex side,
    /// used for vertices carrying large substituent trees.
    pub fn add_vertex_weight(&mut self, v: usize, weight: i32) {
        self.vertex_weight[v] += weight;
    }

    pub fn position(&self, v: usize) -> Vec2 {
        self.positions[v]
    }

    pub fn solve(&mut self, rng: &mut SeededRng, options: &LayoutOptions) -> Result<()> {
        let shift = self.best_start_edge();
        let weight = rotated(&self.vertex_weight, shift);
        let turns = rotated(&self.vertex_turns, shift);
        let stereo = rotated(&self.edge_stereo, shift);

        let candidates = self.run_lattice(&weight, &turns, &stereo);
        let best = candidates
            .into_iter()
            .map(|path| {
                let points: Vec<Vec2> = path
                    .iter()
                    .take(self.len)
                    .map(|s| embed(s.x as f64, s.y as f64))
                    .collect();
                let badness = shape_badness(&points);
                (badness, points)
            })
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        match best {
            Some((_, points)) => {
                for (i, p) in points.into_iter().enumerate() {
                    self.positions[(i + shift) % self.len] = p;
                }
            }
            None => {
                // Over-constrained stereo: no closed lattice walk exists.
                debug!(size = self.len, "lattice walk infeasible, using a regular polygon");
                self.fall_back_to_polygon();
            }
        }
        self.smooth(rng, options.smoothing_iterations);
        Ok(())
    }

    /// Starts the walk at the most "interesting" edge: stereo-constrained
    /// and between heavy vertices, away from other heavy neighbors.
    fn best_start_edge(&self) -> usize {
        let n = self.len;
        let mut best = 0;
        let mut best_value = i32::MIN;
        for i in 0..n {
            if self.edge_stereo[i] == CisTrans::Trans {
                continue;
            }
            let stereo_bonus = match self.edge_stereo[i] {
                CisTrans::Unspecified => 0,
                CisTrans::Cis => 1,
                CisTrans::Trans => 2,
            };
            let value = stereo_bonus + self.vertex_weight[i] + self.vertex_weight[(i + 1) % n]
                - self.vertex_weight[(i + n - 1) % n] / 2
                - self.vertex_weight[(i + 2) % n] / 2;
            if value > best_value {
                best_value = value;
                best = i;
            }
        }
        best
    }

    /// The dynamic program proper. Returns the state paths of the best few
    /// closed walks, ranked by closing quality; empty when nothing closes.
    fn run_lattice(
        &self,
        weight: &[i32],
        turns: &[bool],
        stereo: &[CisTrans],
    ) -> Vec<Vec<LatticeState>> {
        let n = self.len;
        let origin = LatticeState {
            rot: 0,
            parity: 0,
            x: 0,
            y: 0,
        };
        let mut layers: Vec<Layer> = Vec::with_capacity(n + 1);
        let mut first = Layer::default();
        for parity in 0..2u8 {
            first.insert(
                LatticeState {
                    parity,
                    ..origin
                },
                (0, origin),
            );
        }
        layers.push(first);

        for l in 0..n {
            let mut next = Layer::default();
            for (&s, &(cost, _)) in &layers[l] {
                for turn in allowed_turns(turns[l], stereo[l], s.parity) {
                    let new_parity = match turn {
                        0 => s.parity,
                        1 => 1,
                        _ => 0,
                    };
                    let next_rot = s.rot as i32 + turn;
                    let (dx, dy) = step(next_rot);
                    let state = LatticeState {
                        rot: next_rot as i16,
                        parity: new_parity,
                        x: s.x + dx as i16,
                        y: s.y + dy as i16,
                    };
                    let add = 0.max(weight[l] * if new_parity == 1 { -1 } else { 1 }) as u32;
                    let candidate = cost + add;
                    match next.get(&state) {
                        Some(&(existing, _)) if existing <= candidate => {}
                        _ => {
                            next.insert(state, (candidate, s));
                        }
                    }
                }
            }
            layers.push(next);
        }

        // Rank closings: distance from the origin plus rotation deviation
        // from one full counter-clockwise turn, plus the accumulated cost.
        let mut finishes: Vec<(u32, LatticeState)> = layers[n]
            .iter()
            .map(|(&s, &(cost, _))| {
                let (x, y) = (s.x as i32, s.y as i32);
                let diff_coord = if x * y >= 0 {
                    x.abs() + y.abs()
                } else {
                    x.abs().max(y.abs())
                };
                let quality =
                    diff_coord as u32 + 2 * (s.rot as i32 - 6).unsigned_abs() + cost;
                (quality, s)
            })
            .collect();
        finishes.sort_by_key(|&(q, s)| (q, s.rot, s.parity, s.x, s.y));

        finishes
            .into_iter()
            .take(CANDIDATE_FINISHES)
            .map(|(_, finish)| {
                let mut path = vec![finish; n + 1];
                for l in (0..n).rev() {
                    let (_, prev) = layers[l + 1][&path[l + 1]];
                    path[l] = prev;
                }
                path
            })
            .collect()
    }

    fn fall_back_to_polygon(&mut self) {
        let n = self.len as f64;
        let radius = 0.5 / (std::f64::consts::PI / n).sin();
        for (i, p) in self.positions.iter_mut().enumerate() {
            let a = std::f64::consts::TAU * i as f64 / n;
            *p = Vec2::new(radius * a.cos(), radius * a.sin());
        }
    }

    /// Random single-vertex relaxation: springs toward unit-length edges
    /// and a short-range separation push between non-adjacent vertices.
    fn smooth(&mut self, rng: &mut SeededRng, iterations: usize) {
        let n = self.len;
        for _ in 0..iterations {
            let i = rng.next_below(n);
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;
            let mut force = Vec2::zeros();
            for j in [prev, next] {
                let d = self.positions[j] - self.positions[i];
                let r = d.norm();
                if r > 1e-9 {
                    force += d * ((r - 1.0) / r);
                }
            }
            for j in 0..n {
                if j == i || j == prev || j == next {
                    continue;
                }
                let d = self.positions[i] - self.positions[j];
                let r = d.norm();
                if r > 1e-9 && r < PUSH_RADIUS {
                    force += d * ((PUSH_RADIUS - r) / r);
                }
            }
            self.positions[i] += force * SMOOTHING_SCALE;
        }
    }
}

/// Turns allowed at a vertex: a turning vertex must bend left or right
/// (gated by the edge's cis/trans constraint and the incoming parity), a
/// non-turning one continues straight.
fn allowed_turns(turns: bool, stereo: CisTrans, parity: u8) -> &'static [i32] {
    if !turns {
        return &[0];
    }
    match stereo {
        CisTrans::Unspecified => &[-1, 1],
        CisTrans::Trans => {
            if parity == 1 {
                &[-1]
            } else {
                &[1]
            }
        }
        CisTrans::Cis => {
            if parity == 0 {
                &[-1]
            } else {
                &[1]
            }
        }
    }
}

/// Lattice coordinates to the plane: the y axis is slanted by 60 degrees.
fn embed(x: f64, y: f64) -> Vec2 {
    Vec2::new(x + y / 2.0, y * 3.0f64.sqrt() / 2.0)
}

/// Penalty of an embedded candidate: squared edge-length deviation plus a
/// heavy term for non-adjacent vertices closer than the separation radius.
fn shape_badness(points: &[Vec2]) -> f64 {
    let n = points.len();
    let mut badness = 0.0;
    for i in 0..n {
        let d = (points[(i + 1) % n] - points[i]).norm();
        badness += (d - 1.0) * (d - 1.0);
    }
    for i in 0..n {
        for j in i + 2..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let d = (points[j] - points[i]).norm();
            if d < SEPARATION {
                badness += 1000.0 * (SEPARATION - d);
            }
        }
    }
    badness
}

fn rotated<T: Clone>(values: &[T], shift: usize) -> Vec<T> {
    let n = values.len();
    (0..n).map(|i| values[(i + shift) % n].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rand::SMOOTHING_SEED;

    fn solved(len: usize) -> MacrocycleLayout {
        let options = LayoutOptions::default();
        let mut layout = MacrocycleLayout::new(len, &options).expect("size ok");
        let mut rng = SeededRng::new(SMOOTHING_SEED);
        layout.solve(&mut rng, &options).expect("solve");
        layout
    }

    #[test]
    fn oversized_ring_is_rejected() {
        let options = LayoutOptions::default();
        let err = MacrocycleLayout::new(options.max_macrocycle + 1, &options);
        assert!(matches!(err, Err(Error::RingTooLarge { .. })));
    }

    #[test]
    fn twelve_ring_closes_with_near_unit_edges() {
        let layout = solved(12);
        for i in 0..12 {
            let d = (layout.position((i + 1) % 12) - layout.position(i)).norm();
            assert!((d - 1.0).abs() < 0.2, "edge {i} has length {d}");
        }
    }

    #[test]
    fn smoothing_keeps_unit_edges_on_a_twenty_ring() {
        // Starting from a clean lattice walk the relaxation is close to a
        // no-op: the springs and the separation push must not fight.
        let layout = solved(20);
        for i in 0..20 {
            let d = (layout.position((i + 1) % 20) - layout.position(i)).norm();
            assert!((d - 1.0).abs() < 0.1, "edge {i} has length {d}");
        }
    }

    #[test]
    fn lattice_walk_keeps_vertices_apart() {
        let layout = solved(18);
        for i in 0..18 {
            for j in i + 2..18 {
                if i == 0 && j == 17 {
                    continue;
                }
                let d = (layout.position(i) - layout.position(j)).norm();
                assert!(d > 0.8, "vertices {i} and {j} are {d} apart");
            }
        }
    }

    #[test]
    fn straight_vertices_stay_collinear_on_the_lattice() {
        let options = LayoutOptions::default();
        let mut layout = MacrocycleLayout::new(12, &options).expect("size ok");
        layout.set_vertex_turns(3, false);
        let weight = rotated(&layout.vertex_weight, 0);
        let turns = rotated(&layout.vertex_turns, 0);
        let stereo = rotated(&layout.edge_stereo, 0);
        let candidates = layout.run_lattice(&weight, &turns, &stereo);
        let path = candidates.first().expect("closed walk");
        // Vertex 3 keeps the incoming direction: edges 2 and 3 share a step.
        let a = (
            path[3].x - path[2].x,
            path[3].y - path[2].y,
        );
        let b = (
            path[4].x - path[3].x,
            path[4].y - path[3].y,
        );
        assert_eq!(a, b);
    }
}
