//! Per-block relative layout: strategy selection and ring assembly.
//!
//! A block is laid out in its own local frame; the growth loop later places
//! it rigidly. The first SSSR ring becomes a regular polygon; remaining
//! rings are fused onto the drawn boundary through a cascade of
//! progressively more permissive attempts.

use std::collections::VecDeque;

use nautilus_graphlib::{Cycle, minimum_cycle_basis};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::LayoutOptions;
use crate::engine::border;
use crate::error::{Error, Result};
use crate::geom::{self, Vec2, Vec2Ext};
use crate::macrocycle::MacrocycleLayout;
use crate::model::{DrawnState, LayoutGraph};
use crate::molecule::{BondOrder, Molecule};
use crate::patterns::{BacktrackingMatcher, global_registry};
use crate::rand::SeededRng;

/// How one biconnected block gets its relative coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentLayoutStrategy {
    TrivialEdge,
    PatternMatch,
    RingAssembly,
    MacrocycleLattice,
}

/// Picks the strategy for a block graph.
pub fn choose_strategy(block: &LayoutGraph, options: &LayoutOptions) -> ComponentLayoutStrategy {
    if block.edge_count() == 1 {
        return ComponentLayoutStrategy::TrivialEdge;
    }
    let is_single_cycle = block
        .graph()
        .vertices()
        .all(|v| block.graph().degree(v) == 2);
    if is_single_cycle && block.vertex_count() > options.macrocycle_threshold {
        return ComponentLayoutStrategy::MacrocycleLattice;
    }
    ComponentLayoutStrategy::PatternMatch
}

/// Assigns relative coordinates to a block, dispatching on strategy.
/// `PatternMatch` falls through to `RingAssembly` when no template fits.
pub fn layout_block(
    block: &mut LayoutGraph,
    molecule: &Molecule,
    options: &LayoutOptions,
    rng: &mut SeededRng,
) -> Result<()> {
    match choose_strategy(block, options) {
        ComponentLayoutStrategy::TrivialEdge => {
            block.set_pos(0, Vec2::zeros());
            block.set_pos(1, Vec2::new(1.0, 0.0));
            block.set_vertex_state(0, DrawnState::Boundary);
            block.set_vertex_state(1, DrawnState::Boundary);
            block.set_edge_state(0, DrawnState::Boundary);
            Ok(())
        }
        ComponentLayoutStrategy::MacrocycleLattice => layout_macrocycle_block(block, molecule, options, rng),
        ComponentLayoutStrategy::PatternMatch | ComponentLayoutStrategy::RingAssembly => {
            if try_pattern(block, molecule) {
                border::mark_states_from_geometry(block);
                Ok(())
            } else {
                assemble_rings(block, molecule, options, rng)
            }
        }
    }
}

fn try_pattern(block: &mut LayoutGraph, molecule: &Molecule) -> bool {
    let code = block.code_sum();
    let orders: Vec<BondOrder> = block
        .graph()
        .edges()
        .map(|e| molecule.bond_order(block.edge(e).orig_idx))
        .collect();
    let matched = global_registry().match_target(block.graph(), code, &BacktrackingMatcher, &|e| {
        orders[e]
    });
    match matched {
        Some(coords) => {
            for (v, pos) in coords.into_iter().enumerate() {
                block.set_pos(v, pos);
                block.set_vertex_state(v, DrawnState::Drawn);
            }
            for e in block.graph().edges() {
                block.set_edge_state(e, DrawnState::Drawn);
            }
            true
        }
        None => false,
    }
}

fn layout_macrocycle_block(
    block: &mut LayoutGraph,
    molecule: &Molecule,
    options: &LayoutOptions,
    rng: &mut SeededRng,
) -> Result<()> {
    let basis = minimum_cycle_basis(block.graph());
    let cycle = basis
        .into_iter()
        .next()
        .ok_or(Error::InconsistentState("macrocycle block has no cycle"))?;
    lay_ring_with_lattice(block, &cycle, molecule, options, rng)
}

/// Lays one ring of a block through the lattice solver, feeding it the
/// stereo constraints, straight-vertex flags and substituent weights of the
/// underlying atoms.
fn lay_ring_with_lattice(
    block: &mut LayoutGraph,
    cycle: &Cycle,
    molecule: &Molecule,
    options: &LayoutOptions,
    rng: &mut SeededRng,
) -> Result<()> {
    let n = cycle.len();
    let mut macro_layout = MacrocycleLayout::new(n, options)?;
    let ring_atoms: Vec<usize> = cycle
        .vertices
        .iter()
        .map(|&v| block.vertex(v).orig_idx)
        .collect();
    for (i, weight) in hanging_subtree_sizes(molecule, &ring_atoms).into_iter().enumerate() {
        macro_layout.add_vertex_weight(i, weight);
    }
    for (i, &e) in cycle.edges.iter().enumerate() {
        let bond = molecule.bond(block.edge(e).orig_idx);
        macro_layout.set_edge_stereo(i, bond.parity);
        let next = cycle.edges[(i + 1) % n];
        let next_bond = molecule.bond(block.edge(next).orig_idx);
        let straight =
            bond.order.numeric() + next_bond.order.numeric() >= 4;
        macro_layout.set_vertex_turns(
            (i + 1) % n,
            !straight,
        );
    }
    macro_layout.solve(rng, options)?;
    for (i, &v) in cycle.vertices.iter().enumerate() {
        block.set_pos(v, macro_layout.position(i));
        block.set_vertex_state(v, DrawnState::Boundary);
    }
    for &e in &cycle.edges {
        block.set_edge_state(e, DrawnState::Boundary);
    }
    Ok(())
}

/// How many molecule atoms hang off each ring atom outside the ring.
/// Heavier vertices bias the lattice walk toward convex turns there.
fn hanging_subtree_sizes(molecule: &Molecule, ring_atoms: &[usize]) -> Vec<i32> {
    let on_ring: FxHashSet<usize> = ring_atoms.iter().copied().collect();
    ring_atoms
        .iter()
        .map(|&atom| {
            let mut seen = on_ring.clone();
            let mut queue: VecDeque<usize> = VecDeque::new();
            let mut count = 0i32;
            for &(w, _) in molecule.graph().neighbors(atom) {
                if seen.insert(w) {
                    queue.push_back(w);
                    count += 1;
                }
            }
            while let Some(v) = queue.pop_front() {
                for &(w, _) in molecule.graph().neighbors(v) {
                    if seen.insert(w) {
                        queue.push_back(w);
                        count += 1;
                    }
                }
            }
            count
        })
        .collect()
}

/// Ring preference: {6, 5, 7, 8, 4, 3}, then smaller-is-better, then
/// descending summed Morgan code.
fn ring_preference(len: usize) -> usize {
    match len {
        6 => 0,
        5 => 1,
        7 => 2,
        8 => 3,
        4 => 4,
        3 => 5,
        n => 6 + n,
    }
}

fn assemble_rings(
    block: &mut LayoutGraph,
    molecule: &Molecule,
    options: &LayoutOptions,
    rng: &mut SeededRng,
) -> Result<()> {
    let codes: Vec<i64> = (0..block.vertex_count()).map(|v| block.morgan_code(v)).collect();
    let mut rings = minimum_cycle_basis(block.graph());
    if rings.is_empty() {
        return Err(Error::InconsistentState("nontrivial block has no cycle"));
    }
    // Oversized rings anchor the assembly: their lattice shape is rigid, so
    // the largest goes down first and the small rings fuse onto it.
    rings.sort_by_key(|r| {
        let oversized = r.len() > options.macrocycle_threshold;
        (
            std::cmp::Reverse(if oversized { r.len() } else { 0 }),
            ring_preference(r.len()),
            -r.code_sum(&codes),
        )
    });
    debug!(rings = rings.len(), "assembling rings for block");

    if rings[0].len() > options.macrocycle_threshold {
        lay_ring_with_lattice(block, &rings[0], molecule, options, rng)?;
    } else {
        place_first_ring(block, &rings[0]);
    }
    let mut remaining: Vec<Cycle> = rings.into_iter().skip(1).collect();

    while !remaining.is_empty() {
        // Prefer the ring sharing the most drawn vertices.
        let (idx, _) = remaining
            .iter()
            .enumerate()
            .max_by_key(|(_, r)| {
                r.vertices
                    .iter()
                    .filter(|&&v| block.vertex_state(v).is_drawn())
                    .count()
            })
            .ok_or(Error::InconsistentState("ring queue empty"))?;
        let ring = remaining.remove(idx);
        if ring.vertices.iter().all(|&v| block.vertex_state(v).is_drawn()) {
            for &e in &ring.edges {
                if !block.edge_state(e).is_drawn() {
                    block.set_edge_state(e, DrawnState::Drawn);
                }
            }
            continue;
        }
        fuse_ring(block, &ring, options, rng)?;
        border::mark_states_from_geometry(block);
    }

    // Any block edge not on a basis ring (chords) still needs drawing.
    border::resolve_crossing_edges(block);
    border::mark_states_from_geometry(block);
    if block
        .graph()
        .edges()
        .any(|e| block.edge_state(e) == DrawnState::NonPlanar)
    {
        border::build_outline(block);
    }
    Ok(())
}

/// Regular polygon with unit edges; first two vertices at (0,0) and (1,0).
fn place_first_ring(block: &mut LayoutGraph, ring: &Cycle) {
    let n = ring.len();
    let interior = std::f64::consts::PI * (n as f64 - 2.0) / n as f64;
    let turn = std::f64::consts::PI - interior;
    let mut pos = Vec2::zeros();
    let mut dir = 0.0f64;
    for (i, &v) in ring.vertices.iter().enumerate() {
        block.set_pos(v, pos);
        block.set_vertex_state(v, DrawnState::Boundary);
        pos += Vec2::new(dir.cos(), dir.sin());
        if i + 1 < n {
            dir += turn;
        }
    }
    for &e in &ring.edges {
        block.set_edge_state(e, DrawnState::Boundary);
    }
}

/// The fusion cascade: outside, inside, inside at 0.75 edge length, outside
/// stretched, finally accepting crossings.
fn fuse_ring(
    block: &mut LayoutGraph,
    ring: &Cycle,
    options: &LayoutOptions,
    rng: &mut SeededRng,
) -> Result<()> {
    let attempts: [(bool, f64, bool); 5] = [
        (true, 1.0, false),
        (false, 1.0, false),
        (false, 0.75, false),
        (true, options.stretch_factor, false),
        (true, 1.0, true),
    ];
    for &(outside, length, allow_crossings) in &attempts {
        if try_fuse(block, ring, outside, length, allow_crossings, rng)? {
            return Ok(());
        }
    }
    Err(Error::InconsistentState("ring could not be fused"))
}

/// One fusion attempt. Finds the maximal chain of consecutive drawn ring
/// vertices, then places the rest on a circular arc on the requested side.
fn try_fuse(
    block: &mut LayoutGraph,
    ring: &Cycle,
    outside: bool,
    length: f64,
    allow_crossings: bool,
    rng: &mut SeededRng,
) -> Result<bool> {
    let n = ring.len();
    let drawn: Vec<bool> = ring
        .vertices
        .iter()
        .map(|&v| block.vertex_state(v).is_drawn())
        .collect();
    let drawn_count = drawn.iter().filter(|&&d| d).count();
    if drawn_count == 0 {
        return Err(Error::InconsistentState("fusing a fully undrawn ring"));
    }

    // Longest run of consecutive drawn ring vertices (cyclically).
    let mut best_start = 0;
    let mut best_len = 0;
    for s in 0..n {
        if drawn[s] && !drawn[(s + n - 1) % n] {
            let mut l = 0;
            while l < n && drawn[(s + l) % n] {
                l += 1;
            }
            if l > best_len {
                best_len = l;
                best_start = s;
            }
        }
    }
    if best_len == 0 {
        // All drawn vertices isolated; anchor on any single one.
        best_start = drawn.iter().position(|&d| d).unwrap_or(0);
        best_len = 1;
    }
    if best_len == n {
        return Ok(true);
    }

    let chain_end = (best_start + best_len - 1) % n;
    let a_ring = chain_end;
    let b_ring = best_start;
    let a = ring.vertices[a_ring];
    let b = ring.vertices[b_ring];
    let undrawn_count = n - best_len;
    let pa = block.pos(a);
    let pb = block.pos(b);

    // The walked border polygon gives the inside/outside probes a coherent
    // boundary; when the walk fails the raw boundary segments stand in.
    let border_poly: Option<Vec<Vec2>> = border::border_cycle(block)
        .ok()
        .map(|(vs, _)| vs.iter().map(|&v| block.pos(v)).collect());

    let new_positions = if best_len == 1 {
        // Single anchor: hang a regular polygon off the widest free gap.
        let (_, dir_a, dir_b) = border::free_angle_at(block, a, rng);
        let bisector = (dir_a + dir_b).try_normalize(1e-9).unwrap_or(Vec2::new(1.0, 0.0));
        polygon_from_anchor(pa, bisector, n, length)
    } else {
        let side = if outside { 1.0 } else { -1.0 };
        let side = side
            * chain_side_sign(block, ring, best_start, best_len, border_poly.as_deref(), rng);
        match arc_positions(pa, pb, undrawn_count, length, side) {
            Some(p) => p,
            None => return Ok(false),
        }
    };

    if !allow_crossings
        && !placement_is_clear(
            block,
            ring,
            a,
            b,
            &new_positions,
            outside,
            border_poly.as_deref(),
            rng,
        )
    {
        return Ok(false);
    }

    let mut k = 0;
    for off in best_len..n {
        let v = ring.vertices[(best_start + off) % n];
        if !block.vertex_state(v).is_drawn() {
            block.set_pos(v, new_positions[k]);
            block.set_vertex_state(v, DrawnState::Boundary);
            k += 1;
        }
    }
    for &e in &ring.edges {
        if !block.edge_state(e).is_drawn() {
            let (x, y) = block.graph().edge_endpoints(e);
            if block.vertex_state(x).is_drawn() && block.vertex_state(y).is_drawn() {
                block.set_edge_state(e, DrawnState::Boundary);
            }
        }
    }
    Ok(true)
}

/// Sign flipping `outside` so that "outside" means away from the drawn
/// region: probes a point to the arc's positive side.
fn chain_side_sign(
    block: &LayoutGraph,
    ring: &Cycle,
    start: usize,
    len: usize,
    border_poly: Option<&[Vec2]>,
    rng: &mut SeededRng,
) -> f64 {
    let n = ring.len();
    let a = block.pos(ring.vertices[(start + len - 1) % n]);
    let b = block.pos(ring.vertices[start]);
    let mid = (a + b) * 0.5;
    let chord = b - a;
    if chord.norm() < geom::RAY_EPS {
        return 1.0;
    }
    let probe = mid + chord.normalize().normal() * 0.5;
    let mut rng2 = rng.clone();
    if probe_is_outside(block, border_poly, probe, &mut rng2) {
        1.0
    } else {
        -1.0
    }
}

/// Outside test against the walked border polygon when one is available,
/// with the raw boundary segments as the fallback.
fn probe_is_outside(
    block: &LayoutGraph,
    border_poly: Option<&[Vec2]>,
    p: Vec2,
    rng: &mut SeededRng,
) -> bool {
    match border_poly {
        Some(poly) => border::is_point_outside_cycle_ex(poly, p, rng),
        None => border::is_point_outside(block, p, rng),
    }
}

/// `count` points on the circular arc from `a` to `b` with equal chords of
/// length `l`, on side `side` (+1 = left of a→b). `None` when unreachable.
pub fn arc_positions(a: Vec2, b: Vec2, count: usize, l: f64, side: f64) -> Option<Vec<Vec2>> {
    let d = (b - a).norm();
    let k = count + 1;
    if d < geom::RAY_EPS || (k as f64) * l <= d {
        return None;
    }
    // chord(alpha) = d * sin(alpha / k) / sin(alpha) is increasing on (0, π).
    let chord = |alpha: f64| d * (alpha / k as f64).sin() / alpha.sin();
    let mut lo = 1e-6;
    let mut hi = std::f64::consts::PI - 1e-6;
    if chord(hi) < l {
        return None;
    }
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        if chord(mid) < l {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let alpha = 0.5 * (lo + hi);
    let r = d / (2.0 * alpha.sin());

    // Chord frame: a at origin, b on +x. Arc bulges to +y; mirror at the
    // end for the other side.
    let m = d / (2.0 * alpha.tan());
    let center = Vec2::new(d / 2.0, -m);
    let theta_a = (Vec2::new(0.0, 0.0) - center).polar_angle();
    let step = 2.0 * alpha / k as f64;
    let mut out = Vec::with_capacity(count);
    for i in 1..=count {
        let theta = theta_a - step * i as f64;
        let p_local = center + Vec2::new(theta.cos(), theta.sin()) * r;
        let p_local = if side < 0.0 {
            Vec2::new(p_local.x, -p_local.y)
        } else {
            p_local
        };
        let rot = (b - a).polar_angle();
        out.push(a + p_local.rotated(rot));
    }
    Some(out)
}

/// Positions of a regular `n`-gon hanging off a single anchor along
/// `bisector`, anchor excluded.
fn polygon_from_anchor(anchor: Vec2, bisector: Vec2, n: usize, l: f64) -> Vec<Vec2> {
    let radius = l * 0.5 / (std::f64::consts::PI / n as f64).sin();
    let center = anchor + bisector * radius;
    let base = (anchor - center).polar_angle();
    (1..n)
        .map(|i| {
            let theta = base + std::f64::consts::TAU * i as f64 / n as f64;
            center + Vec2::new(theta.cos(), theta.sin()) * radius
        })
        .collect()
}

/// Rejects placements whose vertices fall on the wrong side of the border,
/// land on a drawn edge, or whose new edges cross drawn ones.
fn placement_is_clear(
    block: &LayoutGraph,
    ring: &Cycle,
    chain_a: usize,
    chain_b: usize,
    new_positions: &[Vec2],
    outside: bool,
    border_poly: Option<&[Vec2]>,
    rng: &mut SeededRng,
) -> bool {
    for &p in new_positions {
        if probe_is_outside(block, border_poly, p, rng) != outside {
            return false;
        }
        for v in block.graph().vertices() {
            if block.vertex_state(v).is_drawn()
                && !ring.contains_vertex(v)
                && (block.pos(v) - p).norm() < 0.5
            {
                return false;
            }
        }
        for e in block.graph().edges() {
            if !block.edge_state(e).is_drawn() {
                continue;
            }
            let (x, y) = block.graph().edge_endpoints(e);
            if geom::point_on_edge(p, block.pos(x), block.pos(y)) {
                return false;
            }
        }
    }
    // Walk the new path and test each segment against drawn edges.
    let mut path = vec![block.pos(chain_a)];
    path.extend_from_slice(new_positions);
    path.push(block.pos(chain_b));
    for pair in path.windows(2) {
        for e in block.graph().edges() {
            if !block.edge_state(e).is_drawn() {
                continue;
            }
            let (x, y) = block.graph().edge_endpoints(e);
            if matches!(
                geom::classify_intersection(pair[0], pair[1], block.pos(x), block.pos(y)),
                geom::SegCross::Interior | geom::SegCross::Overlap
            ) {
                return false;
            }
        }
    }
    true
}
