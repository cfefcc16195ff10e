//! Attaching new geometry to a drawn vertex: energy-ranked dangling-vertex
//! placement, the "two ears" special case, and the permutation search that
//! orders several undrawn components around one hub.

use tracing::trace;

use crate::LayoutOptions;
use crate::engine::border;
use crate::error::{Error, Result};
use crate::geom::{Vec2, Vec2Ext};
use crate::model::{DrawnState, LayoutGraph};
use crate::molecule::{BondOrder, CisTrans, Molecule};
use crate::rand::SeededRng;

/// Ear opening angle used when one substituent matters and space is tight.
const EAR_ANGLE: f64 = 13.0 * std::f64::consts::PI / 24.0;
/// Repulsion below this distance saturates.
const MIN_R: f64 = 1e-4;

/// Inverse-square repulsion of a candidate point against every drawn atom;
/// charge grows with the normalized Morgan code.
fn slot_energy(lg: &LayoutGraph, p: Vec2, norm: f64) -> f64 {
    let mut energy = 0.0;
    for v in lg.graph().vertices() {
        if !lg.vertex_state(v).is_drawn() {
            continue;
        }
        let r2 = (lg.pos(v) - p).norm_squared();
        if r2 < MIN_R * MIN_R {
            return 1e20;
        }
        let charge = lg.morgan_code(v) as f64 / norm + 0.5;
        energy += charge / r2;
    }
    energy
}

fn code_norm(lg: &LayoutGraph) -> f64 {
    lg.graph()
        .vertices()
        .map(|v| lg.morgan_code(v) as f64)
        .fold(1.0f64, f64::max)
}

/// Places every undrawn neighbor of `vertex`. All incident blocks are
/// trivial, so the neighbors dangle freely around the hub.
pub fn attach_dangling(
    lg: &mut LayoutGraph,
    molecule: &Molecule,
    vertex: usize,
    rng: &mut SeededRng,
) -> Result<()> {
    let p = lg.pos(vertex);
    let drawn_dirs: Vec<f64> = lg
        .graph()
        .neighbors(vertex)
        .iter()
        .filter(|&&(w, e)| lg.vertex_state(w).is_drawn() && lg.edge_state(e).is_drawn())
        .map(|&(w, _)| (lg.pos(w) - p).polar_angle())
        .collect();
    let mut undrawn: Vec<(usize, usize)> = lg
        .graph()
        .neighbors(vertex)
        .iter()
        .copied()
        .filter(|&(w, _)| !lg.vertex_state(w).is_drawn())
        .collect();
    if undrawn.is_empty() {
        return Ok(());
    }
    // Highest Morgan code placed first.
    undrawn.sort_by_key(|&(w, _)| -lg.morgan_code(w));
    let k = undrawn.len();

    let mut ears = false;
    let slots: Vec<f64> = if drawn_dirs.is_empty() {
        (0..k)
            .map(|i| std::f64::consts::TAU * i as f64 / k as f64)
            .collect()
    } else if drawn_dirs.len() == 1 {
        let base = drawn_dirs[0];
        if is_straight_hub(lg, molecule, vertex) {
            vec![base + std::f64::consts::PI]
        } else if k == 3 && wants_ears(lg, molecule, vertex, &undrawn) {
            ears = true;
            vec![
                base + std::f64::consts::PI,
                base + std::f64::consts::PI - EAR_ANGLE,
                base + std::f64::consts::PI + EAR_ANGLE,
            ]
        } else if k == 1 {
            // Chain continuation bends at 120 degrees; the energy ranking
            // below picks the side, giving zig-zag chains for free.
            vec![
                base + 2.0 * std::f64::consts::FRAC_PI_3,
                base - 2.0 * std::f64::consts::FRAC_PI_3,
            ]
        } else {
            let phi = std::f64::consts::TAU / (k as f64 + 1.0);
            (1..=k).map(|i| base + phi * i as f64).collect()
        }
    } else if k == 1 {
        // Bisect the widest free gap between drawn edges.
        let (width, dir_a, _) = border::free_angle_at(lg, vertex, rng);
        vec![dir_a.polar_angle() + width / 2.0]
    } else {
        let (width, dir_a, _) = border::free_angle_at(lg, vertex, rng);
        let start = dir_a.polar_angle();
        let phi = width / (k as f64 + 1.0);
        (1..=k).map(|i| start + phi * i as f64).collect()
    };

    if slots.len() < k {
        return Err(Error::InconsistentState("fewer slots than dangling atoms"));
    }

    // Energy-rank the slots, best slot first.
    let norm = code_norm(lg);
    let mut ranked: Vec<(f64, f64)> = slots
        .iter()
        .map(|&a| {
            let candidate = p + Vec2::new(a.cos(), a.sin());
            (slot_energy(lg, candidate, norm), a)
        })
        .collect();
    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut placed: Vec<(usize, usize, f64)> = undrawn
        .iter()
        .zip(ranked.iter())
        .map(|(&(w, e), &(_, a))| (w, e, a))
        .collect();

    apply_parity_swap(lg, molecule, vertex, &drawn_dirs, &mut placed);

    for (i, &(w, e, a)) in placed.iter().enumerate() {
        lg.set_pos(w, p + Vec2::new(a.cos(), a.sin()));
        let state = if ears && i > 0 {
            DrawnState::Ignore
        } else {
            DrawnState::Boundary
        };
        lg.set_vertex_state(w, state);
        lg.set_edge_state(e, state);
    }
    Ok(())
}

/// Degree-2 hub whose incident bond orders sum to ≥ 4 draws as a straight
/// chain.
fn is_straight_hub(lg: &LayoutGraph, molecule: &Molecule, vertex: usize) -> bool {
    let nei = lg.graph().neighbors(vertex);
    nei.len() == 2
        && nei
            .iter()
            .map(|&(_, e)| molecule.bond_order(lg.edge(e).orig_idx).numeric())
            .sum::<u8>()
            >= 4
}

/// One drawn edge, three undrawn neighbors, exactly one of which carries
/// further substituents, and fewer than two double bonds at the hub.
fn wants_ears(
    lg: &LayoutGraph,
    molecule: &Molecule,
    vertex: usize,
    undrawn: &[(usize, usize)],
) -> bool {
    let mattering = undrawn
        .iter()
        .filter(|&&(w, _)| lg.graph().degree(w) > 1)
        .count();
    let doubles = lg
        .graph()
        .neighbors(vertex)
        .iter()
        .filter(|&&(_, e)| molecule.bond_order(lg.edge(e).orig_idx) == BondOrder::Double)
        .count();
    mattering == 1 && doubles < 2
}

/// When exactly two positions straddle a stereo-marked double bond, swap
/// them if the resulting parity is wrong.
fn apply_parity_swap(
    lg: &LayoutGraph,
    molecule: &Molecule,
    vertex: usize,
    drawn_dirs: &[f64],
    placed: &mut [(usize, usize, f64)],
) {
    if placed.len() != 2 || drawn_dirs.len() != 1 {
        return;
    }
    // The drawn edge must be a parity-marked double bond.
    let Some(&(other, bond)) = lg
        .graph()
        .neighbors(vertex)
        .iter()
        .find(|&&(w, e)| {
            lg.vertex_state(w).is_drawn()
                && molecule.bond_order(lg.edge(e).orig_idx) == BondOrder::Double
                && molecule.parity(lg.edge(e).orig_idx) != CisTrans::Unspecified
        })
    else {
        return;
    };
    let parity = molecule.parity(lg.edge(bond).orig_idx);
    // Reference substituent on the far side: the drawn neighbor of `other`
    // with the highest code (besides the hub itself).
    let Some(reference) = lg
        .graph()
        .neighbors(other)
        .iter()
        .filter(|&&(w, _)| w != vertex && lg.vertex_state(w).is_drawn())
        .max_by_key(|&&(w, _)| lg.morgan_code(w))
        .map(|&(w, _)| w)
    else {
        return;
    };
    let axis = lg.pos(vertex) - lg.pos(other);
    let ref_side = axis.perp(&(lg.pos(reference) - lg.pos(other))) > 0.0;
    // Higher-priority new substituent is placed[0].
    let new_dir = Vec2::new(placed[0].2.cos(), placed[0].2.sin());
    let new_side = axis.perp(&new_dir) > 0.0;
    let want_same = parity == CisTrans::Cis;
    if (ref_side == new_side) != want_same {
        let a0 = placed[0].2;
        placed[0].2 = placed[1].2;
        placed[1].2 = a0;
    }
}

/// One undrawn component queued for the attachment search: its laid-out
/// local graph, the hub's local id, and the interior angle it subtends.
pub struct AttachmentCandidate {
    pub block: LayoutGraph,
    pub local_hub: usize,
    pub angle: f64,
    /// Direction in the local frame where the block body starts (CCW).
    pub local_start: Vec2,
    pub size: usize,
}

impl AttachmentCandidate {
    pub fn new(block: LayoutGraph, local_hub: usize, rng: &mut SeededRng) -> Self {
        let (free, _, dir_b) = border::free_angle_at(&block, local_hub, rng);
        let angle = (std::f64::consts::TAU - free).max(0.0);
        let size = block.vertex_count();
        Self {
            block,
            local_hub,
            angle,
            local_start: dir_b,
            size,
        }
    }
}

/// Exhaustive swap-based permutation search over the undrawn components at
/// `hub`, ranked by total inverse-square repulsion. Past the permutation
/// cap the order falls back to descending component size.
pub fn attach_components(
    lg: &mut LayoutGraph,
    molecule: &Molecule,
    hub: usize,
    candidates: Vec<AttachmentCandidate>,
    options: &LayoutOptions,
    rng: &mut SeededRng,
) -> Result<()> {
    if candidates.is_empty() {
        return Ok(());
    }
    let (free, dir_a, _) = border::free_angle_at(lg, hub, rng);
    let gap_start = dir_a.polar_angle();

    let m = candidates.len();
    let mut order: Vec<usize> = (0..m).collect();
    let mut best: Option<(f64, Vec<usize>)> = None;

    if m > options.max_attachment_permutation {
        candidates_sorted_heuristic(&mut order, &candidates);
        best = Some((0.0, order.clone()));
    } else {
        let mut scratch = order.clone();
        permute(&mut scratch, 0, &mut |perm| {
            let energy = placement_energy(lg, hub, perm, &candidates, free, gap_start);
            let better = match &best {
                Some((e, _)) => energy < e - options.energy_margin,
                None => true,
            };
            if better {
                best = Some((energy, perm.to_vec()));
            }
        });
    }

    let (_, order) = best.ok_or(Error::InconsistentState("empty permutation search"))?;
    trace!(hub, components = m, "applying attachment order");
    let placements = lay_out_order(hub, &order, &candidates, free, gap_start, lg.pos(hub));
    for (ci, transform) in placements {
        apply_candidate(lg, &candidates[ci], transform);
    }
    mirror_for_parity(lg, molecule, hub);
    Ok(())
}

fn candidates_sorted_heuristic(order: &mut [usize], candidates: &[AttachmentCandidate]) {
    order.sort_by_key(|&i| std::cmp::Reverse(candidates[i].size));
}

fn permute(order: &mut Vec<usize>, depth: usize, visit: &mut dyn FnMut(&[usize])) {
    if depth == order.len() {
        visit(order);
        return;
    }
    for i in depth..order.len() {
        order.swap(depth, i);
        permute(order, depth + 1, visit);
        order.swap(depth, i);
    }
}

/// Rigid transform: rotation then translation.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub rotation: f64,
    pub hub_to: Vec2,
}

fn lay_out_order(
    _hub: usize,
    order: &[usize],
    candidates: &[AttachmentCandidate],
    free: f64,
    gap_start: f64,
    hub_pos: Vec2,
) -> Vec<(usize, Placement)> {
    let total: f64 = order.iter().map(|&i| candidates[i].angle).sum();
    let gaps = order.len() + 1;
    let alpha = ((free - total) / gaps as f64).max(0.0);
    let mut current = gap_start + alpha;
    let mut out = Vec::with_capacity(order.len());
    for &i in order {
        let c = &candidates[i];
        let rotation = current - c.local_start.polar_angle();
        out.push((
            i,
            Placement {
                rotation,
                hub_to: hub_pos,
            },
        ));
        current += c.angle + alpha;
    }
    out
}

fn transformed(c: &AttachmentCandidate, placement: Placement, local: Vec2) -> Vec2 {
    placement.hub_to + (local - c.block.pos(c.local_hub)).rotated(placement.rotation)
}

fn placement_energy(
    lg: &LayoutGraph,
    hub: usize,
    order: &[usize],
    candidates: &[AttachmentCandidate],
    free: f64,
    gap_start: f64,
) -> f64 {
    let placements = lay_out_order(hub, order, candidates, free, gap_start, lg.pos(hub));
    let norm = code_norm(lg);
    let mut energy = 0.0;
    let mut new_points: Vec<(Vec2, f64)> = Vec::new();
    for &(ci, placement) in &placements {
        let c = &candidates[ci];
        for v in c.block.graph().vertices() {
            if v == c.local_hub {
                continue;
            }
            let p = transformed(c, placement, c.block.pos(v));
            let q = c.block.morgan_code(v) as f64 / norm + 0.5;
            new_points.push((p, q));
        }
    }
    for (i, &(p, q)) in new_points.iter().enumerate() {
        energy += q * slot_energy(lg, p, norm);
        for &(p2, q2) in &new_points[i + 1..] {
            let r2 = (p2 - p).norm_squared();
            if r2 < MIN_R * MIN_R {
                return 1e20;
            }
            energy += q * q2 / r2;
        }
    }
    energy
}

fn apply_candidate(lg: &mut LayoutGraph, c: &AttachmentCandidate, placement: Placement) {
    for v in c.block.graph().vertices() {
        let parent = c.block.vertex(v).ext_idx;
        if lg.vertex_state(parent).is_drawn() {
            continue;
        }
        lg.set_pos(parent, transformed(c, placement, c.block.pos(v)));
        lg.set_vertex_state(parent, c.block.vertex_state(v));
    }
    for e in c.block.graph().edges() {
        let parent = c.block.edge(e).ext_idx;
        if !lg.edge_state(parent).is_drawn() {
            lg.set_edge_state(parent, c.block.edge_state(e));
        }
    }
}

/// If the hub sits on a stereo-marked double bond whose parity the chosen
/// placement violates, mirror the newly placed geometry across the bond
/// instead of re-running the search.
fn mirror_for_parity(lg: &mut LayoutGraph, molecule: &Molecule, hub: usize) {
    let Some(&(other, edge)) = lg.graph().neighbors(hub).iter().find(|&&(w, e)| {
        lg.vertex_state(w).is_drawn()
            && molecule.bond_order(lg.edge(e).orig_idx) == BondOrder::Double
            && molecule.parity(lg.edge(e).orig_idx) != CisTrans::Unspecified
    }) else {
        return;
    };
    let parity = molecule.parity(lg.edge(edge).orig_idx);
    let near = highest_drawn_substituent(lg, hub, other);
    let far = highest_drawn_substituent(lg, other, hub);
    let (Some(near), Some(far)) = (near, far) else {
        return;
    };
    let axis = lg.pos(hub) - lg.pos(other);
    let near_side = axis.perp(&(lg.pos(near) - lg.pos(other))) > 0.0;
    let far_side = axis.perp(&(lg.pos(far) - lg.pos(other))) > 0.0;
    let want_same = parity == CisTrans::Cis;
    if (near_side == far_side) == want_same {
        return;
    }
    // Mirror everything on the hub side of the bond across the bond axis.
    let origin = lg.pos(other);
    let dir = axis.try_normalize(1e-9).unwrap_or(Vec2::new(1.0, 0.0));
    let mut component = vec![false; lg.vertex_count()];
    collect_side(lg, hub, other, &mut component);
    for v in lg.graph().vertices() {
        if !component[v] || v == hub {
            continue;
        }
        let rel = lg.pos(v) - origin;
        let along = dir * rel.dot(&dir);
        lg.set_pos(v, origin + along * 2.0 - rel);
    }
}

fn highest_drawn_substituent(lg: &LayoutGraph, of: usize, except: usize) -> Option<usize> {
    lg.graph()
        .neighbors(of)
        .iter()
        .filter(|&&(w, _)| w != except && lg.vertex_state(w).is_drawn())
        .max_by_key(|&&(w, _)| lg.morgan_code(w))
        .map(|&(w, _)| w)
}

/// Drawn vertices reachable from `from` without passing through `barrier`.
fn collect_side(lg: &LayoutGraph, from: usize, barrier: usize, seen: &mut [bool]) {
    let mut stack = vec![from];
    seen[from] = true;
    while let Some(v) = stack.pop() {
        for &(w, _) in lg.graph().neighbors(v) {
            if w != barrier && !seen[w] && lg.vertex_state(w).is_drawn() {
                seen[w] = true;
                stack.push(w);
            }
        }
    }
}
