//! Boundary machinery: ray-cast outside tests, the border walk, drawn-state
//! marking from geometry, crossing-edge resolution and outline extraction.

use tracing::trace;

use crate::error::{Error, Result};
use crate::geom::{self, SegCross, Vec2, Vec2Ext};
use crate::model::{DrawnState, LayoutGraph};
use crate::rand::SeededRng;

/// Orthogonal nudge applied when resolving crossing edges.
pub const CROSSING_SHIFT: f64 = 0.2;
/// A ray passing closer than this to a boundary vertex is re-rolled.
const NEAR_VERTEX: f64 = 0.1;
/// Direction components smaller than this are re-rolled as degenerate.
const NEAR_AXIS: f64 = 0.01;
const MAX_ROLLS: usize = 100;

/// Boundary segments used by the outside test: the outline polygon when one
/// is present, otherwise every `Boundary` edge.
fn boundary_segments(lg: &LayoutGraph) -> Vec<(Vec2, Vec2)> {
    if let Some(outline) = lg.outline() {
        let n = outline.len();
        return (0..n).map(|i| (outline[i], outline[(i + 1) % n])).collect();
    }
    lg.graph()
        .edges()
        .filter(|&e| lg.edge_state(e) == DrawnState::Boundary)
        .map(|e| {
            let (a, b) = lg.graph().edge_endpoints(e);
            (lg.pos(a), lg.pos(b))
        })
        .collect()
}

fn outside_of_segments(segments: &[(Vec2, Vec2)], p: Vec2, rng: &mut SeededRng) -> bool {
    if segments.is_empty() {
        return true;
    }
    'roll: for _ in 0..MAX_ROLLS {
        let dir = Vec2::new(rng.next_signed(), rng.next_signed());
        if dir.x.abs() < NEAR_AXIS || dir.y.abs() < NEAR_AXIS {
            continue;
        }
        let dir = dir.normalize();
        let mut hits = 0usize;
        for &(a, b) in segments {
            // Reject rays grazing a boundary vertex.
            for v in [a, b] {
                let t = (v - p).dot(&dir);
                if t > 0.0 && (v - (p + dir * t)).norm() < NEAR_VERTEX {
                    continue 'roll;
                }
            }
            match geom::ray_hits_segment(p, dir, a, b) {
                Some(true) => hits += 1,
                Some(false) => {}
                None => continue 'roll,
            }
        }
        return hits % 2 == 0;
    }
    false
}

/// Whether `p` lies outside the drawn boundary of `lg`.
pub fn is_point_outside(lg: &LayoutGraph, p: Vec2, rng: &mut SeededRng) -> bool {
    outside_of_segments(&boundary_segments(lg), p, rng)
}

/// Whether `p` lies outside the closed polygon `cycle`.
pub fn is_point_outside_cycle(cycle: &[Vec2], p: Vec2, rng: &mut SeededRng) -> bool {
    let n = cycle.len();
    let segments: Vec<_> = (0..n).map(|i| (cycle[i], cycle[(i + 1) % n])).collect();
    outside_of_segments(&segments, p, rng)
}

/// Cycle variant with escalating precision: several independent probes,
/// majority vote.
pub fn is_point_outside_cycle_ex(cycle: &[Vec2], p: Vec2, rng: &mut SeededRng) -> bool {
    let mut outside = 0usize;
    let tries = 5;
    for _ in 0..tries {
        if is_point_outside_cycle(cycle, p, rng) {
            outside += 1;
        }
    }
    outside * 2 > tries
}

/// Walks the `Boundary` edges of a drawn component into the closed border
/// cycle. Fails with `CorruptedBorder` when the walk gets stuck or runs
/// longer than the edge count allows.
pub fn border_cycle(lg: &LayoutGraph) -> Result<(Vec<usize>, Vec<usize>)> {
    let start = lg
        .graph()
        .vertices()
        .filter(|&v| lg.vertex_state(v) == DrawnState::Boundary)
        .min_by(|&a, &b| {
            lg.pos(a)
                .y
                .partial_cmp(&lg.pos(b).y)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or(Error::CorruptedBorder)?;

    let mut vertices = vec![start];
    let mut edges = Vec::new();
    let mut prev_edge = usize::MAX;
    let mut v = start;
    loop {
        let mut next: Option<(usize, usize)> = None;
        for &(w, e) in lg.graph().neighbors(v) {
            if e == prev_edge || lg.edge_state(e) != DrawnState::Boundary {
                continue;
            }
            if next.is_none() {
                next = Some((w, e));
            } else {
                // More than one continuation: pick by the walk rule below.
                next = None;
                break;
            }
        }
        let (w, e) = match next {
            Some(n) => n,
            // Branching border: fall back to the geometric face walk.
            None => pick_boundary_continuation(lg, v, prev_edge).ok_or(Error::CorruptedBorder)?,
        };
        edges.push(e);
        if w == start {
            break;
        }
        vertices.push(w);
        prev_edge = e;
        v = w;
        if edges.len() > lg.edge_count() {
            return Err(Error::CorruptedBorder);
        }
    }
    canonize_walk(&mut vertices, &mut edges);
    Ok((vertices, edges))
}

fn pick_boundary_continuation(
    lg: &LayoutGraph,
    v: usize,
    prev_edge: usize,
) -> Option<(usize, usize)> {
    let rev = if prev_edge == usize::MAX {
        std::f64::consts::PI
    } else {
        let u = lg.graph().other_end(prev_edge, v);
        (lg.pos(u) - lg.pos(v)).polar_angle()
    };
    lg.graph()
        .neighbors(v)
        .iter()
        .filter(|&&(_, e)| e != prev_edge && lg.edge_state(e) == DrawnState::Boundary)
        .min_by(|&&(w1, _), &&(w2, _)| {
            let a1 = ccw_from(rev, (lg.pos(w1) - lg.pos(v)).polar_angle());
            let a2 = ccw_from(rev, (lg.pos(w2) - lg.pos(v)).polar_angle());
            a1.partial_cmp(&a2).unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied()
}

fn ccw_from(from: f64, to: f64) -> f64 {
    let mut a = to - from;
    while a <= 1e-9 {
        a += std::f64::consts::TAU;
    }
    a
}

fn canonize_walk(vertices: &mut Vec<usize>, edges: &mut Vec<usize>) {
    let n = vertices.len();
    if n == 0 {
        return;
    }
    let start = (0..n).min_by_key(|&i| vertices[i]).unwrap_or(0);
    vertices.rotate_left(start);
    edges.rotate_left(start);
    if vertices[n - 1] < vertices[1 % n] {
        vertices[1..].reverse();
        edges.reverse();
    }
}

/// Recomputes `Internal`/`Boundary` states of a fully positioned graph from
/// its geometry: the outer face walk becomes the boundary, everything else
/// drawn becomes internal. `NonPlanar` and `Ignore` elements keep their
/// state.
pub fn mark_states_from_geometry(lg: &mut LayoutGraph) {
    let walkable = |lg: &LayoutGraph, e: usize| {
        let (a, b) = lg.graph().edge_endpoints(e);
        lg.edge_state(e).is_drawn()
            && lg.edge_state(e) != DrawnState::NonPlanar
            && lg.edge_state(e) != DrawnState::Ignore
            && lg.vertex_state(a).is_drawn()
            && lg.vertex_state(b).is_drawn()
    };
    let Some(start) = lg
        .graph()
        .vertices()
        .filter(|&v| {
            lg.vertex_state(v).is_drawn()
                && lg.vertex_state(v) != DrawnState::Ignore
                && lg.graph().neighbors(v).iter().any(|&(_, e)| walkable(lg, e))
        })
        .min_by(|&a, &b| {
            (lg.pos(a).y, lg.pos(a).x)
                .partial_cmp(&(lg.pos(b).y, lg.pos(b).x))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    else {
        return;
    };

    // Outer face walk: at each vertex take the edge with minimum CCW angle
    // from the reversed incoming direction.
    let mut border_edges = vec![false; lg.edge_count()];
    let mut border_vertices = vec![false; lg.vertex_count()];
    border_vertices[start] = true;
    let mut v = start;
    let mut prev_edge = usize::MAX;
    let mut steps = 0usize;
    loop {
        let rev = if prev_edge == usize::MAX {
            // Entering the lowest vertex as if walking along −x keeps the
            // first pick on the outer face.
            std::f64::consts::PI
        } else {
            let u = lg.graph().other_end(prev_edge, v);
            (lg.pos(u) - lg.pos(v)).polar_angle()
        };
        let next = lg
            .graph()
            .neighbors(v)
            .iter()
            .filter(|&&(_, e)| walkable(lg, e) && (e != prev_edge || lg.graph().degree(v) == 1))
            .min_by(|&&(w1, _), &&(w2, _)| {
                let a1 = ccw_from(rev, (lg.pos(w1) - lg.pos(v)).polar_angle());
                let a2 = ccw_from(rev, (lg.pos(w2) - lg.pos(v)).polar_angle());
                a1.partial_cmp(&a2).unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied();
        let Some((w, e)) = next else { break };
        border_edges[e] = true;
        border_vertices[w] = true;
        prev_edge = e;
        v = w;
        steps += 1;
        if (v == start && steps > 1) || steps > 2 * lg.edge_count() {
            break;
        }
    }

    for e in lg.graph().edges() {
        if !walkable(lg, e) {
            continue;
        }
        let state = if border_edges[e] {
            DrawnState::Boundary
        } else {
            DrawnState::Internal
        };
        lg.set_edge_state(e, state);
    }
    for v in lg.graph().vertices() {
        if !lg.vertex_state(v).is_drawn() || lg.vertex_state(v) == DrawnState::Ignore {
            continue;
        }
        let state = if border_vertices[v] {
            DrawnState::Boundary
        } else {
            DrawnState::Internal
        };
        lg.set_vertex_state(v, state);
    }
}

/// Draws every undrawn edge whose endpoints are both drawn, shifting the
/// offending geometry by a small orthogonal epsilon until the segment can
/// be placed, then marks it `NonPlanar`.
pub fn resolve_crossing_edges(lg: &mut LayoutGraph) {
    loop {
        let Some(edge) = lg.graph().edges().find(|&e| {
            let (a, b) = lg.graph().edge_endpoints(e);
            !lg.edge_state(e).is_drawn()
                && lg.vertex_state(a).is_drawn()
                && lg.vertex_state(b).is_drawn()
        }) else {
            return;
        };
        let mut guard = 0;
        loop {
            let (a, b) = lg.graph().edge_endpoints(edge);
            let (pa, pb) = (lg.pos(a), lg.pos(b));
            let crossing = lg.graph().edges().find_map(|other| {
                if other == edge || !lg.edge_state(other).is_drawn() {
                    return None;
                }
                let (c, d) = lg.graph().edge_endpoints(other);
                if c == a || c == b || d == a || d == b {
                    return None;
                }
                let kind = geom::classify_intersection(pa, pb, lg.pos(c), lg.pos(d));
                kind.is_touching().then_some((other, kind))
            });
            let Some((other, kind)) = crossing else { break };
            trace!(edge, other, ?kind, "shifting to resolve crossing");
            match kind {
                SegCross::SecondEndpointOnFirst(_) => shift_edge(lg, other, CROSSING_SHIFT),
                _ => shift_edge(lg, edge, CROSSING_SHIFT),
            }
            guard += 1;
            if guard > 50 {
                break;
            }
        }
        lg.set_edge_state(edge, DrawnState::NonPlanar);
        let (a, b) = lg.graph().edge_endpoints(edge);
        for v in [a, b] {
            if lg.vertex_state(v) == DrawnState::Boundary {
                lg.set_vertex_state(v, DrawnState::NonPlanar);
            }
        }
    }
}

/// Moves both endpoints of `edge` orthogonally to it by `delta`.
fn shift_edge(lg: &mut LayoutGraph, edge: usize, delta: f64) {
    let (a, b) = lg.graph().edge_endpoints(edge);
    let dir = lg.pos(b) - lg.pos(a);
    if dir.norm() < geom::RAY_EPS {
        lg.set_pos(a, lg.pos(a) + Vec2::new(delta, 0.0));
        return;
    }
    let shift = dir.normalize().normal() * delta;
    lg.set_pos(a, lg.pos(a) + shift);
    lg.set_pos(b, lg.pos(b) + shift);
}

/// Builds a simple closed polygon usable for outside tests when the raw
/// border is unreliable (the component has crossings): walk the outer face
/// over *geometry*, inserting segment intersection points and continuing
/// along the crossing edge.
pub fn build_outline(lg: &mut LayoutGraph) {
    let segments: Vec<(Vec2, Vec2)> = lg
        .graph()
        .edges()
        .filter(|&e| lg.edge_state(e).is_drawn())
        .map(|e| {
            let (a, b) = lg.graph().edge_endpoints(e);
            (lg.pos(a), lg.pos(b))
        })
        .collect();
    if segments.is_empty() {
        lg.set_outline(None);
        return;
    }

    // Split every segment at its crossings, then walk the planar outer face
    // of the resulting arrangement.
    let mut points: Vec<Vec2> = Vec::new();
    let push_point = |points: &mut Vec<Vec2>, p: Vec2| -> usize {
        for (i, &q) in points.iter().enumerate() {
            if (q - p).norm() < 1e-6 {
                return i;
            }
        }
        points.push(p);
        points.len() - 1
    };
    let mut arcs: Vec<(usize, usize)> = Vec::new();
    for (i, &(a, b)) in segments.iter().enumerate() {
        let mut cuts = vec![0.0f64, 1.0];
        for (j, &(c, d)) in segments.iter().enumerate() {
            if i == j {
                continue;
            }
            if let Some(x) = geom::line_intersection(a, b, c, d) {
                let ab = b - a;
                let t = (x - a).dot(&ab) / ab.norm_squared();
                let cd = d - c;
                let s = (x - c).dot(&cd) / cd.norm_squared();
                if t > 1e-6 && t < 1.0 - 1e-6 && s > -1e-6 && s < 1.0 + 1e-6 {
                    cuts.push(t);
                }
            }
        }
        cuts.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
        cuts.dedup_by(|x, y| (*x - *y).abs() < 1e-9);
        for pair in cuts.windows(2) {
            let p = a + (b - a) * pair[0];
            let q = a + (b - a) * pair[1];
            let pi = push_point(&mut points, p);
            let qi = push_point(&mut points, q);
            if pi != qi {
                arcs.push((pi, qi));
            }
        }
    }

    // Adjacency over the arrangement.
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); points.len()];
    for &(p, q) in &arcs {
        if !adj[p].contains(&q) {
            adj[p].push(q);
        }
        if !adj[q].contains(&p) {
            adj[q].push(p);
        }
    }

    let start = (0..points.len())
        .min_by(|&a, &b| {
            (points[a].y, points[a].x)
                .partial_cmp(&(points[b].y, points[b].x))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);

    let mut outline = vec![points[start]];
    let mut v = start;
    let mut rev = std::f64::consts::PI;
    let mut steps = 0;
    loop {
        let next = adj[v]
            .iter()
            .min_by(|&&w1, &&w2| {
                let a1 = ccw_from(rev, (points[w1] - points[v]).polar_angle());
                let a2 = ccw_from(rev, (points[w2] - points[v]).polar_angle());
                a1.partial_cmp(&a2).unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied();
        let Some(w) = next else { break };
        if w == start {
            break;
        }
        outline.push(points[w]);
        rev = (points[v] - points[w]).polar_angle();
        v = w;
        steps += 1;
        if steps > 2 * arcs.len() + 2 {
            break;
        }
    }
    if outline.len() >= 3 {
        lg.set_outline(Some(outline));
    } else {
        lg.set_outline(None);
    }
}

/// Interior angle of the drawn region at `vertex`, with the two outward
/// directions bounding it: polar-sort the drawn edges and probe each gap's
/// midpoint with the outside test; the widest outside gap is the free
/// angle. Returns `(free_angle, dir_a, dir_b)`.
pub fn free_angle_at(lg: &LayoutGraph, vertex: usize, rng: &mut SeededRng) -> (f64, Vec2, Vec2) {
    let p = lg.pos(vertex);
    let mut angles: Vec<f64> = lg
        .graph()
        .neighbors(vertex)
        .iter()
        .filter(|&&(w, e)| lg.vertex_state(w).is_drawn() && lg.edge_state(e).is_drawn())
        .map(|&(w, _)| (lg.pos(w) - p).polar_angle())
        .collect();
    if angles.is_empty() {
        return (std::f64::consts::TAU, Vec2::new(1.0, 0.0), Vec2::new(1.0, 0.0));
    }
    if angles.len() == 1 {
        let d = Vec2::new(angles[0].cos(), angles[0].sin());
        return (std::f64::consts::TAU, d, d);
    }
    angles.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut best: Option<(f64, f64)> = None;
    for i in 0..angles.len() {
        let a = angles[i];
        let b = angles[(i + 1) % angles.len()];
        let width = ccw_from(a, b);
        let mid = a + width / 2.0;
        let probe = p + Vec2::new(mid.cos(), mid.sin()) * 0.2;
        if !is_point_outside(lg, probe, rng) {
            continue;
        }
        if best.map(|(w, _)| width > w).unwrap_or(true) {
            best = Some((width, a));
        }
    }
    let (width, a) = best.unwrap_or_else(|| {
        // Fully internal vertex: fall back to the widest gap regardless.
        let mut w_best = (0.0, angles[0]);
        for i in 0..angles.len() {
            let a = angles[i];
            let b = angles[(i + 1) % angles.len()];
            let width = ccw_from(a, b);
            if width > w_best.0 {
                w_best = (width, a);
            }
        }
        w_best
    });
    let dir_a = Vec2::new(a.cos(), a.sin());
    let end = a + width;
    let dir_b = Vec2::new(end.cos(), end.sin());
    (width, dir_a, dir_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::{BondOrder, Molecule};

    fn square_graph() -> LayoutGraph {
        let mut m = Molecule::new();
        for _ in 0..4 {
            m.add_atom();
        }
        for i in 0..4 {
            m.add_bond(i, (i + 1) % 4, BondOrder::Single);
        }
        let mut lg = LayoutGraph::from_molecule(&m, None);
        let coords = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        for (v, &c) in coords.iter().enumerate() {
            lg.set_pos(v, c);
            lg.set_vertex_state(v, DrawnState::Boundary);
        }
        for e in 0..4 {
            lg.set_edge_state(e, DrawnState::Boundary);
        }
        lg
    }

    #[test]
    fn point_outside_test_agrees_with_square_geometry() {
        let lg = square_graph();
        let mut rng = SeededRng::new(1);
        assert!(!is_point_outside(&lg, Vec2::new(0.5, 0.5), &mut rng));
        assert!(is_point_outside(&lg, Vec2::new(2.0, 0.5), &mut rng));
        assert!(is_point_outside(&lg, Vec2::new(-1.0, -1.0), &mut rng));
    }

    #[test]
    fn border_walk_recovers_the_square() {
        let lg = square_graph();
        let (vertices, edges) = border_cycle(&lg).expect("border");
        assert_eq!(vertices.len(), 4);
        assert_eq!(edges.len(), 4);
        assert_eq!(vertices[0], 0);
    }

    #[test]
    fn open_boundary_path_corrupts_the_border_walk() {
        // Boundary edges forming a path instead of a cycle: the walk runs
        // off the end and must report corruption, not spin or panic.
        let mut m = Molecule::new();
        for _ in 0..3 {
            m.add_atom();
        }
        m.add_bond(0, 1, BondOrder::Single);
        m.add_bond(1, 2, BondOrder::Single);
        let mut lg = LayoutGraph::from_molecule(&m, None);
        lg.set_pos(0, Vec2::new(0.0, 0.0));
        lg.set_pos(1, Vec2::new(1.0, 0.1));
        lg.set_pos(2, Vec2::new(2.0, 0.0));
        for v in 0..3 {
            lg.set_vertex_state(v, DrawnState::Boundary);
        }
        lg.set_edge_state(0, DrawnState::Boundary);
        lg.set_edge_state(1, DrawnState::Boundary);
        assert!(matches!(border_cycle(&lg), Err(Error::CorruptedBorder)));
    }

    #[test]
    fn mark_states_separates_boundary_from_internal() {
        // Square with a center vertex connected to all corners.
        let mut m = Molecule::new();
        for _ in 0..5 {
            m.add_atom();
        }
        for i in 0..4 {
            m.add_bond(i, (i + 1) % 4, BondOrder::Single);
        }
        for i in 0..4 {
            m.add_bond(4, i, BondOrder::Single);
        }
        let mut lg = LayoutGraph::from_molecule(&m, None);
        let coords = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(0.5, 0.5),
        ];
        for (v, &c) in coords.iter().enumerate() {
            lg.set_pos(v, c);
            lg.set_vertex_state(v, DrawnState::Drawn);
        }
        for e in 0..lg.edge_count() {
            lg.set_edge_state(e, DrawnState::Drawn);
        }
        mark_states_from_geometry(&mut lg);
        for v in 0..4 {
            assert_eq!(lg.vertex_state(v), DrawnState::Boundary, "corner {v}");
        }
        assert_eq!(lg.vertex_state(4), DrawnState::Internal);
        for e in 0..4 {
            assert_eq!(lg.edge_state(e), DrawnState::Boundary, "side {e}");
        }
        for e in 4..8 {
            assert_eq!(lg.edge_state(e), DrawnState::Internal, "spoke {e}");
        }
    }

    #[test]
    fn crossing_edge_ends_up_non_planar() {
        // A 4-cycle drawn as an hourglass: the closing edge must cross.
        let mut m = Molecule::new();
        for _ in 0..4 {
            m.add_atom();
        }
        m.add_bond(0, 1, BondOrder::Single);
        m.add_bond(1, 2, BondOrder::Single);
        m.add_bond(2, 3, BondOrder::Single);
        m.add_bond(3, 0, BondOrder::Single);
        let mut lg = LayoutGraph::from_molecule(&m, None);
        let coords = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        for (v, &c) in coords.iter().enumerate() {
            lg.set_pos(v, c);
            lg.set_vertex_state(v, DrawnState::Boundary);
        }
        // Edge 2 joins (1,0) and (0,1) and must cross edge 0 at the center.
        for e in [0, 1, 3] {
            lg.set_edge_state(e, DrawnState::Boundary);
        }
        resolve_crossing_edges(&mut lg);
        assert_eq!(lg.edge_state(2), DrawnState::NonPlanar);
    }
}
