//! Pattern template library: known fragments with fixed coordinates,
//! matched against an undrawn block through a subgraph-isomorphism oracle.
//!
//! The registry is built once behind a `OnceLock` and treated as immutable
//! afterwards; callers receive it by reference. Only the matching step is
//! serialized, to keep a stateful oracle's scratch single-owner.

use std::sync::{Mutex, OnceLock};

use indexmap::IndexMap;
use nautilus_graphlib::{Graph, morgan_codes};

use crate::geom::{Vec2, Vec2Ext};
use crate::molecule::BondOrder;

/// One template: a fragment graph, its fixed coordinates, and the sort key
/// `(code, vertices + edges, vertices, edges)`.
#[derive(Debug, Clone)]
pub struct Template {
    pub graph: Graph,
    pub coords: Vec<Vec2>,
    /// Per-edge required bond order, `None` matching any.
    pub edge_orders: Vec<Option<BondOrder>>,
    pub code: i64,
    pub name: &'static str,
}

impl Template {
    fn new(name: &'static str, graph: Graph, coords: Vec<Vec2>) -> Self {
        let code = morgan_codes(&graph).iter().sum();
        let edge_orders = vec![None; graph.edge_count()];
        Self {
            graph,
            coords,
            edge_orders,
            code,
            name,
        }
    }

    fn key(&self) -> (i64, usize, usize, usize) {
        (
            self.code,
            self.graph.vertex_count() + self.graph.edge_count(),
            self.graph.vertex_count(),
            self.graph.edge_count(),
        )
    }
}

/// Finds one embedding of `pattern` into `target`, returning per-pattern-
/// vertex target ids, or `None`.
pub trait EmbeddingOracle {
    fn find_embedding(
        &self,
        pattern: &Graph,
        target: &Graph,
        vertex_ok: &dyn Fn(usize, usize) -> bool,
        edge_ok: &dyn Fn(usize, usize) -> bool,
    ) -> Option<Vec<usize>>;
}

/// Plain recursive backtracking matcher, sufficient for the small fragments
/// the registry holds.
#[derive(Debug, Default)]
pub struct BacktrackingMatcher;

impl EmbeddingOracle for BacktrackingMatcher {
    fn find_embedding(
        &self,
        pattern: &Graph,
        target: &Graph,
        vertex_ok: &dyn Fn(usize, usize) -> bool,
        edge_ok: &dyn Fn(usize, usize) -> bool,
    ) -> Option<Vec<usize>> {
        if pattern.vertex_count() > target.vertex_count()
            || pattern.edge_count() > target.edge_count()
        {
            return None;
        }
        let mut mapping = vec![usize::MAX; pattern.vertex_count()];
        let mut used = vec![false; target.vertex_count()];
        if extend(pattern, target, vertex_ok, edge_ok, &mut mapping, &mut used, 0) {
            Some(mapping)
        } else {
            None
        }
    }
}

fn extend(
    pattern: &Graph,
    target: &Graph,
    vertex_ok: &dyn Fn(usize, usize) -> bool,
    edge_ok: &dyn Fn(usize, usize) -> bool,
    mapping: &mut Vec<usize>,
    used: &mut Vec<bool>,
    depth: usize,
) -> bool {
    if depth == pattern.vertex_count() {
        return true;
    }
    'candidates: for t in target.vertices() {
        if used[t]
            || target.degree(t) < pattern.degree(depth)
            || !vertex_ok(depth, t)
        {
            continue;
        }
        // Every already-mapped pattern neighbor must be a target neighbor
        // through a compatible edge, and non-neighbors must stay apart.
        for &(pw, pe) in pattern.neighbors(depth) {
            if mapping[pw] == usize::MAX {
                continue;
            }
            match target.edge_between(t, mapping[pw]) {
                Some(te) if edge_ok(pe, te) => {}
                _ => continue 'candidates,
            }
        }
        for earlier in 0..depth {
            if pattern.edge_between(depth, earlier).is_none()
                && target.edge_between(t, mapping[earlier]).is_some()
            {
                continue 'candidates;
            }
        }
        mapping[depth] = t;
        used[t] = true;
        if extend(pattern, target, vertex_ok, edge_ok, mapping, used, depth + 1) {
            return true;
        }
        mapping[depth] = usize::MAX;
        used[t] = false;
    }
    false
}

/// The sorted template set, a key index over it, and the lock serializing
/// oracle access.
pub struct TemplateRegistry {
    templates: Vec<Template>,
    /// Template indices per lookup key, in key order.
    by_key: IndexMap<(i64, usize, usize, usize), Vec<usize>>,
    match_guard: Mutex<()>,
}

static REGISTRY: OnceLock<TemplateRegistry> = OnceLock::new();

/// The process-wide registry, built on first use.
pub fn global_registry() -> &'static TemplateRegistry {
    REGISTRY.get_or_init(TemplateRegistry::builtin)
}

impl TemplateRegistry {
    /// Builds the built-in set: regular polygons and a handful of fused
    /// ring systems, sorted by lookup key.
    pub fn builtin() -> Self {
        let mut templates = Vec::new();
        for n in 3..=8 {
            templates.push(Template::new("polygon", polygon_graph(n), polygon_coords(n)));
        }
        templates.push(fused_hexagons());
        templates.push(hexagon_pentagon());
        Self::from_templates(templates)
    }

    pub fn from_templates(mut templates: Vec<Template>) -> Self {
        templates.sort_by_key(|t| t.key());
        let mut by_key: IndexMap<(i64, usize, usize, usize), Vec<usize>> = IndexMap::new();
        for (i, t) in templates.iter().enumerate() {
            by_key.entry(t.key()).or_default().push(i);
        }
        Self {
            templates,
            by_key,
            match_guard: Mutex::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Indices of the templates whose key matches exactly.
    pub fn candidates(&self, code: i64, vertices: usize, edges: usize) -> &[usize] {
        let key = (code, vertices + edges, vertices, edges);
        self.by_key.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tries every key-matching template against `target`; on the first
    /// embedding, returns template coordinates per target vertex.
    ///
    /// `bond_order(target_edge)` feeds the edge compatibility callback.
    pub fn match_target(
        &self,
        target: &Graph,
        code: i64,
        oracle: &dyn EmbeddingOracle,
        bond_order: &dyn Fn(usize) -> BondOrder,
    ) -> Option<Vec<Vec2>> {
        let candidates = self.candidates(code, target.vertex_count(), target.edge_count());
        if candidates.is_empty() {
            return None;
        }
        let _guard = self
            .match_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for &ti in candidates {
            let template = &self.templates[ti];
            let edge_ok = |pe: usize, te: usize| match template.edge_orders[pe] {
                Some(required) => bond_order(te) == required,
                None => true,
            };
            if let Some(mapping) =
                oracle.find_embedding(&template.graph, target, &|_, _| true, &edge_ok)
            {
                let mut coords = vec![Vec2::zeros(); target.vertex_count()];
                for (pv, &tv) in mapping.iter().enumerate() {
                    coords[tv] = template.coords[pv];
                }
                return Some(coords);
            }
        }
        None
    }
}

fn polygon_graph(n: usize) -> Graph {
    let mut g = Graph::new();
    g.add_vertices(n);
    for i in 0..n {
        g.add_edge(i, (i + 1) % n);
    }
    g
}

/// Unit-edge regular polygon, first edge from the origin along +x.
fn polygon_coords(n: usize) -> Vec<Vec2> {
    let radius = 0.5 / (std::f64::consts::PI / n as f64).sin();
    let start = -std::f64::consts::FRAC_PI_2 - std::f64::consts::PI / n as f64;
    (0..n)
        .map(|i| {
            let a = start + std::f64::consts::TAU * i as f64 / n as f64;
            Vec2::new(radius * a.cos(), radius * a.sin())
        })
        .collect()
}

/// Two unit hexagons sharing one edge (the naphthalene skeleton).
fn fused_hexagons() -> Template {
    fused_rings(6, 6, "fused-hexagons")
}

/// A hexagon fused to a pentagon (the indene skeleton).
fn hexagon_pentagon() -> Template {
    fused_rings(6, 5, "hexagon-pentagon")
}

/// Builds two regular rings of sizes `a` and `b` sharing edge (0, 1),
/// second ring mirrored to the other side of the shared edge.
fn fused_rings(a: usize, b: usize, name: &'static str) -> Template {
    let mut g = polygon_graph(a);
    let coords_a = polygon_coords(a);
    let mut coords = coords_a.clone();

    // Ring B reuses vertices 0 and 1 and adds b - 2 fresh ones, laid out as
    // a regular polygon reflected across the shared edge.
    let shared0 = coords_a[0];
    let shared1 = coords_a[1];
    let b_coords = polygon_coords(b);
    let mut prev = 1;
    for i in 2..b {
        let v = g.add_vertex();
        g.add_edge(prev, v);
        let local = reflect_across(b_coords[i], b_coords[0], b_coords[1]);
        coords.push(place_like(local, b_coords[0], b_coords[1], shared0, shared1));
        prev = v;
    }
    g.add_edge(prev, 0);
    Template::new(name, g, coords)
}

fn reflect_across(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let d = (b - a).normalize();
    let ap = p - a;
    let along = d * ap.dot(&d);
    a + along * 2.0 - ap
}

/// Maps `p` from the frame of chord (fa, fb) to the frame of (ta, tb).
fn place_like(p: Vec2, fa: Vec2, fb: Vec2, ta: Vec2, tb: Vec2) -> Vec2 {
    let rot = (tb - ta).polar_angle() - (fb - fa).polar_angle();
    ta + (p - fa).rotated(rot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_finds_a_hexagon_for_benzene() {
        let target = polygon_graph(6);
        let code: i64 = morgan_codes(&target).iter().sum();
        let coords = global_registry()
            .match_target(&target, code, &BacktrackingMatcher, &|_| BondOrder::Single)
            .expect("hexagon template");
        for i in 0..6 {
            let d = (coords[(i + 1) % 6] - coords[i]).norm();
            assert!((d - 1.0).abs() < 1e-9, "edge {i} has length {d}");
        }
    }

    #[test]
    fn mismatched_code_returns_no_candidates() {
        let target = polygon_graph(6);
        assert!(global_registry().candidates(-1, 6, 6).is_empty());
    }

    #[test]
    fn fused_hexagons_template_matches_naphthalene() {
        let mut target = Graph::new();
        target.add_vertices(10);
        for i in 0..5 {
            target.add_edge(i, i + 1);
        }
        target.add_edge(5, 0);
        target.add_edge(5, 6);
        target.add_edge(6, 7);
        target.add_edge(7, 8);
        target.add_edge(8, 9);
        target.add_edge(9, 0);
        let code: i64 = morgan_codes(&target).iter().sum();
        let coords = global_registry()
            .match_target(&target, code, &BacktrackingMatcher, &|_| BondOrder::Single)
            .expect("naphthalene template");
        // Every bond of the fused system keeps unit length.
        for e in target.edges() {
            let (a, b) = target.edge_endpoints(e);
            let d = (coords[b] - coords[a]).norm();
            assert!((d - 1.0).abs() < 1e-6, "edge {e} has length {d}");
        }
    }

    #[test]
    fn backtracking_matcher_rejects_extra_adjacency() {
        // Pattern: path of 3. Target: triangle. Induced matching must fail
        // because the triangle closes an edge the path forbids.
        let mut pattern = Graph::new();
        pattern.add_vertices(3);
        pattern.add_edge(0, 1);
        pattern.add_edge(1, 2);
        let target = polygon_graph(3);
        let found = BacktrackingMatcher.find_embedding(
            &pattern,
            &target,
            &|_, _| true,
            &|_, _| true,
        );
        assert!(found.is_none());
    }
}
