//! 2D coordinate assignment for molecular graphs.
//!
//! Given a molecular graph (atoms, bonds with order and optional cis/trans
//! parity), the engine assigns plane coordinates so that bonds have uniform
//! length, rings are regular where possible, substituents spread out, and
//! edge crossings only appear when the graph forces them. The pipeline per
//! connected component: biconnected decomposition, per-block layout (pattern
//! templates, ring fusion, or the macrocycle lattice), outward growth from a
//! nucleus block, crossing resolution, a global cleaning pass, and finally
//! multi-component packing.
//!
//! ```no_run
//! use nautilus::{BondOrder, LayoutOptions, Molecule};
//!
//! let mut benzene = Molecule::new();
//! for _ in 0..6 {
//!     benzene.add_atom();
//! }
//! for i in 0..6 {
//!     benzene.add_bond(i, (i + 1) % 6, BondOrder::Aromatic);
//! }
//! nautilus::layout(&mut benzene, &LayoutOptions::default()).unwrap();
//! ```

pub mod cleaner;
pub mod engine;
pub mod error;
pub mod geom;
pub mod macrocycle;
pub mod model;
pub mod molecule;
pub mod pack;
pub mod patterns;
pub mod rand;

pub use error::{Error, Result};
pub use model::{DrawnState, LayoutGraph};
pub use molecule::{Bond, BondOrder, Cancellation, CisTrans, Deadline, Molecule};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geom::{Vec2, Vec2Ext};

/// Tuning knobs of the layout engine. The defaults reproduce the standard
/// depiction style; the empirical constants are exposed rather than baked
/// in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutOptions {
    /// Target bond length in output units.
    pub bond_length: f64,
    /// Keep the drawing near existing coordinates where possible.
    pub respect_existing: bool,
    /// Per-atom mask restricting layout to a subset of the molecule.
    pub filter: Option<Vec<bool>>,
    /// Attachment orders are searched exhaustively up to this many
    /// components per hub; beyond it a descending-size order is used.
    pub max_attachment_permutation: usize,
    /// A candidate must beat the incumbent by at least this much energy.
    pub energy_margin: f64,
    /// Edge stretch applied in the late ring-fusion fallback.
    pub stretch_factor: f64,
    /// Gradient-descent iteration cap of the global cleaner.
    pub cleaner_iterations: usize,
    /// Random relaxation sweeps after the macrocycle lattice walk.
    pub smoothing_iterations: usize,
    /// Gap between packed components, in bond lengths.
    pub component_gap: f64,
    /// Hard cap on the ring size the lattice solver accepts.
    pub max_macrocycle: usize,
    /// Single rings larger than this go to the lattice solver instead of
    /// the regular-polygon path.
    pub macrocycle_threshold: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            bond_length: 1.0,
            respect_existing: false,
            filter: None,
            max_attachment_permutation: 6,
            energy_margin: 1e-3,
            stretch_factor: 1.2,
            cleaner_iterations: 1000,
            smoothing_iterations: 10_000,
            component_gap: 2.0,
            max_macrocycle: 100,
            macrocycle_threshold: 10,
        }
    }
}

/// Assigns 2D coordinates to every atom of `molecule`, in place.
pub fn layout(molecule: &mut Molecule, options: &LayoutOptions) -> Result<()> {
    layout_with_cancellation(molecule, options, None)
}

/// Like [`layout`], polling `cancellation` at the engine's checkpoints.
pub fn layout_with_cancellation(
    molecule: &mut Molecule,
    options: &LayoutOptions,
    cancellation: Option<&dyn Cancellation>,
) -> Result<()> {
    if !(options.bond_length > 0.0) {
        return Err(Error::ZeroBondLength(options.bond_length));
    }
    if let Some(filter) = &options.filter {
        if filter.len() != molecule.atom_count() {
            return Err(Error::FilterLengthMismatch {
                expected: molecule.atom_count(),
                got: filter.len(),
            });
        }
    }
    let mut root = LayoutGraph::from_molecule(molecule, options.filter.as_deref());
    let components = root.graph().components();
    debug!(
        atoms = root.vertex_count(),
        components = components.len(),
        "starting layout"
    );

    let mut parts = Vec::with_capacity(components.len());
    let mut placed = Vec::with_capacity(components.len());
    let mut seed = rand::SMOOTHING_SEED;
    for component in components {
        let mut mask = vec![false; root.vertex_count()];
        for &v in &component {
            mask[v] = true;
        }
        let lg = root.induced(&mask);
        let mut engine = engine::ComponentEngine::new(
            lg,
            molecule,
            options,
            cancellation,
            rand::SeededRng::new(seed),
        );
        seed = seed.wrapping_add(1);
        engine.run()?;
        let mut lg = engine.lg;
        cleaner::clean_component(&mut lg, molecule, options, cancellation);
        placed.push(finalize_component(&mut lg, molecule, options)?);
        parts.push(lg);
    }

    pack::pack_components(&mut parts, &placed, options);
    for part in &parts {
        part.apply_to_parent(&mut root);
    }
    for v in root.graph().vertices() {
        molecule.positions[root.vertex(v).orig_idx] = root.pos(v);
    }
    Ok(())
}

/// Scales a finished component to the bond length and orients it: reading
/// order left to right, or matched onto the source coordinates when those
/// are respected. Returns whether the component is already placed in
/// absolute coordinates (fixed seed or matched anchor), in which case
/// packing must not move it.
fn finalize_component(
    lg: &mut LayoutGraph,
    molecule: &Molecule,
    options: &LayoutOptions,
) -> Result<bool> {
    let n = lg.vertex_count();
    if (0..n).any(|v| lg.is_fixed(v)) {
        // Fixed seeds keep their shape and orientation but still live in
        // bond-length units on output, like everything else.
        lg.scale(options.bond_length);
        return Ok(true);
    }
    if options.respect_existing && source_has_geometry(lg, molecule) {
        match_existing(lg, molecule, options)?;
        return Ok(true);
    }
    lg.scale(options.bond_length);
    if n >= 2 && lg.pos(0).x > lg.pos(n - 1).x {
        for v in 0..n {
            let mut p = lg.pos(v);
            p.x = -p.x;
            lg.set_pos(v, p);
        }
        lg.set_outline(None);
    }
    Ok(false)
}

/// Whether the molecule carries distinguishable source coordinates for
/// this component.
fn source_has_geometry(lg: &LayoutGraph, molecule: &Molecule) -> bool {
    let first = molecule.positions[lg.vertex(0).orig_idx];
    (1..lg.vertex_count()).any(|v| {
        (molecule.positions[lg.vertex(v).orig_idx] - first).norm() > geom::RAY_EPS
    })
}

/// Rigidly maps the fresh layout onto the source coordinates through an
/// anchor edge: scale (clamped around the bond length), rotation,
/// translation, and a mirror when a third anchor vertex lands on the wrong
/// side.
fn match_existing(
    lg: &mut LayoutGraph,
    molecule: &Molecule,
    options: &LayoutOptions,
) -> Result<()> {
    let source: Vec<Vec2> = (0..lg.vertex_count())
        .map(|v| molecule.positions[lg.vertex(v).orig_idx])
        .collect();
    let anchor = lg
        .graph()
        .edges()
        .find(|&e| {
            let (a, b) = lg.graph().edge_endpoints(e);
            (source[b] - source[a]).norm() > geom::RAY_EPS
        })
        .ok_or(Error::DegenerateAnchorEdge)?;
    let (a, b) = lg.graph().edge_endpoints(anchor);
    let src = source[b] - source[a];
    let cur = lg.pos(b) - lg.pos(a);
    if cur.norm() < geom::RAY_EPS {
        return Err(Error::DegenerateAnchorEdge);
    }

    let l = options.bond_length;
    let scale = (src.norm() / cur.norm()).clamp(l / 2.0, 2.0 * l);
    lg.scale(scale);
    let angle = src.polar_angle() - (lg.pos(b) - lg.pos(a)).polar_angle();
    let pivot = lg.pos(a);
    lg.rotate_around(pivot, angle);
    lg.translate(source[a] - lg.pos(a));

    // Pick the most off-axis third vertex to decide the mirror.
    let third = (0..lg.vertex_count())
        .filter(|&v| v != a && v != b)
        .max_by(|&u, &v| {
            let su = src.perp(&(source[u] - source[a])).abs();
            let sv = src.perp(&(source[v] - source[a])).abs();
            su.partial_cmp(&sv).unwrap_or(std::cmp::Ordering::Equal)
        });
    if let Some(c) = third {
        let side_src = src.perp(&(source[c] - source[a]));
        let side_new = src.perp(&(lg.pos(c) - source[a]));
        if side_src * side_new < 0.0 && side_src.abs() > geom::RAY_EPS {
            let origin = source[a];
            let dir = src / src.norm();
            for v in 0..lg.vertex_count() {
                let rel = lg.pos(v) - origin;
                let along = dir * rel.dot(&dir);
                lg.set_pos(v, origin + along * 2.0 - rel);
            }
            lg.set_outline(None);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bond_length_is_rejected() {
        let mut m = Molecule::new();
        m.add_atom();
        let options = LayoutOptions {
            bond_length: 0.0,
            ..LayoutOptions::default()
        };
        assert!(matches!(
            layout(&mut m, &options),
            Err(Error::ZeroBondLength(_))
        ));
    }

    #[test]
    fn single_edge_respects_bond_length() {
        let mut m = Molecule::new();
        m.add_atom();
        m.add_atom();
        m.add_bond(0, 1, BondOrder::Single);
        let options = LayoutOptions {
            bond_length: 1.5,
            ..LayoutOptions::default()
        };
        layout(&mut m, &options).expect("layout");
        let d = (m.positions[1] - m.positions[0]).norm();
        assert!((d - 1.5).abs() < 1e-9, "bond has length {d}");
    }

    #[test]
    fn short_filter_mask_is_rejected() {
        let mut m = Molecule::new();
        for _ in 0..3 {
            m.add_atom();
        }
        m.add_bond(0, 1, BondOrder::Single);
        m.add_bond(1, 2, BondOrder::Single);
        let options = LayoutOptions {
            filter: Some(vec![true, true]),
            ..LayoutOptions::default()
        };
        assert!(matches!(
            layout(&mut m, &options),
            Err(Error::FilterLengthMismatch {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn fixed_component_is_scaled_to_the_bond_length() {
        let mut m = Molecule::new();
        for _ in 0..3 {
            m.add_atom();
        }
        m.add_bond(0, 1, BondOrder::Single);
        m.add_bond(1, 2, BondOrder::Single);
        for v in 0..3 {
            m.set_fixed(v, true);
            m.positions[v] = Vec2::new(v as f64, 0.0);
        }
        let options = LayoutOptions {
            bond_length: 2.0,
            ..LayoutOptions::default()
        };
        layout(&mut m, &options).expect("layout");
        for v in 0..3 {
            let want = Vec2::new(v as f64 * 2.0, 0.0);
            assert!(
                (m.positions[v] - want).norm() < 1e-9,
                "atom {v} at {:?}",
                m.positions[v]
            );
        }
    }

    #[test]
    fn matched_layout_keeps_the_anchor_edge_in_place() {
        let mut m = Molecule::new();
        for _ in 0..3 {
            m.add_atom();
        }
        m.add_bond(0, 1, BondOrder::Single);
        m.add_bond(1, 2, BondOrder::Single);
        m.positions[0] = Vec2::new(4.0, 4.0);
        m.positions[1] = Vec2::new(5.0, 4.0);
        m.positions[2] = Vec2::new(5.5, 4.8);
        let options = LayoutOptions {
            respect_existing: true,
            ..LayoutOptions::default()
        };
        layout(&mut m, &options).expect("layout");
        assert!((m.positions[0] - Vec2::new(4.0, 4.0)).norm() < 1e-6);
        assert!((m.positions[1] - Vec2::new(5.0, 4.0)).norm() < 1e-6);
        // The substituent stays on its original side of the anchor.
        assert!(m.positions[2].y > 4.0);
    }
}
