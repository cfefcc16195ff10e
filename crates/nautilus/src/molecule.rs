//! The molecule input model: atoms, bonds with order and cis/trans parity,
//! optional existing coordinates and a fixed-vertex mask. This is the
//! read/write surface the engine mutates in place.

use nautilus_graphlib::Graph;
use serde::{Deserialize, Serialize};

use crate::geom::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Numeric order used by straight-chain detection (aromatic counts as
    /// single there).
    pub fn numeric(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
}

/// Cis/trans parity of a double bond, `None` when unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CisTrans {
    Unspecified,
    Cis,
    Trans,
}

#[derive(Debug, Clone, Copy)]
pub struct Bond {
    pub order: BondOrder,
    pub parity: CisTrans,
}

/// A molecular graph plus the per-atom state layout reads and writes.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    graph: Graph,
    bonds: Vec<Bond>,
    pub positions: Vec<Vec2>,
    fixed: Vec<bool>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self) -> usize {
        self.positions.push(Vec2::zeros());
        self.fixed.push(false);
        self.graph.add_vertex()
    }

    pub fn add_bond(&mut self, a: usize, b: usize, order: BondOrder) -> usize {
        let id = self.graph.add_edge(a, b);
        if id == self.bonds.len() {
            self.bonds.push(Bond {
                order,
                parity: CisTrans::Unspecified,
            });
        }
        id
    }

    pub fn set_parity(&mut self, bond: usize, parity: CisTrans) {
        self.bonds[bond].parity = parity;
    }

    pub fn set_fixed(&mut self, atom: usize, fixed: bool) {
        self.fixed[atom] = fixed;
    }

    pub fn is_fixed(&self, atom: usize) -> bool {
        self.fixed[atom]
    }

    pub fn has_fixed_atoms(&self) -> bool {
        self.fixed.iter().any(|&f| f)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn atom_count(&self) -> usize {
        self.graph.vertex_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn bond(&self, id: usize) -> Bond {
        self.bonds[id]
    }

    pub fn bond_order(&self, id: usize) -> BondOrder {
        self.bonds[id].order
    }

    pub fn parity(&self, id: usize) -> CisTrans {
        self.bonds[id].parity
    }

    /// Sum of the numeric orders of the two bonds at a degree-2 atom, the
    /// straight-chain criterion (two doubles, or single + triple).
    pub fn is_linear_atom(&self, atom: usize) -> bool {
        let nei = self.graph.neighbors(atom);
        nei.len() == 2
            && nei
                .iter()
                .map(|&(_, e)| self.bonds[e].order.numeric())
                .sum::<u8>()
                >= 4
    }

    /// Substituent atoms of `atom` other than `except`, for cis/trans
    /// reasoning around a double bond.
    pub fn substituents(&self, atom: usize, except: usize) -> Vec<usize> {
        self.graph
            .neighbors(atom)
            .iter()
            .map(|&(w, _)| w)
            .filter(|&w| w != except)
            .collect()
    }
}

/// Cooperative cancellation: polled at the top of the growth loop (where a
/// trip is an error) and inside the cleaner iterations (where a trip keeps
/// the best-so-far geometry).
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
    fn message(&self) -> String;
}

/// Wall-clock cancellation handle.
#[derive(Debug, Clone)]
pub struct Deadline {
    start: std::time::Instant,
    budget: std::time::Duration,
}

impl Deadline {
    pub fn new(budget: std::time::Duration) -> Self {
        Self {
            start: std::time::Instant::now(),
            budget,
        }
    }
}

impl Cancellation for Deadline {
    fn is_cancelled(&self) -> bool {
        self.start.elapsed() > self.budget
    }

    fn message(&self) -> String {
        format!("time limit of {:?} exceeded", self.budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_atom_detection_requires_order_sum_of_four() {
        let mut m = Molecule::new();
        let a = m.add_atom();
        let b = m.add_atom();
        let c = m.add_atom();
        m.add_bond(a, b, BondOrder::Double);
        m.add_bond(b, c, BondOrder::Double);
        assert!(m.is_linear_atom(b));
        assert!(!m.is_linear_atom(a));

        let mut m = Molecule::new();
        let a = m.add_atom();
        let b = m.add_atom();
        let c = m.add_atom();
        m.add_bond(a, b, BondOrder::Single);
        m.add_bond(b, c, BondOrder::Single);
        assert!(!m.is_linear_atom(b));
    }
}
