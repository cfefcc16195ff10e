use nautilus::geom::Vec2;
use nautilus::{BondOrder, Cancellation, Error, LayoutOptions, Molecule};

fn ring(n: usize) -> Molecule {
    let mut m = Molecule::new();
    for _ in 0..n {
        m.add_atom();
    }
    for i in 0..n {
        m.add_bond(i, (i + 1) % n, BondOrder::Single);
    }
    m
}

fn bond_lengths(m: &Molecule) -> Vec<f64> {
    m.graph()
        .edges()
        .map(|e| {
            let (a, b) = m.graph().edge_endpoints(e);
            (m.positions[b] - m.positions[a]).norm()
        })
        .collect()
}

fn segments_cross(m: &Molecule) -> bool {
    let edges: Vec<(usize, usize)> = m.graph().edges().map(|e| m.graph().edge_endpoints(e)).collect();
    for (i, &(a, b)) in edges.iter().enumerate() {
        for &(c, d) in &edges[i + 1..] {
            if a == c || a == d || b == c || b == d {
                continue;
            }
            if matches!(
                nautilus::geom::classify_intersection(
                    m.positions[a],
                    m.positions[b],
                    m.positions[c],
                    m.positions[d],
                ),
                nautilus::geom::SegCross::Interior | nautilus::geom::SegCross::Overlap
            ) {
                return true;
            }
        }
    }
    false
}

#[test]
fn benzene_becomes_a_regular_hexagon() {
    let mut m = ring(6);
    nautilus::layout(&mut m, &LayoutOptions::default()).expect("layout");
    for (e, len) in bond_lengths(&m).iter().enumerate() {
        assert!((len - 1.0).abs() < 1e-6, "bond {e} has length {len}");
    }
    // All vertices equidistant from the centroid.
    let centroid = m.positions.iter().fold(Vec2::zeros(), |acc, p| acc + p) / 6.0;
    let r0 = (m.positions[0] - centroid).norm();
    for (v, p) in m.positions.iter().enumerate() {
        assert!(((p - centroid).norm() - r0).abs() < 1e-6, "vertex {v} off circle");
    }
}

#[test]
fn single_bond_gets_the_requested_length() {
    let mut m = Molecule::new();
    m.add_atom();
    m.add_atom();
    m.add_bond(0, 1, BondOrder::Single);
    let options = LayoutOptions {
        bond_length: 1.5,
        ..LayoutOptions::default()
    };
    nautilus::layout(&mut m, &options).expect("layout");
    let d = (m.positions[1] - m.positions[0]).norm();
    assert!((d - 1.5).abs() < 1e-9);
}

#[test]
fn bowtie_triangles_do_not_cross() {
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
    nautilus::layout(&mut m, &LayoutOptions::default()).expect("layout");
    assert!(!segments_cross(&m));
}

#[test]
fn naphthalene_keeps_unit_bonds() {
    let mut m = Molecule::new();
    for _ in 0..10 {
        m.add_atom();
    }
    for i in 0..5 {
        m.add_bond(i, i + 1, BondOrder::Aromatic);
    }
    m.add_bond(5, 0, BondOrder::Aromatic);
    m.add_bond(5, 6, BondOrder::Aromatic);
    m.add_bond(6, 7, BondOrder::Aromatic);
    m.add_bond(7, 8, BondOrder::Aromatic);
    m.add_bond(8, 9, BondOrder::Aromatic);
    m.add_bond(9, 0, BondOrder::Aromatic);
    nautilus::layout(&mut m, &LayoutOptions::default()).expect("layout");
    for (e, len) in bond_lengths(&m).iter().enumerate() {
        assert!((len - 1.0).abs() < 0.2, "bond {e} has length {len}");
    }
    assert!(!segments_cross(&m));
}

#[test]
fn twenty_macrocycle_is_roughly_circular_and_simple() {
    let mut m = ring(20);
    nautilus::layout(&mut m, &LayoutOptions::default()).expect("layout");
    for (e, len) in bond_lengths(&m).iter().enumerate() {
        assert!((len - 1.0).abs() < 0.25, "bond {e} has length {len}");
    }
    assert!(!segments_cross(&m));
    // Far-apart ring positions stay far apart in the plane.
    for i in 0..20 {
        let j = (i + 10) % 20;
        let d = (m.positions[i] - m.positions[j]).norm();
        assert!(d > 2.0, "antipodal vertices {i}/{j} are {d} apart");
    }
}

#[test]
fn oversized_macrocycle_reports_ring_too_large() {
    let options = LayoutOptions {
        max_macrocycle: 30,
        ..LayoutOptions::default()
    };
    let mut m = ring(40);
    assert!(matches!(
        nautilus::layout(&mut m, &options),
        Err(Error::RingTooLarge { size: 40, max: 30 })
    ));
}

#[test]
fn relayout_with_respected_coordinates_is_idempotent() {
    let mut m = Molecule::new();
    for _ in 0..7 {
        m.add_atom();
    }
    for i in 0..6 {
        m.add_bond(i, (i + 1) % 6, BondOrder::Aromatic);
    }
    m.add_bond(0, 6, BondOrder::Single);
    nautilus::layout(&mut m, &LayoutOptions::default()).expect("first layout");
    let first = m.positions.clone();

    let options = LayoutOptions {
        respect_existing: true,
        ..LayoutOptions::default()
    };
    nautilus::layout(&mut m, &options).expect("second layout");
    for (v, (p, q)) in first.iter().zip(m.positions.iter()).enumerate() {
        assert!((p - q).norm() < 0.3, "vertex {v} moved from {p:?} to {q:?}");
    }
}

#[test]
fn disconnected_components_end_up_separated() {
    let mut m = Molecule::new();
    for _ in 0..6 {
        m.add_atom();
    }
    m.add_bond(0, 1, BondOrder::Single);
    m.add_bond(1, 2, BondOrder::Single);
    m.add_bond(3, 4, BondOrder::Single);
    m.add_bond(4, 5, BondOrder::Single);
    nautilus::layout(&mut m, &LayoutOptions::default()).expect("layout");
    for i in 0..3 {
        for j in 3..6 {
            let d = (m.positions[i] - m.positions[j]).norm();
            assert!(d > 1.0, "atoms {i}/{j} of different components are {d} apart");
        }
    }
}

#[test]
fn filter_leaves_excluded_atoms_untouched() {
    let mut m = Molecule::new();
    for _ in 0..4 {
        m.add_atom();
    }
    for i in 1..4 {
        m.add_bond(i - 1, i, BondOrder::Single);
    }
    m.positions[3] = Vec2::new(42.0, 42.0);
    let options = LayoutOptions {
        filter: Some(vec![true, true, true, false]),
        ..LayoutOptions::default()
    };
    nautilus::layout(&mut m, &options).expect("layout");
    assert_eq!(m.positions[3], Vec2::new(42.0, 42.0));
    let d = (m.positions[1] - m.positions[0]).norm();
    assert!((d - 1.0).abs() < 1e-6);
}

#[test]
fn tripped_cancellation_surfaces_as_an_error() {
    struct Always;
    impl Cancellation for Always {
        fn is_cancelled(&self) -> bool {
            true
        }
        fn message(&self) -> String {
            "test handle".into()
        }
    }
    let mut m = ring(6);
    let err = nautilus::layout_with_cancellation(&mut m, &LayoutOptions::default(), Some(&Always));
    assert!(matches!(err, Err(Error::Cancelled(_))));
}
