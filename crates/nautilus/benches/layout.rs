use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use nautilus::{BondOrder, LayoutOptions, Molecule};
use std::hint::black_box;
use std::time::Duration;

/// A fused-ring ladder: `rings` hexagons sharing edges in a row, each ring
/// carrying one methyl-like substituent.
fn build_ladder(rings: usize) -> Molecule {
    let mut m = Molecule::new();
    let a = m.add_atom();
    let b = m.add_atom();
    m.add_bond(a, b, BondOrder::Aromatic);
    let mut shared = (a, b);
    for _ in 0..rings {
        let mut prev = shared.1;
        let mut fresh = Vec::new();
        for _ in 0..4 {
            let v = m.add_atom();
            m.add_bond(prev, v, BondOrder::Aromatic);
            fresh.push(v);
            prev = v;
        }
        m.add_bond(prev, shared.0, BondOrder::Aromatic);
        let sub = m.add_atom();
        m.add_bond(fresh[1], sub, BondOrder::Single);
        shared = (fresh[2], fresh[3]);
    }
    m
}

fn build_chain(atoms: usize) -> Molecule {
    let mut m = Molecule::new();
    for _ in 0..atoms {
        m.add_atom();
    }
    for i in 1..atoms {
        m.add_bond(i - 1, i, BondOrder::Single);
    }
    m
}

fn build_macrocycle(size: usize) -> Molecule {
    let mut m = Molecule::new();
    for _ in 0..size {
        m.add_atom();
    }
    for i in 0..size {
        m.add_bond(i, (i + 1) % size, BondOrder::Single);
    }
    m
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    group.measurement_time(Duration::from_secs(10));

    let cases: Vec<(&str, Molecule)> = vec![
        ("chain_40", build_chain(40)),
        ("ladder_4", build_ladder(4)),
        ("ladder_8", build_ladder(8)),
        ("macrocycle_24", build_macrocycle(24)),
    ];

    for (name, molecule) in cases {
        group.bench_with_input(BenchmarkId::new("layout", name), &molecule, |b, molecule| {
            b.iter_batched(
                || molecule.clone(),
                |mut m| {
                    nautilus::layout(black_box(&mut m), &LayoutOptions::default())
                        .expect("layout");
                    black_box(m.positions.len());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_layout);
criterion_main!(benches);
