//! Morgan vertex ranking: an iteratively refined neighbor-sum code used as a
//! cheap, non-unique canonical tie-breaker.

use crate::Graph;

/// Default multiplier applied to a vertex's own code each round.
pub const DEFAULT_COEFFICIENT: i64 = 3;
/// Default cap on the number of refinement rounds.
pub const DEFAULT_ROUNDS: usize = 7;

/// Computes Morgan codes with the default refinement parameters.
pub fn morgan_codes(graph: &Graph) -> Vec<i64> {
    morgan_codes_with(graph, DEFAULT_COEFFICIENT, DEFAULT_ROUNDS)
}

/// Seeds every vertex with its degree, then applies
/// `code[v] = coefficient * code[v] + sum(code[u] for u adjacent to v)`
/// while the number of distinct codes keeps growing, up to `rounds` times.
/// Higher codes mean "more central".
pub fn morgan_codes_with(graph: &Graph, coefficient: i64, rounds: usize) -> Vec<i64> {
    let mut codes: Vec<i64> = graph
        .vertices()
        .map(|v| graph.degree(v) as i64)
        .collect();
    let mut next = vec![0i64; codes.len()];
    let mut distinct = distinct_count(&codes);
    for _ in 0..rounds {
        for v in graph.vertices() {
            let mut sum = coefficient * codes[v];
            for &(u, _) in graph.neighbors(v) {
                sum += codes[u];
            }
            next[v] = sum;
        }
        std::mem::swap(&mut codes, &mut next);
        let refined = distinct_count(&codes);
        if refined <= distinct {
            break;
        }
        distinct = refined;
    }
    codes
}

fn distinct_count(codes: &[i64]) -> usize {
    let mut sorted = codes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn central_vertices_rank_above_peripheral_ones() {
        // A star: the hub must outrank every leaf.
        let mut g = Graph::new();
        g.add_vertices(5);
        for leaf in 1..5 {
            g.add_edge(0, leaf);
        }
        let codes = morgan_codes(&g);
        for leaf in 1..5 {
            assert!(codes[0] > codes[leaf]);
        }
    }

    #[test]
    fn symmetric_vertices_share_a_code() {
        // 6-cycle: all vertices are equivalent.
        let mut g = Graph::new();
        g.add_vertices(6);
        for i in 0..6 {
            g.add_edge(i, (i + 1) % 6);
        }
        let codes = morgan_codes(&g);
        assert!(codes.iter().all(|&c| c == codes[0]));
    }

    #[test]
    fn refinement_stops_once_codes_stop_splitting() {
        // A path of five settles at three distinct codes after two rounds;
        // a huge round cap must not change the result (or overflow).
        let mut g = Graph::new();
        g.add_vertices(5);
        for i in 1..5 {
            g.add_edge(i - 1, i);
        }
        assert_eq!(morgan_codes_with(&g, 3, 1000), morgan_codes_with(&g, 3, 2));
    }

    #[test]
    fn refinement_separates_a_path_end_from_its_middle() {
        let mut g = Graph::new();
        g.add_vertices(5);
        for i in 1..5 {
            g.add_edge(i - 1, i);
        }
        let codes = morgan_codes(&g);
        assert!(codes[2] > codes[1]);
        assert!(codes[1] > codes[0]);
        assert_eq!(codes[0], codes[4]);
        assert_eq!(codes[1], codes[3]);
    }
}
