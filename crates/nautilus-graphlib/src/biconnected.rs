//! Biconnected decomposition: DFS low-link block extraction, articulation
//! flags, and the "incoming blocks" relation used to walk the block tree.

use crate::Graph;

/// One biconnected block: a maximal subgraph with no internal cut vertex.
#[derive(Debug, Clone)]
pub struct Block {
    pub vertices: Vec<usize>,
    pub edges: Vec<usize>,
    mask: Vec<bool>,
}

impl Block {
    pub fn contains(&self, vertex: usize) -> bool {
        self.mask[vertex]
    }

    /// A trivial block is a single edge (a bridge).
    pub fn is_trivial(&self) -> bool {
        self.edges.len() == 1
    }
}

/// Blocks, articulation flags and, per vertex, the blocks discovered while
/// exploring that vertex's DFS subtree ("incoming" blocks). For any vertex
/// other than the DFS root there is exactly one further block containing it:
/// the one through which the vertex was reached.
#[derive(Debug, Clone)]
pub struct BiconnectedDecomposition {
    pub blocks: Vec<Block>,
    articulation: Vec<bool>,
    incoming: Vec<Vec<usize>>,
    membership: Vec<Vec<usize>>,
}

struct Dfs<'a> {
    graph: &'a Graph,
    disc: Vec<usize>,
    low: Vec<usize>,
    timer: usize,
    edge_stack: Vec<usize>,
    edge_seen: Vec<bool>,
    blocks: Vec<Block>,
    articulation: Vec<bool>,
    incoming: Vec<Vec<usize>>,
}

impl BiconnectedDecomposition {
    pub fn compute(graph: &Graph) -> Self {
        let n = graph.vertex_count();
        let mut dfs = Dfs {
            graph,
            disc: vec![usize::MAX; n],
            low: vec![0; n],
            timer: 0,
            edge_stack: Vec::new(),
            edge_seen: vec![false; graph.edge_count()],
            blocks: Vec::new(),
            articulation: vec![false; n],
            incoming: vec![Vec::new(); n],
        };
        for v in graph.vertices() {
            if dfs.disc[v] == usize::MAX {
                dfs.visit(v, usize::MAX);
            }
        }
        let mut membership = vec![Vec::new(); n];
        for (id, block) in dfs.blocks.iter().enumerate() {
            for &v in &block.vertices {
                membership[v].push(id);
            }
        }
        Self {
            blocks: dfs.blocks,
            articulation: dfs.articulation,
            incoming: dfs.incoming,
            membership,
        }
    }

    pub fn is_articulation(&self, vertex: usize) -> bool {
        self.articulation[vertex]
    }

    /// Blocks first discovered from `vertex`'s subtree. The DFS root has all
    /// of its blocks here; every other vertex has all but one.
    pub fn incoming_blocks(&self, vertex: usize) -> &[usize] {
        &self.incoming[vertex]
    }

    /// Ids of every block containing `vertex`.
    pub fn blocks_containing(&self, vertex: usize) -> &[usize] {
        &self.membership[vertex]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of non-trivial (multi-edge) blocks.
    pub fn nontrivial_count(&self) -> usize {
        self.blocks.iter().filter(|b| !b.is_trivial()).count()
    }
}

impl Dfs<'_> {
    fn visit(&mut self, v: usize, parent_edge: usize) {
        self.disc[v] = self.timer;
        self.low[v] = self.timer;
        self.timer += 1;
        let mut children = 0;

        for i in 0..self.graph.neighbors(v).len() {
            let (w, e) = self.graph.neighbors(v)[i];
            if e == parent_edge {
                continue;
            }
            if !self.edge_seen[e] {
                self.edge_seen[e] = true;
                self.edge_stack.push(e);
            }
            if self.disc[w] == usize::MAX {
                children += 1;
                self.visit(w, e);
                self.low[v] = self.low[v].min(self.low[w]);
                if self.low[w] >= self.disc[v] {
                    // No back edge escapes w's subtree past v: pop a block.
                    if parent_edge != usize::MAX || children > 1 {
                        self.articulation[v] = true;
                    }
                    self.pop_block(v, e);
                }
            } else {
                self.low[v] = self.low[v].min(self.disc[w]);
            }
        }

        // The DFS root of a component always closes its last block above;
        // an isolated vertex forms no block at all.
    }

    fn pop_block(&mut self, cut: usize, closing_edge: usize) {
        let mut edges = Vec::new();
        loop {
            let e = match self.edge_stack.pop() {
                Some(e) => e,
                None => break,
            };
            edges.push(e);
            if e == closing_edge {
                break;
            }
        }
        let mut mask = vec![false; self.graph.vertex_count()];
        let mut vertices = Vec::new();
        for &e in &edges {
            let (a, b) = self.graph.edge_endpoints(e);
            for v in [a, b] {
                if !mask[v] {
                    mask[v] = true;
                    vertices.push(v);
                }
            }
        }
        edges.reverse();
        vertices.sort_unstable();
        let id = self.blocks.len();
        self.blocks.push(Block {
            vertices,
            edges,
            mask,
        });
        self.incoming[cut].push(id);
    }
}
