// ============================================================
// Layer 3 — Bipartite Interaction Graph
// ============================================================
// Users and items share one node index space:
//
//   node u            → user u
//   node n_users + i  → item i
//
// The propagation matrix is the symmetric normalisation of the
// undirected adjacency:
//
//   Â = D^-1/2 · A · D^-1/2      Â[u, i] = 1 / sqrt(deg(u) · deg(i))
//
// It is stored as COO triplets so Layer 5 can turn it into a
// gather / scatter-add propagation on any burn backend.

use std::collections::BTreeSet;

/// Sparse matrix in coordinate form. Entry k is `values[k]` at
/// `(rows[k], cols[k])`.
#[derive(Debug, Clone, PartialEq)]
pub struct CooMatrix {
    pub size:   usize,
    pub rows:   Vec<usize>,
    pub cols:   Vec<usize>,
    pub values: Vec<f32>,
}

impl CooMatrix {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone)]
pub struct InteractionGraph {
    n_users: usize,
    n_items: usize,
    /// Deduplicated, sorted item lists per user.
    u2i:     Vec<Vec<usize>>,
}

impl InteractionGraph {
    /// Build the graph from per-user item lists. Users past the end of
    /// `u2i` have no edges; duplicate items collapse into one edge.
    pub fn new(n_users: usize, n_items: usize, u2i: &[Vec<usize>]) -> Self {
        let u2i = (0..n_users)
            .map(|u| {
                u2i.get(u)
                    .map(|items| {
                        items
                            .iter()
                            .copied()
                            .filter(|&i| i < n_items)
                            .collect::<BTreeSet<_>>()
                            .into_iter()
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();
        Self { n_users, n_items, u2i }
    }

    pub fn n_users(&self) -> usize {
        self.n_users
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn n_nodes(&self) -> usize {
        self.n_users + self.n_items
    }

    pub fn edge_count(&self) -> usize {
        self.u2i.iter().map(Vec::len).sum()
    }

    /// All `(user, item)` edges in user order.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.u2i
            .iter()
            .enumerate()
            .flat_map(|(u, items)| items.iter().map(move |&i| (u, i)))
            .collect()
    }

    pub fn user_items(&self) -> &[Vec<usize>] {
        &self.u2i
    }

    /// Degree of every node, users first.
    pub fn degrees(&self) -> Vec<usize> {
        let mut deg = vec![0usize; self.n_nodes()];
        for (u, items) in self.u2i.iter().enumerate() {
            deg[u] += items.len();
            for &i in items {
                deg[self.n_users + i] += 1;
            }
        }
        deg
    }

    /// `D^-1/2 A D^-1/2` over both edge directions.
    pub fn normalized_adjacency(&self) -> CooMatrix {
        let deg = self.degrees();
        let inv_sqrt: Vec<f32> = deg
            .iter()
            .map(|&d| if d == 0 { 0.0 } else { 1.0 / (d as f32).sqrt() })
            .collect();

        let nnz = 2 * self.edge_count();
        let mut rows   = Vec::with_capacity(nnz);
        let mut cols   = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);

        for (u, i) in self.edges() {
            let item_node = self.n_users + i;
            let w = inv_sqrt[u] * inv_sqrt[item_node];

            rows.push(u);
            cols.push(item_node);
            values.push(w);

            rows.push(item_node);
            cols.push(u);
            values.push(w);
        }

        CooMatrix { size: self.n_nodes(), rows, cols, values }
    }
}
