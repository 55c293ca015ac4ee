// ============================================================
// Layer 5 — Sparse Graph Propagation
// ============================================================
// Burn has no sparse matmul, so Â·X is written as a gather and
// a scatter-add over the COO entries of Â:
//
//   messages[k] = values[k] · X[cols[k]]        (select)
//   out[rows[k]] += messages[k]                 (select_assign)
//
// Both ops are differentiable on the Autodiff backend, so the
// same code serves training and evaluation.

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::domain::embedding::EmbeddingTable;
use crate::domain::graph::CooMatrix;

/// A normalised adjacency matrix living on a burn device.
#[derive(Debug, Clone)]
pub struct SparseAdjacency<B: Backend> {
    size:   usize,
    nnz:    usize,
    rows:   Tensor<B, 1, Int>,
    cols:   Tensor<B, 1, Int>,
    values: Tensor<B, 1>,
}

impl<B: Backend> SparseAdjacency<B> {
    pub fn from_coo(coo: &CooMatrix, device: &B::Device) -> Self {
        let rows: Vec<i64> = coo.rows.iter().map(|&r| r as i64).collect();
        let cols: Vec<i64> = coo.cols.iter().map(|&c| c as i64).collect();
        Self {
            size:   coo.size,
            nnz:    coo.nnz(),
            rows:   Tensor::<B, 1, Int>::from_ints(rows.as_slice(), device),
            cols:   Tensor::<B, 1, Int>::from_ints(cols.as_slice(), device),
            values: Tensor::<B, 1>::from_floats(coo.values.as_slice(), device),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// `Â · x` for `x` of shape `[size, d]`.
    pub fn spmm(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, d] = x.dims();
        let device = x.device();
        if self.nnz == 0 {
            return Tensor::zeros([n, d], &device);
        }

        let messages = x.select(0, self.cols.clone())
            * self.values.clone().unsqueeze_dim::<2>(1);

        Tensor::zeros([n, d], &device).select_assign(0, self.rows.clone(), messages)
    }
}

/// `[E, ÂE, Â²E, …]` with `n_layers` propagation steps after the ego layer.
pub fn propagate_layers<B: Backend>(
    adj:      &SparseAdjacency<B>,
    ego:      Tensor<B, 2>,
    n_layers: usize,
) -> Vec<Tensor<B, 2>> {
    let mut layers = Vec::with_capacity(n_layers + 1);
    let mut current = ego;
    for _ in 0..n_layers {
        let next = adj.spmm(current.clone());
        layers.push(current);
        current = next;
    }
    layers.push(current);
    layers
}

/// Element-wise mean of equally shaped layer outputs.
pub fn layer_mean<B: Backend>(layers: Vec<Tensor<B, 2>>) -> Tensor<B, 2> {
    Tensor::stack::<3>(layers, 0).mean_dim(0).squeeze::<2>(0)
}

/// Split a `[n_users + n_items, d]` node matrix into its user and item parts.
pub fn split_nodes<B: Backend>(all: Tensor<B, 2>, n_users: usize) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let [n, d] = all.dims();
    let users = all.clone().slice([0..n_users, 0..d]);
    let items = all.slice([n_users..n, 0..d]);
    (users, items)
}

/// Copy a 2-D tensor into a CPU-side embedding table.
pub fn to_table<B: Backend>(t: Tensor<B, 2>) -> Result<EmbeddingTable> {
    let [rows, dim] = t.dims();
    let data: Vec<f32> = t
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow!("Cannot read embeddings back from device: {e:?}"))?;
    EmbeddingTable::new(rows, dim, data)
        .ok_or_else(|| anyhow!("Embedding buffer does not match shape [{rows}, {dim}]"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::InteractionGraph;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_spmm_matches_dense_product() {
        // 1 user, 2 items: Â = [[0, a, a], [a, 0, 0], [a, 0, 0]], a = 1/sqrt(2)
        let coo    = InteractionGraph::new(1, 2, &[vec![0, 1]]).normalized_adjacency();
        let device = Default::default();
        let adj    = SparseAdjacency::<TestBackend>::from_coo(&coo, &device);

        let x = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &device)
            .reshape([3, 2]);
        let out = values(adj.spmm(x));

        let a = 1.0 / 2f32.sqrt();
        let expected = [a * 8.0, a * 10.0, a * 1.0, a * 2.0, a * 1.0, a * 2.0];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{got} vs {want}");
        }
    }

    #[test]
    fn test_layers_and_mean() {
        let coo    = InteractionGraph::new(1, 1, &[vec![0]]).normalized_adjacency();
        let device = Default::default();
        let adj    = SparseAdjacency::<TestBackend>::from_coo(&coo, &device);

        // Â swaps the two nodes, so layers alternate.
        let ego    = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0], &device).reshape([2, 1]);
        let layers = propagate_layers(&adj, ego, 3);
        assert_eq!(layers.len(), 4);
        assert_eq!(values(layers[1].clone()), vec![3.0, 1.0]);

        let mean = values(layer_mean(layers));
        assert_eq!(mean, vec![2.0, 2.0]);
    }

    #[test]
    fn test_split_and_table() {
        let device = Default::default();
        let all = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &device)
            .reshape([3, 2]);
        let (users, items) = split_nodes(all, 1);
        assert_eq!(users.dims(), [1, 2]);

        let table = to_table(items).unwrap();
        assert_eq!(table.rows(), 2);
        assert_eq!(table.row(1), &[5.0, 6.0]);
    }

    #[test]
    fn test_empty_adjacency_propagates_zeros() {
        let coo    = InteractionGraph::new(2, 2, &[]).normalized_adjacency();
        let device = Default::default();
        let adj    = SparseAdjacency::<TestBackend>::from_coo(&coo, &device);
        let out    = adj.spmm(Tensor::ones([4, 3], &device));
        assert!(values(out).iter().all(|&v| v == 0.0));
    }
}
