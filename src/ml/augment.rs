// ============================================================
// Layer 5 — Graph Augmentation
// ============================================================
// Two pieces drive the augmented view of the fair model:
//
// 1. GraphAugmenter — once per epoch, every training edge (u, i)
//    is kept or dropped:
//
//      s1 = σ(e_zu[u] · e_zi[i])        current model
//      s2 = σ(e_xu[u] · e_xi[i])        frozen pretrained model
//      p  = clamp(exp((s1 − mean_u s1) − (s2 − mean_u s2)), 0, 1)
//      keep ~ RelaxedBernoulli(p)
//
//    mean_u is the mean over u's own training edges. Edges the
//    current model scores relatively higher than the pretrained
//    one are always kept; the rest are dropped in proportion to
//    the gap.
//
// 2. augmented_propagate — masks the ego embeddings with the
//    fused behaviour/sensitive gate and propagates them over the
//    perturbed graph.

use anyhow::{anyhow, Result};
use burn::{prelude::*, tensor::activation::sigmoid};

use crate::domain::graph::InteractionGraph;
use crate::ml::feature_mask::FeatureMask;
use crate::ml::graph_ops::{layer_mean, propagate_layers, split_nodes, SparseAdjacency};
use crate::ml::lightgcn::LightGcnOutput;
use crate::ml::sampler::RelaxedBernoulli;

/// Edge list of the training graph, resident on the device.
pub struct GraphAugmenter<B: Backend> {
    n_users:    usize,
    n_items:    usize,
    edges:      Vec<(usize, usize)>,
    edge_users: Tensor<B, 1, Int>,
    edge_items: Tensor<B, 1, Int>,
    /// Training degree per user, at least 1.
    degree:     Tensor<B, 1>,
    sampler:    RelaxedBernoulli,
}

impl<B: Backend> GraphAugmenter<B> {
    pub fn new(graph: &InteractionGraph, sampler: RelaxedBernoulli, device: &B::Device) -> Self {
        let edges = graph.edges();
        let users: Vec<i64> = edges.iter().map(|&(u, _)| u as i64).collect();
        let items: Vec<i64> = edges.iter().map(|&(_, i)| i as i64).collect();
        let degree: Vec<f32> = graph
            .user_items()
            .iter()
            .map(|items| items.len().max(1) as f32)
            .collect();

        Self {
            n_users:    graph.n_users(),
            n_items:    graph.n_items(),
            edge_users: Tensor::<B, 1, Int>::from_ints(users.as_slice(), device),
            edge_items: Tensor::<B, 1, Int>::from_ints(items.as_slice(), device),
            degree:     Tensor::<B, 1>::from_floats(degree.as_slice(), device),
            edges,
            sampler,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// σ(⟨user, item⟩) for every training edge.
    fn edge_scores(&self, users: Tensor<B, 2>, items: Tensor<B, 2>) -> Tensor<B, 1> {
        let u = users.select(0, self.edge_users.clone());
        let i = items.select(0, self.edge_items.clone());
        sigmoid((u * i).sum_dim(1)).squeeze::<1>(1)
    }

    /// Subtract each edge's per-user mean score.
    fn center_per_user(&self, scores: Tensor<B, 1>) -> Tensor<B, 1> {
        let device = scores.device();
        let sums = Tensor::<B, 1>::zeros([self.n_users], &device)
            .select_assign(0, self.edge_users.clone(), scores.clone());
        let means = (sums / self.degree.clone()).select(0, self.edge_users.clone());
        scores - means
    }

    /// Keep probability of every edge, in edge order.
    pub fn keep_probabilities(
        &self,
        current:    (Tensor<B, 2>, Tensor<B, 2>),
        pretrained: (Tensor<B, 2>, Tensor<B, 2>),
    ) -> Tensor<B, 1> {
        let s1 = self.center_per_user(self.edge_scores(current.0, current.1));
        let s2 = self.center_per_user(self.edge_scores(pretrained.0, pretrained.1));
        (s1 - s2).exp().clamp(0.0, 1.0)
    }

    /// Sample the perturbed per-user item lists. All inputs are
    /// detached; the sample only decides the graph structure.
    pub fn perturb(
        &self,
        current:    (Tensor<B, 2>, Tensor<B, 2>),
        pretrained: (Tensor<B, 2>, Tensor<B, 2>),
    ) -> Result<Vec<Vec<usize>>> {
        let mut u2i = vec![Vec::new(); self.n_users];
        if self.edges.is_empty() {
            return Ok(u2i);
        }

        let probs = self.keep_probabilities(
            (current.0.detach(), current.1.detach()),
            (pretrained.0.detach(), pretrained.1.detach()),
        );
        let keep: Vec<f32> = self
            .sampler
            .rsample(probs)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| anyhow!("Cannot read edge mask back from device: {e:?}"))?;

        for (&(user, item), flag) in self.edges.iter().zip(keep) {
            if flag >= 0.5 {
                u2i[user].push(item);
            }
        }
        Ok(u2i)
    }

    /// Perturbed training graph for this epoch.
    pub fn perturbed_graph(
        &self,
        current:    (Tensor<B, 2>, Tensor<B, 2>),
        pretrained: (Tensor<B, 2>, Tensor<B, 2>),
    ) -> Result<InteractionGraph> {
        let u2i = self.perturb(current, pretrained)?;
        Ok(InteractionGraph::new(self.n_users, self.n_items, &u2i))
    }
}

/// Frozen user/item embeddings of the sensitive-attribute encoder.
#[derive(Debug, Clone)]
pub struct SensitiveView<B: Backend> {
    pub users: Tensor<B, 2>,
    pub items: Tensor<B, 2>,
}

/// Augmented user and item embeddings:
///
///   u0 = ego_u ⊙ (1 + exp(−gate(e_zu ⊙ e_su)))
///   i0 = ego_i ⊙ (1 + exp(−gate(e_zi ⊙ e_si)))
///
/// propagated over `adj_aug` and averaged over layers.
pub fn augmented_propagate<B: Backend>(
    adj_aug:   &SparseAdjacency<B>,
    encoded:   &LightGcnOutput<B>,
    sensitive: &SensitiveView<B>,
    mask:      &FeatureMask<B>,
    n_layers:  usize,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let n_users = encoded.users.dims()[0];

    let user_scale = mask.scale(encoded.users.clone() * sensitive.users.clone());
    let item_scale = mask.scale(encoded.items.clone() * sensitive.items.clone());

    let ego = Tensor::cat(
        vec![
            encoded.ego_users.clone() * user_scale,
            encoded.ego_items.clone() * item_scale,
        ],
        0,
    );

    split_nodes(layer_mean(propagate_layers(adj_aug, ego, n_layers)), n_users)
}
