use burn::{
    module::Param,
    prelude::*,
    tensor::Distribution,
};

use crate::ml::graph_ops::{layer_mean, propagate_layers, split_nodes, SparseAdjacency};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct LightGcnConfig {
    pub n_users:  usize,
    pub n_items:  usize,
    pub emb_size: usize,
    pub n_layers: usize,
    #[config(default = 0.1)]
    pub init_std: f64,
}

impl LightGcnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LightGcn<B> {
        let dist = Distribution::Normal(0.0, self.init_std);
        let user_embedding = Tensor::<B, 2>::random([self.n_users, self.emb_size], dist, device);
        let item_embedding = Tensor::<B, 2>::random([self.n_items, self.emb_size], dist, device);
        LightGcn {
            user_embedding: Param::from_tensor(user_embedding),
            item_embedding: Param::from_tensor(item_embedding),
            n_users:        self.n_users,
            n_items:        self.n_items,
            n_layers:       self.n_layers,
        }
    }
}

/// LightGCN: free ego embeddings, propagated without weights or
/// non-linearities, averaged over layers.
#[derive(Module, Debug)]
pub struct LightGcn<B: Backend> {
    pub user_embedding: Param<Tensor<B, 2>>,
    pub item_embedding: Param<Tensor<B, 2>>,
    pub n_users:        usize,
    pub n_items:        usize,
    pub n_layers:       usize,
}

/// Propagated embeddings together with the layer-0 (ego) rows.
pub struct LightGcnOutput<B: Backend> {
    pub users:     Tensor<B, 2>,
    pub items:     Tensor<B, 2>,
    pub ego_users: Tensor<B, 2>,
    pub ego_items: Tensor<B, 2>,
}

impl<B: Backend> LightGcn<B> {
    /// `[n_users + n_items, emb_size]`, users first.
    pub fn ego_embeddings(&self) -> Tensor<B, 2> {
        Tensor::cat(vec![self.user_embedding.val(), self.item_embedding.val()], 0)
    }

    /// Every propagation layer over all nodes, starting with the ego layer.
    pub fn propagate_all(&self, adj: &SparseAdjacency<B>) -> Vec<Tensor<B, 2>> {
        propagate_layers(adj, self.ego_embeddings(), self.n_layers)
    }

    /// Layer-mean user and item embeddings.
    pub fn forward(&self, adj: &SparseAdjacency<B>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        split_nodes(layer_mean(self.propagate_all(adj)), self.n_users)
    }

    pub fn forward_with_ego(&self, adj: &SparseAdjacency<B>) -> LightGcnOutput<B> {
        let layers = self.propagate_all(adj);
        let (ego_users, ego_items) = split_nodes(layers[0].clone(), self.n_users);
        let (users, items) = split_nodes(layer_mean(layers), self.n_users);
        LightGcnOutput { users, items, ego_users, ego_items }
    }
}
