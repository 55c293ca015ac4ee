// ============================================================
// Layer 5 — Sensitive-Attribute Encoder (SemiGCN)
// ============================================================
// A LightGCN encoder with a linear classification head, trained
// to predict the sensitive attribute of every user. Its user and
// item embeddings (e_su, e_si) are the "sensitive view" the fair
// model is pushed to be independent of.

use anyhow::{ensure, Result};
use burn::{
    nn::{loss::CrossEntropyLossConfig, Linear, LinearConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::ml::graph_ops::SparseAdjacency;
use crate::ml::lightgcn::{LightGcn, LightGcnConfig};

#[derive(Config, Debug)]
pub struct SemiGcnConfig {
    pub encoder:    LightGcnConfig,
    pub nb_classes: usize,
}

impl SemiGcnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SemiGcn<B> {
        SemiGcn {
            encoder:    self.encoder.init(device),
            classifier: LinearConfig::new(self.encoder.emb_size, self.nb_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct SemiGcn<B: Backend> {
    pub encoder:    LightGcn<B>,
    pub classifier: Linear<B>,
}

pub struct SemiGcnOutput<B: Backend> {
    pub user_emb:    Tensor<B, 2>,
    pub item_emb:    Tensor<B, 2>,
    pub user_logits: Tensor<B, 2>,
    pub item_logits: Tensor<B, 2>,
}

impl<B: Backend> SemiGcn<B> {
    pub fn forward(&self, adj: &SparseAdjacency<B>) -> SemiGcnOutput<B> {
        let (user_emb, item_emb) = self.encoder.forward(adj);
        let user_logits = self.classifier.forward(user_emb.clone());
        let item_logits = self.classifier.forward(item_emb.clone());
        SemiGcnOutput { user_emb, item_emb, user_logits, item_logits }
    }
}

/// Full-batch cross-entropy training of the classifier on the user
/// labels. Returns the trained model and the last epoch's loss.
pub fn train_sensitive_encoder<B: AutodiffBackend>(
    mut model: SemiGcn<B>,
    adj:       &SparseAdjacency<B>,
    labels:    &[usize],
    lr:        f64,
    epochs:    usize,
    device:    &B::Device,
) -> Result<(SemiGcn<B>, f64)> {
    ensure!(
        labels.len() == model.encoder.n_users,
        "{} sensitive labels for {} users",
        labels.len(),
        model.encoder.n_users
    );

    let labels: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
    let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);
    let ce = CrossEntropyLossConfig::new().init(device);
    let mut optim = AdamConfig::new().init();

    let mut final_loss = f64::NAN;
    for epoch in 1..=epochs {
        let out  = model.forward(adj);
        let loss = ce.forward(out.user_logits, targets.clone());
        final_loss = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads);

        if epoch % 100 == 0 {
            tracing::debug!("sensitive encoder epoch {epoch}: ce={final_loss:.6}");
        }
    }

    tracing::info!("Sensitive encoder trained: ce={:.6}", final_loss);
    Ok((model, final_loss))
}
