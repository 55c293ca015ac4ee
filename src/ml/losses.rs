// ============================================================
// Layer 5 — Loss Functions
// ============================================================
//   bpr_loss      — pairwise ranking loss + L2 on the rows used
//   info_nce      — contrastive loss between two views of the
//                   same ids (row k of each view is a positive pair)
//   hsic_ib_loss  — normalised HSIC between two embedding sets,
//                   the information-bottleneck penalty
//
// All functions reduce to a one-element tensor so they can be
// weighted and summed before a single backward pass.

use burn::{
    nn::loss::CrossEntropyLossConfig,
    prelude::*,
    tensor::activation::log_sigmoid,
};

const NORM_EPS: f64 = 1e-12;

/// BPR loss and the L2 penalty of the gathered rows.
///
///   bpr = −mean(log σ(⟨u,i⟩ − ⟨u,j⟩))
///   reg = (‖U‖² + ‖I‖² + ‖J‖²) / (2 · batch)
pub fn bpr_loss<B: Backend>(
    user_emb:  Tensor<B, 2>,
    item_emb:  Tensor<B, 2>,
    users:     Tensor<B, 1, Int>,
    pos_items: Tensor<B, 1, Int>,
    neg_items: Tensor<B, 1, Int>,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let u = user_emb.select(0, users);
    let i = item_emb.clone().select(0, pos_items);
    let j = item_emb.select(0, neg_items);
    let batch = u.dims()[0].max(1) as f64;

    let pos_scores = (u.clone() * i.clone()).sum_dim(1);
    let neg_scores = (u.clone() * j.clone()).sum_dim(1);
    let bpr = log_sigmoid(pos_scores - neg_scores).mean().neg();

    let reg = (squared_norm(u) + squared_norm(i) + squared_norm(j)).div_scalar(2.0 * batch);
    (bpr, reg)
}

fn squared_norm<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 1> {
    (x.clone() * x).sum()
}

/// Row-wise L2 normalisation.
pub fn l2_normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = (x.clone() * x.clone()).sum_dim(1).sqrt().clamp_min(NORM_EPS);
    x / norm
}

/// InfoNCE with cosine similarities: row k of `view` must pick row
/// k of `anchor` among all rows of `anchor`.
pub fn info_nce<B: Backend>(view: Tensor<B, 2>, anchor: Tensor<B, 2>, temperature: f64) -> Tensor<B, 1> {
    let device = view.device();
    let n = view.dims()[0];

    let logits = l2_normalize(view)
        .matmul(l2_normalize(anchor).transpose())
        .div_scalar(temperature);
    let targets = Tensor::<B, 1, Int>::arange(0..n as i64, &device);

    CrossEntropyLossConfig::new().init(&device).forward(logits, targets)
}

/// Gaussian kernel matrix, centred on the right (`K·H`, `H = I − 1/m`).
///
/// Kernel variance is `2σ²·d` so the bandwidth scales with the
/// embedding dimension.
fn centered_kernel<B: Backend>(x: Tensor<B, 2>, sigma: f64) -> Tensor<B, 2> {
    let [_, d] = x.dims();
    let sq = (x.clone() * x.clone()).sum_dim(1);
    let dist = (sq.clone() + sq.transpose() - x.clone().matmul(x.transpose()).mul_scalar(2.0))
        .clamp_min(0.0);

    let variance = 2.0 * sigma * sigma * d as f64;
    let k = dist.div_scalar(variance).neg().exp();
    k.clone() - k.mean_dim(1)
}

/// Normalised HSIC: `Pxy / sqrt(Pxx · Pyy)` with `Pab = mean(Ka ⊙ Kbᵀ)`.
/// 1 for identical inputs, close to 0 for independent ones.
///
/// A single row has an all-zero centred kernel; the loss is then 0
/// with a zero gradient.
pub fn hsic_ib_loss<B: Backend>(x: Tensor<B, 2>, y: Tensor<B, 2>, sigma: f64) -> Tensor<B, 1> {
    if x.dims()[0] < 2 {
        return (x.sum() + y.sum()).mul_scalar(0.0);
    }

    let kx = centered_kernel(x, sigma);
    let ky = centered_kernel(y, sigma);

    let pxy = (kx.clone() * ky.clone().transpose()).mean();
    let pxx = (kx.clone() * kx.transpose()).mean();
    let pyy = (ky.clone() * ky.transpose()).mean();

    pxy / (pxx * pyy).add_scalar(NORM_EPS).sqrt()
}
