// ============================================================
// Layer 5 — Fair Training Loop
// ============================================================
// Joint training of the LightGCN encoder and the feature mask.
//
// Before the loop:
//   - the sensitive encoder (SemiGCN) is fitted to the sensitive
//     labels; its embeddings e_su / e_si are then frozen
//   - the pretrained encoder gives frozen e_xu / e_xi
//
// Every epoch:
//   1. perturb the training graph from the gap between the
//      current and pretrained scores, rebuild its adjacency
//   2. for each shuffled mini-batch:
//        z   = encoder(original graph)
//        aug = masked ego embeddings propagated on the perturbed graph
//        loss = bpr(z) + bpr_reg·bpr(aug) + l2_reg·reg(z)
//             + lareg·(nce(aug_u,z_u) + nce(aug_i,z_i) + nce(z_u,aug_u) + nce(z_i,aug_i))
//             + ib_reg·hsic(aug_u[U], e_su[U])
//      InfoNCE and HSIC run on the batch's distinct users (U) and
//      positive items.
//   3. evaluate on the original graph, checkpoint on a better
//      NDCG@10, stop once the early-stop counter runs out
//
// Training uses B (an AutodiffBackend); evaluation runs on
// model.valid(), i.e. B::InnerBackend.

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::epoch_loader, dataset::BprDataset};
use crate::domain::{bundle::class_count, graph::InteractionGraph, ranking::RankingReport};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EarlyStopper, EpochLosses, MetricsLogger, StopDecision},
};
use crate::ml::{
    augment::{augmented_propagate, GraphAugmenter, SensitiveView},
    evaluator::EvalContext,
    feature_mask::{FeatureMask, FeatureMaskConfig},
    graph_ops::SparseAdjacency,
    lightgcn::{LightGcn, LightGcnConfig},
    losses::{bpr_loss, hsic_ib_loss, info_nce},
    sampler::RelaxedBernoulli,
    semigcn::{train_sensitive_encoder, SemiGcnConfig},
};

/// Base seed of the per-epoch pair shuffle when the run has none.
pub(crate) const DEFAULT_SHUFFLE_SEED: u64 = 42;

const FAIR_LOSS_TERMS: [&str; 4] = ["bpr", "emb", "ib", "lb_aug"];

/// The parameters the fair run optimises jointly.
#[derive(Module, Debug)]
pub struct FairRecModel<B: Backend> {
    pub encoder:      LightGcn<B>,
    pub feature_mask: FeatureMask<B>,
}

pub struct FairTrainingInputs<B: Backend> {
    pub graph:      InteractionGraph,
    pub dataset:    BprDataset,
    /// Frozen pretrained encoder, the reference for graph perturbation.
    pub pretrained: LightGcn<B>,
    pub sens:       Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub epochs_run:    usize,
    pub stopped_early: bool,
    pub best_epoch:    Option<usize>,
    pub best_report:   Option<RankingReport>,
}

// ─── Model selection ──────────────────────────────────────────────────────────
// Shared end-of-epoch policy of the pretraining and fair loops.
pub(crate) struct ModelSelector<'a> {
    pub eval:       &'a EvalContext,
    pub checkpoint: &'a CheckpointManager,
    pub metrics:    &'a mut MetricsLogger,
    pub stopper:    EarlyStopper,
    pub config:     LightGcnConfig,
}

impl ModelSelector<'_> {
    /// Logs the epoch, evaluates `encoder` and checkpoints it on
    /// improvement. Returns true once training should stop.
    pub fn after_epoch<I: Backend>(
        &mut self,
        epoch:   usize,
        losses:  &EpochLosses,
        encoder: &LightGcn<I>,
        adj:     &SparseAdjacency<I>,
    ) -> Result<bool> {
        tracing::info!("epoch: {}, {}", epoch, losses);
        if let Some((term, value)) = losses.first_non_finite() {
            bail!("epoch {epoch}: loss term '{term}' is {value}, training diverged");
        }

        let report = self.eval.evaluate(encoder, adj)?;
        tracing::info!("{}", report);
        self.metrics.log(epoch, losses, &report)?;

        match self.stopper.observe(epoch, &report) {
            StopDecision::Improved => {
                self.checkpoint.save_encoder(encoder, &self.config)?;
                self.checkpoint.save_report(&report)?;
                tracing::info!("save successful: '{}'", self.checkpoint.base().display());
                Ok(false)
            }
            StopDecision::Continue => Ok(false),
            StopDecision::Stop => {
                tracing::info!("early_stop, best perf: ndcg@10 = {:.6}", self.stopper.best());
                match self.stopper.best_report() {
                    Some(best) => tracing::info!("{}", best),
                    None => tracing::warn!("no epoch improved on ndcg@10 = 0"),
                }
                Ok(true)
            }
        }
    }

    pub fn finish(self, epochs_run: usize, stopped_early: bool) -> TrainingOutcome {
        TrainingOutcome {
            epochs_run,
            stopped_early,
            best_epoch:  self.stopper.best_epoch(),
            best_report: self.stopper.best_report().cloned(),
        }
    }
}

// ─── Fair run ─────────────────────────────────────────────────────────────────
pub fn run_fair_training<B: AutodiffBackend>(
    cfg:        &TrainConfig,
    inputs:     FairTrainingInputs<B>,
    eval:       &EvalContext,
    checkpoint: &CheckpointManager,
    metrics:    &mut MetricsLogger,
    device:     &B::Device,
) -> Result<TrainingOutcome> {
    let FairTrainingInputs { graph, dataset, pretrained, sens } = inputs;
    let n_users = graph.n_users();
    let n_items = graph.n_items();

    let adj       = SparseAdjacency::<B>::from_coo(&graph.normalized_adjacency(), device);
    let adj_valid = SparseAdjacency::<B::InnerBackend>::from_coo(&graph.normalized_adjacency(), device);

    // ── Frozen views ──────────────────────────────────────────────────────────
    let (pre_users, pre_items) = pretrained.forward(&adj);
    let pretrained_view = (pre_users.detach(), pre_items.detach());

    let semi_cfg = SemiGcnConfig::new(
        LightGcnConfig::new(n_users, n_items, cfg.emb_size, cfg.n_layers),
        class_count(&sens),
    );
    let (sens_enc, _) =
        train_sensitive_encoder(semi_cfg.init::<B>(device), &adj, &sens, cfg.lr, cfg.sim_epochs, device)?;
    let sens_out = sens_enc.forward(&adj);
    let sensitive = SensitiveView {
        users: sens_out.user_emb.detach(),
        items: sens_out.item_emb.detach(),
    };

    // ── Model + Adam ──────────────────────────────────────────────────────────
    let encoder_cfg = LightGcnConfig::new(n_users, n_items, cfg.emb_size, cfg.n_layers);
    let mut model = FairRecModel {
        encoder:      encoder_cfg.init::<B>(device),
        feature_mask: FeatureMaskConfig::new(cfg.emb_size).init::<B>(device),
    };
    let mut optim = AdamConfig::new().init();
    tracing::info!("Model ready: {} layers, emb_size={}", cfg.n_layers, cfg.emb_size);

    let augmenter = GraphAugmenter::<B>::new(&graph, RelaxedBernoulli::new(cfg.temperature), device);

    let shuffle_seed = cfg.seed.unwrap_or(DEFAULT_SHUFFLE_SEED);

    let mut selector = ModelSelector {
        eval,
        checkpoint,
        metrics,
        stopper: EarlyStopper::new(cfg.patience),
        config:  encoder_cfg,
    };

    let mut epochs_run = 0;
    for epoch in 0..cfg.num_epochs {
        epochs_run = epoch + 1;

        // ── Graph perturbation ────────────────────────────────────────────────
        let current  = model.encoder.forward(&adj);
        let perturbed = augmenter.perturbed_graph(current, pretrained_view.clone())?;
        let adj_aug = SparseAdjacency::<B>::from_coo(&perturbed.normalized_adjacency(), device);
        tracing::debug!(
            "epoch {epoch}: kept {}/{} edges, {} non-zeros over {} nodes",
            perturbed.edge_count(),
            augmenter.edge_count(),
            adj_aug.nnz(),
            adj_aug.size()
        );

        // ── Mini-batches ──────────────────────────────────────────────────────
        let loader = epoch_loader::<B>(
            &dataset,
            shuffle_seed.wrapping_add(epoch as u64),
            cfg.batch_size,
            cfg.num_workers,
            device,
        );
        let mut losses = EpochLosses::new(&FAIR_LOSS_TERMS);
        for batch in loader.iter() {
            let z = model.encoder.forward_with_ego(&adj);
            let (aug_users, aug_items) =
                augmented_propagate(&adj_aug, &z, &sensitive, &model.feature_mask, cfg.n_layers);

            let (bpr1, reg) = bpr_loss(
                z.users.clone(), z.items.clone(),
                batch.users.clone(), batch.pos_items.clone(), batch.neg_items.clone(),
            );
            let (bpr2, _) = bpr_loss(
                aug_users.clone(), aug_items.clone(),
                batch.users, batch.pos_items, batch.neg_items,
            );
            let bpr = bpr1 + bpr2.mul_scalar(cfg.bpr_reg);
            let emb = reg.mul_scalar(cfg.l2_reg);

            let z_u   = z.users.select(0, batch.unique_users.clone());
            let z_i   = z.items.select(0, batch.unique_items.clone());
            let aug_u = aug_users.select(0, batch.unique_users.clone());
            let aug_i = aug_items.select(0, batch.unique_items);

            let lb_aug = (info_nce(aug_u.clone(), z_u.clone(), cfg.tau)
                + info_nce(aug_i.clone(), z_i.clone(), cfg.tau)
                + info_nce(z_u, aug_u.clone(), cfg.tau)
                + info_nce(z_i, aug_i, cfg.tau))
                .mul_scalar(cfg.lareg);

            let e_su = sensitive.users.clone().select(0, batch.unique_users);
            let ib   = hsic_ib_loss(aug_u, e_su, cfg.sigma).mul_scalar(cfg.ib_reg);

            let loss = bpr.clone() + emb.clone() + lb_aug.clone() + ib.clone();
            losses.record(&[
                bpr.into_scalar().elem::<f64>(),
                emb.into_scalar().elem::<f64>(),
                ib.into_scalar().elem::<f64>(),
                lb_aug.into_scalar().elem::<f64>(),
            ]);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.lr, model, grads);
        }

        // ── Evaluation + selection ────────────────────────────────────────────
        let encoder_valid = model.encoder.valid();
        if selector.after_epoch(epoch, &losses, &encoder_valid, &adj_valid)? {
            return Ok(selector.finish(epochs_run, true));
        }
    }

    tracing::info!("Training complete!");
    Ok(selector.finish(epochs_run, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bundle::fixtures::toy_bundle;
    use crate::domain::ranking::DEFAULT_CUTOFFS;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn toy_config(dir: &std::path::Path) -> TrainConfig {
        TrainConfig {
            emb_size:    8,
            n_layers:    2,
            lr:          0.01,
            batch_size:  4,
            num_workers: 1,
            sim_epochs:  5,
            num_epochs:  3,
            patience:    1,
            seed:        Some(1),
            log_path:    format!("{}/logs/fm_", dir.display()),
            param_path:  format!("{}/param/fm_", dir.display()),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_fair_training_runs_on_toy_bundle() {
        TestBackend::seed(5);
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = toy_config(dir.path());
        let bundle = toy_bundle();
        let device = Default::default();

        let graph   = InteractionGraph::new(bundle.n_users, bundle.n_items, &bundle.train_u2i);
        let dataset = BprDataset::new(bundle.train_set.clone(), &bundle.train_u2i, bundle.n_items);
        let pretrained = LightGcnConfig::new(bundle.n_users, bundle.n_items, 8, 2)
            .init::<TestBackend>(&device);
        let sens = bundle.sensitive("gender").unwrap();

        let eval = EvalContext {
            train_u2i: bundle.train_u2i.clone(),
            test_u2i:  bundle.test_u2i.clone(),
            sens:      sens.clone(),
            cutoffs:   DEFAULT_CUTOFFS.to_vec(),
            workers:   1,
        };
        let checkpoint  = CheckpointManager::new(dir.path().join("param").join("fm_toy")).unwrap();
        let mut metrics = MetricsLogger::new(dir.path().join("fm_toy.csv")).unwrap();

        let inputs  = FairTrainingInputs { graph, dataset, pretrained, sens };
        let outcome = run_fair_training::<TestBackend>(
            &cfg, inputs, &eval, &checkpoint, &mut metrics, &device,
        ).unwrap();

        assert!(outcome.epochs_run >= 1 && outcome.epochs_run <= 3);
        // Every toy user's test item is always in the top 10, so the
        // first epoch already beats the initial 0.
        assert!(outcome.best_epoch.is_some());
        assert!(checkpoint.weights_path().exists());
        assert!(checkpoint.report_path().exists());

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert!(csv.starts_with("epoch,bpr,emb,ib,lb_aug,ndcg@10"));
        assert_eq!(csv.lines().count(), outcome.epochs_run + 1);
    }

    #[test]
    fn test_single_row_batches_keep_weights_finite() {
        // 10 training pairs in batches of 3: the last batch has one user.
        TestBackend::seed(9);
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = TrainConfig { batch_size: 3, num_epochs: 2, ..toy_config(dir.path()) };
        let bundle = toy_bundle();
        let device = Default::default();
        assert_eq!(bundle.train_set.len() % cfg.batch_size, 1);

        let graph   = InteractionGraph::new(bundle.n_users, bundle.n_items, &bundle.train_u2i);
        let dataset = BprDataset::new(bundle.train_set.clone(), &bundle.train_u2i, bundle.n_items);
        let pretrained = LightGcnConfig::new(bundle.n_users, bundle.n_items, 8, 2)
            .init::<TestBackend>(&device);
        let sens = bundle.sensitive("gender").unwrap();

        let eval = EvalContext {
            train_u2i: bundle.train_u2i.clone(),
            test_u2i:  bundle.test_u2i.clone(),
            sens:      sens.clone(),
            cutoffs:   DEFAULT_CUTOFFS.to_vec(),
            workers:   1,
        };
        let checkpoint  = CheckpointManager::new(dir.path().join("param").join("fm_single")).unwrap();
        let mut metrics = MetricsLogger::new(dir.path().join("fm_single.csv")).unwrap();

        let inputs  = FairTrainingInputs { graph, dataset, pretrained, sens };
        let outcome = run_fair_training::<TestBackend>(
            &cfg, inputs, &eval, &checkpoint, &mut metrics, &device,
        ).unwrap();
        assert!(outcome.best_epoch.is_some());

        let (encoder, _) = checkpoint.load_encoder::<NdArray>(&device).unwrap();
        let users: Vec<f32> = encoder.user_embedding.val().into_data().convert::<f32>().to_vec().unwrap();
        let items: Vec<f32> = encoder.item_embedding.val().into_data().convert::<f32>().to_vec().unwrap();
        assert!(users.iter().chain(&items).all(|v| v.is_finite()));
    }
}
