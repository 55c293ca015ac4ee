// ============================================================
// Layer 5 — LightGCN Pretraining
// ============================================================
// Plain LightGCN on BPR + L2. The resulting checkpoint is the
// frozen reference encoder of the fair run (its scores drive
// the graph perturbation). Evaluation, checkpointing and early
// stopping follow the fair loop.

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::pretrain_use_case::PretrainConfig;
use crate::data::{batcher::epoch_loader, dataset::BprDataset};
use crate::domain::graph::InteractionGraph;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EarlyStopper, EpochLosses, MetricsLogger},
};
use crate::ml::{
    evaluator::EvalContext,
    graph_ops::SparseAdjacency,
    lightgcn::LightGcnConfig,
    losses::bpr_loss,
    trainer::{ModelSelector, TrainingOutcome, DEFAULT_SHUFFLE_SEED},
};

const PRETRAIN_LOSS_TERMS: [&str; 2] = ["bpr", "emb"];

pub fn run_pretraining<B: AutodiffBackend>(
    cfg:        &PretrainConfig,
    graph:      &InteractionGraph,
    dataset:    BprDataset,
    eval:       &EvalContext,
    checkpoint: &CheckpointManager,
    metrics:    &mut MetricsLogger,
    device:     &B::Device,
) -> Result<TrainingOutcome> {
    let coo       = graph.normalized_adjacency();
    let adj       = SparseAdjacency::<B>::from_coo(&coo, device);
    let adj_valid = SparseAdjacency::<B::InnerBackend>::from_coo(&coo, device);

    let encoder_cfg = LightGcnConfig::new(graph.n_users(), graph.n_items(), cfg.emb_size, cfg.n_layers);
    let mut encoder = encoder_cfg.init::<B>(device);
    let mut optim   = AdamConfig::new().init();

    let shuffle_seed = cfg.seed.unwrap_or(DEFAULT_SHUFFLE_SEED);

    let mut selector = ModelSelector {
        eval,
        checkpoint,
        metrics,
        stopper: EarlyStopper::new(cfg.patience),
        config:  encoder_cfg,
    };

    for epoch in 0..cfg.num_epochs {
        let mut losses = EpochLosses::new(&PRETRAIN_LOSS_TERMS);
        let loader = epoch_loader::<B>(
            &dataset,
            shuffle_seed.wrapping_add(epoch as u64),
            cfg.batch_size,
            cfg.num_workers,
            device,
        );

        for batch in loader.iter() {
            let (users, items) = encoder.forward(&adj);
            let (bpr, reg) = bpr_loss(users, items, batch.users, batch.pos_items, batch.neg_items);
            let emb  = reg.mul_scalar(cfg.l2_reg);
            let loss = bpr.clone() + emb.clone();

            losses.record(&[bpr.into_scalar().elem::<f64>(), emb.into_scalar().elem::<f64>()]);

            let grads = GradientsParams::from_grads(loss.backward(), &encoder);
            encoder = optim.step(cfg.lr, encoder, grads);
        }

        if selector.after_epoch(epoch, &losses, &encoder.valid(), &adj_valid)? {
            return Ok(selector.finish(epoch + 1, true));
        }
    }

    tracing::info!("Pretraining complete!");
    Ok(selector.finish(cfg.num_epochs, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{bundle::fixtures::toy_bundle, ranking::DEFAULT_CUTOFFS};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_pretraining_saves_best_encoder() {
        let dir    = tempfile::tempdir().unwrap();
        let bundle = toy_bundle();
        let device = Default::default();

        let cfg = PretrainConfig {
            emb_size:    8,
            n_layers:    2,
            lr:          0.01,
            batch_size:  4,
            num_workers: 1,
            num_epochs:  2,
            seed:        Some(3),
            ..PretrainConfig::default()
        };
        let graph   = InteractionGraph::new(bundle.n_users, bundle.n_items, &bundle.train_u2i);
        let dataset = BprDataset::new(bundle.train_set.clone(), &bundle.train_u2i, bundle.n_items);
        let eval = EvalContext {
            train_u2i: bundle.train_u2i.clone(),
            test_u2i:  bundle.test_u2i.clone(),
            sens:      bundle.sensitive("gender").unwrap(),
            cutoffs:   DEFAULT_CUTOFFS.to_vec(),
            workers:   1,
        };
        let checkpoint  = CheckpointManager::new(dir.path().join("gcn_base")).unwrap();
        let mut metrics = MetricsLogger::new(dir.path().join("base.csv")).unwrap();

        let outcome = run_pretraining::<TestBackend>(
            &cfg, &graph, dataset, &eval, &checkpoint, &mut metrics, &device,
        ).unwrap();

        assert_eq!(outcome.epochs_run, 2);
        assert!(!outcome.stopped_early);
        assert!(outcome.best_report.is_some());

        let (encoder, encoder_cfg) = checkpoint.load_encoder::<NdArray>(&device).unwrap();
        assert_eq!(encoder_cfg.emb_size, 8);
        assert_eq!(encoder.n_users, bundle.n_users);
    }
}
