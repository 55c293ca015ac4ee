// ============================================================
// Layer 2 — PretrainUseCase
// ============================================================
// Trains the plain LightGCN whose checkpoint the fair run loads
// through `--pretrain-path`:
//
//   Step 1: Load the interaction bundle        (Layer 4 - data)
//   Step 2: Save the run config                (Layer 6 - infra)
//   Step 3: Build graph + BPR dataset          (Layer 3/4)
//   Step 4: Run the pretraining loop           (Layer 5 - ml)
//
// The checkpoint goes exactly to `param_path` (no run tag) so the
// fair run's default `--pretrain-path` finds it.

use anyhow::{ensure, Result};
use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::data::{dataset::BprDataset, loader::BundleLoader};
use crate::domain::{
    bundle::InteractionBundle,
    graph::InteractionGraph,
    ranking::DEFAULT_CUTOFFS,
    traits::InteractionSource,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    run_paths::{timestamp, RunPaths},
};
use crate::ml::{
    backend::{dispatch, Accelerator, BackendTask},
    evaluator::EvalContext,
    pretrainer::run_pretraining,
    trainer::TrainingOutcome,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainConfig {
    pub dataset:        String,
    /// Only used for the fairness columns of the evaluation.
    pub sensitive_attr: String,
    pub emb_size:       usize,
    pub n_layers:       usize,
    pub lr:             f64,
    pub l2_reg:         f64,
    pub batch_size:     usize,
    pub num_workers:    usize,
    pub log_path:       String,
    pub param_path:     String,
    pub num_epochs:     usize,
    pub patience:       usize,
    pub seed:           Option<u64>,
    pub device:         Accelerator,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            dataset:        "./data/lastfm-360k/process/process.json".to_string(),
            sensitive_attr: "gender".to_string(),
            emb_size:       64,
            n_layers:       3,
            lr:             0.001,
            l2_reg:         0.001,
            batch_size:     4096,
            num_workers:    4,
            log_path:       "logs/gcn_base/lastfm/base_".to_string(),
            param_path:     "param/gcn_base_lastfm".to_string(),
            num_epochs:     1000,
            patience:       30,
            seed:           None,
            device:         Accelerator::Cpu,
        }
    }
}

impl PretrainConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.emb_size > 0, "emb_size must be positive");
        ensure!(self.n_layers > 0, "n_layers must be positive");
        ensure!(self.lr > 0.0, "lr must be positive, got {}", self.lr);
        Ok(())
    }
}

pub struct PretrainUseCase {
    config: PretrainConfig,
    paths:  RunPaths,
}

impl PretrainUseCase {
    pub fn new(config: PretrainConfig) -> Result<Self> {
        config.validate()?;
        let paths = RunPaths::fixed_checkpoint(&config.log_path, &timestamp(Local::now()), &config.param_path);
        Ok(Self { config, paths })
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    pub fn execute(&self) -> Result<TrainingOutcome> {
        let cfg = &self.config;
        tracing::info!("{:?}", cfg);
        self.paths.create_dirs()?;

        // ── Step 1: Load the dataset bundle ──────────────────────────────────
        let bundle = BundleLoader::new(&cfg.dataset).load()?;
        let sens   = bundle.sensitive(&cfg.sensitive_attr)?;

        // ── Step 2: Save config beside the checkpoint ─────────────────────────
        let checkpoint = CheckpointManager::new(&self.paths.checkpoint)?;
        checkpoint.save_run_config(cfg)?;

        // ── Steps 3-4 run on the selected backend ─────────────────────────────
        dispatch(cfg.device, Pretrain { cfg, paths: &self.paths, bundle, sens, checkpoint })
    }
}

struct Pretrain<'a> {
    cfg:        &'a PretrainConfig,
    paths:      &'a RunPaths,
    bundle:     InteractionBundle,
    sens:       Vec<usize>,
    checkpoint: CheckpointManager,
}

impl BackendTask for Pretrain<'_> {
    type Output = TrainingOutcome;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<TrainingOutcome> {
        let Self { cfg, paths, bundle, sens, checkpoint } = self;
        if let Some(seed) = cfg.seed {
            B::seed(seed);
        }

        // ── Step 3: Graph and BPR dataset ─────────────────────────────────────
        let graph   = InteractionGraph::new(bundle.n_users, bundle.n_items, &bundle.train_u2i);
        let dataset = BprDataset::new(bundle.train_set.clone(), &bundle.train_u2i, bundle.n_items);

        let eval = EvalContext {
            train_u2i: bundle.train_u2i,
            test_u2i:  bundle.test_u2i,
            sens,
            cutoffs:   DEFAULT_CUTOFFS.to_vec(),
            workers:   cfg.num_workers,
        };
        let mut metrics = MetricsLogger::new(&paths.metrics)?;

        // ── Step 4: Training loop (Layer 5) ───────────────────────────────────
        run_pretraining::<B>(cfg, &graph, dataset, &eval, &checkpoint, &mut metrics, &device)
    }
}
