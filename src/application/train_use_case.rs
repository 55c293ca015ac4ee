// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one fairness-constrained training run:
//
//   Step 1: Load the interaction bundle        (Layer 4 - data)
//   Step 2: Pick the sensitive attribute       (Layer 3 - domain)
//   Step 3: Save the run config                (Layer 6 - infra)
//   Step 4: Build graph + BPR dataset          (Layer 3/4)
//   Step 5: Load the pretrained encoder        (Layer 6 - infra)
//   Step 6: Train the sensitive encoder        (Layer 5 - ml)
//   Step 7: Run the fair training loop         (Layer 5 - ml)

use anyhow::{ensure, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::data::{dataset::BprDataset, loader::BundleLoader};
use crate::domain::{
    bundle::{class_count, InteractionBundle},
    graph::InteractionGraph,
    ranking::DEFAULT_CUTOFFS,
    traits::InteractionSource,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    run_paths::{fair_run_tag, RunPaths},
};
use crate::ml::{
    backend::{dispatch, Accelerator, BackendTask},
    evaluator::EvalContext,
    trainer::{run_fair_training, FairTrainingInputs, TrainingOutcome},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters of a fair run. Serialisable so the run can
// be saved next to its checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dataset:        String,
    pub sensitive_attr: String,
    pub emb_size:       usize,
    pub n_layers:       usize,
    pub lr:             f64,
    pub l2_reg:         f64,
    pub batch_size:     usize,
    pub num_workers:    usize,
    pub log_path:       String,
    pub param_path:     String,
    pub pretrain_path:  String,
    pub bpr_reg:        f64,
    pub lareg:          f64,
    pub ib_reg:         f64,
    pub sigma:          f64,
    pub tau:            f64,
    /// Relaxed-Bernoulli temperature of the graph sampler.
    pub temperature:    f64,
    pub sim_epochs:     usize,
    pub num_epochs:     usize,
    pub patience:       usize,
    pub seed:           Option<u64>,
    pub device:         Accelerator,
}

impl Default for TrainConfig {
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
            log_path:       "logs/aug_ib/lastfm/fm_".to_string(),
            param_path:     "param/aug_ib/lastfm/fm_".to_string(),
            pretrain_path:  "param/gcn_base_lastfm".to_string(),
            bpr_reg:        1.0,
            lareg:          0.5,
            ib_reg:         30.0,
            sigma:          0.35,
            tau:            0.3,
            temperature:    1.0,
            sim_epochs:     1000,
            num_epochs:     1000,
            patience:       30,
            seed:           None,
            device:         Accelerator::Cpu,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.emb_size > 0, "emb_size must be positive");
        ensure!(self.n_layers > 0, "n_layers must be positive");
        ensure!(self.lr > 0.0, "lr must be positive, got {}", self.lr);
        ensure!(self.sigma > 0.0, "sigma must be positive, got {}", self.sigma);
        ensure!(self.tau > 0.0, "tau must be positive, got {}", self.tau);
        ensure!(self.temperature > 0.0, "temperature must be positive, got {}", self.temperature);
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    paths:  RunPaths,
}

impl TrainUseCase {
    /// Validates the config and names the run after the current time.
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        let tag   = fair_run_tag(config.lareg, config.ib_reg, config.sigma, Local::now());
        let paths = RunPaths::tagged(&config.log_path, &config.param_path, &tag);
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

        // ── Step 2: Sensitive labels ──────────────────────────────────────────
        let sens = bundle
            .sensitive(&cfg.sensitive_attr)
            .with_context(|| format!("Dataset '{}' cannot be used for a fair run", cfg.dataset))?;
        tracing::info!(
            "Sensitive attribute '{}': {} classes",
            cfg.sensitive_attr,
            class_count(&sens)
        );

        // ── Step 3: Save config beside the checkpoint ─────────────────────────
        let checkpoint = CheckpointManager::new(&self.paths.checkpoint)?;
        checkpoint.save_run_config(cfg)?;

        // ── Steps 4-7 run on the selected backend ─────────────────────────────
        dispatch(cfg.device, FairRun { cfg, paths: &self.paths, bundle, sens, checkpoint })
    }
}

struct FairRun<'a> {
    cfg:        &'a TrainConfig,
    paths:      &'a RunPaths,
    bundle:     InteractionBundle,
    sens:       Vec<usize>,
    checkpoint: CheckpointManager,
}

impl BackendTask for FairRun<'_> {
    type Output = TrainingOutcome;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<TrainingOutcome> {
        let Self { cfg, paths, bundle, sens, checkpoint } = self;
        if let Some(seed) = cfg.seed {
            B::seed(seed);
        }

        // ── Step 4: Graph and BPR dataset ─────────────────────────────────────
        let graph   = InteractionGraph::new(bundle.n_users, bundle.n_items, &bundle.train_u2i);
        let dataset = BprDataset::new(bundle.train_set.clone(), &bundle.train_u2i, bundle.n_items);
        tracing::info!(
            "Training graph: {} nodes, {} edges, {} BPR pairs",
            graph.n_nodes(),
            graph.edge_count(),
            dataset.pair_count()
        );

        // ── Step 5: Frozen pretrained encoder ─────────────────────────────────
        let (pretrained, pretrained_cfg) =
            CheckpointManager::open(&cfg.pretrain_path).load_encoder::<B>(&device)?;
        ensure!(
            pretrained_cfg.n_users == bundle.n_users && pretrained_cfg.n_items == bundle.n_items,
            "Pretrained encoder '{}' covers {} users / {} items, dataset has {} / {}",
            cfg.pretrain_path,
            pretrained_cfg.n_users,
            pretrained_cfg.n_items,
            bundle.n_users,
            bundle.n_items
        );

        let eval = EvalContext {
            train_u2i: bundle.train_u2i,
            test_u2i:  bundle.test_u2i,
            sens:      sens.clone(),
            cutoffs:   DEFAULT_CUTOFFS.to_vec(),
            workers:   cfg.num_workers,
        };
        let mut metrics = MetricsLogger::new(&paths.metrics)?;

        // ── Steps 6-7: Sensitive encoder, then the fair loop (Layer 5) ───────
        let inputs = FairTrainingInputs { graph, dataset, pretrained, sens };
        run_fair_training::<B>(cfg, inputs, &eval, &checkpoint, &mut metrics, &device)
    }
}
