// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Reloads a saved encoder and scores it on a dataset bundle with
// the same ranking metrics the training loops use.

use anyhow::{ensure, Result};
use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::data::loader::BundleLoader;
use crate::domain::{
    bundle::InteractionBundle,
    graph::InteractionGraph,
    ranking::{RankingReport, DEFAULT_CUTOFFS},
    traits::InteractionSource,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    backend::{dispatch, Accelerator, BackendTask},
    evaluator::EvalContext,
    graph_ops::SparseAdjacency,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateConfig {
    pub checkpoint:     String,
    pub dataset:        String,
    pub sensitive_attr: String,
    pub cutoffs:        Vec<usize>,
    pub num_workers:    usize,
    pub device:         Accelerator,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            checkpoint:     "param/gcn_base_lastfm".to_string(),
            dataset:        "./data/lastfm-360k/process/process.json".to_string(),
            sensitive_attr: "gender".to_string(),
            cutoffs:        DEFAULT_CUTOFFS.to_vec(),
            num_workers:    4,
            device:         Accelerator::Cpu,
        }
    }
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Result<Self> {
        ensure!(!config.cutoffs.is_empty(), "at least one cutoff is required");
        ensure!(config.cutoffs.iter().all(|&k| k > 0), "cutoffs must be positive");
        Ok(Self { config })
    }

    pub fn execute(&self) -> Result<RankingReport> {
        let cfg    = &self.config;
        let bundle = BundleLoader::new(&cfg.dataset).load()?;
        let sens   = bundle.sensitive(&cfg.sensitive_attr)?;
        dispatch(cfg.device, Evaluate { cfg, bundle, sens })
    }
}

struct Evaluate<'a> {
    cfg:    &'a EvaluateConfig,
    bundle: InteractionBundle,
    sens:   Vec<usize>,
}

impl BackendTask for Evaluate<'_> {
    type Output = RankingReport;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<RankingReport> {
        let Self { cfg, bundle, sens } = self;

        let checkpoint = CheckpointManager::open(&cfg.checkpoint);
        match checkpoint.load_run_config::<serde_json::Value>() {
            Ok(run) => tracing::info!("Checkpoint trained with: {}", run),
            Err(e) => tracing::warn!("{:#}", e),
        }
        let (encoder, encoder_cfg) = checkpoint.load_encoder::<B>(&device)?;
        ensure!(
            encoder_cfg.n_users == bundle.n_users && encoder_cfg.n_items == bundle.n_items,
            "Checkpoint '{}' covers {} users / {} items, dataset has {} / {}",
            cfg.checkpoint,
            encoder_cfg.n_users,
            encoder_cfg.n_items,
            bundle.n_users,
            bundle.n_items
        );

        let graph = InteractionGraph::new(bundle.n_users, bundle.n_items, &bundle.train_u2i);
        let adj   = SparseAdjacency::<B::InnerBackend>::from_coo(&graph.normalized_adjacency(), &device);

        let eval = EvalContext {
            train_u2i: bundle.train_u2i,
            test_u2i:  bundle.test_u2i,
            sens,
            cutoffs:   cfg.cutoffs.clone(),
            workers:   cfg.num_workers,
        };
        let report = eval.evaluate(&encoder.valid(), &adj)?;
        tracing::info!("{}", report);
        Ok(report)
    }
}
