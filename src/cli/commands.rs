// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Three subcommands:
//   pretrain — plain LightGCN, the reference encoder of `train`
//   train    — the fairness-constrained run
//   evaluate — score a saved encoder
//
// Each Args struct converts into its application-layer config;
// the application layer never sees clap types.

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    evaluate_use_case::EvaluateConfig,
    pretrain_use_case::PretrainConfig,
    train_use_case::TrainConfig,
};
use crate::ml::backend::Accelerator;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pretrain the LightGCN reference encoder
    Pretrain(PretrainArgs),

    /// Train the fairness-constrained recommender
    Train(TrainArgs),

    /// Evaluate a saved encoder on a dataset
    Evaluate(EvaluateArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceArg {
    /// NdArray on the CPU
    Cpu,
    /// WebGPU
    Wgpu,
}

impl From<DeviceArg> for Accelerator {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Cpu  => Accelerator::Cpu,
            DeviceArg::Wgpu => Accelerator::Wgpu,
        }
    }
}

/// Flags shared by `pretrain` and `train`.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// JSON interaction bundle
    #[arg(long, default_value = "./data/lastfm-360k/process/process.json")]
    pub dataset: String,

    /// Name of the sensitive user attribute in `user_side_features`
    #[arg(long, default_value = "gender")]
    pub sensitive_attr: String,

    /// Embedding dimension
    #[arg(long, default_value_t = 64)]
    pub emb_size: usize,

    /// Propagation layers
    #[arg(long, default_value_t = 3)]
    pub n_layers: usize,

    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,

    /// Weight of the L2 penalty on the batch embeddings
    #[arg(long, default_value_t = 0.001)]
    pub l2_reg: f64,

    #[arg(long, default_value_t = 4096)]
    pub batch_size: usize,

    /// Data loader threads; also sizes the evaluation pool
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 1000)]
    pub num_epochs: usize,

    /// Epochs without a better NDCG@10 before stopping
    #[arg(long, default_value_t = 30)]
    pub patience: usize,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = DeviceArg::Cpu)]
    pub device: DeviceArg,
}

#[derive(Args, Debug)]
pub struct PretrainArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Log prefix; a timestamp and .txt/.csv are appended
    #[arg(long, default_value = "logs/gcn_base/lastfm/base_")]
    pub log_path: String,

    /// Checkpoint base path, written as-is
    #[arg(long, default_value = "param/gcn_base_lastfm")]
    pub param_path: String,
}

impl From<PretrainArgs> for PretrainConfig {
    fn from(a: PretrainArgs) -> Self {
        let c = a.common;
        PretrainConfig {
            dataset:        c.dataset,
            sensitive_attr: c.sensitive_attr,
            emb_size:       c.emb_size,
            n_layers:       c.n_layers,
            lr:             c.lr,
            l2_reg:         c.l2_reg,
            batch_size:     c.batch_size,
            num_workers:    c.num_workers,
            log_path:       a.log_path,
            param_path:     a.param_path,
            num_epochs:     c.num_epochs,
            patience:       c.patience,
            seed:           c.seed,
            device:         c.device.into(),
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Log prefix; the run tag and .txt/.csv are appended
    #[arg(long, default_value = "logs/aug_ib/lastfm/fm_")]
    pub log_path: String,

    /// Checkpoint prefix; the run tag is appended
    #[arg(long, default_value = "param/aug_ib/lastfm/fm_")]
    pub param_path: String,

    /// Checkpoint written by `pretrain`
    #[arg(long, default_value = "param/gcn_base_lastfm")]
    pub pretrain_path: String,

    /// Weight of the BPR loss on the augmented view
    #[arg(long, default_value_t = 1.0)]
    pub bpr_reg: f64,

    /// Weight of the contrastive terms
    #[arg(long, default_value_t = 0.5)]
    pub lareg: f64,

    /// Weight of the HSIC information-bottleneck term
    #[arg(long, default_value_t = 30.0)]
    pub ib_reg: f64,

    /// HSIC kernel bandwidth
    #[arg(long, default_value_t = 0.35)]
    pub sigma: f64,

    /// InfoNCE temperature
    #[arg(long, default_value_t = 0.3)]
    pub tau: f64,

    /// Relaxed-Bernoulli temperature of the edge sampler
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f64,

    /// Full-batch epochs of the sensitive-attribute encoder
    #[arg(long, default_value_t = 1000)]
    pub sim_epochs: usize,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let c = a.common;
        TrainConfig {
            dataset:        c.dataset,
            sensitive_attr: c.sensitive_attr,
            emb_size:       c.emb_size,
            n_layers:       c.n_layers,
            lr:             c.lr,
            l2_reg:         c.l2_reg,
            batch_size:     c.batch_size,
            num_workers:    c.num_workers,
            log_path:       a.log_path,
            param_path:     a.param_path,
            pretrain_path:  a.pretrain_path,
            bpr_reg:        a.bpr_reg,
            lareg:          a.lareg,
            ib_reg:         a.ib_reg,
            sigma:          a.sigma,
            tau:            a.tau,
            temperature:    a.temperature,
            sim_epochs:     a.sim_epochs,
            num_epochs:     c.num_epochs,
            patience:       c.patience,
            seed:           c.seed,
            device:         c.device.into(),
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Checkpoint base path (as given to `--param-path`)
    #[arg(long)]
    pub checkpoint: String,

    #[arg(long, default_value = "./data/lastfm-360k/process/process.json")]
    pub dataset: String,

    #[arg(long, default_value = "gender")]
    pub sensitive_attr: String,

    /// Comma-separated ranking cutoffs
    #[arg(long, value_delimiter = ',', default_value = "10,20,30")]
    pub cutoffs: Vec<usize>,

    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long, value_enum, default_value_t = DeviceArg::Cpu)]
    pub device: DeviceArg,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            checkpoint:     a.checkpoint,
            dataset:        a.dataset,
            sensitive_attr: a.sensitive_attr,
            cutoffs:        a.cutoffs,
            num_workers:    a.num_workers,
            device:         a.device.into(),
        }
    }
}
