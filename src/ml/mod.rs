// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here; other layers see plain Rust types
// (graphs, embedding tables, reports) or go through use cases.
//
//   graph_ops.rs    — sparse normalised adjacency on the device,
//                     layer propagation and layer mean
//   lightgcn.rs     — LightGCN encoder
//   semigcn.rs      — sensitive-attribute encoder + its training
//   feature_mask.rs — gate over fused behaviour/sensitive features
//   sampler.rs      — relaxed Bernoulli, straight-through
//   augment.rs      — per-epoch graph perturbation and the
//                     augmented propagation
//   losses.rs       — BPR, InfoNCE, normalised HSIC
//   evaluator.rs    — encoder → ranking metrics
//   trainer.rs      — the fair training loop, model selection
//   pretrainer.rs   — plain LightGCN pretraining
//   backend.rs      — runtime choice of NdArray / WGPU

pub mod graph_ops;
pub mod lightgcn;
pub mod semigcn;
pub mod feature_mask;
pub mod sampler;
pub mod augment;
pub mod losses;
pub mod evaluator;
pub mod trainer;
pub mod pretrainer;
pub mod backend;
