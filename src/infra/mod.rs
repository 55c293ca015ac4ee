// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the use cases and the trainers:
//
//   checkpoint.rs — best-encoder weights (CompactRecorder), the
//                   encoder config needed to rebuild it, the run
//                   config and the best ranking report
//
//   metrics.rs    — per-epoch loss accumulation, the metrics CSV
//                   and the early-stopping policy
//
//   run_paths.rs  — names of a run's log, metrics and checkpoint
//
//   logging.rs    — tracing subscriber (stdout + run log file)

/// Encoder checkpoint saving and loading
pub mod checkpoint;

/// Loss accumulation, metrics CSV, early stopping
pub mod metrics;

/// Run naming
pub mod run_paths;

/// Tracing setup
pub mod logging;
