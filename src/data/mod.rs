// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From a bundle file on disk to tensor batches:
//
//   bundle.json
//       │
//       ▼
//   BundleLoader   → parses + validates the InteractionBundle
//       │
//       ▼
//   BprDataset     → (user, pos) pairs + fresh negative per read
//       │
//       ▼
//   BprBatcher     → Int tensors, plus the batch's distinct ids
//       │
//       ▼
//   DataLoader     → shuffled mini-batches for the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the JSON interaction bundle
pub mod loader;

/// Implements Burn's Dataset trait for BPR triples
pub mod dataset;

/// Implements Burn's Batcher trait for BPR triples
pub mod batcher;
