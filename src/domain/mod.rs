// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types for the recommendation problem:
//
//   bundle.rs     — the interaction data of one experiment
//   graph.rs      — the user/item bipartite graph and its
//                   normalised adjacency (COO)
//   embedding.rs  — CPU copies of embedding matrices
//   ranking.rs    — top-k utility and group fairness metrics
//   traits.rs     — data source abstraction
//
// Nothing in here depends on burn.

pub mod bundle;

pub mod graph;

pub mod embedding;

pub mod ranking;

pub mod traits;
