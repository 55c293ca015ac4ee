// ============================================================
// Layer 5 — Encoder Evaluation
// ============================================================
// Runs the encoder on the original training graph, copies the
// user/item embeddings to the CPU and hands them to the ranking
// metrics in the domain layer.

use anyhow::Result;
use burn::prelude::*;

use crate::domain::ranking::{ranking_evaluate, RankingInput, RankingReport};
use crate::ml::graph_ops::{to_table, SparseAdjacency};
use crate::ml::lightgcn::LightGcn;

/// Everything evaluation needs besides the encoder itself.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub train_u2i: Vec<Vec<usize>>,
    pub test_u2i:  Vec<Vec<usize>>,
    pub sens:      Vec<usize>,
    pub cutoffs:   Vec<usize>,
    pub workers:   usize,
}

impl EvalContext {
    /// Score precomputed user/item embeddings.
    pub fn evaluate_embeddings<B: Backend>(
        &self,
        users: Tensor<B, 2>,
        items: Tensor<B, 2>,
    ) -> Result<RankingReport> {
        let users = to_table(users)?;
        let items = to_table(items)?;
        let input = RankingInput {
            users:     &users,
            items:     &items,
            train_u2i: &self.train_u2i,
            test_u2i:  &self.test_u2i,
            sens:      &self.sens,
        };
        ranking_evaluate(&input, &self.cutoffs, self.workers)
    }

    /// Forward the encoder over `adj` and score the result.
    pub fn evaluate<B: Backend>(
        &self,
        encoder: &LightGcn<B>,
        adj:     &SparseAdjacency<B>,
    ) -> Result<RankingReport> {
        let (users, items) = encoder.forward(adj);
        self.evaluate_embeddings(users, items)
    }
}
