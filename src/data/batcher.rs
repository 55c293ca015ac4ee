// ============================================================
// Layer 4 — BPR Batcher
// ============================================================
// Implements Burn's Batcher trait: a Vec<BprTriple> becomes
// four Int tensors on the target device.
//
//   users / pos_items / neg_items  — shape [batch]
//   unique_users / unique_items    — sorted distinct ids [≤ batch]
//
// The unique id tensors select the rows the contrastive and
// independence terms are computed on, so each user or item
// contributes once per batch however many triples mention it.
//
// epoch_loader shuffles the whole pair list before handing it to
// Burn's loader: with several workers, each thread reads one
// contiguous slice of the dataset and only shuffles inside it.

use std::{collections::BTreeSet, sync::Arc};

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::data::dataset::{BprDataset, BprTriple};

#[derive(Debug, Clone)]
pub struct BprBatch<B: Backend> {
    pub users:        Tensor<B, 1, Int>,
    pub pos_items:    Tensor<B, 1, Int>,
    pub neg_items:    Tensor<B, 1, Int>,
    pub unique_users: Tensor<B, 1, Int>,
    pub unique_items: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct BprBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> BprBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn ids(&self, values: Vec<i64>) -> Tensor<B, 1, Int> {
        Tensor::<B, 1, Int>::from_ints(values.as_slice(), &self.device)
    }
}

fn distinct(values: impl Iterator<Item = usize>) -> Vec<i64> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|v| v as i64)
        .collect()
}

impl<B: Backend> Batcher<BprTriple, BprBatch<B>> for BprBatcher<B> {
    fn batch(&self, items: Vec<BprTriple>) -> BprBatch<B> {
        let users: Vec<i64> = items.iter().map(|t| t.user as i64).collect();
        let pos:   Vec<i64> = items.iter().map(|t| t.pos as i64).collect();
        let neg:   Vec<i64> = items.iter().map(|t| t.neg as i64).collect();

        let unique_users = distinct(items.iter().map(|t| t.user));
        let unique_items = distinct(items.iter().map(|t| t.pos));

        BprBatch {
            users:        self.ids(users),
            pos_items:    self.ids(pos),
            neg_items:    self.ids(neg),
            unique_users: self.ids(unique_users),
            unique_items: self.ids(unique_items),
        }
    }
}

/// Loader for one epoch over a globally shuffled copy of `dataset`.
pub fn epoch_loader<B: Backend>(
    dataset:     &BprDataset,
    seed:        u64,
    batch_size:  usize,
    num_workers: usize,
    device:      &B::Device,
) -> Arc<dyn DataLoader<BprBatch<B>>> {
    DataLoaderBuilder::new(BprBatcher::<B>::new(device.clone()))
        .batch_size(batch_size)
        .num_workers(num_workers.max(1))
        .build(dataset.shuffled(seed))
}
