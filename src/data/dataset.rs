use std::collections::HashSet;
use std::sync::Arc;

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Attempts at drawing an unseen item before falling back to any item.
const MAX_NEGATIVE_DRAWS: usize = 64;

/// One BPR training example: user `user` prefers `pos` over `neg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BprTriple {
    pub user: usize,
    pub pos:  usize,
    pub neg:  usize,
}

/// Training pairs with on-the-fly negative sampling.
/// Every `get` draws a fresh negative for the stored `(user, pos)`.
pub struct BprDataset {
    pairs:   Vec<(usize, usize)>,
    seen:    Arc<Vec<HashSet<usize>>>,
    n_items: usize,
}

impl BprDataset {
    pub fn new(pairs: Vec<(usize, usize)>, train_u2i: &[Vec<usize>], n_items: usize) -> Self {
        let seen = train_u2i
            .iter()
            .map(|items| items.iter().copied().collect())
            .collect();
        Self { pairs, seen: Arc::new(seen), n_items }
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Copy with the pairs in a seeded random order.
    pub fn shuffled(&self, seed: u64) -> Self {
        let mut pairs = self.pairs.clone();
        pairs.shuffle(&mut StdRng::seed_from_u64(seed));
        Self { pairs, seen: Arc::clone(&self.seen), n_items: self.n_items }
    }

    fn sample_negative<R: Rng>(&self, user: usize, rng: &mut R) -> usize {
        let seen = self.seen.get(user);
        for _ in 0..MAX_NEGATIVE_DRAWS {
            let item = rng.gen_range(0..self.n_items);
            if !seen.is_some_and(|s| s.contains(&item)) {
                return item;
            }
        }
        // Users who interacted with (almost) everything.
        rng.gen_range(0..self.n_items)
    }
}

impl Dataset<BprTriple> for BprDataset {
    fn get(&self, index: usize) -> Option<BprTriple> {
        let &(user, pos) = self.pairs.get(index)?;
        let neg = self.sample_negative(user, &mut rand::thread_rng());
        Some(BprTriple { user, pos, neg })
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negatives_are_unseen() {
        let u2i = vec![vec![0, 1, 2], vec![3]];
        let ds  = BprDataset::new(vec![(0, 0), (0, 1), (1, 3)], &u2i, 5);

        assert_eq!(ds.len(), 3);
        for _ in 0..200 {
            let t = ds.get(0).unwrap();
            assert_eq!((t.user, t.pos), (0, 0));
            assert!(t.neg == 3 || t.neg == 4);

            let t = ds.get(2).unwrap();
            assert_ne!(t.neg, 3);
        }
        assert!(ds.get(3).is_none());
    }

    #[test]
    fn test_shuffled_is_a_seeded_permutation() {
        let pairs: Vec<(usize, usize)> = (0..32).map(|u| (u, 0)).collect();
        let u2i = vec![vec![0]; 32];
        let ds  = BprDataset::new(pairs.clone(), &u2i, 4);

        let a = ds.shuffled(7);
        let b = ds.shuffled(7);
        assert_eq!(a.pairs, b.pairs);
        assert_ne!(a.pairs, pairs);
        assert_ne!(a.pairs, ds.shuffled(8).pairs);

        let mut sorted = a.pairs.clone();
        sorted.sort();
        assert_eq!(sorted, pairs);
    }

    #[test]
    fn test_saturated_user_still_gets_an_item() {
        let u2i = vec![vec![0, 1]];
        let ds  = BprDataset::new(vec![(0, 0)], &u2i, 2);
        let t   = ds.get(0).unwrap();
        assert!(t.neg < 2);
    }
}
