// ============================================================
// Layer 3 — Ranking Evaluation
// ============================================================
// Full-ranking evaluation of user/item embeddings.
//
// For every user with at least one test item:
//   1. score every item by dot product
//   2. drop the user's training items
//   3. keep the top max(cutoffs) items
//
// Utility (averaged over evaluated users):
//   ndcg@k   = DCG@k / IDCG@k, binary relevance, log2 discount
//   recall@k = |top-k ∩ test| / |test|
//
// Fairness (between sensitive groups, lower is fairer):
//   js_dp@k  = JS divergence of the groups' top-k item distributions
//   js_eo@k  = JS divergence of the groups' hit item distributions
//   Divergences use log base 2, so they lie in [0, 1]. With more
//   than two groups the pairwise divergences are averaged.

use std::collections::HashSet;
use std::fmt;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::bundle::class_count;
use crate::domain::embedding::EmbeddingTable;

pub const DEFAULT_CUTOFFS: [usize; 3] = [10, 20, 30];

/// Metrics at one cutoff `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutoffMetrics {
    pub k:      usize,
    pub ndcg:   f64,
    pub recall: f64,
    pub js_dp:  f64,
    pub js_eo:  f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub evaluated_users: usize,
    pub cutoffs:         Vec<CutoffMetrics>,
}

impl RankingReport {
    pub fn at(&self, k: usize) -> Option<&CutoffMetrics> {
        self.cutoffs.iter().find(|c| c.k == k)
    }

    /// NDCG at `k`, or 0.0 when `k` was not evaluated.
    pub fn ndcg(&self, k: usize) -> f64 {
        self.at(k).map_or(0.0, |c| c.ndcg)
    }

    /// `(name, value)` pairs grouped by metric, then by cutoff.
    pub fn entries(&self) -> Vec<(String, f64)> {
        let mut out = Vec::with_capacity(self.cutoffs.len() * 4);
        for c in &self.cutoffs {
            out.push((format!("ndcg@{}", c.k), c.ndcg));
        }
        for c in &self.cutoffs {
            out.push((format!("recall@{}", c.k), c.recall));
        }
        for c in &self.cutoffs {
            out.push((format!("js_dp@{}", c.k), c.js_dp));
        }
        for c in &self.cutoffs {
            out.push((format!("js_eo@{}", c.k), c.js_eo));
        }
        out
    }
}

impl fmt::Display for RankingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries()
            .into_iter()
            .map(|(name, value)| format!("{name}:[{value:.6}]"))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Borrowed view of everything one evaluation needs.
pub struct RankingInput<'a> {
    pub users:     &'a EmbeddingTable,
    pub items:     &'a EmbeddingTable,
    pub train_u2i: &'a [Vec<usize>],
    pub test_u2i:  &'a [Vec<usize>],
    pub sens:      &'a [usize],
}

struct UserRanking {
    group: usize,
    test:  HashSet<usize>,
    top:   Vec<usize>,
}

pub fn ranking_evaluate(
    input:   &RankingInput<'_>,
    cutoffs: &[usize],
    workers: usize,
) -> Result<RankingReport> {
    if input.users.dim() != input.items.dim() {
        bail!(
            "user embedding dim {} != item embedding dim {}",
            input.users.dim(),
            input.items.dim()
        );
    }
    if input.sens.len() < input.users.rows() {
        bail!(
            "{} sensitive labels for {} users",
            input.sens.len(),
            input.users.rows()
        );
    }
    let max_k = cutoffs.iter().copied().max().unwrap_or(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .context("Failed to build evaluation thread pool")?;

    let rankings: Vec<UserRanking> = pool.install(|| {
        (0..input.users.rows())
            .into_par_iter()
            .filter(|&u| input.test_u2i.get(u).is_some_and(|t| !t.is_empty()))
            .map(|u| UserRanking {
                group: input.sens[u],
                test:  input.test_u2i[u].iter().copied().collect(),
                top:   top_k_items(input, u, max_k),
            })
            .collect()
    });

    let n_groups = class_count(input.sens);
    let n_items  = input.items.rows();
    let evaluated = rankings.len();

    let cutoffs = cutoffs
        .iter()
        .map(|&k| {
            let mut ndcg_sum   = 0.0;
            let mut recall_sum = 0.0;
            let mut rec_counts = vec![vec![0.0f64; n_items]; n_groups];
            let mut hit_counts = vec![vec![0.0f64; n_items]; n_groups];

            for r in &rankings {
                let top = &r.top[..k.min(r.top.len())];
                ndcg_sum   += ndcg_at(top, &r.test, k);
                recall_sum += top.iter().filter(|i| r.test.contains(*i)).count() as f64
                    / r.test.len() as f64;

                for &item in top {
                    rec_counts[r.group][item] += 1.0;
                    if r.test.contains(&item) {
                        hit_counts[r.group][item] += 1.0;
                    }
                }
            }

            let denom = evaluated.max(1) as f64;
            CutoffMetrics {
                k,
                ndcg:   ndcg_sum / denom,
                recall: recall_sum / denom,
                js_dp:  mean_pairwise_js(&rec_counts),
                js_eo:  mean_pairwise_js(&hit_counts),
            }
        })
        .collect();

    Ok(RankingReport { evaluated_users: evaluated, cutoffs })
}

/// Best `k` unseen items for user `u`, highest score first.
/// Ties are broken by the lower item id.
fn top_k_items(input: &RankingInput<'_>, u: usize, k: usize) -> Vec<usize> {
    let seen: HashSet<usize> = input
        .train_u2i
        .get(u)
        .map(|items| items.iter().copied().collect())
        .unwrap_or_default();

    let scores = input.items.scores(input.users.row(u));
    let mut candidates: Vec<(usize, f32)> = scores
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !seen.contains(i))
        .collect();

    let by_score = |a: &(usize, f32), b: &(usize, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));

    if k == 0 {
        return Vec::new();
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, by_score);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(by_score);
    candidates.into_iter().map(|(i, _)| i).collect()
}

fn ndcg_at(top: &[usize], test: &HashSet<usize>, k: usize) -> f64 {
    let discount = |rank: usize| 1.0 / ((rank + 2) as f64).log2();
    let dcg: f64 = top
        .iter()
        .enumerate()
        .filter(|(_, item)| test.contains(*item))
        .map(|(rank, _)| discount(rank))
        .sum();
    let idcg: f64 = (0..test.len().min(k)).map(discount).sum();
    if idcg == 0.0 { 0.0 } else { dcg / idcg }
}

/// Average JS divergence over all pairs of groups that have any mass.
fn mean_pairwise_js(counts: &[Vec<f64>]) -> f64 {
    let dists: Vec<Vec<f64>> = counts
        .iter()
        .filter_map(|c| {
            let total: f64 = c.iter().sum();
            (total > 0.0).then(|| c.iter().map(|v| v / total).collect())
        })
        .collect();

    let mut sum   = 0.0;
    let mut pairs = 0usize;
    for a in 0..dists.len() {
        for b in (a + 1)..dists.len() {
            sum += js_divergence(&dists[a], &dists[b]);
            pairs += 1;
        }
    }
    if pairs == 0 { 0.0 } else { sum / pairs as f64 }
}

pub fn js_divergence(p: &[f64], q: &[f64]) -> f64 {
    let kl_to_mid = |x: &[f64], y: &[f64]| -> f64 {
        x.iter()
            .zip(y)
            .filter(|(xi, _)| **xi > 0.0)
            .map(|(&xi, &yi)| xi * (xi / ((xi + yi) / 2.0)).log2())
            .sum()
    };
    0.5 * kl_to_mid(p, q) + 0.5 * kl_to_mid(q, p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn report() -> RankingReport {
        // user 0 → (1,0), user 1 → (0,1)
        let users = EmbeddingTable::new(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        // item scores for user 0: 1, 0, .5, -1 ; for user 1: 0, 1, .5, -1
        let items = EmbeddingTable::new(
            4, 2,
            vec![1.0, 0.0, 0.0, 1.0, 0.5, 0.5, -1.0, -1.0],
        ).unwrap();
        let train = vec![vec![], vec![1]];
        let test  = vec![vec![0], vec![0]];
        let sens  = vec![0, 1];
        let input = RankingInput {
            users: &users, items: &items,
            train_u2i: &train, test_u2i: &test, sens: &sens,
        };
        ranking_evaluate(&input, &[1, 2], 2).unwrap()
    }

    #[test]
    fn test_utility_metrics() {
        let r = report();
        assert_eq!(r.evaluated_users, 2);

        // user 0 hits at rank 0, user 1 (item 1 excluded) ranks [2, 0, 3]
        assert!(close(r.ndcg(1), 0.5));
        assert!(close(r.ndcg(2), (1.0 + 1.0 / 3f64.log2()) / 2.0));
        assert!(close(r.at(1).unwrap().recall, 0.5));
        assert!(close(r.at(2).unwrap().recall, 1.0));
    }

    #[test]
    fn test_fairness_metrics() {
        let r = report();
        // @1: group 0 gets item 0, group 1 gets item 2 → disjoint
        assert!(close(r.at(1).unwrap().js_dp, 1.0));
        // @1: group 1 has no hits → no comparable pair
        assert!(close(r.at(1).unwrap().js_eo, 0.0));
        // @2: both groups get {0, 2} and hit {0}
        assert!(close(r.at(2).unwrap().js_dp, 0.0));
        assert!(close(r.at(2).unwrap().js_eo, 0.0));
    }

    #[test]
    fn test_users_without_test_items_are_skipped() {
        let users = EmbeddingTable::new(2, 1, vec![1.0, 1.0]).unwrap();
        let items = EmbeddingTable::new(2, 1, vec![1.0, 2.0]).unwrap();
        let train = vec![vec![], vec![]];
        let test  = vec![vec![1], vec![]];
        let sens  = vec![0, 0];
        let input = RankingInput {
            users: &users, items: &items,
            train_u2i: &train, test_u2i: &test, sens: &sens,
        };
        let r = ranking_evaluate(&input, &[10], 1).unwrap();
        assert_eq!(r.evaluated_users, 1);
        assert!(close(r.ndcg(10), 1.0));
        assert!(close(r.ndcg(20), 0.0));
    }

    #[test]
    fn test_js_divergence_bounds() {
        assert!(close(js_divergence(&[0.5, 0.5], &[0.5, 0.5]), 0.0));
        assert!(close(js_divergence(&[1.0, 0.0], &[0.0, 1.0]), 1.0));
        let mid = js_divergence(&[0.9, 0.1], &[0.1, 0.9]);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn test_display_format() {
        let r = RankingReport {
            evaluated_users: 1,
            cutoffs: vec![CutoffMetrics { k: 10, ndcg: 0.25, recall: 0.5, js_dp: 0.0, js_eo: 0.125 }],
        };
        assert_eq!(
            r.to_string(),
            "ndcg@10:[0.250000] recall@10:[0.500000] js_dp@10:[0.000000] js_eo@10:[0.125000]"
        );
    }
}
