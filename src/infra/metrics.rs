// ============================================================
// Layer 6 — Metrics Logger and Early Stopping
// ============================================================
// Records one CSV row per epoch: the batch-averaged loss terms
// followed by every ranking metric of that epoch's evaluation.
//
// Example (fair run, cutoffs 10/20/30):
//   epoch,bpr,emb,ib,lb_aug,ndcg@10,ndcg@20,...,js_eo@30
//   1,0.693012,0.000134,29.81,2.77,0.0121,...
//
// The header is written with the first row, since the metric
// columns depend on the evaluated cutoffs.
//
// EarlyStopper implements the model-selection policy: each epoch
// bumps a stale counter, a strictly better NDCG@10 resets it and
// marks the epoch as the new best, and training stops once the
// counter exceeds the patience.

use anyhow::{Context, Result};
use std::{
    fmt,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::ranking::RankingReport;

/// NDCG cutoff used for model selection.
pub const SELECTION_CUTOFF: usize = 10;

// ─── Loss accumulation ───────────────────────────────────────────────────────

/// Running sums of named loss terms over one epoch's batches.
#[derive(Debug, Clone)]
pub struct EpochLosses {
    names:   Vec<&'static str>,
    sums:    Vec<f64>,
    batches: usize,
}

impl EpochLosses {
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            names:   names.to_vec(),
            sums:    vec![0.0; names.len()],
            batches: 0,
        }
    }

    /// Add one batch; `values` are in the order of `names`.
    pub fn record(&mut self, values: &[f64]) {
        for (sum, v) in self.sums.iter_mut().zip(values) {
            *sum += v;
        }
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Batch means, NaN before the first batch.
    pub fn averages(&self) -> Vec<f64> {
        let n = self.batches as f64;
        self.sums
            .iter()
            .map(|s| if self.batches == 0 { f64::NAN } else { s / n })
            .collect()
    }

    /// First term whose batch mean is NaN or infinite.
    pub fn first_non_finite(&self) -> Option<(&'static str, f64)> {
        self.names
            .iter()
            .copied()
            .zip(self.averages())
            .find(|(_, v)| !v.is_finite())
    }
}

impl fmt::Display for EpochLosses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .names
            .iter()
            .zip(self.averages())
            .map(|(name, value)| format!("{name}:{value:.6}"))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

// ─── CSV logger ──────────────────────────────────────────────────────────────

pub struct MetricsLogger {
    csv_path:       PathBuf,
    header_written: bool,
}

impl MetricsLogger {
    /// Create (or truncate) the CSV at `csv_path`.
    pub fn new(csv_path: impl AsRef<Path>) -> Result<Self> {
        let csv_path = csv_path.as_ref().to_path_buf();
        if let Some(parent) = csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        File::create(&csv_path)
            .with_context(|| format!("Cannot create metrics CSV '{}'", csv_path.display()))?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        Ok(Self { csv_path, header_written: false })
    }

    /// Append one epoch's losses and evaluation report.
    pub fn log(&mut self, epoch: usize, losses: &EpochLosses, report: &RankingReport) -> Result<()> {
        let file = fs::OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open metrics CSV '{}'", self.csv_path.display()))?;
        let mut w = BufWriter::new(file);

        let entries = report.entries();
        if !self.header_written {
            let mut header: Vec<String> = vec!["epoch".to_string()];
            header.extend(losses.names().iter().map(|n| n.to_string()));
            header.extend(entries.iter().map(|(name, _)| name.clone()));
            writeln!(w, "{}", header.join(","))?;
            self.header_written = true;
        }

        let mut row: Vec<String> = vec![epoch.to_string()];
        row.extend(losses.averages().iter().map(|v| format!("{v:.6}")));
        row.extend(entries.iter().map(|(_, v)| format!("{v:.6}")));
        writeln!(w, "{}", row.join(","))?;
        w.flush()?;

        tracing::debug!("Logged epoch {} metrics to '{}'", epoch, self.csv_path.display());
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Early stopping ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// New best epoch; the caller should checkpoint.
    Improved,
    Continue,
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopper {
    patience:    usize,
    best:        f64,
    best_report: Option<RankingReport>,
    best_epoch:  Option<usize>,
    stale:       usize,
}

impl EarlyStopper {
    pub fn new(patience: usize) -> Self {
        Self { patience, best: 0.0, best_report: None, best_epoch: None, stale: 0 }
    }

    pub fn observe(&mut self, epoch: usize, report: &RankingReport) -> StopDecision {
        self.stale += 1;

        let score = report.ndcg(SELECTION_CUTOFF);
        if score > self.best {
            self.stale       = 0;
            self.best        = score;
            self.best_report = Some(report.clone());
            self.best_epoch  = Some(epoch);
            return StopDecision::Improved;
        }

        if self.stale > self.patience {
            StopDecision::Stop
        } else {
            StopDecision::Continue
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn best_report(&self) -> Option<&RankingReport> {
        self.best_report.as_ref()
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ranking::CutoffMetrics;

    fn report(ndcg10: f64) -> RankingReport {
        RankingReport {
            evaluated_users: 3,
            cutoffs: vec![CutoffMetrics { k: 10, ndcg: ndcg10, recall: 0.5, js_dp: 0.1, js_eo: 0.2 }],
        }
    }

    #[test]
    fn test_losses_average_and_display() {
        let mut l = EpochLosses::new(&["bpr", "emb"]);
        l.record(&[1.0, 0.5]);
        l.record(&[3.0, 0.5]);
        assert_eq!(l.batches(), 2);
        assert_eq!(l.averages(), vec![2.0, 0.5]);
        assert_eq!(l.first_non_finite(), None);
        assert_eq!(l.to_string(), "bpr:2.000000 emb:0.500000");
    }

    #[test]
    fn test_empty_epoch_is_nan() {
        let l = EpochLosses::new(&["bpr"]);
        assert!(l.averages()[0].is_nan());
    }

    #[test]
    fn test_non_finite_term_is_reported() {
        let mut l = EpochLosses::new(&["bpr", "ib"]);
        l.record(&[0.7, 0.1]);
        l.record(&[0.6, f64::NAN]);
        let (name, value) = l.first_non_finite().unwrap();
        assert_eq!(name, "ib");
        assert!(value.is_nan());
    }

    #[test]
    fn test_csv_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("metrics.csv");
        let mut logger = MetricsLogger::new(&path).unwrap();

        let mut l = EpochLosses::new(&["bpr", "emb"]);
        l.record(&[0.25, 0.125]);
        logger.log(1, &l, &report(0.3)).unwrap();
        logger.log(2, &l, &report(0.4)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,bpr,emb,ndcg@10,recall@10,js_dp@10,js_eo@10");
        assert_eq!(lines[1], "1,0.250000,0.125000,0.300000,0.500000,0.100000,0.200000");
        assert!(lines[2].starts_with("2,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_early_stopper_patience() {
        let mut s = EarlyStopper::new(2);
        assert_eq!(s.observe(1, &report(0.1)), StopDecision::Improved);
        assert_eq!(s.observe(2, &report(0.1)), StopDecision::Continue); // equal is not better
        assert_eq!(s.observe(3, &report(0.05)), StopDecision::Continue);
        assert_eq!(s.observe(4, &report(0.05)), StopDecision::Stop);
        assert_eq!(s.best_epoch(), Some(1));
        assert_eq!(s.best_report().map(|r| r.ndcg(10)), Some(0.1));
    }

    #[test]
    fn test_zero_ndcg_never_improves() {
        let mut s = EarlyStopper::new(0);
        assert_eq!(s.observe(1, &report(0.0)), StopDecision::Stop);
        assert!(s.best_report().is_none());
    }
}
