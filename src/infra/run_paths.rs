// ============================================================
// Layer 6 — Run Paths
// ============================================================
// Every run writes three artefacts whose names share a tag:
//
//   <log_prefix><tag>.txt     text log (mirror of stdout)
//   <log_prefix><tag>.csv     per-epoch metrics
//   <param_prefix><tag>.*     checkpoint files
//
// Fair runs are tagged with their regularisation weights and the
// local start time: `lareg=0.5_ib_reg=30.0_sigma=0.35 10-19 1432`.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

pub const TIME_FORMAT: &str = "%m-%d %H%M";

/// Floats keep at least one decimal ("30.0", "0.35").
pub fn fair_run_tag(lareg: f64, ib_reg: f64, sigma: f64, started: DateTime<Local>) -> String {
    format!(
        "lareg={lareg:?}_ib_reg={ib_reg:?}_sigma={sigma:?} {}",
        started.format(TIME_FORMAT)
    )
}

pub fn timestamp(started: DateTime<Local>) -> String {
    started.format(TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub log:        PathBuf,
    pub metrics:    PathBuf,
    pub checkpoint: PathBuf,
}

impl RunPaths {
    /// Log, metrics and checkpoint all carry `tag`.
    pub fn tagged(log_prefix: &str, param_prefix: &str, tag: &str) -> Self {
        let log_base = format!("{log_prefix}{tag}");
        Self {
            log:        append(&log_base, ".txt"),
            metrics:    append(&log_base, ".csv"),
            checkpoint: PathBuf::from(format!("{param_prefix}{tag}")),
        }
    }

    /// Tagged logs, but the checkpoint goes exactly to `checkpoint`
    /// so later runs can point at a stable path.
    pub fn fixed_checkpoint(log_prefix: &str, tag: &str, checkpoint: &str) -> Self {
        let log_base = format!("{log_prefix}{tag}");
        Self {
            log:        append(&log_base, ".txt"),
            metrics:    append(&log_base, ".csv"),
            checkpoint: PathBuf::from(checkpoint),
        }
    }

    /// Create the parent directories of every artefact.
    pub fn create_dirs(&self) -> Result<()> {
        for path in [&self.log, &self.metrics, &self.checkpoint] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
            }
        }
        Ok(())
    }
}

fn append(base: impl AsRef<Path>, suffix: &str) -> PathBuf {
    let mut s: OsString = base.as_ref().as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
