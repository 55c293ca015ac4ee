// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the best encoder of a run using Burn's
// CompactRecorder.
//
// All files share one base path (e.g. `param/aug_ib/lastfm/fm_
// lareg=0.5_ib_reg=30.0_sigma=0.35 10-19 1432`):
//
//   <base>.mpk           encoder weights (named MessagePack, half precision)
//   <base>.encoder.json  LightGcnConfig needed to rebuild the encoder
//   <base>.run.json      the run's training configuration
//   <base>.best.json     ranking report of the saved epoch
//
// Suffixes are appended rather than set as extensions, since run
// names contain dots ("sigma=0.35").

use anyhow::{anyhow, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::ranking::RankingReport;
use crate::ml::lightgcn::{LightGcn, LightGcnConfig};

/// Placeholder extension the recorder swaps for its own.
const RECORD_STEM_SUFFIX: &str = ".model";
const RECORD_SUFFIX:      &str = ".mpk";

pub struct CheckpointManager {
    base: PathBuf,
}

impl CheckpointManager {
    /// Creates the parent directory of `base` if needed.
    pub fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create checkpoint directory '{}'", parent.display()))?;
        }
        Ok(Self { base })
    }

    /// Manager for an existing checkpoint; nothing is created.
    pub fn open(base: impl AsRef<Path>) -> Self {
        Self { base: base.as_ref().to_path_buf() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut s: OsString = self.base.as_os_str().to_owned();
        s.push(suffix);
        PathBuf::from(s)
    }

    /// The weights file as written by the recorder.
    pub fn weights_path(&self) -> PathBuf {
        self.with_suffix(RECORD_SUFFIX)
    }

    pub fn encoder_config_path(&self) -> PathBuf {
        self.with_suffix(".encoder.json")
    }

    pub fn run_config_path(&self) -> PathBuf {
        self.with_suffix(".run.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.with_suffix(".best.json")
    }

    pub fn save_encoder<B: Backend>(&self, encoder: &LightGcn<B>, config: &LightGcnConfig) -> Result<()> {
        CompactRecorder::new()
            .record(encoder.clone().into_record(), self.with_suffix(RECORD_STEM_SUFFIX))
            .with_context(|| format!("Failed to save checkpoint to '{}'", self.weights_path().display()))?;

        let path = self.encoder_config_path();
        config
            .save(&path)
            .with_context(|| format!("Cannot write encoder config to '{}'", path.display()))?;

        tracing::debug!("Saved encoder to '{}'", self.weights_path().display());
        Ok(())
    }

    pub fn load_encoder_config(&self) -> Result<LightGcnConfig> {
        let path = self.encoder_config_path();
        LightGcnConfig::load(&path).map_err(|e| {
            anyhow!(
                "Cannot read encoder config '{}': {e:?}. Has this checkpoint been written by `pretrain` or `train`?",
                path.display()
            )
        })
    }

    /// Rebuild the encoder from its saved config and load its weights.
    pub fn load_encoder<B: Backend>(&self, device: &B::Device) -> Result<(LightGcn<B>, LightGcnConfig)> {
        let config = self.load_encoder_config()?;
        let record = CompactRecorder::new()
            .load(self.with_suffix(RECORD_STEM_SUFFIX), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", self.weights_path().display()))?;

        tracing::info!("Loaded encoder from '{}'", self.weights_path().display());
        Ok((config.init::<B>(device).load_record(record), config))
    }

    pub fn save_run_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        write_json(&self.run_config_path(), cfg)
    }

    pub fn load_run_config<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.run_config_path();
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read run config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse run config '{}'", path.display()))
    }

    pub fn save_report(&self, report: &RankingReport) -> Result<()> {
        write_json(&self.report_path(), report)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::debug!("Wrote '{}'", path.display());
    Ok(())
}
