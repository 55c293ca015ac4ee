// ============================================================
// Layer 6 — Logging
// ============================================================
// One tracing subscriber per process:
//   - EnvFilter, `fair_graph_rec=info` unless RUST_LOG says otherwise
//   - stdout layer
//   - optional plain-text (no ANSI) layer into the run's log file,
//     so the .txt file mirrors what was printed

use anyhow::{Context, Result};
use std::{fs::File, path::Path, sync::Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "fair_graph_rec=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

pub fn init(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create log directory '{}'", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("Cannot create log file '{}'", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_target(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("A tracing subscriber is already installed")?;

    if let Some(path) = log_file {
        tracing::info!("Logging to '{}'", path.display());
    }
    Ok(())
}
