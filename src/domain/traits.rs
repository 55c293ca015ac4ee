// ============================================================
// Layer 3 — Core Traits
// ============================================================
// The application layer talks to data sources through this
// trait so the on-disk bundle format can change without
// touching the training workflow.

use anyhow::Result;

use crate::domain::bundle::InteractionBundle;

// ─── InteractionSource ────────────────────────────────────────────────────────
/// Anything that can produce a validated interaction bundle.
///
/// Implementations:
///   - BundleLoader → reads a JSON bundle from disk
pub trait InteractionSource {
    fn load(&self) -> Result<InteractionBundle>;
}
