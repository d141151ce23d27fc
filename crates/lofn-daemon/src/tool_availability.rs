//! Host tool discovery
//!
//! The harness shells out to `gcloud` (emulator + env-init) and `npx`
//! (functions-framework). Both are checked once at startup so a missing tool
//! fails fast with an install hint instead of a confusing spawn error
//! mid-session.

use which::which;

use lofn_core::prelude::*;

/// Cached availability of the external tools the harness drives
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Whether `gcloud` is on PATH (Google Cloud SDK)
    pub gcloud: bool,

    /// Whether `npx` is on PATH (Node.js)
    pub npx: bool,
}

impl ToolAvailability {
    /// Check tool availability (run once at startup)
    pub fn check() -> Self {
        Self {
            gcloud: which("gcloud").is_ok(),
            npx: which("npx").is_ok(),
        }
    }

    /// Fail fast when a required tool is missing.
    pub fn require(&self) -> Result<()> {
        if !self.gcloud {
            return Err(Error::GcloudNotFound);
        }
        if !self.npx {
            return Err(Error::NpxNotFound);
        }
        Ok(())
    }
}
