use camino::Utf8Path;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{HopError, Result};

/// Contents of `.hop/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Version of the tool that last touched this repository. The
    /// migrator compares it against its own targets.
    pub hop_version: Version,
    /// URL of the shared remote. The tool refuses to operate without
    /// one: the remote is the coordination substrate.
    pub git_origin: String,
    /// Development clone. When false only `deploy` and `status` are
    /// allowed: the clone follows production and never writes refs.
    #[serde(default = "default_devel")]
    pub devel: bool,
    /// Tables whose content is dumped into `seed-X.Y.Z.sql` at
    /// promotion time. Empty means no seed artifact.
    #[serde(default)]
    pub seed_tables: Vec<String>,
}

fn default_devel() -> bool {
    true
}

impl Config {
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot read {path}: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("malformed {path}: {e}")))?;
        Ok(config)
    }

    pub fn store(&self, path: &Utf8Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot serialize config: {e}")))?;
        fs_err::write(path, content)
            .map_err(|e| HopError::Internal(anyhow::anyhow!("cannot write {path}: {e}")))?;
        Ok(())
    }
}
