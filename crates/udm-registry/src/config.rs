//! Resolver configuration (`udm.toml`).
//!
//! Every field is optional in the file:
//!
//! ```toml
//! host = "https://github.com"
//! manifest_file = "dependencies.json"
//! cache_dir = "dependencies"
//! timeout_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "udm.toml";

/// Settings for one resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Base URL for both tag listing and archive downloads.
    pub host: String,
    /// Manifest file name looked up in every package directory.
    pub manifest_file: String,
    /// Cache root, relative to the working directory unless absolute.
    pub cache_dir: PathBuf,
    /// Per-request timeout for archive downloads, in seconds.
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            host: "https://github.com".to_string(),
            manifest_file: "dependencies.json".to_string(),
            cache_dir: PathBuf::from("dependencies"),
            timeout_secs: 60,
        }
    }
}

impl ResolverConfig {
    /// Parse a config from a TOML string.
    pub fn parse(s: &str, origin: &Path) -> Result<Self> {
        let config: ResolverConfig = toml::from_str(s).map_err(|e| RegistryError::Config {
            path: origin.to_path_buf(),
            detail: e.to_string(),
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    /// Load `path`, or defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Cache root resolved against `base`.
    pub fn cache_root(&self, base: &Path) -> PathBuf {
        base.join(&self.cache_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        let invalid = |detail: &str| RegistryError::Config {
            path: origin.to_path_buf(),
            detail: detail.to_string(),
        };
        if self.host.trim().is_empty() {
            return Err(invalid("host must not be empty"));
        }
        if self.manifest_file.is_empty() || self.manifest_file.contains(['/', '\\']) {
            return Err(invalid("manifest_file must be a plain file name"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be positive"));
        }
        Ok(())
    }
}
