//! Server configuration loaded from a YAML file

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding the `.storage/` state
    pub config_dir: PathBuf,

    /// Default log filter, overridable with RUST_LOG
    pub log_level: String,

    /// Seconds between remote catalog refreshes
    pub refresh_interval_seconds: u64,

    /// Remote catalog endpoint, optional
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("."),
            log_level: "info".to_string(),
            refresh_interval_seconds: 300,
            remote: None,
        }
    }
}

impl ServerConfig {
    /// Load the configuration, falling back to defaults when the file
    /// does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}
