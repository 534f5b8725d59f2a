//! HALO configuration.
//!
//! Loads configuration from a YAML file. Every field has a default so
//! an empty (or absent) file yields a working configuration.
//!
//! ```yaml
//! session:
//!   max_buffered_messages: 30
//!   metric_halflife_ms: 250000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config filename.
const CONFIG_FILENAME: &str = "halo.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session manager tunables (`session.*`).
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::ReadFile { path: path.to_path_buf(), source }
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Load from `./halo.yaml` if present, defaults otherwise.
    pub fn load() -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = PathBuf::from(CONFIG_FILENAME);
        if path.exists() {
            Ok((Self::load_from(&path)?, Some(path)))
        } else {
            Ok((Self::default(), None))
        }
    }
}

/// Session manager tunables (`session.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Ceiling on packets buffered while a path search is outstanding
    /// (`session.max_buffered_messages`).
    #[serde(default = "SessionConfig::default_max_buffered_messages")]
    pub max_buffered_messages: usize,

    /// Metric decay halflife in milliseconds
    /// (`session.metric_halflife_ms`). Retained for interface
    /// compatibility; current logic does not decay metrics.
    #[serde(default = "SessionConfig::default_metric_halflife_ms")]
    pub metric_halflife_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_buffered_messages: 30,
            metric_halflife_ms: 250_000,
        }
    }
}

impl SessionConfig {
    fn default_max_buffered_messages() -> usize { 30 }
    fn default_metric_halflife_ms() -> u64 { 250_000 }
}
