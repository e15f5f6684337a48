//! Configuration types and resolution.
//!
//! Resolution order for the config file:
//! 1. Explicit path (`--config`)
//! 2. `PLAYLOG_CONFIG` environment variable
//! 3. `$XDG_CONFIG_HOME/playlog/config.json` (platform config dir)
//! 4. Built-in defaults
//!
//! Individual CLI flags are applied on top by the caller via
//! [`ConfigOverrides`].

use crate::mapping::{FieldMapping, MappingError};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ENV_CONFIG: &str = "PLAYLOG_CONFIG";
const DIR_NAME: &str = "playlog";
const CONFIG_FILE: &str = "config.json";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid keyspace name '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidKeyspace(String),

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

impl From<ConfigError> for pl_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Mapping(e) => pl_common::Error::InvalidMapping(e.to_string()),
            other => pl_common::Error::Config(other.to_string()),
        }
    }
}

/// What to do with a row that fails normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Log the row and continue with the next one.
    #[default]
    Skip,
    /// Stop the run at the first malformed row.
    Abort,
}

impl fmt::Display for RowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowPolicy::Skip => write!(f, "skip"),
            RowPolicy::Abort => write!(f, "abort"),
        }
    }
}

/// Where and how the partitioned store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding one subdirectory per keyspace.
    pub data_dir: PathBuf,
    pub keyspace: String,
    /// Opaque to the core; recorded in the keyspace manifest.
    pub replication_strategy: String,
    pub replication_factor: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keyspace: "playlog".to_string(),
            replication_strategy: "SimpleStrategy".to_string(),
            replication_factor: "1".to_string(),
        }
    }
}

/// Input locations and row handling for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory of raw per-session event files.
    pub data_directory: PathBuf,
    /// Consolidated projected CSV written by `consolidate`, read by `ingest`.
    pub consolidated_csv: PathBuf,
    pub on_malformed: RowPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("event_data"),
            consolidated_csv: PathBuf::from("event_datafile_new.csv"),
            on_malformed: RowPolicy::Skip,
        }
    }
}

/// Complete playlog configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayLogConfig {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub mapping: FieldMapping,
}

impl PlayLogConfig {
    /// Load a config file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Semantic validation, run once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_keyspace(&self.store.keyspace)?;
        if self.store.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Empty {
                field: "store.data_dir",
            });
        }
        self.mapping.validate()?;
        Ok(())
    }

    /// Apply per-flag overrides on top of file values.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.data_dir {
            self.store.data_dir = dir;
        }
        if let Some(keyspace) = overrides.keyspace {
            self.store.keyspace = keyspace;
        }
        if let Some(dir) = overrides.data_directory {
            self.ingest.data_directory = dir;
        }
        if let Some(csv) = overrides.consolidated_csv {
            self.ingest.consolidated_csv = csv;
        }
        if let Some(policy) = overrides.on_malformed {
            self.ingest.on_malformed = policy;
        }
    }
}

/// Flag-level overrides collected by the CLI.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub keyspace: Option<String>,
    pub data_directory: Option<PathBuf>,
    pub consolidated_csv: Option<PathBuf>,
    pub on_malformed: Option<RowPolicy>,
}

/// Where the effective config came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    Explicit(PathBuf),
    Env(PathBuf),
    Xdg(PathBuf),
    Defaults,
}

/// Candidate locations for the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub explicit: Option<PathBuf>,
    pub env: Option<PathBuf>,
    pub xdg: Option<PathBuf>,
}

impl ConfigPaths {
    /// Collect candidates from the environment.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            env: std::env::var_os(ENV_CONFIG).map(PathBuf::from),
            xdg: dirs::config_dir().map(|dir| dir.join(DIR_NAME).join(CONFIG_FILE)),
        }
    }
}

/// Resolve and validate the effective configuration.
///
/// An explicit or env path that does not exist is an error; a missing XDG
/// file silently falls back to defaults.
pub fn resolve_config(
    paths: &ConfigPaths,
    overrides: ConfigOverrides,
) -> Result<(PlayLogConfig, ConfigSource), ConfigError> {
    let (mut config, source) = if let Some(path) = &paths.explicit {
        (PlayLogConfig::load(path)?, ConfigSource::Explicit(path.clone()))
    } else if let Some(path) = &paths.env {
        (PlayLogConfig::load(path)?, ConfigSource::Env(path.clone()))
    } else if let Some(path) = paths.xdg.as_ref().filter(|p| p.exists()) {
        (PlayLogConfig::load(path)?, ConfigSource::Xdg(path.clone()))
    } else {
        (PlayLogConfig::default(), ConfigSource::Defaults)
    };
    config.apply(overrides);
    config.validate()?;
    Ok((config, source))
}

fn validate_keyspace(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidKeyspace(name.to_string()))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|base| base.join(DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".playlog"))
}
