//! Where the records database and artifact storage live.

use crate::archive::DEFAULT_SPOOL_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported config version {found} (supported: {supported})")]
    Version { found: u32, supported: u32 },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "ConfigRead",
            Self::Parse { .. } => "ConfigParse",
            Self::Version { .. } => "ConfigVersion",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// SQLite database holding build records.
    pub records_db: PathBuf,
    /// Root of the artifact storage tree.
    pub storage_root: PathBuf,
    /// Payloads larger than this are staged on disk while dumping.
    pub spool_threshold: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            records_db: PathBuf::from("gbp.sqlite3"),
            storage_root: PathBuf::from("storage"),
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
        }
    }
}

/// Partial overrides for `ArchiveConfig`, as read from the YAML config file.
/// Unknown keys cause deserialization to fail (deny_unknown_fields).
/// Merge with `ArchiveConfig::default().apply(overrides)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub version: Option<u32>,
    pub records_db: Option<PathBuf>,
    pub storage_root: Option<PathBuf>,
    pub spool_threshold: Option<usize>,
}

impl ArchiveConfig {
    /// Apply overrides onto this config. Only `Some` values override.
    pub fn apply(self, overrides: ConfigOverrides) -> Self {
        Self {
            records_db: overrides.records_db.unwrap_or(self.records_db),
            storage_root: overrides.storage_root.unwrap_or(self.storage_root),
            spool_threshold: overrides.spool_threshold.unwrap_or(self.spool_threshold),
        }
    }

    /// Defaults with the YAML file at `path` applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::default().apply(load_overrides(path)?))
    }
}

pub fn load_overrides(path: &Path) -> Result<ConfigOverrides, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_overrides(&raw).map_err(|e| match e {
        ParseFailure::Yaml(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::Version(found) => ConfigError::Version {
            found,
            supported: SUPPORTED_CONFIG_VERSION,
        },
    })
}

enum ParseFailure {
    Yaml(serde_yaml::Error),
    Version(u32),
}

fn parse_overrides(raw: &str) -> Result<ConfigOverrides, ParseFailure> {
    // An empty file is an empty mapping.
    if raw.trim().is_empty() {
        return Ok(ConfigOverrides::default());
    }
    let overrides: ConfigOverrides = serde_yaml::from_str(raw).map_err(ParseFailure::Yaml)?;
    match overrides.version {
        Some(v) if v != SUPPORTED_CONFIG_VERSION => Err(ParseFailure::Version(v)),
        _ => Ok(overrides),
    }
}
