//! Configuration for the assembler and the evaluator, loadable from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },
}

/// What to do when a label is declared more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateLabelPolicy {
    #[default]
    Reject,
    /// The later declaration overwrites the position.
    LastWins,
}

/// What to do with labels that are referenced but never declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UndefinedLabelPolicy {
    #[default]
    Reject,
    /// Keep the label unresolved; the jump faults when executed.
    Defer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AssemblerConfig {
    pub duplicate_labels: DuplicateLabelPolicy,
    pub undefined_labels: UndefinedLabelPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VmConfig {
    /// Maximum instructions dispatched per evaluation. `None` runs unbounded.
    pub max_steps: Option<u64>,
}

/// Top-level configuration file model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub assembler: AssemblerConfig,
    pub vm: VmConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&data).map_err(|source| ConfigError::Parse {
            origin: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: "<inline>".to_string(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
