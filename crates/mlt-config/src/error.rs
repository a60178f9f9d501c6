use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config root must be a mapping, found {found}")]
    NotAMapping { found: &'static str },

    #[error("unsupported mapping key in config: {0}")]
    InvalidKey(String),

    #[error("missing config key: {0}")]
    MissingKey(String),

    #[error("config key {key} has type {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid override '{raw}': {reason}")]
    InvalidOverride { raw: String, reason: String },

    #[error("could not add '{0}': key already exists (use '++{0}=...' to force)")]
    KeyExists(String),

    #[error("interpolation failed at '{key}': {reason}")]
    Interpolation { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid_override(raw: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidOverride {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn interpolation(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Interpolation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
