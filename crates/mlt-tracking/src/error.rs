use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackingError>;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid metadata in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracking server returned {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("unsupported tracking URI '{0}'")]
    UnsupportedUri(String),

    #[error("{0}")]
    Unsupported(String),
}

impl TrackingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrackingError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for "no such experiment/run" answers from either backend.
    pub fn is_not_found(&self) -> bool {
        match self {
            TrackingError::NotFound { .. } => true,
            TrackingError::Api { status, code, .. } => {
                *status == 404 || code == "RESOURCE_DOES_NOT_EXIST"
            }
            _ => false,
        }
    }
}
