//! The tracking client seam and URI-based backend selection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackingError};
use crate::record::{ExperimentRecord, RunRecord, RunStatus, RunSummary};

mod file_store;
mod rest;

pub use file_store::{atomic_write_bytes, FileStore};
pub use rest::{RestClient, RestOptions};

/// Operations the launcher needs from a tracking service.
///
/// Implementations are synchronous and perform no retries; every failure is
/// returned to the caller.
pub trait TrackingClient {
    /// Creates an experiment and returns its id. Fails if the name is taken.
    fn create_experiment(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<String>;

    fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentRecord>;

    /// `Ok(None)` when no experiment has this name. Deleted experiments are
    /// still returned.
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>>;

    /// Creates a run in the `Running` state.
    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunRecord>;

    fn get_run(&self, run_id: &str) -> Result<RunRecord>;

    /// Active runs of the given experiments matching `filter`, newest first.
    fn search_runs(&self, experiment_ids: &[&str], filter: &str) -> Result<Vec<RunSummary>>;

    fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<()>;

    /// Ends a run. Only terminal statuses are accepted.
    fn set_terminated(&self, run_id: &str, status: RunStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(TrackingError::InvalidParameter(format!(
                "{} is not a terminal run status",
                status
            )));
        }
        self.update_run_status(run_id, status)
    }

    /// Logging the same key twice is accepted only with the same value.
    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Uploads a file, or a directory under its own name.
    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<()>;

    fn tracking_uri(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingUri {
    Local(PathBuf),
    Http(String),
}

impl TrackingUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(TrackingError::UnsupportedUri(uri.to_string()));
        }
        if uri.starts_with("file:") {
            return file_uri_to_path(uri).map(TrackingUri::Local);
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(TrackingUri::Http(uri.trim_end_matches('/').to_string()));
        }
        if uri.contains("://") {
            return Err(TrackingError::UnsupportedUri(uri.to_string()));
        }
        Ok(TrackingUri::Local(PathBuf::from(uri)))
    }
}

/// Opens the backend for `uri`: a [`FileStore`] for `file:` URIs and plain
/// paths, a [`RestClient`] for `http(s)://` servers.
pub fn open_client(uri: &TrackingUri) -> Result<Box<dyn TrackingClient>> {
    match uri {
        TrackingUri::Local(path) => Ok(Box::new(FileStore::open(path)?)),
        TrackingUri::Http(base) => Ok(Box::new(RestClient::new(base, RestOptions::from_env())?)),
    }
}

pub fn path_to_file_uri(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut encoded = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'/' | b'-' | b'_' | b'.' | b'~' | b':' => {
                encoded.push(b as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", b)),
        }
    }
    if encoded.starts_with('/') {
        format!("file://{}", encoded)
    } else {
        format!("file:///{}", encoded)
    }
}

pub fn file_uri_to_path(uri: &str) -> Result<PathBuf> {
    let rest = uri
        .strip_prefix("file:")
        .ok_or_else(|| TrackingError::UnsupportedUri(uri.to_string()))?;
    // file:///abs, file://localhost/abs and file:/abs all name /abs
    let path = if let Some(after) = rest.strip_prefix("//") {
        match after.find('/') {
            Some(0) => after,
            Some(idx) if &after[..idx] == "localhost" => &after[idx..],
            _ => return Err(TrackingError::UnsupportedUri(uri.to_string())),
        }
    } else {
        rest
    };
    Ok(PathBuf::from(percent_decode(path)))
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
