use std::fs;
use std::path::Path;

use mlt_tracking::{open_client, TrackingClient, TrackingUri};

use crate::error::Result;

/// Local store directory under the project root.
pub const TRACKING_DIR: &str = "mlruns";

/// Picks the tracking URI: the first of `explicit`, `env` and `configured`
/// that is set, else `<project_root>/mlruns`. Relative local paths are taken
/// relative to `project_root`.
pub fn select_tracking_uri(
    explicit: Option<&str>,
    env: Option<&str>,
    configured: Option<&str>,
    project_root: &Path,
) -> Result<TrackingUri> {
    let chosen = [explicit, env, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty());
    let uri = match chosen {
        Some(raw) => TrackingUri::parse(raw)?,
        None => TrackingUri::Local(project_root.join(TRACKING_DIR)),
    };
    Ok(match uri {
        TrackingUri::Local(path) if path.is_relative() => TrackingUri::Local(project_root.join(path)),
        other => other,
    })
}

/// Opens the client for `uri`, creating the local store directory first.
pub fn connect(uri: &TrackingUri) -> Result<Box<dyn TrackingClient>> {
    if let TrackingUri::Local(dir) = uri {
        fs::create_dir_all(dir)?;
    }
    let client = open_client(uri)?;
    tracing::info!(tracking_uri = %client.tracking_uri(), "tracking client ready");
    Ok(client)
}
