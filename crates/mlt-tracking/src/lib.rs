//! Experiment tracking: records, run filters and the client backends
//! (local `mlruns` store and MLflow REST server).

pub mod client;
mod error;
pub mod filter;
pub mod record;

pub use client::{
    atomic_write_bytes, file_uri_to_path, open_client, path_to_file_uri, FileStore, RestClient, RestOptions,
    TrackingClient, TrackingUri,
};
pub use error::{Result, TrackingError};
pub use filter::{run_name_filter, RunFilter};
pub use record::{
    ExperimentRecord, LifecycleStage, RunData, RunInfo, RunRecord, RunStatus, RunSummary,
    RUN_NAME_TAG,
};
