//! Runs a configured task against a tracking store: find-or-create the
//! experiment and run, log the flattened config as params, attach the config
//! snapshot, then terminate the run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use mlt_config::ResolvedConfig;
use mlt_tracking::{RunStatus, TrackingClient, TrackingUri};

mod active_run;
pub mod connect;
mod error;
pub mod resolve;
pub mod settings;
pub mod snapshot;

pub use active_run::ActiveRun;
pub use connect::{connect, select_tracking_uri, TRACKING_DIR};
pub use error::{Error, Result};
pub use resolve::{ensure_experiment, resolve_run, resolve_run_with_origin, RunOrigin};
pub use settings::{Task, TrackingSettings};
pub use snapshot::{output_dir, write_snapshot, SnapshotSource, SNAPSHOT_DIR};

/// Format of the run name used when the config sets none.
pub const DEFAULT_RUN_NAME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// What a task run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: Task,
    pub tracking_uri: String,
    pub experiment_id: String,
    pub experiment_name: String,
    pub run_id: String,
    pub run_name: String,
    pub resumed: bool,
    pub param_count: usize,
    pub artifact_logged: bool,
    pub output_dir: PathBuf,
    pub status: RunStatus,
}

pub fn default_run_name(now: DateTime<Local>) -> String {
    now.format(DEFAULT_RUN_NAME_FORMAT).to_string()
}

/// Validates the task, connects to `uri` and runs the task.
///
/// The task name is checked before the tracking store is touched.
pub fn run_task(config: &ResolvedConfig, uri: &TrackingUri, output_dir: &Path) -> Result<TaskOutcome> {
    Task::from_job(&config.job)?;
    let client = connect(uri)?;
    run_task_with_client(client.as_ref(), config, output_dir, Local::now())
}

/// Runs the task against an already opened client. `now` supplies the
/// default run name.
pub fn run_task_with_client(
    client: &dyn TrackingClient,
    config: &ResolvedConfig,
    output_dir: &Path,
    now: DateTime<Local>,
) -> Result<TaskOutcome> {
    let task = Task::from_job(&config.job)?;
    let settings = TrackingSettings::from_job(&config.job)?;

    tracing::info!("config:\n{}", config.job.to_yaml_string()?);
    let cwd = std::env::current_dir()?;
    tracing::info!(
        task = %task,
        cwd = %cwd.display(),
        time = %now.to_rfc3339(),
        output_dir = %output_dir.display(),
        "starting task"
    );

    let experiment = ensure_experiment(client, &settings.experiment_name, &settings.tags)?;
    tracing::info!(
        experiment_name = %experiment.name,
        experiment_id = %experiment.experiment_id,
        artifact_location = %experiment.artifact_location,
        tags = ?experiment.tags,
        lifecycle_stage = %experiment.lifecycle_stage,
        "experiment"
    );

    let run_name = settings
        .run_name
        .clone()
        .unwrap_or_else(|| default_run_name(now));
    let (run, origin) =
        resolve_run_with_origin(client, &experiment.experiment_id, settings.resume, &run_name)?;
    tracing::info!(run_name = %run.run_name(), run_id = %run.run_id(), ?origin, "run");

    let active = ActiveRun::open(client, &run);
    let body = active
        .mark_running(run.info.status)
        .and_then(|()| log_run_contents(&active, config, output_dir, settings.resume));
    let status = if body.is_ok() {
        RunStatus::Finished
    } else {
        RunStatus::Failed
    };
    let terminated = active.terminate(status);
    let (param_count, artifact_logged) = body?;
    terminated?;

    Ok(TaskOutcome {
        task,
        tracking_uri: client.tracking_uri(),
        experiment_id: experiment.experiment_id,
        experiment_name: experiment.name,
        run_id: run.info.run_id,
        run_name: run.info.run_name,
        resumed: origin == RunOrigin::Resumed,
        param_count,
        artifact_logged,
        output_dir: output_dir.to_path_buf(),
        status,
    })
}

/// Params always; the snapshot only when the config did not ask to resume.
fn log_run_contents(
    active: &ActiveRun<'_>,
    config: &ResolvedConfig,
    output_dir: &Path,
    resume: bool,
) -> Result<(usize, bool)> {
    let param_count = active.log_params(&config.job)?;
    if resume {
        return Ok((param_count, false));
    }
    let snapshot = output_dir.join(SNAPSHOT_DIR);
    active.log_artifact(&snapshot)?;
    Ok((param_count, true))
}
