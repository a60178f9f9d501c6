//! Find-or-create for experiments and runs.

use std::collections::BTreeMap;

use mlt_tracking::{run_name_filter, ExperimentRecord, RunRecord, TrackingClient};

use crate::error::{Error, Result};

/// Whether [`resolve_run_with_origin`] created the run or picked up an
/// existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOrigin {
    Created,
    Resumed,
}

/// Returns the run to log into.
///
/// Without `resume` a new run is always created, even when the name is
/// already taken. With `resume` the runs of `experiment_id` named `run_name`
/// are searched: none creates a run, one is fetched in full by id, more than
/// one fails with [`Error::MultipleRunsFound`] before anything is written.
/// A name holding both quote characters has no filter spelling and fails
/// with [`Error::UnsearchableRunName`].
pub fn resolve_run(
    client: &dyn TrackingClient,
    experiment_id: &str,
    resume: bool,
    run_name: &str,
) -> Result<RunRecord> {
    resolve_run_with_origin(client, experiment_id, resume, run_name).map(|(run, _)| run)
}

pub fn resolve_run_with_origin(
    client: &dyn TrackingClient,
    experiment_id: &str,
    resume: bool,
    run_name: &str,
) -> Result<(RunRecord, RunOrigin)> {
    if !resume {
        let run = client.create_run(experiment_id, run_name)?;
        return Ok((run, RunOrigin::Created));
    }

    if run_name.contains('\'') && run_name.contains('"') {
        return Err(Error::UnsearchableRunName(run_name.to_string()));
    }
    let filter = run_name_filter(run_name);
    let matches = client.search_runs(&[experiment_id], &filter)?;
    tracing::debug!(experiment_id, run_name, matches = matches.len(), "searched for run to resume");
    match matches.as_slice() {
        [] => {
            tracing::info!(run_name, "no run to resume, creating one");
            let run = client.create_run(experiment_id, run_name)?;
            Ok((run, RunOrigin::Created))
        }
        [only] => {
            let run = client.get_run(&only.run_id)?;
            tracing::info!(run_id = %run.run_id(), run_name, "resuming run");
            Ok((run, RunOrigin::Resumed))
        }
        many => Err(Error::MultipleRunsFound {
            experiment_id: experiment_id.to_string(),
            run_name: run_name.to_string(),
            count: many.len(),
        }),
    }
}

/// Looks the experiment up by name and creates it with `tags` when absent.
pub fn ensure_experiment(
    client: &dyn TrackingClient,
    name: &str,
    tags: &BTreeMap<String, String>,
) -> Result<ExperimentRecord> {
    let experiment = match client.get_experiment_by_name(name)? {
        Some(existing) => existing,
        None => {
            let experiment_id = client.create_experiment(name, tags)?;
            client.get_experiment(&experiment_id)?
        }
    };
    if !experiment.is_active() {
        return Err(Error::DeletedExperiment {
            name: name.to_string(),
            experiment_id: experiment.experiment_id,
        });
    }
    Ok(experiment)
}
