use std::path::Path;

use mlt_config::{flatten_params, Mapping, ParamEntry};
use mlt_tracking::{RunRecord, RunStatus, TrackingClient, TrackingError};

use crate::error::Result;

/// A run opened for logging.
///
/// Dropping it without [`ActiveRun::terminate`] marks the run `FAILED`.
pub struct ActiveRun<'a> {
    client: &'a dyn TrackingClient,
    run_id: String,
    done: bool,
}

impl<'a> ActiveRun<'a> {
    /// Takes charge of `run` without touching the store, so every later
    /// failure still ends the run.
    pub fn open(client: &'a dyn TrackingClient, run: &RunRecord) -> Self {
        Self {
            client,
            run_id: run.run_id().to_string(),
            done: false,
        }
    }

    /// Marks the run `RUNNING` unless it already is. Resumed runs may have
    /// ended earlier.
    pub fn mark_running(&self, current: RunStatus) -> Result<()> {
        if current != RunStatus::Running {
            self.client.update_run_status(&self.run_id, RunStatus::Running)?;
        }
        tracing::debug!(run_id = %self.run_id, "run started");
        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Logs every flattened entry of `config`, stopping at the first
    /// failure. Returns the number of params logged.
    pub fn log_params(&self, config: &Mapping) -> Result<usize> {
        let mut count = 0usize;
        flatten_params(config, |entry: ParamEntry| -> std::result::Result<(), TrackingError> {
            self.client
                .log_param(&self.run_id, &entry.key, &entry.value.to_param_value())?;
            count += 1;
            Ok(())
        })?;
        tracing::info!(run_id = %self.run_id, params = count, "logged params");
        Ok(count)
    }

    pub fn log_artifact(&self, path: &Path) -> Result<()> {
        self.client.log_artifact(&self.run_id, path)?;
        Ok(())
    }

    /// Ends the run with `status`. The guard is disarmed even when the
    /// client call fails.
    pub fn terminate(mut self, status: RunStatus) -> Result<()> {
        self.done = true;
        self.client.set_terminated(&self.run_id, status)?;
        tracing::info!(run_id = %self.run_id, status = %status, "run terminated");
        Ok(())
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!(run_id = %self.run_id, "run scope left without termination, marking failed");
            if let Err(err) = self.client.set_terminated(&self.run_id, RunStatus::Failed) {
                tracing::warn!(run_id = %self.run_id, error = %err, "failed to terminate run");
            }
        }
    }
}
