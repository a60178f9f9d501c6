//! Tracking records: experiments own runs, runs carry params and tags.
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                             ├── RunInfo    (identity, status, times)
//!                             └── RunData    (params, tags)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

/// Tag under which a run's display name is stored.
pub const RUN_NAME_TAG: &str = "mlflow.runName";

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run is executing.
    Running,
    /// Run is queued but not started.
    Scheduled,
    /// Run completed successfully.
    Finished,
    /// Run ended with an error.
    Failed,
    /// Run was stopped by the user or system.
    Killed,
}

impl RunStatus {
    /// Numeric code used in on-disk run metadata.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            RunStatus::Running => 1,
            RunStatus::Scheduled => 2,
            RunStatus::Finished => 3,
            RunStatus::Failed => 4,
            RunStatus::Killed => 5,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RunStatus::Running),
            2 => Some(RunStatus::Scheduled),
            3 => Some(RunStatus::Finished),
            4 => Some(RunStatus::Failed),
            5 => Some(RunStatus::Killed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }

    /// Finished, Failed and Killed end a run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Finished | RunStatus::Failed | RunStatus::Killed
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Ok(RunStatus::Running),
            "SCHEDULED" => Ok(RunStatus::Scheduled),
            "FINISHED" => Ok(RunStatus::Finished),
            "FAILED" => Ok(RunStatus::Failed),
            "KILLED" => Ok(RunStatus::Killed),
            other => Err(TrackingError::InvalidParameter(format!(
                "unknown run status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    #[default]
    Active,
    Deleted,
}

impl LifecycleStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LifecycleStage::Active => "active",
            LifecycleStage::Deleted => "deleted",
        }
    }

    /// Unknown stages read from a server are treated as active.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("deleted") {
            LifecycleStage::Deleted
        } else {
            LifecycleStage::Active
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked experiment. Names are unique within one tracking store; the id
/// never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub name: String,
    pub artifact_location: String,
    pub lifecycle_stage: LifecycleStage,
    pub tags: BTreeMap<String, String>,
}

impl ExperimentRecord {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle_stage == LifecycleStage::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: String,
    pub status: RunStatus,
    /// Milliseconds since the Unix epoch.
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub lifecycle_stage: LifecycleStage,
    pub artifact_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunData {
    pub params: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

/// A run with its logged data, as returned by a full fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub info: RunInfo,
    pub data: RunData,
}

impl RunRecord {
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.info.run_name
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.info.run_id.clone(),
            run_name: self.info.run_name.clone(),
            status: self.info.status,
        }
    }
}

/// The projection returned by run searches. Fetch the full record with
/// `get_run` before relying on params or tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_name: String,
    pub status: RunStatus,
}
