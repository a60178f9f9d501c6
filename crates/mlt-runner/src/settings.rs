//! Typed views over the job config: the task discriminant and the `mlflow`
//! section.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use mlt_config::{ConfigError, ConfigNode, Mapping};

use crate::error::{Error, Result};

pub const TASK_KEY: &str = "name";
pub const TRACKING_SECTION: &str = "mlflow";

/// Tasks this launcher knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    ModelTrain,
}

impl Task {
    pub const fn as_str(self) -> &'static str {
        match self {
            Task::ModelTrain => "model_train",
        }
    }

    /// Reads the `name` key of the job config.
    pub fn from_job(job: &Mapping) -> Result<Self> {
        match job.get(TASK_KEY) {
            None => Err(ConfigError::MissingKey(TASK_KEY.to_string()).into()),
            Some(ConfigNode::Scalar(s)) => s.to_string().parse(),
            Some(other) => Err(Error::InvalidTask(format!("<{}>", other.kind()))),
        }
    }
}

impl FromStr for Task {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case(Task::ModelTrain.as_str()) {
            Ok(Task::ModelTrain)
        } else {
            Err(Error::InvalidTask(s.to_string()))
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `mlflow` section of the job config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSettings {
    pub experiment_name: String,
    pub tags: BTreeMap<String, String>,
    pub run_name: Option<String>,
    pub resume: bool,
    pub tracking_uri: Option<String>,
}

impl TrackingSettings {
    pub fn from_job(job: &Mapping) -> Result<Self> {
        let section = match job.get(TRACKING_SECTION) {
            Some(ConfigNode::Mapping(m)) => m,
            Some(other) => return Err(mismatch(TRACKING_SECTION, "mapping", other).into()),
            None => return Err(ConfigError::MissingKey(TRACKING_SECTION.to_string()).into()),
        };

        let experiment_name = optional_string(section, "experiment_name")?
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey("mlflow.experiment_name".to_string()))?;

        let mut tags = BTreeMap::new();
        match section.get("tags") {
            None | Some(ConfigNode::Scalar(mlt_config::Scalar::Null)) => {}
            Some(ConfigNode::Mapping(m)) => {
                for (key, value) in m.iter() {
                    match value {
                        ConfigNode::Scalar(s) => {
                            tags.insert(key.to_string(), s.to_param_value());
                        }
                        other => {
                            return Err(mismatch(&format!("mlflow.tags.{}", key), "scalar", other).into())
                        }
                    }
                }
            }
            Some(other) => return Err(mismatch("mlflow.tags", "mapping", other).into()),
        }

        let resume = match section.get("resume") {
            None => false,
            Some(node) if node.is_null() => false,
            Some(node) => node
                .as_bool()
                .ok_or_else(|| mismatch("mlflow.resume", "bool", node))?,
        };

        Ok(Self {
            experiment_name,
            tags,
            run_name: optional_string(section, "run_name")?,
            resume,
            tracking_uri: optional_string(section, "tracking_uri")?,
        })
    }
}

/// Null or absent is `None`; any other scalar is rendered as a string.
fn optional_string(section: &Mapping, key: &str) -> Result<Option<String>> {
    match section.get(key) {
        None => Ok(None),
        Some(node) if node.is_null() => Ok(None),
        Some(ConfigNode::Scalar(s)) => Ok(Some(s.to_param_value())),
        Some(other) => Err(mismatch(&format!("{}.{}", TRACKING_SECTION, key), "scalar", other).into()),
    }
}

fn mismatch(key: &str, expected: &'static str, found: &ConfigNode) -> ConfigError {
    ConfigError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}
