use mlt_config::ConfigError;
use mlt_tracking::TrackingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid task name '{0}': expected 'model_train'")]
    InvalidTask(String),

    #[error(
        "found {count} runs named '{run_name}' in experiment {experiment_id}; \
         rename the run or remove the duplicates before resuming"
    )]
    MultipleRunsFound {
        experiment_id: String,
        run_name: String,
        count: usize,
    },

    #[error("experiment '{name}' (id {experiment_id}) is deleted; restore it or choose another name")]
    DeletedExperiment { name: String, experiment_id: String },

    #[error(
        "run name '{0}' contains both ' and \" so it cannot be searched; \
         rename the run to resume it"
    )]
    UnsearchableRunName(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
