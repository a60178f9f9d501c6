use anyhow::Result;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use mlt_config::{collect_params, ComposedConfig, ConfigNode};
use mlt_runner::{SnapshotSource, Task, TaskOutcome};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Job name recorded in the snapshot.
const JOB_NAME: &str = "mlt";

#[derive(Parser)]
#[command(
    name = "mlt",
    version,
    about = "Run a configured task and record it in an MLflow tracking store"
)]
struct Cli {
    /// Log debug detail (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Debug)]
struct ConfigArgs {
    /// Directory holding the config file.
    #[arg(long, default_value = "configs")]
    config_path: PathBuf,
    #[arg(long, default_value = "config.yaml")]
    config_name: String,
    /// `key=value` replaces, `+key=value` adds, `++key=value` upserts,
    /// `~key` deletes.
    overrides: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log the config as params of a tracked run.
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        tracking_uri: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print the composed config.
    Show {
        #[command(flatten)]
        config: ConfigArgs,
        /// Resolve `${...}` interpolations first.
        #[arg(long)]
        resolve: bool,
    },
    /// Print the params a run would log.
    Params {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), format!("{:#}", err), error_details(&err)));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default_filter = format!(
        "mlt_cli={0},mlt_config={0},mlt_tracking={0},mlt_runner={0}",
        level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run {
            config,
            output_dir,
            tracking_uri,
            json,
        } => {
            let project_root = std::env::current_dir()?;
            let now = Local::now();
            let composed = compose(&config)?;
            let resolved = composed.resolve_at(now)?;
            Task::from_job(&resolved.job)?;

            let output_dir = match output_dir {
                Some(dir) => project_root.join(dir),
                None => mlt_runner::output_dir(&project_root, &resolved, now),
            };
            let source = SnapshotSource {
                project_root: &project_root,
                config_path: &config.config_path,
                config_name: &config.config_name,
                job_name: JOB_NAME,
            };
            mlt_runner::write_snapshot(&output_dir, &composed, &resolved, &source)?;

            let env_uri = std::env::var("MLFLOW_TRACKING_URI").ok();
            let configured_uri = resolved
                .job
                .select("mlflow.tracking_uri")
                .and_then(ConfigNode::as_str);
            let uri = mlt_runner::select_tracking_uri(
                tracking_uri.as_deref(),
                env_uri.as_deref(),
                configured_uri,
                &project_root,
            )?;
            let outcome = mlt_runner::run_task(&resolved, &uri, &output_dir)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "run": outcome_to_json(&outcome),
                })));
            }
            print_outcome(&outcome);
        }
        Commands::Show { config, resolve } => {
            let composed = compose(&config)?;
            let yaml = if resolve {
                composed.resolve()?.job.to_yaml_string()?
            } else {
                composed.job.to_yaml_string()?
            };
            print!("{}", yaml);
        }
        Commands::Params { config, json } => {
            let resolved = compose(&config)?.resolve()?;
            let params = collect_params(&resolved.job);
            if json {
                let entries: Vec<Value> = params
                    .iter()
                    .map(|p| json!({ "key": p.key, "value": p.value.to_param_value() }))
                    .collect();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "params",
                    "count": entries.len(),
                    "params": entries,
                })));
            }
            for entry in &params {
                println!("{}", entry);
            }
        }
    }
    Ok(None)
}

fn compose(config: &ConfigArgs) -> Result<ComposedConfig> {
    let composed = ComposedConfig::compose(
        &config.config_path,
        &config.config_name,
        config.overrides.as_slice(),
    )?;
    tracing::debug!(source = %composed.source.display(), "loaded config");
    Ok(composed)
}

fn print_outcome(outcome: &TaskOutcome) {
    println!("task: {}", outcome.task);
    println!("tracking_uri: {}", outcome.tracking_uri);
    println!("experiment: {} ({})", outcome.experiment_name, outcome.experiment_id);
    println!("run_name: {}", outcome.run_name);
    println!("run_id: {}", outcome.run_id);
    println!("resumed: {}", outcome.resumed);
    println!("params_logged: {}", outcome.param_count);
    println!("artifact_logged: {}", outcome.artifact_logged);
    println!("output_dir: {}", outcome.output_dir.display());
    println!("status: {}", outcome.status);
}

fn outcome_to_json(outcome: &TaskOutcome) -> Value {
    json!({
        "task": outcome.task.as_str(),
        "tracking_uri": outcome.tracking_uri,
        "experiment_id": outcome.experiment_id,
        "experiment_name": outcome.experiment_name,
        "run_id": outcome.run_id,
        "run_name": outcome.run_name,
        "resumed": outcome.resumed,
        "params_logged": outcome.param_count,
        "artifact_logged": outcome.artifact_logged,
        "output_dir": outcome.output_dir.display().to_string(),
        "status": outcome.status.as_str(),
    })
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(err) = err.downcast_ref::<mlt_runner::Error>() {
        return match err {
            mlt_runner::Error::InvalidTask(_) => "invalid_task",
            mlt_runner::Error::MultipleRunsFound { .. } => "multiple_runs_found",
            mlt_runner::Error::DeletedExperiment { .. } => "deleted_experiment",
            mlt_runner::Error::UnsearchableRunName(_) => "unsearchable_run_name",
            mlt_runner::Error::Config(_) => "config_error",
            mlt_runner::Error::Tracking(_) => "tracking_error",
            mlt_runner::Error::Io(_) | mlt_runner::Error::Yaml(_) => "io_error",
        };
    }
    if err.downcast_ref::<mlt_config::ConfigError>().is_some() {
        return "config_error";
    }
    if err.downcast_ref::<mlt_tracking::TrackingError>().is_some() {
        return "tracking_error";
    }
    "command_failed"
}

fn error_details(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<mlt_runner::Error>() {
        Some(mlt_runner::Error::InvalidTask(name)) => json!({ "name": name }),
        Some(mlt_runner::Error::UnsearchableRunName(run_name)) => json!({ "run_name": run_name }),
        Some(mlt_runner::Error::MultipleRunsFound {
            experiment_id,
            run_name,
            count,
        }) => json!({
            "experiment_id": experiment_id,
            "run_name": run_name,
            "count": count,
        }),
        Some(mlt_runner::Error::DeletedExperiment {
            name,
            experiment_id,
        }) => json!({ "name": name, "experiment_id": experiment_id }),
        _ => json!({}),
    }
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } | Commands::Params { json, .. } => *json,
        Commands::Show { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_overrides_and_defaults() {
        let cli = Cli::try_parse_from([
            "mlt",
            "run",
            "--json",
            "mlflow.resume=true",
            "+trainer.seed=3",
            "~debug",
        ])
        .expect("parse");
        match cli.command {
            Commands::Run { config, json, .. } => {
                assert!(json);
                assert_eq!(config.config_path, PathBuf::from("configs"));
                assert_eq!(config.config_name, "config.yaml");
                assert_eq!(
                    config.overrides,
                    vec!["mlflow.resume=true", "+trainer.seed=3", "~debug"]
                );
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["mlt", "show", "--resolve", "-v"]).expect("parse");
        assert!(cli.verbose);
        assert!(!command_json_mode(&cli.command));
    }

    #[test]
    fn runner_errors_get_stable_codes() {
        let err = anyhow::Error::from(mlt_runner::Error::MultipleRunsFound {
            experiment_id: "1".to_string(),
            run_name: "baseline".to_string(),
            count: 2,
        });
        assert_eq!(error_code(&err), "multiple_runs_found");
        assert_eq!(error_details(&err)["count"], json!(2));

        let err = anyhow::Error::from(mlt_runner::Error::InvalidTask("eval".to_string()));
        let payload = json_error(error_code(&err), err.to_string(), error_details(&err));
        assert_eq!(payload["ok"], json!(false));
        assert_eq!(payload["error"]["code"], json!("invalid_task"));
        assert_eq!(payload["error"]["details"]["name"], json!("eval"));
    }
}
