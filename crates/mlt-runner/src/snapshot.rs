//! The run output directory and its `.hydra` config snapshot.
//!
//! ```text
//! <output dir>/.hydra/
//!   config.yaml      composed job config, interpolations left as written
//!   overrides.yaml   command-line overrides, in order
//!   hydra.yaml       launcher settings and runtime facts
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use mlt_config::{ComposedConfig, ConfigNode, Mapping, ResolvedConfig, Scalar};
use mlt_tracking::atomic_write_bytes;

use crate::error::Result;

pub const SNAPSHOT_DIR: &str = ".hydra";
pub const OUTPUTS_DIR: &str = "outputs";

/// Where the snapshot came from.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotSource<'a> {
    pub project_root: &'a Path,
    pub config_path: &'a Path,
    pub config_name: &'a str,
    pub job_name: &'a str,
}

/// `hydra.run.dir` when set (relative to the project root), else
/// `outputs/<date>/<time>`.
pub fn output_dir(project_root: &Path, config: &ResolvedConfig, now: DateTime<Local>) -> PathBuf {
    match config.run_dir() {
        Some(dir) => project_root.join(dir),
        None => project_root
            .join(OUTPUTS_DIR)
            .join(now.format("%Y-%m-%d").to_string())
            .join(now.format("%H-%M-%S").to_string()),
    }
}

/// Writes the snapshot files and returns the snapshot directory.
pub fn write_snapshot(
    output_dir: &Path,
    composed: &ComposedConfig,
    resolved: &ResolvedConfig,
    source: &SnapshotSource<'_>,
) -> Result<PathBuf> {
    let dir = output_dir.join(SNAPSHOT_DIR);
    fs::create_dir_all(&dir)?;

    atomic_write_bytes(&dir.join("config.yaml"), composed.job.to_yaml_string()?.as_bytes())?;
    let overrides = serde_yaml::to_string(&composed.override_strings())?;
    atomic_write_bytes(&dir.join("overrides.yaml"), overrides.as_bytes())?;

    let mut launcher = resolved.launcher.clone();
    let output = output_dir.display().to_string();
    set_path(&mut launcher, &["run", "dir"], text(output.clone()));
    set_path(&mut launcher, &["job", "name"], text(source.job_name));
    set_path(&mut launcher, &["job", "config_name"], text(source.config_name));
    set_path(
        &mut launcher,
        &["runtime", "cwd"],
        text(source.project_root.display().to_string()),
    );
    set_path(&mut launcher, &["runtime", "output_dir"], text(output));
    set_path(
        &mut launcher,
        &["runtime", "config_path"],
        text(source.config_path.display().to_string()),
    );
    let task_overrides = composed
        .override_strings()
        .into_iter()
        .map(text)
        .collect::<Vec<_>>();
    set_path(
        &mut launcher,
        &["overrides", "task"],
        ConfigNode::Sequence(task_overrides),
    );
    let mut hydra = Mapping::new();
    hydra.insert(mlt_config::load::LAUNCHER_SECTION, ConfigNode::Mapping(launcher));
    atomic_write_bytes(&dir.join("hydra.yaml"), hydra.to_yaml_string()?.as_bytes())?;

    tracing::debug!(dir = %dir.display(), "wrote config snapshot");
    Ok(dir)
}

fn text(value: impl Into<String>) -> ConfigNode {
    ConfigNode::Scalar(Scalar::String(value.into()))
}

/// Sets a nested key, replacing non-mapping intermediates with mappings.
fn set_path(root: &mut Mapping, path: &[&str], value: ConfigNode) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cur = root;
    for key in parents {
        if !matches!(cur.get(key), Some(ConfigNode::Mapping(_))) {
            cur.insert(*key, ConfigNode::Mapping(Mapping::new()));
        }
        cur = match cur.get_mut(key) {
            Some(ConfigNode::Mapping(m)) => m,
            _ => return,
        };
    }
    cur.insert(*last, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mlt_config::{parse_mapping, parse_overrides};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mlt_snapshot_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    fn composed(text: &str, overrides: &[&str]) -> ComposedConfig {
        let base = parse_mapping(text).expect("yaml");
        ComposedConfig::from_mapping(base, parse_overrides(overrides).expect("overrides"))
            .expect("compose")
    }

    #[test]
    fn default_output_dir_uses_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).single().expect("time");
        let config = composed("a: 1\n", &[]).resolve_at(now).expect("resolve");
        assert_eq!(
            output_dir(Path::new("/proj"), &config, now),
            PathBuf::from("/proj/outputs/2024-03-09/07-05-01")
        );
    }

    #[test]
    fn configured_run_dir_wins() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).single().expect("time");
        let config = composed(
            "a: 1\nhydra:\n  run:\n    dir: runs/${now:%Y%m%d}\n",
            &[],
        )
        .resolve_at(now)
        .expect("resolve");
        assert_eq!(
            output_dir(Path::new("/proj"), &config, now),
            PathBuf::from("/proj/runs/20240309")
        );
    }

    #[test]
    fn snapshot_files_are_written() {
        let dir = temp_dir("write");
        let composed = composed(
            "name: model_train\nlr: ${base}\nbase: 0.1\nhydra:\n  job:\n    chdir: false\n",
            &["base=0.2", "+extra=1"],
        );
        let resolved = composed.resolve().expect("resolve");
        let out = dir.join("outputs").join("run");
        let source = SnapshotSource {
            project_root: &dir,
            config_path: Path::new("configs"),
            config_name: "config.yaml",
            job_name: "mlt",
        };
        let snapshot = write_snapshot(&out, &composed, &resolved, &source).expect("snapshot");
        assert_eq!(snapshot, out.join(SNAPSHOT_DIR));

        let config = parse_mapping(&fs::read_to_string(snapshot.join("config.yaml")).expect("read"))
            .expect("config yaml");
        assert_eq!(config.select("lr").and_then(ConfigNode::as_str), Some("${base}"));
        assert!(config.get("hydra").is_none());

        let overrides: Vec<String> = serde_yaml::from_str(
            &fs::read_to_string(snapshot.join("overrides.yaml")).expect("read"),
        )
        .expect("overrides yaml");
        assert_eq!(overrides, vec!["base=0.2", "+extra=1"]);

        let hydra = parse_mapping(&fs::read_to_string(snapshot.join("hydra.yaml")).expect("read"))
            .expect("hydra yaml");
        assert_eq!(
            hydra.select("hydra.job.name").and_then(ConfigNode::as_str),
            Some("mlt")
        );
        assert_eq!(
            hydra.select("hydra.job.chdir").and_then(ConfigNode::as_bool),
            Some(false)
        );
        assert_eq!(
            hydra
                .select("hydra.overrides.task")
                .and_then(ConfigNode::as_sequence)
                .map(|s| s.len()),
            Some(2)
        );
        let _ = fs::remove_dir_all(dir);
    }
}
