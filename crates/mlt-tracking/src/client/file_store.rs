//! Local tracking store in the `mlruns/` directory layout.
//!
//! ```text
//! mlruns/
//!   0/meta.yaml                      Default experiment
//!   <exp_id>/meta.yaml
//!   <exp_id>/tags/<key>
//!   <exp_id>/<run_id>/meta.yaml
//!   <exp_id>/<run_id>/params/<key>
//!   <exp_id>/<run_id>/tags/<key>
//!   <exp_id>/<run_id>/artifacts/...
//!   .trash/<exp_id>/...              deleted experiments
//! ```
//!
//! Each param and tag is one file whose content is the value. Metadata files
//! are replaced atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::{file_uri_to_path, path_to_file_uri, TrackingClient};
use crate::error::{Result, TrackingError};
use crate::filter::RunFilter;
use crate::record::{
    ExperimentRecord, LifecycleStage, RunData, RunInfo, RunRecord, RunStatus, RunSummary,
    RUN_NAME_TAG,
};

const META_FILE: &str = "meta.yaml";
const TRASH_DIR: &str = ".trash";
const DEFAULT_EXPERIMENT_ID: &str = "0";
const DEFAULT_EXPERIMENT_NAME: &str = "Default";
const MAX_PARAM_KEY_LEN: usize = 250;
const MAX_PARAM_VALUE_LEN: usize = 6000;
// experiment-level entries that are not runs
const RESERVED_DIRS: [&str; 2] = ["tags", "datasets"];

static RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct ExperimentMeta {
    artifact_location: String,
    #[serde(default)]
    creation_time: Option<i64>,
    experiment_id: String,
    #[serde(default)]
    last_update_time: Option<i64>,
    #[serde(default)]
    lifecycle_stage: LifecycleStage,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunMeta {
    artifact_uri: String,
    #[serde(default)]
    end_time: Option<i64>,
    #[serde(default)]
    entry_point_name: String,
    experiment_id: String,
    #[serde(default)]
    lifecycle_stage: LifecycleStage,
    run_id: String,
    #[serde(default)]
    run_name: String,
    #[serde(default)]
    run_uuid: String,
    #[serde(default)]
    source_name: String,
    #[serde(default = "default_source_type")]
    source_type: u8,
    #[serde(default)]
    source_version: String,
    #[serde(default)]
    start_time: Option<i64>,
    status: u8,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    user_id: String,
}

fn default_source_type() -> u8 {
    // LOCAL
    4
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) the store rooted at `root`. A fresh store
    /// gets the `Default` experiment with id `0`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| TrackingError::io(&root, e))?;
        let root = root.canonicalize().map_err(|e| TrackingError::io(&root, e))?;
        let store = Self { root };
        let default_meta = store.root.join(DEFAULT_EXPERIMENT_ID).join(META_FILE);
        let trashed_default = store
            .root
            .join(TRASH_DIR)
            .join(DEFAULT_EXPERIMENT_ID)
            .join(META_FILE);
        if !default_meta.exists() && !trashed_default.exists() {
            store.write_new_experiment(
                DEFAULT_EXPERIMENT_ID,
                DEFAULT_EXPERIMENT_NAME,
                &BTreeMap::new(),
            )?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn experiment_dir(&self, experiment_id: &str) -> Option<PathBuf> {
        [self.root.join(experiment_id), self.root.join(TRASH_DIR).join(experiment_id)]
            .into_iter()
            .find(|dir| dir.join(META_FILE).is_file())
    }

    fn experiment_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for base in [self.root.clone(), self.root.join(TRASH_DIR)] {
            if !base.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&base).map_err(|e| TrackingError::io(&base, e))? {
                let entry = entry.map_err(|e| TrackingError::io(&base, e))?;
                let path = entry.path();
                let is_experiment = path.is_dir()
                    && entry.file_name().to_string_lossy().parse::<u64>().is_ok()
                    && path.join(META_FILE).is_file();
                if is_experiment {
                    dirs.push(path);
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn next_experiment_id(&self) -> Result<String> {
        let max = self
            .experiment_dirs()?
            .iter()
            .filter_map(|d| d.file_name()?.to_str()?.parse::<u64>().ok())
            .max();
        Ok(max.map(|m| m + 1).unwrap_or(0).to_string())
    }

    fn read_experiment(&self, dir: &Path) -> Result<ExperimentRecord> {
        let meta: ExperimentMeta = read_yaml(&dir.join(META_FILE))?;
        Ok(ExperimentRecord {
            experiment_id: meta.experiment_id,
            name: meta.name,
            artifact_location: meta.artifact_location,
            lifecycle_stage: meta.lifecycle_stage,
            tags: read_kv_dir(&dir.join("tags"))?,
        })
    }

    fn write_new_experiment(
        &self,
        experiment_id: &str,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        let dir = self.root.join(experiment_id);
        fs::create_dir_all(dir.join("tags")).map_err(|e| TrackingError::io(&dir, e))?;
        let now = Utc::now().timestamp_millis();
        let meta = ExperimentMeta {
            artifact_location: path_to_file_uri(&dir),
            creation_time: Some(now),
            experiment_id: experiment_id.to_string(),
            last_update_time: Some(now),
            lifecycle_stage: LifecycleStage::Active,
            name: name.to_string(),
        };
        for (k, v) in tags {
            validate_key(k, "tag")?;
            write_value_file(&dir.join("tags"), k, v)?;
        }
        write_yaml(&dir.join(META_FILE), &meta)
    }

    /// Finds `<exp>/<run_id>` in any experiment, trashed ones included.
    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        validate_run_id(run_id)?;
        for exp_dir in self.experiment_dirs()? {
            let candidate = exp_dir.join(run_id);
            if candidate.join(META_FILE).is_file() {
                return Ok(candidate);
            }
        }
        Err(TrackingError::NotFound {
            kind: "run",
            id: run_id.to_string(),
        })
    }

    fn read_run(&self, run_dir: &Path) -> Result<RunRecord> {
        let meta: RunMeta = read_yaml(&run_dir.join(META_FILE))?;
        let status = RunStatus::from_code(meta.status).ok_or_else(|| {
            TrackingError::InvalidParameter(format!(
                "unknown status code {} in {}",
                meta.status,
                run_dir.display()
            ))
        })?;
        let data = RunData {
            params: read_kv_dir(&run_dir.join("params"))?,
            tags: read_kv_dir(&run_dir.join("tags"))?,
        };
        let run_name = if meta.run_name.is_empty() {
            data.tags.get(RUN_NAME_TAG).cloned().unwrap_or_default()
        } else {
            meta.run_name
        };
        Ok(RunRecord {
            info: RunInfo {
                run_id: meta.run_id,
                experiment_id: meta.experiment_id,
                run_name,
                status,
                start_time: meta.start_time,
                end_time: meta.end_time,
                lifecycle_stage: meta.lifecycle_stage,
                artifact_uri: meta.artifact_uri,
            },
            data,
        })
    }

    fn active_run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(run_id)?;
        let meta: RunMeta = read_yaml(&dir.join(META_FILE))?;
        if meta.lifecycle_stage != LifecycleStage::Active {
            return Err(TrackingError::InvalidParameter(format!(
                "run {} is deleted",
                run_id
            )));
        }
        Ok(dir)
    }
}

impl TrackingClient for FileStore {
    fn create_experiment(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<String> {
        if name.trim().is_empty() {
            return Err(TrackingError::InvalidParameter(
                "experiment name must not be empty".to_string(),
            ));
        }
        if self.get_experiment_by_name(name)?.is_some() {
            return Err(TrackingError::AlreadyExists {
                kind: "experiment",
                name: name.to_string(),
            });
        }
        let experiment_id = self.next_experiment_id()?;
        self.write_new_experiment(&experiment_id, name, tags)?;
        tracing::info!(experiment_id = %experiment_id, name, "created experiment");
        Ok(experiment_id)
    }

    fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentRecord> {
        let dir = self
            .experiment_dir(experiment_id)
            .ok_or_else(|| TrackingError::NotFound {
                kind: "experiment",
                id: experiment_id.to_string(),
            })?;
        self.read_experiment(&dir)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        for dir in self.experiment_dirs()? {
            match self.read_experiment(&dir) {
                Ok(exp) if exp.name == name => return Ok(Some(exp)),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable experiment")
                }
            }
        }
        Ok(None)
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunRecord> {
        let experiment = self.get_experiment(experiment_id)?;
        if !experiment.is_active() {
            return Err(TrackingError::InvalidParameter(format!(
                "experiment {} is deleted",
                experiment_id
            )));
        }
        let exp_dir = self.root.join(experiment_id);
        let run_id = new_run_id(experiment_id, run_name);
        let run_dir = exp_dir.join(&run_id);
        for sub in ["params", "tags", "metrics", "artifacts"] {
            let path = run_dir.join(sub);
            fs::create_dir_all(&path).map_err(|e| TrackingError::io(&path, e))?;
        }

        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        let meta = RunMeta {
            artifact_uri: path_to_file_uri(&run_dir.join("artifacts")),
            end_time: None,
            entry_point_name: String::new(),
            experiment_id: experiment_id.to_string(),
            lifecycle_stage: LifecycleStage::Active,
            run_id: run_id.clone(),
            run_name: run_name.to_string(),
            run_uuid: run_id.clone(),
            source_name: String::new(),
            source_type: default_source_type(),
            source_version: String::new(),
            start_time: Some(Utc::now().timestamp_millis()),
            status: RunStatus::Running.code(),
            tags: Vec::new(),
            user_id: user.clone(),
        };
        let tags_dir = run_dir.join("tags");
        write_value_file(&tags_dir, RUN_NAME_TAG, run_name)?;
        if !user.is_empty() {
            write_value_file(&tags_dir, "mlflow.user", &user)?;
        }
        write_yaml(&run_dir.join(META_FILE), &meta)?;
        tracing::info!(run_id = %run_id, run_name, experiment_id, "created run");
        self.read_run(&run_dir)
    }

    fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        let dir = self.run_dir(run_id)?;
        self.read_run(&dir)
    }

    fn search_runs(&self, experiment_ids: &[&str], filter: &str) -> Result<Vec<RunSummary>> {
        let filter = RunFilter::parse(filter)?;
        let mut found: Vec<RunRecord> = Vec::new();
        for experiment_id in experiment_ids {
            let exp_dir = self
                .experiment_dir(experiment_id)
                .ok_or_else(|| TrackingError::NotFound {
                    kind: "experiment",
                    id: experiment_id.to_string(),
                })?;
            for entry in fs::read_dir(&exp_dir).map_err(|e| TrackingError::io(&exp_dir, e))? {
                let entry = entry.map_err(|e| TrackingError::io(&exp_dir, e))?;
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if !path.is_dir() || RESERVED_DIRS.contains(&name.as_str()) {
                    continue;
                }
                if !path.join(META_FILE).is_file() {
                    continue;
                }
                match self.read_run(&path) {
                    Ok(run) if run.info.lifecycle_stage == LifecycleStage::Active => {
                        if filter.matches(&run) {
                            found.push(run);
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(dir = %path.display(), error = %err, "skipping unreadable run")
                    }
                }
            }
        }
        found.sort_by(|a, b| {
            b.info
                .start_time
                .cmp(&a.info.start_time)
                .then_with(|| a.info.run_id.cmp(&b.info.run_id))
        });
        tracing::debug!(matches = found.len(), "searched runs");
        Ok(found.iter().map(RunRecord::summary).collect())
    }

    fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let dir = self.active_run_dir(run_id)?;
        let meta_path = dir.join(META_FILE);
        let mut meta: RunMeta = read_yaml(&meta_path)?;
        meta.status = status.code();
        meta.end_time = if status.is_terminal() {
            Some(Utc::now().timestamp_millis())
        } else {
            None
        };
        write_yaml(&meta_path, &meta)?;
        tracing::debug!(run_id, status = %status, "updated run status");
        Ok(())
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        validate_key(key, "param")?;
        if key.len() > MAX_PARAM_KEY_LEN {
            return Err(TrackingError::InvalidParameter(format!(
                "param key '{}' exceeds {} characters",
                key, MAX_PARAM_KEY_LEN
            )));
        }
        if value.len() > MAX_PARAM_VALUE_LEN {
            return Err(TrackingError::InvalidParameter(format!(
                "value of param '{}' exceeds {} characters",
                key, MAX_PARAM_VALUE_LEN
            )));
        }
        let params_dir = self.active_run_dir(run_id)?.join("params");
        let path = params_dir.join(key);
        if path.is_file() {
            let existing = fs::read_to_string(&path).map_err(|e| TrackingError::io(&path, e))?;
            if existing == value {
                tracing::debug!(run_id, key, "param already logged with same value");
                return Ok(());
            }
            return Err(TrackingError::InvalidParameter(format!(
                "changing param values is not allowed: param '{}' was already logged with value '{}' for run {}, attempted new value '{}'",
                key, existing, run_id, value
            )));
        }
        write_value_file(&params_dir, key, value)?;
        tracing::debug!(run_id, key, value, "logged param");
        Ok(())
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<()> {
        let run = self.get_run(run_id)?;
        if !run.info.artifact_uri.starts_with("file:") {
            return Err(TrackingError::Unsupported(format!(
                "artifact URI '{}' is not a local file URI",
                run.info.artifact_uri
            )));
        }
        let artifact_root = file_uri_to_path(&run.info.artifact_uri)?;
        let copied = copy_artifact(local_path, &artifact_root)?;
        tracing::info!(run_id, path = %local_path.display(), files = copied, "logged artifact");
        Ok(())
    }

    fn tracking_uri(&self) -> String {
        path_to_file_uri(&self.root)
    }
}

/// Copies a file, or a directory tree under its own name, into
/// `artifact_root`. Returns the number of files copied.
pub(super) fn copy_artifact(local_path: &Path, artifact_root: &Path) -> Result<usize> {
    let name = local_path.file_name().ok_or_else(|| {
        TrackingError::InvalidParameter(format!(
            "artifact path {} has no file name",
            local_path.display()
        ))
    })?;
    let dest = artifact_root.join(name);

    if !local_path.is_dir() {
        fs::create_dir_all(artifact_root).map_err(|e| TrackingError::io(artifact_root, e))?;
        fs::copy(local_path, &dest).map_err(|e| TrackingError::io(local_path, e))?;
        return Ok(1);
    }
    let mut copied = 0usize;
    for entry in WalkDir::new(local_path).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(local_path)
            .map_err(|_| TrackingError::InvalidParameter(entry.path().display().to_string()))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| TrackingError::io(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| TrackingError::io(entry.path(), e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn new_run_id(experiment_id: &str, run_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(experiment_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(run_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(RUN_ID_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..32].to_string()
}

fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty() || !run_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(TrackingError::InvalidParameter(format!(
            "invalid run id '{}'",
            run_id
        )));
    }
    Ok(())
}

/// Keys become relative file paths, so they must stay inside their directory.
fn validate_key(key: &str, kind: &str) -> Result<()> {
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ' | '/');
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if key.is_empty() || !key.chars().all(allowed) || key.starts_with('/') || escapes {
        return Err(TrackingError::InvalidParameter(format!(
            "invalid {} key '{}': use alphanumerics, '_', '-', '.', ' ' and '/' without '..'",
            kind, key
        )));
    }
    Ok(())
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| TrackingError::io(path, e))?;
    serde_yaml::from_str(&text).map_err(|source| TrackingError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_yaml::to_string(value).map_err(|source| TrackingError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write_bytes(path, text.as_bytes())
}

fn write_value_file(dir: &Path, key: &str, value: &str) -> Result<()> {
    atomic_write_bytes(&dir.join(key), value.as_bytes())
}

/// Reads every file below `dir` as `relative/path -> contents`.
fn read_kv_dir(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') && name.contains(".tmp.") {
            continue;
        }
        let rel = match entry.path().strip_prefix(dir) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        let value =
            fs::read_to_string(entry.path()).map_err(|e| TrackingError::io(entry.path(), e))?;
        out.insert(rel, value);
    }
    Ok(out)
}

/// Writes `bytes` to a temp file beside `path`, syncs it, then renames it
/// over `path`. Missing parent directories are created.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TrackingError::io(parent, e))?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp).map_err(|e| TrackingError::io(&tmp, e))?;
    file.write_all(bytes).map_err(|e| TrackingError::io(&tmp, e))?;
    file.sync_all().map_err(|e| TrackingError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| TrackingError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> (FileStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "mlt_file_store_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        let store = FileStore::open(dir.join("mlruns")).expect("open store");
        (store, dir)
    }

    #[test]
    fn atomic_write_replaces_without_leftovers() {
        let (_store, dir) = temp_store("atomic");
        let target = dir.join("nested").join("out.yaml");
        atomic_write_bytes(&target, b"a: 1\n").expect("first write");
        atomic_write_bytes(&target, b"a: 2\n").expect("second write");
        assert_eq!(fs::read_to_string(&target).expect("read"), "a: 2\n");
        let names: Vec<String> = fs::read_dir(dir.join("nested"))
            .expect("list")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.yaml".to_string()]);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn fresh_store_has_default_experiment() {
        let (store, dir) = temp_store("default");
        let exp = store.get_experiment("0").expect("default experiment");
        assert_eq!(exp.name, "Default");
        assert!(exp.is_active());
        assert!(exp.artifact_location.starts_with("file://"));
        let again = FileStore::open(store.root()).expect("reopen");
        assert_eq!(again.experiment_dirs().expect("dirs").len(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn experiments_get_sequential_ids_and_tags() {
        let (store, dir) = temp_store("experiments");
        let mut tags = BTreeMap::new();
        tags.insert("team".to_string(), "vision".to_string());
        let first = store.create_experiment("alpha", &tags).expect("create alpha");
        let second = store.create_experiment("beta", &BTreeMap::new()).expect("create beta");
        assert_eq!(first, "1");
        assert_eq!(second, "2");

        let alpha = store
            .get_experiment_by_name("alpha")
            .expect("lookup")
            .expect("alpha exists");
        assert_eq!(alpha.experiment_id, "1");
        assert_eq!(alpha.tags.get("team").map(String::as_str), Some("vision"));
        assert!(store.get_experiment_by_name("gamma").expect("lookup").is_none());

        let err = store.create_experiment("alpha", &BTreeMap::new()).expect_err("duplicate");
        assert!(matches!(err, TrackingError::AlreadyExists { .. }));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn run_lifecycle_and_params() {
        let (store, dir) = temp_store("runs");
        let exp = store.create_experiment("exp", &BTreeMap::new()).expect("exp");
        let run = store.create_run(&exp, "first").expect("run");
        assert_eq!(run.info.status, RunStatus::Running);
        assert_eq!(run.run_name(), "first");
        assert_eq!(run.run_id().len(), 32);
        assert_eq!(
            run.data.tags.get(RUN_NAME_TAG).map(String::as_str),
            Some("first")
        );

        store.log_param(run.run_id(), "optim.lr", "0.1").expect("param");
        store.log_param(run.run_id(), "optim.lr", "0.1").expect("same value again");
        let err = store
            .log_param(run.run_id(), "optim.lr", "0.2")
            .expect_err("conflicting value");
        assert!(err.to_string().contains("changing param values"), "{}", err);
        assert!(store.log_param(run.run_id(), "../escape", "x").is_err());
        assert!(store.log_param(run.run_id(), "bad*key", "x").is_err());

        store
            .set_terminated(run.run_id(), RunStatus::Finished)
            .expect("terminate");
        let fetched = store.get_run(run.run_id()).expect("get run");
        assert_eq!(fetched.info.status, RunStatus::Finished);
        assert!(fetched.info.end_time.is_some());
        assert_eq!(
            fetched.data.params.get("optim.lr").map(String::as_str),
            Some("0.1")
        );
        assert!(store
            .set_terminated(run.run_id(), RunStatus::Running)
            .is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn search_is_scoped_to_experiment_and_name() {
        let (store, dir) = temp_store("search");
        let a = store.create_experiment("a", &BTreeMap::new()).expect("a");
        let b = store.create_experiment("b", &BTreeMap::new()).expect("b");
        let target = store.create_run(&a, "shared").expect("run a");
        store.create_run(&a, "other").expect("run a2");
        store.create_run(&b, "shared").expect("run b");

        let filter = crate::filter::run_name_filter("shared");
        let hits = store.search_runs(&[a.as_str()], &filter).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].run_id, target.run_id());

        let both = store
            .search_runs(&[a.as_str(), b.as_str()], &filter)
            .expect("search both");
        assert_eq!(both.len(), 2);
        assert!(store.search_runs(&["99"], &filter).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn search_skips_deleted_runs() {
        let (store, dir) = temp_store("deleted");
        let exp = store.create_experiment("exp", &BTreeMap::new()).expect("exp");
        let run = store.create_run(&exp, "gone").expect("run");
        let meta_path = store.run_dir(run.run_id()).expect("dir").join(META_FILE);
        let mut meta: RunMeta = read_yaml(&meta_path).expect("meta");
        meta.lifecycle_stage = LifecycleStage::Deleted;
        write_yaml(&meta_path, &meta).expect("write meta");

        let hits = store
            .search_runs(&[exp.as_str()], &crate::filter::run_name_filter("gone"))
            .expect("search");
        assert!(hits.is_empty());
        assert!(store.log_param(run.run_id(), "k", "v").is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn directory_artifacts_keep_their_name() {
        let (store, dir) = temp_store("artifacts");
        let exp = store.create_experiment("exp", &BTreeMap::new()).expect("exp");
        let run = store.create_run(&exp, "r").expect("run");

        let snapshot = dir.join("out").join(".hydra");
        fs::create_dir_all(&snapshot).expect("snapshot dir");
        fs::write(snapshot.join("config.yaml"), "a: 1\n").expect("config");
        fs::write(snapshot.join("overrides.yaml"), "[]\n").expect("overrides");
        store.log_artifact(run.run_id(), &snapshot).expect("log dir");

        let single = dir.join("notes.txt");
        fs::write(&single, "hello").expect("note");
        store.log_artifact(run.run_id(), &single).expect("log file");

        let artifacts = store.run_dir(run.run_id()).expect("run dir").join("artifacts");
        assert_eq!(
            fs::read_to_string(artifacts.join(".hydra").join("config.yaml")).expect("copied"),
            "a: 1\n"
        );
        assert!(artifacts.join(".hydra").join("overrides.yaml").is_file());
        assert!(artifacts.join("notes.txt").is_file());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn unknown_run_is_not_found() {
        let (store, dir) = temp_store("missing");
        let err = store.get_run("0123456789abcdef").expect_err("missing");
        assert!(err.is_not_found());
        assert!(store.get_run("../../etc").is_err());
        let _ = fs::remove_dir_all(dir);
    }
}
