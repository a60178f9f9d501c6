//! Loading a job config from disk and applying overrides.
//!
//! A config file may carry a top-level `hydra` section (for example
//! `hydra.run.dir`). It configures the launcher, not the job, so it is split
//! off from the job config after overrides are applied.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{ConfigError, Result};
use crate::interpolate;
use crate::node::{ConfigNode, Mapping};
use crate::overrides::{apply_overrides, parse_overrides, Override};

pub const LAUNCHER_SECTION: &str = "hydra";

pub fn parse_mapping(text: &str) -> Result<Mapping> {
    let value: serde_yaml::Value = serde_yaml::from_str(text)?;
    Mapping::from_yaml(value)
}

pub fn load_mapping(path: &Path) -> Result<Mapping> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_mapping(&text)
}

/// `config` and `config.yaml` both name `config.yaml`.
pub fn config_file(config_path: &Path, config_name: &str) -> PathBuf {
    let has_ext = Path::new(config_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false);
    if has_ext {
        config_path.join(config_name)
    } else {
        config_path.join(format!("{}.yaml", config_name))
    }
}

#[derive(Debug, Clone)]
pub struct ComposedConfig {
    pub source: PathBuf,
    pub job: Mapping,
    pub launcher: Mapping,
    pub overrides: Vec<Override>,
}

impl ComposedConfig {
    pub fn compose<S: AsRef<str>>(
        config_path: &Path,
        config_name: &str,
        overrides: &[S],
    ) -> Result<Self> {
        let source = config_file(config_path, config_name);
        let base = load_mapping(&source)?;
        let overrides = parse_overrides(overrides)?;
        let composed = Self::from_mapping(base, overrides)?;
        Ok(Self { source, ..composed })
    }

    pub fn from_mapping(mut base: Mapping, overrides: Vec<Override>) -> Result<Self> {
        apply_overrides(&mut base, &overrides)?;
        let launcher = match base.remove(LAUNCHER_SECTION) {
            None => Mapping::new(),
            Some(ConfigNode::Mapping(m)) => m,
            Some(other) => {
                return Err(ConfigError::TypeMismatch {
                    key: LAUNCHER_SECTION.to_string(),
                    expected: "mapping",
                    found: other.kind(),
                })
            }
        };
        tracing::debug!(
            keys = base.len(),
            overrides = overrides.len(),
            "composed config"
        );
        Ok(Self {
            source: PathBuf::new(),
            job: base,
            launcher,
            overrides,
        })
    }

    pub fn override_strings(&self) -> Vec<String> {
        self.overrides.iter().map(|o| o.raw().to_string()).collect()
    }

    /// Resolves interpolations in the job and launcher sections at one
    /// instant. The launcher may refer to job keys.
    pub fn resolve_at(&self, now: DateTime<Local>) -> Result<ResolvedConfig> {
        let mut combined = self.job.clone();
        combined.insert(LAUNCHER_SECTION, ConfigNode::Mapping(self.launcher.clone()));
        let mut resolved = interpolate::resolve_at(&combined, now)?;
        let launcher = match resolved.remove(LAUNCHER_SECTION) {
            Some(ConfigNode::Mapping(m)) => m,
            _ => Mapping::new(),
        };
        Ok(ResolvedConfig {
            job: resolved,
            launcher,
        })
    }

    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.resolve_at(Local::now())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub job: Mapping,
    pub launcher: Mapping,
}

impl ResolvedConfig {
    /// `hydra.run.dir`, when the config sets one.
    pub fn run_dir(&self) -> Option<&str> {
        self.launcher.select("run.dir").and_then(ConfigNode::as_str)
    }
}
