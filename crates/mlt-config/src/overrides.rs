//! Command-line overrides in the `key.path=value` grammar.
//!
//! | form          | effect                                   |
//! |---------------|------------------------------------------|
//! | `a.b=v`       | replace an existing key                  |
//! | `+a.b=v`      | add a key that must not exist yet        |
//! | `++a.b=v`     | add or replace                           |
//! | `~a.b`        | delete (`~a.b=v` only if the value is v) |
//!
//! Values are parsed as YAML, so `lr=0.1`, `resume=true`, `layers=[64,32]`
//! and `run_name=null` all produce typed nodes. Anything that fails to parse
//! is kept as a plain string.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, Result};
use crate::node::{ConfigNode, Mapping, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOp {
    Set,
    Add,
    Upsert,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    op: OverrideOp,
    key: String,
    value: Option<ConfigNode>,
    raw: String,
}

impl Override {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (op, body) = if let Some(rest) = trimmed.strip_prefix("++") {
            (OverrideOp::Upsert, rest)
        } else if let Some(rest) = trimmed.strip_prefix('+') {
            (OverrideOp::Add, rest)
        } else if let Some(rest) = trimmed.strip_prefix('~') {
            (OverrideOp::Delete, rest)
        } else {
            (OverrideOp::Set, trimmed)
        };

        let (key, value) = match body.split_once('=') {
            Some((k, v)) => (k.trim(), Some(parse_value(v))),
            None if op == OverrideOp::Delete => (body.trim(), None),
            None => return Err(ConfigError::invalid_override(raw, "expected key=value")),
        };
        if key.is_empty() {
            return Err(ConfigError::invalid_override(raw, "key cannot be empty"));
        }
        if key.split('.').any(str::is_empty) {
            return Err(ConfigError::invalid_override(
                raw,
                "key path contains an empty segment",
            ));
        }

        Ok(Self {
            op,
            key: key.to_string(),
            value,
            raw: trimmed.to_string(),
        })
    }

    pub fn op(&self) -> OverrideOp {
        self.op
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&ConfigNode> {
        self.value.as_ref()
    }

    /// The override as the user typed it (whitespace trimmed).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn apply(&self, root: &mut Mapping) -> Result<()> {
        let segments: Vec<&str> = self.key.split('.').collect();
        let (leaf, parents) = segments
            .split_last()
            .ok_or_else(|| ConfigError::invalid_override(&self.raw, "key cannot be empty"))?;
        let create = matches!(self.op, OverrideOp::Add | OverrideOp::Upsert);
        let slot = descend(root, parents, create, &self.raw, &self.key)?;
        tracing::debug!(key = %self.key, op = ?self.op, "applying override");

        match slot {
            Slot::Map(map) => self.apply_to_mapping(map, leaf),
            Slot::Seq(items) => self.apply_to_sequence(items, leaf),
        }
    }

    fn apply_to_mapping(&self, map: &mut Mapping, leaf: &str) -> Result<()> {
        match self.op {
            OverrideOp::Set => {
                if !map.contains_key(leaf) {
                    return Err(ConfigError::invalid_override(
                        &self.raw,
                        format!("key '{}' is not in the config (use '+{}')", self.key, self.raw),
                    ));
                }
                map.insert(leaf, self.new_value());
            }
            OverrideOp::Add => {
                if map.contains_key(leaf) {
                    return Err(ConfigError::KeyExists(self.key.clone()));
                }
                map.insert(leaf, self.new_value());
            }
            OverrideOp::Upsert => {
                map.insert(leaf, self.new_value());
            }
            OverrideOp::Delete => {
                let current = map
                    .get(leaf)
                    .ok_or_else(|| ConfigError::MissingKey(self.key.clone()))?;
                self.check_delete_guard(current)?;
                map.remove(leaf);
            }
        }
        Ok(())
    }

    fn apply_to_sequence(&self, items: &mut Vec<ConfigNode>, leaf: &str) -> Result<()> {
        let idx: usize = leaf.parse().map_err(|_| {
            ConfigError::invalid_override(
                &self.raw,
                format!("'{}' is not a valid sequence index", leaf),
            )
        })?;
        match self.op {
            OverrideOp::Add if idx == items.len() => items.push(self.new_value()),
            OverrideOp::Add => return Err(ConfigError::KeyExists(self.key.clone())),
            _ if idx >= items.len() => {
                return Err(ConfigError::invalid_override(
                    &self.raw,
                    format!("index {} out of bounds (len {})", idx, items.len()),
                ))
            }
            OverrideOp::Set | OverrideOp::Upsert => items[idx] = self.new_value(),
            OverrideOp::Delete => {
                self.check_delete_guard(&items[idx])?;
                items.remove(idx);
            }
        }
        Ok(())
    }

    fn check_delete_guard(&self, current: &ConfigNode) -> Result<()> {
        match &self.value {
            Some(expected) if expected != current => Err(ConfigError::invalid_override(
                &self.raw,
                "current value does not match the value given for deletion",
            )),
            _ => Ok(()),
        }
    }

    fn new_value(&self) -> ConfigNode {
        self.value.clone().unwrap_or_else(ConfigNode::null)
    }
}

impl FromStr for Override {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Override::parse(s)
    }
}

impl fmt::Display for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn parse_overrides<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Override>> {
    raw.iter().map(|s| Override::parse(s.as_ref())).collect()
}

pub fn apply_overrides(root: &mut Mapping, overrides: &[Override]) -> Result<()> {
    for o in overrides {
        o.apply(root)?;
    }
    Ok(())
}

fn parse_value(raw: &str) -> ConfigNode {
    let raw = raw.trim();
    if raw.is_empty() {
        return ConfigNode::Scalar(Scalar::String(String::new()));
    }
    serde_yaml::from_str::<serde_yaml::Value>(raw)
        .ok()
        .and_then(|v| ConfigNode::from_yaml(v).ok())
        .unwrap_or_else(|| ConfigNode::Scalar(Scalar::String(raw.to_string())))
}

enum Slot<'a> {
    Map(&'a mut Mapping),
    Seq(&'a mut Vec<ConfigNode>),
}

fn descend<'a>(
    root: &'a mut Mapping,
    parents: &[&str],
    create: bool,
    raw: &str,
    key: &str,
) -> Result<Slot<'a>> {
    let mut slot = Slot::Map(root);
    for seg in parents {
        let next: &'a mut ConfigNode = match slot {
            Slot::Map(map) => {
                if !map.contains_key(seg) {
                    if !create {
                        return Err(ConfigError::MissingKey(key.to_string()));
                    }
                    map.insert(*seg, ConfigNode::Mapping(Mapping::new()));
                }
                map.get_mut(seg)
                    .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?
            }
            Slot::Seq(items) => {
                let len = items.len();
                let idx: usize = seg
                    .parse()
                    .ok()
                    .filter(|i| *i < len)
                    .ok_or_else(|| {
                        ConfigError::invalid_override(
                            raw,
                            format!("'{}' is not a valid index into a sequence of {}", seg, len),
                        )
                    })?;
                &mut items[idx]
            }
        };
        slot = match next {
            ConfigNode::Mapping(m) => Slot::Map(m),
            ConfigNode::Sequence(s) => Slot::Seq(s),
            ConfigNode::Scalar(s) => {
                return Err(ConfigError::invalid_override(
                    raw,
                    format!("'{}' is a {}, not a mapping or sequence", seg, s.kind()),
                ))
            }
        };
    }
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Mapping {
        let value: serde_yaml::Value = serde_yaml::from_str(
            "name: model_train\nmlflow:\n  experiment_name: demo\n  resume: false\nlayers: [64, 32]\n",
        )
        .expect("yaml");
        Mapping::from_yaml(value).expect("mapping")
    }

    fn apply(map: &mut Mapping, raw: &str) -> Result<()> {
        Override::parse(raw)?.apply(map)
    }

    #[test]
    fn parse_recognises_prefixes() {
        assert_eq!(Override::parse("a=1").expect("set").op(), OverrideOp::Set);
        assert_eq!(Override::parse("+a=1").expect("add").op(), OverrideOp::Add);
        assert_eq!(
            Override::parse("++a=1").expect("upsert").op(),
            OverrideOp::Upsert
        );
        let del = Override::parse("~a.b").expect("delete");
        assert_eq!(del.op(), OverrideOp::Delete);
        assert_eq!(del.key(), "a.b");
        assert!(del.value().is_none());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Override::parse("novalue").is_err());
        assert!(Override::parse("=1").is_err());
        assert!(Override::parse("a..b=1").is_err());
    }

    #[test]
    fn values_are_parsed_as_yaml() {
        let o = Override::parse("mlflow.resume=true").expect("parse");
        assert_eq!(o.value(), Some(&ConfigNode::Scalar(Scalar::Bool(true))));
        let o = Override::parse("layers=[1, 2]").expect("parse");
        assert_eq!(o.value().and_then(ConfigNode::as_sequence).map(<[_]>::len), Some(2));
        let o = Override::parse("mlflow.run_name=").expect("parse");
        assert_eq!(o.value().and_then(ConfigNode::as_str), Some(""));
        let o = Override::parse("tag={unclosed").expect("parse");
        assert_eq!(o.value().and_then(ConfigNode::as_str), Some("{unclosed"));
    }

    #[test]
    fn set_replaces_existing_and_rejects_missing() {
        let mut map = base();
        apply(&mut map, "mlflow.experiment_name=other").expect("set");
        assert_eq!(
            map.select("mlflow.experiment_name").and_then(ConfigNode::as_str),
            Some("other")
        );
        let err = apply(&mut map, "mlflow.run_name=x").expect_err("missing key");
        assert!(err.to_string().contains("+mlflow.run_name=x"), "{}", err);
        assert!(apply(&mut map, "nope.deeper=1").is_err());
    }

    #[test]
    fn add_creates_parents_and_rejects_existing() {
        let mut map = base();
        apply(&mut map, "+trainer.optim.lr=0.01").expect("add");
        assert_eq!(
            map.select("trainer.optim.lr"),
            Some(&ConfigNode::Scalar(Scalar::Float(0.01)))
        );
        let err = apply(&mut map, "+name=other").expect_err("exists");
        assert!(matches!(err, ConfigError::KeyExists(k) if k == "name"));
    }

    #[test]
    fn upsert_works_either_way() {
        let mut map = base();
        apply(&mut map, "++name=eval").expect("replace");
        apply(&mut map, "++mlflow.run_name=r1").expect("insert");
        assert_eq!(map.select("name").and_then(ConfigNode::as_str), Some("eval"));
        assert_eq!(
            map.select("mlflow.run_name").and_then(ConfigNode::as_str),
            Some("r1")
        );
    }

    #[test]
    fn delete_honours_value_guard() {
        let mut map = base();
        assert!(apply(&mut map, "~mlflow.resume=true").is_err());
        apply(&mut map, "~mlflow.resume=false").expect("guard matches");
        assert!(map.select("mlflow.resume").is_none());
        assert!(apply(&mut map, "~mlflow.resume").is_err());
    }

    #[test]
    fn sequence_elements_are_addressable() {
        let mut map = base();
        apply(&mut map, "layers.1=16").expect("set index");
        apply(&mut map, "+layers.2=8").expect("append");
        assert!(apply(&mut map, "layers.5=1").is_err());
        apply(&mut map, "~layers.0").expect("delete index");
        let layers: Vec<String> = map
            .select("layers")
            .and_then(ConfigNode::as_sequence)
            .expect("layers")
            .iter()
            .map(|n| n.as_scalar().expect("scalar").to_string())
            .collect();
        assert_eq!(layers, vec!["16", "8"]);
    }

    #[test]
    fn cannot_descend_into_scalar() {
        let mut map = base();
        let err = apply(&mut map, "+name.sub=1").expect_err("scalar parent");
        assert!(err.to_string().contains("not a mapping or sequence"), "{}", err);
    }
}
