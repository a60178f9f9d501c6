//! Flattening a config tree into dotted parameter names.

use std::convert::Infallible;
use std::fmt;

use crate::node::{ConfigNode, Mapping, Scalar};

/// One flattened parameter: `trainer.optim.lr = 0.001`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub key: String,
    pub value: Scalar,
}

impl ParamEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ParamEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value.to_param_value())
    }
}

/// Walks `root` and hands every reachable scalar to `sink` as it is found.
///
/// Keys are joined with `.`; sequence elements use their index. The root's
/// own keys start the path. Entries come out in mapping insertion order and
/// sequence index order. The first error returned by `sink` stops the walk
/// and is returned as-is.
pub fn flatten_params<E, F>(root: &Mapping, mut sink: F) -> Result<(), E>
where
    F: FnMut(ParamEntry) -> Result<(), E>,
{
    walk_mapping(root, None, &mut sink)
}

/// Collects every entry [`flatten_params`] would emit.
pub fn collect_params(root: &Mapping) -> Vec<ParamEntry> {
    let mut out = Vec::new();
    let result: Result<(), Infallible> = flatten_params(root, |entry| {
        out.push(entry);
        Ok(())
    });
    match result {
        Ok(()) => out,
        Err(never) => match never {},
    }
}

fn walk_mapping<E, F>(map: &Mapping, prefix: Option<&str>, sink: &mut F) -> Result<(), E>
where
    F: FnMut(ParamEntry) -> Result<(), E>,
{
    for (key, child) in map.iter() {
        visit(child, join(prefix, key), sink)?;
    }
    Ok(())
}

fn walk_sequence<E, F>(items: &[ConfigNode], prefix: &str, sink: &mut F) -> Result<(), E>
where
    F: FnMut(ParamEntry) -> Result<(), E>,
{
    for (idx, child) in items.iter().enumerate() {
        visit(child, join(Some(prefix), &idx.to_string()), sink)?;
    }
    Ok(())
}

fn visit<E, F>(node: &ConfigNode, path: String, sink: &mut F) -> Result<(), E>
where
    F: FnMut(ParamEntry) -> Result<(), E>,
{
    match node {
        ConfigNode::Mapping(m) => walk_mapping(m, Some(&path), sink),
        ConfigNode::Sequence(items) => walk_sequence(items, &path, sink),
        ConfigNode::Scalar(value) => sink(ParamEntry {
            key: path,
            value: value.clone(),
        }),
    }
}

fn join(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(p) => format!("{}.{}", p, key),
        None => key.to_string(),
    }
}
