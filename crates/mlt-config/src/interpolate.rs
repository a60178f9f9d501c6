//! `${...}` interpolation.
//!
//! Two forms are understood: `${dotted.path}` refers to another node of the
//! same config and `${now:FORMAT}` expands to the resolution time formatted
//! with strftime specifiers. A string that consists of a single reference
//! takes the referenced node as-is (type and all); references embedded in a
//! longer string are rendered as text. `\${` produces a literal `${`.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use crate::error::{ConfigError, Result};
use crate::node::{ConfigNode, Mapping, Scalar};

pub fn resolve(root: &Mapping) -> Result<Mapping> {
    resolve_at(root, Local::now())
}

/// Resolves with a fixed clock, so every `${now:...}` in one config agrees.
pub fn resolve_at(root: &Mapping, now: DateTime<Local>) -> Result<Mapping> {
    let resolver = Resolver { root, now };
    let mut stack = Vec::new();
    resolver.resolve_mapping(root, "", &mut stack)
}

pub fn has_interpolation(s: &str) -> bool {
    s.contains("${")
}

enum Piece {
    Text(String),
    Ref(String),
}

struct Resolver<'a> {
    root: &'a Mapping,
    now: DateTime<Local>,
}

impl Resolver<'_> {
    fn resolve_mapping(&self, map: &Mapping, prefix: &str, stack: &mut Vec<String>) -> Result<Mapping> {
        let mut out = Mapping::new();
        for (k, v) in map.iter() {
            let key = join(prefix, k);
            out.insert(k, self.resolve_node(v, &key, stack)?);
        }
        Ok(out)
    }

    fn resolve_node(&self, node: &ConfigNode, key: &str, stack: &mut Vec<String>) -> Result<ConfigNode> {
        match node {
            ConfigNode::Mapping(m) => Ok(ConfigNode::Mapping(self.resolve_mapping(m, key, stack)?)),
            ConfigNode::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.resolve_node(item, &join(key, &i.to_string()), stack)?);
                }
                Ok(ConfigNode::Sequence(out))
            }
            ConfigNode::Scalar(Scalar::String(s)) if has_interpolation(s) => {
                self.resolve_str(s, key, stack)
            }
            ConfigNode::Scalar(_) => Ok(node.clone()),
        }
    }

    fn resolve_str(&self, s: &str, key: &str, stack: &mut Vec<String>) -> Result<ConfigNode> {
        let pieces = split_pieces(s, key)?;
        if let [Piece::Ref(expr)] = pieces.as_slice() {
            return self.eval(expr, key, stack);
        }

        let mut out = String::new();
        for piece in pieces {
            match piece {
                Piece::Text(t) => out.push_str(&t),
                Piece::Ref(expr) => match self.eval(&expr, key, stack)? {
                    ConfigNode::Scalar(v) => out.push_str(&v.to_string()),
                    other => {
                        return Err(ConfigError::interpolation(
                            key,
                            format!("cannot embed a {} in a string (${{{}}})", other.kind(), expr),
                        ))
                    }
                },
            }
        }
        Ok(ConfigNode::Scalar(Scalar::String(out)))
    }

    fn eval(&self, expr: &str, key: &str, stack: &mut Vec<String>) -> Result<ConfigNode> {
        let expr = expr.trim();
        if let Some(fmt) = expr.strip_prefix("now:") {
            if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
                return Err(ConfigError::interpolation(
                    key,
                    format!("invalid time format '{}'", fmt),
                ));
            }
            return Ok(ConfigNode::Scalar(Scalar::String(
                self.now.format(fmt).to_string(),
            )));
        }
        if let Some((resolver, _)) = expr.split_once(':') {
            return Err(ConfigError::interpolation(
                key,
                format!("unsupported resolver '{}'", resolver),
            ));
        }
        if expr.is_empty() {
            return Err(ConfigError::interpolation(key, "empty reference"));
        }
        if stack.iter().any(|p| p == expr) {
            return Err(ConfigError::interpolation(
                key,
                format!("cycle through {} -> {}", stack.join(" -> "), expr),
            ));
        }
        let target = self.root.select(expr).ok_or_else(|| {
            ConfigError::interpolation(key, format!("'{}' not found", expr))
        })?;

        stack.push(expr.to_string());
        let resolved = self.resolve_node(target, expr, stack);
        stack.pop();
        resolved
    }
}

fn split_pieces(s: &str, key: &str) -> Result<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut rest = s;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("\\${") {
            text.push_str("${");
            rest = after;
        } else if let Some(after) = rest.strip_prefix("${") {
            let end = after.find('}').ok_or_else(|| {
                ConfigError::interpolation(key, format!("unterminated interpolation in '{}'", s))
            })?;
            let expr = &after[..end];
            if expr.contains("${") {
                return Err(ConfigError::interpolation(
                    key,
                    "nested interpolation is not supported",
                ));
            }
            if !text.is_empty() {
                pieces.push(Piece::Text(std::mem::take(&mut text)));
            }
            pieces.push(Piece::Ref(expr.to_string()));
            rest = &after[end + 1..];
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                text.push(c);
            }
            rest = chars.as_str();
        }
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }
    Ok(pieces)
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(text: &str) -> Mapping {
        let value: serde_yaml::Value = serde_yaml::from_str(text).expect("yaml");
        Mapping::from_yaml(value).expect("mapping")
    }

    #[test]
    fn whole_reference_keeps_type() {
        let map = parse("train:\n  epochs: 10\neval:\n  epochs: ${train.epochs}\n");
        let resolved = resolve(&map).expect("resolve");
        assert_eq!(
            resolved.select("eval.epochs"),
            Some(&ConfigNode::Scalar(Scalar::Int(10)))
        );
    }

    #[test]
    fn embedded_reference_becomes_text() {
        let map = parse("model: resnet\ndepth: 50\ntag: ${model}-${depth}\n");
        let resolved = resolve(&map).expect("resolve");
        assert_eq!(resolved.select("tag").and_then(ConfigNode::as_str), Some("resnet-50"));
    }

    #[test]
    fn chained_references_resolve() {
        let map = parse("a: ${b}\nb: ${c}\nc: [1, 2]\n");
        let resolved = resolve(&map).expect("resolve");
        assert_eq!(resolved.select("a.1"), Some(&ConfigNode::Scalar(Scalar::Int(2))));
    }

    #[test]
    fn cycles_are_reported() {
        let map = parse("a: ${b}\nb: ${a}\n");
        let err = resolve(&map).expect_err("cycle");
        assert!(err.to_string().contains("cycle"), "{}", err);
    }

    #[test]
    fn missing_and_unsupported_references_fail() {
        assert!(resolve(&parse("a: ${nope}\n")).is_err());
        assert!(resolve(&parse("a: ${oc.env:HOME}\n")).is_err());
        assert!(resolve(&parse("a: ${open\n")).is_err());
        assert!(resolve(&parse("m: {x: 1}\na: pre-${m}\n")).is_err());
    }

    #[test]
    fn now_uses_fixed_clock() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).single().expect("time");
        let map = parse("dir: outputs/${now:%Y-%m-%d}/${now:%H-%M-%S}\n");
        let resolved = resolve_at(&map, now).expect("resolve");
        assert_eq!(
            resolved.select("dir").and_then(ConfigNode::as_str),
            Some("outputs/2024-03-09/14-05-07")
        );
        assert!(resolve(&parse("d: ${now:%Q}\n")).is_err());
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let map = parse("a: \"cost \\\\${x}\"\n");
        let resolved = resolve(&map).expect("resolve");
        assert_eq!(resolved.select("a").and_then(ConfigNode::as_str), Some("cost ${x}"));
    }

    #[test]
    fn plain_values_untouched() {
        let map = parse("a: 1\nb: text\nc: [x, {d: true}]\n");
        assert_eq!(resolve(&map).expect("resolve"), map);
    }
}
