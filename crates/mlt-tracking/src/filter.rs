//! Run search filters.
//!
//! Grammar: `clause (AND clause)*` where a clause is
//! `<entity>.<key> (= | !=) '<value>'`. Entities are `tags`, `params` and
//! `attributes` (`run_name`, `run_id`, `status`); a bare key is an
//! attribute. Keys may be wrapped in backticks, values in single or double
//! quotes. An empty filter matches every run.

use crate::error::{Result, TrackingError};
use crate::record::{RunRecord, RUN_NAME_TAG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Tag,
    Param,
    Attribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    NotEq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub entity: Entity,
    pub key: String,
    pub comparator: Comparator,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    clauses: Vec<Clause>,
}

const ATTRIBUTE_KEYS: [&str; 3] = ["run_name", "run_id", "status"];

/// Filter selecting runs whose name tag equals `run_name`.
pub fn run_name_filter(run_name: &str) -> String {
    if run_name.contains('\'') {
        format!("tags.`{}` = \"{}\"", RUN_NAME_TAG, run_name)
    } else {
        format!("tags.`{}` = '{}'", RUN_NAME_TAG, run_name)
    }
}

impl RunFilter {
    pub fn parse(filter: &str) -> Result<Self> {
        let tokens = tokenize(filter)?;
        let mut clauses = Vec::new();
        let mut iter = tokens.into_iter().peekable();
        let invalid = |reason: &str| TrackingError::InvalidFilter {
            filter: filter.to_string(),
            reason: reason.to_string(),
        };

        while iter.peek().is_some() {
            if !clauses.is_empty() {
                match iter.next() {
                    Some(Token::And) => {}
                    _ => return Err(invalid("expected AND between clauses")),
                }
            }
            let ident = match iter.next() {
                Some(Token::Ident(i)) => i,
                _ => return Err(invalid("expected an identifier")),
            };
            let comparator = match iter.next() {
                Some(Token::Eq) => Comparator::Eq,
                Some(Token::NotEq) => Comparator::NotEq,
                _ => return Err(invalid("expected '=' or '!='")),
            };
            let value = match iter.next() {
                Some(Token::Str(v)) => v,
                _ => return Err(invalid("expected a quoted value")),
            };
            let (entity, key) = split_identifier(&ident);
            if key.is_empty() {
                return Err(invalid("empty key"));
            }
            if entity == Entity::Attribute && !ATTRIBUTE_KEYS.contains(&key.as_str()) {
                return Err(invalid(&format!("unsupported attribute '{}'", key)));
            }
            clauses.push(Clause {
                entity,
                key,
                comparator,
                value,
            });
        }
        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn matches(&self, run: &RunRecord) -> bool {
        self.clauses.iter().all(|c| {
            let actual = match c.entity {
                Entity::Tag => run.data.tags.get(&c.key).map(String::as_str),
                Entity::Param => run.data.params.get(&c.key).map(String::as_str),
                Entity::Attribute => match c.key.as_str() {
                    "run_name" => Some(run.info.run_name.as_str()),
                    "run_id" => Some(run.info.run_id.as_str()),
                    "status" => Some(run.info.status.as_str()),
                    _ => None,
                },
            };
            match (c.comparator, actual) {
                (Comparator::Eq, Some(v)) => v == c.value,
                (Comparator::NotEq, Some(v)) => v != c.value,
                (_, None) => false,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Eq,
    NotEq,
    And,
}

fn tokenize(filter: &str) -> Result<Vec<Token>> {
    let invalid = |reason: String| TrackingError::InvalidFilter {
        filter: filter.to_string(),
        reason,
    };
    let mut tokens = Vec::new();
    let mut chars = filter.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '=' {
            chars.next();
            tokens.push(Token::Eq);
        } else if c == '!' {
            chars.next();
            if chars.next() != Some('=') {
                return Err(invalid("expected '!='".to_string()));
            }
            tokens.push(Token::NotEq);
        } else if c == '\'' || c == '"' {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some(ch) if ch == c => break,
                    Some(ch) => value.push(ch),
                    None => return Err(invalid("unterminated string".to_string())),
                }
            }
            tokens.push(Token::Str(value));
        } else if c.is_alphanumeric() || c == '_' || c == '`' {
            let mut ident = String::new();
            while let Some(&ch) = chars.peek() {
                if ch == '`' {
                    chars.next();
                    ident.push('`');
                    loop {
                        match chars.next() {
                            Some('`') => break,
                            Some(inner) => ident.push(inner),
                            None => return Err(invalid("unterminated backtick".to_string())),
                        }
                    }
                    ident.push('`');
                } else if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '-' {
                    chars.next();
                    ident.push(ch);
                } else {
                    break;
                }
            }
            if ident.eq_ignore_ascii_case("and") {
                tokens.push(Token::And);
            } else {
                tokens.push(Token::Ident(ident));
            }
        } else {
            return Err(invalid(format!("unexpected character '{}'", c)));
        }
    }
    Ok(tokens)
}

/// Splits `tags.mlflow.runName` into the entity and the rest of the key and
/// strips backticks from the key.
fn split_identifier(ident: &str) -> (Entity, String) {
    let (entity, rest) = match ident.split_once('.') {
        Some((prefix, rest)) if !prefix.starts_with('`') => {
            match prefix.to_ascii_lowercase().as_str() {
                "tags" | "tag" => (Entity::Tag, rest),
                "params" | "param" | "parameter" | "parameters" => (Entity::Param, rest),
                "attributes" | "attribute" | "attr" | "run" => (Entity::Attribute, rest),
                _ => (Entity::Attribute, ident),
            }
        }
        _ => (Entity::Attribute, ident),
    };
    (entity, rest.replace('`', ""))
}
