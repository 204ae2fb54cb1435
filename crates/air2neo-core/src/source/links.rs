//! Link cell parsing.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// A foreign row referenced by a link cell.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTarget {
    pub id: String,
    /// Scalar properties carried by the link itself, if any.
    pub properties: BTreeMap<String, Value>,
}

impl LinkTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// Why a link cell could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("expected a row id or a list of row ids, found {0}")]
    NotALink(&'static str),

    #[error("invalid row id '{0}'")]
    InvalidId(String),

    #[error("link object without an 'id' key")]
    MissingId,
}

/// Parse a link cell.
///
/// Accepted shapes: `null` (no links), a single id string, or a list whose
/// items are id strings or objects with an `id` key. The remaining scalar
/// keys of such objects become link properties. `is_valid_id` vets every id.
pub fn parse_link_value(
    value: &Value,
    is_valid_id: impl Fn(&str) -> bool,
) -> Result<Vec<LinkTarget>, LinkError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(id) => Ok(vec![checked_target(id, &is_valid_id)?]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(id) => checked_target(id, &is_valid_id),
                Value::Object(map) => {
                    let id = map
                        .get("id")
                        .and_then(Value::as_str)
                        .ok_or(LinkError::MissingId)?;
                    let mut target = checked_target(id, &is_valid_id)?;
                    target.properties = map
                        .iter()
                        .filter(|(k, v)| k.as_str() != "id" && is_scalar(v))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    Ok(target)
                }
                other => Err(LinkError::NotALink(kind_name(other))),
            })
            .collect(),
        other => Err(LinkError::NotALink(kind_name(other))),
    }
}

fn checked_target(id: &str, is_valid_id: &impl Fn(&str) -> bool) -> Result<LinkTarget, LinkError> {
    let id = id.trim();
    if id.is_empty() || !is_valid_id(id) {
        return Err(LinkError::InvalidId(id.to_string()));
    }
    Ok(LinkTarget::new(id))
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
