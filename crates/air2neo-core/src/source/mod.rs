//! Source table port.
//!
//! The engine only needs two things from the tabular source: rows of a
//! table inside a modification window, and a way to turn a raw link cell
//! into foreign row identifiers.

pub mod links;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use links::{LinkError, LinkTarget, parse_link_value};
#[cfg(any(test, feature = "testing"))]
pub use memory::MemorySource;

/// One row of a source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    /// Source-assigned, stable identifier.
    pub id: String,
    /// Last modification time reported by the source.
    pub modified: DateTime<Utc>,
    pub fields: BTreeMap<String, Value>,
}

impl SourceRow {
    /// A row with no fields.
    pub fn new(id: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            modified,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, column: impl Into<String>, value: Value) -> Self {
        self.fields.insert(column.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// Turns a raw link cell into the identifiers it references.
pub trait LinkResolver {
    /// Resolve a link cell. The default accepts any non-empty string id.
    fn resolve_link(&self, value: &Value) -> Result<Vec<LinkTarget>, LinkError> {
        parse_link_value(value, |_| true)
    }
}

/// Client for the tabular source.
#[async_trait]
pub trait SourceClient: LinkResolver + Send + Sync {
    /// Rows of `table` with `modified_since <= modified < modified_before`.
    ///
    /// Either bound may be absent. Implementations may return extra rows
    /// outside the window and in any order; the extractor filters and sorts.
    async fn list_rows(
        &self,
        table: &str,
        modified_since: Option<DateTime<Utc>>,
        modified_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<SourceRow>>;
}
