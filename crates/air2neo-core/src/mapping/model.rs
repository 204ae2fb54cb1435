//! Graph mutation records produced by the mappers.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Identity of a node: label plus merge-key property and value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeIdentity {
    pub label: String,
    pub id_property: String,
    pub id: String,
}

impl NodeIdentity {
    pub fn new(label: impl Into<String>, id_property: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            id_property: id_property.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {{{}: {}}})", self.label, self.id_property, self.id)
    }
}

/// Node upsert derived from one source row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub identity: NodeIdentity,
    /// Listed properties only. `Null` clears the property in the store.
    pub properties: BTreeMap<String, Value>,
}

/// Relationship upsert derived from one link value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeRecord {
    pub source: NodeIdentity,
    pub target: NodeIdentity,
    pub rel_type: String,
    pub properties: BTreeMap<String, Value>,
}

impl EdgeRecord {
    /// Upsert key: at most one relationship per key is kept.
    pub fn key(&self) -> (&NodeIdentity, &NodeIdentity, &str) {
        (&self.source, &self.target, self.rel_type.as_str())
    }
}
