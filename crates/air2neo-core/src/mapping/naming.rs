//! Relationship type naming policy.

use serde::{Deserialize, Serialize};

/// How a link column name becomes a relationship type.
///
/// The default strips everything from the first `__` on, so that
/// `IN_INDUSTRY__BANK` and `IN_INDUSTRY__TECH` both yield `IN_INDUSTRY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RelationshipNaming {
    /// Drop the suffix starting at the first `delimiter`.
    StripSuffix { delimiter: String },
    /// Use the column name as is.
    Verbatim,
}

impl Default for RelationshipNaming {
    fn default() -> Self {
        Self::StripSuffix {
            delimiter: "__".to_string(),
        }
    }
}

impl RelationshipNaming {
    /// Relationship type for `column`, or `None` if nothing usable remains.
    pub fn relationship_type(&self, column: &str) -> Option<String> {
        let name = match self {
            Self::StripSuffix { delimiter } if !delimiter.is_empty() => {
                column.split(delimiter.as_str()).next().unwrap_or(column)
            }
            _ => column,
        };
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}
