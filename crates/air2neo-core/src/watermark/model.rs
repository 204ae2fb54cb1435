//! Watermark value types.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceRow;

/// The two independently tracked streams of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Properties,
    Edges,
}

impl SyncKind {
    pub const ALL: [SyncKind; 2] = [SyncKind::Properties, SyncKind::Edges];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Properties => "properties",
            Self::Edges => "edges",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "properties" => Some(Self::Properties),
            "edges" => Some(Self::Edges),
            _ => None,
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key: one watermark per (table, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatermarkKey {
    pub table: String,
    pub kind: SyncKind,
}

impl WatermarkKey {
    pub fn new(table: impl Into<String>, kind: SyncKind) -> Self {
        Self {
            table: table.into(),
            kind,
        }
    }
}

impl fmt::Display for WatermarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.kind)
    }
}

/// Position of the last committed change for one key.
///
/// `at` is the greatest source modification time committed so far and
/// `boundary_ids` holds every row id committed at exactly `at`. Rows at `at`
/// outside that set are still pending, which lets the extractor use an
/// inclusive lower bound without reprocessing committed rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub boundary_ids: BTreeSet<String>,
}

impl Watermark {
    /// A watermark with an empty boundary set, e.g. a metatable seed.
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            at,
            boundary_ids: BTreeSet::new(),
        }
    }

    /// Whether a row modified at `modified` still needs processing.
    pub fn admits(&self, modified: DateTime<Utc>, row_id: &str) -> bool {
        modified > self.at || (modified == self.at && !self.boundary_ids.contains(row_id))
    }

    /// Watermark after committing `batch` on top of `previous`.
    ///
    /// Returns `previous` unchanged for an empty batch.
    pub fn advance(previous: Option<&Watermark>, batch: &[SourceRow]) -> Option<Watermark> {
        let Some(batch_max) = batch.iter().map(|row| row.modified).max() else {
            return previous.cloned();
        };

        let at_max = batch
            .iter()
            .filter(|row| row.modified == batch_max)
            .map(|row| row.id.clone());

        let next = Watermark {
            at: batch_max,
            boundary_ids: at_max.collect(),
        };

        Some(match previous {
            Some(prev) => prev.merge_forward(&next),
            None => next,
        })
    }

    /// Combine with a candidate, never moving backwards.
    ///
    /// A later candidate replaces this one, an equal one unions the boundary
    /// sets, an earlier one is ignored.
    pub fn merge_forward(&self, candidate: &Watermark) -> Watermark {
        if candidate.at > self.at {
            candidate.clone()
        } else if candidate.at == self.at {
            let mut merged = self.clone();
            merged
                .boundary_ids
                .extend(candidate.boundary_ids.iter().cloned());
            merged
        } else {
            self.clone()
        }
    }
}
