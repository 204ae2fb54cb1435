//! Airtable list-records payloads.

use std::collections::BTreeMap;

use air2neo_core::SourceRow;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// One page of `GET /v0/{base}/{table}`.
#[derive(Debug, Deserialize)]
pub struct RecordPage {
    pub records: Vec<AirtableRecord>,
    /// Cursor for the next page; absent on the last one.
    #[serde(default)]
    pub offset: Option<String>,
}

/// A single Airtable record.
#[derive(Debug, Clone, Deserialize)]
pub struct AirtableRecord {
    pub id: String,
    #[serde(rename = "createdTime")]
    pub created_time: DateTime<Utc>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl AirtableRecord {
    /// Convert to a source row, reading the modification time from
    /// `last_modified_field`.
    ///
    /// Records whose field is empty or unparseable have never been edited
    /// since the field was added; their creation time stands in.
    pub fn into_source_row(self, last_modified_field: &str) -> SourceRow {
        let modified = self
            .fields
            .get(last_modified_field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(self.created_time);

        SourceRow {
            id: self.id,
            modified,
            fields: self.fields,
        }
    }
}
