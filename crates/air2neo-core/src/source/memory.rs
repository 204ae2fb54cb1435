//! In-memory source tables for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{LinkResolver, SourceClient, SourceRow};

/// Source tables held in memory.
///
/// Rows come back in insertion order, not modification order, so callers
/// exercise the extractor's own sorting.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, Vec<SourceRow>>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, replacing any row of the same table with the same id.
    pub fn upsert(&self, table: &str, row: SourceRow) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let rows = tables.entry(table.to_string()).or_default();
        match rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    /// Register an empty table.
    pub fn add_table(&self, table: &str) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.entry(table.to_string()).or_default();
    }

    /// Make the next `count` fetches of `table` fail.
    pub fn fail_next(&self, table: &str, count: u32) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.insert(table.to_string(), count);
    }

    /// Number of `list_rows` calls made for `table`.
    pub fn calls(&self, table: &str) -> u32 {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.get(table).copied().unwrap_or(0)
    }
}

impl LinkResolver for MemorySource {}

#[async_trait]
impl SourceClient for MemorySource {
    async fn list_rows(
        &self,
        table: &str,
        modified_since: Option<DateTime<Utc>>,
        modified_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<SourceRow>> {
        {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            *calls.entry(table.to_string()).or_default() += 1;
        }
        {
            let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(remaining) = failures.get_mut(table) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!("simulated outage fetching '{}'", table);
                }
            }
        }

        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let Some(rows) = tables.get(table) else {
            anyhow::bail!("unknown table '{}'", table);
        };
        Ok(rows
            .iter()
            .filter(|row| modified_since.is_none_or(|since| row.modified >= since))
            .filter(|row| modified_before.is_none_or(|before| row.modified < before))
            .cloned()
            .collect())
    }
}
