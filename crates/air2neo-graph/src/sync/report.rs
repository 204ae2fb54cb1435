//! Run reports.

use air2neo_core::RowMappingError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::pass::{PassReport, PassState};

/// Both passes of one table.
#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: String,
    pub properties: PassReport,
    pub edges: PassReport,
}

impl TableReport {
    pub fn passes(&self) -> [&PassReport; 2] {
        [&self.properties, &self.edges]
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// In metatable order.
    pub tables: Vec<TableReport>,
}

impl RunReport {
    pub fn passes(&self) -> impl Iterator<Item = &PassReport> {
        self.tables.iter().flat_map(|t| t.passes())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PassReport> {
        self.passes().filter(|p| p.state == PassState::Failed)
    }

    pub fn row_errors(&self) -> impl Iterator<Item = &RowMappingError> {
        self.passes().flat_map(|p| p.row_errors.iter())
    }

    pub fn was_cancelled(&self) -> bool {
        self.passes().any(|p| p.state == PassState::Cancelled)
    }

    /// Every pass committed or had nothing to do.
    pub fn is_success(&self) -> bool {
        self.passes().all(|p| p.state.is_success())
    }

    pub fn records_written(&self) -> usize {
        self.passes().map(|p| p.records_written).sum()
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}
