//! Centralized error types for air2neo.

use thiserror::Error;

use crate::watermark::SyncKind;

/// Errors that abort a run, a table, or a single (table, kind) pass.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed metatable row. Fatal to the whole run.
    #[error("Schema error in metatable row '{row}': {reason}")]
    Schema { row: String, reason: String },

    /// Fetching from the source failed after all retries.
    /// Fatal to the current table's current kind only.
    #[error("Source unavailable for table '{table}' after {attempts} attempt(s): {message}")]
    SourceUnavailable {
        table: String,
        attempts: u32,
        message: String,
    },

    /// The graph store rejected a batch. The watermark is not advanced.
    #[error("Write failure for table '{table}' ({kind}): {message}")]
    WriteFailure {
        table: String,
        kind: SyncKind,
        message: String,
    },

    /// The watermark store could not be read or written.
    #[error("Watermark store error for '{key}': {message}")]
    Watermark { key: String, message: String },

    /// The graph store failed outside a batch (constraints, clearing).
    #[error("Graph store error: {0}")]
    Graph(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for air2neo operations.
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Create a schema error for a metatable row.
    pub fn schema(row: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            row: row.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// A single row/column that could not be mapped.
///
/// Never propagated as a failure: the column is skipped and the error is
/// collected into the run report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("table '{table}', row '{row_id}', column '{column}': {reason}")]
pub struct RowMappingError {
    pub table: String,
    pub row_id: String,
    pub column: String,
    pub reason: String,
}
