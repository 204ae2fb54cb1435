//! Per (table, kind) pass state.

use std::fmt;

use air2neo_core::{RowMappingError, SyncError, SyncKind, Watermark};

/// Lifecycle of one (table, kind) pass.
///
/// `Committed` is re-entered after every batch; a pass with more batches
/// goes back to `Mapping` from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Extracting,
    Mapping,
    Writing,
    Committed,
    Failed,
    Cancelled,
    /// Nothing to sync for this kind (no edge columns).
    Skipped,
}

impl PassState {
    pub fn can_transition_to(self, next: PassState) -> bool {
        use PassState::*;
        matches!(
            (self, next),
            (Idle, Extracting | Skipped)
                | (Extracting, Mapping | Committed | Failed | Cancelled)
                | (Mapping, Writing | Failed)
                | (Writing, Committed | Failed)
                | (Committed, Mapping | Cancelled)
        )
    }

    /// Whether the pass ended without error.
    pub fn is_success(self) -> bool {
        matches!(self, PassState::Committed | PassState::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Mapping => "mapping",
            Self::Writing => "writing",
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one (table, kind) pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub table: String,
    pub kind: SyncKind,
    pub state: PassState,
    pub rows_read: usize,
    pub records_written: usize,
    pub batches_committed: usize,
    /// Watermark after the last committed batch.
    pub watermark: Option<Watermark>,
    pub error: Option<String>,
    pub row_errors: Vec<RowMappingError>,
}

impl PassReport {
    pub fn new(table: impl Into<String>, kind: SyncKind) -> Self {
        Self {
            table: table.into(),
            kind,
            state: PassState::Idle,
            rows_read: 0,
            records_written: 0,
            batches_committed: 0,
            watermark: None,
            error: None,
            row_errors: Vec::new(),
        }
    }

    pub(crate) fn transition(&mut self, next: PassState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid pass transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    pub(crate) fn fail(mut self, error: SyncError) -> Self {
        self.transition(PassState::Failed);
        self.error = Some(error.to_string());
        self
    }
}
