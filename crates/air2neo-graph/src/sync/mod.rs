//! Incremental sync orchestration.
//!
//! For every table the metatable lists, and for each of its two kinds:
//! extract rows changed since the watermark, map them, write them to the
//! graph batch by batch, and advance the watermark after each committed
//! batch. A failing (table, kind) pass never affects the others.

pub mod pass;
pub mod report;

use std::collections::HashMap;

use air2neo_core::mapping::{map_edges, map_node};
use air2neo_core::{
    ChangeExtractor, EdgeRecord, GraphSink, LinkResolver, NodeRecord, SchemaResolver,
    SourceClient, SourceRow, SyncConfig, SyncError, SyncKind, SyncResult, TableDescriptor,
    Watermark, WatermarkKey, WatermarkStore,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

pub use pass::{PassReport, PassState};
pub use report::{RunReport, TableReport};

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Ignore stored and seed watermarks and re-read every row.
    pub full_refresh: bool,
    /// Delete the whole graph and every watermark first.
    pub nuke: bool,
    /// Informational; the caller wires in-memory stores for dry runs.
    pub dry_run: bool,
    /// Restrict the run to these tables. Empty means all.
    pub tables: Vec<String>,
}

/// Drives a sync run over a source, a graph and a watermark store.
pub struct SyncEngine<'a, S: ?Sized, G: ?Sized, W: ?Sized> {
    source: &'a S,
    graph: &'a G,
    watermarks: &'a W,
    config: &'a SyncConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a, S, G, W> SyncEngine<'a, S, G, W>
where
    S: SourceClient + ?Sized,
    G: GraphSink + ?Sized,
    W: WatermarkStore + ?Sized,
{
    pub fn new(source: &'a S, graph: &'a G, watermarks: &'a W, config: &'a SyncConfig) -> Self {
        Self {
            source,
            graph,
            watermarks,
            config,
            shutdown: None,
        }
    }

    /// Stop at the next batch boundary once `true` is sent.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run one sync.
    ///
    /// Errors are returned only for run-level failures: a malformed or
    /// unreachable metatable, an unknown `--table`, or a failed nuke.
    /// Everything else is reported per pass in the [`RunReport`].
    pub async fn run(&self, options: &SyncOptions) -> SyncResult<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", run_id = %run_id);
        self.run_inner(run_id, options).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, options: &SyncOptions) -> SyncResult<RunReport> {
        let started_at = Utc::now();
        info!(
            full_refresh = options.full_refresh,
            nuke = options.nuke,
            dry_run = options.dry_run,
            "Starting sync run"
        );

        let descriptors = SchemaResolver::new(self.source, self.config).resolve().await?;
        let selected = select_tables(&descriptors, &options.tables)?;

        if options.nuke {
            self.nuke(&descriptors).await?;
        }

        let constraint_failures = self.ensure_constraints(&descriptors).await;

        let mut tables: Vec<TableReport> = stream::iter(selected.iter().copied())
            .map(|descriptor| {
                let blocked = constraint_failures.get(&descriptor.node_label).cloned();
                self.sync_table(descriptor, options, started_at, blocked)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let order: HashMap<&str, usize> = selected
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.as_str(), i))
            .collect();
        tables.sort_by_key(|t| order.get(t.table.as_str()).copied().unwrap_or(usize::MAX));

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: options.dry_run,
            tables,
        };

        info!(
            tables = report.tables.len(),
            failed = report.failed().count(),
            row_errors = report.row_errors().count(),
            records = report.records_written(),
            cancelled = report.was_cancelled(),
            "Sync run finished"
        );
        Ok(report)
    }

    /// Clear the graph and every watermark, stored or described.
    async fn nuke(&self, descriptors: &[TableDescriptor]) -> SyncResult<()> {
        warn!("Nuking graph and watermarks");
        self.graph
            .clear()
            .await
            .map_err(|e| SyncError::Graph(format!("{:#}", e)))?;

        let stored = self.watermarks.list().await.map_err(|e| SyncError::Watermark {
            key: "*".to_string(),
            message: format!("{:#}", e),
        })?;

        let mut tables: Vec<&str> = stored.iter().map(|(k, _)| k.table.as_str()).collect();
        tables.extend(descriptors.iter().map(|d| d.name.as_str()));
        tables.sort_unstable();
        tables.dedup();

        for table in tables {
            self.watermarks
                .clear(table)
                .await
                .map_err(|e| SyncError::Watermark {
                    key: table.to_string(),
                    message: format!("{:#}", e),
                })?;
        }
        Ok(())
    }

    /// Ensure every label's uniqueness constraint before any pass writes.
    ///
    /// Returns the labels whose constraint could not be created, with the
    /// reason. Tables writing such a label do not run.
    async fn ensure_constraints(&self, descriptors: &[TableDescriptor]) -> HashMap<String, String> {
        let mut failures = HashMap::new();
        for descriptor in descriptors {
            if failures.contains_key(&descriptor.node_label) {
                continue;
            }
            for properties in descriptor.constraints() {
                if let Err(e) = self
                    .graph
                    .ensure_constraint(&descriptor.node_label, &properties)
                    .await
                {
                    error!(label = %descriptor.node_label, ?properties, error = %e, "Failed to ensure constraint");
                    failures.insert(descriptor.node_label.clone(), format!("{:#}", e));
                    break;
                }
            }
        }
        failures
    }

    async fn sync_table(
        &self,
        descriptor: &TableDescriptor,
        options: &SyncOptions,
        before: DateTime<Utc>,
        blocked: Option<String>,
    ) -> TableReport {
        let span = info_span!("table", table = %descriptor.name);
        async {
            info!(label = %descriptor.node_label, "Syncing table");
            let blocked = blocked.as_deref();
            let (properties, edges) = futures::join!(
                self.run_pass(descriptor, SyncKind::Properties, options, before, blocked),
                self.run_pass(descriptor, SyncKind::Edges, options, before, blocked),
            );
            TableReport {
                table: descriptor.name.clone(),
                properties,
                edges,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_pass(
        &self,
        descriptor: &TableDescriptor,
        kind: SyncKind,
        options: &SyncOptions,
        before: DateTime<Utc>,
        blocked: Option<&str>,
    ) -> PassReport {
        let report = PassReport::new(&descriptor.name, kind);
        let report = self
            .run_pass_inner(report, descriptor, kind, options, before, blocked)
            .await;

        match report.state {
            PassState::Failed => error!(
                table = %descriptor.name,
                kind = %kind,
                error = report.error.as_deref().unwrap_or_default(),
                "Pass failed"
            ),
            state => info!(
                table = %descriptor.name,
                kind = %kind,
                state = %state,
                rows = report.rows_read,
                written = report.records_written,
                batches = report.batches_committed,
                "Pass finished"
            ),
        }
        report
    }

    async fn run_pass_inner(
        &self,
        mut report: PassReport,
        descriptor: &TableDescriptor,
        kind: SyncKind,
        options: &SyncOptions,
        before: DateTime<Utc>,
        blocked: Option<&str>,
    ) -> PassReport {
        if kind == SyncKind::Edges && descriptor.edge_fields.is_empty() {
            report.transition(PassState::Skipped);
            return report;
        }

        report.transition(PassState::Extracting);
        let key = WatermarkKey::new(&descriptor.name, kind);

        if let Some(reason) = blocked {
            return report.fail(SyncError::WriteFailure {
                table: descriptor.name.clone(),
                kind,
                message: format!("uniqueness constraint unavailable: {}", reason),
            });
        }

        let stored = match self.watermarks.get(&key).await {
            Ok(stored) => stored,
            Err(e) => {
                return report.fail(SyncError::Watermark {
                    key: key.to_string(),
                    message: format!("{:#}", e),
                });
            }
        };
        // A full refresh reads from scratch, but the store keeps merging
        // forward, so the stored value stays the floor of what is reported.
        let (mut current, floor) = if options.full_refresh {
            (None, stored)
        } else {
            (stored.or_else(|| descriptor.seed(kind)), None)
        };
        report.watermark = floor.clone().or_else(|| current.clone());

        let extractor = ChangeExtractor::new(self.source, &self.config.retry, self.config.batch_size);
        let changes = match extractor
            .fetch_changed(descriptor, current.as_ref(), Some(before))
            .await
        {
            Ok(changes) => changes,
            Err(e) => return report.fail(e),
        };
        report.rows_read = changes.len();

        if changes.is_empty() {
            report.transition(PassState::Committed);
            return report;
        }

        for (index, batch) in changes.batches().enumerate() {
            if self.is_cancelled() {
                info!(table = %descriptor.name, kind = %kind, batch = index, "Cancelled at batch boundary");
                report.transition(PassState::Cancelled);
                return report;
            }

            report.transition(PassState::Mapping);
            let mutations = map_batch(&mut report, descriptor, kind, batch, self.source);

            report.transition(PassState::Writing);
            let written = match self.write(descriptor, kind, &mutations).await {
                Ok(written) => written,
                Err(e) => return report.fail(e),
            };

            let next = Watermark::advance(current.as_ref(), batch);
            if let Some(next) = &next {
                if let Err(e) = self.watermarks.set(&key, next).await {
                    return report.fail(SyncError::Watermark {
                        key: key.to_string(),
                        message: format!("{:#}", e),
                    });
                }
            }

            report.transition(PassState::Committed);
            report.records_written += written;
            report.batches_committed += 1;
            report.watermark = match (&floor, &next) {
                (Some(floor), Some(next)) => Some(floor.merge_forward(next)),
                _ => next.clone().or_else(|| floor.clone()),
            };
            current = next;

            debug!(
                table = %descriptor.name,
                kind = %kind,
                batch = index,
                rows = batch.len(),
                written,
                "Batch committed"
            );
        }

        report
    }

    /// Write one batch as a single graph transaction.
    async fn write(
        &self,
        descriptor: &TableDescriptor,
        kind: SyncKind,
        mutations: &BatchMutations,
    ) -> SyncResult<usize> {
        let result = match mutations {
            BatchMutations::Nodes(nodes) => self.graph.merge_nodes(nodes).await,
            BatchMutations::Edges(edges) => self.graph.merge_relationships(edges).await,
        };

        result.map_err(|e| SyncError::WriteFailure {
            table: descriptor.name.clone(),
            kind,
            message: format!("{:#}", e),
        })
    }
}

/// Graph mutations of one batch.
enum BatchMutations {
    Nodes(Vec<NodeRecord>),
    Edges(Vec<EdgeRecord>),
}

/// Map a batch. Invalid link values are collected into the report.
fn map_batch<R: LinkResolver + ?Sized>(
    report: &mut PassReport,
    descriptor: &TableDescriptor,
    kind: SyncKind,
    batch: &[SourceRow],
    resolver: &R,
) -> BatchMutations {
    match kind {
        SyncKind::Properties => {
            BatchMutations::Nodes(batch.iter().map(|row| map_node(descriptor, row)).collect())
        }
        SyncKind::Edges => {
            let mut edges = Vec::new();
            for row in batch {
                let mapping = map_edges(descriptor, row, resolver);
                for err in &mapping.errors {
                    warn!(
                        table = %err.table,
                        row = %err.row_id,
                        column = %err.column,
                        reason = %err.reason,
                        "Skipping invalid link value"
                    );
                }
                report.row_errors.extend(mapping.errors);
                edges.extend(mapping.edges);
            }
            BatchMutations::Edges(edges)
        }
    }
}

/// Descriptors named by `--table`, in metatable order. Empty selects all.
fn select_tables<'d>(
    descriptors: &'d [TableDescriptor],
    names: &[String],
) -> SyncResult<Vec<&'d TableDescriptor>> {
    if names.is_empty() {
        return Ok(descriptors.iter().collect());
    }
    if let Some(unknown) = names
        .iter()
        .find(|name| !descriptors.iter().any(|d| &d.name == *name))
    {
        return Err(SyncError::config(format!(
            "table '{}' is not listed in the metatable",
            unknown
        )));
    }
    Ok(descriptors
        .iter()
        .filter(|d| names.contains(&d.name))
        .collect())
}

#[cfg(test)]
mod tests;
