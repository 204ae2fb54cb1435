//! The `sync` command.

use air2neo_core::{
    GraphSink, MemoryGraph, MemoryWatermarkStore, SyncConfig, WatermarkStore,
};
use air2neo_graph::{RunReport, SyncEngine, SyncOptions};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;
use tokio::sync::watch;
use tracing::{info, warn};

use super::Connections;
use crate::output;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Ignore stored watermarks and re-read every row
    #[arg(long)]
    pub full_refresh: bool,

    /// Delete every node and relationship and all watermarks first
    #[arg(long)]
    pub nuke: bool,

    /// Confirm destructive operation without prompting
    #[arg(short, long)]
    pub yes: bool,

    /// Write into an in-memory graph; Neo4j and Redis are left untouched
    #[arg(long)]
    pub dry_run: bool,

    /// Only sync this table (repeatable)
    #[arg(long = "table", value_name = "NAME")]
    pub tables: Vec<String>,
}

impl SyncArgs {
    fn options(&self) -> SyncOptions {
        SyncOptions {
            full_refresh: self.full_refresh,
            nuke: self.nuke,
            dry_run: self.dry_run,
            tables: self.tables.clone(),
        }
    }
}

pub async fn execute(args: SyncArgs, config: &SyncConfig, connections: &Connections) -> Result<bool> {
    if args.nuke && !args.dry_run && !args.yes && !confirm_nuke()? {
        println!("{}", "Aborted.".dimmed());
        return Ok(true);
    }

    let source = connections.airtable(config)?;
    let shutdown = shutdown_on_ctrl_c();
    let options = args.options();

    let report = if args.dry_run {
        let graph = MemoryGraph::new();
        let watermarks = dry_run_watermarks(config, connections).await;
        SyncEngine::new(&source, &graph, &watermarks, config)
            .with_shutdown(shutdown)
            .run(&options)
            .await?
    } else {
        let graph = connections.graph().await?;
        let watermarks = connections.watermarks(config).await?;
        let report = SyncEngine::new(&source, &graph, &watermarks, config)
            .with_shutdown(shutdown)
            .run(&options)
            .await?;
        print_graph_totals(&graph).await;
        report
    };

    output::print_run_report(&report);
    Ok(finished_cleanly(&report))
}

fn confirm_nuke() -> Result<bool> {
    println!("{}", "This will permanently delete:".red().bold());
    println!("  {} every node and relationship in the target graph", "•".red());
    println!("  {} every stored sync watermark", "•".red());
    println!();

    Confirm::new()
        .with_prompt("Continue?")
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Flip the returned receiver to `true` on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Watermarks for a dry run: a copy of the stored ones when Redis is
/// reachable, so the dry run sees the same change window a real run would.
async fn dry_run_watermarks(config: &SyncConfig, connections: &Connections) -> MemoryWatermarkStore {
    let store = MemoryWatermarkStore::new();

    let stored = match connections.watermarks(config).await {
        Ok(redis) => redis.list().await,
        Err(e) => Err(e),
    };

    match stored {
        Ok(entries) => {
            info!(count = entries.len(), "Dry run starts from stored watermarks");
            for (key, watermark) in entries {
                if let Err(e) = store.set(&key, &watermark).await {
                    warn!(key = %key, error = %e, "Failed to copy watermark");
                }
            }
        }
        Err(e) => warn!(error = %e, "Stored watermarks unavailable, dry run starts from scratch"),
    }
    store
}

async fn print_graph_totals<G: GraphSink + ?Sized>(graph: &G) {
    match graph.counts().await {
        Ok(counts) => output::print_graph_counts(&counts),
        Err(e) => warn!(error = %e, "Failed to read graph totals"),
    }
}

/// A cancelled run exits non-zero as well; it did not finish.
fn finished_cleanly(report: &RunReport) -> bool {
    report.is_success() && !report.was_cancelled()
}
