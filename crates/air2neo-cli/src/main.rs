//! air2neo CLI
//!
//! Incrementally syncs metatable-described Airtable tables into Neo4j.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::Cli;

/// Initialize tracing with optional file logging.
///
/// The returned guard flushes the file writer when dropped, so it has to
/// live until the process exits.
fn init_tracing(log_file: Option<&std::path::Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
    let default_filter = if verbose {
        "air2neo=debug,air2neo_core=debug,air2neo_graph=debug,air2neo_airtable=debug,air2neo_redis=debug"
    } else {
        "air2neo=info,air2neo_core=info,air2neo_graph=info,air2neo_airtable=info,air2neo_redis=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(None);
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    // Log to both stderr and the file
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let guard = init_tracing(cli.log_file.as_deref(), cli.verbose)?;

    let success = cli.execute().await?;
    drop(guard);
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
