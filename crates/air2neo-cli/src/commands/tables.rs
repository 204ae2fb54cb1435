//! The `tables` command.

use air2neo_core::{SchemaResolver, SyncConfig};
use anyhow::Result;

use super::Connections;
use crate::output;

pub async fn execute(config: &SyncConfig, connections: &Connections) -> Result<()> {
    let source = connections.airtable(config)?;
    let descriptors = SchemaResolver::new(&source, config).resolve().await?;
    output::print_descriptors(&config.metatable, &descriptors);
    Ok(())
}
