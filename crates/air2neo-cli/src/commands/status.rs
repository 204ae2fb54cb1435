//! The `status` command.

use air2neo_core::{SyncConfig, WatermarkStore};
use anyhow::Result;

use super::Connections;
use crate::output;

pub async fn execute(config: &SyncConfig, connections: &Connections) -> Result<()> {
    let graph = connections.graph().await?;
    let counts = graph.get_counts().await?;
    let labels = graph.label_counts().await?;
    output::print_graph_status(&connections.neo4j_uri, &counts, &labels);

    let watermarks = connections.watermarks(config).await?;
    let entries = watermarks.list().await?;
    output::print_watermarks(&config.namespace, &entries);

    Ok(())
}
