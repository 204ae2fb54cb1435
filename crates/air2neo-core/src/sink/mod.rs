//! Graph store port.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::mapping::{EdgeRecord, NodeRecord};

pub use memory::MemoryGraph;

/// Node and relationship totals of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphCounts {
    pub nodes: u64,
    pub relationships: u64,
}

/// Write side of the property graph.
///
/// Every write is an upsert: applying the same batch twice leaves the graph
/// as applying it once. A batch is applied entirely or not at all.
#[async_trait]
pub trait GraphSink: Send + Sync {
    /// Make sure a uniqueness constraint over `properties` exists for `label`.
    async fn ensure_constraint(&self, label: &str, properties: &[String]) -> Result<()>;

    /// Merge nodes by identity. Listed properties are set, `Null` ones
    /// removed, unlisted ones left alone. Returns the number of records applied.
    async fn merge_nodes(&self, nodes: &[NodeRecord]) -> Result<usize>;

    /// Merge relationships, creating bare endpoint nodes that do not exist yet.
    async fn merge_relationships(&self, edges: &[EdgeRecord]) -> Result<usize>;

    /// Remove every node and relationship.
    async fn clear(&self) -> Result<()>;

    async fn counts(&self) -> Result<GraphCounts>;
}
