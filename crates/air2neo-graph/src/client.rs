//! Neo4j connection client.

use air2neo_core::GraphCounts;
use anyhow::{Context, Result};
use neo4rs::{ConfigBuilder, Graph, Query};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> usize {
    8
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: default_database(),
            max_connections: default_max_connections(),
        }
    }
}

/// Client for the target graph.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect and ping.
    ///
    /// `Graph::connect` only builds a lazy pool; the `RETURN 1` forces a real
    /// bolt handshake so an unreachable server fails here rather than on the
    /// first write.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(200)
            .build()
            .context("Failed to build Neo4j config")?;

        let graph = Graph::connect(neo4j_config)
            .await
            .context("Failed to create Neo4j connection pool")?;

        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .context("Neo4j is not responding to queries")?;

        Ok(Self { graph })
    }

    /// Execute a Cypher query that returns no results.
    pub async fn execute(&self, query: Query) -> Result<()> {
        self.graph
            .run(query)
            .await
            .context("Neo4j query execution failed")?;
        Ok(())
    }

    /// Run queries in one transaction: all of them apply, or none.
    pub async fn execute_in_transaction(&self, queries: Vec<Query>) -> Result<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .context("Failed to start Neo4j transaction")?;

        for query in queries {
            if let Err(e) = txn.run(query).await {
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "Failed to roll back Neo4j transaction");
                }
                return Err(e).context("Neo4j transaction statement failed");
            }
        }

        txn.commit()
            .await
            .context("Failed to commit Neo4j transaction")?;
        Ok(())
    }

    /// Execute a Cypher query and return results as rows.
    pub async fn query(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Neo4j query failed")?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.context("Failed to read Neo4j row")? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a Cypher query and return a single scalar value.
    pub async fn query_scalar<T: DeserializeOwned>(
        &self,
        query: Query,
        field: &str,
    ) -> Result<Option<T>> {
        let rows = self.query(query).await?;
        if let Some(row) = rows.into_iter().next() {
            let val: T = row
                .get(field)
                .map_err(|e| anyhow::anyhow!("Failed to get field '{}': {:?}", field, e))?;
            Ok(Some(val))
        } else {
            Ok(None)
        }
    }

    /// Node and relationship totals.
    pub async fn get_counts(&self) -> Result<GraphCounts> {
        let node_query = Query::new("MATCH (n) RETURN count(n) AS count".to_string());
        let rel_query = Query::new("MATCH ()-[r]->() RETURN count(r) AS count".to_string());

        let nodes: i64 = self.query_scalar(node_query, "count").await?.unwrap_or(0);
        let relationships: i64 = self.query_scalar(rel_query, "count").await?.unwrap_or(0);

        Ok(GraphCounts {
            nodes: nodes.max(0) as u64,
            relationships: relationships.max(0) as u64,
        })
    }

    /// Node count per label, ordered by label.
    pub async fn label_counts(&self) -> Result<Vec<(String, u64)>> {
        let query = Query::new(
            "MATCH (n) UNWIND labels(n) AS label
             RETURN label, count(*) AS count
             ORDER BY label"
                .to_string(),
        );

        self.query(query)
            .await?
            .into_iter()
            .map(|row| {
                let label: String = row
                    .get("label")
                    .map_err(|e| anyhow::anyhow!("Failed to read label: {:?}", e))?;
                let count: i64 = row
                    .get("count")
                    .map_err(|e| anyhow::anyhow!("Failed to read count: {:?}", e))?;
                Ok((label, count.max(0) as u64))
            })
            .collect()
    }
}
