//! Batched upserts into Neo4j.
//!
//! Each call becomes one transaction of `UNWIND ... MERGE` statements, one
//! statement per label (nodes) or per endpoint labels and type (edges).

use std::collections::BTreeMap;

use air2neo_core::{EdgeRecord, GraphCounts, GraphSink, NodeRecord};
use anyhow::Result;
use async_trait::async_trait;
use neo4rs::{BoltList, BoltType, Query};
use tracing::{debug, info};

use crate::GraphClient;
use crate::bolt::{bolt_map, to_bolt};
use crate::schema::{constraint_statement, quote};

/// Cypher text plus the `$rows` parameter it unwinds.
#[derive(Debug)]
pub struct Statement {
    pub cypher: String,
    pub rows: BoltList,
}

impl Statement {
    fn into_query(self) -> Query {
        Query::new(self.cypher).param("rows", BoltType::List(self.rows))
    }
}

fn properties_param(properties: &BTreeMap<String, serde_json::Value>) -> BoltType {
    bolt_map(properties.iter().map(|(k, v)| (k.as_str(), to_bolt(v))))
}

/// One `MERGE ... SET n += row.props` statement per (label, id property).
///
/// `+=` leaves unlisted properties alone and removes those set to null.
pub fn node_statements(nodes: &[NodeRecord]) -> Vec<Statement> {
    let mut groups: BTreeMap<(&str, &str), BoltList> = BTreeMap::new();
    for node in nodes {
        let key = (node.identity.label.as_str(), node.identity.id_property.as_str());
        groups.entry(key).or_insert_with(BoltList::new).push(bolt_map([
            ("id", BoltType::from(node.identity.id.as_str())),
            ("props", properties_param(&node.properties)),
        ]));
    }

    groups
        .into_iter()
        .map(|((label, id_property), rows)| Statement {
            cypher: format!(
                "UNWIND $rows AS row \
                 MERGE (n:{} {{{}: row.id}}) \
                 SET n += row.props",
                quote(label),
                quote(id_property)
            ),
            rows,
        })
        .collect()
}

/// One statement per (source label, target label, relationship type).
///
/// Endpoints are merged too, so a target that has not been synced yet
/// exists as a bare node until its own table fills it in.
pub fn edge_statements(edges: &[EdgeRecord]) -> Vec<Statement> {
    type GroupKey<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str);
    let mut groups: BTreeMap<GroupKey<'_>, BoltList> = BTreeMap::new();

    for edge in edges {
        let key = (
            edge.source.label.as_str(),
            edge.source.id_property.as_str(),
            edge.rel_type.as_str(),
            edge.target.label.as_str(),
            edge.target.id_property.as_str(),
        );
        groups.entry(key).or_insert_with(BoltList::new).push(bolt_map([
            ("source", BoltType::from(edge.source.id.as_str())),
            ("target", BoltType::from(edge.target.id.as_str())),
            ("props", properties_param(&edge.properties)),
        ]));
    }

    groups
        .into_iter()
        .map(
            |((source_label, source_id, rel_type, target_label, target_id), rows)| Statement {
                cypher: format!(
                    "UNWIND $rows AS row \
                     MERGE (s:{} {{{}: row.source}}) \
                     MERGE (t:{} {{{}: row.target}}) \
                     MERGE (s)-[r:{}]->(t) \
                     SET r += row.props",
                    quote(source_label),
                    quote(source_id),
                    quote(target_label),
                    quote(target_id),
                    quote(rel_type)
                ),
                rows,
            },
        )
        .collect()
}

#[async_trait]
impl GraphSink for GraphClient {
    async fn ensure_constraint(&self, label: &str, properties: &[String]) -> Result<()> {
        let statement = constraint_statement(label, properties);
        debug!(label = %label, ?properties, "Ensuring constraint");
        self.execute(Query::new(statement)).await
    }

    async fn merge_nodes(&self, nodes: &[NodeRecord]) -> Result<usize> {
        if nodes.is_empty() {
            return Ok(0);
        }
        let queries = node_statements(nodes)
            .into_iter()
            .map(Statement::into_query)
            .collect();
        self.execute_in_transaction(queries).await?;
        Ok(nodes.len())
    }

    async fn merge_relationships(&self, edges: &[EdgeRecord]) -> Result<usize> {
        if edges.is_empty() {
            return Ok(0);
        }
        let queries = edge_statements(edges)
            .into_iter()
            .map(Statement::into_query)
            .collect();
        self.execute_in_transaction(queries).await?;
        Ok(edges.len())
    }

    async fn clear(&self) -> Result<()> {
        info!("Deleting every node and relationship");
        self.execute(Query::new("MATCH (n) DETACH DELETE n".to_string()))
            .await
    }

    async fn counts(&self) -> Result<GraphCounts> {
        self.get_counts().await
    }
}
