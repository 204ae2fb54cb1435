//! In-process property graph with the same merge semantics as the Neo4j sink.
//!
//! Backs `--dry-run` and the engine tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::{GraphCounts, GraphSink};
use crate::mapping::{EdgeRecord, NodeIdentity, NodeRecord};

type Properties = BTreeMap<String, Value>;
type RelKey = (NodeIdentity, NodeIdentity, String);

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<NodeIdentity, Properties>,
    relationships: BTreeMap<RelKey, Properties>,
    constraints: BTreeSet<(String, Vec<String>)>,
    mutations: u64,
    failing_labels: HashSet<String>,
}

impl State {
    /// Create the node if needed; returns whether anything changed.
    fn touch_node(&mut self, identity: &NodeIdentity) -> bool {
        if self.nodes.contains_key(identity) {
            return false;
        }
        let mut props = Properties::new();
        props.insert(identity.id_property.clone(), Value::String(identity.id.clone()));
        self.nodes.insert(identity.clone(), props);
        true
    }

    fn check_label(&self, label: &str) -> Result<()> {
        if self.failing_labels.contains(label) {
            anyhow::bail!("simulated write failure for label '{}'", label);
        }
        Ok(())
    }
}

/// Merge `updates` into `target`; returns whether anything changed.
fn apply_properties(target: &mut Properties, updates: &Properties) -> bool {
    let mut changed = false;
    for (key, value) in updates {
        if value.is_null() {
            changed |= target.remove(key).is_some();
        } else if target.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Property graph held in memory.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<State>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("memory graph lock poisoned"))
    }

    /// Reject every node or relationship batch touching `label` from now on.
    pub fn fail_label(&self, label: &str) {
        if let Ok(mut state) = self.lock() {
            state.failing_labels.insert(label.to_string());
        }
    }

    /// Accept batches touching `label` again.
    pub fn heal_label(&self, label: &str) {
        if let Ok(mut state) = self.lock() {
            state.failing_labels.remove(label);
        }
    }

    /// Properties of a node, if it exists.
    pub fn node(&self, identity: &NodeIdentity) -> Option<Properties> {
        self.lock().ok()?.nodes.get(identity).cloned()
    }

    /// All nodes carrying `label`.
    pub fn nodes_with_label(&self, label: &str) -> Vec<(NodeIdentity, Properties)> {
        self.lock()
            .map(|state| {
                state
                    .nodes
                    .iter()
                    .filter(|(id, _)| id.label == label)
                    .map(|(id, props)| (id.clone(), props.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All relationships as `(source, target, type)` keys.
    pub fn relationships(&self) -> Vec<RelKey> {
        self.lock()
            .map(|state| state.relationships.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Properties of one relationship.
    pub fn relationship(
        &self,
        source: &NodeIdentity,
        target: &NodeIdentity,
        rel_type: &str,
    ) -> Option<Properties> {
        let key = (source.clone(), target.clone(), rel_type.to_string());
        self.lock().ok()?.relationships.get(&key).cloned()
    }

    pub fn constraints(&self) -> Vec<(String, Vec<String>)> {
        self.lock()
            .map(|state| state.constraints.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Writes that actually changed the graph so far.
    pub fn mutation_count(&self) -> u64 {
        self.lock().map(|state| state.mutations).unwrap_or(0)
    }
}

#[async_trait]
impl GraphSink for MemoryGraph {
    async fn ensure_constraint(&self, label: &str, properties: &[String]) -> Result<()> {
        let mut state = self.lock()?;
        state
            .constraints
            .insert((label.to_string(), properties.to_vec()));
        Ok(())
    }

    async fn merge_nodes(&self, nodes: &[NodeRecord]) -> Result<usize> {
        let mut state = self.lock()?;
        for node in nodes {
            state.check_label(&node.identity.label)?;
        }

        for node in nodes {
            let mut changed = state.touch_node(&node.identity);
            if let Some(props) = state.nodes.get_mut(&node.identity) {
                changed |= apply_properties(props, &node.properties);
            }
            if changed {
                state.mutations += 1;
            }
        }
        Ok(nodes.len())
    }

    async fn merge_relationships(&self, edges: &[EdgeRecord]) -> Result<usize> {
        let mut state = self.lock()?;
        for edge in edges {
            state.check_label(&edge.source.label)?;
            state.check_label(&edge.target.label)?;
        }

        for edge in edges {
            let mut changed = state.touch_node(&edge.source);
            changed |= state.touch_node(&edge.target);

            let key = (edge.source.clone(), edge.target.clone(), edge.rel_type.clone());
            changed |= !state.relationships.contains_key(&key);
            let props = state.relationships.entry(key).or_default();
            changed |= apply_properties(props, &edge.properties);

            if changed {
                state.mutations += 1;
            }
        }
        Ok(edges.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        if !state.nodes.is_empty() || !state.relationships.is_empty() {
            state.mutations += 1;
        }
        state.nodes.clear();
        state.relationships.clear();
        Ok(())
    }

    async fn counts(&self) -> Result<GraphCounts> {
        let state = self.lock()?;
        Ok(GraphCounts {
            nodes: state.nodes.len() as u64,
            relationships: state.relationships.len() as u64,
        })
    }
}
