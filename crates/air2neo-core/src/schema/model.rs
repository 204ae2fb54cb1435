//! Table descriptor models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mapping::NodeIdentity;
use crate::watermark::{SyncKind, Watermark};

/// How one source table maps onto the graph. One per metatable row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    /// Unique name of the descriptor; also the watermark key.
    pub name: String,
    /// Handle of the source table rows are fetched from.
    pub source: String,
    pub node_label: String,
    /// Node property holding the source row id. Merge key.
    pub id_property: String,
    /// Properties that, with the id property, uniquely identify a node.
    pub constraint_fields: Vec<String>,
    pub node_property_fields: Vec<String>,
    pub edge_fields: Vec<EdgeField>,
    /// Last-ingested timestamps recorded in the metatable, if any.
    pub seed_properties: Option<DateTime<Utc>>,
    pub seed_edges: Option<DateTime<Utc>>,
}

impl TableDescriptor {
    /// Identity of this table's node for a source row id.
    pub fn identity_of(&self, row_id: &str) -> NodeIdentity {
        NodeIdentity::new(&self.node_label, &self.id_property, row_id)
    }

    /// Uniqueness constraints of the label, each a property list.
    ///
    /// The id property always gets a constraint of its own. Neo4j skips
    /// nodes missing any property of a composite constraint, and bare
    /// endpoints only carry the id, so the composite one cannot stand in.
    pub fn constraints(&self) -> Vec<Vec<String>> {
        let mut constraints = vec![vec![self.id_property.clone()]];

        let mut composite = vec![self.id_property.clone()];
        for field in &self.constraint_fields {
            if !composite.contains(field) {
                composite.push(field.clone());
            }
        }
        if composite.len() > 1 {
            constraints.push(composite);
        }
        constraints
    }

    /// Watermark to start from when the store has none for `kind`.
    pub fn seed(&self, kind: SyncKind) -> Option<Watermark> {
        let at = match kind {
            SyncKind::Properties => self.seed_properties,
            SyncKind::Edges => self.seed_edges,
        };
        at.map(Watermark::at)
    }
}

/// A link column and the table it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeField {
    pub column: String,
    pub target_table: String,
    /// Normalized relationship type.
    pub relationship_type: String,
    pub target_label: String,
    pub target_id_property: String,
}
