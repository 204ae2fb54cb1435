//! Row → relationship upserts.

use std::collections::HashMap;

use super::model::{EdgeRecord, NodeIdentity};
use crate::error::RowMappingError;
use crate::schema::model::TableDescriptor;
use crate::source::{LinkResolver, SourceRow};

/// Edges of one row plus the columns that could not be mapped.
#[derive(Debug, Default)]
pub struct EdgeMapping {
    pub edges: Vec<EdgeRecord>,
    pub errors: Vec<RowMappingError>,
}

/// Map the link columns of a changed row to relationship upserts.
///
/// Targets are identified through each edge field's target table and are
/// emitted whether or not that table has been synced yet. Links collapsing
/// onto the same (source, target, type) key are emitted once; later link
/// properties win.
pub fn map_edges<R: LinkResolver + ?Sized>(
    descriptor: &TableDescriptor,
    row: &SourceRow,
    resolver: &R,
) -> EdgeMapping {
    let mut mapping = EdgeMapping::default();
    let mut seen: HashMap<(NodeIdentity, String), usize> = HashMap::new();
    let source = descriptor.identity_of(&row.id);

    for field in &descriptor.edge_fields {
        let Some(value) = row.get(&field.column) else {
            continue;
        };

        let targets = match resolver.resolve_link(value) {
            Ok(targets) => targets,
            Err(e) => {
                mapping.errors.push(RowMappingError {
                    table: descriptor.name.clone(),
                    row_id: row.id.clone(),
                    column: field.column.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for target in targets {
            let target_identity =
                NodeIdentity::new(&field.target_label, &field.target_id_property, target.id);
            let key = (target_identity.clone(), field.relationship_type.clone());

            match seen.get(&key) {
                Some(&idx) => mapping.edges[idx].properties.extend(target.properties),
                None => {
                    seen.insert(key, mapping.edges.len());
                    mapping.edges.push(EdgeRecord {
                        source: source.clone(),
                        target: target_identity,
                        rel_type: field.relationship_type.clone(),
                        properties: target.properties,
                    });
                }
            }
        }
    }

    mapping
}
