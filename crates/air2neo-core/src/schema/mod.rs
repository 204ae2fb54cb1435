//! Schema resolution from the metatable.
//!
//! The metatable is an ordinary source table with one row per synchronized
//! table. Resolution is all-or-nothing: a single malformed row fails the
//! whole run so no table is synced under wrong assumptions.

pub mod model;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::extract::fetch_with_retry;
use crate::source::{SourceClient, SourceRow};
use model::{EdgeField, TableDescriptor};

/// Separator between a link column and its target table in the edges list.
const EDGE_TARGET_SEPARATOR: &str = "->";

/// Reads and validates the metatable.
pub struct SchemaResolver<'a, S: SourceClient + ?Sized> {
    source: &'a S,
    config: &'a SyncConfig,
}

impl<'a, S: SourceClient + ?Sized> SchemaResolver<'a, S> {
    pub fn new(source: &'a S, config: &'a SyncConfig) -> Self {
        Self { source, config }
    }

    /// Resolve every table descriptor, in metatable row order.
    pub async fn resolve(&self) -> SyncResult<Vec<TableDescriptor>> {
        let rows = fetch_with_retry(
            self.source,
            &self.config.metatable,
            None,
            None,
            &self.config.retry,
        )
        .await?;

        let descriptors = parse_metatable(&rows, self.config)?;
        info!(
            metatable = %self.config.metatable,
            tables = descriptors.len(),
            "Resolved metatable"
        );
        Ok(descriptors)
    }
}

/// Link column awaiting its target table's label.
struct PendingEdge {
    column: String,
    target_table: String,
    relationship_type: String,
}

/// Validate metatable rows into descriptors.
pub fn parse_metatable(rows: &[SourceRow], config: &SyncConfig) -> SyncResult<Vec<TableDescriptor>> {
    let mut parsed = Vec::with_capacity(rows.len());
    let mut names = HashSet::new();

    for row in rows {
        let (descriptor, edges) = parse_row(row, config)?;
        if !names.insert(descriptor.name.clone()) {
            return Err(SyncError::schema(&descriptor.name, "duplicate table name"));
        }
        parsed.push((descriptor, edges));
    }

    let targets: HashMap<String, (String, String)> = parsed
        .iter()
        .map(|(d, _)| (d.name.clone(), (d.node_label.clone(), d.id_property.clone())))
        .collect();

    parsed
        .into_iter()
        .map(|(mut descriptor, edges)| {
            for edge in edges {
                let (label, id_property) = targets.get(&edge.target_table).ok_or_else(|| {
                    SyncError::schema(
                        &descriptor.name,
                        format!(
                            "edge column '{}' targets unknown table '{}'",
                            edge.column, edge.target_table
                        ),
                    )
                })?;
                descriptor.edge_fields.push(EdgeField {
                    column: edge.column,
                    target_table: edge.target_table,
                    relationship_type: edge.relationship_type,
                    target_label: label.clone(),
                    target_id_property: id_property.clone(),
                });
            }
            Ok(descriptor)
        })
        .collect()
}

fn parse_row(row: &SourceRow, config: &SyncConfig) -> SyncResult<(TableDescriptor, Vec<PendingEdge>)> {
    let cols = &config.metatable_fields;
    let fail = |who: &str, reason: String| SyncError::schema(who, reason);

    let name = text_field(row, &cols.name)
        .map_err(|e| fail(&row.id, e))?
        .ok_or_else(|| fail(&row.id, format!("missing '{}'", cols.name)))?;
    let who = name.as_str();

    let source = text_field(row, &cols.source)
        .map_err(|e| fail(who, e))?
        .unwrap_or_else(|| name.clone());
    let node_label = text_field(row, &cols.label)
        .map_err(|e| fail(who, e))?
        .unwrap_or_else(|| name.clone());
    check_identifier("label", &node_label).map_err(|e| fail(who, e))?;

    let id_property = text_field(row, &cols.id_property)
        .map_err(|e| fail(who, e))?
        .unwrap_or_else(|| config.id_property.clone());
    if id_property.trim().is_empty() {
        return Err(fail(who, "id property is blank".to_string()));
    }

    let constraint_fields = list_field(row, &cols.constraint_fields).map_err(|e| fail(who, e))?;
    let node_property_fields = list_field(row, &cols.node_properties).map_err(|e| fail(who, e))?;
    let edge_entries = list_field(row, &cols.edges).map_err(|e| fail(who, e))?;

    if node_property_fields.is_empty() && edge_entries.is_empty() {
        return Err(fail(who, "neither node properties nor edges are listed".to_string()));
    }
    if node_property_fields.contains(&id_property) {
        return Err(fail(
            who,
            format!("id property '{}' is also listed as a node property", id_property),
        ));
    }

    for field in &constraint_fields {
        if field != &id_property && !node_property_fields.contains(field) {
            return Err(fail(
                who,
                format!("constraint field '{}' is not a node property", field),
            ));
        }
    }

    let mut edges = Vec::with_capacity(edge_entries.len());
    for entry in &edge_entries {
        let (column, target_table) = entry
            .split_once(EDGE_TARGET_SEPARATOR)
            .map(|(c, t)| (c.trim(), t.trim()))
            .filter(|(c, t)| !c.is_empty() && !t.is_empty())
            .ok_or_else(|| {
                fail(
                    who,
                    format!("edge entry '{}' must look like 'COLUMN -> Table'", entry),
                )
            })?;

        if node_property_fields.iter().any(|f| f == column) {
            return Err(fail(
                who,
                format!("column '{}' is both a node property and an edge", column),
            ));
        }
        if edges.iter().any(|e: &PendingEdge| e.column == column) {
            return Err(fail(who, format!("edge column '{}' listed twice", column)));
        }

        let relationship_type = config
            .relationship_naming
            .relationship_type(column)
            .ok_or_else(|| fail(who, format!("edge column '{}' yields an empty relationship type", column)))?;
        check_identifier("relationship type", &relationship_type).map_err(|e| fail(who, e))?;

        edges.push(PendingEdge {
            column: column.to_string(),
            target_table: target_table.to_string(),
            relationship_type,
        });
    }

    let seed_properties = timestamp_field(row, &cols.last_ingested_properties).map_err(|e| fail(who, e))?;
    let seed_edges = timestamp_field(row, &cols.last_ingested_edges).map_err(|e| fail(who, e))?;

    let descriptor = TableDescriptor {
        name: name.clone(),
        source,
        node_label,
        id_property,
        constraint_fields,
        node_property_fields,
        edge_fields: Vec::new(),
        seed_properties,
        seed_edges,
    };
    Ok((descriptor, edges))
}

/// Trimmed text cell; `None` when missing, null or blank.
fn text_field(row: &SourceRow, column: &str) -> Result<Option<String>, String> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok(if s.is_empty() { None } else { Some(s.to_string()) })
        }
        Some(_) => Err(format!("'{}' must be text", column)),
    }
}

/// List cell: a JSON array of strings or text split on commas and newlines.
fn list_field(row: &SourceRow, column: &str) -> Result<Vec<String>, String> {
    let items: Vec<String> = match row.get(column) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s
            .split([',', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| format!("'{}' must only contain text", column))
            })
            .filter(|r| r.as_ref().map_or(true, |s| !s.is_empty()))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(format!("'{}' must be a list", column)),
    };

    let mut seen = HashSet::new();
    if let Some(dup) = items.iter().find(|item| !seen.insert(item.as_str())) {
        return Err(format!("'{}' lists '{}' twice", column, dup));
    }
    Ok(items)
}

fn timestamp_field(row: &SourceRow, column: &str) -> Result<Option<DateTime<Utc>>, String> {
    text_field(row, column)?
        .map(|text| {
            DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("'{}' is not an RFC 3339 timestamp: {}", column, e))
        })
        .transpose()
}

fn check_identifier(what: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is empty", what));
    }
    if value.contains('`') {
        return Err(format!("{} '{}' contains a backtick", what, value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use chrono::TimeZone;
    use serde_json::json;

    fn meta_row(id: &str, fields: Value) -> SourceRow {
        let mut row = SourceRow::new(id, Utc.timestamp_opt(0, 0).unwrap());
        if let Value::Object(map) = fields {
            row.fields = map.into_iter().collect();
        }
        row
    }

    fn scenario_rows() -> Vec<SourceRow> {
        vec![
            meta_row(
                "recMeta1",
                json!({
                    "Name": "Companies",
                    "Label": "Company",
                    "Node Properties": ["Name"],
                    "Edges": "IN_INDUSTRY__BANK -> Industries",
                }),
            ),
            meta_row(
                "recMeta2",
                json!({
                    "Name": "Industries",
                    "Label": "Industry",
                    "Node Properties": "Name, Sector",
                    "Last Ingested Properties": "2024-01-02T03:04:05Z",
                }),
            ),
        ]
    }

    #[test]
    fn test_scenario_metatable() {
        let config = SyncConfig::default();
        let tables = parse_metatable(&scenario_rows(), &config).unwrap();

        assert_eq!(tables.len(), 2);
        let companies = &tables[0];
        assert_eq!(companies.name, "Companies");
        assert_eq!(companies.source, "Companies");
        assert_eq!(companies.node_label, "Company");
        assert_eq!(companies.id_property, "_aid");
        assert_eq!(companies.node_property_fields, vec!["Name"]);
        assert_eq!(companies.edge_fields.len(), 1);

        let edge = &companies.edge_fields[0];
        assert_eq!(edge.column, "IN_INDUSTRY__BANK");
        assert_eq!(edge.relationship_type, "IN_INDUSTRY");
        assert_eq!(edge.target_table, "Industries");
        assert_eq!(edge.target_label, "Industry");

        let industries = &tables[1];
        assert_eq!(industries.node_property_fields, vec!["Name", "Sector"]);
        assert_eq!(
            industries.seed_properties,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(industries.seed_edges, None);
    }

    #[test]
    fn test_label_defaults_to_name() {
        let rows = vec![meta_row("r1", json!({"Name": "Person", "Node Properties": ["Name"]}))];
        let tables = parse_metatable(&rows, &SyncConfig::default()).unwrap();
        assert_eq!(tables[0].node_label, "Person");
    }

    fn schema_error(rows: Vec<SourceRow>) -> String {
        match parse_metatable(&rows, &SyncConfig::default()) {
            Err(SyncError::Schema { reason, .. }) => reason,
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_fields_rejected() {
        let reason = schema_error(vec![meta_row(
            "r1",
            json!({"Name": "A", "Node Properties": ["OWNS"], "Edges": ["OWNS -> A"]}),
        )]);
        assert!(reason.contains("both a node property and an edge"));
    }

    #[test]
    fn test_unknown_edge_target_rejected() {
        let reason = schema_error(vec![meta_row(
            "r1",
            json!({"Name": "A", "Edges": ["OWNS -> Nowhere"]}),
        )]);
        assert!(reason.contains("unknown table 'Nowhere'"));
    }

    #[test]
    fn test_malformed_rows_rejected() {
        assert!(schema_error(vec![meta_row("r1", json!({"Node Properties": ["x"]}))]).contains("missing"));
        assert!(schema_error(vec![meta_row("r1", json!({"Name": "A"}))]).contains("neither"));
        assert!(
            schema_error(vec![meta_row("r1", json!({"Name": "A", "Edges": ["OWNS"]}))])
                .contains("COLUMN -> Table")
        );
        assert!(
            schema_error(vec![meta_row("r1", json!({"Name": "A", "Node Properties": ["x", "x"]}))])
                .contains("twice")
        );
        assert!(
            schema_error(vec![meta_row("r1", json!({"Name": "A", "Node Properties": ["_aid"]}))])
                .contains("id property")
        );
        assert!(
            schema_error(vec![meta_row("r1", json!({"Name": "A", "Label": "Bad`Label", "Node Properties": ["x"]}))])
                .contains("backtick")
        );
        assert!(
            schema_error(vec![meta_row(
                "r1",
                json!({"Name": "A", "Node Properties": ["x"], "Last Ingested Edges": "yesterday"})
            )])
            .contains("RFC 3339")
        );
        assert!(
            schema_error(vec![meta_row("r1", json!({"Name": "A", "Edges": ["__X -> A"]}))])
                .contains("empty relationship type")
        );
    }

    #[test]
    fn test_constraint_fields_must_be_written() {
        let reason = schema_error(vec![meta_row(
            "r1",
            json!({"Name": "A", "Node Properties": ["Name"], "Constraint Fields": ["Code"]}),
        )]);
        assert!(reason.contains("constraint field 'Code' is not a node property"));

        let rows = vec![meta_row(
            "r1",
            json!({"Name": "A", "Node Properties": ["Name", "Code"], "Constraint Fields": ["Code"]}),
        )];
        let tables = parse_metatable(&rows, &SyncConfig::default()).unwrap();
        assert_eq!(tables[0].constraint_fields, vec!["Code"]);
    }

    #[test]
    fn test_duplicate_names_fail_without_partial_result() {
        let rows = vec![
            meta_row("r1", json!({"Name": "A", "Node Properties": ["x"]})),
            meta_row("r2", json!({"Name": "A", "Node Properties": ["y"]})),
        ];
        let reason = schema_error(rows);
        assert!(reason.contains("duplicate"));
    }

    #[tokio::test]
    async fn test_resolve_reads_configured_metatable() {
        let source = MemorySource::new();
        for row in scenario_rows() {
            source.upsert("Schema", row);
        }
        let config = SyncConfig {
            metatable: "Schema".to_string(),
            ..SyncConfig::default()
        };

        let tables = SchemaResolver::new(&source, &config).resolve().await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Companies", "Industries"]);
    }
}
