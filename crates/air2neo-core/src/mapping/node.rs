//! Row → node upsert.

use serde_json::Value;

use super::model::NodeRecord;
use crate::schema::model::TableDescriptor;
use crate::source::SourceRow;

/// Map a changed row to its node upsert.
///
/// Every listed property is present in the result; a field missing from the
/// row maps to `Null`.
pub fn map_node(descriptor: &TableDescriptor, row: &SourceRow) -> NodeRecord {
    let properties = descriptor
        .node_property_fields
        .iter()
        .map(|field| {
            let value = row.get(field).map(property_value).unwrap_or(Value::Null);
            (field.clone(), value)
        })
        .collect();

    NodeRecord {
        identity: descriptor.identity_of(&row.id),
        properties,
    }
}

/// Bring a cell value into a shape a graph property can hold.
///
/// Scalars and lists of same-kind scalars are kept. Anything else (objects
/// such as attachments, nested or mixed lists) is stored as JSON text.
pub fn property_value(value: &Value) -> Value {
    match value {
        Value::Array(items) if is_homogeneous_scalar_list(items) => value.clone(),
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        _ => value.clone(),
    }
}

fn is_homogeneous_scalar_list(items: &[Value]) -> bool {
    let Some(first) = items.first() else {
        return true;
    };
    items.iter().all(|item| match (first, item) {
        (Value::Bool(_), Value::Bool(_)) => true,
        (Value::String(_), Value::String(_)) => true,
        (Value::Number(a), Value::Number(b)) => a.is_f64() == b.is_f64(),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::model::NodeIdentity;
    use crate::schema::model::tests::descriptor;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn row() -> SourceRow {
        SourceRow::new("rec1", Utc.timestamp_opt(0, 0).unwrap())
            .with_field("Name", json!("Acme"))
            .with_field("Unlisted", json!("ignored"))
    }

    #[test]
    fn test_identity_and_listed_properties() {
        let desc = descriptor("Companies", "Company", &["Name"], &[]);
        let node = map_node(&desc, &row());

        assert_eq!(node.identity, NodeIdentity::new("Company", "_aid", "rec1"));
        assert_eq!(node.properties.len(), 1);
        assert_eq!(node.properties.get("Name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_missing_field_is_explicit_null() {
        let desc = descriptor("Companies", "Company", &["Name", "Website"], &[]);
        let node = map_node(&desc, &row());
        assert_eq!(node.properties.get("Website"), Some(&Value::Null));
    }

    #[test]
    fn test_property_value_shapes() {
        assert_eq!(property_value(&json!(3)), json!(3));
        assert_eq!(property_value(&json!(["a", "b"])), json!(["a", "b"]));
        assert_eq!(property_value(&json!([1, 2])), json!([1, 2]));
        assert_eq!(property_value(&json!([])), json!([]));
        assert_eq!(property_value(&json!([1, "a"])), json!("[1,\"a\"]"));
        assert_eq!(
            property_value(&json!([{"url": "x"}])),
            json!("[{\"url\":\"x\"}]")
        );
        assert_eq!(property_value(&json!({"a": 1})), json!("{\"a\":1}"));
    }
}
