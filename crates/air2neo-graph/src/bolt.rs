//! JSON cell values to Bolt parameters.

use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType};
use serde_json::Value;

/// Convert a JSON value into a Bolt value.
///
/// Integers that do not fit an `i64` fall back to floats. Nested objects
/// become maps, which Neo4j only accepts as query parameters, never as
/// stored properties; the node mapper flattens those beforehand.
pub fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (k, v) in map {
                bolt.put(k.as_str().into(), to_bolt(v));
            }
            BoltType::Map(bolt)
        }
    }
}

/// Build a Bolt map from string keys.
pub fn bolt_map<'a>(entries: impl IntoIterator<Item = (&'a str, BoltType)>) -> BoltType {
    let mut map = BoltMap::new();
    for (k, v) in entries {
        map.put(k.into(), v);
    }
    BoltType::Map(map)
}
