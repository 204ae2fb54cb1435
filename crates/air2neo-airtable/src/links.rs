//! Airtable link cells.

use air2neo_core::source::{LinkError, LinkTarget, parse_link_value};
use serde_json::Value;

/// Length of an Airtable record id, e.g. `recAbCdEfGhIjKlMn`.
const RECORD_ID_LEN: usize = 17;

/// Whether `id` looks like an Airtable record id.
pub fn is_record_id(id: &str) -> bool {
    id.len() == RECORD_ID_LEN
        && id.starts_with("rec")
        && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Parse a linked-record cell, rejecting anything that is not a record id.
pub fn resolve_record_links(value: &Value) -> Result<Vec<LinkTarget>, LinkError> {
    parse_link_value(value, is_record_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_record_id() {
        assert!(is_record_id("recAbCdEfGhIjKlMn"));
        assert!(!is_record_id("recAbC"));
        assert!(!is_record_id("tblAbCdEfGhIjKlMn"));
        assert!(!is_record_id("recAbCdEfGh-jKlMn"));
    }

    #[test]
    fn test_resolve_record_links() {
        let targets = resolve_record_links(&json!(["recAbCdEfGhIjKlMn"])).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, "recAbCdEfGhIjKlMn");

        assert!(resolve_record_links(&json!(["Acme Corp"])).is_err());
        assert!(resolve_record_links(&Value::Null).unwrap().is_empty());
    }
}
