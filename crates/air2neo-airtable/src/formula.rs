//! `filterByFormula` construction for modification windows.
//!
//! Airtable compares datetimes at second granularity, so both bounds are
//! widened by one second. The extractor filters the result exactly.
//!
//! The window is evaluated on the same value a record converts to: the
//! last-modified field, or the creation time when that field is blank.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Formula selecting rows whose `field` lies in `[since, before)`, widened.
///
/// Returns `None` when there is no bound at all.
pub fn window_formula(
    field: &str,
    since: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) -> Option<String> {
    let field = modified_expression(field);
    let mut clauses = Vec::new();

    if let Some(since) = since {
        clauses.push(format!(
            "IS_AFTER({}, DATETIME_PARSE('{}'))",
            field,
            timestamp(since - Duration::seconds(1))
        ));
    }
    if let Some(before) = before {
        clauses.push(format!(
            "IS_BEFORE({}, DATETIME_PARSE('{}'))",
            field,
            timestamp(before + Duration::seconds(1))
        ));
    }

    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(format!("AND({})", clauses.join(", "))),
    }
}

/// Modification time of a record as a formula expression.
///
/// Mirrors [`crate::AirtableRecord::into_source_row`]: a blank field falls
/// back to `CREATED_TIME()`. A bare `IS_AFTER({Field}, ..)` is false for a
/// blank cell, which would hide those records from every run.
pub fn modified_expression(field: &str) -> String {
    let field = field_ref(field);
    format!("IF({}, {}, CREATED_TIME())", field, field)
}

/// `{Field Name}` reference. Closing braces cannot appear inside one.
fn field_ref(field: &str) -> String {
    format!("{{{}}}", field.replace('}', ""))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
