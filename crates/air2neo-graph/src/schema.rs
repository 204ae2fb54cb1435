//! Cypher identifiers and per-label constraints.

/// Backtick-quote a label, relationship type or property key.
pub fn quote(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Uniqueness constraint over `properties` of `label`.
///
/// Idempotent thanks to `IF NOT EXISTS`. Several properties make a composite
/// constraint.
pub fn constraint_statement(label: &str, properties: &[String]) -> String {
    let props: Vec<String> = properties
        .iter()
        .map(|p| format!("n.{}", quote(p)))
        .collect();
    let target = match props.as_slice() {
        [single] => single.clone(),
        many => format!("({})", many.join(", ")),
    };
    format!(
        "CREATE CONSTRAINT IF NOT EXISTS FOR (n:{}) REQUIRE {} IS UNIQUE",
        quote(label),
        target
    )
}
