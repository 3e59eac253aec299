//! Environment materialization from change record fields.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

static ENV_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Resolve a rule's env mapping against a record's field object.
///
/// Paths are dot-separated and descend nested objects ("customer.city").
/// Unresolvable paths produce an empty value rather than failing the
/// dispatch; keys that are not legal env var names are dropped with a
/// warning.
pub fn resolve_env(mapping: &BTreeMap<String, String>, fields: &Value) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for (key, path) in mapping {
        if !ENV_KEY_REGEX.is_match(key) {
            warn!(key = %key, "dropping invalid env var name in mapping");
            continue;
        }
        env.insert(key.clone(), lookup(fields, path));
    }
    env
}

fn lookup(fields: &Value, path: &str) -> String {
    let mut current = fields;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    render(current)
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Nested structures pass through as JSON text.
        other => other.to_string(),
    }
}
