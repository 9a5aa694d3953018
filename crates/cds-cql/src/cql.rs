//! CQL text helpers shared by the generator and the packager.

use serde_json::Value;

/// Escapes backslashes, then single quotes, so author text can sit inside a
/// CQL string literal.
pub fn escape_single_quotes(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Turns a display name into a CQL library identifier and file stem.
///
/// Whitespace runs become `-`; characters outside `[A-Za-z0-9-_.~]` are
/// dropped. An empty result becomes `untitled`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_dash = true;
            continue;
        }
        if !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')) {
            continue;
        }
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(c);
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Wraps an identifier in double quotes, escaping embedded quotes.
pub fn quoted_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Renders a JSON value as a CQL literal for `parameter ... default` clauses.
///
/// Returns `None` for values that have no literal form (objects, null).
pub fn literal(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(format!("'{}'", escape_single_quotes(s))),
        Value::Array(items) => {
            let items: Option<Vec<String>> = items.iter().map(literal).collect();
            items.map(|items| format!("{{{}}}", items.join(", ")))
        }
        Value::Null | Value::Object(_) => None,
    }
}
