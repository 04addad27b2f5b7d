//! Dotted path lookup in a data context.

use serde_json::Value;

use crate::Context;

/// Keys refused when prototype-pollution prevention is enabled.
const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Whether `key` is one of the prototype-pollution keys.
#[must_use]
pub fn is_forbidden_key(key: &str) -> bool {
    FORBIDDEN_KEYS.contains(&key)
}

/// Resolve a dotted path like `user.address.city` or `@index`.
///
/// Objects are descended by key and arrays by numeric index. Returns `None`
/// at the first missing segment.
///
/// # Example
///
/// ```
/// use htmlium_core::path::resolve_path;
/// use serde_json::json;
///
/// let context = json!({"user": {"name": "Ada", "tags": ["a", "b"]}});
/// let context = context.as_object().unwrap();
/// assert_eq!(resolve_path(context, "user.name"), Some(&json!("Ada")));
/// assert_eq!(resolve_path(context, "user.tags.1"), Some(&json!("b")));
/// assert_eq!(resolve_path(context, "user.email"), None);
/// ```
#[must_use]
pub fn resolve_path<'a>(context: &'a Context, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        Some((head, rest)) => resolve_value(context.get(head)?, rest),
        None => context.get(path),
    }
}

/// Resolve a dotted path below `value`.
#[must_use]
pub fn resolve_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
