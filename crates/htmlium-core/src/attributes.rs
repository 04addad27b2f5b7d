//! Tag attribute parsing.
//!
//! Only `name="value"` pairs are recognized. Unquoted and single-quoted
//! values are skipped, and a value cannot contain an escaped `"`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Regex pattern for `name="value"` pairs.
static ATTRIBUTE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("invalid attribute regex"));

/// Extract every `name="value"` pair from a tag's attribute string.
///
/// When a name repeats, the last value wins.
///
/// # Example
///
/// ```
/// use htmlium_core::attributes::parse_attributes;
///
/// let attrs = parse_attributes(r#"loadcomponent="card" title="Hello World""#);
/// assert_eq!(attrs["loadcomponent"], "card");
/// assert_eq!(attrs["title"], "Hello World");
/// ```
#[must_use]
pub fn parse_attributes(attrs: &str) -> HashMap<String, String> {
    ATTRIBUTE_PATTERN
        .captures_iter(attrs)
        .map(|caps| (caps[1].to_owned(), caps[2].to_owned()))
        .collect()
}

/// Decode the character references an attribute value may use for quotes.
///
/// `&amp;` is decoded last so `&amp;quot;` yields `&quot;`, not `"`.
#[must_use]
pub fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_owned();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Read attribute text as JSON when it looks like an array or object.
///
/// Quote entities are decoded first, so `[&quot;a&quot;]` reads as `["a"]`.
/// Returns `None` for anything else, including malformed JSON.
#[must_use]
pub fn parse_structured(text: &str) -> Option<Value> {
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
        return None;
    }
    serde_json::from_str(&decode_entities(trimmed)).ok()
}
