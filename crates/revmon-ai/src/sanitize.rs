//! Scrubbing of alert data before it reaches a prompt, and of model text
//! before it is stored.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

pub const MAX_STRING_CHARS: usize = 280;
pub const MAX_ARRAY_ITEMS: usize = 20;
pub const MAX_DEPTH: usize = 6;

pub const REDACTED_LINK: &str = "[redacted-link]";
pub const REDACTED_EMAIL: &str = "[redacted-email]";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("valid regex"));
static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://").expect("valid regex"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("valid regex")
});

const IDENTITY_FRAGMENTS: [&str; 10] = [
    "email", "phone", "name", "person", "customer", "token", "session", "distinct", "address",
    "street",
];
const IP_SEGMENTS: [&str; 4] = ["ip", "ips", "ipv4", "ipv6"];

/// True for keys that may carry personal data.
///
/// `ip` only matches as a whole `_`-separated segment, so `client_ip` is
/// dropped while `spike_multiplier` is kept.
///
/// # Examples
///
/// ```
/// use revmon_ai::sanitize::is_identity_key;
///
/// assert!(is_identity_key("customer_email"));
/// assert!(is_identity_key("client_ip"));
/// assert!(!is_identity_key("spike_multiplier"));
/// assert!(!is_identity_key("tenant_id"));
/// ```
pub fn is_identity_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    IDENTITY_FRAGMENTS.iter().any(|f| lower.contains(f))
        || lower.split('_').any(|segment| IP_SEGMENTS.contains(&segment))
}

/// Collapses whitespace to single spaces and trims.
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE.replace_all(value, " ").trim().to_string()
}

/// True when `value` contains a URL or an email address.
pub fn has_link_or_email(value: &str) -> bool {
    URL_SCHEME.is_match(value) || EMAIL.is_match(value)
}

pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Collapses whitespace and redacts URLs and emails.
pub fn redact(value: &str) -> String {
    let compact = collapse_whitespace(value);
    if compact.is_empty() {
        return compact;
    }
    let no_links = URL.replace_all(&compact, REDACTED_LINK);
    EMAIL.replace_all(&no_links, REDACTED_EMAIL).into_owned()
}

/// [`redact`], truncated to [`MAX_STRING_CHARS`].
pub fn sanitize_string(value: &str) -> String {
    truncate_chars(&redact(value), MAX_STRING_CHARS)
}

/// Recursively sanitizes a JSON value: identity keys are dropped, strings
/// are scrubbed, arrays are capped and anything nested deeper than
/// [`MAX_DEPTH`] becomes `null`.
pub fn sanitize_value(value: &Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::Null;
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(s) => Value::String(sanitize_string(s)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(|item| sanitize_at(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().filter(|k| !is_identity_key(k)).collect();
            keys.sort();
            let out: Map<String, Value> = keys
                .into_iter()
                .map(|key| (key.clone(), sanitize_at(&map[key.as_str()], depth + 1)))
                .collect();
            Value::Object(out)
        }
    }
}
