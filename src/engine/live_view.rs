//! Live view detection in capability outputs.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use url::Url;

const LIVE_VIEW_KEYS: [&str; 2] = ["liveViewUrl", "live_view_url"];

static LIVE_VIEW_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)live[ _-]?view(?:\s+url)?:\s*(https?://\S+)").expect("Invalid live view regex")
});

/// Find a live view URL in a capability output.
///
/// Object keys are searched depth-first; a plain string output is scanned
/// for a `live view: <url>` line. Only absolute http(s) URLs count.
pub fn detect_live_view(output: &Value) -> Option<String> {
    match output {
        Value::String(text) => find_in_text(text),
        other => find_in_keys(other),
    }
}

fn find_in_keys(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for key in LIVE_VIEW_KEYS {
                if let Some(url) = map.get(key).and_then(Value::as_str).and_then(http_url) {
                    return Some(url);
                }
            }
            map.values().find_map(find_in_keys)
        }
        Value::Array(items) => items.iter().find_map(find_in_keys),
        _ => None,
    }
}

fn find_in_text(text: &str) -> Option<String> {
    let caps = LIVE_VIEW_TEXT.captures(text)?;
    let raw = caps.get(1)?.as_str();
    http_url(raw.trim_end_matches(['.', ',', ';', ')', '"', '\'']))
}

fn http_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| raw.to_string())
}
