//! Built-in capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

use super::sub_action::SubActionSink;
use super::{Capability, CapabilityFactory};

/// Returns its input unchanged.
pub struct Echo;

#[async_trait]
impl Capability for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the input exactly as given. Useful for checking the capability channel."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "description": "Any value; it is returned unchanged"
        })
    }

    async fn invoke(&self, input: Value) -> anyhow::Result<Value> {
        Ok(input)
    }
}

/// Current UTC date and time.
pub struct CurrentTime;

#[async_trait]
impl Capability for CurrentTime {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current UTC date and time in RFC 3339 format."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn invoke(&self, _input: Value) -> anyhow::Result<Value> {
        let now = Utc::now();
        Ok(json!({
            "utc": now.to_rfc3339(),
            "date": now.format("%Y-%m-%d").to_string(),
        }))
    }
}

const DEFAULT_LIVE_VIEW_BASE: &str = "http://localhost:9222/live";

/// Opens a remote browsing session for a URL and reports a live view link.
///
/// Emits a sub-action per browser action when bound to a run.
pub struct LiveBrowse {
    sub_actions: Option<SubActionSink>,
    live_view_base: String,
}

impl LiveBrowse {
    pub fn new(sub_actions: Option<SubActionSink>) -> Self {
        Self {
            sub_actions,
            live_view_base: DEFAULT_LIVE_VIEW_BASE.to_string(),
        }
    }

    pub fn with_live_view_base(mut self, base: impl Into<String>) -> Self {
        self.live_view_base = base.into();
        self
    }
}

#[async_trait]
impl Capability for LiveBrowse {
    fn name(&self) -> &str {
        "live_browse"
    }

    fn description(&self) -> &str {
        "Open a web page in a remote browser session. Returns the page URL and a live view link observers can watch."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL to open"
                },
                "goal": {
                    "type": "string",
                    "description": "Optional: what to look for on the page"
                }
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, input: Value) -> anyhow::Result<Value> {
        let raw = input["url"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'url' argument"))?;
        let url = Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid url '{}': {}", raw, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported url scheme '{}'", url.scheme());
        }
        let goal = input["goal"].as_str().map(str::to_string);

        let session = Uuid::new_v4();
        let live_view_url = format!("{}/{}", self.live_view_base.trim_end_matches('/'), session);

        if let Some(sink) = &self.sub_actions {
            let recorder = sink.recorder(self.name());
            recorder.record("navigate", None, Some(json!({ "url": url.as_str() })));
            recorder.record("observe", goal.clone(), None);
        }

        Ok(json!({
            "url": url.as_str(),
            "host": url.host_str(),
            "goal": goal,
            "liveViewUrl": live_view_url,
        }))
    }
}

/// Builds a `LiveBrowse` per run so its sub-actions land on that run.
pub(crate) struct LiveBrowseFactory;

impl CapabilityFactory for LiveBrowseFactory {
    fn name(&self) -> &str {
        "live_browse"
    }

    fn bind(&self, sub_actions: Option<SubActionSink>) -> Option<Arc<dyn Capability>> {
        Some(Arc::new(LiveBrowse::new(sub_actions)))
    }
}
