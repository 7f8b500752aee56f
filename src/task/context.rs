//! Per-invocation context and layer-4 context producers.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invocation input, keyed by field name.
pub type InputMap = serde_json::Map<String, Value>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("Invalid placeholder regex")
});

/// Parameters of one invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub input: InputMap,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_prompt_override: Option<String>,
    pub invoker_id: String,
}

impl ExecutionContext {
    pub fn new(tenant_id: impl Into<String>, invoker_id: impl Into<String>) -> Self {
        Self {
            input: InputMap::new(),
            tenant_id: tenant_id.into(),
            tenant_prompt_override: None,
            invoker_id: invoker_id.into(),
        }
    }

    pub fn with_input(mut self, input: InputMap) -> Self {
        self.input = input;
        self
    }

    pub fn with_tenant_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.tenant_prompt_override = Some(prompt.into());
        self
    }

    /// Human-readable rendering of an input value: strings raw, the rest as JSON.
    pub fn input_text(&self, key: &str) -> Option<String> {
        self.input.get(key).map(value_text)
    }
}

pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Produces layer-4 prompt context at invocation time.
///
/// Implementations must be pure: same context, same text.
pub trait DynamicContext: Send + Sync {
    fn resolve(&self, ctx: &ExecutionContext) -> anyhow::Result<String>;
}

impl<F> DynamicContext for F
where
    F: Fn(&ExecutionContext) -> anyhow::Result<String> + Send + Sync,
{
    fn resolve(&self, ctx: &ExecutionContext) -> anyhow::Result<String> {
        self(ctx)
    }
}

/// Context built from a `{{field}}` template over the invocation input.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    template: String,
}

impl TemplateContext {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl DynamicContext for TemplateContext {
    fn resolve(&self, ctx: &ExecutionContext) -> anyhow::Result<String> {
        let mut out = String::with_capacity(self.template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(&self.template) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = ctx.input_text(key.as_str()).ok_or_else(|| {
                anyhow::anyhow!("context template references missing input `{}`", key.as_str())
            })?;
            out.push_str(&self.template[last..whole.start()]);
            out.push_str(&value);
            last = whole.end();
        }
        out.push_str(&self.template[last..]);
        Ok(out.trim().to_string())
    }
}
