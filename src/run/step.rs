//! Durable steps and ephemeral sub-actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One durable unit of run progress.
///
/// Indices start at 1 and are unique within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: u32,
    #[serde(flatten)]
    pub kind: StepKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepKind {
    CapabilityCall {
        capability: String,
        input: Value,
        /// Absent when the model service reported no matching result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    Text {
        content: String,
    },
}

impl Step {
    pub fn new_call(index: u32, capability: String, input: Value, output: Option<Value>) -> Self {
        Self {
            index,
            kind: StepKind::CapabilityCall {
                capability,
                input,
                output,
            },
            timestamp: Utc::now(),
        }
    }

    pub fn new_text(index: u32, content: String) -> Self {
        Self {
            index,
            kind: StepKind::Text { content },
            timestamp: Utc::now(),
        }
    }

    pub fn is_capability_call(&self) -> bool {
        matches!(self.kind, StepKind::CapabilityCall { .. })
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Text { content } => Some(content),
            StepKind::CapabilityCall { .. } => None,
        }
    }

    pub fn capability(&self) -> Option<&str> {
        match &self.kind {
            StepKind::CapabilityCall { capability, .. } => Some(capability),
            StepKind::Text { .. } => None,
        }
    }
}

/// A fine-grained progress event emitted by a capability while it runs.
///
/// Forwarded live, never persisted. `index` restarts at 1 for every
/// capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAction {
    pub index: u32,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_action: Option<Value>,
    pub timestamp: DateTime<Utc>,
}
