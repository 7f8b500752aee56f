//! Sub-action channel handed to capability factories.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use serde_json::Value;

use crate::run::{EventSink, RunEvent, SubAction};

/// Run-scoped handle for emitting sub-actions onto the run's event channel.
#[derive(Debug, Clone)]
pub struct SubActionSink {
    events: EventSink,
}

impl SubActionSink {
    pub fn new(events: EventSink) -> Self {
        Self { events }
    }

    /// Start a recorder for one capability invocation.
    pub fn recorder(&self, capability: &str) -> SubActionRecorder {
        SubActionRecorder {
            capability: capability.to_string(),
            events: self.events.clone(),
            next_index: AtomicU32::new(1),
        }
    }
}

/// Emits the sub-actions of a single invocation, indexed from 1.
#[derive(Debug)]
pub struct SubActionRecorder {
    capability: String,
    events: EventSink,
    next_index: AtomicU32,
}

impl SubActionRecorder {
    pub fn record(
        &self,
        action_type: &str,
        reasoning: Option<String>,
        raw_action: Option<Value>,
    ) -> u32 {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        self.events.send(RunEvent::SubAction {
            capability: self.capability.clone(),
            action: SubAction {
                index,
                action_type: action_type.to_string(),
                reasoning,
                raw_action,
                timestamp: Utc::now(),
            },
        });
        index
    }
}
