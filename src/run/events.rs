//! The ordered per-run event channel.
//!
//! One run produces one stream of `RunEvent`s. Steps appear in index order,
//! and exactly one terminal event (`Complete` or `Error`) closes the stream.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::record::RunStatus;
use super::step::{Step, SubAction};
use crate::llm::Usage;

/// Payload of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub record_id: Uuid,
    pub status: RunStatus,
    pub summary: String,
    pub steps: Vec<Step>,
    pub usage: Usage,
    pub duration_ms: u64,
}

/// A structured event emitted by a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The execution record exists; observers may subscribe by id
    Created { record_id: Uuid },
    Step { step: Step },
    /// A capability output exposed a live view
    LiveView { url: String },
    /// Ephemeral progress from inside a capability
    SubAction {
        capability: String,
        action: SubAction,
    },
    Complete { summary: RunSummary },
    Error {
        /// None when the run failed before its record was created
        #[serde(skip_serializing_if = "Option::is_none")]
        record_id: Option<Uuid>,
        message: String,
    },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Complete { .. } | RunEvent::Error { .. })
    }
}

/// Sending half of a run's event channel.
///
/// Cloneable so capabilities can emit sub-actions. Sending the terminal
/// event seals the sink: everything sent afterwards is dropped, and the
/// receiver sees the channel close once it has drained.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<RunEvent>>>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// A sink whose events go nowhere.
    pub fn discard() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    pub fn send(&self, event: RunEvent) {
        let mut guard = self.lock();
        let terminal = event.is_terminal();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    tracing::debug!("Run event receiver dropped; event discarded");
                }
            }
            None => {
                tracing::debug!("Event sink sealed; late event discarded");
                return;
            }
        }
        if terminal {
            guard.take();
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<RunEvent>>> {
        match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
