//! Per-run step journal.
//!
//! The run loop publishes a snapshot of its step list after every step and
//! never waits for the write. A background writer patches the record with
//! the newest snapshot, skipping any it did not get to in time.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::run::{RecordPatch, Step};
use crate::store::SharedRecordStore;

pub(crate) struct StepJournal {
    tx: watch::Sender<Vec<Step>>,
    writer: JoinHandle<()>,
}

impl StepJournal {
    pub(crate) fn start(store: SharedRecordStore, record_id: Uuid) -> Self {
        let (tx, mut rx) = watch::channel(Vec::new());
        let writer = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let steps = rx.borrow_and_update().clone();
                let count = steps.len();
                if let Err(e) = store.patch(record_id, RecordPatch::steps(steps)).await {
                    tracing::warn!(record_id = %record_id, steps = count, "Failed to persist steps: {}", e);
                }
            }
        });
        Self { tx, writer }
    }

    /// Replace the pending snapshot. Never blocks.
    pub(crate) fn publish(&self, steps: Vec<Step>) {
        self.tx.send_replace(steps);
    }

    /// Stop accepting snapshots and give the writer up to `drain` to flush.
    pub(crate) async fn close(self, drain: Duration) {
        let Self { tx, mut writer } = self;
        drop(tx);
        if tokio::time::timeout(drain, &mut writer).await.is_err() {
            tracing::warn!("Step journal did not drain within {:?}; abandoning it", drain);
            writer.abort();
        }
    }
}
