//! Background runs.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::run_loop::Engine;
use crate::run::{drive, EventSink, RunEvent, RunObserver};
use crate::task::{ExecutionContext, TaskDefinition};

/// Handle to a run executing on the tokio runtime.
pub struct RunHandle {
    events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl RunHandle {
    /// Request cancellation.
    ///
    /// Best-effort, not an interrupt: the run notices the request only
    /// before it next waits on the model, so a capability call in flight
    /// still completes and is recorded. The run then fails with
    /// "run cancelled by request".
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Next event of the run; `None` once the terminal event was consumed.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Feed the remaining events to `observer`. Returns the terminal event.
    pub async fn observe<O>(self, observer: &mut O) -> Option<RunEvent>
    where
        O: RunObserver + ?Sized,
    {
        let Self { events, join, .. } = self;
        let terminal = drive(events, observer).await;
        if let Err(e) = join.await {
            tracing::warn!("Run task ended abnormally: {}", e);
        }
        terminal
    }

    /// Wait for the run to end and return all remaining events in order.
    pub async fn collect(self) -> Vec<RunEvent> {
        let Self {
            mut events, join, ..
        } = self;
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }
        if let Err(e) = join.await {
            tracing::warn!("Run task ended abnormally: {}", e);
        }
        collected
    }
}

impl Engine {
    /// Start a run in the background.
    pub fn spawn(&self, task: Arc<TaskDefinition>, ctx: ExecutionContext) -> RunHandle {
        let (sink, events) = EventSink::channel();
        let cancel = CancellationToken::new();

        let engine = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            engine.run_with_cancel(&task, &ctx, sink, token).await;
        });

        RunHandle {
            events,
            cancel,
            join,
        }
    }
}
