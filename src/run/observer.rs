//! Callback-style consumers of the run event channel.

use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::{RunEvent, RunSummary};
use super::step::{Step, SubAction};

/// The six named hooks of a run. Optional hooks default to no-ops.
///
/// Hooks are called in channel order; `on_complete` or `on_error` is always
/// the last hook called for a run.
pub trait RunObserver: Send {
    fn on_execution_created(&mut self, _record_id: Uuid) {}

    fn on_step(&mut self, step: &Step);

    fn on_live_view(&mut self, _url: &str) {}

    fn on_sub_action(&mut self, _capability: &str, _action: &SubAction) {}

    fn on_complete(&mut self, summary: &RunSummary);

    fn on_error(&mut self, record_id: Option<Uuid>, message: &str);
}

/// Feed every event of a run to `observer`. Returns the terminal event.
pub async fn drive<O>(mut events: mpsc::UnboundedReceiver<RunEvent>, observer: &mut O) -> Option<RunEvent>
where
    O: RunObserver + ?Sized,
{
    while let Some(event) = events.recv().await {
        dispatch(&event, observer);
        if event.is_terminal() {
            return Some(event);
        }
    }
    None
}

pub fn dispatch<O>(event: &RunEvent, observer: &mut O)
where
    O: RunObserver + ?Sized,
{
    match event {
        RunEvent::Created { record_id } => observer.on_execution_created(*record_id),
        RunEvent::Step { step } => observer.on_step(step),
        RunEvent::LiveView { url } => observer.on_live_view(url),
        RunEvent::SubAction { capability, action } => observer.on_sub_action(capability, action),
        RunEvent::Complete { summary } => observer.on_complete(summary),
        RunEvent::Error { record_id, message } => observer.on_error(*record_id, message),
    }
}

/// Fan one run out to several observers, in order.
impl RunObserver for Vec<Box<dyn RunObserver>> {
    fn on_execution_created(&mut self, record_id: Uuid) {
        self.iter_mut().for_each(|o| o.on_execution_created(record_id));
    }

    fn on_step(&mut self, step: &Step) {
        self.iter_mut().for_each(|o| o.on_step(step));
    }

    fn on_live_view(&mut self, url: &str) {
        self.iter_mut().for_each(|o| o.on_live_view(url));
    }

    fn on_sub_action(&mut self, capability: &str, action: &SubAction) {
        self.iter_mut().for_each(|o| o.on_sub_action(capability, action));
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        self.iter_mut().for_each(|o| o.on_complete(summary));
    }

    fn on_error(&mut self, record_id: Option<Uuid>, message: &str) {
        self.iter_mut().for_each(|o| o.on_error(record_id, message));
    }
}

/// Log sink: writes every run event to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver {
    record_id: Option<Uuid>,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunObserver for TracingObserver {
    fn on_execution_created(&mut self, record_id: Uuid) {
        self.record_id = Some(record_id);
        tracing::info!(record_id = %record_id, "Execution record created");
    }

    fn on_step(&mut self, step: &Step) {
        match (step.capability(), step.text_content()) {
            (Some(capability), _) => {
                tracing::info!(index = step.index, capability, "Capability call step")
            }
            (None, Some(content)) => {
                tracing::info!(index = step.index, "Text step: {}", truncate_for_log(content, 200))
            }
            (None, None) => {}
        }
    }

    fn on_live_view(&mut self, url: &str) {
        tracing::info!(url, "Live view available");
    }

    fn on_sub_action(&mut self, capability: &str, action: &SubAction) {
        tracing::debug!(
            capability,
            index = action.index,
            action_type = %action.action_type,
            "Sub-action"
        );
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        tracing::info!(
            record_id = %summary.record_id,
            steps = summary.steps.len(),
            duration_ms = summary.duration_ms,
            total_units = summary.usage.total_units,
            "Run completed"
        );
    }

    fn on_error(&mut self, record_id: Option<Uuid>, message: &str) {
        let record_id = record_id.or(self.record_id);
        tracing::error!(record_id = ?record_id, "Run failed: {}", message);
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}... [truncated]", cut)
    }
}
