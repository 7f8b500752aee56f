//! Run data model: steps, execution records, and the per-run event stream.

mod events;
mod observer;
mod record;
mod step;

pub use events::{EventSink, RunEvent, RunSummary};
pub use observer::{dispatch, drive, RunObserver, TracingObserver};
pub use record::{ExecutionRecord, NewExecutionRecord, RecordPatch, RunOutput, RunStatus};
pub use step::{Step, StepKind, SubAction};
