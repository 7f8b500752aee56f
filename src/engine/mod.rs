//! Engine module - drives task runs.
//!
//! A run goes through a fixed sequence: the execution record is created
//! (announced with `RunEvent::Created`), the four-layer prompt is assembled,
//! capabilities are resolved, and a bounded model session is opened. Each
//! model round becomes one or more steps that are announced immediately and
//! persisted in the background. The run ends with a final record write
//! followed by exactly one `Complete` or `Error` event.

mod handle;
mod journal;
mod live_view;
mod prompt;
mod run_loop;

#[cfg(test)]
mod scenarios;

pub use handle::RunHandle;
pub use live_view::detect_live_view;
pub use prompt::{assemble, assemble_on, preamble, prompt_digest, seed_message};
pub use run_loop::Engine;
