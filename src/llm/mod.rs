//! Model invocation boundary.
//!
//! The engine does not sample tokens or parse tool-call protocols. It hands
//! an `InvocationRequest` to a `ModelService` and consumes the resulting
//! stream of backend-agnostic `ModelEvent`s. The service decides which
//! capabilities to call, invokes them through the request's `CapabilitySet`,
//! and reports usage when the stream closes.

mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capability::CapabilitySet;

pub use scripted::{Script, ScriptTurn, ScriptedCall, ScriptedModelService};

/// Model usage for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_units: u64,
    pub output_units: u64,
    pub total_units: u64,
}

impl Usage {
    pub fn new(input_units: u64, output_units: u64) -> Self {
        Self {
            input_units,
            output_units,
            total_units: input_units + output_units,
        }
    }

    pub fn add(&self, other: &Usage) -> Usage {
        Usage {
            input_units: self.input_units + other.input_units,
            output_units: self.output_units + other.output_units,
            total_units: self.total_units + other.total_units,
        }
    }
}

/// Everything a model service needs to run one bounded session.
pub struct InvocationRequest {
    /// Assembled four-layer instruction text
    pub prompt: String,
    /// Single user message describing the input
    pub seed_message: String,
    pub capabilities: CapabilitySet,
    /// Maximum number of capability-call rounds
    pub max_steps: u32,
    /// Overall wall-clock bound
    pub max_execution: Duration,
    /// Longest tolerated gap between two stream events
    pub chunk_timeout: Duration,
    /// Model identifier hint
    pub model: String,
}

/// A capability call decided by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCall {
    pub call_id: String,
    pub capability: String,
    pub input: Value,
}

/// The output of a capability call, matched to its call by `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub call_id: String,
    pub capability: String,
    pub output: Value,
}

/// One model decision round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepEvent {
    pub capability_calls: Vec<CapabilityCall>,
    pub capability_results: Vec<CapabilityResult>,
    pub text: String,
}

impl StepEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn result_for(&self, call_id: &str) -> Option<&CapabilityResult> {
        self.capability_results.iter().find(|r| r.call_id == call_id)
    }
}

/// Backend-agnostic model stream events.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    Step(StepEvent),
    /// Stream close with the usage summary.
    Finished { usage: Usage, model: Option<String> },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("model transport error: {0}")]
    Transport(String),

    #[error("model protocol error: {0}")]
    Protocol(String),

    #[error("model stream stalled for longer than {0:?}")]
    ChunkTimeout(Duration),

    #[error("run exceeded its execution limit of {0:?}")]
    DeadlineExceeded(Duration),
}

pub type ModelStream = BoxStream<'static, Result<ModelEvent, ModelError>>;

/// The external Model Invocation Service.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Open a bounded session.
    ///
    /// Implementations must respect `max_steps` and `max_execution`; the
    /// engine enforces both again at the stream boundary. A service that
    /// yields a capability round past `max_steps` has already run those
    /// calls: the engine drops that round unrecorded and ends the session
    /// with zero usage, since no usage summary was received.
    async fn invoke(&self, request: InvocationRequest) -> Result<ModelStream, ModelError>;
}
