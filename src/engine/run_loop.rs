//! The execution loop.
//!
//! One generic engine drives every task kind: create the record, assemble
//! the prompt, resolve capabilities, open a bounded model session and turn
//! its events into steps. Every outcome ends with exactly one terminal event.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::journal::StepJournal;
use super::live_view::detect_live_view;
use super::prompt::{assemble, prompt_digest, seed_message};
use crate::capability::{resolve, CapabilityRegistry, SubActionSink};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::llm::{InvocationRequest, ModelError, ModelEvent, ModelService, ModelStream, StepEvent, Usage};
use crate::run::{
    EventSink, NewExecutionRecord, RecordPatch, RunEvent, RunOutput, RunStatus, RunSummary, Step,
};
use crate::store::SharedRecordStore;
use crate::task::{ExecutionContext, TaskDefinition};

const EMPTY_ERROR_MESSAGE: &str = "run failed without an error message";

/// The task execution engine.
///
/// Cheap to clone; runs share only the read-only registry, the model
/// service and the store.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<CapabilityRegistry>,
    model: Arc<dyn ModelService>,
    store: SharedRecordStore,
    config: EngineConfig,
}

/// How a model session ended normally.
struct SessionOutcome {
    usage: Usage,
    model: Option<String>,
}

/// In-memory state of one run.
struct RunState {
    record_id: Uuid,
    started: std::time::Instant,
    steps: Vec<Step>,
    journal: StepJournal,
    prompt_sha256: Option<String>,
}

impl RunState {
    fn next_index(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    /// Append a step, announce it, and hand a snapshot to the journal.
    fn push(&mut self, step: Step, events: &EventSink) {
        tracing::debug!(record_id = %self.record_id, index = step.index, "Step recorded");
        self.steps.push(step.clone());
        events.send(RunEvent::Step { step });
        self.journal.publish(self.steps.clone());
    }
}

impl Engine {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        model: Arc<dyn ModelService>,
        store: SharedRecordStore,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            model,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedRecordStore {
        &self.store
    }

    /// Drive one run to completion or failure.
    ///
    /// The outcome is delivered on `events`; the last event is always
    /// `Complete` or `Error`.
    pub async fn run(&self, task: &TaskDefinition, ctx: &ExecutionContext, events: EventSink) {
        self.run_with_cancel(task, ctx, events, CancellationToken::new())
            .await
    }

    /// Like `run`, with a cancellation flag.
    ///
    /// Cancellation is best-effort: the flag is checked only before waiting
    /// for the next model event. A capability call already in flight
    /// completes and is recorded as a step before the run stops.
    pub async fn run_with_cancel(
        &self,
        task: &TaskDefinition,
        ctx: &ExecutionContext,
        events: EventSink,
        cancel: CancellationToken,
    ) {
        let started = std::time::Instant::now();
        tracing::info!(task = %task.id, kind = task.kind.as_str(), tenant = %ctx.tenant_id, "Starting run");

        let record_id = match self.store.create(NewExecutionRecord::for_run(task, ctx)).await {
            Ok(id) => id,
            Err(e) => {
                let err = EngineError::RecordCreate(e);
                tracing::error!(task = %task.id, "{}", err);
                events.send(RunEvent::Error {
                    record_id: None,
                    message: err.to_string(),
                });
                return;
            }
        };
        events.send(RunEvent::Created { record_id });

        let mut state = RunState {
            record_id,
            started,
            steps: Vec::new(),
            journal: StepJournal::start(self.store.clone(), record_id),
            prompt_sha256: None,
        };

        match self.drive_session(task, ctx, &events, &cancel, &mut state).await {
            Ok(outcome) => self.finish(task, state, outcome, &events).await,
            Err(err) => self.fail(state, err, &events).await,
        }
    }

    async fn drive_session(
        &self,
        task: &TaskDefinition,
        ctx: &ExecutionContext,
        events: &EventSink,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Result<SessionOutcome, EngineError> {
        let dynamic_context = match &task.dynamic_context {
            Some(resolver) => resolver
                .resolve(ctx)
                .map_err(|e| EngineError::DynamicContext(e.to_string()))?,
            None => String::new(),
        };
        let prompt = assemble(task, ctx, &dynamic_context);
        state.prompt_sha256 = Some(prompt_digest(&prompt));

        let sub_actions = SubActionSink::new(events.clone());
        let capabilities = resolve(
            &self.registry,
            &task.capabilities,
            Some(&sub_actions),
            self.config.strict_capabilities,
        )
        .map_err(|e| EngineError::UnknownCapabilities(e.0))?;

        let max_steps = task.limits.max_steps;
        let max_execution = task.limits.max_execution();
        let chunk_timeout = self.config.chunk_timeout.min(max_execution);
        tracing::debug!(
            record_id = %state.record_id,
            capabilities = ?capabilities.names(),
            max_steps,
            "Opening model session"
        );

        let request = InvocationRequest {
            prompt,
            seed_message: seed_message(task.kind, &ctx.input),
            capabilities,
            max_steps,
            max_execution,
            chunk_timeout,
            model: self.config.default_model.clone(),
        };

        let deadline = Instant::now() + max_execution;
        let mut stream = timeout_at(deadline, self.model.invoke(request))
            .await
            .map_err(|_| ModelError::DeadlineExceeded(max_execution))??;

        let mut rounds = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            match next_event(&mut stream, deadline, chunk_timeout, max_execution).await? {
                Some(ModelEvent::Step(event)) => {
                    if !event.capability_calls.is_empty() {
                        if rounds >= max_steps {
                            let dropped: Vec<&str> = event
                                .capability_calls
                                .iter()
                                .map(|c| c.capability.as_str())
                                .collect();
                            tracing::warn!(
                                record_id = %state.record_id,
                                max_steps,
                                dropped = ?dropped,
                                "Model service exceeded max_steps; ending the session without recording its last round"
                            );
                            return Ok(SessionOutcome {
                                usage: Usage::default(),
                                model: None,
                            });
                        }
                        rounds += 1;
                    }
                    record_step_event(event, state, events);
                }
                Some(ModelEvent::Finished { usage, model }) => {
                    return Ok(SessionOutcome { usage, model });
                }
                None => {
                    tracing::warn!(
                        record_id = %state.record_id,
                        "Model stream closed without a usage summary"
                    );
                    return Ok(SessionOutcome {
                        usage: Usage::default(),
                        model: None,
                    });
                }
            }
        }
    }

    async fn finish(
        &self,
        task: &TaskDefinition,
        state: RunState,
        outcome: SessionOutcome,
        events: &EventSink,
    ) {
        let RunState {
            record_id,
            started,
            steps,
            journal,
            prompt_sha256,
        } = state;

        let summary = steps
            .iter()
            .rev()
            .find_map(|s| s.text_content())
            .map(str::to_string)
            .unwrap_or_else(|| task.kind.default_summary().to_string());
        let duration_ms = elapsed_millis(started);
        let model = outcome
            .model
            .unwrap_or_else(|| self.config.default_model.clone());

        journal.close(self.config.persist_drain).await;
        let patch = RecordPatch {
            status: Some(RunStatus::Completed),
            steps: Some(steps.clone()),
            output: Some(RunOutput::Summary {
                summary: summary.clone(),
            }),
            usage: Some(outcome.usage),
            model: Some(model),
            prompt_sha256,
            duration_ms: Some(duration_ms),
            completed_at: Some(Utc::now()),
        };
        self.persist_final(record_id, patch).await;

        events.send(RunEvent::Complete {
            summary: RunSummary {
                record_id,
                status: RunStatus::Completed,
                summary,
                steps,
                usage: outcome.usage,
                duration_ms,
            },
        });
    }

    async fn fail(&self, state: RunState, err: EngineError, events: &EventSink) {
        let RunState {
            record_id,
            started,
            steps,
            journal,
            prompt_sha256,
        } = state;

        let mut message = err.to_string();
        if message.trim().is_empty() {
            message = EMPTY_ERROR_MESSAGE.to_string();
        }
        tracing::error!(record_id = %record_id, steps = steps.len(), "Run failed: {}", message);

        journal.close(self.config.persist_drain).await;
        let patch = RecordPatch {
            status: Some(RunStatus::Failed),
            steps: Some(steps),
            output: Some(RunOutput::Error {
                error: message.clone(),
            }),
            prompt_sha256,
            duration_ms: Some(elapsed_millis(started)),
            completed_at: Some(Utc::now()),
            ..RecordPatch::default()
        };
        self.persist_final(record_id, patch).await;

        events.send(RunEvent::Error {
            record_id: Some(record_id),
            message,
        });
    }

    /// Write the finalising patch, bounded by the drain timeout.
    async fn persist_final(&self, record_id: Uuid, patch: RecordPatch) {
        match timeout(self.config.persist_drain, self.store.patch(record_id, patch)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(record_id = %record_id, "Failed to finalise record: {}", e);
            }
            Err(_) => {
                tracing::warn!(
                    record_id = %record_id,
                    drain = ?self.config.persist_drain,
                    "Timed out finalising record"
                );
            }
        }
    }
}

/// Wait for the next model event within the chunk and overall bounds.
async fn next_event(
    stream: &mut ModelStream,
    deadline: Instant,
    chunk_timeout: Duration,
    max_execution: Duration,
) -> Result<Option<ModelEvent>, ModelError> {
    let chunk_deadline = (Instant::now() + chunk_timeout).min(deadline);
    match timeout_at(chunk_deadline, stream.next()).await {
        Ok(Some(event)) => event.map(Some),
        Ok(None) => Ok(None),
        Err(_) if chunk_deadline >= deadline => Err(ModelError::DeadlineExceeded(max_execution)),
        Err(_) => Err(ModelError::ChunkTimeout(chunk_timeout)),
    }
}

/// Turn one model round into steps: one per capability call, then the text.
fn record_step_event(event: StepEvent, state: &mut RunState, events: &EventSink) {
    let StepEvent {
        capability_calls,
        capability_results,
        text,
    } = event;

    for call in capability_calls {
        let output = capability_results
            .iter()
            .find(|r| r.call_id == call.call_id)
            .map(|r| r.output.clone());
        let live_view = output.as_ref().and_then(detect_live_view);

        let step = Step::new_call(state.next_index(), call.capability, call.input, output);
        state.push(step, events);

        if let Some(url) = live_view {
            events.send(RunEvent::LiveView { url });
        }
    }

    if !text.trim().is_empty() {
        let step = Step::new_text(state.next_index(), text);
        state.push(step, events);
    }
}

/// Elapsed wall-clock time, rounded up to whole milliseconds.
fn elapsed_millis(started: std::time::Instant) -> u64 {
    let nanos = started.elapsed().as_nanos();
    (nanos.div_ceil(1_000_000) as u64).max(1)
}
