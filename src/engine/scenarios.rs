//! End-to-end runs against scripted model sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio_test::assert_ok;
use uuid::Uuid;

use super::Engine;
use crate::capability::CapabilityRegistry;
use crate::config::EngineConfig;
use crate::llm::{
    CapabilityCall, CapabilityResult, InvocationRequest, ModelError, ModelEvent, ModelService,
    ModelStream, Script, ScriptTurn, ScriptedModelService, StepEvent,
};
use crate::run::{
    ExecutionRecord, NewExecutionRecord, RecordPatch, RunEvent, RunObserver, RunStatus,
    RunSummary, Step, StepKind, SubAction, TracingObserver,
};
use crate::store::{request_stop, InMemoryRecordStore, RecordStore, SharedRecordStore};
use crate::task::{ExecutionContext, InputMap, TaskDefinition, TaskLimits, TemplateContext};

fn engine(store: SharedRecordStore, model: Arc<dyn ModelService>, config: EngineConfig) -> Engine {
    Engine::new(
        Arc::new(CapabilityRegistry::with_builtins()),
        model,
        store,
        config,
    )
}

fn scripted(turns: Vec<ScriptTurn>) -> Arc<dyn ModelService> {
    Arc::new(ScriptedModelService::new(Script::new(turns)))
}

fn task(capabilities: &[&str], max_steps: u32) -> Arc<TaskDefinition> {
    Arc::new(
        TaskDefinition::new("echo-task", "Echo", "Echo the message back.")
            .with_capabilities(capabilities.iter().copied())
            .with_limits(TaskLimits::new(max_steps, 10_000)),
    )
}

fn ctx_with_msg(msg: &str) -> ExecutionContext {
    let mut input = InputMap::new();
    input.insert("msg".into(), json!(msg));
    ExecutionContext::new("tenant-1", "user-1").with_input(input)
}

fn steps_of(events: &[RunEvent]) -> Vec<Step> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Step { step } => Some(step.clone()),
            _ => None,
        })
        .collect()
}

fn record_id_of(events: &[RunEvent]) -> Uuid {
    match events.first() {
        Some(RunEvent::Created { record_id }) => *record_id,
        other => panic!("expected Created first, got {:?}", other),
    }
}

fn complete_summary(events: &[RunEvent]) -> &RunSummary {
    match events.last() {
        Some(RunEvent::Complete { summary }) => summary,
        other => panic!("expected Complete last, got {:?}", other),
    }
}

fn error_message(events: &[RunEvent]) -> &str {
    match events.last() {
        Some(RunEvent::Error { message, .. }) => message,
        other => panic!("expected Error last, got {:?}", other),
    }
}

async fn record(store: &InMemoryRecordStore, id: Uuid) -> ExecutionRecord {
    assert_ok!(store.get(id).await).expect("record exists")
}

fn echo_turns() -> Vec<ScriptTurn> {
    vec![
        ScriptTurn::call("echo", json!("hi")),
        ScriptTurn::text("The echo capability returned \"hi\"."),
    ]
}

#[tokio::test]
async fn echo_scenario_completes_with_two_steps() {
    let store = Arc::new(InMemoryRecordStore::new());
    let config = EngineConfig::default();
    let engine = engine(store.clone(), scripted(echo_turns()), config.clone());

    let events = engine.spawn(task(&["echo"], 3), ctx_with_msg("hi")).collect().await;

    let steps = steps_of(&events);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].capability(), Some("echo"));
    assert_eq!(
        steps[0].kind,
        crate::run::StepKind::CapabilityCall {
            capability: "echo".into(),
            input: json!("hi"),
            output: Some(json!("hi")),
        }
    );
    assert_eq!(steps[1].text_content(), Some("The echo capability returned \"hi\"."));

    let summary = complete_summary(&events);
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.steps.len(), 2);
    assert!(summary.duration_ms > 0);
    assert_eq!(summary.summary, "The echo capability returned \"hi\".");
    assert!(summary.usage.total_units > 0);

    let record = record(&store, record_id_of(&events)).await;
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.steps, steps);
    assert_eq!(record.summary(), Some(summary.summary.as_str()));
    assert_eq!(record.model.as_deref(), Some(config.default_model.as_str()));
    assert_eq!(record.prompt_sha256.as_ref().map(String::len), Some(64));
    assert_eq!(record.input["msg"], json!("hi"));
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn steps_are_indexed_in_order_and_persisted_identically() {
    let store = Arc::new(InMemoryRecordStore::new());
    let mut first = ScriptTurn::call("echo", json!("a")).with_text("Checking both.");
    first.calls.push(crate::llm::ScriptedCall {
        capability: "current_time".into(),
        input: json!({}),
    });
    let model = scripted(vec![
        first,
        ScriptTurn::call("echo", json!("b")),
        ScriptTurn::text("All done."),
    ]);
    let engine = engine(store.clone(), model, EngineConfig::default());

    let events = engine
        .spawn(task(&["echo", "current_time"], 5), ctx_with_msg("x"))
        .collect()
        .await;

    let steps = steps_of(&events);
    let indices: Vec<u32> = steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    assert_eq!(steps[0].capability(), Some("echo"));
    assert_eq!(steps[1].capability(), Some("current_time"));
    assert_eq!(steps[2].text_content(), Some("Checking both."));
    assert_eq!(steps[3].capability(), Some("echo"));
    assert_eq!(steps[4].text_content(), Some("All done."));

    assert_eq!(complete_summary(&events).steps, steps);
    let record = record(&store, record_id_of(&events)).await;
    assert_eq!(record.steps, steps);
}

struct RunawayModel;

#[async_trait]
impl ModelService for RunawayModel {
    async fn invoke(&self, _request: InvocationRequest) -> Result<ModelStream, ModelError> {
        let stream = futures::stream::iter(1..=5).map(|i| {
            let call_id = format!("c{}", i);
            Ok(ModelEvent::Step(StepEvent {
                capability_calls: vec![CapabilityCall {
                    call_id: call_id.clone(),
                    capability: "echo".into(),
                    input: json!(i),
                }],
                capability_results: vec![CapabilityResult {
                    call_id,
                    capability: "echo".into(),
                    output: json!(i),
                }],
                text: String::new(),
            }))
        });
        Ok(Box::pin(stream))
    }
}

#[tokio::test]
async fn max_steps_bounds_a_well_behaved_service() {
    let store = Arc::new(InMemoryRecordStore::new());
    let turns = (0..5).map(|i| ScriptTurn::call("echo", json!(i))).collect();
    let engine = engine(store.clone(), scripted(turns), EngineConfig::default());

    let events = engine.spawn(task(&["echo"], 1), ctx_with_msg("x")).collect().await;

    let calls = steps_of(&events).iter().filter(|s| s.is_capability_call()).count();
    assert!(calls <= 1);
    assert_eq!(complete_summary(&events).status, RunStatus::Completed);
    let record = record(&store, record_id_of(&events)).await;
    assert_eq!(record.status, RunStatus::Completed);
}

#[tokio::test]
async fn max_steps_bounds_a_runaway_service() {
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = engine(store.clone(), Arc::new(RunawayModel), EngineConfig::default());

    let events = engine.spawn(task(&["echo"], 1), ctx_with_msg("x")).collect().await;

    let steps = steps_of(&events);
    assert_eq!(steps.len(), 1);
    assert!(matches!(
        &steps[0].kind,
        StepKind::CapabilityCall { input, .. } if *input == json!(1)
    ));
    let summary = complete_summary(&events);
    assert_eq!(summary.summary, "Agent run completed.");
    assert_eq!(summary.usage.total_units, 0);
    assert_eq!(record(&store, summary.record_id).await.status, RunStatus::Completed);
}

/// Store whose patches always fail.
struct FailingPatchStore {
    inner: InMemoryRecordStore,
}

#[async_trait]
impl RecordStore for FailingPatchStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn create(&self, record: NewExecutionRecord) -> Result<Uuid, String> {
        self.inner.create(record).await
    }

    async fn patch(&self, _id: Uuid, _patch: RecordPatch) -> Result<(), String> {
        Err("store unavailable".into())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>, String> {
        self.inner.get(id).await
    }

    async fn list_for_task(&self, task_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>, String> {
        self.inner.list_for_task(task_id, limit).await
    }
}

#[tokio::test]
async fn patch_failures_never_reach_the_run() {
    let store = Arc::new(FailingPatchStore {
        inner: InMemoryRecordStore::new(),
    });
    let engine = engine(store.clone(), scripted(echo_turns()), EngineConfig::default());

    let events = engine.spawn(task(&["echo"], 3), ctx_with_msg("hi")).collect().await;

    let summary = complete_summary(&events);
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.steps.len(), 2);
    assert_eq!(summary.summary, "The echo capability returned \"hi\".");

    let stale = store.get(summary.record_id).await.unwrap().unwrap();
    assert_eq!(stale.status, RunStatus::Running);
    assert!(stale.steps.is_empty());
}

/// Store whose patches never return.
struct StalledPatchStore {
    inner: InMemoryRecordStore,
}

#[async_trait]
impl RecordStore for StalledPatchStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn create(&self, record: NewExecutionRecord) -> Result<Uuid, String> {
        self.inner.create(record).await
    }

    async fn patch(&self, _id: Uuid, _patch: RecordPatch) -> Result<(), String> {
        futures::future::pending().await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>, String> {
        self.inner.get(id).await
    }

    async fn list_for_task(&self, task_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>, String> {
        self.inner.list_for_task(task_id, limit).await
    }
}

#[tokio::test]
async fn stalled_store_never_blocks_the_terminal_event() {
    let store = Arc::new(StalledPatchStore {
        inner: InMemoryRecordStore::new(),
    });
    let config = EngineConfig {
        persist_drain: Duration::from_millis(50),
        ..EngineConfig::default()
    };

    let completing = engine(store.clone(), scripted(echo_turns()), config.clone());
    let handle = completing.spawn(task(&["echo"], 3), ctx_with_msg("hi"));
    let events = assert_ok!(tokio::time::timeout(Duration::from_secs(3), handle.collect()).await);
    assert_eq!(complete_summary(&events).steps.len(), 2);

    let model = Arc::new(ScriptedModelService::new(
        Script::new(vec![ScriptTurn::call("echo", json!(1))]).failing_at(1, "connection reset"),
    ));
    let failing = engine(store, model, config);
    let handle = failing.spawn(task(&["echo"], 3), ctx_with_msg("hi"));
    let events = assert_ok!(tokio::time::timeout(Duration::from_secs(3), handle.collect()).await);
    assert!(error_message(&events).contains("connection reset"));
}

#[tokio::test]
async fn patch_failures_never_mask_a_failure() {
    let store = Arc::new(FailingPatchStore {
        inner: InMemoryRecordStore::new(),
    });
    let model = Arc::new(ScriptedModelService::new(
        Script::new(vec![ScriptTurn::call("echo", json!(1))]).failing_at(1, "connection reset"),
    ));
    let engine = engine(store, model, EngineConfig::default());

    let events = engine.spawn(task(&["echo"], 3), ctx_with_msg("hi")).collect().await;
    assert!(error_message(&events).contains("connection reset"));
}

#[tokio::test]
async fn model_failure_keeps_partial_steps() {
    let store = Arc::new(InMemoryRecordStore::new());
    let model = Arc::new(ScriptedModelService::new(
        Script::new(vec![
            ScriptTurn::call("echo", json!(1)),
            ScriptTurn::call("echo", json!(2)),
        ])
        .failing_at(2, "connection reset by peer"),
    ));
    let engine = engine(store.clone(), model, EngineConfig::default());

    let events = engine.spawn(task(&["echo"], 5), ctx_with_msg("hi")).collect().await;

    assert_eq!(steps_of(&events).len(), 2);
    let message = error_message(&events);
    assert_eq!(
        message,
        "model invocation failed: model transport error: connection reset by peer"
    );

    let record = record(&store, record_id_of(&events)).await;
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.steps.len(), 2);
    assert_eq!(record.error(), Some(message));
    assert!(record.duration_ms.is_some_and(|d| d > 0));
}

struct FailingCreateStore;

#[async_trait]
impl RecordStore for FailingCreateStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn create(&self, _record: NewExecutionRecord) -> Result<Uuid, String> {
        Err("database is locked".into())
    }

    async fn patch(&self, _id: Uuid, _patch: RecordPatch) -> Result<(), String> {
        panic!("patch must not be called without a record");
    }

    async fn get(&self, _id: Uuid) -> Result<Option<ExecutionRecord>, String> {
        Ok(None)
    }

    async fn list_for_task(&self, _task_id: &str, _limit: usize) -> Result<Vec<ExecutionRecord>, String> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn create_failure_is_reported_without_a_record() {
    let engine = engine(
        Arc::new(FailingCreateStore),
        scripted(echo_turns()),
        EngineConfig::default(),
    );

    let events = engine.spawn(task(&["echo"], 3), ctx_with_msg("hi")).collect().await;

    assert_eq!(
        events,
        vec![RunEvent::Error {
            record_id: None,
            message: "failed to create execution record: database is locked".into(),
        }]
    );
}

#[tokio::test]
async fn handle_reports_finished_after_the_terminal_event() {
    let store = Arc::new(InMemoryRecordStore::new());
    let turns = vec![ScriptTurn::text("done").with_delay(50)];
    let engine = engine(store, scripted(turns), EngineConfig::default());

    let mut handle = engine.spawn(task(&["echo"], 3), ctx_with_msg("x"));
    assert!(!handle.is_finished());

    let mut last = None;
    while let Some(event) = handle.next_event().await {
        last = Some(event);
    }
    assert!(matches!(last, Some(RunEvent::Complete { .. })));

    let finished = tokio::time::timeout(Duration::from_secs(1), async {
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert_ok!(finished);
}

#[tokio::test]
async fn cancellation_is_observed_before_the_next_model_event() {
    let store = Arc::new(InMemoryRecordStore::new());
    let turns = (0..5)
        .map(|i| ScriptTurn::call("echo", json!(i)).with_delay(50))
        .collect();
    let engine = engine(store.clone(), scripted(turns), EngineConfig::default());

    let mut handle = engine.spawn(task(&["echo"], 10), ctx_with_msg("x"));
    let mut seen = Vec::new();
    while let Some(event) = handle.next_event().await {
        let is_step = matches!(event, RunEvent::Step { .. });
        seen.push(event);
        if is_step {
            break;
        }
    }
    handle.cancel();
    assert!(handle.is_cancel_requested());
    seen.extend(handle.collect().await);

    assert_eq!(error_message(&seen), "run cancelled by request");
    let recorded = steps_of(&seen).len();
    assert!((1..5).contains(&recorded));

    let record = record(&store, record_id_of(&seen)).await;
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.steps.len(), recorded);
}

#[tokio::test]
async fn external_stop_wins_over_late_completion() {
    let store = Arc::new(InMemoryRecordStore::new());
    let model = scripted(vec![
        ScriptTurn::call("echo", json!(1)).with_delay(30),
        ScriptTurn::call("echo", json!(2)).with_delay(30),
        ScriptTurn::text("done"),
    ]);
    let engine = engine(store.clone(), model, EngineConfig::default());

    let mut handle = engine.spawn(task(&["echo"], 5), ctx_with_msg("x"));
    let Some(RunEvent::Created { record_id }) = handle.next_event().await else {
        panic!("expected Created first");
    };
    request_stop(store.as_ref(), record_id, "stopped by user")
        .await
        .expect("stop");

    let events = handle.collect().await;
    assert_eq!(complete_summary(&events).steps.len(), 3);

    let record = record(&store, record_id).await;
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.error(), Some("stopped by user"));
    assert_eq!(record.steps.len(), 3);
}

#[tokio::test]
async fn stalled_stream_hits_the_chunk_timeout() {
    let store = Arc::new(InMemoryRecordStore::new());
    let model = scripted(vec![ScriptTurn::call("echo", json!(1)).with_delay(500)]);
    let config = EngineConfig {
        chunk_timeout: Duration::from_millis(20),
        ..EngineConfig::default()
    };
    let engine = engine(store.clone(), model, config);

    let events = engine.spawn(task(&["echo"], 3), ctx_with_msg("x")).collect().await;

    assert!(error_message(&events).contains("stalled"));
    let record = record(&store, record_id_of(&events)).await;
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.steps.is_empty());
}

#[tokio::test]
async fn overall_deadline_is_enforced() {
    let store = Arc::new(InMemoryRecordStore::new());
    let model = scripted(vec![ScriptTurn::call("echo", json!(1)).with_delay(500)]);
    let engine = engine(store, model, EngineConfig::default());
    let task = Arc::new(
        TaskDefinition::new("slow", "Slow", "Wait.")
            .with_capabilities(["echo"])
            .with_limits(TaskLimits::new(3, 30)),
    );

    let events = engine.spawn(task, ctx_with_msg("x")).collect().await;
    assert!(error_message(&events).contains("execution limit"));
}

#[tokio::test]
async fn unknown_capabilities_are_dropped_in_lenient_mode() {
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = engine(store, scripted(echo_turns()), EngineConfig::default());

    let events = engine
        .spawn(task(&["echo", "doesNotExist"], 3), ctx_with_msg("hi"))
        .collect()
        .await;
    assert_eq!(complete_summary(&events).steps.len(), 2);
}

#[tokio::test]
async fn unknown_capabilities_fail_in_strict_mode() {
    let store = Arc::new(InMemoryRecordStore::new());
    let config = EngineConfig::default().with_strict_capabilities(true);
    let engine = engine(store.clone(), scripted(echo_turns()), config);

    let events = engine
        .spawn(task(&["echo", "doesNotExist"], 3), ctx_with_msg("hi"))
        .collect()
        .await;

    assert_eq!(
        error_message(&events),
        "unknown capabilities declared by task: doesNotExist"
    );
    assert!(steps_of(&events).is_empty());
    let record = record(&store, record_id_of(&events)).await;
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.prompt_sha256.is_some());
}

#[tokio::test]
async fn dynamic_context_failure_fails_the_run() {
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = engine(store.clone(), scripted(echo_turns()), EngineConfig::default());
    let task = Arc::new(
        TaskDefinition::new("ctx", "Ctx", "Use the account.")
            .with_dynamic_context(Arc::new(TemplateContext::new("Account: {{account}}"))),
    );

    let events = engine.spawn(task, ctx_with_msg("hi")).collect().await;

    assert!(error_message(&events).contains("account"));
    let record = record(&store, record_id_of(&events)).await;
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn sub_actions_precede_their_step_and_live_view_follows_it() {
    let store = Arc::new(InMemoryRecordStore::new());
    let model = scripted(vec![
        ScriptTurn::call("live_browse", json!({"url": "https://example.com", "goal": "pricing"})),
        ScriptTurn::text("Opened the page."),
    ]);
    let engine = engine(store, model, EngineConfig::default());

    let events = engine
        .spawn(task(&["live_browse"], 3), ctx_with_msg("x"))
        .collect()
        .await;

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            RunEvent::Created { .. } => "created",
            RunEvent::SubAction { .. } => "sub_action",
            RunEvent::Step { .. } => "step",
            RunEvent::LiveView { .. } => "live_view",
            RunEvent::Complete { .. } => "complete",
            RunEvent::Error { .. } => "error",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["created", "sub_action", "sub_action", "step", "live_view", "step", "complete"]
    );

    let Some(RunEvent::SubAction { action, .. }) = events.get(2) else {
        panic!("expected a sub-action");
    };
    assert_eq!(action.index, 2);
    assert_eq!(action.reasoning.as_deref(), Some("pricing"));
}

struct SilentModel;

#[async_trait]
impl ModelService for SilentModel {
    async fn invoke(&self, _request: InvocationRequest) -> Result<ModelStream, ModelError> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

#[tokio::test]
async fn stream_without_usage_completes_with_default_summary() {
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = engine(store, Arc::new(SilentModel), EngineConfig::default());
    let skill = Arc::new(
        TaskDefinition::new("noop", "Noop", "Do nothing.").with_kind(crate::task::TaskKind::Skill),
    );

    let events = engine.spawn(skill, ExecutionContext::new("t", "u")).collect().await;

    let summary = complete_summary(&events);
    assert_eq!(summary.summary, "Skill execution completed.");
    assert!(summary.steps.is_empty());
}

#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
}

impl RunObserver for Recorder {
    fn on_execution_created(&mut self, _record_id: Uuid) {
        self.calls.push("created".into());
    }

    fn on_step(&mut self, step: &Step) {
        self.calls.push(format!("step:{}", step.index));
    }

    fn on_live_view(&mut self, _url: &str) {
        self.calls.push("live_view".into());
    }

    fn on_sub_action(&mut self, _capability: &str, action: &SubAction) {
        self.calls.push(format!("sub_action:{}", action.index));
    }

    fn on_complete(&mut self, _summary: &RunSummary) {
        self.calls.push("complete".into());
    }

    fn on_error(&mut self, _record_id: Option<Uuid>, message: &str) {
        self.calls.push(format!("error:{}", message));
    }
}

/// Shares the recorded hook calls with the test after fan-out.
struct Shared(Arc<std::sync::Mutex<Recorder>>);

impl RunObserver for Shared {
    fn on_execution_created(&mut self, record_id: Uuid) {
        self.0.lock().unwrap().on_execution_created(record_id);
    }

    fn on_step(&mut self, step: &Step) {
        self.0.lock().unwrap().on_step(step);
    }

    fn on_live_view(&mut self, url: &str) {
        self.0.lock().unwrap().on_live_view(url);
    }

    fn on_sub_action(&mut self, capability: &str, action: &SubAction) {
        self.0.lock().unwrap().on_sub_action(capability, action);
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        self.0.lock().unwrap().on_complete(summary);
    }

    fn on_error(&mut self, record_id: Option<Uuid>, message: &str) {
        self.0.lock().unwrap().on_error(record_id, message);
    }
}

#[tokio::test]
async fn observers_see_hooks_in_event_order() {
    let store = Arc::new(InMemoryRecordStore::new());
    let model = scripted(vec![
        ScriptTurn::call("live_browse", json!({"url": "https://example.com"})),
        ScriptTurn::text("Done."),
    ]);
    let engine = engine(store, model, EngineConfig::default());

    let recorder = Arc::new(std::sync::Mutex::new(Recorder::default()));
    let mut observers: Vec<Box<dyn RunObserver>> = vec![
        Box::new(TracingObserver::new()),
        Box::new(Shared(recorder.clone())),
    ];

    let terminal = engine
        .spawn(task(&["live_browse"], 3), ctx_with_msg("x"))
        .observe(&mut observers)
        .await;

    assert!(matches!(terminal, Some(RunEvent::Complete { .. })));
    let calls = recorder.lock().unwrap().calls.clone();
    assert_eq!(
        calls,
        vec![
            "created",
            "sub_action:1",
            "sub_action:2",
            "step:1",
            "live_view",
            "step:2",
            "complete"
        ]
    );
}

#[tokio::test]
async fn concurrent_runs_are_isolated() {
    let store = Arc::new(InMemoryRecordStore::new());
    let engine = engine(store.clone(), scripted(echo_turns()), EngineConfig::default());

    let handles: Vec<_> = (0..8)
        .map(|i| engine.spawn(task(&["echo"], 3), ctx_with_msg(&format!("m{}", i))))
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let events = handle.collect().await;
        let summary = complete_summary(&events);
        assert_eq!(summary.steps.len(), 2);
        ids.push(summary.record_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(store.list_for_task("echo-task", 100).await.unwrap().len(), 8);
}
