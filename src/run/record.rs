//! Execution records - the audit entity of one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::Step;
use crate::llm::Usage;
use crate::task::{ExecutionContext, InputMap, TaskDefinition, TaskKind, TriggerKind};

/// Run status. Starts as `Running`; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Final output of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutput {
    Summary { summary: String },
    Error { error: String },
}

/// Fields known when a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExecutionRecord {
    pub task_id: String,
    pub task_version: String,
    pub task_kind: TaskKind,
    pub tenant_id: String,
    pub invoker_id: String,
    pub trigger: TriggerKind,
    pub input: InputMap,
    pub started_at: DateTime<Utc>,
}

impl NewExecutionRecord {
    pub fn for_run(task: &TaskDefinition, ctx: &ExecutionContext) -> Self {
        Self {
            task_id: task.id.clone(),
            task_version: task.version.clone(),
            task_kind: task.kind,
            tenant_id: ctx.tenant_id.clone(),
            invoker_id: ctx.invoker_id.clone(),
            trigger: task.trigger,
            input: ctx.input.clone(),
            started_at: Utc::now(),
        }
    }

    pub fn into_record(self, id: Uuid) -> ExecutionRecord {
        ExecutionRecord {
            id,
            task_id: self.task_id,
            task_version: self.task_version,
            task_kind: self.task_kind,
            tenant_id: self.tenant_id,
            invoker_id: self.invoker_id,
            trigger: self.trigger,
            input: self.input,
            status: RunStatus::Running,
            steps: Vec::new(),
            output: None,
            usage: None,
            model: None,
            prompt_sha256: None,
            duration_ms: None,
            started_at: self.started_at,
            completed_at: None,
        }
    }
}

/// Durable audit row for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub task_id: String,
    pub task_version: String,
    pub task_kind: TaskKind,
    pub tenant_id: String,
    pub invoker_id: String,
    pub trigger: TriggerKind,
    pub input: InputMap,
    pub status: RunStatus,
    pub steps: Vec<Step>,
    pub output: Option<RunOutput>,
    pub usage: Option<Usage>,
    pub model: Option<String>,
    pub prompt_sha256: Option<String>,
    pub duration_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Apply a partial update.
    ///
    /// A terminal status can be set once. After that the record only
    /// accepts step-only patches; anything else is rejected. The step list
    /// only ever grows, so a stale snapshot never shrinks it.
    pub fn apply_patch(&mut self, patch: RecordPatch) -> Result<(), String> {
        if self.status.is_terminal() {
            if patch.is_finalising() {
                return Err(format!("record {} is already finalised", self.id));
            }
            if !patch.is_steps_only() {
                return Err(format!(
                    "record {} is finalised; only step updates are accepted",
                    self.id
                ));
            }
        }
        if let Some(steps) = patch.steps {
            if steps.len() >= self.steps.len() {
                self.steps = steps;
            }
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(output) = patch.output {
            self.output = Some(output);
        }
        if let Some(usage) = patch.usage {
            self.usage = Some(usage);
        }
        if let Some(model) = patch.model {
            self.model = Some(model);
        }
        if let Some(digest) = patch.prompt_sha256 {
            self.prompt_sha256 = Some(digest);
        }
        if let Some(duration_ms) = patch.duration_ms {
            self.duration_ms = Some(duration_ms);
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = Some(completed_at);
        }
        Ok(())
    }

    pub fn error(&self) -> Option<&str> {
        match &self.output {
            Some(RunOutput::Error { error }) => Some(error),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match &self.output {
            Some(RunOutput::Summary { summary }) => Some(summary),
            _ => None,
        }
    }
}

/// Partial update of an execution record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub status: Option<RunStatus>,
    pub steps: Option<Vec<Step>>,
    pub output: Option<RunOutput>,
    pub usage: Option<Usage>,
    pub model: Option<String>,
    pub prompt_sha256: Option<String>,
    pub duration_ms: Option<u64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn steps(steps: Vec<Step>) -> Self {
        Self {
            steps: Some(steps),
            ..Self::default()
        }
    }

    /// External status overwrite used to stop a run from outside the engine.
    pub fn stopped(reason: &str) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            output: Some(RunOutput::Error {
                error: reason.to_string(),
            }),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn is_finalising(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }

    /// True when the patch touches nothing but the step list.
    pub fn is_steps_only(&self) -> bool {
        self.status.is_none()
            && self.output.is_none()
            && self.usage.is_none()
            && self.model.is_none()
            && self.prompt_sha256.is_none()
            && self.duration_ms.is_none()
            && self.completed_at.is_none()
    }
}
