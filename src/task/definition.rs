//! Immutable task definitions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::context::DynamicContext;
use super::input::InputContract;

/// Family a task belongs to. Only the wording differs between kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Agent,
    Skill,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Agent => "agent",
            TaskKind::Skill => "skill",
        }
    }

    /// Opening phrase of the seed message.
    pub fn seed_lead(&self) -> &'static str {
        match self {
            TaskKind::Agent => "Run this agent",
            TaskKind::Skill => "Execute this skill",
        }
    }

    /// Summary used when a run produced no text step.
    pub fn default_summary(&self) -> &'static str {
        match self {
            TaskKind::Agent => "Agent run completed.",
            TaskKind::Skill => "Skill execution completed.",
        }
    }
}

/// How a task gets started. Descriptive only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Schedule,
    Event,
    #[default]
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Schedule => "schedule",
            TriggerKind::Event => "event",
            TriggerKind::Manual => "manual",
        }
    }
}

/// Human oversight policy. Descriptive only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OversightMode {
    #[default]
    Auto,
    ReviewBefore,
    NotifyAfter,
}

/// Execution bounds. Both values are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskLimits {
    /// Maximum number of capability-call decision rounds
    pub max_steps: u32,
    /// Wall-clock bound for the whole run
    pub max_execution_ms: u64,
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_execution_ms: 300_000,
        }
    }
}

impl TaskLimits {
    pub fn new(max_steps: u32, max_execution_ms: u64) -> Self {
        Self {
            max_steps,
            max_execution_ms,
        }
    }

    pub fn max_execution(&self) -> Duration {
        Duration::from_millis(self.max_execution_ms)
    }

    pub fn is_valid(&self) -> bool {
        self.max_steps > 0 && self.max_execution_ms > 0
    }
}

/// Static description of one runnable task.
#[derive(Clone)]
pub struct TaskDefinition {
    pub id: String,
    pub name: String,
    pub version: String,
    pub kind: TaskKind,
    /// Layer-3 instruction text
    pub prompt: String,
    /// Ordered, duplicate-free capability names
    pub capabilities: Vec<String>,
    pub input: InputContract,
    pub limits: TaskLimits,
    pub trigger: TriggerKind,
    pub oversight: OversightMode,
    /// Layer-4 context producer
    pub dynamic_context: Option<Arc<dyn DynamicContext>>,
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "1".to_string(),
            kind: TaskKind::default(),
            prompt: prompt.into(),
            capabilities: Vec::new(),
            input: InputContract::default(),
            limits: TaskLimits::default(),
            trigger: TriggerKind::default(),
            oversight: OversightMode::default(),
            dynamic_context: None,
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Declare capabilities. Later duplicates of a name are dropped.
    pub fn with_capabilities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut capabilities: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !capabilities.contains(&name) {
                capabilities.push(name);
            }
        }
        self.capabilities = capabilities;
        self
    }

    pub fn with_input(mut self, input: InputContract) -> Self {
        self.input = input;
        self
    }

    pub fn with_limits(mut self, limits: TaskLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_oversight(mut self, oversight: OversightMode) -> Self {
        self.oversight = oversight;
        self
    }

    pub fn with_dynamic_context(mut self, resolver: Arc<dyn DynamicContext>) -> Self {
        self.dynamic_context = Some(resolver);
        self
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("kind", &self.kind)
            .field("capabilities", &self.capabilities)
            .field("limits", &self.limits)
            .field("trigger", &self.trigger)
            .field("oversight", &self.oversight)
            .field("dynamic_context", &self.dynamic_context.is_some())
            .finish()
    }
}
