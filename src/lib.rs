//! # Task Engine
//!
//! A bounded, observable, auditable execution engine for AI agent and
//! skill runs.
//!
//! This library provides:
//! - Static task definitions loaded from a YAML catalogue
//! - An explicit capability registry with per-run resolution
//! - A generic execution loop over a pluggable model service
//! - A single ordered event channel per run, with callback-style observers
//! - Execution records kept in memory or in SQLite
//!
//! ## Architecture
//!
//! One run follows the same path for every task kind:
//! 1. Create the execution record and announce its id
//! 2. Assemble the four-layer prompt and resolve capabilities
//! 3. Open a bounded session with the model service
//! 4. Turn every model round into indexed steps, announced live and persisted in the background
//! 5. Finalise the record, then emit exactly one `Complete` or `Error` event
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use task_engine::{CapabilityRegistry, Engine, EngineConfig, ExecutionContext, TaskDefinition};
//! use task_engine::llm::{Script, ScriptTurn, ScriptedModelService};
//! use task_engine::store::InMemoryRecordStore;
//!
//! let engine = Engine::new(
//!     Arc::new(CapabilityRegistry::with_builtins()),
//!     Arc::new(ScriptedModelService::new(Script::new(vec![ScriptTurn::text("pong")]))),
//!     Arc::new(InMemoryRecordStore::new()),
//!     EngineConfig::from_env()?,
//! );
//! let task = Arc::new(TaskDefinition::new("ping", "Ping", "Say pong."));
//! let events = engine.spawn(task, ExecutionContext::new("tenant", "user")).collect().await;
//! ```

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod run;
pub mod store;
pub mod task;

pub use capability::{CapabilityRegistry, CapabilitySet};
pub use config::EngineConfig;
pub use engine::{Engine, RunHandle};
pub use error::EngineError;
pub use run::{RunEvent, RunObserver};
pub use task::{ExecutionContext, TaskDefinition};
