//! Execution record storage.
//!
//! The engine needs only `create` and `patch`; `get` and `list_for_task`
//! serve callers reading the audit trail back. Errors are plain strings:
//! the engine logs them and carries on.

mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::run::{ExecutionRecord, NewExecutionRecord, RecordPatch};

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Store for execution records.
///
/// Implementations must accept concurrent creates and per-record patches
/// without locking across records. Once a record carries a terminal status,
/// a second finalising patch is rejected.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether records survive a process restart.
    fn is_persistent(&self) -> bool;

    /// Insert a new running record and return its id.
    async fn create(&self, record: NewExecutionRecord) -> Result<Uuid, String>;

    async fn patch(&self, id: Uuid, patch: RecordPatch) -> Result<(), String>;

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>, String>;

    /// Most recent records of a task, newest first.
    async fn list_for_task(&self, task_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>, String>;
}

pub type SharedRecordStore = Arc<dyn RecordStore>;

/// Mark a run as stopped from outside the engine.
///
/// This only overwrites the record. The engine's own finalisation is then
/// rejected by the store, but a capability call already in flight may still
/// land as a step.
pub async fn request_stop(store: &dyn RecordStore, id: Uuid, reason: &str) -> Result<(), String> {
    store.patch(id, RecordPatch::stopped(reason)).await
}

/// Open the store selected by configuration: SQLite when a database path is
/// set, in-memory otherwise.
pub fn open_store(config: &EngineConfig) -> anyhow::Result<SharedRecordStore> {
    match &config.database_path {
        Some(path) => {
            let store = SqliteRecordStore::open(path)?;
            tracing::info!("Execution records persisted to {}", path.display());
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("Execution records kept in memory");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
    }
}
