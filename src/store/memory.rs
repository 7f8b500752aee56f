//! In-memory record store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::RecordStore;
use crate::run::{ExecutionRecord, NewExecutionRecord, RecordPatch};

#[derive(Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<HashMap<Uuid, ExecutionRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn create(&self, record: NewExecutionRecord) -> Result<Uuid, String> {
        let id = Uuid::new_v4();
        self.records.write().await.insert(id, record.into_record(id));
        Ok(id)
    }

    async fn patch(&self, id: Uuid, patch: RecordPatch) -> Result<(), String> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| format!("Record {} not found", id))?;
        record.apply_patch(patch)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>, String> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_for_task(&self, task_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>, String> {
        let mut records: Vec<ExecutionRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records.truncate(limit);
        Ok(records)
    }
}
