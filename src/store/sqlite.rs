//! SQLite record store.
//!
//! Each record is kept as one JSON document with its lookup columns
//! alongside. Patches are read-modify-write inside a transaction so the
//! record invariants hold under concurrent writers.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::RecordStore;
use crate::run::{ExecutionRecord, NewExecutionRecord, RecordPatch};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS execution_records (
  id TEXT PRIMARY KEY,
  task_id TEXT NOT NULL,
  tenant_id TEXT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('running', 'completed', 'failed')),
  started_at TEXT NOT NULL,
  completed_at TEXT,
  record_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_execution_records_task_started
  ON execution_records(task_id, started_at DESC);
";

#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run blocking SQLite work off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, String> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| "record store connection poisoned".to_string())?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| format!("record store task failed: {}", e))?
    }
}

fn encode(record: &ExecutionRecord) -> Result<String, String> {
    serde_json::to_string(record).map_err(|e| format!("Failed to encode record: {}", e))
}

fn decode(json: &str) -> Result<ExecutionRecord, String> {
    serde_json::from_str(json).map_err(|e| format!("Failed to decode record: {}", e))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn create(&self, record: NewExecutionRecord) -> Result<Uuid, String> {
        let id = Uuid::new_v4();
        let record = record.into_record(id);
        let json = encode(&record)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO execution_records (id, task_id, tenant_id, status, started_at, completed_at, record_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
                params![
                    id.to_string(),
                    record.task_id,
                    record.tenant_id,
                    record.status.as_str(),
                    record.started_at.to_rfc3339(),
                    json
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(id)
        })
        .await
    }

    async fn patch(&self, id: Uuid, patch: RecordPatch) -> Result<(), String> {
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(|e| e.to_string())?;
            let json: Option<String> = tx
                .query_row(
                    "SELECT record_json FROM execution_records WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| e.to_string())?;
            let json = json.ok_or_else(|| format!("Record {} not found", id))?;

            let mut record = decode(&json)?;
            record.apply_patch(patch)?;

            tx.execute(
                "UPDATE execution_records
                 SET status = ?2, completed_at = ?3, record_json = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    record.status.as_str(),
                    record.completed_at.map(|t| t.to_rfc3339()),
                    encode(&record)?
                ],
            )
            .map_err(|e| e.to_string())?;
            tx.commit().map_err(|e| e.to_string())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>, String> {
        self.with_conn(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT record_json FROM execution_records WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| e.to_string())?;
            json.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn list_for_task(&self, task_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>, String> {
        let task_id = task_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT record_json FROM execution_records
                     WHERE task_id = ?1
                     ORDER BY started_at DESC
                     LIMIT ?2",
                )
                .map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map(params![task_id, limit as i64], |row| row.get::<_, String>(0))
                .map_err(|e| e.to_string())?;

            let mut records = Vec::new();
            for row in rows {
                let json = row.map_err(|e| e.to_string())?;
                records.push(decode(&json)?);
            }
            Ok(records)
        })
        .await
    }
}
