//! SQLite-backed task store.
//!
//! One row per task, keyed by task id, with the serialized record as a JSON
//! payload column. Writes go through `spawn_blocking` so storage latency
//! never stalls an actor thread.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use armada_id::TaskId;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::debug;

use super::{StorageError, TaskStorage};
use crate::task::Task;

/// SQLite task store.
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Opens or creates a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;

        // WAL keeps readers unblocked while the processor writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_app_id ON tasks(app_id);
            "#,
        )?;

        debug!("Task store schema initialized");
        Ok(())
    }
}

fn lock(conn: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>, StorageError> {
    conn.lock()
        .map_err(|_| StorageError::Backend("connection mutex poisoned".to_string()))
}

#[async_trait]
impl TaskStorage for SqliteTaskStore {
    async fn put(&self, task: &Task) -> Result<(), StorageError> {
        let conn = Arc::clone(&self.conn);
        let task_id = task.id.to_string();
        let app_id = task.app_id.to_string();
        let payload = serde_json::to_string(task)?;
        let now = chrono::Utc::now().timestamp();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                r#"
                INSERT INTO tasks (task_id, app_id, payload, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(task_id) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at
                "#,
                params![task_id, app_id, payload, now],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn remove(&self, task_id: &TaskId) -> Result<(), StorageError> {
        let conn = Arc::clone(&self.conn);
        let task_id = task_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![task_id])?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn load_all(&self) -> Result<Vec<Task>, StorageError> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare("SELECT payload FROM tasks ORDER BY task_id")?;

            let payloads = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            payloads
                .iter()
                .map(|p| serde_json::from_str(p).map_err(StorageError::from))
                .collect()
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }
}
