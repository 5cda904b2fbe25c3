//! Durable task persistence.
//!
//! Storage is asynchronous key-value: one entry per task, keyed by task id,
//! value is the serialized task record. No cross-task transactions. The
//! offer processor serializes writes per task id; writes for distinct ids
//! are independent.

mod store;

pub use store::SqliteTaskStore;

use std::collections::HashMap;
use std::sync::Mutex;

use armada_id::TaskId;
use async_trait::async_trait;
use thiserror::Error;

use crate::task::Task;

/// Errors from the storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite-level failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Task payload could not be (de)serialized.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// The backend failed for another reason.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Asynchronous key-value store for task records.
#[async_trait]
pub trait TaskStorage: Send + Sync {
    /// Durably writes or overwrites one task record.
    async fn put(&self, task: &Task) -> Result<(), StorageError>;

    /// Durably deletes one task record; absent ids are not an error.
    async fn remove(&self, task_id: &TaskId) -> Result<(), StorageError>;

    /// Loads every stored task record, for startup recovery.
    async fn load_all(&self) -> Result<Vec<Task>, StorageError>;
}

/// HashMap-backed storage for tests and embedded runs.
#[derive(Default)]
pub struct InMemoryTaskStorage {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// True if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the given task is stored.
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.tasks
            .lock()
            .map(|t| t.contains_key(task_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl TaskStorage for InMemoryTaskStorage {
    async fn put(&self, task: &Task) -> Result<(), StorageError> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| StorageError::Backend("storage mutex poisoned".to_string()))?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn remove(&self, task_id: &TaskId) -> Result<(), StorageError> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| StorageError::Backend("storage mutex poisoned".to_string()))?;
        tasks.remove(task_id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Task>, StorageError> {
        let tasks = self
            .tasks
            .lock()
            .map_err(|_| StorageError::Backend("storage mutex poisoned".to_string()))?;
        Ok(tasks.values().cloned().collect())
    }
}
