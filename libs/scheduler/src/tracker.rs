//! Authoritative in-memory view of live tasks, backed by durable storage.
//!
//! `created` is a synchronous in-memory add; `store` and `terminated` touch
//! the storage backend. A task present in the tracker is either durably
//! persisted or currently being persisted by the offer processor; rollback
//! removes both sides. Callers must serialize `store`/`terminated` for the
//! same task id (the offer processor does); distinct ids are independent.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use armada_id::{AppId, TaskId};
use tracing::debug;

use crate::state::{StorageError, TaskStorage};
use crate::task::Task;

type AppTasks = HashMap<AppId, HashMap<TaskId, Task>>;

/// Tracks live tasks per application.
pub struct TaskTracker {
    storage: Arc<dyn TaskStorage>,
    apps: RwLock<AppTasks>,
}

impl TaskTracker {
    /// Creates a tracker over the given storage backend.
    pub fn new(storage: Arc<dyn TaskStorage>) -> Self {
        Self {
            storage,
            apps: RwLock::new(HashMap::new()),
        }
    }

    // The in-memory guard never crosses an await; poisoning can only come
    // from a panicked writer, whose partial state is still a valid map.
    fn read(&self) -> RwLockReadGuard<'_, AppTasks> {
        self.apps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppTasks> {
        self.apps.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a task to the in-memory view, before it is durably stored.
    pub fn created(&self, task: Task) {
        debug!(task_id = %task.id, app_id = %task.app_id, "Task created in tracker");
        self.write()
            .entry(task.app_id.clone())
            .or_default()
            .insert(task.id.clone(), task);
    }

    /// Durably writes the task record.
    pub async fn store(&self, task: &Task) -> Result<(), StorageError> {
        self.storage.put(task).await
    }

    /// Durably deletes the task record, then drops it from the in-memory
    /// view. Used both for terminal status updates and for rollback.
    pub async fn terminated(&self, app_id: &AppId, task_id: &TaskId) -> Result<(), StorageError> {
        self.storage.remove(task_id).await?;

        let mut apps = self.write();
        if let Some(tasks) = apps.get_mut(app_id) {
            tasks.remove(task_id);
            if tasks.is_empty() {
                apps.remove(app_id);
            }
        }
        debug!(task_id = %task_id, app_id = %app_id, "Task removed from tracker");
        Ok(())
    }

    /// Current in-memory tasks of an app.
    pub fn tasks_for(&self, app_id: &AppId) -> Vec<Task> {
        self.read()
            .get(app_id)
            .map(|tasks| tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// True if the app has any tracked task.
    pub fn contains(&self, app_id: &AppId) -> bool {
        self.read().get(app_id).is_some_and(|t| !t.is_empty())
    }

    /// Number of tracked tasks of an app.
    pub fn count(&self, app_id: &AppId) -> usize {
        self.read().get(app_id).map(HashMap::len).unwrap_or(0)
    }

    /// Repopulates the in-memory view from storage; returns how many task
    /// records were loaded.
    pub async fn recover(&self) -> Result<usize, StorageError> {
        let tasks = self.storage.load_all().await?;
        let count = tasks.len();

        let mut apps = self.write();
        apps.clear();
        for task in tasks {
            apps.entry(task.app_id.clone())
                .or_default()
                .insert(task.id.clone(), task);
        }
        debug!(count, "Recovered tasks from storage");
        Ok(count)
    }
}
