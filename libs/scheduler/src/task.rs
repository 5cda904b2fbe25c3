//! Task records and launch specifications.

use std::collections::BTreeMap;

use armada_events::{TaskState, TaskStatusUpdate};
use armada_id::{AgentId, AppId, TaskId};
use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::offer::Resources;

/// One live or persisted task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Globally unique, app-embedded identifier.
    pub id: TaskId,

    /// Owning application.
    pub app_id: AppId,

    /// The app definition version this task was launched for.
    pub version: Timestamp,

    /// Last observed state.
    pub state: TaskState,

    /// When the task was handed to the driver, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged_at: Option<Timestamp>,

    /// Hostname of the node the task was placed on.
    pub host: String,

    /// Agent the task was placed on.
    pub agent_id: AgentId,

    /// Attributes of the node the task was placed on, snapshotted from the
    /// offer; placement constraints compare against these.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Last status diagnostic from the master, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Task {
    /// Applies a non-terminal status update in place.
    pub fn apply_status(&mut self, update: &TaskStatusUpdate) {
        self.state = update.state;
        self.status_message = update.message.clone();
    }

    /// True while the task has not reached a terminal state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Value of a constraint field as recorded at placement time: the host
    /// the task runs on, or one of its node's attributes.
    #[must_use]
    pub fn field_value(&self, field: &str) -> Option<&str> {
        if field == crate::app::Constraint::HOSTNAME {
            Some(&self.host)
        } else {
            self.attributes.get(field).map(String::as_str)
        }
    }
}

/// Everything the driver needs to start one task on an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub task_id: TaskId,
    pub app_id: AppId,
    pub cmd: String,
    pub resources: Resources,
    pub hostname: String,
    pub agent_id: AgentId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_status() {
        let app_id = AppId::parse("/prod/web").unwrap();
        let mut task = Task {
            id: TaskId::for_app(&app_id),
            app_id,
            version: Timestamp::from_millis(1),
            state: TaskState::Staging,
            staged_at: Some(Timestamp::from_millis(1)),
            host: "node-a".to_string(),
            agent_id: AgentId::new("agent-1"),
            attributes: BTreeMap::new(),
            status_message: None,
        };
        assert!(task.is_active());

        let update =
            TaskStatusUpdate::new(task.id.clone(), TaskState::Running).with_message("healthy");
        task.apply_status(&update);

        assert_eq!(task.state, TaskState::Running);
        assert_eq!(task.status_message.as_deref(), Some("healthy"));

        task.apply_status(&TaskStatusUpdate::new(task.id.clone(), TaskState::Failed));
        assert!(!task.is_active());
    }

    #[test]
    fn test_task_serde_roundtrip() {
        let app_id = AppId::parse("/prod/web").unwrap();
        let task = Task {
            id: TaskId::for_app(&app_id),
            app_id,
            version: Timestamp::from_millis(42),
            state: TaskState::Running,
            staged_at: None,
            host: "node-a".to_string(),
            agent_id: AgentId::new("agent-1"),
            attributes: BTreeMap::new(),
            status_message: None,
        };

        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
