//! Task state and status-update definitions.

use armada_id::{AgentId, AppId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Type Constants
// =============================================================================

/// Task lifecycle event names, used as structured-log fields.
pub mod event_types {
    pub const TASK_STAGED: &str = "task.staged";
    pub const TASK_RUNNING: &str = "task.running";
    pub const TASK_FINISHED: &str = "task.finished";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_KILLED: &str = "task.killed";
    pub const TASK_LOST: &str = "task.lost";

    pub const TASK_LAUNCH_ACCEPTED: &str = "task.launch_accepted";
    pub const TASK_LAUNCH_REJECTED: &str = "task.launch_rejected";
}

// =============================================================================
// Task State
// =============================================================================

/// Observed state of a task, as reported by the resource master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Launched, not yet confirmed running.
    Staging,
    /// Running on its agent.
    Running,
    /// Exited with success.
    Finished,
    /// Exited with failure.
    Failed,
    /// Killed on request.
    Killed,
    /// The master lost track of the task.
    Lost,
}

impl TaskState {
    /// Returns true if this state ends the task's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Lost
        )
    }

    /// The event-type name for this state.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Staging => event_types::TASK_STAGED,
            Self::Running => event_types::TASK_RUNNING,
            Self::Finished => event_types::TASK_FINISHED,
            Self::Failed => event_types::TASK_FAILED,
            Self::Killed => event_types::TASK_KILLED,
            Self::Lost => event_types::TASK_LOST,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Staging => "staging",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Lost => "lost",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Status Updates
// =============================================================================

/// Classification of a status update for consumers that only care whether
/// the task is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Terminal(TaskState),
    NonTerminal(TaskState),
}

/// One item of the driver's task-status stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusUpdate {
    /// The task this update refers to.
    pub task_id: TaskId,

    /// Observed state.
    pub state: TaskState,

    /// Free-form reason or diagnostic from the master, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Agent the task ran on, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,

    /// When the update was observed.
    pub timestamp: DateTime<Utc>,
}

impl TaskStatusUpdate {
    /// Creates an update observed now.
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
            agent_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches a diagnostic message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches the reporting agent.
    #[must_use]
    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// The app this update belongs to, recovered from the task ID.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        self.task_id.app_id()
    }

    /// Classifies the update as terminal or non-terminal.
    #[must_use]
    pub fn classify(&self) -> StatusClass {
        if self.state.is_terminal() {
            StatusClass::Terminal(self.state)
        } else {
            StatusClass::NonTerminal(self.state)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!TaskState::Staging.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Finished.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Killed.is_terminal());
        assert!(TaskState::Lost.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskState::Staging).unwrap(),
            "\"staging\""
        );
        assert_eq!(serde_json::to_string(&TaskState::Lost).unwrap(), "\"lost\"");
    }

    #[test]
    fn test_update_classify_and_app_recovery() {
        let app = AppId::parse("/prod/web").unwrap();
        let task_id = TaskId::for_app(&app);

        let update = TaskStatusUpdate::new(task_id.clone(), TaskState::Failed)
            .with_message("container exited 137");

        assert_eq!(update.app_id(), app);
        assert_eq!(update.classify(), StatusClass::Terminal(TaskState::Failed));

        let running = TaskStatusUpdate::new(task_id, TaskState::Running);
        assert_eq!(
            running.classify(),
            StatusClass::NonTerminal(TaskState::Running)
        );
    }

    #[test]
    fn test_update_serde_roundtrip() {
        let app = AppId::parse("/prod/web").unwrap();
        let update = TaskStatusUpdate::new(TaskId::for_app(&app), TaskState::Running)
            .with_agent(AgentId::new("agent-7"));

        let json = serde_json::to_string(&update).unwrap();
        let back: TaskStatusUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, update.task_id);
        assert_eq!(back.state, TaskState::Running);
        assert_eq!(back.agent_id, Some(AgentId::new("agent-7")));
    }
}
