//! Task creation from offers.
//!
//! The factory is the pipeline's placement seam: given an app, an offer,
//! and the app's current tasks, it either carves a launchable task out of
//! the offer or declines. Constraint evaluation and resource carving live
//! here so launchers stay oblivious to placement rules.

use std::sync::Arc;

use armada_events::TaskState;
use armada_id::TaskId;
use tracing::trace;

use crate::app::{App, Constraint, Operator};
use crate::clock::Clock;
use crate::offer::Offer;
use crate::task::{LaunchSpec, Task};

/// A matched task: the driver-facing launch spec and the record to persist.
#[derive(Debug, Clone)]
pub struct TaskCreation {
    pub spec: LaunchSpec,
    pub task: Task,
}

/// Decides whether an app can consume an offer.
pub trait TaskFactory: Send + Sync {
    /// Carves one task out of the offer, or declines.
    ///
    /// `running` is the app's current task view, including tasks matched
    /// earlier in the same round; implementations must take it into account
    /// so constraints hold across a round.
    fn new_task(&self, app: &App, offer: &Offer, running: &[Task]) -> Option<TaskCreation>;
}

/// Default factory: resource sufficiency plus constraint evaluation.
pub struct AppTaskFactory {
    clock: Arc<dyn Clock>,
}

impl AppTaskFactory {
    /// Creates the factory; the clock stamps `staged_at` on new records.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl TaskFactory for AppTaskFactory {
    fn new_task(&self, app: &App, offer: &Offer, running: &[Task]) -> Option<TaskCreation> {
        if !offer.resources.can_satisfy(&app.resources) {
            trace!(app_id = %app.id, offer_id = %offer.id, "Offer resources insufficient");
            return None;
        }

        for constraint in &app.constraints {
            if !constraint_holds(constraint, offer, running) {
                trace!(
                    app_id = %app.id,
                    offer_id = %offer.id,
                    field = %constraint.field,
                    "Constraint not satisfiable on this offer"
                );
                return None;
            }
        }

        let task_id = TaskId::for_app(&app.id);
        let task = Task {
            id: task_id.clone(),
            app_id: app.id.clone(),
            version: app.version,
            state: TaskState::Staging,
            staged_at: Some(self.clock.now()),
            host: offer.hostname.clone(),
            agent_id: offer.agent_id.clone(),
            attributes: offer.attributes.clone(),
            status_message: None,
        };
        let spec = LaunchSpec {
            task_id,
            app_id: app.id.clone(),
            cmd: app.cmd.clone(),
            resources: app.resources,
            hostname: offer.hostname.clone(),
            agent_id: offer.agent_id.clone(),
        };

        Some(TaskCreation { spec, task })
    }
}

/// Evaluates one constraint against the offer and the tasks already placed.
fn constraint_holds(constraint: &Constraint, offer: &Offer, running: &[Task]) -> bool {
    let Some(value) = offer.field_value(&constraint.field) else {
        // An offer that does not carry the field can never satisfy it.
        return false;
    };

    match &constraint.operator {
        Operator::Unique => running
            .iter()
            .all(|task| task.field_value(&constraint.field) != Some(value)),

        Operator::Cluster(Some(pinned)) => value == pinned,

        Operator::Cluster(None) => {
            match running
                .iter()
                .find_map(|task| task.field_value(&constraint.field))
            {
                Some(existing) => value == existing,
                None => true,
            }
        }
    }
}
