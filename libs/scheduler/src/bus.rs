//! Per-app broadcast of task status updates.
//!
//! Launchers subscribe for their own app and receive every update for it;
//! updates for apps without subscribers are dropped, the system operates
//! fine without observers. Channels are unbounded so a busy launcher never
//! loses a terminal update.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use armada_events::TaskStatusUpdate;
use armada_id::AppId;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Routes task status updates to per-app subscribers.
#[derive(Default)]
pub struct StatusEventBus {
    subscribers: Mutex<HashMap<AppId, Vec<mpsc::UnboundedSender<TaskStatusUpdate>>>>,
}

impl StatusEventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future updates of one app.
    pub fn subscribe(&self, app_id: AppId) -> mpsc::UnboundedReceiver<TaskStatusUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.entry(app_id).or_default().push(tx);
        rx
    }

    /// Publishes one update to the owning app's subscribers, pruning
    /// subscribers that have gone away.
    pub fn publish(&self, update: TaskStatusUpdate) {
        let app_id = update.app_id();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(senders) = subscribers.get_mut(&app_id) else {
            trace!(task_id = %update.task_id, "Dropping status update, no subscribers");
            return;
        };

        senders.retain(|tx| tx.send(update.clone()).is_ok());
        if senders.is_empty() {
            subscribers.remove(&app_id);
            debug!(app_id = %app_id, "Last status subscriber gone");
        }
    }

    /// Number of live subscriptions for an app (for introspection).
    pub fn subscriber_count(&self, app_id: &AppId) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(app_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
