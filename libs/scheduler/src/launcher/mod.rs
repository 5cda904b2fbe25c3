//! Per-application launchers.
//!
//! One launcher owns one app's launch intent: how many instances still
//! need launching, the app's live task view, the in-flight ledger, and the
//! backoff state. Launchers subscribe to the offer-matcher manager exactly
//! while they want offers.

mod actor;

pub use actor::{AppLauncher, LauncherDeps};

use std::sync::Arc;

use armada_events::TaskStatusUpdate;
use armada_id::TaskId;
use tokio::sync::oneshot;

use crate::app::App;
use crate::backoff::DelayUpdate;
use crate::clock::Timestamp;
use crate::matcher::TaskWithSource;
use crate::offer::Offer;

/// Rejection reason synthesized when the driver never acknowledged a
/// handed-out task within the notification timeout.
pub const LAUNCH_NOTIFICATION_TIMEOUT: &str = "launch-notification-timeout";

/// Messages handled by a launcher.
pub enum LauncherMsg {
    /// Poll for one task against the offer; must answer `None` at or past
    /// the deadline.
    MatchOffer {
        deadline: Timestamp,
        offer: Offer,
        reply: oneshot::Sender<Option<TaskWithSource>>,
    },

    /// Enqueue `count` more launches for (a possibly updated) `app`.
    AddInstances {
        app: Arc<App>,
        count: u32,
        reply: oneshot::Sender<QueuedTaskCount>,
    },

    /// Snapshot the launcher's counters.
    GetCount {
        reply: oneshot::Sender<QueuedTaskCount>,
    },

    /// The driver took the task.
    LaunchAccepted { task_id: TaskId },

    /// The task will not launch; `reason` explains why.
    LaunchRejected { task_id: TaskId, reason: String },

    /// A task status update from the event bus.
    Status(TaskStatusUpdate),

    /// The rate limiter's current deadline for this app.
    DelayUpdate(DelayUpdate),

    /// The backoff deadline may have been reached; re-evaluate matching.
    RecheckBackoff,

    /// Stop after draining in-flight launches.
    Stop,
}

/// Snapshot of one launcher's counters.
#[derive(Debug, Clone)]
pub struct QueuedTaskCount {
    /// The app definition the launcher currently works for.
    pub app: Arc<App>,

    /// Launches still waiting for an offer.
    pub tasks_left_to_launch: u32,

    /// Matched tasks the driver has not yet acknowledged.
    pub task_launches_in_flight: u32,

    /// Tasks past the in-flight stage: launched or running.
    pub tasks_launched_or_running: u32,

    /// Backoff deadline, if one is known.
    pub backoff_until: Option<Timestamp>,
}
