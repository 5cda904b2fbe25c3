//! Offer matching.
//!
//! One inbound offer is multiplexed across the launchers that currently
//! want offers. The [`OfferMatcher`] trait is the seam the offer processor
//! sees; the [`manager`] submodule implements it by polling subscribed
//! launchers sequentially within a deadline.

mod manager;

pub use manager::{MatcherManagerHandle, MatcherMsg, OfferMatcherManager};

use armada_id::{OfferId, TaskId};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::actors::ActorHandle;
use crate::clock::Timestamp;
use crate::launcher::LauncherMsg;
use crate::offer::Offer;
use crate::task::{LaunchSpec, Task};

/// Errors from offer matching.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The matcher went away before answering.
    #[error("offer matcher unavailable")]
    Unavailable,
}

/// Matches one offer against current launch intent.
#[async_trait]
pub trait OfferMatcher: Send + Sync {
    /// Matches the offer, never answering later than `deadline` allows.
    async fn match_offer(
        &self,
        deadline: Timestamp,
        offer: Offer,
    ) -> Result<MatchedTasks, MatchError>;
}

/// Aggregated result of one match round.
#[derive(Debug)]
pub struct MatchedTasks {
    /// The offer the round ran against.
    pub offer_id: OfferId,

    /// Matched tasks in match order.
    pub tasks: Vec<TaskWithSource>,

    /// True if the round ended before every subscriber was polled, so the
    /// master should re-send the remainder soon.
    pub resend_this_offer: bool,
}

impl MatchedTasks {
    /// A round that matched nothing.
    #[must_use]
    pub fn empty(offer_id: OfferId, resend_this_offer: bool) -> Self {
        Self {
            offer_id,
            tasks: Vec::new(),
            resend_this_offer,
        }
    }
}

/// One matched task together with the callback address of the launcher
/// that produced it.
#[derive(Debug)]
pub struct TaskWithSource {
    /// What the driver needs to start the task.
    pub spec: LaunchSpec,

    /// The record to persist before launching.
    pub task: Task,

    /// Where accept/reject notifications go.
    pub source: TaskOpSource,
}

/// Exactly-once accept/reject callback to the originating launcher.
///
/// Both notifications consume the source, so a task can only ever be
/// settled once.
#[derive(Debug)]
pub struct TaskOpSource {
    launcher: ActorHandle<LauncherMsg>,
    task_id: TaskId,
}

impl TaskOpSource {
    /// Creates a source addressed at the given launcher.
    pub fn new(launcher: ActorHandle<LauncherMsg>, task_id: TaskId) -> Self {
        Self { launcher, task_id }
    }

    /// The task this source settles.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Notifies the launcher that the driver took the task.
    pub fn accept(self) {
        self.launcher.send(LauncherMsg::LaunchAccepted {
            task_id: self.task_id,
        });
    }

    /// Notifies the launcher that the task will not launch.
    pub fn reject(self, reason: impl Into<String>) {
        self.launcher.send(LauncherMsg::LaunchRejected {
            task_id: self.task_id,
            reason: reason.into(),
        });
    }
}

/// Callable address of one launcher inside a match round.
#[derive(Clone)]
pub struct LauncherMatchRef {
    handle: ActorHandle<LauncherMsg>,
}

impl LauncherMatchRef {
    /// Wraps a launcher mailbox.
    pub fn new(handle: ActorHandle<LauncherMsg>) -> Self {
        Self { handle }
    }

    /// Polls the launcher for one task; `None` on decline or if the
    /// launcher went away.
    pub async fn match_offer(&self, deadline: Timestamp, offer: Offer) -> Option<TaskWithSource> {
        let (reply, rx) = oneshot::channel();
        self.handle.send(LauncherMsg::MatchOffer {
            deadline,
            offer,
            reply,
        });
        rx.await.ok().flatten()
    }
}
