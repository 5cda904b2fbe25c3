//! Per-application launch rate limiting.
//!
//! The rate limiter keeps one exponential-backoff ledger entry per app and
//! answers `GetDelay` by pushing a [`DelayUpdate`] onto its update channel;
//! the launch queue routes those updates to the owning launcher. Entries
//! whose deadline has passed are swept periodically, which also forgets the
//! attempt count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use armada_id::AppId;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::actors::{schedule_send, Actor, ActorContext, ActorHandle, ActorRef, Flow};
use crate::app::{App, BackoffSettings};
use crate::clock::{Clock, Timestamp};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

/// Notification that an app's backoff deadline changed (or was queried).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayUpdate {
    pub app_id: AppId,
    pub until: Timestamp,
}

/// Messages handled by the rate limiter.
pub enum RateLimiterMsg {
    /// Answer with the app's current deadline via the update channel.
    GetDelay(Arc<App>),

    /// Record a failed launch: grow the delay and push the new deadline.
    AddDelay(Arc<App>),

    /// Forget the app's delay and push a cleared deadline.
    ResetDelay(AppId),

    /// Periodic sweep of overdue entries.
    CleanupOverdue,
}

/// The current backoff duration for the given consecutive-failure count.
fn backoff_delay(settings: &BackoffSettings, attempts: u32) -> Duration {
    let delay = settings.initial.as_secs_f64() * settings.factor.powi(attempts as i32);
    Duration::from_secs_f64(delay.min(settings.max.as_secs_f64()))
}

struct DelayEntry {
    attempts: u32,
    until: Timestamp,
}

/// Rate limiter actor state.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    delays: HashMap<AppId, DelayEntry>,
    updates: mpsc::UnboundedSender<DelayUpdate>,
}

impl RateLimiter {
    /// Creates the rate limiter; `updates` receives every deadline change.
    pub fn new(clock: Arc<dyn Clock>, updates: mpsc::UnboundedSender<DelayUpdate>) -> Self {
        Self {
            clock,
            delays: HashMap::new(),
            updates,
        }
    }

    fn push_update(&self, app_id: AppId, until: Timestamp) {
        let _ = self.updates.send(DelayUpdate { app_id, until });
    }

    fn current_deadline(&self, app_id: &AppId) -> Timestamp {
        self.delays
            .get(app_id)
            .map(|entry| entry.until)
            .unwrap_or_else(|| self.clock.now())
    }
}

#[async_trait]
impl Actor for RateLimiter {
    type Message = RateLimiterMsg;

    fn name(&self) -> &str {
        "rate-limiter"
    }

    async fn on_start(&mut self, ctx: &ActorContext<RateLimiterMsg>) {
        schedule_send(
            CLEANUP_INTERVAL,
            ctx.handle.clone(),
            RateLimiterMsg::CleanupOverdue,
        );
    }

    async fn handle(&mut self, msg: RateLimiterMsg, ctx: &ActorContext<RateLimiterMsg>) -> Flow {
        match msg {
            RateLimiterMsg::GetDelay(app) => {
                let until = self.current_deadline(&app.id);
                self.push_update(app.id.clone(), until);
            }

            RateLimiterMsg::AddDelay(app) => {
                let attempts = self
                    .delays
                    .get(&app.id)
                    .map(|entry| entry.attempts + 1)
                    .unwrap_or(0);
                let delay = backoff_delay(&app.backoff, attempts);
                let until = self.clock.now() + delay;

                info!(
                    app_id = %app.id,
                    attempts,
                    delay_ms = delay.as_millis(),
                    "Increasing launch delay"
                );
                self.delays
                    .insert(app.id.clone(), DelayEntry { attempts, until });
                self.push_update(app.id.clone(), until);
            }

            RateLimiterMsg::ResetDelay(app_id) => {
                if self.delays.remove(&app_id).is_some() {
                    debug!(app_id = %app_id, "Reset launch delay");
                }
                let now = self.clock.now();
                self.push_update(app_id, now);
            }

            RateLimiterMsg::CleanupOverdue => {
                let now = self.clock.now();
                let before = self.delays.len();
                self.delays.retain(|_, entry| entry.until > now);
                let swept = before - self.delays.len();
                if swept > 0 {
                    debug!(swept, "Swept overdue launch delays");
                }
                schedule_send(
                    CLEANUP_INTERVAL,
                    ctx.handle.clone(),
                    RateLimiterMsg::CleanupOverdue,
                );
            }
        }
        Flow::Continue
    }
}

/// Handle for talking to the rate limiter.
#[derive(Clone)]
pub struct RateLimiterHandle {
    handle: ActorHandle<RateLimiterMsg>,
}

impl RateLimiterHandle {
    /// Spawns a rate limiter; deadline changes arrive on the returned ref's
    /// update channel passed in by the caller.
    pub fn spawn(
        clock: Arc<dyn Clock>,
        updates: mpsc::UnboundedSender<DelayUpdate>,
    ) -> (Self, ActorRef<RateLimiterMsg>) {
        let actor_ref = crate::actors::spawn(RateLimiter::new(clock, updates));
        (
            Self {
                handle: actor_ref.handle.clone(),
            },
            actor_ref,
        )
    }

    /// Asks for the app's current deadline; answered via the update channel.
    pub fn get_delay(&self, app: Arc<App>) {
        self.handle.send(RateLimiterMsg::GetDelay(app));
    }

    /// Records a failed launch for the app.
    pub fn add_delay(&self, app: Arc<App>) {
        self.handle.send(RateLimiterMsg::AddDelay(app));
    }

    /// Clears the app's delay.
    pub fn reset_delay(&self, app_id: AppId) {
        self.handle.send(RateLimiterMsg::ResetDelay(app_id));
    }
}
