//! The launch queue: administrative surface and launcher ownership.
//!
//! The queue actor owns one launcher per app, routes rate-limiter delay
//! updates into launcher mailboxes, and wires each launcher into the status
//! event bus. It never awaits a launcher reply itself: replies travel on
//! oneshot channels handed through to the caller, so delay routing can
//! never deadlock behind a launcher that is still waiting for its delay.

use std::collections::HashMap;
use std::sync::Arc;

use armada_id::AppId;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::actors::{self, Actor, ActorContext, ActorRef, Flow};
use crate::app::App;
use crate::backoff::{DelayUpdate, RateLimiterHandle, RateLimiterMsg};
use crate::bus::StatusEventBus;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::driver::OfferReviver;
use crate::error::SchedulerError;
use crate::factory::TaskFactory;
use crate::launcher::{AppLauncher, LauncherDeps, LauncherMsg, QueuedTaskCount};
use crate::matcher::{MatcherManagerHandle, MatcherMsg};
use crate::tracker::TaskTracker;

/// Messages handled by the queue actor.
pub enum QueueMsg {
    /// Enqueue `count` launches for `app`, spawning its launcher if needed.
    Add {
        app: Arc<App>,
        count: u32,
        reply: oneshot::Sender<QueuedTaskCount>,
    },

    /// Stop and forget the app's launcher; idempotent.
    Purge {
        app_id: AppId,
        reply: oneshot::Sender<()>,
    },

    /// Snapshot one launcher's counters.
    Count {
        app_id: AppId,
        reply: oneshot::Sender<Result<oneshot::Receiver<QueuedTaskCount>, SchedulerError>>,
    },

    /// Snapshot all launchers.
    List {
        reply: oneshot::Sender<Vec<oneshot::Receiver<QueuedTaskCount>>>,
    },

    /// A deadline change from the rate limiter, routed to the owning
    /// launcher.
    Delay(DelayUpdate),
}

struct QueueActor {
    deps: LauncherDeps,
    tracker: Arc<TaskTracker>,
    bus: Arc<StatusEventBus>,
    launchers: HashMap<AppId, ActorRef<LauncherMsg>>,
}

impl QueueActor {
    fn spawn_launcher(&mut self, app: &Arc<App>) -> &ActorRef<LauncherMsg> {
        let launcher = AppLauncher::new(
            self.deps.clone(),
            app.clone(),
            self.tracker.tasks_for(&app.id),
        );
        let actor_ref = actors::spawn(launcher);

        // Pipe the app's status updates into the launcher mailbox.
        let mut status_rx = self.bus.subscribe(app.id.clone());
        let handle = actor_ref.handle.clone();
        tokio::spawn(async move {
            while let Some(update) = status_rx.recv().await {
                if !handle.is_open() {
                    break;
                }
                handle.send(LauncherMsg::Status(update));
            }
        });

        info!(app_id = %app.id, "Launcher started");
        self.launchers.entry(app.id.clone()).or_insert(actor_ref)
    }

    fn launcher_for(&mut self, app: &Arc<App>) -> &ActorRef<LauncherMsg> {
        let stale = self
            .launchers
            .get(&app.id)
            .is_some_and(|actor| !actor.is_running());
        if stale {
            debug!(app_id = %app.id, "Replacing dead launcher");
            self.launchers.remove(&app.id);
        }

        if self.launchers.contains_key(&app.id) {
            &self.launchers[&app.id]
        } else {
            self.spawn_launcher(app)
        }
    }
}

#[async_trait]
impl Actor for QueueActor {
    type Message = QueueMsg;

    fn name(&self) -> &str {
        "launch-queue"
    }

    async fn handle(&mut self, msg: QueueMsg, _ctx: &ActorContext<QueueMsg>) -> Flow {
        match msg {
            QueueMsg::Add { app, count, reply } => {
                let launcher = self.launcher_for(&app);
                launcher
                    .handle
                    .send(LauncherMsg::AddInstances { app, count, reply });
            }

            QueueMsg::Purge { app_id, reply } => {
                match self.launchers.remove(&app_id) {
                    Some(actor) => {
                        info!(app_id = %app_id, "Purging launcher");
                        actor.handle.send(LauncherMsg::Stop);
                        // Dropping the ref detaches the launcher; it keeps
                        // draining its in-flight launches on its own.
                    }
                    None => {
                        debug!(app_id = %app_id, "Purge for absent launcher");
                    }
                }
                let _ = reply.send(());
            }

            QueueMsg::Count { app_id, reply } => {
                let result = match self.launchers.get(&app_id) {
                    Some(actor) if actor.is_running() => {
                        let (count_tx, count_rx) = oneshot::channel();
                        actor.handle.send(LauncherMsg::GetCount { reply: count_tx });
                        Ok(count_rx)
                    }
                    _ => Err(SchedulerError::UnknownApp(app_id)),
                };
                let _ = reply.send(result);
            }

            QueueMsg::List { reply } => {
                let receivers = self
                    .launchers
                    .values()
                    .filter(|actor| actor.is_running())
                    .map(|actor| {
                        let (count_tx, count_rx) = oneshot::channel();
                        actor.handle.send(LauncherMsg::GetCount { reply: count_tx });
                        count_rx
                    })
                    .collect();
                let _ = reply.send(receivers);
            }

            QueueMsg::Delay(update) => match self.launchers.get(&update.app_id) {
                Some(actor) => actor.handle.send(LauncherMsg::DelayUpdate(update)),
                None => {
                    debug!(app_id = %update.app_id, "Delay update for absent launcher dropped");
                }
            },
        }
        Flow::Continue
    }

    async fn on_stop(&mut self, _ctx: &ActorContext<QueueMsg>) {
        info!(count = self.launchers.len(), "Stopping all launchers");
        for actor in self.launchers.values() {
            actor.shutdown();
        }
        self.launchers.clear();
    }
}

/// Public facade over the queue actor.
pub struct LaunchQueue {
    queue: ActorRef<QueueMsg>,
    matcher: MatcherManagerHandle,
    matcher_ref: ActorRef<MatcherMsg>,
    limiter: RateLimiterHandle,
    limiter_ref: ActorRef<RateLimiterMsg>,
}

impl LaunchQueue {
    /// Spawns the queue with its matcher manager and rate limiter.
    pub fn spawn(
        config: Arc<SchedulerConfig>,
        clock: Arc<dyn Clock>,
        tracker: Arc<TaskTracker>,
        factory: Arc<dyn TaskFactory>,
        reviver: Arc<dyn OfferReviver>,
        bus: Arc<StatusEventBus>,
    ) -> Self {
        let (matcher, matcher_ref) = MatcherManagerHandle::spawn(clock.clone());
        let (delay_tx, mut delay_rx) = mpsc::unbounded_channel();
        let (limiter, limiter_ref) = RateLimiterHandle::spawn(clock.clone(), delay_tx);

        let deps = LauncherDeps {
            clock,
            config,
            factory,
            matcher: matcher.clone(),
            rate_limiter: limiter.clone(),
            reviver,
        };
        let queue = actors::spawn(QueueActor {
            deps,
            tracker,
            bus,
            launchers: HashMap::new(),
        });

        // Route rate-limiter updates through the queue actor.
        let queue_handle = queue.handle.clone();
        tokio::spawn(async move {
            while let Some(update) = delay_rx.recv().await {
                queue_handle.send(QueueMsg::Delay(update));
            }
        });

        Self {
            queue,
            matcher,
            matcher_ref,
            limiter,
            limiter_ref,
        }
    }

    /// Enqueues `count` launches for `app`; answers the launcher's counters.
    pub async fn add(&self, app: App, count: u32) -> Result<QueuedTaskCount, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.queue.handle.send(QueueMsg::Add {
            app: Arc::new(app),
            count,
            reply,
        });
        rx.await.map_err(|_| SchedulerError::QueueClosed)
    }

    /// Stops the app's launcher, if any. Idempotent.
    pub async fn purge(&self, app_id: &AppId) -> Result<(), SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.queue.handle.send(QueueMsg::Purge {
            app_id: app_id.clone(),
            reply,
        });
        rx.await.map_err(|_| SchedulerError::QueueClosed)
    }

    /// Current counters of one launcher.
    pub async fn count(&self, app_id: &AppId) -> Result<QueuedTaskCount, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.queue.handle.send(QueueMsg::Count {
            app_id: app_id.clone(),
            reply,
        });
        let count_rx = rx.await.map_err(|_| SchedulerError::QueueClosed)??;
        count_rx.await.map_err(|_| SchedulerError::QueueClosed)
    }

    /// Counters of every active launcher.
    pub async fn list(&self) -> Result<Vec<QueuedTaskCount>, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.queue.handle.send(QueueMsg::List { reply });
        let receivers = rx.await.map_err(|_| SchedulerError::QueueClosed)?;

        let mut counts = Vec::with_capacity(receivers.len());
        for count_rx in receivers {
            // A launcher that stopped between snapshot and reply is skipped.
            if let Ok(count) = count_rx.await {
                counts.push(count);
            }
        }
        Ok(counts)
    }

    /// Records a failed launch for backoff purposes.
    pub fn add_delay(&self, app: Arc<App>) {
        self.limiter.add_delay(app);
    }

    /// Clears an app's launch backoff.
    pub fn reset_delay(&self, app_id: AppId) {
        self.limiter.reset_delay(app_id);
    }

    /// The offer matcher the offer processor should use.
    pub fn matcher(&self) -> MatcherManagerHandle {
        self.matcher.clone()
    }

    /// Stops the queue, its launchers, the matcher manager, and the rate
    /// limiter.
    pub async fn shutdown(self) {
        self.queue.shutdown();
        self.queue.wait().await;
        self.matcher_ref.shutdown();
        self.matcher_ref.wait().await;
        self.limiter_ref.shutdown();
        self.limiter_ref.wait().await;
    }
}
