//! The per-app launcher actor.
//!
//! ## Lifecycle
//!
//! ```text
//! waiting_for_delay -> active -> draining -> stopped
//!        ^               |
//!        +---(upgrade)---+
//! ```
//!
//! While waiting for the initial rate-limiter answer every other message is
//! stashed and replayed once the delay arrives; an upgrade re-enters that
//! phase. `Stop` drains the in-flight ledger before the actor terminates.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use armada_events::{StatusClass, TaskStatusUpdate};
use armada_id::TaskId;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{LauncherMsg, QueuedTaskCount, LAUNCH_NOTIFICATION_TIMEOUT};
use crate::actors::{schedule_send, Actor, ActorContext, Flow, TimerHandle};
use crate::app::App;
use crate::backoff::{DelayUpdate, RateLimiterHandle};
use crate::clock::{Clock, Timestamp};
use crate::config::SchedulerConfig;
use crate::driver::OfferReviver;
use crate::factory::{TaskCreation, TaskFactory};
use crate::matcher::{MatcherManagerHandle, TaskOpSource, TaskWithSource};
use crate::task::Task;

/// Collaborators a launcher needs; shared by every launcher the queue owns.
#[derive(Clone)]
pub struct LauncherDeps {
    pub clock: Arc<dyn Clock>,
    pub config: Arc<SchedulerConfig>,
    pub factory: Arc<dyn TaskFactory>,
    pub matcher: MatcherManagerHandle,
    pub rate_limiter: RateLimiterHandle,
    pub reviver: Arc<dyn OfferReviver>,
}

enum Phase {
    WaitingForDelay { stash: Vec<LauncherMsg> },
    Active,
    Draining,
}

/// Launcher actor for one application.
pub struct AppLauncher {
    deps: LauncherDeps,
    name: String,

    app: Arc<App>,
    tasks_to_launch: u32,
    tasks: HashMap<TaskId, Task>,
    in_flight: HashMap<TaskId, Option<TimerHandle>>,
    backoff_until: Option<Timestamp>,
    recheck: Option<TimerHandle>,
    registered: bool,
    phase: Phase,
    replay: VecDeque<LauncherMsg>,
}

impl AppLauncher {
    /// Creates a launcher for `app`, seeded with the app's known tasks.
    pub fn new(deps: LauncherDeps, app: Arc<App>, initial_tasks: Vec<Task>) -> Self {
        let name = format!("launcher{}", app.id);
        let tasks = initial_tasks
            .into_iter()
            .map(|task| (task.id.clone(), task))
            .collect();

        Self {
            deps,
            name,
            app,
            tasks_to_launch: 0,
            tasks,
            in_flight: HashMap::new(),
            backoff_until: None,
            recheck: None,
            registered: false,
            phase: Phase::WaitingForDelay { stash: Vec::new() },
            replay: VecDeque::new(),
        }
    }

    fn should_launch_tasks(&self) -> bool {
        matches!(self.phase, Phase::Active)
            && self.tasks_to_launch > 0
            && self
                .backoff_until
                .map_or(true, |until| until <= self.deps.clock.now())
    }

    /// Subscribe iff we want offers, unsubscribe iff we do not. Idempotent.
    fn manage_subscription(&mut self, ctx: &ActorContext<LauncherMsg>) {
        if self.should_launch_tasks() {
            if !self.registered {
                debug!(app_id = %self.app.id, "Subscribing for offers");
                self.deps
                    .matcher
                    .subscribe(self.app.id.clone(), ctx.handle.clone());
                self.registered = true;
            }
        } else {
            self.unsubscribe();
        }
    }

    fn unsubscribe(&mut self) {
        if self.registered {
            debug!(app_id = %self.app.id, "Unsubscribing from offers");
            self.deps.matcher.unsubscribe(self.app.id.clone());
            self.registered = false;
        }
    }

    fn queued_count(&self) -> QueuedTaskCount {
        let in_flight = self.in_flight.len() as u32;
        QueuedTaskCount {
            app: self.app.clone(),
            tasks_left_to_launch: self.tasks_to_launch,
            task_launches_in_flight: in_flight,
            tasks_launched_or_running: (self.tasks.len() as u32).saturating_sub(in_flight),
            backoff_until: self.backoff_until,
        }
    }

    fn apply_delay_update(&mut self, update: DelayUpdate, ctx: &ActorContext<LauncherMsg>) {
        if Some(update.until) != self.backoff_until {
            self.backoff_until = Some(update.until);
            if let Some(timer) = self.recheck.take() {
                timer.cancel();
            }
            let now = self.deps.clock.now();
            if update.until > now {
                debug!(
                    app_id = %self.app.id,
                    until = %update.until,
                    "Backoff active, scheduling recheck"
                );
                self.recheck = Some(schedule_send(
                    now.until(update.until),
                    ctx.handle.clone(),
                    LauncherMsg::RecheckBackoff,
                ));
            }
        }
        self.manage_subscription(ctx);
    }

    // ---- waiting_for_delay ----

    fn handle_waiting(&mut self, msg: LauncherMsg, ctx: &ActorContext<LauncherMsg>) {
        match msg {
            LauncherMsg::DelayUpdate(update) => {
                if update.app_id != self.app.id {
                    warn!(
                        app_id = %self.app.id,
                        other = %update.app_id,
                        "Dropping delay update for unrelated app"
                    );
                    return;
                }
                debug!(app_id = %self.app.id, until = %update.until, "Initial delay received");
                if let Phase::WaitingForDelay { stash } = &mut self.phase {
                    let stash = std::mem::take(stash);
                    self.phase = Phase::Active;
                    self.replay.extend(stash);
                }
                self.apply_delay_update(update, ctx);
            }
            other => {
                if let Phase::WaitingForDelay { stash } = &mut self.phase {
                    stash.push(other);
                }
            }
        }
    }

    // ---- active ----

    async fn handle_active(&mut self, msg: LauncherMsg, ctx: &ActorContext<LauncherMsg>) -> Flow {
        match msg {
            LauncherMsg::MatchOffer {
                deadline,
                offer,
                reply,
            } => {
                let now = self.deps.clock.now();
                if now >= deadline || !self.should_launch_tasks() {
                    let _ = reply.send(None);
                    return Flow::Continue;
                }

                let running: Vec<Task> = self.tasks.values().cloned().collect();
                match self.deps.factory.new_task(&self.app, &offer, &running) {
                    Some(TaskCreation { spec, task }) => {
                        let task_id = task.id.clone();
                        debug!(
                            app_id = %self.app.id,
                            task_id = %task_id,
                            offer_id = %offer.id,
                            "Matched task against offer"
                        );

                        self.tasks.insert(task_id.clone(), task.clone());
                        let timer = schedule_send(
                            self.deps.config.task_launch_notification_timeout,
                            ctx.handle.clone(),
                            LauncherMsg::LaunchRejected {
                                task_id: task_id.clone(),
                                reason: LAUNCH_NOTIFICATION_TIMEOUT.to_string(),
                            },
                        );
                        self.in_flight.insert(task_id.clone(), Some(timer));
                        self.tasks_to_launch -= 1;
                        self.manage_subscription(ctx);

                        let source = TaskOpSource::new(ctx.handle.clone(), task_id);
                        let _ = reply.send(Some(TaskWithSource { spec, task, source }));
                    }
                    None => {
                        let _ = reply.send(None);
                    }
                }
            }

            LauncherMsg::AddInstances { app, count, reply } => {
                if app.id != self.app.id {
                    warn!(
                        app_id = %self.app.id,
                        other = %app.id,
                        "Ignoring instances for unrelated app"
                    );
                    let _ = reply.send(self.queued_count());
                    return Flow::Continue;
                }

                if *app != *self.app {
                    if self.app.is_upgrade(&app) {
                        info!(
                            app_id = %app.id,
                            version = %app.version,
                            count,
                            "App configuration changed, resetting launcher"
                        );
                        self.app = app;
                        self.tasks_to_launch = count;
                        self.unsubscribe();
                        self.backoff_until = None;
                        if let Some(timer) = self.recheck.take() {
                            timer.cancel();
                        }
                        let _ = reply.send(self.queued_count());
                        self.deps.rate_limiter.get_delay(self.app.clone());
                        self.phase = Phase::WaitingForDelay { stash: Vec::new() };
                        return Flow::Continue;
                    }
                    debug!(app_id = %app.id, instances = app.instances, "App rescaled");
                    self.app = app;
                    self.tasks_to_launch = count;
                } else {
                    self.tasks_to_launch += count;
                }
                self.manage_subscription(ctx);
                let _ = reply.send(self.queued_count());
            }

            LauncherMsg::GetCount { reply } => {
                let _ = reply.send(self.queued_count());
            }

            LauncherMsg::LaunchAccepted { task_id } => {
                match self.in_flight.remove(&task_id) {
                    Some(timer) => {
                        if let Some(timer) = timer {
                            timer.cancel();
                        }
                        debug!(task_id = %task_id, "Task launch accepted");
                    }
                    None => {
                        debug!(task_id = %task_id, "Launch acceptance for unknown task ignored");
                    }
                }
            }

            LauncherMsg::LaunchRejected { task_id, reason } => {
                match self.in_flight.remove(&task_id) {
                    Some(timer) => {
                        if let Some(timer) = timer {
                            timer.cancel();
                        }
                        self.tasks.remove(&task_id);
                        self.tasks_to_launch += 1;
                        info!(
                            task_id = %task_id,
                            reason = %reason,
                            "Task launch rejected, rescheduling slot"
                        );
                        self.manage_subscription(ctx);
                    }
                    None if reason == LAUNCH_NOTIFICATION_TIMEOUT => {
                        // Stale timer fire: the task was settled in time.
                        debug!(task_id = %task_id, "Ignoring stale launch-notification timeout");
                    }
                    None => {
                        info!(
                            task_id = %task_id,
                            reason = %reason,
                            "Launch rejection for unknown task ignored"
                        );
                    }
                }
            }

            LauncherMsg::Status(update) => self.handle_status(update).await,

            LauncherMsg::DelayUpdate(update) => {
                if update.app_id == self.app.id {
                    self.apply_delay_update(update, ctx);
                } else {
                    warn!(
                        app_id = %self.app.id,
                        other = %update.app_id,
                        "Dropping delay update for unrelated app"
                    );
                }
            }

            LauncherMsg::RecheckBackoff => {
                self.recheck = None;
                self.manage_subscription(ctx);
            }

            LauncherMsg::Stop => {
                self.unsubscribe();
                if let Some(timer) = self.recheck.take() {
                    timer.cancel();
                }
                if self.in_flight.is_empty() {
                    info!(app_id = %self.app.id, "Launcher stopped");
                    return Flow::Stop;
                }
                info!(
                    app_id = %self.app.id,
                    in_flight = self.in_flight.len(),
                    "Draining in-flight launches before stop"
                );
                self.phase = Phase::Draining;
            }
        }
        Flow::Continue
    }

    async fn handle_status(&mut self, update: TaskStatusUpdate) {
        match update.classify() {
            StatusClass::Terminal(state) => {
                if self.tasks.remove(&update.task_id).is_some() {
                    // Keep the in-flight entry for the processor's settle
                    // notification, but its timer is moot now.
                    if let Some(entry) = self.in_flight.get_mut(&update.task_id) {
                        if let Some(timer) = entry.take() {
                            timer.cancel();
                        }
                    }
                    info!(
                        task_id = %update.task_id,
                        event = state.event_type(),
                        "Task terminal, removed from launcher view"
                    );
                    if !self.app.constraints.is_empty() {
                        // Placement may have become satisfiable elsewhere.
                        self.deps.reviver.revive_offers().await;
                    }
                } else {
                    debug!(task_id = %update.task_id, "Terminal update for unknown task");
                }
            }
            StatusClass::NonTerminal(_) => {
                if let Some(task) = self.tasks.get_mut(&update.task_id) {
                    task.apply_status(&update);
                } else {
                    info!(
                        task_id = %update.task_id,
                        state = %update.state,
                        "Status update for unknown task dropped"
                    );
                }
            }
        }
    }

    // ---- draining ----

    fn handle_draining(&mut self, msg: LauncherMsg) -> Flow {
        match msg {
            LauncherMsg::LaunchAccepted { task_id } => {
                if let Some(timer) = self.in_flight.remove(&task_id) {
                    if let Some(timer) = timer {
                        timer.cancel();
                    }
                    debug!(task_id = %task_id, "Drained accepted launch");
                }
            }
            LauncherMsg::LaunchRejected { task_id, .. } => {
                if let Some(timer) = self.in_flight.remove(&task_id) {
                    if let Some(timer) = timer {
                        timer.cancel();
                    }
                    self.tasks.remove(&task_id);
                    debug!(task_id = %task_id, "Drained rejected launch");
                }
            }
            LauncherMsg::MatchOffer { reply, .. } => {
                // New matches are refused immediately once stopping.
                let _ = reply.send(None);
            }
            LauncherMsg::GetCount { reply } => {
                let _ = reply.send(self.queued_count());
            }
            _ => {
                debug!(app_id = %self.app.id, "Dropping message while draining");
            }
        }

        if self.in_flight.is_empty() {
            info!(app_id = %self.app.id, "In-flight launches drained, launcher stopped");
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    async fn dispatch(&mut self, msg: LauncherMsg, ctx: &ActorContext<LauncherMsg>) -> Flow {
        match self.phase {
            Phase::WaitingForDelay { .. } => {
                self.handle_waiting(msg, ctx);
                Flow::Continue
            }
            Phase::Active => self.handle_active(msg, ctx).await,
            Phase::Draining => self.handle_draining(msg),
        }
    }
}

#[async_trait]
impl Actor for AppLauncher {
    type Message = LauncherMsg;

    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&mut self, _ctx: &ActorContext<LauncherMsg>) {
        self.deps.rate_limiter.get_delay(self.app.clone());
    }

    async fn handle(&mut self, msg: LauncherMsg, ctx: &ActorContext<LauncherMsg>) -> Flow {
        let mut flow = self.dispatch(msg, ctx).await;
        // Replaying a stash can itself re-enter the waiting phase (an
        // upgrade mid-replay); dispatch handles that by re-stashing.
        while flow == Flow::Continue {
            let Some(next) = self.replay.pop_front() else {
                break;
            };
            flow = self.dispatch(next, ctx).await;
        }
        flow
    }

    async fn on_stop(&mut self, _ctx: &ActorContext<LauncherMsg>) {
        if let Some(timer) = self.recheck.take() {
            timer.cancel();
        }
        for timer in self.in_flight.values_mut().filter_map(Option::take) {
            timer.cancel();
        }
        self.unsubscribe();
    }
}
