//! Shared harness for the integration suites: a recording driver, canned
//! matchers, fault-injecting storage, and a settle-notification recorder.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use armada_events::TaskState;
use armada_id::{AgentId, AppId, OfferId, TaskId};
use armada_scheduler::actors::{self, Actor, ActorContext, ActorHandle, ActorRef, Flow};
use armada_scheduler::launcher::LauncherMsg;
use armada_scheduler::matcher::{MatchError, MatchedTasks, OfferMatcher, TaskOpSource, TaskWithSource};
use armada_scheduler::state::{InMemoryTaskStorage, StorageError, TaskStorage};
use armada_scheduler::{
    App, DriverError, LaunchSpec, ManualClock, Offer, OfferReviver, Resources, SchedulerDriver,
    Task, Timestamp,
};

/// Installs a compact tracing subscriber when `ARMADA_TEST_LOG` is set, so
/// a failing scenario can be rerun with the pipeline's logs visible.
pub fn init_test_logging() {
    if std::env::var("ARMADA_TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Driver double that records every call and answers launches as told.
#[derive(Default)]
pub struct RecordingDriver {
    pub launches: Mutex<Vec<(OfferId, Vec<LaunchSpec>)>>,
    pub declines: Mutex<Vec<(OfferId, Option<Duration>)>>,
    pub revives: AtomicUsize,
    refuse: AtomicBool,
}

impl RecordingDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_launches(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn launched(&self) -> Vec<(OfferId, Vec<LaunchSpec>)> {
        self.launches.lock().unwrap().clone()
    }

    pub fn declined(&self) -> Vec<(OfferId, Option<Duration>)> {
        self.declines.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchedulerDriver for RecordingDriver {
    async fn launch_tasks(
        &self,
        offer_id: &OfferId,
        specs: Vec<LaunchSpec>,
    ) -> Result<(), DriverError> {
        self.launches.lock().unwrap().push((offer_id.clone(), specs));
        if self.refuse.load(Ordering::SeqCst) {
            Err(DriverError::NotConnected)
        } else {
            Ok(())
        }
    }

    async fn decline_offer(
        &self,
        offer_id: &OfferId,
        refuse: Option<Duration>,
    ) -> Result<(), DriverError> {
        self.declines.lock().unwrap().push((offer_id.clone(), refuse));
        Ok(())
    }

    async fn revive_offers(&self) -> Result<(), DriverError> {
        self.revives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reviver double counting invocations.
#[derive(Default)]
pub struct CountingReviver {
    pub revives: AtomicUsize,
}

#[async_trait]
impl OfferReviver for CountingReviver {
    async fn revive_offers(&self) {
        self.revives.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Storage doubles
// =============================================================================

/// Storage whose writes always fail.
pub struct FailingStorage;

#[async_trait]
impl TaskStorage for FailingStorage {
    async fn put(&self, _task: &Task) -> Result<(), StorageError> {
        Err(StorageError::Backend("disk full".to_string()))
    }

    async fn remove(&self, _task_id: &TaskId) -> Result<(), StorageError> {
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Task>, StorageError> {
        Ok(Vec::new())
    }
}

/// Storage that advances a manual clock on every successful write, to
/// simulate slow persistence against absolute deadlines.
pub struct ClockAdvancingStorage {
    inner: InMemoryTaskStorage,
    clock: Arc<ManualClock>,
    advance_by: Duration,
}

impl ClockAdvancingStorage {
    pub fn new(clock: Arc<ManualClock>, advance_by: Duration) -> Self {
        Self {
            inner: InMemoryTaskStorage::new(),
            clock,
            advance_by,
        }
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.inner.contains(task_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl TaskStorage for ClockAdvancingStorage {
    async fn put(&self, task: &Task) -> Result<(), StorageError> {
        self.inner.put(task).await?;
        self.clock.advance(self.advance_by);
        Ok(())
    }

    async fn remove(&self, task_id: &TaskId) -> Result<(), StorageError> {
        self.inner.remove(task_id).await
    }

    async fn load_all(&self) -> Result<Vec<Task>, StorageError> {
        self.inner.load_all().await
    }
}

// =============================================================================
// Settle recorder
// =============================================================================

/// What a source delivered back to its launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Accepted(TaskId),
    Rejected(TaskId, String),
}

/// Actor standing in for a launcher on the settle side; records every
/// accept/reject notification.
pub struct Recorder {
    log: Arc<Mutex<Vec<Settled>>>,
}

#[async_trait]
impl Actor for Recorder {
    type Message = LauncherMsg;

    fn name(&self) -> &str {
        "settle-recorder"
    }

    async fn handle(&mut self, msg: LauncherMsg, _ctx: &ActorContext<LauncherMsg>) -> Flow {
        match msg {
            LauncherMsg::LaunchAccepted { task_id } => {
                self.log.lock().unwrap().push(Settled::Accepted(task_id));
            }
            LauncherMsg::LaunchRejected { task_id, reason } => {
                self.log
                    .lock()
                    .unwrap()
                    .push(Settled::Rejected(task_id, reason));
            }
            _ => {}
        }
        Flow::Continue
    }
}

/// Spawns a settle recorder; returns its mailbox and the shared log.
pub fn spawn_recorder() -> (
    ActorRef<LauncherMsg>,
    Arc<Mutex<Vec<Settled>>>,
) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let actor = actors::spawn(Recorder { log: log.clone() });
    (actor, log)
}

/// Waits until the recorder has seen `count` settle notifications.
pub async fn wait_for_settled(log: &Arc<Mutex<Vec<Settled>>>, count: usize) -> Vec<Settled> {
    for _ in 0..500 {
        {
            let log = log.lock().unwrap();
            if log.len() >= count {
                return log.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("recorder never saw {count} settle notifications");
}

// =============================================================================
// Canned matcher
// =============================================================================

/// Matcher double answering from a queue of canned results, optionally
/// advancing a manual clock before each answer.
pub struct CannedMatcher {
    responses: Mutex<VecDeque<MatchedTasks>>,
    advance: Option<(Arc<ManualClock>, Duration)>,
}

impl CannedMatcher {
    pub fn new(responses: Vec<MatchedTasks>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            advance: None,
        }
    }

    /// Advance `clock` by `by` before answering, as a slow matcher would.
    pub fn advancing(mut self, clock: Arc<ManualClock>, by: Duration) -> Self {
        self.advance = Some((clock, by));
        self
    }
}

#[async_trait]
impl OfferMatcher for CannedMatcher {
    async fn match_offer(
        &self,
        _deadline: Timestamp,
        offer: Offer,
    ) -> Result<MatchedTasks, MatchError> {
        if let Some((clock, by)) = &self.advance {
            clock.advance(*by);
        }
        let canned = self.responses.lock().unwrap().pop_front();
        Ok(canned.unwrap_or_else(|| MatchedTasks::empty(offer.id, false)))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn app(path: &str, version_ms: i64) -> App {
    let mut app = App::new(AppId::parse(path).unwrap(), Timestamp::from_millis(version_ms));
    app.cmd = "serve".to_string();
    app.resources = Resources::new(1.0, 128.0, 0.0);
    app
}

pub fn offer(id: &str, host: &str, resources: Resources) -> Offer {
    Offer::new(OfferId::new(id), AgentId::new(format!("agent-{host}")), host, resources)
}

/// Builds one matched task whose settle notifications go to `recorder`.
pub fn matched_task(app: &App, host: &str, recorder: ActorHandle<LauncherMsg>) -> TaskWithSource {
    let task_id = TaskId::for_app(&app.id);
    let task = Task {
        id: task_id.clone(),
        app_id: app.id.clone(),
        version: app.version,
        state: TaskState::Staging,
        staged_at: None,
        host: host.to_string(),
        agent_id: AgentId::new(format!("agent-{host}")),
        attributes: Default::default(),
        status_message: None,
    };
    let spec = LaunchSpec {
        task_id: task_id.clone(),
        app_id: app.id.clone(),
        cmd: app.cmd.clone(),
        resources: app.resources,
        hostname: host.to_string(),
        agent_id: AgentId::new(format!("agent-{host}")),
    };
    TaskWithSource {
        spec,
        task,
        source: TaskOpSource::new(recorder, task_id),
    }
}
