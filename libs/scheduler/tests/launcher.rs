//! Launcher behavior through the full stack: subscription management,
//! status ingestion, upgrades, backoff, and launch-notification timeouts.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use armada_events::{TaskState, TaskStatusUpdate};
use armada_id::AppId;
use armada_scheduler::state::InMemoryTaskStorage;
use armada_scheduler::{
    AppTaskFactory, Clock, Constraint, LaunchQueue, ManualClock, OfferMatcher, QueuedTaskCount,
    Resources, SchedulerConfig, StatusEventBus, TaskTracker, Timestamp,
};

use support::*;

struct Stack {
    clock: Arc<ManualClock>,
    bus: Arc<StatusEventBus>,
    reviver: Arc<CountingReviver>,
    queue: LaunchQueue,
}

fn stack(config: SchedulerConfig) -> Stack {
    init_test_logging();
    let clock = Arc::new(ManualClock::starting_at(1_000_000));
    let tracker = Arc::new(TaskTracker::new(Arc::new(InMemoryTaskStorage::new())));
    let bus = Arc::new(StatusEventBus::new());
    let reviver = Arc::new(CountingReviver::default());
    let factory = Arc::new(AppTaskFactory::new(clock.clone()));

    let queue = LaunchQueue::spawn(
        Arc::new(config),
        clock.clone(),
        tracker,
        factory,
        reviver.clone(),
        bus.clone(),
    );

    Stack {
        clock,
        bus,
        reviver,
        queue,
    }
}

async fn eventually_count(
    queue: &LaunchQueue,
    app_id: &AppId,
    pred: impl Fn(&QueuedTaskCount) -> bool,
) -> QueuedTaskCount {
    for _ in 0..500 {
        let count = queue.count(app_id).await.unwrap();
        if pred(&count) {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("launcher never reached the expected counters");
}

fn far_deadline(clock: &ManualClock) -> Timestamp {
    clock.now() + Duration::from_secs(10)
}

#[tokio::test]
async fn test_terminal_task_with_constraints_revives_offers() {
    let s = stack(SchedulerConfig::default());

    let mut constrained = app("/prod/db", 1);
    constrained.constraints = vec![Constraint::cluster(Constraint::HOSTNAME, "node-a")];

    let count = s.queue.add(constrained.clone(), 1).await.unwrap();
    assert_eq!(count.tasks_left_to_launch, 1);

    let matched = s
        .queue
        .matcher()
        .match_offer(
            far_deadline(&s.clock),
            offer("o-1", "node-a", Resources::new(4.0, 1024.0, 0.0)),
        )
        .await
        .unwrap();
    assert_eq!(matched.tasks.len(), 1);

    let task = matched.tasks.into_iter().next().unwrap();
    let task_id = task.task.id.clone();
    task.source.accept();

    eventually_count(&s.queue, &constrained.id, |c| {
        c.task_launches_in_flight == 0 && c.tasks_launched_or_running == 1
    })
    .await;
    assert_eq!(s.reviver.revives.load(Ordering::SeqCst), 0);

    // The task dies; the launcher forgets it and asks for fresh offers
    // because its constraints may now be satisfiable elsewhere.
    s.bus
        .publish(TaskStatusUpdate::new(task_id, TaskState::Failed).with_message("oom"));

    eventually_count(&s.queue, &constrained.id, |c| {
        c.tasks_launched_or_running == 0
    })
    .await;
    assert_eq!(s.reviver.revives.load(Ordering::SeqCst), 1);

    s.queue.shutdown().await;
}

#[tokio::test]
async fn test_terminal_task_without_constraints_does_not_revive() {
    let s = stack(SchedulerConfig::default());
    let plain = app("/prod/web", 1);

    s.queue.add(plain.clone(), 1).await.unwrap();
    let matched = s
        .queue
        .matcher()
        .match_offer(
            far_deadline(&s.clock),
            offer("o-1", "node-a", Resources::new(4.0, 1024.0, 0.0)),
        )
        .await
        .unwrap();
    let task = matched.tasks.into_iter().next().unwrap();
    let task_id = task.task.id.clone();
    task.source.accept();

    s.bus
        .publish(TaskStatusUpdate::new(task_id, TaskState::Finished));

    eventually_count(&s.queue, &plain.id, |c| c.tasks_launched_or_running == 0).await;
    assert_eq!(s.reviver.revives.load(Ordering::SeqCst), 0);

    s.queue.shutdown().await;
}

#[tokio::test]
async fn test_upgrade_resets_launcher_and_rematches_new_version() {
    let s = stack(SchedulerConfig::default());

    let mut v1 = app("/prod/web", 1_000);
    v1.cmd = "serve-v1".to_string();
    let c1 = s.queue.add(v1.clone(), 1).await.unwrap();
    assert_eq!(c1.tasks_left_to_launch, 1);

    let mut v2 = v1.clone();
    v2.cmd = "serve-v2".to_string();
    v2.version = Timestamp::from_millis(2_000);
    v2.version_info.last_config_change_at = v2.version;

    let c2 = s.queue.add(v2.clone(), 1).await.unwrap();
    assert_eq!(c2.app.cmd, "serve-v2");
    assert_eq!(c2.app.version, v2.version);
    assert_eq!(c2.tasks_left_to_launch, 1);
    // The config change cleared the old backoff; a fresh delay was requested.
    assert_eq!(c2.backoff_until, None);

    // Once the fresh delay arrives the launcher re-subscribes and matches
    // tasks of the new version.
    let mut matched = None;
    for i in 0..500 {
        let round = s
            .queue
            .matcher()
            .match_offer(
                far_deadline(&s.clock),
                offer(&format!("o-{i}"), "node-a", Resources::new(4.0, 1024.0, 0.0)),
            )
            .await
            .unwrap();
        if !round.tasks.is_empty() {
            matched = Some(round.tasks.into_iter().next().unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let task = matched.expect("launcher never re-subscribed after upgrade");
    assert_eq!(task.spec.cmd, "serve-v2");
    assert_eq!(task.task.version, v2.version);
    task.source.reject("test teardown");

    s.queue.shutdown().await;
}

#[tokio::test]
async fn test_add_accumulates_for_unchanged_app() {
    let s = stack(SchedulerConfig::default());
    let unchanged = app("/prod/web", 1);

    assert_eq!(
        s.queue
            .add(unchanged.clone(), 1)
            .await
            .unwrap()
            .tasks_left_to_launch,
        1
    );
    assert_eq!(
        s.queue
            .add(unchanged.clone(), 2)
            .await
            .unwrap()
            .tasks_left_to_launch,
        3
    );

    s.queue.shutdown().await;
}

#[tokio::test]
async fn test_scaling_change_replaces_pending_count() {
    let s = stack(SchedulerConfig::default());
    let v1 = app("/prod/web", 1_000);

    s.queue.add(v1.clone(), 1).await.unwrap();

    let v2 = v1.scaled_to(5, Timestamp::from_millis(2_000));
    let count = s.queue.add(v2.clone(), 4).await.unwrap();

    assert_eq!(count.app.instances, 5);
    assert_eq!(count.tasks_left_to_launch, 4);
    // Scaling does not reset backoff state.
    assert!(count.backoff_until.is_some());

    s.queue.shutdown().await;
}

#[tokio::test]
async fn test_backoff_suppresses_matching_until_reset() {
    let s = stack(SchedulerConfig::default());

    let mut delayed = app("/prod/web", 1);
    delayed.backoff.initial = Duration::from_secs(100);

    // A failure recorded before the launcher exists: its first delay answer
    // already carries the active backoff deadline.
    s.queue.add_delay(Arc::new(delayed.clone()));
    let count = s.queue.add(delayed.clone(), 1).await.unwrap();
    let until = count.backoff_until.expect("backoff deadline expected");
    assert!(until > s.clock.now());

    // Backed off: the launcher is not subscribed, so nothing matches.
    let round = s
        .queue
        .matcher()
        .match_offer(
            far_deadline(&s.clock),
            offer("o-1", "node-a", Resources::new(4.0, 1024.0, 0.0)),
        )
        .await
        .unwrap();
    assert!(round.tasks.is_empty());

    // Clearing the delay re-enables matching.
    s.queue.reset_delay(delayed.id.clone());
    let mut matched = None;
    for i in 0..500 {
        let round = s
            .queue
            .matcher()
            .match_offer(
                far_deadline(&s.clock),
                offer(&format!("o-{i}"), "node-a", Resources::new(4.0, 1024.0, 0.0)),
            )
            .await
            .unwrap();
        if !round.tasks.is_empty() {
            matched = Some(round.tasks.into_iter().next().unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let task = matched.expect("launcher never resumed matching after reset");
    task.source.reject("test teardown");

    s.queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_launch_is_rescheduled() {
    let config = SchedulerConfig {
        task_launch_notification_timeout: Duration::from_secs(5),
        ..SchedulerConfig::default()
    };
    let s = stack(config);
    let silent = app("/prod/web", 1);

    s.queue.add(silent.clone(), 1).await.unwrap();
    let matched = s
        .queue
        .matcher()
        .match_offer(
            far_deadline(&s.clock),
            offer("o-1", "node-a", Resources::new(4.0, 1024.0, 0.0)),
        )
        .await
        .unwrap();
    assert_eq!(matched.tasks.len(), 1);

    // Nobody ever accepts or rejects the launch.
    let count = eventually_count(&s.queue, &silent.id, |c| c.task_launches_in_flight == 1).await;
    assert_eq!(count.tasks_left_to_launch, 0);

    // Past the notification timeout the launcher gives the slot back.
    tokio::time::sleep(Duration::from_secs(6)).await;
    let count = eventually_count(&s.queue, &silent.id, |c| c.task_launches_in_flight == 0).await;
    assert_eq!(count.tasks_left_to_launch, 1);
    assert_eq!(count.tasks_launched_or_running, 0);

    // The dangling source must not keep the slot: drop it unsettled.
    drop(matched);

    s.queue.shutdown().await;
}

#[tokio::test]
async fn test_matcher_subscription_follows_launch_intent() {
    let s = stack(SchedulerConfig::default());
    let wanted = app("/prod/web", 1);

    // No launcher at all: nothing matches.
    let round = s
        .queue
        .matcher()
        .match_offer(
            far_deadline(&s.clock),
            offer("o-0", "node-a", Resources::new(4.0, 1024.0, 0.0)),
        )
        .await
        .unwrap();
    assert!(round.tasks.is_empty());

    s.queue.add(wanted.clone(), 1).await.unwrap();

    // Intent present: the single slot matches exactly once, then the
    // launcher unsubscribes and later rounds come back empty.
    let round = s
        .queue
        .matcher()
        .match_offer(
            far_deadline(&s.clock),
            offer("o-1", "node-a", Resources::new(8.0, 2048.0, 0.0)),
        )
        .await
        .unwrap();
    assert_eq!(round.tasks.len(), 1);

    let again = s
        .queue
        .matcher()
        .match_offer(
            far_deadline(&s.clock),
            offer("o-2", "node-a", Resources::new(8.0, 2048.0, 0.0)),
        )
        .await
        .unwrap();
    assert!(again.tasks.is_empty());

    for task in round.tasks {
        task.source.reject("test teardown");
    }

    s.queue.shutdown().await;
}
