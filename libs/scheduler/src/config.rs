//! Scheduler configuration.

use std::time::Duration;

/// Tunables of the launch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Budget for matching one offer across launchers.
    pub offer_matching_timeout: Duration,

    /// Additional budget for persisting matched tasks.
    pub save_tasks_to_launch_timeout: Duration,

    /// How long a launcher holds a slot for a task the driver has not
    /// acknowledged.
    pub task_launch_notification_timeout: Duration,

    /// Default re-offer suppression when declining an offer nothing wanted.
    pub decline_offer_duration: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            offer_matching_timeout: Duration::from_secs(1),
            save_tasks_to_launch_timeout: Duration::from_secs(3),
            task_launch_notification_timeout: Duration::from_secs(60),
            decline_offer_duration: Duration::from_secs(120),
        }
    }
}

impl SchedulerConfig {
    /// Reads the configuration from `ARMADA_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            offer_matching_timeout: env_millis(
                "ARMADA_OFFER_MATCHING_TIMEOUT_MS",
                defaults.offer_matching_timeout,
            ),
            save_tasks_to_launch_timeout: env_millis(
                "ARMADA_SAVE_TASKS_TO_LAUNCH_TIMEOUT_MS",
                defaults.save_tasks_to_launch_timeout,
            ),
            task_launch_notification_timeout: env_millis(
                "ARMADA_TASK_LAUNCH_NOTIFICATION_TIMEOUT_MS",
                defaults.task_launch_notification_timeout,
            ),
            decline_offer_duration: env_millis(
                "ARMADA_DECLINE_OFFER_DURATION_MS",
                defaults.decline_offer_duration,
            ),
        }
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
