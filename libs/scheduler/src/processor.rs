//! Per-offer processing pipeline.
//!
//! One offer runs match → persist → decide → settle under two absolute
//! deadlines. Every offer ends in exactly one driver answer (launch or
//! decline), every matched task in exactly one accept/reject, and every
//! reject of a persisted task in a compensating rollback.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use armada_id::OfferId;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::driver::TaskLauncher;
use crate::matcher::{MatchedTasks, OfferMatcher, TaskWithSource};
use crate::offer::Offer;
use crate::task::LaunchSpec;
use crate::tracker::TaskTracker;

/// Rejection reason once the save deadline has passed.
pub const SAVING_TIMEOUT_REACHED: &str = "saving timeout reached";

/// Rejection reason when the driver did not accept the launch.
pub const DRIVER_UNAVAILABLE: &str = "driver unavailable";

/// Counters for one processed offer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OfferOutcome {
    /// Tasks the match round produced.
    pub matched: usize,

    /// Tasks handed to the driver and accepted.
    pub launched: usize,

    /// Tasks rejected anywhere in the pipeline.
    pub rejected: usize,

    /// Failed persistence attempts.
    pub storage_errors: usize,

    /// True if the offer was declined.
    pub declined: bool,
}

/// Drives one offer through the launch pipeline.
pub struct OfferProcessor {
    config: Arc<SchedulerConfig>,
    clock: Arc<dyn Clock>,
    matcher: Arc<dyn OfferMatcher>,
    tracker: Arc<TaskTracker>,
    launcher: Arc<TaskLauncher>,
    in_flight: Mutex<HashSet<OfferId>>,
}

impl OfferProcessor {
    /// Creates a processor over the given collaborators.
    pub fn new(
        config: Arc<SchedulerConfig>,
        clock: Arc<dyn Clock>,
        matcher: Arc<dyn OfferMatcher>,
        tracker: Arc<TaskTracker>,
        launcher: Arc<TaskLauncher>,
    ) -> Self {
        Self {
            config,
            clock,
            matcher,
            tracker,
            launcher,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Processes one offer end-to-end.
    ///
    /// Returns `None` when the same offer id is already being processed;
    /// the active invocation answers the offer.
    pub async fn process_offer(&self, offer: Offer) -> Option<OfferOutcome> {
        let offer_id = offer.id.clone();
        {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(offer_id.clone()) {
                warn!(offer_id = %offer_id, "Offer already being processed, dropping duplicate");
                return None;
            }
        }

        let outcome = self.run_pipeline(offer).await;

        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&offer_id);
        Some(outcome)
    }

    async fn run_pipeline(&self, offer: Offer) -> OfferOutcome {
        let offer_id = offer.id.clone();
        let matching_deadline = self.clock.now() + self.config.offer_matching_timeout;
        let saving_deadline = matching_deadline + self.config.save_tasks_to_launch_timeout;

        // Match
        let matched = match self.matcher.match_offer(matching_deadline, offer).await {
            Ok(matched) => matched,
            Err(e) => {
                warn!(offer_id = %offer_id, error = %e, "Offer matching failed, treating as unmatched");
                MatchedTasks::empty(offer_id.clone(), true)
            }
        };
        let matched_count = matched.tasks.len();
        let resend_this_offer = matched.resend_this_offer;

        // Persist, in match order. Once the save deadline passes, nothing
        // further is persisted; the already-saved prefix still launches.
        let mut survivors: Vec<TaskWithSource> = Vec::with_capacity(matched_count);
        let mut rejected = 0usize;
        let mut storage_errors = 0usize;
        let mut deadline_passed = false;

        for matched_task in matched.tasks {
            if deadline_passed || self.clock.now() > saving_deadline {
                deadline_passed = true;
                debug!(
                    offer_id = %offer_id,
                    task_id = %matched_task.source.task_id(),
                    "Save deadline reached, rejecting task"
                );
                matched_task.source.reject(SAVING_TIMEOUT_REACHED);
                rejected += 1;
                continue;
            }

            self.tracker.created(matched_task.task.clone());
            match self.tracker.store(&matched_task.task).await {
                Ok(()) => survivors.push(matched_task),
                Err(e) => {
                    warn!(
                        offer_id = %offer_id,
                        task_id = %matched_task.task.id,
                        error = %e,
                        "Failed to persist task, rolling back"
                    );
                    storage_errors += 1;
                    rejected += 1;

                    let TaskWithSource { task, source, .. } = matched_task;
                    source.reject(format!("storage error: {e}"));
                    if let Err(rollback) = self.tracker.terminated(&task.app_id, &task.id).await {
                        warn!(
                            task_id = %task.id,
                            error = %rollback,
                            "Rollback of unpersisted task failed"
                        );
                    }
                }
            }
        }

        // Decide
        let not_all_saved = rejected > 0;
        if survivors.is_empty() {
            let refuse = if resend_this_offer || not_all_saved {
                None
            } else {
                Some(self.config.decline_offer_duration)
            };
            debug!(offer_id = %offer_id, refuse_ms = ?refuse.map(|d| d.as_millis()), "Declining offer");
            self.launcher.decline_offer(&offer_id, refuse).await;
            return OfferOutcome {
                matched: matched_count,
                launched: 0,
                rejected,
                storage_errors,
                declined: true,
            };
        }

        // Launch, then settle each source exactly once.
        let specs: Vec<LaunchSpec> = survivors.iter().map(|t| t.spec.clone()).collect();
        if self.launcher.launch_tasks(&offer_id, specs).await {
            let launched = survivors.len();
            for matched_task in survivors {
                matched_task.source.accept();
            }
            info!(offer_id = %offer_id, launched, "Tasks launched");
            OfferOutcome {
                matched: matched_count,
                launched,
                rejected,
                storage_errors,
                declined: false,
            }
        } else {
            let refused = survivors.len();
            warn!(
                offer_id = %offer_id,
                tasks = refused,
                "Driver did not accept launch, rolling back"
            );
            for matched_task in survivors {
                let TaskWithSource { task, source, .. } = matched_task;
                source.reject(DRIVER_UNAVAILABLE);
                if let Err(e) = self.tracker.terminated(&task.app_id, &task.id).await {
                    warn!(task_id = %task.id, error = %e, "Rollback after driver refusal failed");
                }
            }
            OfferOutcome {
                matched: matched_count,
                launched: 0,
                rejected: rejected + refused,
                storage_errors,
                declined: false,
            }
        }
    }
}
