//! The offer-matcher manager actor.
//!
//! Keeps the registry of launchers that currently want offers and runs one
//! match round per inbound offer: poll a snapshot of subscribers
//! sequentially, deduct every accepted launch from the remaining resources,
//! and stop at the deadline or when the offer is depleted. Because the
//! registry is only touched between messages, subscribe/unsubscribe become
//! visible at round boundaries.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use armada_id::AppId;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::{LauncherMatchRef, MatchError, MatchedTasks, OfferMatcher};
use crate::actors::{Actor, ActorContext, ActorHandle, ActorRef, Flow};
use crate::clock::{Clock, Timestamp};
use crate::launcher::LauncherMsg;
use crate::offer::Offer;

/// Messages handled by the manager.
pub enum MatcherMsg {
    /// A launcher wants offers; idempotent per app.
    Subscribe {
        app_id: AppId,
        matcher: LauncherMatchRef,
    },

    /// A launcher no longer wants offers; idempotent per app.
    Unsubscribe { app_id: AppId },

    /// Run one match round.
    MatchOffer {
        deadline: Timestamp,
        offer: Offer,
        reply: oneshot::Sender<MatchedTasks>,
    },
}

/// Manager actor state.
pub struct OfferMatcherManager {
    clock: Arc<dyn Clock>,
    subscribers: BTreeMap<AppId, LauncherMatchRef>,
}

impl OfferMatcherManager {
    /// Creates an empty manager.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            subscribers: BTreeMap::new(),
        }
    }

    async fn run_round(&self, deadline: Timestamp, offer: Offer) -> MatchedTasks {
        let offer_id = offer.id.clone();
        let mut remaining = offer.resources;
        let mut tasks = Vec::new();
        let mut resend_this_offer = false;

        let mut queue: VecDeque<(AppId, LauncherMatchRef)> = self
            .subscribers
            .iter()
            .map(|(app_id, matcher)| (app_id.clone(), matcher.clone()))
            .collect();

        while let Some((app_id, matcher)) = queue.pop_front() {
            let now = self.clock.now();
            if now >= deadline {
                // Subscribers left unpolled: worth re-offering soon.
                debug!(offer_id = %offer_id, "Match deadline reached mid-round");
                resend_this_offer = true;
                break;
            }
            if remaining.is_depleted() {
                trace!(offer_id = %offer_id, "Offer depleted mid-round");
                break;
            }

            let reply = tokio::time::timeout(
                now.until(deadline),
                matcher.match_offer(deadline, offer.with_resources(remaining)),
            )
            .await;

            match reply {
                Ok(Some(matched)) => {
                    remaining.subtract(&matched.spec.resources);
                    tasks.push(matched);
                    // The same launcher may want more of this offer.
                    queue.push_back((app_id, matcher));
                }
                Ok(None) => {
                    trace!(offer_id = %offer_id, app_id = %app_id, "Launcher declined offer");
                }
                Err(_) => {
                    // Late replies die with the dropped oneshot.
                    debug!(
                        offer_id = %offer_id,
                        app_id = %app_id,
                        "Launcher did not answer before the deadline"
                    );
                }
            }
        }

        debug!(
            offer_id = %offer_id,
            matched = tasks.len(),
            resend = resend_this_offer,
            "Match round complete"
        );
        MatchedTasks {
            offer_id,
            tasks,
            resend_this_offer,
        }
    }
}

#[async_trait]
impl Actor for OfferMatcherManager {
    type Message = MatcherMsg;

    fn name(&self) -> &str {
        "offer-matcher-manager"
    }

    async fn handle(&mut self, msg: MatcherMsg, _ctx: &ActorContext<MatcherMsg>) -> Flow {
        match msg {
            MatcherMsg::Subscribe { app_id, matcher } => {
                if self.subscribers.insert(app_id.clone(), matcher).is_none() {
                    debug!(app_id = %app_id, "Launcher subscribed for offers");
                }
            }
            MatcherMsg::Unsubscribe { app_id } => {
                if self.subscribers.remove(&app_id).is_some() {
                    debug!(app_id = %app_id, "Launcher unsubscribed from offers");
                }
            }
            MatcherMsg::MatchOffer {
                deadline,
                offer,
                reply,
            } => {
                let matched = self.run_round(deadline, offer).await;
                let _ = reply.send(matched);
            }
        }
        Flow::Continue
    }
}

/// Handle for talking to the manager.
#[derive(Clone)]
pub struct MatcherManagerHandle {
    handle: ActorHandle<MatcherMsg>,
}

impl MatcherManagerHandle {
    /// Spawns a manager.
    pub fn spawn(clock: Arc<dyn Clock>) -> (Self, ActorRef<MatcherMsg>) {
        let actor_ref = crate::actors::spawn(OfferMatcherManager::new(clock));
        (
            Self {
                handle: actor_ref.handle.clone(),
            },
            actor_ref,
        )
    }

    /// Registers a launcher for offers.
    pub fn subscribe(&self, app_id: AppId, launcher: ActorHandle<LauncherMsg>) {
        self.handle.send(MatcherMsg::Subscribe {
            app_id,
            matcher: LauncherMatchRef::new(launcher),
        });
    }

    /// Removes a launcher from the registry.
    pub fn unsubscribe(&self, app_id: AppId) {
        self.handle.send(MatcherMsg::Unsubscribe { app_id });
    }
}

#[async_trait]
impl OfferMatcher for MatcherManagerHandle {
    async fn match_offer(
        &self,
        deadline: Timestamp,
        offer: Offer,
    ) -> Result<MatchedTasks, MatchError> {
        let (reply, rx) = oneshot::channel();
        self.handle.send(MatcherMsg::MatchOffer {
            deadline,
            offer,
            reply,
        });
        rx.await.map_err(|_| MatchError::Unavailable)
    }
}
