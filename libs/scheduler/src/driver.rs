//! Outbound adapter over the resource-master driver.
//!
//! The driver itself (the component speaking the master's protocol) lives
//! outside this crate and may connect and disconnect at runtime. The
//! [`TaskLauncher`] holder turns "no driver right now" and "driver call
//! failed" into the boolean the offer processor needs.

use std::sync::Arc;
use std::time::Duration;

use armada_id::OfferId;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::task::LaunchSpec;

/// Errors from the outbound driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No driver is currently connected.
    #[error("no driver connected")]
    NotConnected,

    /// The driver rejected or failed the call.
    #[error("driver call failed: {0}")]
    Failed(String),
}

/// The outbound surface of the resource-master driver.
#[async_trait]
pub trait SchedulerDriver: Send + Sync {
    /// Launches tasks against an offer.
    async fn launch_tasks(
        &self,
        offer_id: &OfferId,
        specs: Vec<LaunchSpec>,
    ) -> Result<(), DriverError>;

    /// Returns an offer unused; `refuse` suppresses re-offers from the same
    /// worker for that duration.
    async fn decline_offer(
        &self,
        offer_id: &OfferId,
        refuse: Option<Duration>,
    ) -> Result<(), DriverError>;

    /// Asks the master to re-send previously declined offers.
    async fn revive_offers(&self) -> Result<(), DriverError>;
}

/// Capability to ask the master for fresh offers; used by launchers when a
/// constrained task dies and placement may have become satisfiable again.
#[async_trait]
pub trait OfferReviver: Send + Sync {
    async fn revive_offers(&self);
}

/// Holder-adapter over the (possibly absent) driver.
#[derive(Default)]
pub struct TaskLauncher {
    driver: RwLock<Option<Arc<dyn SchedulerDriver>>>,
}

impl TaskLauncher {
    /// Creates a holder with no driver connected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a holder with a driver already connected.
    pub fn with_driver(driver: Arc<dyn SchedulerDriver>) -> Self {
        Self {
            driver: RwLock::new(Some(driver)),
        }
    }

    /// Installs the current driver.
    pub async fn set_driver(&self, driver: Arc<dyn SchedulerDriver>) {
        *self.driver.write().await = Some(driver);
    }

    /// Drops the current driver; subsequent launches fail fast.
    pub async fn clear_driver(&self) {
        *self.driver.write().await = None;
    }

    async fn current(&self) -> Option<Arc<dyn SchedulerDriver>> {
        self.driver.read().await.clone()
    }

    /// Hands tasks to the driver. True iff the driver accepted them; an
    /// absent or failing driver yields false.
    pub async fn launch_tasks(&self, offer_id: &OfferId, specs: Vec<LaunchSpec>) -> bool {
        let Some(driver) = self.current().await else {
            warn!(offer_id = %offer_id, "Cannot launch tasks, no driver connected");
            return false;
        };

        match driver.launch_tasks(offer_id, specs).await {
            Ok(()) => true,
            Err(e) => {
                warn!(offer_id = %offer_id, error = %e, "Driver rejected task launch");
                false
            }
        }
    }

    /// Declines an offer; failures are logged, not surfaced; the master
    /// re-offers on its own schedule anyway.
    pub async fn decline_offer(&self, offer_id: &OfferId, refuse: Option<Duration>) {
        let Some(driver) = self.current().await else {
            debug!(offer_id = %offer_id, "Cannot decline offer, no driver connected");
            return;
        };

        if let Err(e) = driver.decline_offer(offer_id, refuse).await {
            warn!(offer_id = %offer_id, error = %e, "Failed to decline offer");
        }
    }
}

#[async_trait]
impl OfferReviver for TaskLauncher {
    async fn revive_offers(&self) {
        let Some(driver) = self.current().await else {
            debug!("Cannot revive offers, no driver connected");
            return;
        };

        if let Err(e) = driver.revive_offers().await {
            warn!(error = %e, "Failed to revive offers");
        }
    }
}
