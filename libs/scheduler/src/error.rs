//! Scheduler error types.

use armada_id::AppId;
use thiserror::Error;

use crate::state::StorageError;

/// Errors surfaced by the public scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The operation names an app without an active launcher.
    #[error("unknown app: {0}")]
    UnknownApp(AppId),

    /// The launch queue has shut down.
    #[error("launch queue unavailable")]
    QueueClosed,

    /// Durable storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
