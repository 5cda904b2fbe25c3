//! # armada-events
//!
//! Task lifecycle event types shared between the scheduler core and the
//! driver's status-update stream.
//!
//! ## Design Principles
//!
//! - Status updates are immutable records of observed task state
//! - Terminal states are classified once, here, not at every consumer
//! - Every update names the task it refers to; the owning app is
//!   recoverable from the task ID
//!
//! ## Event Types
//!
//! Task states follow the master's task lifecycle:
//! - `staging` → `running` while the task is alive
//! - `finished`, `failed`, `killed`, `lost` end the lifecycle

mod types;

pub use types::{event_types, StatusClass, TaskState, TaskStatusUpdate};
