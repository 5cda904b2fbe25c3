//! # armada-id
//!
//! Identifier types, parsing, and validation for the armada scheduler.
//!
//! ## Design Principles
//!
//! - Application paths are hierarchical, user-chosen, and strictly validated
//! - Task IDs are system-generated and embed the owning application path
//! - Offer and agent IDs are opaque strings assigned by the resource master
//! - All IDs support roundtrip serialization (parse → format → parse)
//! - IDs are typed to prevent mixing different resource kinds
//!
//! ## ID Formats
//!
//! - App: `/prod/payments/web`: absolute path of `[a-z0-9-]` segments
//! - Task: `prod_payments_web.01HV4Z4NYPLTRS0JTUA8XDME5F`: the app path
//!   with `_` separators, a dot, then a ULID
//! - Offer/Agent: whatever the resource master sent, kept verbatim
//!
//! The task format keeps the owning app recoverable from the task ID alone,
//! which the status-update path relies on.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::{AgentId, AppId, OfferId, TaskId};

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
