//! Application definitions and change classification.

use std::time::Duration;

use armada_id::AppId;
use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::offer::Resources;

/// Per-app launch backoff settings.
///
/// After each failed launch the enforced delay grows by `factor` until it
/// reaches `max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSettings {
    /// Delay after the first failure.
    pub initial: Duration,

    /// Growth factor per consecutive failure.
    pub factor: f64,

    /// Ceiling for the enforced delay.
    pub max: Duration,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 1.15,
            max: Duration::from_secs(3600),
        }
    }
}

/// Timestamps distinguishing the kind of the last definition change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// When `instances` last changed.
    pub last_scaling_at: Timestamp,

    /// When anything other than `instances` last changed.
    pub last_config_change_at: Timestamp,
}

impl VersionInfo {
    /// Version info for a freshly created definition.
    #[must_use]
    pub fn initial(version: Timestamp) -> Self {
        Self {
            last_scaling_at: version,
            last_config_change_at: version,
        }
    }
}

/// One application definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// Hierarchical application path.
    pub id: AppId,

    /// Desired instance count.
    pub instances: u32,

    /// Command each instance runs.
    pub cmd: String,

    /// Resources one instance needs.
    pub resources: Resources,

    /// Placement constraints.
    pub constraints: Vec<Constraint>,

    /// Launch backoff settings.
    pub backoff: BackoffSettings,

    /// Definition version.
    pub version: Timestamp,

    /// What kind of change produced this version.
    pub version_info: VersionInfo,
}

impl App {
    /// Creates a definition with default resources and no constraints.
    pub fn new(id: AppId, version: Timestamp) -> Self {
        Self {
            id,
            instances: 1,
            cmd: String::new(),
            resources: Resources::new(1.0, 128.0, 0.0),
            constraints: Vec::new(),
            backoff: BackoffSettings::default(),
            version,
            version_info: VersionInfo::initial(version),
        }
    }

    /// A new version of this definition with only `instances` changed.
    #[must_use]
    pub fn scaled_to(&self, instances: u32, version: Timestamp) -> Self {
        let mut next = self.clone();
        next.instances = instances;
        next.version = version;
        next.version_info.last_scaling_at = version;
        next
    }

    /// True if `newer` changes anything beyond `instances`, `version`, and
    /// `version_info`, which is a configuration change rather than pure scaling.
    #[must_use]
    pub fn is_upgrade(&self, newer: &App) -> bool {
        self.id == newer.id
            && (self.cmd != newer.cmd
                || self.resources != newer.resources
                || self.constraints != newer.constraints
                || self.backoff != newer.backoff)
    }

    /// True if `newer` differs from this definition at all (ignoring
    /// `version`/`version_info` bookkeeping).
    #[must_use]
    pub fn is_changed_by(&self, newer: &App) -> bool {
        self.is_upgrade(newer) || self.instances != newer.instances
    }
}

// =============================================================================
// Constraints
// =============================================================================

/// Placement constraint operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Every task of the app must see a distinct value for the field.
    Unique,

    /// Every task must see the same value; when a value is given the field
    /// must equal it, otherwise the first placed task pins it.
    Cluster(Option<String>),
}

/// Placement constraint on an offer field.
///
/// `field` is either the literal `hostname` or the name of an offer
/// attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub field: String,
    pub operator: Operator,
}

impl Constraint {
    /// Field name carrying the offer's hostname.
    pub const HOSTNAME: &'static str = "hostname";

    /// Requires distinct field values across the app's tasks.
    pub fn unique(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Unique,
        }
    }

    /// Requires all tasks on the given field value.
    pub fn cluster(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Cluster(Some(value.into())),
        }
    }

    /// Requires all tasks on whatever value the first task lands on.
    pub fn cluster_any(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Cluster(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
