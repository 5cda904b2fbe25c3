//! Typed ID definitions for scheduler resources.

use crate::define_opaque_id;
use crate::IdError;

// =============================================================================
// Master-assigned identifiers
// =============================================================================

define_opaque_id!(
    /// Identifier of a resource offer, unique per offer round.
    OfferId
);

define_opaque_id!(
    /// Identifier of the worker node an offer or task status refers to.
    AgentId
);

// =============================================================================
// AppId
// =============================================================================

/// Hierarchical application path, e.g. `/prod/payments/web`.
///
/// Paths are absolute and consist of non-empty `[a-z0-9-]` segments. The
/// segment alphabet deliberately excludes `_` and `.` so the path survives
/// being embedded into a [`TaskId`] and recovered from it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppId(String);

impl AppId {
    /// Parses and validates an absolute app path.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(IdError::NotAbsolute(s.to_string()));
        };
        if rest.is_empty() {
            return Err(IdError::InvalidSegment {
                path: s.to_string(),
                segment: String::new(),
            });
        }
        for segment in rest.split('/') {
            let ok = !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
            if !ok {
                return Err(IdError::InvalidSegment {
                    path: s.to_string(),
                    segment: segment.to_string(),
                });
            }
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    /// Separator-free rendering used inside task IDs: `/prod/web` → `prod_web`.
    #[must_use]
    pub fn safe_path(&self) -> String {
        self.0[1..].replace('/', "_")
    }

    fn from_safe_path(safe: &str) -> Result<Self, IdError> {
        Self::parse(&format!("/{}", safe.replace('_', "/")))
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AppId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for AppId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for AppId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// TaskId
// =============================================================================

/// Globally unique task identifier embedding the owning app path.
///
/// Format: `{app.safe_path()}.{ulid}`. The ULID suffix makes the ID unique;
/// the prefix makes the owning app recoverable without a lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh task ID for the given app.
    #[must_use]
    pub fn for_app(app_id: &AppId) -> Self {
        Self(format!("{}.{}", app_id.safe_path(), ulid::Ulid::new()))
    }

    /// Parses a task ID, validating both halves.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let Some((safe, ulid_str)) = s.rsplit_once('.') else {
            return Err(IdError::MissingSeparator);
        };
        AppId::from_safe_path(safe)?;
        ulid_str
            .parse::<ulid::Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;
        Ok(Self(s.to_string()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the owning app path from the ID.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        let (safe, _) = self
            .0
            .rsplit_once('.')
            .expect("task ID validated on construction");
        AppId::from_safe_path(safe).expect("task ID validated on construction")
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
