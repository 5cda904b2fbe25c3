//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// An app path did not start with `/`.
    #[error("app path must be absolute (start with '/'): '{0}'")]
    NotAbsolute(String),

    /// An app path segment contained invalid characters or was empty.
    #[error("invalid app path segment '{segment}' in '{path}'")]
    InvalidSegment { path: String, segment: String },

    /// A task ID is missing the `.` between app path and ULID.
    #[error("task ID missing '.' separator")]
    MissingSeparator,

    /// The ULID portion of a task ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),
}
