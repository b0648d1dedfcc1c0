//! Errors returned by [`ObjectStore`](crate::ObjectStore) backends.

use std::fmt;

use vela_core::ObjectKey;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{key} not found")]
    NotFound { key: ObjectKey },

    /// A conditional write lost to a newer version.
    #[error("resourceVersion {expected} is stale, stored version is {actual}")]
    VersionConflict { expected: String, actual: String },

    #[error("{key} already exists")]
    AlreadyExists { key: ObjectKey },

    /// The document lacks identity fields or carries unparseable metadata.
    #[error("invalid object: {message}")]
    InvalidObject { message: String },

    #[error("storage backend failure: {message}")]
    Internal { message: String },
}

impl StorageError {
    #[must_use]
    pub fn not_found(key: ObjectKey) -> Self {
        Self::NotFound { key }
    }

    #[must_use]
    pub fn version_conflict(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::VersionConflict {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    #[must_use]
    pub fn already_exists(key: ObjectKey) -> Self {
        Self::AlreadyExists { key }
    }

    #[must_use]
    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// A stale version or a create race. The caller re-reads and starts over.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.category() == ErrorCategory::Conflict
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::VersionConflict { .. } | Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::InvalidObject { .. } => ErrorCategory::Validation,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<vela_core::CoreError> for StorageError {
    fn from(err: vela_core::CoreError) -> Self {
        Self::invalid_object(err.to_string())
    }
}

/// Coarse grouping used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Validation,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Internal => "internal",
        })
    }
}
