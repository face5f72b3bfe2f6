//! Storage error types.

use std::fmt::Display;

use thiserror::Error;

/// Errors returned by the repositories.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// No entity matches the key. The key is an id or a unique name.
    #[error("{entity_type} '{key}' not found")]
    NotFound {
        /// Entity kind, e.g. `"Realm"`.
        entity_type: &'static str,
        /// Id or name that was looked up.
        key: String,
    },

    /// A unique constraint would be violated.
    #[error("{entity_type} with {field} '{value}' already exists")]
    Duplicate {
        /// Entity kind.
        entity_type: &'static str,
        /// Constrained field.
        field: &'static str,
        /// Conflicting value.
        value: String,
    },

    /// The backend could not be reached or gave up; the operation may be retried.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates a not found error keyed by id or name.
    #[must_use]
    pub fn not_found(entity_type: &'static str, key: impl Display) -> Self {
        Self::NotFound {
            entity_type,
            key: key.to_string(),
        }
    }

    /// Creates a duplicate error.
    #[must_use]
    pub fn duplicate(entity_type: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type,
            field,
            value: value.into(),
        }
    }

    /// Whether the entity was missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether a unique constraint was hit.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Whether retrying later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StorageError> for kc_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::NotFound(err.to_string()),
            StorageError::Duplicate { .. } => Self::AlreadyExists(err.to_string()),
            StorageError::Unavailable(msg) => Self::Storage(msg),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
