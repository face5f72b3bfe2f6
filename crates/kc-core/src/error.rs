//! Error taxonomy shared across the workspace.
//!
//! Every crate-level error type converts into [`Error`] and reports one of
//! three [`ErrorKind`]s. The kind decides what a caller does next:
//!
//! - **Configuration** failures are fatal for the operation and never retried.
//! - **Transient** failures are logged; the next scheduled window retries.
//! - **Partial-apply** failures leave already-applied work in place and are
//!   recorded alongside the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid setup; surfaced to the caller, never retried.
    Configuration,
    /// Timeout or unavailable collaborator; retried on the next window.
    Transient,
    /// Some operations of a batch were applied before the failure.
    PartialApply,
}

/// Main error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Timeout waiting on a collaborator.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Cluster coordination error.
    #[error("cluster error: {0}")]
    Cluster(String),

    /// A batch was partially applied.
    #[error("partially applied: {applied} applied, {failed} failed")]
    PartialApply {
        /// Operations that succeeded.
        applied: usize,
        /// Operations that failed.
        failed: usize,
    },

    /// Resource not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Returns the failure category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::NotFound(_) | Self::AlreadyExists(_) => {
                ErrorKind::Configuration
            }
            Self::PartialApply { .. } => ErrorKind::PartialApply,
            Self::Storage(_) | Self::Timeout(_) | Self::Cluster(_) | Self::Internal(_) => {
                ErrorKind::Transient
            }
        }
    }

    /// Returns whether this error is fatal for the operation.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }

    /// Returns whether the next scheduled window should retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }
}
