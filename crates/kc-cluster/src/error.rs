//! Cluster coordination errors.

use thiserror::Error;

/// Errors raised by locks and the scheduler.
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    /// Lock backend unreachable.
    #[error("lock backend connection error: {0}")]
    Connection(String),

    /// Lock backend did not answer in time.
    #[error("lock backend timeout: {0}")]
    Timeout(String),

    /// Lock operation rejected by the backend.
    #[error("lock error on '{key}': {reason}")]
    Lock {
        /// Lock key.
        key: String,
        /// Backend message.
        reason: String,
    },

    /// Invalid scheduler or lock configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No task registered under this name.
    #[error("no scheduled task named '{0}'")]
    NotScheduled(String),
}

impl ClusterError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a lock error.
    #[must_use]
    pub fn lock(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lock {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns whether the next window may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_) | Self::Lock { .. })
    }
}

impl From<ClusterError> for kc_core::Error {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Configuration(msg) => Self::Configuration(msg),
            ClusterError::NotScheduled(name) => Self::NotFound(format!("scheduled task {name}")),
            ClusterError::Timeout(msg) => Self::Timeout(msg),
            other => Self::Cluster(other.to_string()),
        }
    }
}

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;
