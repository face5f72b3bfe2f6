//! Federation error types.

use kc_cluster::ClusterError;
use kc_spi::SpiError;
use kc_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Invalid federation, mapper, or schedule.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Metadata could not be retrieved.
    #[error("metadata fetch failed for {url}: {reason}")]
    Fetch {
        /// Metadata source.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// Metadata retrieval did not finish in time.
    #[error("metadata fetch timed out for {0}")]
    Timeout(String),

    /// Federation or mapper template does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Provider or mapper type rejected the configuration.
    #[error(transparent)]
    Spi(#[from] SpiError),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Scheduler failure.
    #[error("scheduler error: {0}")]
    Cluster(#[from] ClusterError),
}

impl FederationError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a fetch error.
    #[must_use]
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Checks if this error is fatal and must not be retried.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::NotFound(_) | Self::Spi(_) => true,
            Self::Storage(e) => e.is_duplicate(),
            Self::Cluster(ClusterError::Configuration(_) | ClusterError::NotScheduled(_)) => true,
            _ => false,
        }
    }

    /// Checks if the next scheduled window may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { .. } | Self::Timeout(_) => true,
            Self::Storage(e) => e.is_transient(),
            Self::Cluster(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<FederationError> for kc_core::Error {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::Storage(e) => e.into(),
            FederationError::Cluster(e) => e.into(),
            FederationError::Spi(e) => e.into(),
            FederationError::Configuration(msg) => Self::Configuration(msg),
            FederationError::NotFound(what) => Self::NotFound(what),
            FederationError::Timeout(url) => Self::Timeout(format!("metadata fetch for {url}")),
            fetch @ FederationError::Fetch { .. } => Self::Storage(fetch.to_string()),
        }
    }
}

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;
