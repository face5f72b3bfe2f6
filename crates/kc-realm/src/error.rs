//! Bootstrap error types.

use kc_federation::FederationError;
use kc_storage::StorageError;
use thiserror::Error;

use crate::registry::{DefaultResource, Dependency};

/// Errors that can occur while bootstrapping, importing, or removing a realm.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A postponed resource still lacked its dependency after the retry.
    #[error("{resource} requires {dependency}, which is still unresolved")]
    UnresolvedDependency {
        /// Resource that could not be created.
        resource: DefaultResource,
        /// Missing dependency.
        dependency: Dependency,
    },

    /// Every candidate default role name is taken.
    #[error("no free default role name: {base} and suffixes up to -{limit} are taken")]
    DefaultRoleNamespaceExhausted {
        /// Unsuffixed name.
        base: String,
        /// Highest suffix tried.
        limit: u32,
    },

    /// The composite edge would close a cycle.
    #[error("adding {child} to {parent} would create a composite role cycle")]
    CompositeCycle {
        /// Composite role.
        parent: String,
        /// Role being added.
        child: String,
    },

    /// The realm name is empty or contains reserved characters.
    #[error("invalid realm name: {0:?}")]
    InvalidName(String),

    /// The administrative realm does not exist.
    #[error("admin realm {0} does not exist")]
    AdminRealmMissing(String),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Federation scheduling failure.
    #[error("federation error: {0}")]
    Federation(#[from] FederationError),

    /// The import stage rejected the document.
    #[error("import failed: {0}")]
    Import(String),
}

impl BootstrapError {
    /// Creates an unresolved dependency error.
    #[must_use]
    pub const fn unresolved(resource: DefaultResource, dependency: Dependency) -> Self {
        Self::UnresolvedDependency {
            resource,
            dependency,
        }
    }

    /// Creates an import error.
    #[must_use]
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    /// Checks if this error is fatal and must not be retried.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_duplicate(),
            Self::Federation(e) => e.is_configuration(),
            _ => true,
        }
    }

    /// Checks if retrying the whole bootstrap may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Federation(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<BootstrapError> for kc_core::Error {
    fn from(err: BootstrapError) -> Self {
        match err {
            BootstrapError::Storage(e) => e.into(),
            BootstrapError::Federation(e) => e.into(),
            other => Self::Configuration(other.to_string()),
        }
    }
}

/// Result type for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;
