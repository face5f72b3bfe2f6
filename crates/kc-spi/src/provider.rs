//! Factory traits for identity provider types and mapper types.

use std::collections::HashMap;
use std::fmt::Debug;

use thiserror::Error;

/// Error type for SPI operations.
#[derive(Debug, Clone, Error)]
pub enum SpiError {
    /// No factory is registered under this id.
    #[error("no {spi} provider registered with id '{id}'")]
    ProviderNotFound {
        /// Extension point.
        spi: &'static str,
        /// Requested type id.
        id: String,
    },

    /// A factory with this id is already registered.
    #[error("{spi} provider '{id}' is already registered")]
    Duplicate {
        /// Extension point.
        spi: &'static str,
        /// Type id.
        id: String,
    },

    /// Configuration rejected by the factory.
    #[error("invalid configuration for '{id}': {reason}")]
    InvalidConfig {
        /// Type id of the rejecting factory.
        id: String,
        /// Why the configuration was rejected.
        reason: String,
    },
}

impl SpiError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl From<SpiError> for kc_core::Error {
    fn from(err: SpiError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Extension points served by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spi {
    /// Identity provider types (`saml`, `oidc`, ...).
    IdentityProvider,
    /// Identity provider mapper types.
    IdentityProviderMapper,
}

impl Spi {
    /// Returns the unique name of this SPI.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IdentityProvider => "identity-provider",
            Self::IdentityProviderMapper => "identity-provider-mapper",
        }
    }
}

/// Metadata about a provider type.
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Unique identifier for this provider type.
    pub id: &'static str,

    /// Human-readable name.
    pub name: &'static str,

    /// Description of what this provider type does.
    pub description: &'static str,
}

/// Factory for one identity provider type.
pub trait IdentityProviderFactory: Send + Sync + Debug {
    /// Returns the type id (`saml`, `oidc`, ...).
    fn id(&self) -> &'static str;

    /// Returns metadata about this type.
    fn metadata(&self) -> ProviderMetadata;

    /// Fills in type-specific configuration defaults. Existing keys are kept.
    fn apply_defaults(&self, _config: &mut HashMap<String, String>) {}

    /// Validates a provider configuration.
    ///
    /// ## Errors
    ///
    /// Returns `SpiError::InvalidConfig` describing the first problem found.
    fn validate(&self, alias: &str, config: &HashMap<String, String>) -> Result<(), SpiError>;
}

/// Factory for one identity provider mapper type.
pub trait IdentityProviderMapperFactory: Send + Sync + Debug {
    /// Returns the type id.
    fn id(&self) -> &'static str;

    /// Returns metadata about this type.
    fn metadata(&self) -> ProviderMetadata;

    /// Provider types this mapper can be attached to. `"*"` matches any.
    fn compatible_providers(&self) -> &'static [&'static str] {
        &["*"]
    }

    /// Validates a mapper configuration.
    ///
    /// ## Errors
    ///
    /// Returns `SpiError::InvalidConfig` describing the first problem found.
    fn validate(&self, config: &HashMap<String, String>) -> Result<(), SpiError>;
}

/// Checks that every key in `keys` is present and non-blank.
///
/// ## Errors
///
/// Returns `SpiError::InvalidConfig` naming the first missing key.
pub fn require_keys(
    id: &str,
    config: &HashMap<String, String>,
    keys: &[&str],
) -> Result<(), SpiError> {
    for key in keys {
        match config.get(*key) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err(SpiError::invalid_config(id, format!("missing '{key}'"))),
        }
    }
    Ok(())
}
