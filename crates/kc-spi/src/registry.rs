//! Registry mapping type ids to factories.
//!
//! Populated once at process start. Lookups are exact-match on the type id;
//! an unknown id is a configuration error, never a silent default.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::builtin;
use crate::provider::{
    IdentityProviderFactory, IdentityProviderMapperFactory, ProviderMetadata, Spi, SpiError,
};

/// Registry for identity provider and mapper factories.
#[derive(Debug, Default)]
pub struct ProviderTypeRegistry {
    identity_providers: DashMap<&'static str, Arc<dyn IdentityProviderFactory>>,
    mappers: DashMap<&'static str, Arc<dyn IdentityProviderMapperFactory>>,

    /// Default provider ID per SPI.
    defaults: RwLock<HashMap<Spi, &'static str>>,
}

impl ProviderTypeRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in factories.
    #[must_use]
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        builtin::register_all(&registry);
        registry
    }

    /// Registers an identity provider factory.
    ///
    /// ## Errors
    ///
    /// Returns `SpiError::Duplicate` if the id is taken.
    pub fn register_identity_provider(
        &self,
        factory: Arc<dyn IdentityProviderFactory>,
    ) -> Result<(), SpiError> {
        let id = factory.id();
        if self.identity_providers.contains_key(id) {
            return Err(SpiError::Duplicate {
                spi: Spi::IdentityProvider.name(),
                id: id.to_string(),
            });
        }
        self.identity_providers.insert(id, factory);
        Ok(())
    }

    /// Registers a mapper factory.
    ///
    /// ## Errors
    ///
    /// Returns `SpiError::Duplicate` if the id is taken.
    pub fn register_mapper(
        &self,
        factory: Arc<dyn IdentityProviderMapperFactory>,
    ) -> Result<(), SpiError> {
        let id = factory.id();
        if self.mappers.contains_key(id) {
            return Err(SpiError::Duplicate {
                spi: Spi::IdentityProviderMapper.name(),
                id: id.to_string(),
            });
        }
        self.mappers.insert(id, factory);
        Ok(())
    }

    /// Inserts or replaces a factory without the duplicate check.
    pub(crate) fn insert_identity_provider(&self, factory: Arc<dyn IdentityProviderFactory>) {
        self.identity_providers.insert(factory.id(), factory);
    }

    pub(crate) fn insert_mapper(&self, factory: Arc<dyn IdentityProviderMapperFactory>) {
        self.mappers.insert(factory.id(), factory);
    }

    /// Sets the default provider for an SPI.
    pub fn set_default(&self, spi: Spi, provider_id: &'static str) {
        self.defaults.write().insert(spi, provider_id);
    }

    /// Gets the default provider ID for an SPI.
    #[must_use]
    pub fn get_default(&self, spi: Spi) -> Option<&'static str> {
        self.defaults.read().get(&spi).copied()
    }

    /// Looks up an identity provider factory.
    ///
    /// ## Errors
    ///
    /// Returns `SpiError::ProviderNotFound` for an unknown id.
    pub fn identity_provider(
        &self,
        id: &str,
    ) -> Result<Arc<dyn IdentityProviderFactory>, SpiError> {
        self.identity_providers
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SpiError::ProviderNotFound {
                spi: Spi::IdentityProvider.name(),
                id: id.to_string(),
            })
    }

    /// Looks up a mapper factory.
    ///
    /// ## Errors
    ///
    /// Returns `SpiError::ProviderNotFound` for an unknown id.
    pub fn mapper(&self, id: &str) -> Result<Arc<dyn IdentityProviderMapperFactory>, SpiError> {
        self.mappers
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SpiError::ProviderNotFound {
                spi: Spi::IdentityProviderMapper.name(),
                id: id.to_string(),
            })
    }

    /// Checks if a provider is registered.
    #[must_use]
    pub fn has_provider(&self, spi: Spi, provider_id: &str) -> bool {
        match spi {
            Spi::IdentityProvider => self.identity_providers.contains_key(provider_id),
            Spi::IdentityProviderMapper => self.mappers.contains_key(provider_id),
        }
    }

    /// Lists all registered provider IDs for an SPI, sorted.
    #[must_use]
    pub fn list_providers(&self, spi: Spi) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = match spi {
            Spi::IdentityProvider => self.identity_providers.iter().map(|e| *e.key()).collect(),
            Spi::IdentityProviderMapper => self.mappers.iter().map(|e| *e.key()).collect(),
        };
        ids.sort_unstable();
        ids
    }

    /// Gets provider metadata by SPI and provider ID.
    #[must_use]
    pub fn get_metadata(&self, spi: Spi, provider_id: &str) -> Option<ProviderMetadata> {
        match spi {
            Spi::IdentityProvider => self
                .identity_providers
                .get(provider_id)
                .map(|e| e.metadata()),
            Spi::IdentityProviderMapper => self.mappers.get(provider_id).map(|e| e.metadata()),
        }
    }

    /// Applies type defaults and validates an identity provider configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the type is unknown or the configuration is rejected.
    pub fn prepare_identity_provider(
        &self,
        provider_type: &str,
        alias: &str,
        config: &mut HashMap<String, String>,
    ) -> Result<(), SpiError> {
        let factory = self.identity_provider(provider_type)?;
        factory.apply_defaults(config);
        factory.validate(alias, config)
    }

    /// Validates a mapper configuration against its type and the provider type
    /// it will be attached to.
    ///
    /// ## Errors
    ///
    /// Returns an error if the mapper type is unknown, incompatible with the
    /// provider type, or its configuration is rejected.
    pub fn validate_mapper(
        &self,
        provider_type: &str,
        mapper_type: &str,
        config: &HashMap<String, String>,
    ) -> Result<(), SpiError> {
        let factory = self.mapper(mapper_type)?;
        let compatible = factory
            .compatible_providers()
            .iter()
            .any(|p| *p == "*" || *p == provider_type);
        if !compatible {
            return Err(SpiError::invalid_config(
                mapper_type,
                format!("not compatible with provider type '{provider_type}'"),
            ));
        }
        factory.validate(config)
    }

    /// Validates that required providers are registered.
    ///
    /// ## Errors
    ///
    /// Returns an error if a required provider is missing.
    pub fn validate_required(&self, requirements: &[(Spi, &str)]) -> Result<(), SpiError> {
        for (spi, provider_id) in requirements {
            if !self.has_provider(*spi, provider_id) {
                return Err(SpiError::ProviderNotFound {
                    spi: spi.name(),
                    id: (*provider_id).to_string(),
                });
            }
        }
        Ok(())
    }
}
