//! Identity provider and identity provider mapper storage traits.

use async_trait::async_trait;
use kc_model::{IdentityProvider, IdentityProviderMapper};
use uuid::Uuid;

use crate::error::StorageResult;

/// What dropping a federation membership did to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detachment {
    /// The provider is gone or was not a member. Nothing changed.
    Unchanged,
    /// Membership dropped; other federations still list the provider.
    Detached,
    /// That was the last membership. The provider and its mappers were deleted.
    Deleted,
}

/// Provider for identity provider storage operations.
///
/// Providers are keyed by alias within a realm.
#[async_trait]
pub trait IdentityProviderProvider: Send + Sync {
    /// Creates a new identity provider.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the alias is taken in the realm.
    async fn create(&self, idp: &IdentityProvider) -> StorageResult<()>;

    /// Replaces the settings of an existing identity provider. Federation
    /// membership is kept as stored; it only changes through
    /// [`attach_federation`](Self::attach_federation) and
    /// [`detach_federation`](Self::detach_federation).
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if no provider has this alias.
    async fn update(&self, idp: &IdentityProvider) -> StorageResult<()>;

    /// Deletes a provider and all of its mappers.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if no provider has this alias.
    async fn delete(&self, realm_id: Uuid, alias: &str) -> StorageResult<()>;

    /// Adds `federation_id` to the provider's memberships. Returns false if
    /// it was already a member.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if no provider has this alias.
    async fn attach_federation(
        &self,
        realm_id: Uuid,
        alias: &str,
        federation_id: Uuid,
    ) -> StorageResult<bool>;

    /// Drops `federation_id` from the provider's memberships and deletes the
    /// provider, mappers included, if no membership remains. Both steps happen
    /// as one operation, so a concurrent attach either lands before and keeps
    /// the provider, or finds it gone.
    async fn detach_federation(
        &self,
        realm_id: Uuid,
        alias: &str,
        federation_id: Uuid,
    ) -> StorageResult<Detachment>;

    /// Gets a provider by alias.
    async fn get_by_alias(
        &self,
        realm_id: Uuid,
        alias: &str,
    ) -> StorageResult<Option<IdentityProvider>>;

    /// Lists all providers of a realm.
    async fn list(&self, realm_id: Uuid) -> StorageResult<Vec<IdentityProvider>>;

    /// Lists providers that are members of a federation.
    async fn list_by_federation(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> StorageResult<Vec<IdentityProvider>>;
}

/// Provider for identity provider mapper storage operations.
#[async_trait]
pub trait IdentityProviderMapperProvider: Send + Sync {
    /// Creates a mapper.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the provider already has a mapper
    /// with this name, `StorageError::NotFound` if the provider doesn't exist.
    async fn create(&self, mapper: &IdentityProviderMapper) -> StorageResult<()>;

    /// Updates a mapper.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the mapper doesn't exist.
    async fn update(&self, mapper: &IdentityProviderMapper) -> StorageResult<()>;

    /// Deletes a mapper.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the mapper doesn't exist.
    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()>;

    /// Lists the mappers attached to a provider.
    async fn list_by_alias(
        &self,
        realm_id: Uuid,
        alias: &str,
    ) -> StorageResult<Vec<IdentityProviderMapper>>;
}
