//! Identity provider federation storage trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kc_model::{FederationMapper, IdentityProviderFederation};
use uuid::Uuid;

use crate::error::StorageResult;

/// Provider for federation and federation mapper template storage.
#[async_trait]
pub trait IdpFederationProvider: Send + Sync {
    /// Creates a federation.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the alias is taken in the realm.
    async fn create(&self, federation: &IdentityProviderFederation) -> StorageResult<()>;

    /// Updates a federation's settings. `last_refresh` and `valid_until` are
    /// kept as stored; only [`mark_refreshed`](Self::mark_refreshed) writes them.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the federation doesn't exist.
    async fn update(&self, federation: &IdentityProviderFederation) -> StorageResult<()>;

    /// Stamps a completed refresh. Only `last_refresh` and `valid_until` are
    /// written, so settings changed while the cycle ran are kept. A `None`
    /// `valid_until` leaves the stored one alone.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the federation doesn't exist.
    async fn mark_refreshed(
        &self,
        realm_id: Uuid,
        id: Uuid,
        at: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    /// Deletes a federation and its mapper templates. Member providers are
    /// left alone; detaching them is the caller's job.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the federation doesn't exist.
    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()>;

    /// Gets a federation by ID.
    async fn get_by_id(
        &self,
        realm_id: Uuid,
        id: Uuid,
    ) -> StorageResult<Option<IdentityProviderFederation>>;

    /// Lists the federations of a realm.
    async fn list(&self, realm_id: Uuid) -> StorageResult<Vec<IdentityProviderFederation>>;

    /// Adds a mapper template.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the name is taken in the federation.
    async fn add_mapper(&self, realm_id: Uuid, mapper: &FederationMapper) -> StorageResult<()>;

    /// Updates a mapper template.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the template doesn't exist and
    /// `StorageError::Duplicate` if a rename collides.
    async fn update_mapper(&self, realm_id: Uuid, mapper: &FederationMapper)
    -> StorageResult<()>;

    /// Removes a mapper template.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the template doesn't exist.
    async fn remove_mapper(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
        mapper_id: Uuid,
    ) -> StorageResult<()>;

    /// Lists mapper templates in insertion order.
    async fn list_mappers(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> StorageResult<Vec<FederationMapper>>;
}
