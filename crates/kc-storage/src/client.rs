//! Client repository.

use async_trait::async_trait;
use kc_model::Client;
use uuid::Uuid;

use crate::error::StorageResult;

/// Clients of a realm, keyed by id and by their unique `client_id`.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Stores a new client.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if `client_id` is taken in the realm
    /// and `StorageError::NotFound` if the realm is unknown.
    async fn create(&self, client: &Client) -> StorageResult<()>;

    /// Replaces a stored client.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown client.
    async fn update(&self, client: &Client) -> StorageResult<()>;

    /// Removes the client together with its roles.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown client.
    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()>;

    /// Loads a client by id.
    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<Client>>;

    /// Loads a client by `client_id`.
    async fn get_by_client_id(&self, realm_id: Uuid, client_id: &str) -> StorageResult<Option<Client>>;

    /// Every client of the realm.
    async fn list(&self, realm_id: Uuid) -> StorageResult<Vec<Client>>;

    /// Maps `role_id` into the client's tokens when full scope is off.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the client or the role is unknown.
    async fn add_scope_mapping(&self, realm_id: Uuid, id: Uuid, role_id: Uuid) -> StorageResult<()>;
}
