//! Realm repository.

use async_trait::async_trait;
use kc_model::Realm;
use uuid::Uuid;

use crate::error::StorageResult;

/// Realms. A realm's id and name are both unique.
#[async_trait]
pub trait RealmProvider: Send + Sync {
    /// Stores a new realm.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the id or name is taken.
    async fn create(&self, realm: &Realm) -> StorageResult<()>;

    /// Replaces a stored realm.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown realm and
    /// `StorageError::Duplicate` when a rename collides.
    async fn update(&self, realm: &Realm) -> StorageResult<()>;

    /// Removes the realm and every resource it owns, federations and
    /// identity providers included.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown realm.
    async fn delete(&self, id: Uuid) -> StorageResult<()>;

    /// Loads a realm by id.
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Realm>>;

    /// Loads a realm by name.
    async fn get_by_name(&self, name: &str) -> StorageResult<Option<Realm>>;

    /// Every realm, in no particular order.
    async fn list(&self) -> StorageResult<Vec<Realm>>;
}
