//! Role repository.

use async_trait::async_trait;
use kc_model::Role;
use uuid::Uuid;

use crate::error::StorageResult;

/// Realm and client roles, plus the composite edges between them.
///
/// Edges are stored as given. Keeping the graph acyclic is the caller's job.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    /// Stores a new role.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the name is taken in the role's
    /// scope, realm or client.
    async fn create(&self, role: &Role) -> StorageResult<()>;

    /// Removes a role along with every composite edge that points at it.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if the role doesn't exist.
    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()>;

    /// Loads a role by id.
    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<Role>>;

    /// Loads a realm role by name.
    async fn get_realm_role_by_name(&self, realm_id: Uuid, name: &str) -> StorageResult<Option<Role>>;

    /// Loads a client role by name.
    async fn get_client_role_by_name(
        &self,
        realm_id: Uuid,
        client_id: Uuid,
        name: &str,
    ) -> StorageResult<Option<Role>>;

    /// Roles owned by the realm itself.
    async fn list_realm_roles(&self, realm_id: Uuid) -> StorageResult<Vec<Role>>;

    /// Roles owned by one client.
    async fn list_client_roles(&self, realm_id: Uuid, client_id: Uuid) -> StorageResult<Vec<Role>>;

    /// Direct children of `role_id`.
    async fn get_composites(&self, realm_id: Uuid, role_id: Uuid) -> StorageResult<Vec<Role>>;

    /// Adds the edge `composite_id -> role_id`. Existing edges are left alone.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` if either role doesn't exist.
    async fn add_composite(&self, realm_id: Uuid, composite_id: Uuid, role_id: Uuid) -> StorageResult<()>;
}
