//! Cycle-checked composite role edges.
//!
//! Every composite edge the bootstrap or an import adds goes through
//! [`add_composite`], which refuses edges that would make a role reachable
//! from itself.

use std::collections::{HashSet, VecDeque};

use kc_storage::{Storage, StorageError};
use uuid::Uuid;

use crate::error::{BootstrapError, BootstrapResult};

/// Makes `child_id` a composite child of `parent_id`.
///
/// Returns `false` when the edge already exists.
///
/// ## Errors
///
/// Returns `BootstrapError::CompositeCycle` if `parent_id` is reachable from
/// `child_id` (including `parent_id == child_id`), and a storage error if
/// either role does not exist.
pub async fn add_composite(
    storage: &Storage,
    realm_id: Uuid,
    parent_id: Uuid,
    child_id: Uuid,
) -> BootstrapResult<bool> {
    let parent = storage
        .roles
        .get_by_id(realm_id, parent_id)
        .await?
        .ok_or_else(|| StorageError::not_found("Role", parent_id))?;
    let child = storage
        .roles
        .get_by_id(realm_id, child_id)
        .await?
        .ok_or_else(|| StorageError::not_found("Role", child_id))?;

    if parent.has_direct_composite(child_id) {
        return Ok(false);
    }
    if parent_id == child_id || reaches(storage, realm_id, child_id, parent_id).await? {
        return Err(BootstrapError::CompositeCycle {
            parent: parent.name,
            child: child.name,
        });
    }

    storage
        .roles
        .add_composite(realm_id, parent_id, child_id)
        .await?;
    Ok(true)
}

/// Breadth-first search over composite edges from `from` looking for `target`.
async fn reaches(
    storage: &Storage,
    realm_id: Uuid,
    from: Uuid,
    target: Uuid,
) -> BootstrapResult<bool> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([from]);

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let Some(role) = storage.roles.get_by_id(realm_id, id).await? else {
            continue;
        };
        for next in role.composite_roles {
            if next == target {
                return Ok(true);
            }
            queue.push_back(next);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use kc_model::{Realm, Role};

    use super::*;

    async fn realm_with_roles(names: &[&str]) -> (Storage, Uuid, Vec<Uuid>) {
        let storage = Storage::in_memory();
        let realm = Realm::new("acme");
        storage.realms.create(&realm).await.unwrap();
        let mut ids = Vec::new();
        for name in names {
            let role = Role::new_realm_role(realm.id, *name);
            storage.roles.create(&role).await.unwrap();
            ids.push(role.id);
        }
        (storage, realm.id, ids)
    }

    #[tokio::test]
    async fn adds_an_edge_once() {
        let (storage, realm_id, ids) = realm_with_roles(&["a", "b"]).await;

        assert!(add_composite(&storage, realm_id, ids[0], ids[1]).await.unwrap());
        assert!(!add_composite(&storage, realm_id, ids[0], ids[1]).await.unwrap());

        let composites = storage.roles.get_composites(realm_id, ids[0]).await.unwrap();
        assert_eq!(composites.len(), 1);
        assert_eq!(composites[0].name, "b");
    }

    #[tokio::test]
    async fn rejects_a_role_as_its_own_composite() {
        let (storage, realm_id, ids) = realm_with_roles(&["a"]).await;

        let err = add_composite(&storage, realm_id, ids[0], ids[0])
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::CompositeCycle { .. }));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn rejects_indirect_cycles() {
        let (storage, realm_id, ids) = realm_with_roles(&["a", "b", "c"]).await;
        add_composite(&storage, realm_id, ids[0], ids[1]).await.unwrap();
        add_composite(&storage, realm_id, ids[1], ids[2]).await.unwrap();

        let err = add_composite(&storage, realm_id, ids[2], ids[0])
            .await
            .unwrap_err();
        match err {
            BootstrapError::CompositeCycle { parent, child } => {
                assert_eq!(parent, "c");
                assert_eq!(child, "a");
            }
            other => panic!("unexpected error: {other}"),
        }

        let c = storage.roles.get_by_id(realm_id, ids[2]).await.unwrap().unwrap();
        assert!(c.composite_roles.is_empty());
    }

    #[tokio::test]
    async fn shared_children_are_not_cycles() {
        let (storage, realm_id, ids) = realm_with_roles(&["a", "b", "c"]).await;
        add_composite(&storage, realm_id, ids[0], ids[2]).await.unwrap();
        add_composite(&storage, realm_id, ids[1], ids[2]).await.unwrap();

        assert!(add_composite(&storage, realm_id, ids[0], ids[1]).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_role_is_not_found() {
        let (storage, realm_id, ids) = realm_with_roles(&["a"]).await;

        let err = add_composite(&storage, realm_id, ids[0], Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Storage(e) if e.is_not_found()));
    }
}
