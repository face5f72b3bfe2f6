//! In-memory storage backend.
//!
//! Every realm's data lives behind its own lock, so deleting a realm drops
//! everything it owns in one step. Reads hand out clones.
//!
//! [`MemoryStore::fail_on`] makes a named operation return
//! `StorageError::Unavailable` until [`MemoryStore::clear_faults`] is called.
//! Operation names are `<entity>.<verb>`, for example `idp.create`,
//! `idp_mapper.create`, `federation.mark_refreshed`, `role.add_composite`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kc_model::{
    Client, FederationMapper, IdentityProvider, IdentityProviderFederation,
    IdentityProviderMapper, Realm, Role,
};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::client::ClientProvider;
use crate::error::{StorageError, StorageResult};
use crate::federation::IdpFederationProvider;
use crate::identity_provider::{
    Detachment, IdentityProviderMapperProvider, IdentityProviderProvider,
};
use crate::realm::RealmProvider;
use crate::role::RoleProvider;

/// Everything one realm owns.
#[derive(Debug)]
struct RealmData {
    realm: Realm,
    clients: HashMap<Uuid, Client>,
    roles: HashMap<Uuid, Role>,
    identity_providers: BTreeMap<String, IdentityProvider>,
    idp_mappers: HashMap<Uuid, IdentityProviderMapper>,
    federations: HashMap<Uuid, IdentityProviderFederation>,
    /// Insertion order is the template application order.
    federation_mappers: Vec<FederationMapper>,
}

impl RealmData {
    fn new(realm: Realm) -> Self {
        Self {
            realm,
            clients: HashMap::new(),
            roles: HashMap::new(),
            identity_providers: BTreeMap::new(),
            idp_mappers: HashMap::new(),
            federations: HashMap::new(),
            federation_mappers: Vec::new(),
        }
    }

    /// Drops every reference to a deleted role.
    fn forget_role(&mut self, role_id: Uuid) {
        for role in self.roles.values_mut() {
            role.composite_roles.retain(|id| *id != role_id);
        }
        for client in self.clients.values_mut() {
            client.scope_mappings.remove(&role_id);
        }
        if self.realm.default_role_id == Some(role_id) {
            self.realm.default_role_id = None;
        }
    }
}

/// In-memory implementation of every storage provider trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    realms: DashMap<Uuid, Arc<RwLock<RealmData>>>,
    names: DashMap<String, Uuid>,
    faults: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `operation` fail with a connection error.
    pub fn fail_on(&self, operation: impl Into<String>) {
        self.faults.lock().insert(operation.into());
    }

    /// Removes every injected failure.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn check(&self, operation: &str) -> StorageResult<()> {
        if self.faults.lock().contains(operation) {
            return Err(StorageError::Unavailable(format!(
                "injected failure on {operation}"
            )));
        }
        Ok(())
    }

    fn realm_data(&self, realm_id: Uuid) -> StorageResult<Arc<RwLock<RealmData>>> {
        self.realms
            .get(&realm_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StorageError::not_found("Realm", realm_id))
    }

    fn try_realm_data(&self, realm_id: Uuid) -> Option<Arc<RwLock<RealmData>>> {
        self.realms.get(&realm_id).map(|entry| Arc::clone(entry.value()))
    }
}

// ============================================================================
// Realms
// ============================================================================

#[async_trait]
impl RealmProvider for MemoryStore {
    async fn create(&self, realm: &Realm) -> StorageResult<()> {
        self.check("realm.create")?;
        if self.realms.contains_key(&realm.id) {
            return Err(StorageError::duplicate("Realm", "id", realm.id.to_string()));
        }
        match self.names.entry(realm.name.clone()) {
            Entry::Occupied(_) => Err(StorageError::duplicate("Realm", "name", &realm.name)),
            Entry::Vacant(slot) => {
                slot.insert(realm.id);
                self.realms
                    .insert(realm.id, Arc::new(RwLock::new(RealmData::new(realm.clone()))));
                Ok(())
            }
        }
    }

    async fn update(&self, realm: &Realm) -> StorageResult<()> {
        self.check("realm.update")?;
        let data = self.realm_data(realm.id)?;
        let mut data = data.write();
        if data.realm.name != realm.name {
            match self.names.entry(realm.name.clone()) {
                Entry::Occupied(_) => {
                    return Err(StorageError::duplicate("Realm", "name", &realm.name));
                }
                Entry::Vacant(slot) => {
                    slot.insert(realm.id);
                }
            }
            self.names.remove(&data.realm.name);
        }
        data.realm = realm.clone();
        data.realm.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StorageResult<()> {
        self.check("realm.delete")?;
        let (_, data) = self
            .realms
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("Realm", id))?;
        let name = data.read().realm.name.clone();
        self.names.remove(&name);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Realm>> {
        Ok(self.try_realm_data(id).map(|data| data.read().realm.clone()))
    }

    async fn get_by_name(&self, name: &str) -> StorageResult<Option<Realm>> {
        let id = self.names.get(name).map(|entry| *entry.value());
        Ok(id
            .and_then(|id| self.try_realm_data(id))
            .map(|data| data.read().realm.clone()))
    }

    async fn list(&self) -> StorageResult<Vec<Realm>> {
        let mut realms: Vec<Realm> = self
            .realms
            .iter()
            .map(|entry| entry.value().read().realm.clone())
            .collect();
        realms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(realms)
    }
}

// ============================================================================
// Clients
// ============================================================================

#[async_trait]
impl ClientProvider for MemoryStore {
    async fn create(&self, client: &Client) -> StorageResult<()> {
        self.check("client.create")?;
        let data = self.realm_data(client.realm_id)?;
        let mut data = data.write();
        if data
            .clients
            .values()
            .any(|c| c.client_id == client.client_id)
        {
            return Err(StorageError::duplicate(
                "Client",
                "client_id",
                &client.client_id,
            ));
        }
        data.clients.insert(client.id, client.clone());
        Ok(())
    }

    async fn update(&self, client: &Client) -> StorageResult<()> {
        self.check("client.update")?;
        let data = self.realm_data(client.realm_id)?;
        let mut data = data.write();
        let slot = data
            .clients
            .get_mut(&client.id)
            .ok_or_else(|| StorageError::not_found("Client", client.id))?;
        *slot = client.clone();
        slot.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()> {
        self.check("client.delete")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        data.clients
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("Client", id))?;
        let owned: Vec<Uuid> = data
            .roles
            .values()
            .filter(|r| r.client_id == Some(id))
            .map(|r| r.id)
            .collect();
        for role_id in owned {
            data.roles.remove(&role_id);
            data.forget_role(role_id);
        }
        Ok(())
    }

    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<Client>> {
        Ok(self
            .try_realm_data(realm_id)
            .and_then(|data| data.read().clients.get(&id).cloned()))
    }

    async fn get_by_client_id(
        &self,
        realm_id: Uuid,
        client_id: &str,
    ) -> StorageResult<Option<Client>> {
        Ok(self.try_realm_data(realm_id).and_then(|data| {
            data.read()
                .clients
                .values()
                .find(|c| c.client_id == client_id)
                .cloned()
        }))
    }

    async fn list(&self, realm_id: Uuid) -> StorageResult<Vec<Client>> {
        let data = self.realm_data(realm_id)?;
        let mut clients: Vec<Client> = data.read().clients.values().cloned().collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(clients)
    }

    async fn add_scope_mapping(
        &self,
        realm_id: Uuid,
        id: Uuid,
        role_id: Uuid,
    ) -> StorageResult<()> {
        self.check("client.add_scope_mapping")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        if !data.roles.contains_key(&role_id) {
            return Err(StorageError::not_found("Role", role_id));
        }
        let client = data
            .clients
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("Client", id))?;
        client.scope_mappings.insert(role_id);
        Ok(())
    }
}

// ============================================================================
// Roles
// ============================================================================

#[async_trait]
impl RoleProvider for MemoryStore {
    async fn create(&self, role: &Role) -> StorageResult<()> {
        self.check("role.create")?;
        let data = self.realm_data(role.realm_id)?;
        let mut data = data.write();
        if let Some(client_id) = role.client_id
            && !data.clients.contains_key(&client_id)
        {
            return Err(StorageError::not_found("Client", client_id));
        }
        if data
            .roles
            .values()
            .any(|r| r.client_id == role.client_id && r.name == role.name)
        {
            return Err(StorageError::duplicate("Role", "name", &role.name));
        }
        data.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()> {
        self.check("role.delete")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        data.roles
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("Role", id))?;
        data.forget_role(id);
        Ok(())
    }

    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<Role>> {
        Ok(self
            .try_realm_data(realm_id)
            .and_then(|data| data.read().roles.get(&id).cloned()))
    }

    async fn get_realm_role_by_name(
        &self,
        realm_id: Uuid,
        name: &str,
    ) -> StorageResult<Option<Role>> {
        Ok(self.try_realm_data(realm_id).and_then(|data| {
            data.read()
                .roles
                .values()
                .find(|r| r.client_id.is_none() && r.name == name)
                .cloned()
        }))
    }

    async fn get_client_role_by_name(
        &self,
        realm_id: Uuid,
        client_id: Uuid,
        name: &str,
    ) -> StorageResult<Option<Role>> {
        Ok(self.try_realm_data(realm_id).and_then(|data| {
            data.read()
                .roles
                .values()
                .find(|r| r.client_id == Some(client_id) && r.name == name)
                .cloned()
        }))
    }

    async fn list_realm_roles(&self, realm_id: Uuid) -> StorageResult<Vec<Role>> {
        let data = self.realm_data(realm_id)?;
        let mut roles: Vec<Role> = data
            .read()
            .roles
            .values()
            .filter(|r| r.is_realm_role())
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn list_client_roles(&self, realm_id: Uuid, client_id: Uuid) -> StorageResult<Vec<Role>> {
        let data = self.realm_data(realm_id)?;
        let mut roles: Vec<Role> = data
            .read()
            .roles
            .values()
            .filter(|r| r.client_id == Some(client_id))
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn get_composites(&self, realm_id: Uuid, role_id: Uuid) -> StorageResult<Vec<Role>> {
        let data = self.realm_data(realm_id)?;
        let data = data.read();
        let role = data
            .roles
            .get(&role_id)
            .ok_or_else(|| StorageError::not_found("Role", role_id))?;
        Ok(role
            .composite_roles
            .iter()
            .filter_map(|id| data.roles.get(id).cloned())
            .collect())
    }

    async fn add_composite(
        &self,
        realm_id: Uuid,
        composite_id: Uuid,
        role_id: Uuid,
    ) -> StorageResult<()> {
        self.check("role.add_composite")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        if !data.roles.contains_key(&role_id) {
            return Err(StorageError::not_found("Role", role_id));
        }
        let composite = data
            .roles
            .get_mut(&composite_id)
            .ok_or_else(|| StorageError::not_found("Role", composite_id))?;
        if !composite.composite_roles.contains(&role_id) {
            composite.composite_roles.push(role_id);
            composite.updated_at = Utc::now();
        }
        Ok(())
    }
}

// ============================================================================
// Identity providers
// ============================================================================

#[async_trait]
impl IdentityProviderProvider for MemoryStore {
    async fn create(&self, idp: &IdentityProvider) -> StorageResult<()> {
        self.check("idp.create")?;
        let data = self.realm_data(idp.realm_id)?;
        let mut data = data.write();
        if data.identity_providers.contains_key(&idp.alias) {
            return Err(StorageError::duplicate(
                "IdentityProvider",
                "alias",
                &idp.alias,
            ));
        }
        data.identity_providers
            .insert(idp.alias.clone(), idp.clone());
        Ok(())
    }

    async fn update(&self, idp: &IdentityProvider) -> StorageResult<()> {
        self.check("idp.update")?;
        let data = self.realm_data(idp.realm_id)?;
        let mut data = data.write();
        let slot = data
            .identity_providers
            .get_mut(&idp.alias)
            .ok_or_else(|| StorageError::not_found("IdentityProvider", &idp.alias))?;
        let federations = std::mem::take(&mut slot.federations);
        *slot = idp.clone();
        slot.federations = federations;
        slot.updated_at = Utc::now();
        Ok(())
    }

    async fn attach_federation(
        &self,
        realm_id: Uuid,
        alias: &str,
        federation_id: Uuid,
    ) -> StorageResult<bool> {
        self.check("idp.attach_federation")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        let slot = data
            .identity_providers
            .get_mut(alias)
            .ok_or_else(|| StorageError::not_found("IdentityProvider", alias))?;
        Ok(slot.attach_federation(federation_id))
    }

    async fn detach_federation(
        &self,
        realm_id: Uuid,
        alias: &str,
        federation_id: Uuid,
    ) -> StorageResult<Detachment> {
        self.check("idp.detach_federation")?;
        let Some(data) = self.try_realm_data(realm_id) else {
            return Ok(Detachment::Unchanged);
        };
        let mut data = data.write();
        let Some(slot) = data.identity_providers.get_mut(alias) else {
            return Ok(Detachment::Unchanged);
        };
        if !slot.detach_federation(federation_id) {
            return Ok(Detachment::Unchanged);
        }
        if !slot.federations.is_empty() {
            slot.updated_at = Utc::now();
            return Ok(Detachment::Detached);
        }
        data.identity_providers.remove(alias);
        data.idp_mappers
            .retain(|_, m| m.identity_provider_alias != alias);
        Ok(Detachment::Deleted)
    }

    async fn delete(&self, realm_id: Uuid, alias: &str) -> StorageResult<()> {
        self.check("idp.delete")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        data.identity_providers
            .remove(alias)
            .ok_or_else(|| StorageError::not_found("IdentityProvider", alias))?;
        data.idp_mappers
            .retain(|_, m| m.identity_provider_alias != alias);
        Ok(())
    }

    async fn get_by_alias(
        &self,
        realm_id: Uuid,
        alias: &str,
    ) -> StorageResult<Option<IdentityProvider>> {
        Ok(self
            .try_realm_data(realm_id)
            .and_then(|data| data.read().identity_providers.get(alias).cloned()))
    }

    async fn list(&self, realm_id: Uuid) -> StorageResult<Vec<IdentityProvider>> {
        let data = self.realm_data(realm_id)?;
        let providers = data.read().identity_providers.values().cloned().collect();
        Ok(providers)
    }

    async fn list_by_federation(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> StorageResult<Vec<IdentityProvider>> {
        let data = self.realm_data(realm_id)?;
        let providers = data
            .read()
            .identity_providers
            .values()
            .filter(|idp| idp.is_member_of(federation_id))
            .cloned()
            .collect();
        Ok(providers)
    }
}

#[async_trait]
impl IdentityProviderMapperProvider for MemoryStore {
    async fn create(&self, mapper: &IdentityProviderMapper) -> StorageResult<()> {
        self.check("idp_mapper.create")?;
        let data = self.realm_data(mapper.realm_id)?;
        let mut data = data.write();
        if !data
            .identity_providers
            .contains_key(&mapper.identity_provider_alias)
        {
            return Err(StorageError::not_found(
                "IdentityProvider",
                &mapper.identity_provider_alias,
            ));
        }
        if data.idp_mappers.values().any(|m| {
            m.identity_provider_alias == mapper.identity_provider_alias && m.name == mapper.name
        }) {
            return Err(StorageError::duplicate(
                "IdentityProviderMapper",
                "name",
                &mapper.name,
            ));
        }
        data.idp_mappers.insert(mapper.id, mapper.clone());
        Ok(())
    }

    async fn update(&self, mapper: &IdentityProviderMapper) -> StorageResult<()> {
        self.check("idp_mapper.update")?;
        let data = self.realm_data(mapper.realm_id)?;
        let mut data = data.write();
        let slot = data
            .idp_mappers
            .get_mut(&mapper.id)
            .ok_or_else(|| StorageError::not_found("IdentityProviderMapper", mapper.id))?;
        *slot = mapper.clone();
        Ok(())
    }

    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()> {
        self.check("idp_mapper.delete")?;
        let data = self.realm_data(realm_id)?;
        data.write()
            .idp_mappers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("IdentityProviderMapper", id))
    }

    async fn list_by_alias(
        &self,
        realm_id: Uuid,
        alias: &str,
    ) -> StorageResult<Vec<IdentityProviderMapper>> {
        let data = self.realm_data(realm_id)?;
        let mut mappers: Vec<IdentityProviderMapper> = data
            .read()
            .idp_mappers
            .values()
            .filter(|m| m.identity_provider_alias == alias)
            .cloned()
            .collect();
        mappers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(mappers)
    }
}

// ============================================================================
// Federations
// ============================================================================

#[async_trait]
impl IdpFederationProvider for MemoryStore {
    async fn create(&self, federation: &IdentityProviderFederation) -> StorageResult<()> {
        self.check("federation.create")?;
        let data = self.realm_data(federation.realm_id)?;
        let mut data = data.write();
        if data
            .federations
            .values()
            .any(|f| f.alias == federation.alias || f.id == federation.id)
        {
            return Err(StorageError::duplicate(
                "IdentityProviderFederation",
                "alias",
                &federation.alias,
            ));
        }
        data.federations.insert(federation.id, federation.clone());
        Ok(())
    }

    async fn update(&self, federation: &IdentityProviderFederation) -> StorageResult<()> {
        self.check("federation.update")?;
        let data = self.realm_data(federation.realm_id)?;
        let mut data = data.write();
        let slot = data.federations.get_mut(&federation.id).ok_or_else(|| {
            StorageError::not_found("IdentityProviderFederation", federation.id)
        })?;
        let (last_refresh, valid_until) = (slot.last_refresh, slot.valid_until);
        *slot = federation.clone();
        slot.last_refresh = last_refresh;
        slot.valid_until = valid_until;
        Ok(())
    }

    async fn mark_refreshed(
        &self,
        realm_id: Uuid,
        id: Uuid,
        at: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        self.check("federation.mark_refreshed")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        let slot = data
            .federations
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("IdentityProviderFederation", id))?;
        slot.mark_refreshed(at, valid_until);
        Ok(())
    }

    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()> {
        self.check("federation.delete")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        data.federations
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("IdentityProviderFederation", id))?;
        data.federation_mappers.retain(|m| m.federation_id != id);
        Ok(())
    }

    async fn get_by_id(
        &self,
        realm_id: Uuid,
        id: Uuid,
    ) -> StorageResult<Option<IdentityProviderFederation>> {
        Ok(self
            .try_realm_data(realm_id)
            .and_then(|data| data.read().federations.get(&id).cloned()))
    }

    async fn list(&self, realm_id: Uuid) -> StorageResult<Vec<IdentityProviderFederation>> {
        let data = self.realm_data(realm_id)?;
        let mut federations: Vec<IdentityProviderFederation> =
            data.read().federations.values().cloned().collect();
        federations.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(federations)
    }

    async fn add_mapper(&self, realm_id: Uuid, mapper: &FederationMapper) -> StorageResult<()> {
        self.check("federation.add_mapper")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        if !data.federations.contains_key(&mapper.federation_id) {
            return Err(StorageError::not_found(
                "IdentityProviderFederation",
                mapper.federation_id,
            ));
        }
        if data
            .federation_mappers
            .iter()
            .any(|m| m.federation_id == mapper.federation_id && m.name == mapper.name)
        {
            return Err(StorageError::duplicate(
                "FederationMapper",
                "name",
                &mapper.name,
            ));
        }
        data.federation_mappers.push(mapper.clone());
        Ok(())
    }

    async fn update_mapper(
        &self,
        realm_id: Uuid,
        mapper: &FederationMapper,
    ) -> StorageResult<()> {
        self.check("federation.update_mapper")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        if data.federation_mappers.iter().any(|m| {
            m.federation_id == mapper.federation_id && m.name == mapper.name && m.id != mapper.id
        }) {
            return Err(StorageError::duplicate(
                "FederationMapper",
                "name",
                &mapper.name,
            ));
        }
        let slot = data
            .federation_mappers
            .iter_mut()
            .find(|m| m.id == mapper.id && m.federation_id == mapper.federation_id)
            .ok_or_else(|| StorageError::not_found("FederationMapper", mapper.id))?;
        *slot = mapper.clone();
        Ok(())
    }

    async fn remove_mapper(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
        mapper_id: Uuid,
    ) -> StorageResult<()> {
        self.check("federation.remove_mapper")?;
        let data = self.realm_data(realm_id)?;
        let mut data = data.write();
        let before = data.federation_mappers.len();
        data.federation_mappers
            .retain(|m| !(m.id == mapper_id && m.federation_id == federation_id));
        if data.federation_mappers.len() == before {
            return Err(StorageError::not_found("FederationMapper", mapper_id));
        }
        Ok(())
    }

    async fn list_mappers(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> StorageResult<Vec<FederationMapper>> {
        let data = self.realm_data(realm_id)?;
        let mappers = data
            .read()
            .federation_mappers
            .iter()
            .filter(|m| m.federation_id == federation_id)
            .cloned()
            .collect();
        Ok(mappers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_realm() -> (MemoryStore, Realm) {
        let store = MemoryStore::new();
        let realm = Realm::new("acme");
        RealmProvider::create(&store, &realm).await.unwrap();
        (store, realm)
    }

    #[tokio::test]
    async fn realm_names_are_unique() {
        let (store, _) = store_with_realm().await;

        let err = RealmProvider::create(&store, &Realm::new("acme"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn realm_delete_cascades() {
        let (store, realm) = store_with_realm().await;
        let client = Client::new(realm.id, "app");
        ClientProvider::create(&store, &client).await.unwrap();
        let idp = IdentityProvider::new(realm.id, "corp", "oidc");
        IdentityProviderProvider::create(&store, &idp).await.unwrap();

        RealmProvider::delete(&store, realm.id).await.unwrap();

        assert!(RealmProvider::get_by_name(&store, "acme").await.unwrap().is_none());
        assert!(
            ClientProvider::get_by_id(&store, realm.id, client.id)
                .await
                .unwrap()
                .is_none()
        );
        // Name is free again.
        RealmProvider::create(&store, &Realm::new("acme")).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_a_role_drops_edges_to_it() {
        let (store, realm) = store_with_realm().await;
        let parent = Role::new_realm_role(realm.id, "parent");
        let child = Role::new_realm_role(realm.id, "child");
        RoleProvider::create(&store, &parent).await.unwrap();
        RoleProvider::create(&store, &child).await.unwrap();
        store.add_composite(realm.id, parent.id, child.id).await.unwrap();
        store.add_composite(realm.id, parent.id, child.id).await.unwrap();

        assert_eq!(store.get_composites(realm.id, parent.id).await.unwrap().len(), 1);

        RoleProvider::delete(&store, realm.id, child.id).await.unwrap();
        let parent = RoleProvider::get_by_id(&store, realm.id, parent.id)
            .await
            .unwrap()
            .unwrap();
        assert!(parent.composite_roles.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_provider_drops_its_mappers() {
        let (store, realm) = store_with_realm().await;
        let idp = IdentityProvider::new(realm.id, "corp", "oidc");
        IdentityProviderProvider::create(&store, &idp).await.unwrap();
        let mapper = IdentityProviderMapper::new(realm.id, "corp", "m", "hardcoded-role-idp-mapper");
        IdentityProviderMapperProvider::create(&store, &mapper)
            .await
            .unwrap();

        IdentityProviderProvider::delete(&store, realm.id, "corp")
            .await
            .unwrap();

        assert!(store.list_by_alias(realm.id, "corp").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_keeps_stored_memberships() {
        let (store, realm) = store_with_realm().await;
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let idp = IdentityProvider::new(realm.id, "corp", "oidc");
        IdentityProviderProvider::create(&store, &idp).await.unwrap();
        assert!(store.attach_federation(realm.id, "corp", a).await.unwrap());
        assert!(!store.attach_federation(realm.id, "corp", a).await.unwrap());

        // A copy read before `b` joined must not drop `b` when written back.
        let mut stale = IdentityProviderProvider::get_by_alias(&store, realm.id, "corp")
            .await
            .unwrap()
            .unwrap();
        store.attach_federation(realm.id, "corp", b).await.unwrap();
        stale.display_name = Some("Corp".into());
        stale.federations.clear();
        IdentityProviderProvider::update(&store, &stale).await.unwrap();

        let stored = IdentityProviderProvider::get_by_alias(&store, realm.id, "corp")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Corp"));
        assert!(stored.is_member_of(a) && stored.is_member_of(b));
    }

    #[tokio::test]
    async fn detaching_the_last_membership_deletes_the_provider() {
        let (store, realm) = store_with_realm().await;
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let idp = IdentityProvider::new(realm.id, "corp", "oidc");
        IdentityProviderProvider::create(&store, &idp).await.unwrap();
        store.attach_federation(realm.id, "corp", a).await.unwrap();
        store.attach_federation(realm.id, "corp", b).await.unwrap();
        let mapper = IdentityProviderMapper::new(realm.id, "corp", "m", "hardcoded-role-idp-mapper");
        IdentityProviderMapperProvider::create(&store, &mapper)
            .await
            .unwrap();

        assert_eq!(
            store.detach_federation(realm.id, "corp", a).await.unwrap(),
            Detachment::Detached
        );
        assert_eq!(
            store.detach_federation(realm.id, "corp", a).await.unwrap(),
            Detachment::Unchanged
        );
        assert_eq!(
            store.detach_federation(realm.id, "corp", b).await.unwrap(),
            Detachment::Deleted
        );
        assert!(
            IdentityProviderProvider::get_by_alias(&store, realm.id, "corp")
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.list_by_alias(realm.id, "corp").await.unwrap().is_empty());
        assert_eq!(
            store.detach_federation(realm.id, "corp", b).await.unwrap(),
            Detachment::Unchanged
        );
    }

    #[tokio::test]
    async fn hand_made_providers_are_never_deleted_by_detach() {
        let (store, realm) = store_with_realm().await;
        let idp = IdentityProvider::new(realm.id, "corp", "oidc");
        IdentityProviderProvider::create(&store, &idp).await.unwrap();

        assert_eq!(
            store
                .detach_federation(realm.id, "corp", Uuid::now_v7())
                .await
                .unwrap(),
            Detachment::Unchanged
        );
        assert!(
            IdentityProviderProvider::get_by_alias(&store, realm.id, "corp")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn mark_refreshed_only_touches_refresh_fields() {
        let (store, realm) = store_with_realm().await;
        let federation = IdentityProviderFederation::new(realm.id, "edu", "saml", "https://md", 60);
        IdpFederationProvider::create(&store, &federation).await.unwrap();

        let mut edited = federation.clone();
        edited.url = "https://md2".into();
        edited.refresh_interval_secs = 600;
        IdpFederationProvider::update(&store, &edited).await.unwrap();

        let at = Utc::now();
        store
            .mark_refreshed(realm.id, federation.id, at, None)
            .await
            .unwrap();

        let stored = IdpFederationProvider::get_by_id(&store, realm.id, federation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.url, "https://md2");
        assert_eq!(stored.refresh_interval_secs, 600);
        assert_eq!(stored.last_refresh, Some(at));
        assert!(stored.valid_until.is_none());

        let err = store
            .mark_refreshed(realm.id, Uuid::now_v7(), at, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn federation_mapper_names_are_unique_per_federation() {
        let (store, realm) = store_with_realm().await;
        let federation = IdentityProviderFederation::new(realm.id, "edu", "saml", "https://md", 60);
        IdpFederationProvider::create(&store, &federation).await.unwrap();

        let first = FederationMapper::new(federation.id, "role", "hardcoded-role-idp-mapper");
        store.add_mapper(realm.id, &first).await.unwrap();
        let second = FederationMapper::new(federation.id, "role", "hardcoded-role-idp-mapper");
        assert!(store.add_mapper(realm.id, &second).await.unwrap_err().is_duplicate());

        IdpFederationProvider::delete(&store, realm.id, federation.id)
            .await
            .unwrap();
        assert!(store.list_mappers(realm.id, federation.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_faults_fail_until_cleared() {
        let (store, realm) = store_with_realm().await;
        store.fail_on("idp.create");

        let idp = IdentityProvider::new(realm.id, "corp", "oidc");
        let err = IdentityProviderProvider::create(&store, &idp)
            .await
            .unwrap_err();
        assert!(err.is_transient());

        store.clear_faults();
        IdentityProviderProvider::create(&store, &idp).await.unwrap();
    }
}
