//! Realm import documents.
//!
//! An import declares some resources the bootstrap would otherwise create.
//! [`KnownFromImport`] tells the orchestrator which ones, so it postpones
//! them until the [`ImportStage`] has persisted the document, then verifies
//! what was imported instead of creating duplicates.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use kc_model::{
    Client, ClientAccess, FederationMapper, FilterSet, IdentityProviderFederation,
    ProviderDefaults, Realm, Role,
};
use kc_storage::Storage;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::composite::add_composite;
use crate::error::{BootstrapError, BootstrapResult};

// ============================================================================
// Document
// ============================================================================

/// Realm import document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmDocument {
    /// Realm id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    /// Realm name.
    pub realm: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Declared clients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<ClientDocument>,

    /// Declared roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<RolesDocument>,

    /// Name of the realm's default role, overriding the generated one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_role: Option<String>,

    /// Declared client scope names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_scopes: Vec<String>,

    /// Declared identity provider federations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub federations: Vec<FederationDocument>,
}

/// Declared client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDocument {
    /// Client id.
    pub client_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Public client flag.
    #[serde(default)]
    pub public_client: bool,
    /// Bearer-only flag.
    #[serde(default)]
    pub bearer_only: bool,
}

/// Declared roles, by scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolesDocument {
    /// Realm roles.
    #[serde(default)]
    pub realm: Vec<RoleDocument>,
    /// Client roles keyed by client id.
    #[serde(default)]
    pub client: HashMap<String, Vec<RoleDocument>>,
}

/// Declared role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDocument {
    /// Role name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Names of realm roles this role is composed of.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composites: Vec<String>,
}

/// Declared federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationDocument {
    /// Alias, unique within the realm.
    pub alias: String,
    /// Provider type id of introduced providers.
    pub provider_type: String,
    /// Metadata source URL.
    pub url: String,
    /// Refresh interval in seconds.
    pub refresh_interval_secs: u64,
    /// Descriptor filters.
    #[serde(default)]
    pub filters: FilterSet,
    /// Flags applied to introduced providers.
    #[serde(default)]
    pub provider_defaults: ProviderDefaults,
    /// Configuration merged into introduced providers.
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// Mapper templates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappers: Vec<MapperDocument>,
}

/// Declared federation mapper template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapperDocument {
    /// Name, unique within the federation.
    pub name: String,
    /// Mapper type id.
    pub mapper_type: String,
    /// Mapper configuration.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl RealmDocument {
    /// Creates an empty document for `realm`.
    #[must_use]
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            ..Self::default()
        }
    }

    /// Declares a client.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.clients.push(ClientDocument {
            client_id: client_id.into(),
            ..ClientDocument::default()
        });
        self
    }

    /// Declares a realm role.
    #[must_use]
    pub fn with_realm_role(mut self, name: impl Into<String>) -> Self {
        self.roles
            .get_or_insert_with(RolesDocument::default)
            .realm
            .push(RoleDocument {
                name: name.into(),
                ..RoleDocument::default()
            });
        self
    }

    /// Declares a federation.
    #[must_use]
    pub fn with_federation(mut self, federation: FederationDocument) -> Self {
        self.federations.push(federation);
        self
    }
}

impl FederationDocument {
    /// Creates a federation refreshed hourly, with no filters or mappers.
    #[must_use]
    pub fn new(
        alias: impl Into<String>,
        provider_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            provider_type: provider_type.into(),
            url: url.into(),
            refresh_interval_secs: 3600,
            filters: FilterSet::default(),
            provider_defaults: ProviderDefaults::default(),
            config: HashMap::new(),
            mappers: Vec::new(),
        }
    }

    /// Declares a mapper template.
    #[must_use]
    pub fn with_mapper(mut self, mapper: MapperDocument) -> Self {
        self.mappers.push(mapper);
        self
    }

    /// Builds the federation record for `realm_id` and its mapper templates,
    /// in declaration order.
    #[must_use]
    pub fn to_federation(
        &self,
        realm_id: Uuid,
    ) -> (IdentityProviderFederation, Vec<FederationMapper>) {
        let mut federation = IdentityProviderFederation::new(
            realm_id,
            &self.alias,
            &self.provider_type,
            &self.url,
            self.refresh_interval_secs,
        )
        .with_filters(self.filters.clone())
        .with_provider_defaults(self.provider_defaults);
        federation.config.clone_from(&self.config);

        let templates = self
            .mappers
            .iter()
            .map(|mapper| {
                let mut template =
                    FederationMapper::new(federation.id, &mapper.name, &mapper.mapper_type);
                template.config.clone_from(&mapper.config);
                template
            })
            .collect();
        (federation, templates)
    }
}

impl MapperDocument {
    /// Creates a template without configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, mapper_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mapper_type: mapper_type.into(),
            config: HashMap::new(),
        }
    }

    /// Sets a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Known From Import
// ============================================================================

/// What an import declares, as far as the bootstrap is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownFromImport {
    /// Declared client ids.
    pub client_ids: HashSet<String>,
    /// Declared realm role names.
    pub realm_roles: HashSet<String>,
    /// Declared client scope names.
    pub client_scopes: HashSet<String>,
    /// Declared default role name.
    pub default_role: Option<String>,
    /// Whether the document declared roles at all.
    pub roles_declared: bool,
}

impl KnownFromImport {
    /// Nothing declared; used for plain realm creation.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Collects the declarations of a document.
    #[must_use]
    pub fn from_document(document: &RealmDocument) -> Self {
        Self {
            client_ids: document
                .clients
                .iter()
                .map(|c| c.client_id.clone())
                .collect(),
            realm_roles: document
                .roles
                .iter()
                .flat_map(|roles| roles.realm.iter().map(|r| r.name.clone()))
                .collect(),
            client_scopes: document.client_scopes.iter().cloned().collect(),
            default_role: document.default_role.clone(),
            roles_declared: document.roles.is_some(),
        }
    }

    /// Declares a client id.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_ids.insert(client_id.into());
        self
    }

    /// Declares a realm role.
    #[must_use]
    pub fn with_realm_role(mut self, name: impl Into<String>) -> Self {
        self.realm_roles.insert(name.into());
        self.roles_declared = true;
        self
    }

    /// Declares a client scope.
    #[must_use]
    pub fn with_client_scope(mut self, name: impl Into<String>) -> Self {
        self.client_scopes.insert(name.into());
        self
    }

    /// Declares the default role name.
    #[must_use]
    pub fn with_default_role(mut self, name: impl Into<String>) -> Self {
        self.default_role = Some(name.into());
        self
    }

    /// Checks whether a client id is declared.
    #[must_use]
    pub fn declares_client(&self, client_id: &str) -> bool {
        self.client_ids.contains(client_id)
    }

    /// Checks whether a realm role is declared.
    #[must_use]
    pub fn declares_realm_role(&self, name: &str) -> bool {
        self.realm_roles.contains(name)
    }
}

// ============================================================================
// Import Stage
// ============================================================================

/// Persists the declared content of an import.
///
/// Invoked by the orchestrator between its main pass and the retry of
/// postponed resources.
#[async_trait]
pub trait ImportStage: Send + Sync {
    /// Imports into `realm`.
    ///
    /// ## Errors
    ///
    /// Any error aborts the bootstrap.
    async fn import(&self, storage: &Storage, realm: &Realm) -> BootstrapResult<()>;
}

/// Import stage persisting a [`RealmDocument`].
///
/// Resources that already exist are left as they are.
#[derive(Debug, Clone, Copy)]
pub struct DocumentImport<'a> {
    document: &'a RealmDocument,
}

impl<'a> DocumentImport<'a> {
    /// Creates a stage for `document`.
    #[must_use]
    pub const fn new(document: &'a RealmDocument) -> Self {
        Self { document }
    }

    async fn import_clients(&self, storage: &Storage, realm: &Realm) -> BootstrapResult<()> {
        for declared in &self.document.clients {
            if storage
                .clients
                .get_by_client_id(realm.id, &declared.client_id)
                .await?
                .is_some()
            {
                continue;
            }
            let access = if declared.bearer_only {
                ClientAccess::BearerOnly
            } else if declared.public_client {
                ClientAccess::Public
            } else {
                ClientAccess::Confidential
            };
            let mut client = Client::with_access(realm.id, &declared.client_id, access);
            client.name.clone_from(&declared.name);
            storage.clients.create(&client).await?;
            debug!(client_id = %client.client_id, "imported client");
        }
        Ok(())
    }

    async fn import_roles(&self, storage: &Storage, realm: &Realm) -> BootstrapResult<()> {
        let Some(roles) = &self.document.roles else {
            return Ok(());
        };

        for declared in &roles.realm {
            if storage
                .roles
                .get_realm_role_by_name(realm.id, &declared.name)
                .await?
                .is_none()
            {
                storage.roles.create(&role_from(declared, realm.id, None)).await?;
            }
        }

        for (client_id, declared_roles) in &roles.client {
            let client = storage
                .clients
                .get_by_client_id(realm.id, client_id)
                .await?
                .ok_or_else(|| {
                    BootstrapError::import(format!("roles declared for unknown client {client_id}"))
                })?;
            for declared in declared_roles {
                if storage
                    .roles
                    .get_client_role_by_name(realm.id, client.id, &declared.name)
                    .await?
                    .is_none()
                {
                    storage
                        .roles
                        .create(&role_from(declared, realm.id, Some(client.id)))
                        .await?;
                }
            }
        }

        for declared in &roles.realm {
            self.link_composites(storage, realm, declared, None).await?;
        }
        for (client_id, declared_roles) in &roles.client {
            let Some(client) = storage.clients.get_by_client_id(realm.id, client_id).await?
            else {
                continue;
            };
            for declared in declared_roles {
                self.link_composites(storage, realm, declared, Some(client.id))
                    .await?;
            }
        }
        Ok(())
    }

    async fn link_composites(
        &self,
        storage: &Storage,
        realm: &Realm,
        declared: &RoleDocument,
        client_id: Option<Uuid>,
    ) -> BootstrapResult<()> {
        if declared.composites.is_empty() {
            return Ok(());
        }
        let parent = match client_id {
            Some(client_id) => {
                storage
                    .roles
                    .get_client_role_by_name(realm.id, client_id, &declared.name)
                    .await?
            }
            None => {
                storage
                    .roles
                    .get_realm_role_by_name(realm.id, &declared.name)
                    .await?
            }
        }
        .ok_or_else(|| BootstrapError::import(format!("role {} vanished", declared.name)))?;

        for name in &declared.composites {
            let child = storage
                .roles
                .get_realm_role_by_name(realm.id, name)
                .await?
                .ok_or_else(|| {
                    BootstrapError::import(format!(
                        "role {} is composed of unknown realm role {name}",
                        declared.name
                    ))
                })?;
            add_composite(storage, realm.id, parent.id, child.id).await?;
        }
        Ok(())
    }

    async fn import_federations(&self, storage: &Storage, realm: &Realm) -> BootstrapResult<()> {
        let existing: HashSet<String> = storage
            .federations
            .list(realm.id)
            .await?
            .into_iter()
            .map(|f| f.alias)
            .collect();

        for declared in &self.document.federations {
            if existing.contains(&declared.alias) {
                continue;
            }
            let (federation, templates) = declared.to_federation(realm.id);
            storage.federations.create(&federation).await?;
            for template in &templates {
                storage.federations.add_mapper(realm.id, template).await?;
            }
            debug!(alias = %federation.alias, "imported federation");
        }
        Ok(())
    }
}

fn role_from(declared: &RoleDocument, realm_id: Uuid, client_id: Option<Uuid>) -> Role {
    let mut role = match client_id {
        Some(client_id) => Role::new_client_role(realm_id, client_id, &declared.name),
        None => Role::new_realm_role(realm_id, &declared.name),
    };
    role.description.clone_from(&declared.description);
    role
}

#[async_trait]
impl ImportStage for DocumentImport<'_> {
    async fn import(&self, storage: &Storage, realm: &Realm) -> BootstrapResult<()> {
        self.import_clients(storage, realm).await?;
        self.import_roles(storage, realm).await?;
        self.import_federations(storage, realm).await?;
        Ok(())
    }
}
