//! Per-resource bootstrap steps.
//!
//! Every step creates its resource when absent and otherwise verifies it,
//! restoring missing sub-roles. Steps never remove anything.

use std::collections::{HashMap, HashSet};

use kc_model::role::{account_roles, admin_roles, realm_roles};
use kc_model::{Client, Realm, Role};
use kc_storage::{Storage, StorageError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::composite::add_composite;
use crate::defaults::{
    AUTH_ADMIN_URL, AUTH_BASE_URL, PKCE_METHOD_ATTRIBUTE, READ_TOKEN_ROLE, account_base_url,
    admin_console_base_url, client_ids, client_label, master_admin_client_id, role_label,
};
use crate::error::{BootstrapError, BootstrapResult};
use crate::import::KnownFromImport;
use crate::registry::{DefaultResource, Dependency};

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Created,
    Verified,
}

impl StepOutcome {
    const fn from_created(created: bool) -> Self {
        if created {
            Self::Created
        } else {
            Self::Verified
        }
    }
}

pub(crate) async fn load_realm(storage: &Storage, id: Uuid) -> BootstrapResult<Realm> {
    Ok(storage
        .realms
        .get_by_id(id)
        .await?
        .ok_or_else(|| StorageError::not_found("Realm", id))?)
}

/// State of one `ensure_defaults` call.
pub(crate) struct Run<'a> {
    storage: &'a Storage,
    admin_realm_name: &'a str,
    role_suffix_limit: u32,
    known: &'a KnownFromImport,
    realm: Realm,
}

impl<'a> Run<'a> {
    pub(crate) const fn new(
        storage: &'a Storage,
        admin_realm_name: &'a str,
        role_suffix_limit: u32,
        known: &'a KnownFromImport,
        realm: Realm,
    ) -> Self {
        Self {
            storage,
            admin_realm_name,
            role_suffix_limit,
            known,
            realm,
        }
    }

    pub(crate) const fn realm(&self) -> &Realm {
        &self.realm
    }

    pub(crate) fn is_admin_realm(&self) -> bool {
        self.realm.is_admin_realm(self.admin_realm_name)
    }

    /// Picks up changes an import made to the realm record.
    pub(crate) async fn reload(&mut self) -> BootstrapResult<()> {
        self.realm = load_realm(self.storage, self.realm.id).await?;
        Ok(())
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Client id of the client a resource consists of, if an import can declare it.
    fn declarable_client_id(&self, resource: DefaultResource) -> Option<String> {
        use DefaultResource as R;
        let id = match resource {
            R::MasterAdminClient if self.is_admin_realm() => {
                return Some(master_admin_client_id(&self.realm.name));
            }
            R::RealmManagementClient => client_ids::REALM_MANAGEMENT,
            R::AccountClient => client_ids::ACCOUNT,
            R::AccountConsoleClient => client_ids::ACCOUNT_CONSOLE,
            R::BrokerClient => client_ids::BROKER,
            R::AdminConsoleClient => client_ids::ADMIN_CONSOLE,
            R::AdminCliClient => client_ids::ADMIN_CLI,
            _ => return None,
        };
        Some(id.to_string())
    }

    /// Whether the import supplies this resource itself.
    pub(crate) fn replaced_by_import(&self, resource: DefaultResource) -> bool {
        match resource {
            DefaultResource::OfflineAccess => {
                self.known.declares_realm_role(realm_roles::OFFLINE_ACCESS)
                    && self.known.client_scopes.contains(realm_roles::OFFLINE_ACCESS)
            }
            DefaultResource::DeleteAccountRole => {
                self.known.declares_realm_role(realm_roles::DELETE_ACCOUNT)
            }
            _ => false,
        }
    }

    /// Whether the resource is declared by the import and not yet present.
    pub(crate) async fn awaits_import(&self, resource: DefaultResource) -> BootstrapResult<bool> {
        match self.declarable_client_id(resource) {
            Some(client_id) if self.known.declares_client(&client_id) => {
                Ok(!self.exists(resource).await?)
            }
            _ => Ok(false),
        }
    }

    /// First dependency of `resource` that is not satisfied, treating
    /// everything in `pending` as not yet available.
    pub(crate) async fn blocking_dependency(
        &self,
        resource: DefaultResource,
        pending: &[DefaultResource],
    ) -> BootstrapResult<Option<Dependency>> {
        for dependency in resource.depends_on() {
            let satisfied = match dependency {
                Dependency::AdminRealm => self.admin_realm().await?.is_some(),
                Dependency::Resource(required) => {
                    !required.is_applicable(self.is_admin_realm())
                        || (!pending.contains(required) && self.exists(*required).await?)
                }
            };
            if !satisfied {
                return Ok(Some(*dependency));
            }
        }
        Ok(None)
    }

    /// Whether the resource's main artefact is in storage.
    pub(crate) async fn exists(&self, resource: DefaultResource) -> BootstrapResult<bool> {
        use DefaultResource as R;
        let realm_id = self.realm.id;
        Ok(match resource {
            R::DefaultRole => match self.realm.default_role_id {
                Some(id) => self.storage.roles.get_by_id(realm_id, id).await?.is_some(),
                None => false,
            },
            R::MasterAdminClient => self.master_admin_client().await?.is_some(),
            R::ImpersonationService => {
                let Some((admin_realm, master)) = self.master_admin_client().await? else {
                    return Ok(false);
                };
                let on_master = self
                    .storage
                    .roles
                    .get_client_role_by_name(admin_realm.id, master.id, admin_roles::IMPERSONATION)
                    .await?
                    .is_some();
                if !on_master || self.is_admin_realm() {
                    on_master
                } else {
                    match self.client(client_ids::REALM_MANAGEMENT).await? {
                        Some(management) => self
                            .storage
                            .roles
                            .get_client_role_by_name(
                                realm_id,
                                management.id,
                                admin_roles::IMPERSONATION,
                            )
                            .await?
                            .is_some(),
                        None => false,
                    }
                }
            }
            R::OfflineAccess => self
                .storage
                .roles
                .get_realm_role_by_name(realm_id, realm_roles::OFFLINE_ACCESS)
                .await?
                .is_some(),
            R::DeleteAccountRole => match self.client(client_ids::ACCOUNT).await? {
                Some(account) => self
                    .storage
                    .roles
                    .get_client_role_by_name(realm_id, account.id, account_roles::DELETE_ACCOUNT)
                    .await?
                    .is_some(),
                None => false,
            },
            client_resource => match self.declarable_client_id(client_resource) {
                Some(client_id) => self.client(&client_id).await?.is_some(),
                None => false,
            },
        })
    }

    /// Runs the step for `resource`.
    pub(crate) async fn apply(&mut self, resource: DefaultResource) -> BootstrapResult<StepOutcome> {
        use DefaultResource as R;
        let outcome = match resource {
            R::DefaultRole => self.ensure_default_role().await?,
            R::MasterAdminClient => self.ensure_master_admin_client().await?,
            R::RealmManagementClient => self.ensure_realm_management_client().await?,
            R::AccountClient => self.ensure_account_client().await?,
            R::AccountConsoleClient => self.ensure_account_console_client().await?,
            R::ImpersonationService => self.ensure_impersonation().await?,
            R::BrokerClient => self.ensure_broker_client().await?,
            R::AdminConsoleClient => self.ensure_admin_console_client().await?,
            R::AdminCliClient => self.ensure_admin_cli_client().await?,
            R::OfflineAccess => self.ensure_offline_access().await?,
            R::DeleteAccountRole => self.ensure_delete_account_role().await?,
        };
        debug!(resource = %resource, ?outcome, "default resource applied");
        Ok(outcome)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    async fn admin_realm(&self) -> BootstrapResult<Option<Realm>> {
        if self.is_admin_realm() {
            return Ok(Some(self.realm.clone()));
        }
        Ok(self.storage.realms.get_by_name(self.admin_realm_name).await?)
    }

    async fn master_admin_client(&self) -> BootstrapResult<Option<(Realm, Client)>> {
        let Some(admin_realm) = self.admin_realm().await? else {
            return Ok(None);
        };
        let client = self
            .storage
            .clients
            .get_by_client_id(admin_realm.id, &master_admin_client_id(&self.realm.name))
            .await?;
        Ok(client.map(|client| (admin_realm, client)))
    }

    async fn client(&self, client_id: &str) -> BootstrapResult<Option<Client>> {
        Ok(self
            .storage
            .clients
            .get_by_client_id(self.realm.id, client_id)
            .await?)
    }

    async fn require_client(
        &self,
        client_id: &str,
        resource: DefaultResource,
        dependency: DefaultResource,
    ) -> BootstrapResult<Client> {
        self.client(client_id)
            .await?
            .ok_or(BootstrapError::unresolved(resource, Dependency::Resource(dependency)))
    }

    async fn default_role(&self, resource: DefaultResource) -> BootstrapResult<Role> {
        let missing = || {
            BootstrapError::unresolved(resource, Dependency::Resource(DefaultResource::DefaultRole))
        };
        let id = self.realm.default_role_id.ok_or_else(missing)?;
        self.storage
            .roles
            .get_by_id(self.realm.id, id)
            .await?
            .ok_or_else(missing)
    }

    // ========================================================================
    // Ensure helpers
    // ========================================================================

    async fn ensure_client(
        &self,
        realm_id: Uuid,
        client_id: &str,
        build: impl FnOnce() -> Client + Send,
    ) -> BootstrapResult<(Client, bool)> {
        if let Some(client) = self
            .storage
            .clients
            .get_by_client_id(realm_id, client_id)
            .await?
        {
            return Ok((client, false));
        }
        let client = build();
        self.storage.clients.create(&client).await?;
        debug!(%realm_id, client_id, "created default client");
        Ok((client, true))
    }

    async fn ensure_realm_role(
        &self,
        realm_id: Uuid,
        name: &str,
        description: String,
    ) -> BootstrapResult<(Role, bool)> {
        if let Some(role) = self
            .storage
            .roles
            .get_realm_role_by_name(realm_id, name)
            .await?
        {
            return Ok((role, false));
        }
        let role = Role::new_realm_role(realm_id, name).with_description(description);
        self.storage.roles.create(&role).await?;
        Ok((role, true))
    }

    async fn ensure_client_role(
        &self,
        realm_id: Uuid,
        client: &Client,
        name: &str,
    ) -> BootstrapResult<(Role, bool)> {
        if let Some(role) = self
            .storage
            .roles
            .get_client_role_by_name(realm_id, client.id, name)
            .await?
        {
            return Ok((role, false));
        }
        let role = Role::new_client_role(realm_id, client.id, name).with_description(role_label(name));
        self.storage.roles.create(&role).await?;
        Ok((role, true))
    }

    async fn link(&self, realm_id: Uuid, parent: &Role, child: &Role) -> BootstrapResult<()> {
        add_composite(self.storage, realm_id, parent.id, child.id).await?;
        Ok(())
    }

    /// Ensures every admin role on `client`, each a composite child of
    /// `parent`, plus the query composites. Returns how many roles were added.
    async fn ensure_admin_roles(
        &self,
        realm_id: Uuid,
        client: &Client,
        parent: &Role,
    ) -> BootstrapResult<usize> {
        let mut added = 0;
        let mut roles = HashMap::new();
        for name in admin_roles::ALL_REALM_ROLES {
            let (role, created) = self.ensure_client_role(realm_id, client, name).await?;
            if created {
                added += 1;
            }
            self.link(realm_id, parent, &role).await?;
            roles.insert(*name, role);
        }
        for (composite, children) in admin_roles::QUERY_COMPOSITES {
            let Some(composite) = roles.get(composite) else {
                continue;
            };
            for child in *children {
                if let Some(child) = roles.get(child) {
                    self.link(realm_id, composite, child).await?;
                }
            }
        }
        if added > 0 && added < admin_roles::ALL_REALM_ROLES.len() {
            info!(client_id = %client.client_id, added, "restored missing admin roles");
        }
        Ok(added)
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn ensure_default_role(&mut self) -> BootstrapResult<StepOutcome> {
        if self.exists(DefaultResource::DefaultRole).await? {
            return Ok(StepOutcome::Verified);
        }
        let name = match &self.known.default_role {
            Some(name) => name.clone(),
            None => self.free_default_role_name().await?,
        };
        let (role, created) = self
            .ensure_realm_role(self.realm.id, &name, role_label("default-roles"))
            .await?;
        self.realm.default_role_id = Some(role.id);
        self.storage.realms.update(&self.realm).await?;
        Ok(StepOutcome::from_created(created))
    }

    async fn free_default_role_name(&self) -> BootstrapResult<String> {
        let base = format!(
            "{}{}",
            realm_roles::DEFAULT_ROLES_PREFIX,
            self.realm.name.to_lowercase()
        );
        if self.realm_role_name_free(&base).await? {
            return Ok(base);
        }
        for suffix in 1..=self.role_suffix_limit {
            let candidate = format!("{base}-{suffix}");
            if self.realm_role_name_free(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(BootstrapError::DefaultRoleNamespaceExhausted {
            base,
            limit: self.role_suffix_limit,
        })
    }

    async fn realm_role_name_free(&self, name: &str) -> BootstrapResult<bool> {
        Ok(!self.known.declares_realm_role(name)
            && self
                .storage
                .roles
                .get_realm_role_by_name(self.realm.id, name)
                .await?
                .is_none())
    }

    async fn ensure_master_admin_client(&mut self) -> BootstrapResult<StepOutcome> {
        let admin_realm = self
            .admin_realm()
            .await?
            .ok_or_else(|| BootstrapError::AdminRealmMissing(self.admin_realm_name.to_string()))?;

        let (admin_role, _) = self
            .ensure_realm_role(admin_realm.id, realm_roles::ADMIN, role_label(realm_roles::ADMIN))
            .await?;
        if self.is_admin_realm() {
            let (create_realm, _) = self
                .ensure_realm_role(
                    admin_realm.id,
                    realm_roles::CREATE_REALM,
                    role_label(realm_roles::CREATE_REALM),
                )
                .await?;
            self.link(admin_realm.id, &admin_role, &create_realm).await?;
        }

        let client_id = master_admin_client_id(&self.realm.name);
        let display_name = format!("{} Realm", self.realm.name);
        let (client, created) = self
            .ensure_client(admin_realm.id, &client_id, || {
                Client::new_bearer_only(admin_realm.id, &client_id).with_name(display_name)
            })
            .await?;
        self.ensure_admin_roles(admin_realm.id, &client, &admin_role)
            .await?;

        if self.realm.master_admin_client_id != Some(client.id) {
            self.realm.master_admin_client_id = Some(client.id);
            self.storage.realms.update(&self.realm).await?;
        }
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_realm_management_client(&mut self) -> BootstrapResult<StepOutcome> {
        let realm_id = self.realm.id;
        let (client, created) = self
            .ensure_client(realm_id, client_ids::REALM_MANAGEMENT, || {
                Client::new_bearer_only(realm_id, client_ids::REALM_MANAGEMENT)
                    .with_name(client_label(client_ids::REALM_MANAGEMENT))
                    .with_full_scope_allowed(false)
            })
            .await?;
        let (realm_admin, _) = self
            .ensure_client_role(realm_id, &client, admin_roles::REALM_ADMIN)
            .await?;
        self.ensure_admin_roles(realm_id, &client, &realm_admin)
            .await?;
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_account_client(&mut self) -> BootstrapResult<StepOutcome> {
        let realm_id = self.realm.id;
        let base_url = account_base_url(&self.realm.name);
        let (client, created) = self
            .ensure_client(realm_id, client_ids::ACCOUNT, || {
                Client::new_public(realm_id, client_ids::ACCOUNT)
                    .with_name(client_label(client_ids::ACCOUNT))
                    .with_urls(AUTH_BASE_URL, base_url.as_str())
                    .with_redirect_uri(format!("{base_url}*"))
                    .with_full_scope_allowed(false)
            })
            .await?;

        let mut roles = HashMap::new();
        let mut new_roles = HashSet::new();
        for name in account_roles::ALL {
            let (role, role_created) = self.ensure_client_role(realm_id, &client, name).await?;
            if role_created {
                new_roles.insert(*name);
            }
            roles.insert(*name, role);
        }

        for (composite, child) in [
            (account_roles::MANAGE_ACCOUNT, account_roles::MANAGE_ACCOUNT_LINKS),
            (account_roles::MANAGE_CONSENT, account_roles::VIEW_CONSENT),
        ] {
            if new_roles.contains(composite)
                && let (Some(composite), Some(child)) = (roles.get(composite), roles.get(child))
            {
                self.link(realm_id, composite, child).await?;
            }
        }

        if created {
            let default_role = self.default_role(DefaultResource::AccountClient).await?;
            for name in account_roles::DEFAULT {
                if let Some(role) = roles.get(name) {
                    self.link(realm_id, &default_role, role).await?;
                }
            }
        }
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_account_console_client(&mut self) -> BootstrapResult<StepOutcome> {
        let realm_id = self.realm.id;
        let base_url = account_base_url(&self.realm.name);
        let (client, created) = self
            .ensure_client(realm_id, client_ids::ACCOUNT_CONSOLE, || {
                Client::new_public(realm_id, client_ids::ACCOUNT_CONSOLE)
                    .with_name(client_label(client_ids::ACCOUNT_CONSOLE))
                    .with_urls(AUTH_BASE_URL, base_url.as_str())
                    .with_redirect_uri(format!("{base_url}*"))
                    .with_full_scope_allowed(false)
                    .with_attribute(PKCE_METHOD_ATTRIBUTE, "S256")
            })
            .await?;

        if created {
            let account = self
                .require_client(
                    client_ids::ACCOUNT,
                    DefaultResource::AccountConsoleClient,
                    DefaultResource::AccountClient,
                )
                .await?;
            for name in [account_roles::MANAGE_ACCOUNT, account_roles::VIEW_GROUPS] {
                let (role, _) = self.ensure_client_role(realm_id, &account, name).await?;
                self.storage
                    .clients
                    .add_scope_mapping(realm_id, client.id, role.id)
                    .await?;
            }
        }
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_impersonation(&mut self) -> BootstrapResult<StepOutcome> {
        let (admin_realm, master) = self.master_admin_client().await?.ok_or(
            BootstrapError::unresolved(
                DefaultResource::ImpersonationService,
                Dependency::Resource(DefaultResource::MasterAdminClient),
            ),
        )?;
        let (admin_role, _) = self
            .ensure_realm_role(admin_realm.id, realm_roles::ADMIN, role_label(realm_roles::ADMIN))
            .await?;
        let (role, mut created) = self
            .ensure_client_role(admin_realm.id, &master, admin_roles::IMPERSONATION)
            .await?;
        self.link(admin_realm.id, &admin_role, &role).await?;

        if !self.is_admin_realm() {
            let realm_id = self.realm.id;
            let management = self
                .require_client(
                    client_ids::REALM_MANAGEMENT,
                    DefaultResource::ImpersonationService,
                    DefaultResource::RealmManagementClient,
                )
                .await?;
            let (realm_admin, _) = self
                .ensure_client_role(realm_id, &management, admin_roles::REALM_ADMIN)
                .await?;
            let (role, role_created) = self
                .ensure_client_role(realm_id, &management, admin_roles::IMPERSONATION)
                .await?;
            self.link(realm_id, &realm_admin, &role).await?;
            created |= role_created;
        }
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_broker_client(&mut self) -> BootstrapResult<StepOutcome> {
        let realm_id = self.realm.id;
        let (client, created) = self
            .ensure_client(realm_id, client_ids::BROKER, || {
                Client::new(realm_id, client_ids::BROKER)
                    .with_name(client_label(client_ids::BROKER))
                    .with_full_scope_allowed(false)
            })
            .await?;
        self.ensure_client_role(realm_id, &client, READ_TOKEN_ROLE)
            .await?;
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_admin_console_client(&mut self) -> BootstrapResult<StepOutcome> {
        let realm_id = self.realm.id;
        let base_url = admin_console_base_url(&self.realm.name);
        let (_, created) = self
            .ensure_client(realm_id, client_ids::ADMIN_CONSOLE, || {
                Client::new_public(realm_id, client_ids::ADMIN_CONSOLE)
                    .with_name(client_label(client_ids::ADMIN_CONSOLE))
                    .with_urls(AUTH_ADMIN_URL, base_url.as_str())
                    .with_redirect_uri(format!("{base_url}*"))
                    .with_web_origin("+")
                    .with_full_scope_allowed(false)
                    .with_attribute(PKCE_METHOD_ATTRIBUTE, "S256")
            })
            .await?;
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_admin_cli_client(&mut self) -> BootstrapResult<StepOutcome> {
        let realm_id = self.realm.id;
        let (_, created) = self
            .ensure_client(realm_id, client_ids::ADMIN_CLI, || {
                Client::new_public(realm_id, client_ids::ADMIN_CLI)
                    .with_name(client_label(client_ids::ADMIN_CLI))
                    .direct_grants_only()
                    .with_full_scope_allowed(false)
            })
            .await?;
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_offline_access(&mut self) -> BootstrapResult<StepOutcome> {
        let realm_id = self.realm.id;
        let (role, created) = self
            .ensure_realm_role(realm_id, realm_roles::OFFLINE_ACCESS, role_label("offline-access"))
            .await?;
        if created {
            let default_role = self.default_role(DefaultResource::OfflineAccess).await?;
            self.link(realm_id, &default_role, &role).await?;
        }
        Ok(StepOutcome::from_created(created))
    }

    async fn ensure_delete_account_role(&mut self) -> BootstrapResult<StepOutcome> {
        let realm_id = self.realm.id;
        let account = self
            .require_client(
                client_ids::ACCOUNT,
                DefaultResource::DeleteAccountRole,
                DefaultResource::AccountClient,
            )
            .await?;
        let (_, created) = self
            .ensure_client_role(realm_id, &account, account_roles::DELETE_ACCOUNT)
            .await?;
        Ok(StepOutcome::from_created(created))
    }
}
