//! Realm lifecycle.
//!
//! Creation and import persist the realm, bootstrap its default resources,
//! and discard it again if the bootstrap fails. Removal cancels the realm's
//! federation sync tasks before anything is deleted.

use std::sync::Arc;

use kc_core::config::BootstrapConfig;
use kc_core::event::{EventBuilder, EventType, ObserverChain};
use kc_federation::FederationManager;
use kc_model::Realm;
use kc_model::realm::is_valid_realm_name;
use kc_storage::Storage;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bootstrap::{BootstrapOrchestrator, BootstrapReport};
use crate::defaults::master_admin_client_id;
use crate::error::{BootstrapError, BootstrapResult};
use crate::import::{DocumentImport, ImportStage, KnownFromImport, RealmDocument};
use crate::steps::load_realm;

/// Creates, imports, and removes realms.
pub struct RealmManager {
    storage: Storage,
    orchestrator: BootstrapOrchestrator,
    federations: Option<Arc<FederationManager>>,
    observers: ObserverChain,
}

impl RealmManager {
    /// Creates a manager without federation scheduling.
    #[must_use]
    pub fn new(storage: Storage, config: &BootstrapConfig) -> Self {
        Self {
            orchestrator: BootstrapOrchestrator::new(storage.clone()).with_config(config),
            storage,
            federations: None,
            observers: ObserverChain::new(),
        }
    }

    /// Keeps federation sync tasks in step with realm import and removal.
    #[must_use]
    pub fn with_federations(mut self, federations: Arc<FederationManager>) -> Self {
        self.federations = Some(federations);
        self
    }

    /// Sets the observers notified of realm creation and removal.
    #[must_use]
    pub fn with_observers(mut self, observers: ObserverChain) -> Self {
        self.observers = observers;
        self
    }

    /// Returns the bootstrap orchestrator.
    #[must_use]
    pub const fn orchestrator(&self) -> &BootstrapOrchestrator {
        &self.orchestrator
    }

    /// Name of the administrative realm.
    #[must_use]
    pub fn admin_realm(&self) -> &str {
        self.orchestrator.admin_realm()
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Creates and bootstraps a realm.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidName` for an empty name or one with reserved
    /// characters, a storage duplicate error if the name is taken, and any
    /// bootstrap error. A realm whose bootstrap failed is removed again.
    #[instrument(skip(self))]
    pub async fn create_realm(&self, id: Option<Uuid>, name: &str) -> BootstrapResult<Realm> {
        let realm = Self::new_realm(id, name)?;
        self.persist_and_bootstrap(realm, &KnownFromImport::none(), None)
            .await
    }

    /// Creates the administrative realm if it does not exist yet, otherwise
    /// verifies its defaults.
    ///
    /// ## Errors
    ///
    /// Returns any bootstrap error.
    pub async fn ensure_admin_realm(&self) -> BootstrapResult<Realm> {
        match self.storage.realms.get_by_name(self.admin_realm()).await? {
            Some(realm) => {
                self.ensure_defaults(&realm).await?;
                load_realm(&self.storage, realm.id).await
            }
            None => self.create_realm(None, self.admin_realm()).await,
        }
    }

    /// Imports a realm document and schedules its federations.
    ///
    /// ## Errors
    ///
    /// See [`RealmManager::import_realm_with`].
    pub async fn import_realm(&self, document: &RealmDocument) -> BootstrapResult<Realm> {
        self.import_realm_with(document, &DocumentImport::new(document))
            .await
    }

    /// Imports a realm, persisting its declared content through `stage`.
    ///
    /// Resources the document declares are postponed until `stage` has run.
    /// Once the bootstrap succeeded, every federation of the realm is
    /// scheduled.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error, before anything is stored, for a
    /// declared federation that `FederationManager::add_federation` would
    /// reject or whose mapper templates `FederationManager::add_mapper` would
    /// reject. Otherwise the same errors as [`RealmManager::create_realm`].
    #[instrument(skip_all, fields(realm = %document.realm))]
    pub async fn import_realm_with(
        &self,
        document: &RealmDocument,
        stage: &dyn ImportStage,
    ) -> BootstrapResult<Realm> {
        if let Some(federations) = &self.federations {
            // Nothing is stored until every declared federation passes.
            let realm_id = document.id.unwrap_or_default();
            for declared in &document.federations {
                let (federation, templates) = declared.to_federation(realm_id);
                federations.validate_declaration(&federation, &templates)?;
            }
        }

        let mut realm = Self::new_realm(document.id, &document.realm)?;
        realm.display_name.clone_from(&document.display_name);
        let known = KnownFromImport::from_document(document);
        let realm = self
            .persist_and_bootstrap(realm, &known, Some(stage))
            .await?;

        if let Some(federations) = &self.federations {
            let scheduled = federations.schedule_realm(realm.id).await?;
            info!(realm_id = %realm.id, scheduled, "imported federations scheduled");
        }
        Ok(realm)
    }

    /// Ensures the default resources of an existing realm.
    ///
    /// ## Errors
    ///
    /// See [`BootstrapOrchestrator::ensure_defaults`].
    pub async fn ensure_defaults(&self, realm: &Realm) -> BootstrapResult<BootstrapReport> {
        self.orchestrator
            .ensure_defaults(realm, &KnownFromImport::none(), None)
            .await
    }

    fn new_realm(id: Option<Uuid>, name: &str) -> BootstrapResult<Realm> {
        if !is_valid_realm_name(name) {
            return Err(BootstrapError::InvalidName(name.to_string()));
        }
        let mut realm = Realm::with_id(id.unwrap_or_else(Uuid::now_v7), name);
        realm.apply_defaults();
        Ok(realm)
    }

    async fn persist_and_bootstrap(
        &self,
        realm: Realm,
        known: &KnownFromImport,
        stage: Option<&dyn ImportStage>,
    ) -> BootstrapResult<Realm> {
        self.storage.realms.create(&realm).await?;

        if let Err(err) = self.orchestrator.ensure_defaults(&realm, known, stage).await {
            warn!(realm_id = %realm.id, error = %err, "bootstrap failed, discarding realm");
            self.discard(&realm).await;
            return Err(err);
        }

        let realm = load_realm(&self.storage, realm.id).await?;
        info!(realm_id = %realm.id, realm = %realm.name, "realm created");
        self.observers.notify(
            &EventBuilder::new(EventType::RealmPostCreate)
                .realm(realm.id)
                .resource(&realm.name)
                .build(),
        );
        Ok(realm)
    }

    async fn discard(&self, realm: &Realm) {
        if let Err(e) = self.storage.realms.delete(realm.id).await {
            warn!(realm_id = %realm.id, error = %e, "partial realm not removed");
        }
        if let Err(e) = self.remove_master_admin_client(realm).await {
            warn!(realm_id = %realm.id, error = %e, "master admin client not removed");
        }
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Removes a realm with everything it owns, and its master admin client
    /// from the admin realm. Returns false if the realm does not exist.
    ///
    /// ## Errors
    ///
    /// Returns an error if storage fails.
    #[instrument(skip(self))]
    pub async fn remove_realm(&self, id: Uuid) -> BootstrapResult<bool> {
        let Some(realm) = self.storage.realms.get_by_id(id).await? else {
            return Ok(false);
        };

        if let Some(federations) = &self.federations {
            let cancelled = federations.unschedule_realm(id).await?;
            debug!(cancelled, "federation sync tasks cancelled");
        }

        self.storage.realms.delete(id).await?;
        self.remove_master_admin_client(&realm).await?;

        info!(realm = %realm.name, "realm removed");
        self.observers.notify(
            &EventBuilder::new(EventType::RealmRemoved)
                .realm(realm.id)
                .resource(&realm.name)
                .build(),
        );
        Ok(true)
    }

    /// The admin realm's own master admin client goes with the realm itself.
    async fn remove_master_admin_client(&self, realm: &Realm) -> BootstrapResult<bool> {
        if realm.is_admin_realm(self.admin_realm()) {
            return Ok(false);
        }
        let Some(admin_realm) = self.storage.realms.get_by_name(self.admin_realm()).await? else {
            return Ok(false);
        };

        let by_id = match realm.master_admin_client_id {
            Some(id) => self.storage.clients.get_by_id(admin_realm.id, id).await?,
            None => None,
        };
        let client = match by_id {
            Some(client) => Some(client),
            None => {
                self.storage
                    .clients
                    .get_by_client_id(admin_realm.id, &master_admin_client_id(&realm.name))
                    .await?
            }
        };

        match client {
            Some(client) => {
                self.storage.clients.delete(admin_realm.id, client.id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for RealmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmManager")
            .field("admin_realm", &self.admin_realm())
            .field("federations", &self.federations.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kc_cluster::{ClusterAwareScheduler, InMemoryLockStore};
    use kc_core::event::InMemoryObserver;
    use kc_federation::{FederationSynchronizer, StaticMetadataFetcher, task_name};
    use kc_model::IdentityProviderFederation;
    use kc_spi::ProviderTypeRegistry;
    use kc_storage::MemoryStore;

    use super::*;
    use crate::defaults::client_ids;
    use crate::import::{FederationDocument, MapperDocument};

    fn federations(storage: &Storage) -> Arc<FederationManager> {
        let synchronizer = Arc::new(FederationSynchronizer::new(
            storage.clone(),
            Arc::new(ProviderTypeRegistry::with_builtin()),
            Arc::new(StaticMetadataFetcher::new()),
        ));
        let scheduler = Arc::new(ClusterAwareScheduler::new(Arc::new(
            InMemoryLockStore::shared().handle("node-a"),
        )));
        Arc::new(FederationManager::new(synchronizer, scheduler))
    }

    async fn manager_with_master() -> (RealmManager, Arc<InMemoryObserver>) {
        let storage = Storage::in_memory();
        let observer = Arc::new(InMemoryObserver::new());
        let manager = RealmManager::new(storage.clone(), &BootstrapConfig::default())
            .with_federations(federations(&storage))
            .with_observers(ObserverChain::new().with(observer.clone()));
        manager.ensure_admin_realm().await.unwrap();
        (manager, observer)
    }

    fn edugain() -> FederationDocument {
        FederationDocument::new("edugain", "saml", "https://md.example.org/edugain.json")
            .with_mapper(
                MapperDocument::new("email", "saml-user-attribute-idp-mapper")
                    .with_config("attribute.name", "mail")
                    .with_config("user.attribute", "email"),
            )
    }

    #[tokio::test]
    async fn create_realm_bootstraps_and_notifies() {
        let (manager, observer) = manager_with_master().await;

        let acme = manager.create_realm(None, "acme").await.unwrap();
        assert!(acme.default_role_id.is_some());
        assert!(acme.master_admin_client_id.is_some());
        assert!(acme.events_listeners.contains("jboss-logging"));

        let created = observer.of_type(EventType::RealmPostCreate);
        assert_eq!(created.len(), 2);
        assert_eq!(created[1].realm_id, Some(acme.id));
    }

    #[tokio::test]
    async fn create_realm_honors_a_caller_chosen_id() {
        let (manager, _) = manager_with_master().await;
        let id = Uuid::now_v7();

        let realm = manager.create_realm(Some(id), "acme").await.unwrap();
        assert_eq!(realm.id, id);
    }

    #[tokio::test]
    async fn rejects_reserved_characters() {
        let (manager, _) = manager_with_master().await;

        for name in ["", "a/b", "a<b", "50%", "tab\there"] {
            let err = manager.create_realm(None, name).await.unwrap_err();
            assert!(matches!(err, BootstrapError::InvalidName(_)), "{name:?}");
        }
    }

    #[tokio::test]
    async fn duplicate_name_keeps_the_existing_realm() {
        let (manager, _) = manager_with_master().await;
        let acme = manager.create_realm(None, "acme").await.unwrap();

        let err = manager.create_realm(None, "acme").await.unwrap_err();
        assert!(err.is_configuration());
        assert!(
            manager
                .orchestrator()
                .storage()
                .realms
                .get_by_id(acme.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn failed_bootstrap_discards_the_realm() {
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::from_memory(Arc::clone(&store));
        let manager = RealmManager::new(storage.clone(), &BootstrapConfig::default());
        let master = manager.ensure_admin_realm().await.unwrap();

        store.fail_on("client.add_scope_mapping");
        let err = manager.create_realm(None, "acme").await.unwrap_err();
        assert!(err.is_transient());

        assert!(storage.realms.get_by_name("acme").await.unwrap().is_none());
        assert!(
            storage
                .clients
                .get_by_client_id(master.id, "acme-realm")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn ensure_admin_realm_is_repeatable() {
        let (manager, observer) = manager_with_master().await;

        let master = manager.ensure_admin_realm().await.unwrap();
        assert_eq!(master.name, "master");
        assert_eq!(observer.of_type(EventType::RealmPostCreate).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn import_realm_schedules_declared_federations() {
        let (manager, _) = manager_with_master().await;
        let document = RealmDocument::new("acme")
            .with_client(client_ids::REALM_MANAGEMENT)
            .with_federation(edugain());

        let acme = manager.import_realm(&document).await.unwrap();

        let federations = manager.federations.as_ref().unwrap();
        let declared = federations.list_federations(acme.id).await.unwrap();
        assert_eq!(declared.len(), 1);
        assert!(federations.is_scheduled(declared[0].id));
        assert_eq!(
            federations.scheduler().interval(&task_name(declared[0].id)),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            federations
                .list_mappers(acme.id, declared[0].id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn import_rejects_unknown_provider_types_before_persisting() {
        let (manager, _) = manager_with_master().await;
        let mut federation = edugain();
        federation.provider_type = "ws-fed".into();
        let document = RealmDocument::new("acme").with_federation(federation);

        let err = manager.import_realm(&document).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(
            manager
                .orchestrator()
                .storage()
                .realms
                .get_by_name("acme")
                .await
                .unwrap()
                .is_none()
        );
    }

    async fn assert_not_imported(manager: &RealmManager, document: &RealmDocument) {
        let err = manager.import_realm(document).await.unwrap_err();
        assert!(err.is_configuration(), "{err}");
        let storage = manager.orchestrator().storage();
        assert!(storage.realms.get_by_name("acme").await.unwrap().is_none());
        let master = storage.realms.get_by_name("master").await.unwrap().unwrap();
        assert!(
            storage
                .clients
                .get_by_client_id(master.id, "acme-realm")
                .await
                .unwrap()
                .is_none()
        );
        let federations = manager.federations.as_ref().unwrap();
        assert!(federations.scheduler().scheduled_tasks().is_empty());
    }

    #[tokio::test]
    async fn import_rejects_a_zero_refresh_interval_before_persisting() {
        let (manager, _) = manager_with_master().await;
        let mut federation = edugain();
        federation.refresh_interval_secs = 0;

        assert_not_imported(&manager, &RealmDocument::new("acme").with_federation(federation))
            .await;
    }

    #[tokio::test]
    async fn import_rejects_unknown_mapper_types_before_persisting() {
        let (manager, _) = manager_with_master().await;
        let federation = edugain().with_mapper(MapperDocument::new("odd", "no-such-mapper-type"));

        assert_not_imported(&manager, &RealmDocument::new("acme").with_federation(federation))
            .await;
    }

    #[tokio::test]
    async fn import_rejects_incomplete_mapper_config_before_persisting() {
        let (manager, _) = manager_with_master().await;
        let federation = edugain().with_mapper(MapperDocument::new(
            "given-name",
            "saml-user-attribute-idp-mapper",
        ));

        assert_not_imported(&manager, &RealmDocument::new("acme").with_federation(federation))
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn remove_realm_cancels_tasks_and_cleans_the_admin_realm() {
        let (manager, observer) = manager_with_master().await;
        let acme = manager.create_realm(None, "acme").await.unwrap();
        let federations = manager.federations.clone().unwrap();
        let federation = federations
            .add_federation(IdentityProviderFederation::new(
                acme.id,
                "edugain",
                "saml",
                "https://md.example.org/edugain.json",
                3600,
            ))
            .await
            .unwrap();
        assert!(federations.is_scheduled(federation.id));

        assert!(manager.remove_realm(acme.id).await.unwrap());

        assert!(!federations.is_scheduled(federation.id));
        let storage = manager.orchestrator().storage();
        let master = storage.realms.get_by_name("master").await.unwrap().unwrap();
        assert!(
            storage
                .clients
                .get_by_client_id(master.id, "acme-realm")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(observer.of_type(EventType::RealmRemoved).len(), 1);

        assert!(!manager.remove_realm(acme.id).await.unwrap());
    }
}
