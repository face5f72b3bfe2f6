//! Federation lifecycle and scheduling.
//!
//! [`FederationManager`] is the only entry point that creates, changes, or
//! removes federations and their mapper templates. Each federation owns one
//! scheduled task named `federation-sync:<id>`; removing a federation cancels
//! that task before anything is deleted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kc_cluster::{ClusterAwareScheduler, ScheduledTask};
use kc_core::event::{EventBuilder, EventType};
use kc_model::{FederationMapper, IdentityProviderFederation};
use kc_storage::Detachment;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{FederationError, FederationResult};
use crate::sync::{FederationSynchronizer, SyncResult, detach_or_delete};

/// Scheduler task name for a federation.
#[must_use]
pub fn task_name(federation_id: Uuid) -> String {
    format!("federation-sync:{federation_id}")
}

/// Scheduled task running one sync cycle.
#[derive(Debug)]
pub struct FederationSyncTask {
    synchronizer: Arc<FederationSynchronizer>,
    realm_id: Uuid,
    federation_id: Uuid,
}

#[async_trait]
impl ScheduledTask for FederationSyncTask {
    async fn run(&self) -> kc_core::Result<()> {
        self.synchronizer
            .sync_once(self.realm_id, self.federation_id)
            .await
            .map(|_| ())
            .map_err(Into::into)
    }
}

/// Manages federations, their mapper templates, and their sync schedule.
#[derive(Debug)]
pub struct FederationManager {
    synchronizer: Arc<FederationSynchronizer>,
    scheduler: Arc<ClusterAwareScheduler>,
    min_refresh_interval: Duration,
}

impl FederationManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(
        synchronizer: Arc<FederationSynchronizer>,
        scheduler: Arc<ClusterAwareScheduler>,
    ) -> Self {
        Self {
            synchronizer,
            scheduler,
            min_refresh_interval: Duration::from_secs(
                kc_core::config::FederationConfig::default().min_refresh_interval_secs,
            ),
        }
    }

    /// Sets the lower bound applied to every refresh interval.
    #[must_use]
    pub const fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Returns the synchronizer.
    #[must_use]
    pub fn synchronizer(&self) -> &Arc<FederationSynchronizer> {
        &self.synchronizer
    }

    /// Returns the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<ClusterAwareScheduler> {
        &self.scheduler
    }

    fn validate(&self, federation: &IdentityProviderFederation) -> FederationResult<()> {
        if federation.alias.trim().is_empty() {
            return Err(FederationError::config("federation alias is empty"));
        }
        if federation.url.trim().is_empty() {
            return Err(FederationError::config(format!(
                "federation '{}' has no metadata url",
                federation.alias
            )));
        }
        if federation.refresh_interval_secs == 0 {
            return Err(FederationError::config(format!(
                "federation '{}' has a zero refresh interval",
                federation.alias
            )));
        }
        self.synchronizer
            .registry()
            .identity_provider(&federation.provider_type)?;
        Ok(())
    }

    /// Checks a federation and its mapper templates before any of them is
    /// stored, with the rules [`add_federation`](Self::add_federation) and
    /// [`add_mapper`](Self::add_mapper) apply one by one.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error for the first rule that fails.
    pub fn validate_declaration(
        &self,
        federation: &IdentityProviderFederation,
        mappers: &[FederationMapper],
    ) -> FederationResult<()> {
        self.validate(federation)?;
        let mut names = HashSet::new();
        for mapper in mappers {
            self.check_mapper(federation, mapper)?;
            if !names.insert(mapper.name.as_str()) {
                return Err(FederationError::config(format!(
                    "federation '{}' declares mapper '{}' twice",
                    federation.alias, mapper.name
                )));
            }
        }
        Ok(())
    }

    fn check_mapper(
        &self,
        federation: &IdentityProviderFederation,
        mapper: &FederationMapper,
    ) -> FederationResult<()> {
        if mapper.name.trim().is_empty() {
            return Err(FederationError::config("mapper name is empty"));
        }
        self.synchronizer.registry().validate_mapper(
            &federation.provider_type,
            &mapper.mapper_type,
            &mapper.config,
        )?;
        Ok(())
    }

    async fn load(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> FederationResult<IdentityProviderFederation> {
        self.synchronizer
            .storage()
            .federations
            .get_by_id(realm_id, federation_id)
            .await?
            .ok_or_else(|| FederationError::not_found(format!("federation {federation_id}")))
    }

    fn notify(&self, event_type: EventType, federation: &IdentityProviderFederation) {
        self.synchronizer.observers().notify(
            &EventBuilder::new(event_type)
                .realm(federation.realm_id)
                .federation(federation.id)
                .resource(federation.alias.clone())
                .build(),
        );
    }

    // ========================================================================
    // Federations
    // ========================================================================

    /// Validates, persists, and schedules a new federation.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error for an unknown provider type, a zero
    /// interval, or a duplicate alias, and a storage error if persisting fails.
    #[instrument(skip_all, fields(realm_id = %federation.realm_id, alias = %federation.alias))]
    pub async fn add_federation(
        &self,
        federation: IdentityProviderFederation,
    ) -> FederationResult<IdentityProviderFederation> {
        self.validate(&federation)?;
        self.synchronizer
            .storage()
            .federations
            .create(&federation)
            .await?;
        info!(federation_id = %federation.id, url = %federation.url, "federation added");
        self.notify(EventType::FederationAdded, &federation);

        self.schedule_federation(
            federation.realm_id,
            federation.id,
            federation.refresh_interval_secs,
        )?;
        Ok(federation)
    }

    /// Persists changes to a federation, re-scheduling it when the interval
    /// changed. Refresh timestamps of the stored record are kept.
    ///
    /// ## Errors
    ///
    /// Returns an error if the federation does not exist or is invalid.
    #[instrument(skip_all, fields(realm_id = %federation.realm_id, federation_id = %federation.id))]
    pub async fn update_federation(
        &self,
        mut federation: IdentityProviderFederation,
    ) -> FederationResult<()> {
        self.validate(&federation)?;
        let stored = self.load(federation.realm_id, federation.id).await?;

        federation.created_at = stored.created_at;
        federation.updated_at = Utc::now();
        self.synchronizer
            .storage()
            .federations
            .update(&federation)
            .await?;
        self.notify(EventType::FederationUpdated, &federation);

        let name = task_name(federation.id);
        if stored.refresh_interval_secs != federation.refresh_interval_secs
            || !self.scheduler.is_scheduled(&name)
        {
            self.schedule_federation(
                federation.realm_id,
                federation.id,
                federation.refresh_interval_secs,
            )?;
        }
        Ok(())
    }

    /// Removes a federation.
    ///
    /// The sync task is cancelled first. Every member provider is then
    /// detached, and deleted when this was its only federation. Finally the
    /// federation and its mapper templates are deleted.
    ///
    /// ## Errors
    ///
    /// Returns an error if the federation does not exist or storage fails.
    /// Providers already detached stay detached.
    #[instrument(skip(self))]
    pub async fn remove_federation(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> FederationResult<()> {
        self.unschedule_federation(federation_id);
        let federation = self.load(realm_id, federation_id).await?;
        let storage = self.synchronizer.storage();

        let members = storage
            .identity_providers
            .list_by_federation(realm_id, federation_id)
            .await?;
        let mut deleted = 0usize;
        for idp in members {
            if detach_or_delete(storage, realm_id, &idp.alias, federation_id).await?
                == Detachment::Deleted
            {
                deleted += 1;
            }
        }

        storage.federations.delete(realm_id, federation_id).await?;
        info!(alias = %federation.alias, deleted_providers = deleted, "federation removed");
        self.notify(EventType::FederationRemoved, &federation);
        Ok(())
    }

    /// Lists the federations of a realm.
    ///
    /// ## Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list_federations(
        &self,
        realm_id: Uuid,
    ) -> FederationResult<Vec<IdentityProviderFederation>> {
        Ok(self.synchronizer.storage().federations.list(realm_id).await?)
    }

    // ========================================================================
    // Mapper templates
    // ========================================================================

    async fn validate_mapper(
        &self,
        realm_id: Uuid,
        mapper: &FederationMapper,
    ) -> FederationResult<()> {
        let federation = self.load(realm_id, mapper.federation_id).await?;
        self.check_mapper(&federation, mapper)?;
        let taken = self
            .list_mappers(realm_id, mapper.federation_id)
            .await?
            .iter()
            .any(|m| m.name == mapper.name && m.id != mapper.id);
        if taken {
            return Err(FederationError::config(format!(
                "federation '{}' already has a mapper named '{}'",
                federation.alias, mapper.name
            )));
        }
        Ok(())
    }

    /// Adds a mapper template. It applies to providers the federation
    /// introduces from now on.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error for an unknown or incompatible mapper
    /// type, or a name already used in the federation.
    pub async fn add_mapper(
        &self,
        realm_id: Uuid,
        mapper: FederationMapper,
    ) -> FederationResult<FederationMapper> {
        self.validate_mapper(realm_id, &mapper).await?;
        self.synchronizer
            .storage()
            .federations
            .add_mapper(realm_id, &mapper)
            .await
            .map_err(duplicate_as_config)?;
        debug!(federation_id = %mapper.federation_id, name = %mapper.name, "mapper template added");
        Ok(mapper)
    }

    /// Updates a mapper template. Existing provider mappers are unchanged.
    ///
    /// ## Errors
    ///
    /// Returns an error if the template does not exist or is invalid.
    pub async fn update_mapper(
        &self,
        realm_id: Uuid,
        mapper: &FederationMapper,
    ) -> FederationResult<()> {
        self.validate_mapper(realm_id, mapper).await?;
        self.synchronizer
            .storage()
            .federations
            .update_mapper(realm_id, mapper)
            .await
            .map_err(duplicate_as_config)
    }

    /// Removes a mapper template.
    ///
    /// ## Errors
    ///
    /// Returns an error if the template does not exist.
    pub async fn remove_mapper(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
        mapper_id: Uuid,
    ) -> FederationResult<()> {
        Ok(self
            .synchronizer
            .storage()
            .federations
            .remove_mapper(realm_id, federation_id, mapper_id)
            .await?)
    }

    /// Lists the mapper templates of a federation in application order.
    ///
    /// ## Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list_mappers(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> FederationResult<Vec<FederationMapper>> {
        Ok(self
            .synchronizer
            .storage()
            .federations
            .list_mappers(realm_id, federation_id)
            .await?)
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Registers the periodic sync of a federation, replacing any previous
    /// registration. Intervals below the configured minimum are raised to it.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error for a zero interval.
    pub fn schedule_federation(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
        interval_secs: u64,
    ) -> FederationResult<()> {
        if interval_secs == 0 {
            return Err(FederationError::config(format!(
                "federation {federation_id} has a zero refresh interval"
            )));
        }
        let interval = Duration::from_secs(interval_secs).max(self.min_refresh_interval);
        let task = Arc::new(FederationSyncTask {
            synchronizer: Arc::clone(&self.synchronizer),
            realm_id,
            federation_id,
        });
        self.scheduler
            .schedule(task_name(federation_id), interval, task)?;
        Ok(())
    }

    /// Stops the periodic sync of a federation. Returns false if it was not
    /// scheduled.
    pub fn unschedule_federation(&self, federation_id: Uuid) -> bool {
        self.scheduler.cancel(&task_name(federation_id))
    }

    /// Checks whether a federation has a registered sync task.
    #[must_use]
    pub fn is_scheduled(&self, federation_id: Uuid) -> bool {
        self.scheduler.is_scheduled(&task_name(federation_id))
    }

    /// Runs one sync cycle now, outside the schedule.
    ///
    /// ## Errors
    ///
    /// See [`FederationSynchronizer::sync_once`].
    pub async fn sync_once(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> FederationResult<SyncResult> {
        self.synchronizer.sync_once(realm_id, federation_id).await
    }

    /// Schedules every federation of one realm. Returns how many were scheduled.
    ///
    /// ## Errors
    ///
    /// Returns an error if storage fails. Federations with an invalid interval
    /// are logged and skipped.
    pub async fn schedule_realm(&self, realm_id: Uuid) -> FederationResult<usize> {
        let mut scheduled = 0;
        for federation in self.list_federations(realm_id).await? {
            match self.schedule_federation(
                realm_id,
                federation.id,
                federation.refresh_interval_secs,
            ) {
                Ok(()) => scheduled += 1,
                Err(e) => warn!(
                    federation_id = %federation.id,
                    error = %e,
                    "federation not scheduled"
                ),
            }
        }
        Ok(scheduled)
    }

    /// Cancels every federation task of one realm. Returns how many were
    /// cancelled.
    ///
    /// ## Errors
    ///
    /// Returns an error if storage fails.
    pub async fn unschedule_realm(&self, realm_id: Uuid) -> FederationResult<usize> {
        Ok(self
            .list_federations(realm_id)
            .await?
            .iter()
            .filter(|federation| self.unschedule_federation(federation.id))
            .count())
    }

    /// Schedules every federation of every realm, at process start.
    ///
    /// ## Errors
    ///
    /// Returns an error if storage fails.
    #[instrument(skip(self))]
    pub async fn schedule_all(&self) -> FederationResult<usize> {
        let mut scheduled = 0;
        for realm in self.synchronizer.storage().realms.list().await? {
            scheduled += self.schedule_realm(realm.id).await?;
        }
        info!(scheduled, "federation sync tasks registered");
        Ok(scheduled)
    }
}

fn duplicate_as_config(err: kc_storage::StorageError) -> FederationError {
    if err.is_duplicate() {
        FederationError::config(err.to_string())
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use kc_cluster::InMemoryLockStore;
    use kc_model::{ProviderDescriptor, Realm};
    use kc_spi::ProviderTypeRegistry;
    use kc_storage::Storage;

    use super::*;
    use crate::fetch::StaticMetadataFetcher;

    const URL: &str = "https://md.example.org/federation.json";

    async fn manager() -> (FederationManager, Arc<StaticMetadataFetcher>, Uuid) {
        let storage = Storage::in_memory();
        let realm = Realm::new("acme");
        storage.realms.create(&realm).await.unwrap();

        let fetcher = Arc::new(StaticMetadataFetcher::new());
        let synchronizer = Arc::new(FederationSynchronizer::new(
            storage,
            Arc::new(ProviderTypeRegistry::with_builtin()),
            fetcher.clone(),
        ));
        let scheduler = Arc::new(ClusterAwareScheduler::new(Arc::new(
            InMemoryLockStore::shared().handle("node-a"),
        )));
        (
            FederationManager::new(synchronizer, scheduler),
            fetcher,
            realm.id,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn add_federation_schedules_it() {
        let (manager, _, realm_id) = manager().await;
        let federation = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "saml", URL, 3600,
            ))
            .await
            .unwrap();

        assert!(manager.is_scheduled(federation.id));
        assert_eq!(
            manager.scheduler().interval(&task_name(federation.id)),
            Some(Duration::from_secs(3600))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn intervals_are_clamped_to_the_minimum() {
        let (manager, _, realm_id) = manager().await;
        let federation = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "saml", URL, 5,
            ))
            .await
            .unwrap();

        assert_eq!(
            manager.scheduler().interval(&task_name(federation.id)),
            Some(Duration::from_secs(60))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_unknown_provider_type_and_zero_interval() {
        let (manager, _, realm_id) = manager().await;

        let err = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "ws-fed", URL, 3600,
            ))
            .await
            .unwrap_err();
        assert!(err.is_configuration());

        let err = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "saml", URL, 0,
            ))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(manager.scheduler().scheduled_tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn declarations_are_checked_without_storing() {
        let (manager, _, realm_id) = manager().await;
        let federation = IdentityProviderFederation::new(realm_id, "edugain", "saml", URL, 3600);
        let grant = FederationMapper::new(federation.id, "grant", "hardcoded-role-idp-mapper")
            .with_config("role", "member");
        manager
            .validate_declaration(&federation, std::slice::from_ref(&grant))
            .unwrap();

        let unknown = FederationMapper::new(federation.id, "odd", "no-such-mapper-type");
        let err = manager
            .validate_declaration(&federation, &[grant.clone(), unknown])
            .unwrap_err();
        assert!(err.is_configuration());

        let err = manager
            .validate_declaration(&federation, &[grant.clone(), grant])
            .unwrap_err();
        assert!(matches!(err, FederationError::Configuration(_)));

        let mut idle = federation.clone();
        idle.refresh_interval_secs = 0;
        assert!(manager.validate_declaration(&idle, &[]).unwrap_err().is_configuration());

        assert!(manager.list_federations(realm_id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_mapper_name_is_a_configuration_error() {
        let (manager, _, realm_id) = manager().await;
        let federation = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "saml", URL, 3600,
            ))
            .await
            .unwrap();

        manager
            .add_mapper(
                realm_id,
                FederationMapper::new(federation.id, "grant", "hardcoded-role-idp-mapper")
                    .with_config("role", "member"),
            )
            .await
            .unwrap();
        let err = manager
            .add_mapper(
                realm_id,
                FederationMapper::new(federation.id, "grant", "hardcoded-role-idp-mapper")
                    .with_config("role", "guest"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FederationError::Configuration(_)));
        assert_eq!(
            manager
                .list_mappers(realm_id, federation.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn incompatible_mapper_type_is_rejected() {
        let (manager, _, realm_id) = manager().await;
        let federation = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "saml", URL, 3600,
            ))
            .await
            .unwrap();

        let err = manager
            .add_mapper(
                realm_id,
                FederationMapper::new(federation.id, "claim", "oidc-user-attribute-idp-mapper")
                    .with_config("claim", "email")
                    .with_config("user.attribute", "email"),
            )
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_federation_cancels_then_cleans_up() {
        let (manager, fetcher, realm_id) = manager().await;
        let federation = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "saml", URL, 3600,
            ))
            .await
            .unwrap();
        fetcher.set_descriptors(URL, vec![ProviderDescriptor::new("p1")]);
        manager.sync_once(realm_id, federation.id).await.unwrap();

        manager
            .remove_federation(realm_id, federation.id)
            .await
            .unwrap();

        assert!(!manager.is_scheduled(federation.id));
        let storage = manager.synchronizer().storage();
        assert!(
            storage
                .identity_providers
                .list(realm_id)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(manager.list_federations(realm_id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn update_reschedules_on_interval_change() {
        let (manager, _, realm_id) = manager().await;
        let mut federation = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "saml", URL, 3600,
            ))
            .await
            .unwrap();

        federation.refresh_interval_secs = 7200;
        manager.update_federation(federation.clone()).await.unwrap();

        assert_eq!(
            manager.scheduler().interval(&task_name(federation.id)),
            Some(Duration::from_secs(7200))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_runs_a_sync() {
        let (manager, fetcher, realm_id) = manager().await;
        fetcher.set_descriptors(URL, vec![ProviderDescriptor::new("p1")]);
        let federation = manager
            .add_federation(IdentityProviderFederation::new(
                realm_id, "edugain", "saml", URL, 60,
            ))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(fetcher.calls(), 1);
        let idp = manager
            .synchronizer()
            .storage()
            .identity_providers
            .get_by_alias(realm_id, "p1")
            .await
            .unwrap();
        assert!(idp.is_some_and(|idp| idp.is_member_of(federation.id)));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_all_covers_every_realm() {
        let (manager, _, realm_id) = manager().await;
        let storage = manager.synchronizer().storage().clone();
        let other = Realm::new("other");
        storage.realms.create(&other).await.unwrap();
        for (realm, alias) in [(realm_id, "a"), (other.id, "b")] {
            storage
                .federations
                .create(&IdentityProviderFederation::new(realm, alias, "saml", URL, 900))
                .await
                .unwrap();
        }

        assert_eq!(manager.schedule_all().await.unwrap(), 2);
        assert_eq!(manager.unschedule_realm(other.id).await.unwrap(), 1);
        assert_eq!(manager.scheduler().scheduled_tasks().len(), 1);
    }
}
