//! Federation synchronization.
//!
//! One cycle for one federation: fetch the metadata, diff it against the
//! providers that are currently members, then apply the operations provider
//! by provider. A fetch failure leaves everything untouched. A failure on one
//! provider is recorded and the cycle moves on; operations already applied
//! stay in place. Only a failure to persist the federation record itself
//! aborts the cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kc_core::config::FederationConfig;
use kc_core::event::{EventBuilder, EventType, ObserverChain};
use kc_model::{FederationMapper, IdentityProvider, IdentityProviderFederation, ProviderDescriptor};
use kc_spi::ProviderTypeRegistry;
use kc_storage::{Detachment, Storage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::diff::diff;
use crate::error::{FederationError, FederationResult};
use crate::fetch::MetadataFetcher;

// ============================================================================
// Sync Results
// ============================================================================

/// Result of a synchronization cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Number of providers added or newly attached.
    pub added: usize,

    /// Number of providers updated.
    pub updated: usize,

    /// Number of providers removed or detached.
    pub removed: usize,

    /// Number of providers whose operation failed.
    pub failed: usize,

    /// When the sync started.
    pub started_at: DateTime<Utc>,

    /// When the sync completed.
    pub completed_at: DateTime<Utc>,

    /// Status message.
    pub status: String,

    /// Errors encountered (if any).
    pub errors: Vec<SyncError>,
}

impl SyncResult {
    /// Creates a new sync result.
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            added: 0,
            updated: 0,
            removed: 0,
            failed: 0,
            started_at,
            completed_at: started_at,
            status: String::new(),
            errors: Vec::new(),
        }
    }

    /// Marks the sync as complete.
    #[must_use]
    pub fn complete(mut self) -> Self {
        self.completed_at = Utc::now();
        self.status = format!(
            "Sync completed: {} added, {} updated, {} removed, {} failed",
            self.added, self.updated, self.removed, self.failed
        );
        self
    }

    /// Records a provider addition.
    pub fn record_added(&mut self) {
        self.added += 1;
    }

    /// Records a provider update.
    pub fn record_updated(&mut self) {
        self.updated += 1;
    }

    /// Records a provider removal.
    pub fn record_removed(&mut self) {
        self.removed += 1;
    }

    /// Records a provider whose operation failed.
    pub fn record_failure(&mut self, error: SyncError) {
        self.failed += 1;
        self.errors.push(error);
    }

    /// Records an error on a provider whose main operation succeeded.
    pub fn record_partial(&mut self, error: SyncError) {
        self.errors.push(error);
    }

    /// Returns the total number of providers processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.added + self.updated + self.removed + self.failed
    }

    /// Returns true if the sync had any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Error encountered during sync for a specific provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    /// Provider alias.
    pub alias: String,

    /// Mapper template name, when the failure concerns a mapper.
    pub mapper: Option<String>,

    /// Error message.
    pub message: String,
}

impl SyncError {
    /// Creates a new sync error.
    #[must_use]
    pub fn new(alias: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            mapper: None,
            message: message.into(),
        }
    }

    /// Sets the mapper template name.
    #[must_use]
    pub fn with_mapper(mut self, name: impl Into<String>) -> Self {
        self.mapper = Some(name.into());
        self
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Runs sync cycles for federations.
pub struct FederationSynchronizer {
    storage: Storage,
    registry: Arc<ProviderTypeRegistry>,
    fetcher: Arc<dyn MetadataFetcher>,
    observers: ObserverChain,
    fetch_timeout: Duration,
    backfill_mappers: bool,
}

impl FederationSynchronizer {
    /// Creates a synchronizer with default settings.
    #[must_use]
    pub fn new(
        storage: Storage,
        registry: Arc<ProviderTypeRegistry>,
        fetcher: Arc<dyn MetadataFetcher>,
    ) -> Self {
        let defaults = FederationConfig::default();
        Self {
            storage,
            registry,
            fetcher,
            observers: ObserverChain::new(),
            fetch_timeout: Duration::from_secs(defaults.fetch_timeout_secs),
            backfill_mappers: defaults.backfill_mappers,
        }
    }

    /// Applies fetch timeout and mapper back-fill from configuration.
    #[must_use]
    pub fn with_config(mut self, config: &FederationConfig) -> Self {
        self.fetch_timeout = Duration::from_secs(config.fetch_timeout_secs);
        self.backfill_mappers = config.backfill_mappers;
        self
    }

    /// Sets the observers notified of every change.
    #[must_use]
    pub fn with_observers(mut self, observers: ObserverChain) -> Self {
        self.observers = observers;
        self
    }

    /// Sets the metadata fetch timeout.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Adds missing mapper templates to providers on update.
    #[must_use]
    pub const fn with_backfill_mappers(mut self, enabled: bool) -> Self {
        self.backfill_mappers = enabled;
        self
    }

    /// Returns the storage handles.
    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Returns the provider type registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderTypeRegistry> {
        &self.registry
    }

    /// Returns the observer chain.
    #[must_use]
    pub const fn observers(&self) -> &ObserverChain {
        &self.observers
    }

    /// Runs one sync cycle for a federation.
    ///
    /// ## Errors
    ///
    /// Returns an error if the federation does not exist, the metadata cannot
    /// be fetched, or the federation record cannot be updated. Per-provider
    /// failures are reported in the [`SyncResult`] instead.
    #[instrument(skip_all, fields(realm_id = %realm_id, federation_id = %federation_id))]
    pub async fn sync_once(
        &self,
        realm_id: Uuid,
        federation_id: Uuid,
    ) -> FederationResult<SyncResult> {
        let started_at = Utc::now();
        let federation = self
            .storage
            .federations
            .get_by_id(realm_id, federation_id)
            .await?
            .ok_or_else(|| FederationError::not_found(format!("federation {federation_id}")))?;

        let metadata = match self.fetch(&federation.url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(url = %federation.url, error = %e, "metadata fetch failed, skipping cycle");
                self.observers.notify(
                    &EventBuilder::new(EventType::FederationSyncFailed)
                        .realm(realm_id)
                        .federation(federation_id)
                        .resource(federation.alias.clone())
                        .failure(e.to_string())
                        .build(),
                );
                return Err(e);
            }
        };

        let members = self
            .storage
            .identity_providers
            .list_by_federation(realm_id, federation_id)
            .await?;
        let current: HashSet<String> = members.into_iter().map(|idp| idp.alias).collect();
        let operations = diff(&current, &metadata.descriptors, &federation.filters);
        debug!(
            fetched = metadata.descriptors.len(),
            add = operations.to_add.len(),
            update = operations.to_update.len(),
            remove = operations.to_remove.len(),
            "computed federation diff"
        );

        let templates = self
            .storage
            .federations
            .list_mappers(realm_id, federation_id)
            .await?;
        let mut result = SyncResult::new(started_at);

        for descriptor in &operations.to_add {
            if let Err(e) = self
                .add_provider(&federation, descriptor, &templates, &mut result)
                .await
            {
                warn!(alias = %descriptor.id, error = %e, "failed to add provider");
                result.record_failure(SyncError::new(&descriptor.id, e.to_string()));
            }
        }
        for descriptor in &operations.to_update {
            if let Err(e) = self
                .update_provider(&federation, descriptor, &templates, &mut result)
                .await
            {
                warn!(alias = %descriptor.id, error = %e, "failed to update provider");
                result.record_failure(SyncError::new(&descriptor.id, e.to_string()));
            }
        }
        for alias in &operations.to_remove {
            if let Err(e) = self.remove_provider(&federation, alias, &mut result).await {
                warn!(alias = %alias, error = %e, "failed to remove provider");
                result.record_failure(SyncError::new(alias, e.to_string()));
            }
        }

        self.storage
            .federations
            .mark_refreshed(realm_id, federation_id, Utc::now(), metadata.valid_until)
            .await?;

        let result = result.complete();
        info!(
            alias = %federation.alias,
            added = result.added,
            updated = result.updated,
            removed = result.removed,
            failed = result.failed,
            "federation synchronized"
        );
        self.observers.notify(
            &EventBuilder::new(EventType::FederationSynced)
                .realm(realm_id)
                .federation(federation_id)
                .resource(federation.alias.clone())
                .detail("added", result.added)
                .detail("updated", result.updated)
                .detail("removed", result.removed)
                .detail("failed", result.failed)
                .build(),
        );
        Ok(result)
    }

    async fn fetch(&self, url: &str) -> FederationResult<kc_model::FetchedMetadata> {
        tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| FederationError::Timeout(url.to_string()))?
    }

    /// Provider configuration: federation config overlaid with the
    /// descriptor's, then type defaults and validation.
    fn provider_config(
        &self,
        federation: &IdentityProviderFederation,
        descriptor: &ProviderDescriptor,
    ) -> FederationResult<HashMap<String, String>> {
        let mut config = federation.config.clone();
        config.extend(descriptor.config.clone());
        self.registry
            .prepare_identity_provider(&federation.provider_type, &descriptor.id, &mut config)?;
        Ok(config)
    }

    fn overwrite(
        federation: &IdentityProviderFederation,
        descriptor: &ProviderDescriptor,
        config: HashMap<String, String>,
        idp: &mut IdentityProvider,
    ) {
        idp.display_name.clone_from(&descriptor.display_name);
        idp.config = config;
        idp.enabled = federation.provider_defaults.enabled;
        idp.trust_email = federation.provider_defaults.trust_email;
        idp.link_only = federation.provider_defaults.link_only;
    }

    async fn add_provider(
        &self,
        federation: &IdentityProviderFederation,
        descriptor: &ProviderDescriptor,
        templates: &[FederationMapper],
        result: &mut SyncResult,
    ) -> FederationResult<()> {
        let config = self.provider_config(federation, descriptor)?;
        let existing = self
            .storage
            .identity_providers
            .get_by_alias(federation.realm_id, &descriptor.id)
            .await?;

        if let Some(idp) = existing {
            return self
                .join_existing(federation, descriptor, config, idp, templates, result)
                .await;
        }

        let mut idp =
            IdentityProvider::new(federation.realm_id, &descriptor.id, &federation.provider_type);
        Self::overwrite(federation, descriptor, config.clone(), &mut idp);
        idp.attach_federation(federation.id);
        match self.storage.identity_providers.create(&idp).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => {
                // Another federation created it since the lookup.
                let idp = self
                    .storage
                    .identity_providers
                    .get_by_alias(federation.realm_id, &descriptor.id)
                    .await?
                    .ok_or(FederationError::Storage(e))?;
                return self
                    .join_existing(federation, descriptor, config, idp, templates, result)
                    .await;
            }
            Err(e) => return Err(e.into()),
        }
        result.record_added();
        debug!(alias = %idp.alias, "created provider");
        self.notify_provider(EventType::IdentityProviderAdded, federation, &idp.alias);

        self.apply_templates(federation, &idp, templates, false, result)
            .await
    }

    /// Takes over a provider that exists under another federation or was
    /// created by hand: settings are overwritten, then membership is added.
    async fn join_existing(
        &self,
        federation: &IdentityProviderFederation,
        descriptor: &ProviderDescriptor,
        config: HashMap<String, String>,
        mut idp: IdentityProvider,
        templates: &[FederationMapper],
        result: &mut SyncResult,
    ) -> FederationResult<()> {
        Self::overwrite(federation, descriptor, config, &mut idp);
        self.storage.identity_providers.update(&idp).await?;
        self.storage
            .identity_providers
            .attach_federation(federation.realm_id, &idp.alias, federation.id)
            .await?;
        result.record_added();
        debug!(alias = %idp.alias, "attached existing provider");
        self.notify_provider(EventType::IdentityProviderUpdated, federation, &idp.alias);
        if self.backfill_mappers {
            self.apply_templates(federation, &idp, templates, true, result)
                .await?;
        }
        Ok(())
    }

    async fn update_provider(
        &self,
        federation: &IdentityProviderFederation,
        descriptor: &ProviderDescriptor,
        templates: &[FederationMapper],
        result: &mut SyncResult,
    ) -> FederationResult<()> {
        let config = self.provider_config(federation, descriptor)?;
        let Some(mut idp) = self
            .storage
            .identity_providers
            .get_by_alias(federation.realm_id, &descriptor.id)
            .await?
        else {
            return Err(FederationError::not_found(format!(
                "identity provider {}",
                descriptor.id
            )));
        };

        Self::overwrite(federation, descriptor, config, &mut idp);
        self.storage.identity_providers.update(&idp).await?;
        result.record_updated();
        self.notify_provider(EventType::IdentityProviderUpdated, federation, &idp.alias);

        if self.backfill_mappers {
            self.apply_templates(federation, &idp, templates, true, result)
                .await?;
        }
        Ok(())
    }

    async fn remove_provider(
        &self,
        federation: &IdentityProviderFederation,
        alias: &str,
        result: &mut SyncResult,
    ) -> FederationResult<()> {
        let event = match detach_or_delete(&self.storage, federation.realm_id, alias, federation.id)
            .await?
        {
            Detachment::Deleted => EventType::IdentityProviderRemoved,
            Detachment::Detached => EventType::FederationMembershipDetached,
            Detachment::Unchanged => return Ok(()),
        };
        self.notify_provider(event, federation, alias);
        result.record_removed();
        Ok(())
    }

    /// Instantiates `templates` on `idp`. With `missing_only`, templates whose
    /// name already exists on the provider are skipped. Failures are recorded
    /// as partial and do not undo the provider.
    async fn apply_templates(
        &self,
        federation: &IdentityProviderFederation,
        idp: &IdentityProvider,
        templates: &[FederationMapper],
        missing_only: bool,
        result: &mut SyncResult,
    ) -> FederationResult<()> {
        let existing: HashSet<String> = if missing_only {
            self.storage
                .idp_mappers
                .list_by_alias(idp.realm_id, &idp.alias)
                .await?
                .into_iter()
                .map(|m| m.name)
                .collect()
        } else {
            HashSet::new()
        };

        for template in templates {
            if existing.contains(&template.name) {
                continue;
            }
            let applied = match self.registry.validate_mapper(
                &idp.provider_type,
                &template.mapper_type,
                &template.config,
            ) {
                Ok(()) => self
                    .storage
                    .idp_mappers
                    .create(&template.instantiate(idp.realm_id, &idp.alias))
                    .await
                    .map_err(FederationError::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = applied {
                warn!(
                    alias = %idp.alias,
                    mapper = %template.name,
                    federation = %federation.alias,
                    error = %e,
                    "failed to apply mapper template"
                );
                result.record_partial(
                    SyncError::new(&idp.alias, e.to_string()).with_mapper(&template.name),
                );
            }
        }
        Ok(())
    }

    fn notify_provider(
        &self,
        event_type: EventType,
        federation: &IdentityProviderFederation,
        alias: &str,
    ) {
        self.observers.notify(
            &EventBuilder::new(event_type)
                .realm(federation.realm_id)
                .federation(federation.id)
                .resource(alias)
                .build(),
        );
    }
}

impl std::fmt::Debug for FederationSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationSynchronizer")
            .field("fetch_timeout", &self.fetch_timeout)
            .field("backfill_mappers", &self.backfill_mappers)
            .finish_non_exhaustive()
    }
}

/// Removes `federation_id` from the provider's memberships, deleting the
/// provider when that was its last one.
pub(crate) async fn detach_or_delete(
    storage: &Storage,
    realm_id: Uuid,
    alias: &str,
    federation_id: Uuid,
) -> FederationResult<Detachment> {
    let detachment = storage
        .identity_providers
        .detach_federation(realm_id, alias, federation_id)
        .await?;
    match detachment {
        Detachment::Deleted => debug!(%alias, "deleted provider with no remaining federation"),
        Detachment::Detached => debug!(%alias, "detached provider, other memberships remain"),
        Detachment::Unchanged => debug!(%alias, "provider was no longer a member"),
    }
    Ok(detachment)
}
