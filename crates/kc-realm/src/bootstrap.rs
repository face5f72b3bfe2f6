//! Realm bootstrap orchestrator.
//!
//! [`BootstrapOrchestrator::ensure_defaults`] walks [`DEFAULT_RESOURCES`] in
//! order. A resource is postponed when the import declares it or when one of
//! its dependencies is not yet available; after the main pass the import
//! stage runs and every postponed resource is retried once. A dependency
//! still missing at that point is a configuration error.
//!
//! Running it again on a bootstrapped realm creates nothing and only restores
//! sub-roles missing from the default set.

use kc_core::config::BootstrapConfig;
use kc_model::Realm;
use kc_storage::Storage;
use tracing::{debug, info, instrument};

use crate::error::{BootstrapError, BootstrapResult};
use crate::import::{ImportStage, KnownFromImport};
use crate::registry::{DEFAULT_RESOURCES, DefaultResource, Dependency};
use crate::steps::{Run, StepOutcome, load_realm};

/// What one `ensure_defaults` call did, per resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Resources created.
    pub created: Vec<DefaultResource>,
    /// Resources that already existed and were verified.
    pub verified: Vec<DefaultResource>,
    /// Resources deferred past the main pass.
    pub postponed: Vec<DefaultResource>,
    /// Resources not applicable to the realm or supplied by the import.
    pub skipped: Vec<DefaultResource>,
}

impl BootstrapReport {
    fn record(&mut self, resource: DefaultResource, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Created => self.created.push(resource),
            StepOutcome::Verified => self.verified.push(resource),
        }
    }

    /// Checks whether a resource was deferred past the main pass.
    #[must_use]
    pub fn was_postponed(&self, resource: DefaultResource) -> bool {
        self.postponed.contains(&resource)
    }

    /// Checks whether the call created anything.
    #[must_use]
    pub fn created_any(&self) -> bool {
        !self.created.is_empty()
    }
}

/// Creates and verifies the default resources of a realm.
#[derive(Debug, Clone)]
pub struct BootstrapOrchestrator {
    storage: Storage,
    admin_realm: String,
    role_suffix_limit: u32,
}

impl BootstrapOrchestrator {
    /// Creates an orchestrator with the default bootstrap configuration.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        let config = BootstrapConfig::default();
        Self {
            storage,
            admin_realm: config.admin_realm,
            role_suffix_limit: config.default_role_suffix_limit,
        }
    }

    /// Applies a bootstrap configuration.
    #[must_use]
    pub fn with_config(mut self, config: &BootstrapConfig) -> Self {
        self.admin_realm.clone_from(&config.admin_realm);
        self.role_suffix_limit = config.default_role_suffix_limit;
        self
    }

    /// Name of the administrative realm.
    #[must_use]
    pub fn admin_realm(&self) -> &str {
        &self.admin_realm
    }

    /// Returns the storage handle.
    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Ensures every default resource of `realm` exists.
    ///
    /// `known` lists what an import declares; `import` persists it between
    /// the main pass and the retry of postponed resources. Plain realm
    /// creation passes [`KnownFromImport::none`] and no stage.
    ///
    /// ## Errors
    ///
    /// Returns `UnresolvedDependency` or `AdminRealmMissing` when a postponed
    /// resource still cannot be created after the retry,
    /// `DefaultRoleNamespaceExhausted` when no default role name is free, and
    /// any storage or import error. A failure leaves the realm partially
    /// bootstrapped; the caller retries or discards it.
    #[instrument(skip_all, fields(realm_id = %realm.id, realm = %realm.name))]
    pub async fn ensure_defaults(
        &self,
        realm: &Realm,
        known: &KnownFromImport,
        import: Option<&dyn ImportStage>,
    ) -> BootstrapResult<BootstrapReport> {
        let realm = load_realm(&self.storage, realm.id).await?;
        let mut run = Run::new(
            &self.storage,
            &self.admin_realm,
            self.role_suffix_limit,
            known,
            realm,
        );
        let mut report = BootstrapReport::default();
        let mut postponed: Vec<DefaultResource> = Vec::new();

        for &resource in DEFAULT_RESOURCES {
            if !resource.is_applicable(run.is_admin_realm()) || run.replaced_by_import(resource) {
                report.skipped.push(resource);
                continue;
            }
            if run.awaits_import(resource).await? {
                debug!(resource = %resource, "postponed until imported");
                postponed.push(resource);
                continue;
            }
            if let Some(dependency) = run.blocking_dependency(resource, &postponed).await? {
                debug!(resource = %resource, dependency = %dependency, "postponed");
                postponed.push(resource);
                continue;
            }
            let outcome = run.apply(resource).await?;
            report.record(resource, outcome);
        }

        if let Some(stage) = import {
            stage.import(&self.storage, run.realm()).await?;
            run.reload().await?;
        }

        for &resource in &postponed {
            if let Some(dependency) = run.blocking_dependency(resource, &[]).await? {
                return Err(match dependency {
                    Dependency::AdminRealm => {
                        BootstrapError::AdminRealmMissing(self.admin_realm.clone())
                    }
                    dependency => BootstrapError::unresolved(resource, dependency),
                });
            }
            let outcome = run.apply(resource).await?;
            report.record(resource, outcome);
        }
        report.postponed = postponed;

        info!(
            created = report.created.len(),
            verified = report.verified.len(),
            postponed = report.postponed.len(),
            "realm defaults ensured"
        );
        Ok(report)
    }
}
