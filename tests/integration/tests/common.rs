//! Common test utilities and fixtures.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use kc_cluster::InMemoryLockStore;
use kc_core::config::LockRelease;
use kc_core::event::{InMemoryObserver, ObserverChain};
use kc_federation::{MetadataFetcher, StaticMetadataFetcher};
use kc_model::{IdentityProvider, Realm};
use kc_server::{ServerConfig, Stack};
use kc_storage::{MemoryStore, Storage};
use uuid::Uuid;

/// Metadata URL used by most federation tests.
pub const METADATA_URL: &str = "https://md.example.org/federation.json";

/// Test environment: one store and one lease table shared by every node.
pub struct TestEnv {
    /// Backing store, for fault injection.
    pub store: Arc<MemoryStore>,
    /// Storage view of the store.
    pub storage: Storage,
    /// Metadata served to every node.
    pub fetcher: Arc<StaticMetadataFetcher>,
    /// Shared lease table.
    pub locks: Arc<InMemoryLockStore>,
    /// Events of every node.
    pub events: Arc<InMemoryObserver>,
    config: ServerConfig,
}

impl TestEnv {
    /// Creates an environment with default settings.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates an environment whose nodes hold leases for a whole window.
    pub fn holding_leases() -> Self {
        let mut config = ServerConfig::default();
        config.core.scheduler.lock_release = LockRelease::HoldForWindow;
        Self::with_config(config)
    }

    /// Creates an environment from an explicit configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        // Initialize tracing for tests
        let _ = tracing_subscriber::fmt()
            .with_env_filter("kc_realm=debug,kc_federation=debug,kc_cluster=debug")
            .with_test_writer()
            .try_init();

        let store = Arc::new(MemoryStore::new());
        Self {
            storage: Storage::from_memory(store.clone()),
            store,
            fetcher: Arc::new(StaticMetadataFetcher::new()),
            locks: InMemoryLockStore::shared(),
            events: Arc::new(InMemoryObserver::new()),
            config,
        }
    }

    /// Starts a node named `node_id`.
    pub fn node(&self, node_id: &str) -> Stack {
        self.node_with(node_id, self.fetcher.clone())
    }

    /// Starts a node fetching metadata through `fetcher`.
    pub fn node_with(&self, node_id: &str, fetcher: Arc<dyn MetadataFetcher>) -> Stack {
        let mut config = self.config.clone();
        config.core.cluster.node_id = node_id.to_string();
        Stack::assemble(
            &config,
            self.storage.clone(),
            fetcher,
            Arc::new(self.locks.handle(node_id)),
            ObserverChain::new().with(self.events.clone()),
        )
    }

    /// Starts a node and bootstraps the administrative realm through it.
    pub async fn bootstrapped_node(&self, node_id: &str) -> anyhow::Result<Stack> {
        let node = self.node(node_id);
        node.realms.ensure_admin_realm().await?;
        Ok(node)
    }

    /// Loads a realm by name.
    pub async fn realm(&self, name: &str) -> anyhow::Result<Realm> {
        self.storage
            .realms
            .get_by_name(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("realm {name} not found"))
    }

    /// Aliases of the providers that are members of a federation, sorted.
    pub async fn members(&self, realm_id: Uuid, federation_id: Uuid) -> anyhow::Result<Vec<String>> {
        let mut aliases: Vec<String> = self
            .storage
            .identity_providers
            .list_by_federation(realm_id, federation_id)
            .await?
            .into_iter()
            .map(|idp| idp.alias)
            .collect();
        aliases.sort();
        Ok(aliases)
    }

    /// Loads a provider by alias.
    pub async fn provider(&self, realm_id: Uuid, alias: &str) -> anyhow::Result<Option<IdentityProvider>> {
        Ok(self
            .storage
            .identity_providers
            .get_by_alias(realm_id, alias)
            .await?)
    }

    /// Names of the mappers attached to a provider, sorted.
    pub async fn mapper_names(&self, realm_id: Uuid, alias: &str) -> anyhow::Result<Vec<String>> {
        let mut names: Vec<String> = self
            .storage
            .idp_mappers
            .list_by_alias(realm_id, alias)
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Checks that no role of the realm reaches itself through composites.
    pub async fn composites_are_acyclic(&self, realm_id: Uuid) -> anyhow::Result<bool> {
        let mut roles = self.storage.roles.list_realm_roles(realm_id).await?;
        for client in self.storage.clients.list(realm_id).await? {
            roles.extend(self.storage.roles.list_client_roles(realm_id, client.id).await?);
        }

        let mut edges: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for role in &roles {
            let children = self.storage.roles.get_composites(realm_id, role.id).await?;
            edges.insert(role.id, children.into_iter().map(|r| r.id).collect());
        }

        for role in &roles {
            let mut queue: VecDeque<Uuid> = edges.get(&role.id).cloned().unwrap_or_default().into();
            let mut visited = HashSet::new();
            while let Some(next) = queue.pop_front() {
                if next == role.id {
                    return Ok(false);
                }
                if visited.insert(next) {
                    queue.extend(edges.get(&next).into_iter().flatten().copied());
                }
            }
        }
        Ok(true)
    }
}
