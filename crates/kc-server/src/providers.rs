//! Runtime provider wiring for the server.
//!
//! Builds the storage, cluster lock, scheduler, federation, and realm
//! components from a [`ServerConfig`], and provides the HTTP metadata fetcher
//! used in production.

use std::sync::Arc;

use async_trait::async_trait;
use kc_cluster::{ClusterAwareScheduler, ClusterLock, InMemoryClusterLock};
use kc_cluster_redis::{RedisClusterLock, RedisConfig};
use kc_core::event::{ObserverChain, TracingObserver};
use kc_federation::{
    FederationError, FederationManager, FederationResult, FederationSynchronizer, MetadataFetcher,
};
use kc_model::FetchedMetadata;
use kc_realm::RealmManager;
use kc_spi::ProviderTypeRegistry;
use kc_storage::Storage;

use crate::config::ServerConfig;

// ============================================================================
// HTTP metadata fetcher
// ============================================================================

/// Fetches federation metadata documents over HTTP.
///
/// The document is the JSON form of [`FetchedMetadata`]. Timeouts are applied
/// by the synchronizer around each call.
#[derive(Debug, Clone, Default)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    /// Creates a fetcher with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, url: &str) -> FederationResult<FetchedMetadata> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| FederationError::fetch(url, e.to_string()))?;

        response
            .json::<FetchedMetadata>()
            .await
            .map_err(|e| FederationError::fetch(url, format!("invalid metadata document: {e}")))
    }
}

// ============================================================================
// Stack
// ============================================================================

/// Every long-lived component of a running node.
pub struct Stack {
    /// Storage shared by all components.
    pub storage: Storage,
    /// Cluster-aware scheduler running federation sync tasks.
    pub scheduler: Arc<ClusterAwareScheduler>,
    /// Federation manager.
    pub federations: Arc<FederationManager>,
    /// Realm manager.
    pub realms: Arc<RealmManager>,
}

impl Stack {
    /// Builds the stack described by `config`, fetching metadata through
    /// `fetcher`.
    ///
    /// Locks live in Redis when a Redis URL is configured and in process
    /// otherwise.
    ///
    /// ## Errors
    ///
    /// Returns an error if the Redis connection cannot be established.
    pub async fn build(
        config: &ServerConfig,
        storage: Storage,
        fetcher: Arc<dyn MetadataFetcher>,
    ) -> anyhow::Result<Self> {
        let node_id = config.core.cluster.node_id.clone();

        let lock: Arc<dyn ClusterLock> = match &config.core.cluster.redis_url {
            Some(url) => {
                let redis = RedisConfig::from_url(url.clone()).key_prefix(&config.redis_key_prefix);
                let lock = RedisClusterLock::connect(redis, node_id.clone()).await?;
                tracing::info!(node_id = %node_id, "using Redis cluster lock");
                Arc::new(lock)
            }
            None => {
                tracing::info!(node_id = %node_id, "no Redis configured, locks are node-local");
                Arc::new(InMemoryClusterLock::standalone(node_id))
            }
        };

        let observers = ObserverChain::new().with(Arc::new(TracingObserver));
        Ok(Self::assemble(config, storage, fetcher, lock, observers))
    }

    /// Wires the components around an existing lock and observer chain.
    #[must_use]
    pub fn assemble(
        config: &ServerConfig,
        storage: Storage,
        fetcher: Arc<dyn MetadataFetcher>,
        lock: Arc<dyn ClusterLock>,
        observers: ObserverChain,
    ) -> Self {
        let scheduler = Arc::new(
            ClusterAwareScheduler::new(lock).with_release(config.core.scheduler.lock_release),
        );

        let synchronizer = Arc::new(
            FederationSynchronizer::new(
                storage.clone(),
                Arc::new(ProviderTypeRegistry::with_builtin()),
                fetcher,
            )
            .with_config(&config.core.federation)
            .with_observers(observers.clone()),
        );

        let federations = Arc::new(
            FederationManager::new(synchronizer, scheduler.clone())
                .with_min_refresh_interval(config.min_refresh_interval()),
        );

        let realms = Arc::new(
            RealmManager::new(storage.clone(), &config.core.bootstrap)
                .with_federations(federations.clone())
                .with_observers(observers),
        );

        Self {
            storage,
            scheduler,
            federations,
            realms,
        }
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("node_id", &self.scheduler.node_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use kc_federation::StaticMetadataFetcher;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves one HTTP response and returns the URL it listens on.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/federation.json")
    }

    #[tokio::test]
    async fn http_fetcher_parses_documents() {
        let url = serve_once(
            "200 OK",
            r#"{"descriptors":[{"id":"https://p1.example.org","displayName":"P1"}]}"#,
        )
        .await;

        let metadata = HttpMetadataFetcher::new().fetch(&url).await.unwrap();

        assert_eq!(metadata.descriptors.len(), 1);
        assert_eq!(metadata.descriptors[0].id, "https://p1.example.org");
        assert_eq!(metadata.descriptors[0].display_name.as_deref(), Some("P1"));
        assert!(metadata.valid_until.is_none());
    }

    #[tokio::test]
    async fn http_fetcher_reports_error_status() {
        let url = serve_once("503 Service Unavailable", "").await;

        let err = HttpMetadataFetcher::new().fetch(&url).await.unwrap_err();

        assert!(matches!(err, FederationError::Fetch { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn stack_without_redis_runs_standalone() {
        let mut config = ServerConfig::default();
        config.core.cluster.node_id = "node-a".to_string();

        let stack = Stack::build(
            &config,
            Storage::in_memory(),
            Arc::new(StaticMetadataFetcher::new()),
        )
        .await
        .unwrap();

        assert_eq!(stack.scheduler.node_id(), "node-a");
        let master = stack.realms.ensure_admin_realm().await.unwrap();
        assert_eq!(master.name, "master");
        assert_eq!(stack.federations.schedule_all().await.unwrap(), 0);
    }
}
