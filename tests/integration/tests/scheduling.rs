//! Scheduled federation sync across nodes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kc_cluster::{ClusterLock, RunOutcome};
use kc_federation::{FederationError, FederationResult, MetadataFetcher, StaticMetadataFetcher, task_name};
use kc_model::{FetchedMetadata, IdentityProviderFederation, ProviderDescriptor};
use kc_realm::{FederationDocument, RealmDocument};
use kc_server::Stack;
use uuid::Uuid;

use crate::common::{METADATA_URL, TestEnv};

const WINDOW: Duration = Duration::from_secs(60);

/// Fetcher that takes a while before answering.
struct SlowFetcher {
    inner: Arc<StaticMetadataFetcher>,
    delay: Duration,
}

#[async_trait]
impl MetadataFetcher for SlowFetcher {
    async fn fetch(&self, url: &str) -> FederationResult<FetchedMetadata> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch(url).await
    }
}

async fn import_federated_realm(node: &Stack) -> anyhow::Result<(Uuid, Uuid)> {
    let mut federation = FederationDocument::new("edugain", "saml", METADATA_URL);
    federation.refresh_interval_secs = WINDOW.as_secs();
    let acme = node
        .realms
        .import_realm(&RealmDocument::new("acme").with_federation(federation))
        .await?;
    let federation_id = node
        .federations
        .list_federations(acme.id)
        .await?
        .first()
        .map(|f| f.id)
        .ok_or_else(|| anyhow::anyhow!("federation not imported"))?;
    Ok((acme.id, federation_id))
}

/// Tests that two nodes sync a federation once per window.
#[tokio::test(start_paused = true)]
async fn two_nodes_sync_once_per_window() -> anyhow::Result<()> {
    let env = TestEnv::holding_leases();
    env.fetcher
        .set_descriptors(METADATA_URL, vec![ProviderDescriptor::new("p1")]);
    let a = env.bootstrapped_node("a").await?;
    let b = env.bootstrapped_node("b").await?;

    let (realm_id, federation_id) = import_federated_realm(&a).await?;
    assert_eq!(b.federations.schedule_all().await?, 1);
    assert!(a.federations.is_scheduled(federation_id));
    assert!(b.federations.is_scheduled(federation_id));

    tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
    assert_eq!(env.fetcher.calls(), 1);
    assert_eq!(env.members(realm_id, federation_id).await?, vec!["p1"]);
    assert!(env.locks.holder(&task_name(federation_id)).is_some());

    tokio::time::sleep(WINDOW).await;
    assert_eq!(env.fetcher.calls(), 2);

    a.scheduler.shutdown();
    b.scheduler.shutdown();
    Ok(())
}

/// Tests that a lease left by a crashed node blocks until it expires.
#[tokio::test(start_paused = true)]
async fn crashed_node_lease_expires() -> anyhow::Result<()> {
    let env = TestEnv::new();
    env.fetcher
        .set_descriptors(METADATA_URL, vec![ProviderDescriptor::new("p1")]);
    let node = env.bootstrapped_node("b").await?;
    let (realm_id, federation_id) = import_federated_realm(&node).await?;

    let crashed = env.locks.handle("crashed");
    assert!(
        crashed
            .try_acquire(&task_name(federation_id), Duration::from_secs(90))
            .await?
    );

    tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;
    assert_eq!(env.fetcher.calls(), 0);
    assert!(env.members(realm_id, federation_id).await?.is_empty());

    tokio::time::sleep(WINDOW).await;
    assert_eq!(env.fetcher.calls(), 1);
    assert_eq!(env.members(realm_id, federation_id).await?, vec!["p1"]);
    assert!(env.locks.holder(&task_name(federation_id)).is_none());
    Ok(())
}

/// Tests that cancelling a federation's task lets a running sync finish.
#[tokio::test(start_paused = true)]
async fn unscheduling_lets_the_running_sync_finish() -> anyhow::Result<()> {
    let env = TestEnv::new();
    env.fetcher
        .set_descriptors(METADATA_URL, vec![ProviderDescriptor::new("p1")]);
    let slow = Arc::new(SlowFetcher {
        inner: env.fetcher.clone(),
        delay: Duration::from_secs(10),
    });
    let node = env.node_with("a", slow);
    node.realms.ensure_admin_realm().await?;
    let (realm_id, federation_id) = import_federated_realm(&node).await?;

    tokio::time::sleep(WINDOW + Duration::from_secs(5)).await;
    assert!(env.members(realm_id, federation_id).await?.is_empty());
    assert!(node.federations.unschedule_federation(federation_id));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(env.fetcher.calls(), 1);
    assert_eq!(env.members(realm_id, federation_id).await?, vec!["p1"]);

    tokio::time::sleep(WINDOW * 3).await;
    assert_eq!(env.fetcher.calls(), 1);
    Ok(())
}

/// Tests that a failed window leaves the next one to retry.
#[tokio::test(start_paused = true)]
async fn failed_window_is_retried() -> anyhow::Result<()> {
    let env = TestEnv::new();
    env.fetcher
        .set_descriptors(METADATA_URL, vec![ProviderDescriptor::new("p1")]);
    let node = env.bootstrapped_node("a").await?;
    let (realm_id, federation_id) = import_federated_realm(&node).await?;
    let name = task_name(federation_id);

    env.store.fail_on("federation.mark_refreshed");
    assert!(matches!(
        node.scheduler.run_now(&name).await?,
        RunOutcome::Failed(_)
    ));
    assert!(env.locks.holder(&name).is_none());

    env.store.clear_faults();
    assert_eq!(node.scheduler.run_now(&name).await?, RunOutcome::Completed);
    assert_eq!(env.members(realm_id, federation_id).await?, vec!["p1"]);
    Ok(())
}

/// Tests that refresh intervals are raised to the configured minimum.
#[tokio::test(start_paused = true)]
async fn short_refresh_intervals_are_raised() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let acme = node.realms.create_realm(None, "acme").await?;

    let federation = node
        .federations
        .add_federation(IdentityProviderFederation::new(
            acme.id,
            "edugain",
            "saml",
            METADATA_URL,
            5,
        ))
        .await?;
    assert_eq!(
        node.scheduler.interval(&task_name(federation.id)),
        Some(WINDOW)
    );

    let err = node
        .federations
        .add_federation(IdentityProviderFederation::new(
            acme.id,
            "never",
            "saml",
            METADATA_URL,
            0,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::Configuration(_)));
    assert!(err.is_configuration());
    Ok(())
}
