//! Federation sync integration tests.

use kc_core::event::EventType;
use kc_federation::FederationError;
use kc_model::{
    FederationMapper, FilterSet, IdentityProvider, IdentityProviderFederation, ProviderDescriptor,
};
use kc_realm::{FederationDocument, MapperDocument, RealmDocument};
use kc_server::{ServerConfig, Stack};
use uuid::Uuid;

use crate::common::{METADATA_URL, TestEnv};

const HIDE_FROM_DISCOVERY: (&str, &str) = (
    "http://macedir.org/entity-category",
    "http://refeds.org/category/hide-from-discovery",
);

fn descriptor(id: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(id)
        .with_config("singleSignOnServiceUrl", format!("https://{id}.example.org/sso"))
}

fn email_template() -> MapperDocument {
    MapperDocument::new("email", "saml-user-attribute-idp-mapper")
        .with_config("attribute.name", "mail")
        .with_config("user.attribute", "email")
}

async fn realm_with_federation(
    env: &TestEnv,
    node: &Stack,
) -> anyhow::Result<(Uuid, IdentityProviderFederation)> {
    let document = RealmDocument::new("acme").with_federation(
        FederationDocument::new("edugain", "saml", METADATA_URL).with_mapper(email_template()),
    );
    let acme = node.realms.import_realm(&document).await?;
    let federation = node
        .federations
        .list_federations(acme.id)
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("federation not imported"))?;
    assert!(node.federations.is_scheduled(federation.id));
    env.events.clear();
    Ok((acme.id, federation))
}

/// Tests a metadata change adding, updating, and removing providers.
#[tokio::test]
async fn metadata_changes_are_applied() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let (realm_id, federation) = realm_with_federation(&env, &node).await?;

    env.fetcher
        .set_descriptors(METADATA_URL, vec![descriptor("p1"), descriptor("p3")]);
    let first = node.federations.sync_once(realm_id, federation.id).await?;
    assert_eq!((first.added, first.updated, first.removed), (2, 0, 0));

    env.fetcher.set_descriptors(
        METADATA_URL,
        vec![
            descriptor("p1").with_display_name("Provider One"),
            descriptor("p2"),
        ],
    );
    let second = node.federations.sync_once(realm_id, federation.id).await?;

    assert_eq!(
        (second.added, second.updated, second.removed, second.failed),
        (1, 1, 1, 0)
    );
    assert_eq!(env.members(realm_id, federation.id).await?, vec!["p1", "p2"]);
    assert!(env.provider(realm_id, "p3").await?.is_none());

    let p1 = env
        .provider(realm_id, "p1")
        .await?
        .ok_or_else(|| anyhow::anyhow!("p1 missing"))?;
    assert_eq!(p1.display_name.as_deref(), Some("Provider One"));
    assert_eq!(p1.provider_type, "saml");
    assert_eq!(env.mapper_names(realm_id, "p2").await?, vec!["email"]);

    let stored = node
        .federations
        .list_federations(realm_id)
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("federation missing"))?;
    assert!(stored.last_refresh.is_some());

    assert_eq!(env.events.of_type(EventType::IdentityProviderAdded).len(), 3);
    assert_eq!(env.events.of_type(EventType::IdentityProviderRemoved).len(), 1);
    assert_eq!(env.events.of_type(EventType::FederationSynced).len(), 2);
    Ok(())
}

/// Tests that filters decide membership, deny checks first.
#[tokio::test]
async fn filters_select_members() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let acme = node.realms.create_realm(None, "acme").await?;

    let filters = FilterSet::new()
        .allow_entity("p1")
        .allow_entity("p2")
        .allow_entity("p4")
        .deny_entity("p2")
        .deny_category(HIDE_FROM_DISCOVERY.0, HIDE_FROM_DISCOVERY.1);
    let federation = node
        .federations
        .add_federation(
            IdentityProviderFederation::new(acme.id, "edugain", "saml", METADATA_URL, 3600)
                .with_filters(filters),
        )
        .await?;

    env.fetcher.set_descriptors(
        METADATA_URL,
        vec![
            descriptor("p1"),
            descriptor("p2"),
            descriptor("p3"),
            descriptor("p4").with_category(HIDE_FROM_DISCOVERY.0, HIDE_FROM_DISCOVERY.1),
        ],
    );
    let result = node.federations.sync_once(acme.id, federation.id).await?;

    assert_eq!(result.added, 1);
    assert_eq!(env.members(acme.id, federation.id).await?, vec!["p1"]);
    Ok(())
}

/// Tests providers listed by two federations.
#[tokio::test]
async fn shared_providers_follow_membership() -> anyhow::Result<()> {
    const OTHER_URL: &str = "https://md.example.org/other.json";

    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let acme = node.realms.create_realm(None, "acme").await?;
    let first = node
        .federations
        .add_federation(IdentityProviderFederation::new(
            acme.id,
            "first",
            "saml",
            METADATA_URL,
            3600,
        ))
        .await?;
    let second = node
        .federations
        .add_federation(IdentityProviderFederation::new(
            acme.id,
            "second",
            "saml",
            OTHER_URL,
            3600,
        ))
        .await?;

    env.fetcher
        .set_descriptors(METADATA_URL, vec![descriptor("shared"), descriptor("a1")]);
    env.fetcher
        .set_descriptors(OTHER_URL, vec![descriptor("shared"), descriptor("b1")]);
    node.federations.sync_once(acme.id, first.id).await?;
    let attached = node.federations.sync_once(acme.id, second.id).await?;
    assert_eq!(attached.added, 2);

    let shared = env
        .provider(acme.id, "shared")
        .await?
        .ok_or_else(|| anyhow::anyhow!("shared missing"))?;
    assert!(shared.is_member_of(first.id) && shared.is_member_of(second.id));

    env.fetcher.set_descriptors(METADATA_URL, vec![descriptor("a1")]);
    let detached = node.federations.sync_once(acme.id, first.id).await?;
    assert_eq!(detached.removed, 1);
    assert_eq!(env.members(acme.id, first.id).await?, vec!["a1"]);
    assert_eq!(env.members(acme.id, second.id).await?, vec!["b1", "shared"]);
    assert_eq!(
        env.events
            .of_type(EventType::FederationMembershipDetached)
            .len(),
        1
    );

    node.federations.remove_federation(acme.id, second.id).await?;
    assert!(!node.federations.is_scheduled(second.id));
    assert!(env.provider(acme.id, "shared").await?.is_none());
    assert!(env.provider(acme.id, "b1").await?.is_none());
    assert!(env.provider(acme.id, "a1").await?.is_some());
    Ok(())
}

/// Tests that a provider created by hand joins the federation listing it.
#[tokio::test]
async fn existing_provider_is_attached() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let (realm_id, federation) = realm_with_federation(&env, &node).await?;
    env.storage
        .identity_providers
        .create(&IdentityProvider::new(realm_id, "p1", "saml"))
        .await?;

    env.fetcher.set_descriptors(METADATA_URL, vec![descriptor("p1")]);
    let result = node.federations.sync_once(realm_id, federation.id).await?;

    assert_eq!(result.added, 1);
    assert_eq!(env.members(realm_id, federation.id).await?, vec!["p1"]);
    assert!(
        env.mapper_names(realm_id, "p1").await?.is_empty(),
        "templates are not back-filled by default"
    );
    assert_eq!(env.events.of_type(EventType::IdentityProviderUpdated).len(), 1);
    Ok(())
}

/// Tests template back-fill onto providers that already exist.
#[tokio::test]
async fn backfill_applies_new_templates() -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    config.core.federation.backfill_mappers = true;
    let env = TestEnv::with_config(config);
    let node = env.bootstrapped_node("a").await?;
    let (realm_id, federation) = realm_with_federation(&env, &node).await?;

    env.fetcher.set_descriptors(METADATA_URL, vec![descriptor("p1")]);
    node.federations.sync_once(realm_id, federation.id).await?;
    assert_eq!(env.mapper_names(realm_id, "p1").await?, vec!["email"]);

    node.federations
        .add_mapper(
            realm_id,
            FederationMapper::new(federation.id, "member", "hardcoded-attribute-idp-mapper")
                .with_config("attribute", "federated"),
        )
        .await?;
    let result = node.federations.sync_once(realm_id, federation.id).await?;

    assert_eq!(result.updated, 1);
    assert_eq!(
        env.mapper_names(realm_id, "p1").await?,
        vec!["email", "member"]
    );
    Ok(())
}

/// Tests that an unreachable metadata source changes nothing.
#[tokio::test]
async fn fetch_failure_keeps_members() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let (realm_id, federation) = realm_with_federation(&env, &node).await?;
    env.fetcher
        .set_descriptors(METADATA_URL, vec![descriptor("p1"), descriptor("p2")]);
    node.federations.sync_once(realm_id, federation.id).await?;

    env.fetcher.fail(METADATA_URL, "connection refused");
    let err = node
        .federations
        .sync_once(realm_id, federation.id)
        .await
        .unwrap_err();

    assert!(matches!(err, FederationError::Fetch { .. }));
    assert!(err.is_transient());
    assert_eq!(env.members(realm_id, federation.id).await?, vec!["p1", "p2"]);
    let failures = env.events.of_type(EventType::FederationSyncFailed);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].resource.as_deref(), Some("edugain"));
    Ok(())
}

/// Tests that removing a realm cancels its federation tasks.
#[tokio::test]
async fn removing_a_realm_cancels_its_sync() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let (realm_id, federation) = realm_with_federation(&env, &node).await?;

    assert!(node.realms.remove_realm(realm_id).await?);

    assert!(!node.federations.is_scheduled(federation.id));
    assert!(node.scheduler.scheduled_tasks().is_empty());
    assert!(env.storage.realms.get_by_id(realm_id).await?.is_none());
    Ok(())
}
