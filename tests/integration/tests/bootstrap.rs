//! Realm bootstrap integration tests.

use std::collections::HashSet;

use kc_core::event::EventType;
use kc_core::config::BootstrapConfig;
use kc_model::role::{account_roles, admin_roles, realm_roles};
use kc_realm::{BootstrapError, DefaultResource, RealmDocument};
use kc_server::ServerConfig;
use serde_json::json;
use uuid::Uuid;

use crate::common::TestEnv;

const TENANT_CLIENTS: &[&str] = &[
    "account",
    "account-console",
    "realm-management",
    "broker",
    "security-admin-console",
    "admin-cli",
];

async fn composite_names(env: &TestEnv, realm_id: Uuid, role_id: Uuid) -> anyhow::Result<HashSet<String>> {
    Ok(env
        .storage
        .roles
        .get_composites(realm_id, role_id)
        .await?
        .into_iter()
        .map(|r| r.name)
        .collect())
}

/// Tests a first start followed by a tenant realm.
#[tokio::test]
async fn fresh_node_bootstraps_admin_and_tenant_realms() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let acme = node.realms.create_realm(None, "acme").await?;
    let master = env.realm("master").await?;

    for client_id in TENANT_CLIENTS {
        assert!(
            env.storage
                .clients
                .get_by_client_id(acme.id, client_id)
                .await?
                .is_some(),
            "{client_id} missing"
        );
    }

    let acme_admin = env
        .storage
        .clients
        .get_by_client_id(master.id, "acme-realm")
        .await?
        .ok_or_else(|| anyhow::anyhow!("acme-realm missing"))?;
    assert!(acme_admin.is_bearer_only());
    assert_eq!(acme.master_admin_client_id, Some(acme_admin.id));
    assert!(
        env.storage
            .clients
            .get_by_client_id(master.id, "realm-management")
            .await?
            .is_none(),
        "the admin realm is administered through its master clients"
    );

    let default_role = env
        .storage
        .roles
        .get_realm_role_by_name(acme.id, "default-roles-acme")
        .await?
        .ok_or_else(|| anyhow::anyhow!("default role missing"))?;
    assert_eq!(acme.default_role_id, Some(default_role.id));
    let defaults = composite_names(&env, acme.id, default_role.id).await?;
    assert!(defaults.contains(realm_roles::OFFLINE_ACCESS));
    assert!(defaults.contains(account_roles::VIEW_PROFILE));
    assert!(defaults.contains(account_roles::MANAGE_ACCOUNT));
    assert!(!defaults.contains(account_roles::DELETE_ACCOUNT));

    assert!(env.composites_are_acyclic(master.id).await?);
    assert!(env.composites_are_acyclic(acme.id).await?);

    let created: Vec<_> = env
        .events
        .of_type(EventType::RealmPostCreate)
        .into_iter()
        .filter_map(|e| e.resource)
        .collect();
    assert_eq!(created, vec!["master".to_string(), "acme".to_string()]);
    Ok(())
}

/// Tests that a restarted node only verifies.
#[tokio::test]
async fn second_node_start_creates_nothing() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let first = env.bootstrapped_node("a").await?;
    let acme = first.realms.create_realm(None, "acme").await?;
    let clients_before = env.storage.clients.list(acme.id).await?.len();
    let roles_before = env.storage.roles.list_realm_roles(acme.id).await?.len();

    let second = env.bootstrapped_node("b").await?;
    let report = second.realms.ensure_defaults(&acme).await?;

    assert!(!report.created_any());
    assert!(report.postponed.is_empty());
    assert_eq!(env.storage.clients.list(acme.id).await?.len(), clients_before);
    assert_eq!(
        env.storage.roles.list_realm_roles(acme.id).await?.len(),
        roles_before
    );
    assert_eq!(
        env.events.of_type(EventType::RealmPostCreate).len(),
        2,
        "the admin realm is not created twice"
    );
    Ok(())
}

/// Tests that an older realm missing newer defaults gets them on verification.
#[tokio::test]
async fn verification_completes_an_older_realm() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;
    let acme = node.realms.create_realm(None, "acme").await?;

    for client_id in ["account-console", "admin-cli"] {
        let client = env
            .storage
            .clients
            .get_by_client_id(acme.id, client_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("{client_id} missing"))?;
        env.storage.clients.delete(acme.id, client.id).await?;
    }

    let report = node.realms.ensure_defaults(&acme).await?;

    assert_eq!(
        report.created,
        vec![
            DefaultResource::AccountConsoleClient,
            DefaultResource::AdminCliClient
        ]
    );
    assert!(report.verified.contains(&DefaultResource::AccountClient));
    assert!(
        env.storage
            .clients
            .get_by_client_id(acme.id, "account-console")
            .await?
            .is_some()
    );
    Ok(())
}

/// Tests an import declaring resources the bootstrap would otherwise create.
#[tokio::test]
async fn import_postpones_declared_resources() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;

    let document: RealmDocument = serde_json::from_value(json!({
        "realm": "beta",
        "clients": [{ "clientId": "realm-management", "bearerOnly": true }],
        "roles": {
            "realm": [
                { "name": "default-roles-beta" },
                { "name": "reader" },
                { "name": "auditor", "composites": ["reader"] }
            ]
        }
    }))?;
    let beta = node.realms.import_realm(&document).await?;

    let management = env
        .storage
        .clients
        .get_by_client_id(beta.id, "realm-management")
        .await?
        .ok_or_else(|| anyhow::anyhow!("realm-management missing"))?;
    let realm_admin = env
        .storage
        .roles
        .get_client_role_by_name(beta.id, management.id, admin_roles::REALM_ADMIN)
        .await?
        .ok_or_else(|| anyhow::anyhow!("realm-admin missing"))?;
    let admin_composites = composite_names(&env, beta.id, realm_admin.id).await?;
    assert!(admin_composites.contains(admin_roles::IMPERSONATION));
    assert!(admin_composites.contains(admin_roles::VIEW_USERS));
    assert!(
        env.storage
            .clients
            .get_by_client_id(beta.id, "admin-cli")
            .await?
            .is_some()
    );

    let default_role = env
        .storage
        .roles
        .get_by_id(beta.id, beta.default_role_id.unwrap_or_default())
        .await?
        .ok_or_else(|| anyhow::anyhow!("default role missing"))?;
    assert_eq!(default_role.name, "default-roles-beta-1");

    let auditor = env
        .storage
        .roles
        .get_realm_role_by_name(beta.id, "auditor")
        .await?
        .ok_or_else(|| anyhow::anyhow!("auditor missing"))?;
    assert!(composite_names(&env, beta.id, auditor.id).await?.contains("reader"));
    assert!(env.composites_are_acyclic(beta.id).await?);
    Ok(())
}

/// Tests that a cyclic import is rejected and leaves nothing behind.
#[tokio::test]
async fn cyclic_import_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.bootstrapped_node("a").await?;

    let document: RealmDocument = serde_json::from_value(json!({
        "realm": "loop",
        "roles": {
            "realm": [
                { "name": "a", "composites": ["b"] },
                { "name": "b", "composites": ["a"] }
            ]
        }
    }))?;
    let err = node.realms.import_realm(&document).await.unwrap_err();

    assert!(matches!(err, BootstrapError::CompositeCycle { .. }));
    assert!(env.storage.realms.get_by_name("loop").await?.is_none());
    let master = env.realm("master").await?;
    assert!(
        env.storage
            .clients
            .get_by_client_id(master.id, "loop-realm")
            .await?
            .is_none()
    );
    Ok(())
}

/// Tests the default role suffix limit.
#[tokio::test]
async fn default_role_suffix_limit_is_enforced() -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    config.core.bootstrap = BootstrapConfig {
        admin_realm: "master".to_string(),
        default_role_suffix_limit: 1,
    };
    let env = TestEnv::with_config(config);
    let node = env.bootstrapped_node("a").await?;

    let document = RealmDocument::new("gamma")
        .with_realm_role("default-roles-gamma")
        .with_realm_role("default-roles-gamma-1");
    let err = node.realms.import_realm(&document).await.unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::DefaultRoleNamespaceExhausted { limit: 1, .. }
    ));
    assert!(err.is_configuration());
    assert!(env.storage.realms.get_by_name("gamma").await?.is_none());
    Ok(())
}

/// Tests that a realm cannot be bootstrapped before the admin realm exists.
#[tokio::test]
async fn tenant_realm_requires_the_admin_realm() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let node = env.node("a");

    let err = node.realms.create_realm(None, "acme").await.unwrap_err();

    assert!(matches!(err, BootstrapError::AdminRealmMissing(_)));
    assert!(env.storage.realms.get_by_name("acme").await?.is_none());
    Ok(())
}
