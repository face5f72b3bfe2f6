//! Default resource registry.
//!
//! [`DEFAULT_RESOURCES`] lists every resource a bootstrapped realm owns, in
//! the order the orchestrator processes them. Each resource declares what it
//! depends on; a dependency always appears earlier in the table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A resource created for every realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultResource {
    /// Realm role every user is granted, referenced by the realm.
    DefaultRole,
    /// Client in the admin realm that administers this realm.
    MasterAdminClient,
    /// Bearer-only client holding this realm's admin roles.
    RealmManagementClient,
    /// Account management client and its roles.
    AccountClient,
    /// Account console client.
    AccountConsoleClient,
    /// Impersonation roles on both management clients.
    ImpersonationService,
    /// Identity brokering client.
    BrokerClient,
    /// Admin console client.
    AdminConsoleClient,
    /// Command-line admin client.
    AdminCliClient,
    /// Offline access realm role.
    OfflineAccess,
    /// Account deletion role, off by default.
    DeleteAccountRole,
}

/// Something a default resource needs before it can be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dependency {
    /// The administrative realm must exist.
    AdminRealm,
    /// Another default resource must exist.
    Resource(DefaultResource),
}

/// Default resources in processing order.
pub const DEFAULT_RESOURCES: &[DefaultResource] = &[
    DefaultResource::DefaultRole,
    DefaultResource::MasterAdminClient,
    DefaultResource::RealmManagementClient,
    DefaultResource::AccountClient,
    DefaultResource::AccountConsoleClient,
    DefaultResource::ImpersonationService,
    DefaultResource::BrokerClient,
    DefaultResource::AdminConsoleClient,
    DefaultResource::AdminCliClient,
    DefaultResource::OfflineAccess,
    DefaultResource::DeleteAccountRole,
];

impl DefaultResource {
    /// What this resource needs first.
    #[must_use]
    pub const fn depends_on(self) -> &'static [Dependency] {
        use DefaultResource as R;
        match self {
            R::MasterAdminClient => &[Dependency::AdminRealm],
            R::AccountClient | R::OfflineAccess => &[Dependency::Resource(R::DefaultRole)],
            R::AccountConsoleClient | R::DeleteAccountRole => {
                &[Dependency::Resource(R::AccountClient)]
            }
            R::ImpersonationService => &[
                Dependency::Resource(R::RealmManagementClient),
                Dependency::Resource(R::MasterAdminClient),
            ],
            R::AdminCliClient => &[Dependency::Resource(R::RealmManagementClient)],
            R::DefaultRole
            | R::RealmManagementClient
            | R::BrokerClient
            | R::AdminConsoleClient => &[],
        }
    }

    /// Whether the resource exists for this kind of realm at all.
    ///
    /// The admin realm is administered through its own master admin client
    /// and has no `realm-management` client.
    #[must_use]
    pub const fn is_applicable(self, is_admin_realm: bool) -> bool {
        !(is_admin_realm && matches!(self, Self::RealmManagementClient))
    }

    /// Stable name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DefaultRole => "default-role",
            Self::MasterAdminClient => "master-admin-client",
            Self::RealmManagementClient => "realm-management-client",
            Self::AccountClient => "account-client",
            Self::AccountConsoleClient => "account-console-client",
            Self::ImpersonationService => "impersonation-service",
            Self::BrokerClient => "broker-client",
            Self::AdminConsoleClient => "admin-console-client",
            Self::AdminCliClient => "admin-cli-client",
            Self::OfflineAccess => "offline-access",
            Self::DeleteAccountRole => "delete-account-role",
        }
    }
}

impl fmt::Display for DefaultResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdminRealm => f.write_str("admin-realm"),
            Self::Resource(resource) => resource.fmt(f),
        }
    }
}
