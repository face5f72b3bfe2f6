//! Role domain model.
//!
//! Roles can be realm-level or client-level and may be composite. Composite
//! edges are kept in `composite_roles`; the graph formed by them must stay
//! acyclic, which is enforced where edges are added, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A realm role, or a client role when `client_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning realm.
    pub realm_id: Uuid,
    /// Owning client, for client roles.
    pub client_id: Option<Uuid>,
    /// Name, unique within its realm or client.
    pub name: String,
    /// Human-readable description; built-in roles carry a `${role_...}` key.
    pub description: Option<String>,
    /// Direct children, in insertion order.
    pub composite_roles: Vec<Uuid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Creates a realm role.
    #[must_use]
    pub fn new_realm_role(realm_id: Uuid, name: impl Into<String>) -> Self {
        Self::scoped(realm_id, None, name.into())
    }

    /// Creates a role owned by `client_id`.
    #[must_use]
    pub fn new_client_role(realm_id: Uuid, client_id: Uuid, name: impl Into<String>) -> Self {
        Self::scoped(realm_id, Some(client_id), name.into())
    }

    fn scoped(realm_id: Uuid, client_id: Option<Uuid>, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            realm_id,
            client_id,
            name,
            description: None,
            composite_roles: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the role belongs to the realm rather than a client.
    #[must_use]
    pub const fn is_realm_role(&self) -> bool {
        self.client_id.is_none()
    }

    /// Whether `role_id` is a direct child. Transitive reachability lives
    /// with the code that adds edges.
    #[must_use]
    pub fn has_direct_composite(&self, role_id: Uuid) -> bool {
        self.composite_roles.contains(&role_id)
    }
}

/// Well-known realm role names.
pub mod realm_roles {
    /// Prefix of the generated default role name.
    pub const DEFAULT_ROLES_PREFIX: &str = "default-roles-";
    /// Offline access role (for refresh tokens).
    pub const OFFLINE_ACCESS: &str = "offline_access";
    /// Administrator role of the administrative realm.
    pub const ADMIN: &str = "admin";
    /// Realm creation role of the administrative realm.
    pub const CREATE_REALM: &str = "create-realm";
    /// Marker role that, when declared by an import, disables the delete-account setup.
    pub const DELETE_ACCOUNT: &str = "delete-account";
}

/// Well-known admin role names, present on every realm's management client.
pub mod admin_roles {
    /// Create clients.
    pub const CREATE_CLIENT: &str = "create-client";
    /// View realm settings.
    pub const VIEW_REALM: &str = "view-realm";
    /// Manage realm settings.
    pub const MANAGE_REALM: &str = "manage-realm";
    /// View users.
    pub const VIEW_USERS: &str = "view-users";
    /// Manage users.
    pub const MANAGE_USERS: &str = "manage-users";
    /// View clients.
    pub const VIEW_CLIENTS: &str = "view-clients";
    /// Manage clients.
    pub const MANAGE_CLIENTS: &str = "manage-clients";
    /// View events.
    pub const VIEW_EVENTS: &str = "view-events";
    /// Manage events.
    pub const MANAGE_EVENTS: &str = "manage-events";
    /// View identity providers.
    pub const VIEW_IDENTITY_PROVIDERS: &str = "view-identity-providers";
    /// Manage identity providers.
    pub const MANAGE_IDENTITY_PROVIDERS: &str = "manage-identity-providers";
    /// View authorization.
    pub const VIEW_AUTHORIZATION: &str = "view-authorization";
    /// Manage authorization.
    pub const MANAGE_AUTHORIZATION: &str = "manage-authorization";
    /// Query users.
    pub const QUERY_USERS: &str = "query-users";
    /// Query clients.
    pub const QUERY_CLIENTS: &str = "query-clients";
    /// Query groups.
    pub const QUERY_GROUPS: &str = "query-groups";
    /// Query realms.
    pub const QUERY_REALMS: &str = "query-realms";
    /// Impersonate users.
    pub const IMPERSONATION: &str = "impersonation";
    /// Realm admin (all permissions).
    pub const REALM_ADMIN: &str = "realm-admin";

    /// Every admin role, in creation order.
    pub const ALL_REALM_ROLES: &[&str] = &[
        CREATE_CLIENT,
        VIEW_REALM,
        VIEW_USERS,
        VIEW_CLIENTS,
        VIEW_EVENTS,
        VIEW_IDENTITY_PROVIDERS,
        VIEW_AUTHORIZATION,
        MANAGE_REALM,
        MANAGE_USERS,
        MANAGE_CLIENTS,
        MANAGE_EVENTS,
        MANAGE_IDENTITY_PROVIDERS,
        MANAGE_AUTHORIZATION,
        QUERY_USERS,
        QUERY_CLIENTS,
        QUERY_REALMS,
        QUERY_GROUPS,
    ];

    /// `(parent, children)` composites between admin roles.
    pub const QUERY_COMPOSITES: &[(&str, &[&str])] = &[
        (VIEW_CLIENTS, &[QUERY_CLIENTS]),
        (VIEW_USERS, &[QUERY_USERS, QUERY_GROUPS]),
    ];
}

/// Well-known roles of the account client.
pub mod account_roles {
    /// View own profile.
    pub const VIEW_PROFILE: &str = "view-profile";
    /// Manage own account.
    pub const MANAGE_ACCOUNT: &str = "manage-account";
    /// Manage linked identity-provider accounts.
    pub const MANAGE_ACCOUNT_LINKS: &str = "manage-account-links";
    /// View own applications.
    pub const VIEW_APPLICATIONS: &str = "view-applications";
    /// View granted consents.
    pub const VIEW_CONSENT: &str = "view-consent";
    /// Manage granted consents.
    pub const MANAGE_CONSENT: &str = "manage-consent";
    /// View own groups.
    pub const VIEW_GROUPS: &str = "view-groups";
    /// Delete own account.
    pub const DELETE_ACCOUNT: &str = "delete-account";

    /// Roles created with the account client.
    pub const ALL: &[&str] = &[
        VIEW_PROFILE,
        MANAGE_ACCOUNT,
        MANAGE_ACCOUNT_LINKS,
        VIEW_APPLICATIONS,
        VIEW_CONSENT,
        MANAGE_CONSENT,
        VIEW_GROUPS,
    ];

    /// Account roles every user gets through the default role.
    pub const DEFAULT: &[&str] = &[VIEW_PROFILE, MANAGE_ACCOUNT];
}
