//! Client domain model.
//!
//! Clients are the applications a realm issues tokens to. The bootstrap
//! orchestrator creates a fixed set of built-in clients per realm; each is
//! looked up by its well-known `client_id`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a client authenticates against the realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientAccess {
    /// Holds a credential of its own.
    #[default]
    Confidential,
    /// Browser or CLI application without a credential.
    Public,
    /// Only validates tokens; never initiates a login.
    BearerOnly,
}

/// A client application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning realm.
    pub realm_id: Uuid,
    /// Client identifier, unique within the realm.
    pub client_id: String,
    /// Display name.
    pub name: Option<String>,
    /// Disabled clients keep their roles but cannot log in.
    pub enabled: bool,
    /// Access type.
    pub access: ClientAccess,
    /// Authorization code flow.
    pub standard_flow_enabled: bool,
    /// Resource owner password flow.
    pub direct_access_grants_enabled: bool,
    /// Root URL that relative redirects resolve against.
    pub root_url: Option<String>,
    /// Landing page.
    pub base_url: Option<String>,
    /// Allowed redirect URIs; a trailing `*` matches any suffix.
    pub redirect_uris: HashSet<String>,
    /// Allowed CORS origins. `+` means "derive from the redirect URIs".
    pub web_origins: HashSet<String>,
    /// When false only `scope_mappings` reach this client's tokens.
    pub full_scope_allowed: bool,
    /// Role IDs mapped into tokens when full scope is off.
    pub scope_mappings: HashSet<Uuid>,
    /// Free-form attributes such as the PKCE method.
    pub attributes: HashMap<String, String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Creates an enabled confidential client using the standard flow.
    #[must_use]
    pub fn new(realm_id: Uuid, client_id: impl Into<String>) -> Self {
        Self::with_access(realm_id, client_id, ClientAccess::Confidential)
    }

    /// Creates a public client.
    #[must_use]
    pub fn new_public(realm_id: Uuid, client_id: impl Into<String>) -> Self {
        Self::with_access(realm_id, client_id, ClientAccess::Public)
    }

    /// Creates a bearer-only client. Login flows are off.
    #[must_use]
    pub fn new_bearer_only(realm_id: Uuid, client_id: impl Into<String>) -> Self {
        Self::with_access(realm_id, client_id, ClientAccess::BearerOnly)
    }

    /// Creates a client of the given access type.
    #[must_use]
    pub fn with_access(realm_id: Uuid, client_id: impl Into<String>, access: ClientAccess) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            realm_id,
            client_id: client_id.into(),
            name: None,
            enabled: true,
            access,
            standard_flow_enabled: access != ClientAccess::BearerOnly,
            direct_access_grants_enabled: false,
            root_url: None,
            base_url: None,
            redirect_uris: HashSet::new(),
            web_origins: HashSet::new(),
            full_scope_allowed: true,
            scope_mappings: HashSet::new(),
            attributes: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the root and base URLs.
    #[must_use]
    pub fn with_urls(mut self, root_url: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.root_url = Some(root_url.into());
        self.base_url = Some(base_url.into());
        self
    }

    /// Adds a redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.insert(uri.into());
        self
    }

    /// Adds a web origin.
    #[must_use]
    pub fn with_web_origin(mut self, origin: impl Into<String>) -> Self {
        self.web_origins.insert(origin.into());
        self
    }

    /// Sets whether every realm role reaches the client's tokens.
    #[must_use]
    pub const fn with_full_scope_allowed(mut self, allowed: bool) -> Self {
        self.full_scope_allowed = allowed;
        self
    }

    /// Switches the client to direct grants only, the way CLI clients log in.
    #[must_use]
    pub const fn direct_grants_only(mut self) -> Self {
        self.direct_access_grants_enabled = true;
        self.standard_flow_enabled = false;
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether the client is public.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.access == ClientAccess::Public
    }

    /// Whether the client is bearer-only.
    #[must_use]
    pub fn is_bearer_only(&self) -> bool {
        self.access == ClientAccess::BearerOnly
    }
}
