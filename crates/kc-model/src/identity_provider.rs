//! Identity provider domain model.
//!
//! An identity provider is keyed by its alias within a realm. Providers
//! introduced by federations carry the ids of every federation that lists
//! them; the provider lives as long as at least one membership remains or it
//! was created manually.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProvider {
    /// Internal identifier.
    pub internal_id: Uuid,
    /// Realm this provider belongs to.
    pub realm_id: Uuid,
    /// Alias, unique within the realm.
    pub alias: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Provider type id (e.g. `saml`, `oidc`).
    pub provider_type: String,
    /// Whether the provider is enabled.
    pub enabled: bool,
    /// Only usable for account linking, not for login.
    pub link_only: bool,
    /// Trust email addresses asserted by the provider.
    pub trust_email: bool,
    /// Provider-type specific configuration.
    pub config: HashMap<String, String>,
    /// Federations listing this provider.
    pub federations: BTreeSet<Uuid>,
    /// When the provider was created.
    pub created_at: DateTime<Utc>,
    /// When the provider was last updated.
    pub updated_at: DateTime<Utc>,
}

impl IdentityProvider {
    /// Creates an enabled provider with no configuration.
    #[must_use]
    pub fn new(realm_id: Uuid, alias: impl Into<String>, provider_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            internal_id: Uuid::now_v7(),
            realm_id,
            alias: alias.into(),
            display_name: None,
            provider_type: provider_type.into(),
            enabled: true,
            link_only: false,
            trust_email: false,
            config: HashMap::new(),
            federations: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Records membership in a federation. Returns false if already a member.
    pub fn attach_federation(&mut self, federation_id: Uuid) -> bool {
        self.federations.insert(federation_id)
    }

    /// Drops membership in a federation. Returns false if it was not a member.
    pub fn detach_federation(&mut self, federation_id: Uuid) -> bool {
        self.federations.remove(&federation_id)
    }

    /// Checks membership in a federation.
    #[must_use]
    pub fn is_member_of(&self, federation_id: Uuid) -> bool {
        self.federations.contains(&federation_id)
    }

    /// Checks whether removing `federation_id` leaves no membership.
    #[must_use]
    pub fn is_sole_member_of(&self, federation_id: Uuid) -> bool {
        self.federations.len() == 1 && self.is_member_of(federation_id)
    }
}

/// A mapper attached to one identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProviderMapper {
    /// Unique identifier.
    pub id: Uuid,
    /// Realm this mapper belongs to.
    pub realm_id: Uuid,
    /// Mapper name, unique per provider.
    pub name: String,
    /// Alias of the provider the mapper is attached to.
    pub identity_provider_alias: String,
    /// Mapper type id (e.g. `hardcoded-role-idp-mapper`).
    pub mapper_type: String,
    /// Mapper configuration.
    pub config: HashMap<String, String>,
}

impl IdentityProviderMapper {
    /// Creates a mapper with empty configuration.
    #[must_use]
    pub fn new(
        realm_id: Uuid,
        identity_provider_alias: impl Into<String>,
        name: impl Into<String>,
        mapper_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            realm_id,
            name: name.into(),
            identity_provider_alias: identity_provider_alias.into(),
            mapper_type: mapper_type.into(),
            config: HashMap::new(),
        }
    }

    /// Sets a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}
