//! Identity provider federation domain model.
//!
//! A federation is a subscription to an external metadata source that lists
//! many identity providers. The realm keeps one local [`IdentityProvider`]
//! per listed entity that passes the federation's [`FilterSet`], and stamps
//! every provider it introduces with the federation's [`FederationMapper`]
//! templates.
//!
//! [`IdentityProvider`]: crate::identity_provider::IdentityProvider

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity_provider::IdentityProviderMapper;

/// Category map: attribute name to the set of accepted values.
pub type CategoryMap = BTreeMap<String, BTreeSet<String>>;

/// Allow/deny filters applied to fetched descriptors.
///
/// An empty allow list admits everything; a deny match always excludes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSet {
    /// Entity ids to admit. Empty admits all.
    pub entity_id_allow: BTreeSet<String>,
    /// Entity ids to exclude.
    pub entity_id_deny: BTreeSet<String>,
    /// Registration authorities to admit. Empty admits all.
    pub registration_authority_allow: BTreeSet<String>,
    /// Registration authorities to exclude.
    pub registration_authority_deny: BTreeSet<String>,
    /// Categories to admit: at least one shared value required. Empty admits all.
    pub category_allow: CategoryMap,
    /// Categories to exclude: any shared value excludes.
    pub category_deny: CategoryMap,
}

impl FilterSet {
    /// Creates an empty filter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity id to the allow list.
    #[must_use]
    pub fn allow_entity(mut self, id: impl Into<String>) -> Self {
        self.entity_id_allow.insert(id.into());
        self
    }

    /// Adds an entity id to the deny list.
    #[must_use]
    pub fn deny_entity(mut self, id: impl Into<String>) -> Self {
        self.entity_id_deny.insert(id.into());
        self
    }

    /// Adds a registration authority to the allow list.
    #[must_use]
    pub fn allow_registration_authority(mut self, ra: impl Into<String>) -> Self {
        self.registration_authority_allow.insert(ra.into());
        self
    }

    /// Adds a registration authority to the deny list.
    #[must_use]
    pub fn deny_registration_authority(mut self, ra: impl Into<String>) -> Self {
        self.registration_authority_deny.insert(ra.into());
        self
    }

    /// Adds a category value to the allow map.
    #[must_use]
    pub fn allow_category(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.category_allow
            .entry(name.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// Adds a category value to the deny map.
    #[must_use]
    pub fn deny_category(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.category_deny
            .entry(name.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// Returns true when no filter is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Flags stamped onto every provider a federation introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderDefaults {
    /// Introduced providers are enabled.
    pub enabled: bool,
    /// Trust email addresses asserted by introduced providers.
    pub trust_email: bool,
    /// Introduced providers are link-only.
    pub link_only: bool,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_email: false,
            link_only: false,
        }
    }
}

/// A federation subscription owned by a realm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityProviderFederation {
    /// Unique identifier.
    pub id: Uuid,
    /// Realm this federation belongs to.
    pub realm_id: Uuid,
    /// Alias, unique within the realm.
    pub alias: String,
    /// Display name.
    pub display_name: Option<String>,
    /// Provider type id of the providers this federation introduces.
    pub provider_type: String,
    /// Metadata source URL.
    pub url: String,
    /// Refresh interval in seconds.
    pub refresh_interval_secs: u64,
    /// When the last successful sync finished.
    pub last_refresh: Option<DateTime<Utc>>,
    /// Validity reported by the last fetched metadata.
    pub valid_until: Option<DateTime<Utc>>,
    /// Descriptor filters.
    pub filters: FilterSet,
    /// Flags applied to introduced providers.
    pub provider_defaults: ProviderDefaults,
    /// Configuration merged into every introduced provider.
    pub config: HashMap<String, String>,
    /// When the federation was created.
    pub created_at: DateTime<Utc>,
    /// When the federation was last updated.
    pub updated_at: DateTime<Utc>,
}

impl IdentityProviderFederation {
    /// Creates a federation with no filters.
    #[must_use]
    pub fn new(
        realm_id: Uuid,
        alias: impl Into<String>,
        provider_type: impl Into<String>,
        url: impl Into<String>,
        refresh_interval_secs: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            realm_id,
            alias: alias.into(),
            display_name: None,
            provider_type: provider_type.into(),
            url: url.into(),
            refresh_interval_secs,
            last_refresh: None,
            valid_until: None,
            filters: FilterSet::default(),
            provider_defaults: ProviderDefaults::default(),
            config: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the filters.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the provider defaults.
    #[must_use]
    pub const fn with_provider_defaults(mut self, defaults: ProviderDefaults) -> Self {
        self.provider_defaults = defaults;
        self
    }

    /// Sets a configuration entry merged into introduced providers.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Records a completed refresh.
    pub fn mark_refreshed(&mut self, at: DateTime<Utc>, valid_until: Option<DateTime<Utc>>) {
        self.last_refresh = Some(at);
        if valid_until.is_some() {
            self.valid_until = valid_until;
        }
        self.updated_at = at;
    }
}

/// A mapper template applied to every provider a federation introduces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationMapper {
    /// Unique identifier.
    pub id: Uuid,
    /// Federation the template belongs to.
    pub federation_id: Uuid,
    /// Name, unique within the federation.
    pub name: String,
    /// Mapper type id.
    pub mapper_type: String,
    /// Mapper configuration.
    pub config: HashMap<String, String>,
}

impl FederationMapper {
    /// Creates a template with empty configuration.
    #[must_use]
    pub fn new(federation_id: Uuid, name: impl Into<String>, mapper_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            federation_id,
            name: name.into(),
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

    /// Produces the concrete mapper for one provider.
    #[must_use]
    pub fn instantiate(&self, realm_id: Uuid, alias: &str) -> IdentityProviderMapper {
        IdentityProviderMapper {
            id: Uuid::now_v7(),
            realm_id,
            name: self.name.clone(),
            identity_provider_alias: alias.to_string(),
            mapper_type: self.mapper_type.clone(),
            config: self.config.clone(),
        }
    }
}
