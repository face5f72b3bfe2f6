//! Provider descriptors returned by a metadata fetch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::federation::CategoryMap;

/// One provider as listed by a federation's metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Entity id; becomes the local provider alias.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Registration authority that published the entity.
    #[serde(default)]
    pub registration_authority: Option<String>,
    /// Entity categories.
    #[serde(default)]
    pub categories: CategoryMap,
    /// Provider configuration extracted from the metadata.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl ProviderDescriptor {
    /// Creates a descriptor with only an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            registration_authority: None,
            categories: CategoryMap::new(),
            config: HashMap::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the registration authority.
    #[must_use]
    pub fn with_registration_authority(mut self, ra: impl Into<String>) -> Self {
        self.registration_authority = Some(ra.into());
        self
    }

    /// Adds a category value.
    #[must_use]
    pub fn with_category(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.categories
            .entry(name.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// Sets a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Checks whether any `(name, value)` pair is shared with `categories`.
    #[must_use]
    pub fn shares_category(&self, categories: &CategoryMap) -> bool {
        categories.iter().any(|(name, values)| {
            self.categories
                .get(name)
                .is_some_and(|own| !own.is_disjoint(values))
        })
    }
}

/// Result of fetching a federation's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedMetadata {
    /// Listed providers, in document order.
    pub descriptors: Vec<ProviderDescriptor>,
    /// Validity declared by the metadata document.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl FetchedMetadata {
    /// Wraps a descriptor list with no validity.
    #[must_use]
    pub const fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        Self {
            descriptors,
            valid_until: None,
        }
    }
}
