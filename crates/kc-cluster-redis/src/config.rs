//! Redis connection configuration.

use serde::{Deserialize, Serialize};

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `redis://` or `rediss://` connection URL. Credentials and the database
    /// number go in the URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Prefix for every lock key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RedisConfig {
    /// Creates a configuration from a `redis://` or `rediss://` URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Redis key holding the lease for lock `name`.
    #[must_use]
    pub fn lock_key(&self, name: &str) -> String {
        if self.key_prefix.is_empty() {
            format!("lock:{name}")
        } else {
            format!("{}:lock:{name}", self.key_prefix)
        }
    }
}

fn default_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "kc".to_string()
}
