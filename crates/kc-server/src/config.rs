//! Server configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use std::time::Duration;

use kc_core::Config;
use kc_core::config::LockRelease;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bootstrap, scheduler, federation, and cluster settings.
    pub core: Config,

    /// Prefix of every lock key written to Redis.
    pub redis_key_prefix: String,

    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// ## Errors
    ///
    /// Returns an error if `KC_LOCK_RELEASE` names an unknown policy.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `var`, which returns the value of one
    /// variable.
    ///
    /// ## Errors
    ///
    /// Returns an error if `KC_LOCK_RELEASE` names an unknown policy.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut core = Config::default();

        if let Some(admin_realm) = var("KC_ADMIN_REALM") {
            core.bootstrap.admin_realm = admin_realm;
        }
        if let Some(limit) = var("KC_DEFAULT_ROLE_SUFFIX_LIMIT").and_then(|v| v.parse().ok()) {
            core.bootstrap.default_role_suffix_limit = limit;
        }

        if let Some(secs) = var("KC_SCHEDULER_DEFAULT_INTERVAL").and_then(|v| v.parse().ok()) {
            core.scheduler.default_interval_secs = secs;
        }
        if let Some(release) = var("KC_LOCK_RELEASE") {
            core.scheduler.lock_release = match release.to_lowercase().as_str() {
                "on_completion" | "on-completion" => LockRelease::OnCompletion,
                "hold_for_window" | "hold-for-window" => LockRelease::HoldForWindow,
                other => anyhow::bail!("unknown KC_LOCK_RELEASE policy: {other}"),
            };
        }

        if let Some(secs) = var("KC_FEDERATION_MIN_REFRESH").and_then(|v| v.parse().ok()) {
            core.federation.min_refresh_interval_secs = secs;
        }
        if let Some(secs) = var("KC_FEDERATION_FETCH_TIMEOUT").and_then(|v| v.parse().ok()) {
            core.federation.fetch_timeout_secs = secs;
        }
        if let Some(backfill) = var("KC_FEDERATION_BACKFILL_MAPPERS") {
            core.federation.backfill_mappers = backfill.to_lowercase() == "true" || backfill == "1";
        }

        if let Some(node_id) = var("KC_NODE_ID") {
            core.cluster.node_id = node_id;
        }
        core.cluster.redis_url = var("KC_REDIS_URL").or_else(|| var("REDIS_URL"));

        let redis_key_prefix = var("KC_REDIS_KEY_PREFIX").unwrap_or_else(|| "kc".to_string());
        let log_level = var("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            core,
            redis_key_prefix,
            log_level,
        })
    }

    /// Returns the metadata fetch timeout.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.core.federation.fetch_timeout_secs)
    }

    /// Returns the smallest allowed federation refresh interval.
    #[must_use]
    pub const fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.core.federation.min_refresh_interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            core: Config::default(),
            redis_key_prefix: "kc".to_string(),
            log_level: "info".to_string(),
        }
    }
}
