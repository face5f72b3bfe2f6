//! Configuration tree for the bootstrap orchestrator, federation sync, and
//! the cluster-aware scheduler.
//!
//! Every section has serde defaults so a partial document (or none at all)
//! yields a working configuration.

use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Realm bootstrap configuration.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    /// Scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Federation sync configuration.
    #[serde(default)]
    pub federation: FederationConfig,
    /// Cluster coordination configuration.
    #[serde(default)]
    pub cluster: ClusterConfig,
}

/// Realm bootstrap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Name of the administrative realm that owns every realm's master admin client.
    #[serde(default = "default_admin_realm")]
    pub admin_realm: String,
    /// Highest numeric suffix tried when the default role name collides.
    #[serde(default = "default_role_suffix_limit")]
    pub default_role_suffix_limit: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_realm: default_admin_realm(),
            default_role_suffix_limit: default_role_suffix_limit(),
        }
    }
}

/// When a scheduled task gives back its cluster lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockRelease {
    /// Release as soon as the run completes.
    #[default]
    OnCompletion,
    /// Keep the lock until it expires, so a task runs at most once per interval window.
    HoldForWindow,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval used when a federation does not declare one, in seconds.
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
    /// Lock release policy.
    #[serde(default)]
    pub lock_release: LockRelease,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval_secs(),
            lock_release: LockRelease::default(),
        }
    }
}

/// Federation sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Smallest refresh interval a federation may declare, in seconds.
    #[serde(default = "default_min_refresh_secs")]
    pub min_refresh_interval_secs: u64,
    /// Metadata fetch timeout, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Apply missing mapper templates to providers that already exist.
    #[serde(default)]
    pub backfill_mappers: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval_secs: default_min_refresh_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            backfill_mappers: false,
        }
    }
}

/// Cluster coordination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Identifier of this node; written as the lock owner.
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Redis URL for the shared lock store. `None` keeps locks in process.
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            redis_url: None,
        }
    }
}

fn default_admin_realm() -> String {
    "master".to_string()
}

const fn default_role_suffix_limit() -> u32 {
    u32::MAX
}

const fn default_interval_secs() -> u64 {
    900
}

const fn default_min_refresh_secs() -> u64 {
    60
}

const fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_node_id() -> String {
    format!("node-{}", uuid::Uuid::now_v7().simple())
}
