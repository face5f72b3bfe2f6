//! Realm domain model.
//!
//! A realm is the top-level tenant container. It owns its clients, roles,
//! identity providers, and federations; removing a realm removes all of them.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SSL requirement level for a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslRequired {
    /// No SSL required.
    None,
    /// SSL required for external requests only.
    #[default]
    External,
    /// SSL required for all requests.
    All,
}

/// Brute-force detection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BruteForcePolicy {
    /// Whether detection is enabled.
    pub enabled: bool,
    /// Lock accounts permanently instead of temporarily.
    pub permanent_lockout: bool,
    /// Maximum wait after repeated failures (seconds).
    pub max_failure_wait_seconds: i32,
    /// Wait applied after a quick login failure (seconds).
    pub minimum_quick_login_wait_seconds: i32,
    /// Increment added per failure (seconds).
    pub wait_increment_seconds: i32,
    /// Two failures closer than this are "quick" (milliseconds).
    pub quick_login_check_millis: i64,
    /// Failure counter reset window (seconds).
    pub max_delta_time_seconds: i32,
    /// Failures before a wait is applied.
    pub failure_factor: i32,
}

impl Default for BruteForcePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            permanent_lockout: false,
            max_failure_wait_seconds: 900,
            minimum_quick_login_wait_seconds: 60,
            wait_increment_seconds: 60,
            quick_login_check_millis: 1000,
            max_delta_time_seconds: 60 * 60 * 12,
            failure_factor: 30,
        }
    }
}

/// A realm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realm {
    /// Unique identifier.
    pub id: Uuid,
    /// Unique realm name.
    pub name: String,
    /// Name shown on login pages.
    pub display_name: Option<String>,
    /// Whether the realm is enabled.
    pub enabled: bool,
    /// SSL requirement level.
    pub ssl_required: SslRequired,
    /// Brute-force detection.
    pub brute_force: BruteForcePolicy,
    /// Allow login with email address.
    pub login_with_email_allowed: bool,
    /// Event listener types.
    pub events_listeners: HashSet<String>,
    /// Composite role every new user of the realm receives.
    pub default_role_id: Option<Uuid>,
    /// Client in the administrative realm that manages this realm.
    pub master_admin_client_id: Option<Uuid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Realm {
    /// Creates a realm with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::now_v7(), name)
    }

    /// Creates a realm with a caller-chosen id. Settings start empty; see
    /// [`Realm::apply_defaults`].
    #[must_use]
    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            display_name: None,
            enabled: true,
            ssl_required: SslRequired::default(),
            brute_force: BruteForcePolicy::default(),
            login_with_email_allowed: false,
            events_listeners: HashSet::new(),
            default_role_id: None,
            master_admin_client_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resets the security settings to what every new realm starts from.
    pub fn apply_defaults(&mut self) {
        self.brute_force = BruteForcePolicy::default();
        self.ssl_required = SslRequired::External;
        self.login_with_email_allowed = true;
        self.events_listeners.insert(DEFAULT_EVENT_LISTENER.to_string());
        self.updated_at = Utc::now();
    }

    /// Whether this realm is the administrative realm.
    #[must_use]
    pub fn is_admin_realm(&self, admin_realm_name: &str) -> bool {
        self.name == admin_realm_name
    }
}

/// Listener every realm logs events to.
pub const DEFAULT_EVENT_LISTENER: &str = "jboss-logging";

/// Characters a realm name may not contain.
pub const RESERVED_NAME_CHARACTERS: &[char] = &['/', '\\', '<', '>', '%', '"', '&', '$'];

/// Checks a realm name against the reserved character set.
///
/// Names must be non-empty and free of reserved and control characters.
#[must_use]
pub fn is_valid_realm_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name
            .chars()
            .any(|c| c.is_control() || RESERVED_NAME_CHARACTERS.contains(&c))
}
